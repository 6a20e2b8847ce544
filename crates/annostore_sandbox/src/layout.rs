//! Sandbox directory layout, discovery and version detection.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{Result, SandboxError};

/// Version assumed for label files that do not declare one.
pub const DEFAULT_SANDBOX_VERSION: &str = "1.1.0";

/// User id to the ids of its repositories.
pub type UserRepos = BTreeMap<String, BTreeSet<String>>;

/// Naming conventions of a sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxLayout {
    /// Per-user label file, relative to the user directory
    pub label_file_name: String,
    /// Backup directory, relative to the sandbox root
    pub backup_dir_name: String,
    pub user_id_len: usize,
    pub repo_id_len: usize,
}

impl Default for SandboxLayout {
    fn default() -> Self {
        Self {
            label_file_name: "labels.yaml".to_string(),
            backup_dir_name: "backup".to_string(),
            user_id_len: 4,
            repo_id_len: 6,
        }
    }
}

impl SandboxLayout {
    pub fn backup_dir(&self, root: &Path) -> PathBuf {
        root.join(&self.backup_dir_name)
    }

    pub fn user_dir(&self, root: &Path, user_id: &str) -> PathBuf {
        root.join(user_id)
    }

    pub fn repo_dir(&self, root: &Path, user_id: &str, repo_id: &str) -> PathBuf {
        root.join(user_id).join(repo_id)
    }

    /// Find user directories and, inside each, repository working copies.
    ///
    /// Users are directories named by exactly `user_id_len` digits; repos are
    /// directories named by exactly `repo_id_len` digits holding a `.git`
    /// directory. A user without repos is still listed.
    pub fn discover(&self, root: &Path) -> Result<UserRepos> {
        let user_pattern = id_pattern(self.user_id_len)?;
        let repo_pattern = id_pattern(self.repo_id_len)?;

        let mut users = UserRepos::new();
        for user in std::fs::read_dir(root)? {
            let user = user?;
            let user_id = user.file_name().to_string_lossy().into_owned();
            if !user_pattern.is_match(&user_id) || !user.file_type()?.is_dir() {
                continue;
            }

            let mut repos = BTreeSet::new();
            for repo in std::fs::read_dir(user.path())? {
                let repo = repo?;
                let repo_id = repo.file_name().to_string_lossy().into_owned();
                if repo_pattern.is_match(&repo_id) && repo.path().join(".git").is_dir() {
                    repos.insert(repo_id);
                }
            }
            log::debug!("user {}: {} repos", user_id, repos.len());
            users.insert(user_id, repos);
        }
        Ok(users)
    }

    /// The schema version shared by every user of the sandbox.
    ///
    /// Fails with `InvalidUserLabelFile` when a label file is missing or not
    /// a YAML mapping, and with `InvalidUserSpaceVersions` unless exactly one
    /// version is declared across all users.
    pub fn detect_version(&self, root: &Path) -> Result<String> {
        let mut versions: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for user_id in self.discover(root)?.keys() {
            let path = self.user_dir(root, user_id).join(&self.label_file_name);
            let version = read_label_file_version(&path)?;
            versions.entry(version).or_default().push(user_id.clone());
        }

        if versions.len() != 1 {
            return Err(SandboxError::InvalidUserSpaceVersions { versions });
        }
        let version = versions.into_keys().next().unwrap_or_default();
        log::info!("sandbox {:?} is at version {}", root, version);
        Ok(version)
    }
}

fn id_pattern(len: usize) -> Result<Regex> {
    Regex::new(&format!(r"^\d{{{}}}$", len))
        .map_err(|e| SandboxError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e)))
}

fn read_label_file_version(path: &Path) -> Result<String> {
    let invalid = |message: String| SandboxError::InvalidUserLabelFile {
        path: path.to_path_buf(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| invalid(e.to_string()))?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| invalid("not a mapping".to_string()))?;

    Ok(match mapping.get("version") {
        Some(serde_yaml::Value::String(version)) => version.clone(),
        Some(serde_yaml::Value::Number(version)) => version.to_string(),
        Some(other) => return Err(invalid(format!("bad version: {:?}", other))),
        None => DEFAULT_SANDBOX_VERSION.to_string(),
    })
}
