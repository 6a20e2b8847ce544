//! Version-control backend seam.
//!
//! Repositories are git working copies. Everything this crate needs from the
//! backend is expressed by [`VcsBackend`]; [`GitCli`] drives the `git`
//! executable as a blocking subprocess.

use std::path::Path;
use std::process::Command;

use crate::error::{MirError, MirResult};

/// Blocking version-control primitives used by the storage layer.
///
/// Implementations must not be shared by two writers on the same repository
/// at once; serialization of mutating calls is the caller's job.
pub trait VcsBackend {
    /// Read `file_name` as committed at `rev` (`branch` or `branch@task-id`).
    fn read_file(&self, repo_root: &Path, rev: &str, file_name: &str) -> MirResult<Vec<u8>>;

    /// Write `files` onto `branch` and commit them, tagging the commit with
    /// `tag`.
    ///
    /// With `base_rev` the branch is (re)created from that revision first,
    /// otherwise the existing branch is extended.
    fn commit_files(
        &self,
        repo_root: &Path,
        branch: &str,
        base_rev: Option<&str>,
        files: &[(String, Vec<u8>)],
        message: &str,
        tag: &str,
    ) -> MirResult<()>;

    /// Force-delete a branch.
    fn delete_branch(&self, repo_root: &Path, branch: &str) -> MirResult<()>;

    /// Delete a tag.
    fn delete_tag(&self, repo_root: &Path, tag: &str) -> MirResult<()>;
}

/// [`VcsBackend`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    executable: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            executable: "git".to_string(),
        }
    }

    /// Use a specific git executable.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    fn run(&self, repo_root: &Path, args: &[&str]) -> MirResult<Vec<u8>> {
        log::trace!("git {:?} in {:?}", args, repo_root);
        let output = Command::new(&self.executable)
            .arg("-C")
            .arg(repo_root)
            .args(args)
            .output()?;
        if !output.status.success() {
            return Err(MirError::Vcs(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

impl VcsBackend for GitCli {
    fn read_file(&self, repo_root: &Path, rev: &str, file_name: &str) -> MirResult<Vec<u8>> {
        let object = format!("{}:{}", rev, file_name);
        self.run(repo_root, &["show", &object])
    }

    fn commit_files(
        &self,
        repo_root: &Path,
        branch: &str,
        base_rev: Option<&str>,
        files: &[(String, Vec<u8>)],
        message: &str,
        tag: &str,
    ) -> MirResult<()> {
        match base_rev {
            Some(base) => self.run(repo_root, &["checkout", "-q", "-B", branch, base])?,
            None => self.run(repo_root, &["checkout", "-q", branch])?,
        };

        for (name, content) in files {
            std::fs::write(repo_root.join(name), content)?;
        }
        let mut add_args = vec!["add", "--"];
        add_args.extend(files.iter().map(|(name, _)| name.as_str()));
        self.run(repo_root, &add_args)?;

        self.run(repo_root, &["commit", "-q", "--allow-empty", "-m", message])?;
        self.run(repo_root, &["tag", tag])?;
        Ok(())
    }

    fn delete_branch(&self, repo_root: &Path, branch: &str) -> MirResult<()> {
        let output = self.run(repo_root, &["branch", "-D", branch])?;
        if !output.is_empty() {
            log::info!("{}", String::from_utf8_lossy(&output).trim());
        }
        Ok(())
    }

    fn delete_tag(&self, repo_root: &Path, tag: &str) -> MirResult<()> {
        self.run(repo_root, &["tag", "-d", tag]).map(|_| ())
    }
}

/// In-memory backend for tests: revisions map to file sets.
#[cfg(test)]
pub(crate) mod memory {
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::path::Path;

    use super::VcsBackend;
    use crate::error::{MirError, MirResult};

    type Files = HashMap<String, Vec<u8>>;

    #[derive(Debug, Default)]
    pub(crate) struct MemoryBackend {
        /// Branch name to files at its head
        pub(crate) branches: RefCell<HashMap<String, Files>>,
        /// Tag to files at the tagged commit
        pub(crate) tags: RefCell<HashMap<String, Files>>,
    }

    impl VcsBackend for MemoryBackend {
        fn read_file(&self, _repo_root: &Path, rev: &str, file_name: &str) -> MirResult<Vec<u8>> {
            let files = if rev.contains('@') {
                self.tags.borrow().get(rev).cloned()
            } else {
                self.branches.borrow().get(rev).cloned()
            };
            files
                .and_then(|f| f.get(file_name).cloned())
                .ok_or_else(|| MirError::Vcs(format!("no {} at {}", file_name, rev)))
        }

        fn commit_files(
            &self,
            _repo_root: &Path,
            branch: &str,
            base_rev: Option<&str>,
            files: &[(String, Vec<u8>)],
            _message: &str,
            tag: &str,
        ) -> MirResult<()> {
            let mut current = match base_rev {
                Some(base) if base.contains('@') => self.tags.borrow().get(base).cloned(),
                Some(base) => self.branches.borrow().get(base).cloned(),
                None => self.branches.borrow().get(branch).cloned(),
            }
            .unwrap_or_default();
            for (name, content) in files {
                current.insert(name.clone(), content.clone());
            }
            self.branches
                .borrow_mut()
                .insert(branch.to_string(), current.clone());
            self.tags.borrow_mut().insert(tag.to_string(), current);
            Ok(())
        }

        fn delete_branch(&self, _repo_root: &Path, branch: &str) -> MirResult<()> {
            self.branches
                .borrow_mut()
                .remove(branch)
                .map(|_| ())
                .ok_or_else(|| MirError::Vcs(format!("no branch {}", branch)))
        }

        fn delete_tag(&self, _repo_root: &Path, tag: &str) -> MirResult<()> {
            self.tags
                .borrow_mut()
                .remove(tag)
                .map(|_| ())
                .ok_or_else(|| MirError::Vcs(format!("no tag {}", tag)))
        }
    }
}
