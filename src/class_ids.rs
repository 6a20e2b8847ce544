//! Class-identifier registry.
//!
//! A persisted, append-only mapping between class names and integer ids.
//! Ids are dense, assigned at append time and never reused. Lookups go through
//! a canonical form of the name (trimmed, lower-cased) and resolve aliases to
//! the owning id.
//!
//! # Label file
//!
//! ```yaml
//! version: 2.0.0
//! labels:
//!   - id: 0
//!     name: cat
//!     aliases: [kitty]
//!   - id: 1
//!     name: dog
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MirError, MirResult};

/// Schema version written into newly created label files.
pub const LABEL_FILE_VERSION: &str = "2.0.0";

/// Id returned by lookups that do not resolve.
pub const UNKNOWN_CLASS_ID: i32 = -1;

/// One registered class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEntry {
    pub id: i32,
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub aliases: BTreeSet<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct LabelFile {
    #[serde(default = "default_version")]
    version: String,
    #[serde(default)]
    labels: Vec<LabelEntry>,
}

fn default_version() -> String {
    LABEL_FILE_VERSION.to_string()
}

/// Canonical form used for every name lookup.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Name/id table of one repository (or one user space).
///
/// Single-writer: callers must not mutate the same label file from two
/// registries at once.
#[derive(Debug, Clone)]
pub struct ClassIdRegistry {
    labels: Vec<LabelEntry>,
    version: String,
    path: Option<PathBuf>,
    /// Main names and aliases, canonical form, to id
    name_to_id: HashMap<String, i32>,
}

impl ClassIdRegistry {
    /// Create an empty registry that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            labels: Vec::new(),
            version: default_version(),
            path: None,
            name_to_id: HashMap::new(),
        }
    }

    /// Create an in-memory registry holding `names` with ids `0..n`.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> MirResult<Self> {
        let mut registry = Self::in_memory();
        for name in names {
            registry.add(name.as_ref())?;
        }
        Ok(registry)
    }

    /// Load the label file at `path`, creating an empty one if it does not
    /// exist yet.
    pub fn load_or_create(path: impl AsRef<Path>) -> MirResult<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            log::info!("Creating label file {:?}", path);
            let mut registry = Self::in_memory();
            registry.path = Some(path.to_path_buf());
            registry.save()?;
            return Ok(registry);
        }

        let content = std::fs::read_to_string(path)?;
        let file: LabelFile = if content.trim().is_empty() {
            LabelFile {
                version: default_version(),
                labels: Vec::new(),
            }
        } else {
            serde_yaml::from_str(&content)
                .map_err(|e| MirError::invalid_label_file(path, e.to_string()))?
        };

        let mut registry = Self::in_memory();
        registry.version = file.version;
        registry.path = Some(path.to_path_buf());
        for (expected_id, entry) in file.labels.into_iter().enumerate() {
            if entry.id != expected_id as i32 {
                return Err(MirError::invalid_label_file(
                    path,
                    format!("id {} out of order, expected {}", entry.id, expected_id),
                ));
            }
            registry.insert_entry(entry).map_err(|e| match e {
                MirError::InvalidArgs { message } => MirError::invalid_label_file(path, message),
                other => other,
            })?;
        }

        log::debug!(
            "Loaded {} class ids from {:?} (version {})",
            registry.labels.len(),
            path,
            registry.version
        );
        Ok(registry)
    }

    /// Write the registry back to its label file. No-op for in-memory registries.
    pub fn save(&self) -> MirResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = LabelFile {
            version: self.version.clone(),
            labels: self.labels.clone(),
        };
        std::fs::write(path, serde_yaml::to_string(&file)?)?;
        Ok(())
    }

    fn insert_entry(&mut self, entry: LabelEntry) -> MirResult<()> {
        let mut keys = vec![normalize_name(&entry.name)];
        keys.extend(entry.aliases.iter().map(|a| normalize_name(a)));
        for key in &keys {
            if self.name_to_id.contains_key(key) {
                return Err(MirError::invalid_args(format!("duplicate class name: {}", key)));
            }
        }
        for key in keys {
            self.name_to_id.insert(key, entry.id);
        }
        self.labels.push(entry);
        Ok(())
    }

    /// Resolve a name or alias to `(id, canonical main name)`.
    ///
    /// Unknown names return `(-1, normalized name)`.
    pub fn resolve(&self, name: &str) -> (i32, String) {
        let key = normalize_name(name);
        match self.name_to_id.get(&key) {
            Some(&id) => (id, self.labels[id as usize].name.clone()),
            None => (UNKNOWN_CLASS_ID, key),
        }
    }

    /// Append `name` with the next unused id and persist the registry.
    ///
    /// A name that already resolves returns its existing id.
    pub fn add(&mut self, name: &str) -> MirResult<(i32, String)> {
        let (id, main_name) = self.resolve(name);
        if id >= 0 {
            return Ok((id, main_name));
        }
        if main_name.is_empty() {
            return Err(MirError::invalid_args("empty class name"));
        }

        let id = self.labels.len() as i32;
        self.insert_entry(LabelEntry {
            id,
            name: main_name.clone(),
            aliases: BTreeSet::new(),
        })?;
        self.save()?;
        log::debug!("Registered class '{}' as id {}", main_name, id);
        Ok((id, main_name))
    }

    /// Add every name not registered yet; returns the ids of all `names`.
    pub fn add_main_names<S: AsRef<str>>(&mut self, names: &[S]) -> MirResult<Vec<i32>> {
        let mut ids = Vec::with_capacity(names.len());
        let mut dirty = false;
        for name in names {
            let (id, main_name) = self.resolve(name.as_ref());
            if id >= 0 {
                ids.push(id);
                continue;
            }
            if main_name.is_empty() {
                return Err(MirError::invalid_args("empty class name"));
            }
            let id = self.labels.len() as i32;
            self.insert_entry(LabelEntry {
                id,
                name: main_name,
                aliases: BTreeSet::new(),
            })?;
            ids.push(id);
            dirty = true;
        }
        if dirty {
            self.save()?;
        }
        Ok(ids)
    }

    /// Attach an alias to an existing class.
    pub fn add_alias(&mut self, id: i32, alias: &str) -> MirResult<()> {
        let key = normalize_name(alias);
        if key.is_empty() {
            return Err(MirError::invalid_args("empty alias"));
        }
        if let Some(&owner) = self.name_to_id.get(&key) {
            if owner == id {
                return Ok(());
            }
            return Err(MirError::invalid_args(format!(
                "alias '{}' already belongs to class {}",
                key, owner
            )));
        }
        let entry = self
            .labels
            .get_mut(usize::try_from(id).map_err(|_| MirError::not_found(format!("class id {}", id)))?)
            .ok_or_else(|| MirError::not_found(format!("class id {}", id)))?;
        entry.aliases.insert(key.clone());
        self.name_to_id.insert(key, id);
        self.save()
    }

    /// Resolve many names at once.
    ///
    /// Returns the ids and the canonical names that did not resolve. With
    /// `drop_unknown` the ids omit unknown names, otherwise they hold `-1`.
    pub fn id_for_names<S: AsRef<str>>(&self, names: &[S], drop_unknown: bool) -> (Vec<i32>, Vec<String>) {
        let mut ids = Vec::with_capacity(names.len());
        let mut unknown = Vec::new();
        for name in names {
            let (id, main_name) = self.resolve(name.as_ref());
            if id < 0 {
                unknown.push(main_name);
                if drop_unknown {
                    continue;
                }
            }
            ids.push(id);
        }
        (ids, unknown)
    }

    /// Main name of a registered id.
    pub fn main_name_for_id(&self, id: i32) -> MirResult<&str> {
        usize::try_from(id)
            .ok()
            .and_then(|idx| self.labels.get(idx))
            .map(|entry| entry.name.as_str())
            .ok_or_else(|| MirError::not_found(format!("class id {}", id)))
    }

    pub fn all_ids(&self) -> Vec<i32> {
        self.labels.iter().map(|l| l.id).collect()
    }

    pub fn all_main_names(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.name.clone()).collect()
    }

    pub fn labels(&self) -> &[LabelEntry] {
        &self.labels
    }

    /// Declared schema version of the label file.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
