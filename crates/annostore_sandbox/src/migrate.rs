//! All-or-nothing upgrade of every repository in a sandbox.
//!
//! ```text
//! Idle -> BackingUp -> Upgrading -> CleaningUp  -> Idle
//!                                \-> RollingBack -> Idle
//! ```
//!
//! Every user directory is snapshotted before the first upgrade runs. A
//! failure in any repository restores all users from their snapshots.

use std::path::{Path, PathBuf};

use crate::error::{BoxError, Result, SandboxError};
use crate::layout::{SandboxLayout, UserRepos};
use crate::snapshot::{FsSnapshotStore, SnapshotStore};

/// Upgrade step applied to one repository root.
pub type UpgradeFn<'a> = &'a dyn Fn(&Path) -> std::result::Result<(), BoxError>;

/// Phase of a migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MigrationState {
    #[default]
    Idle,
    BackingUp,
    Upgrading,
    CleaningUp,
    RollingBack,
}

pub struct SandboxMigrator<S: SnapshotStore = FsSnapshotStore> {
    root: PathBuf,
    layout: SandboxLayout,
    store: S,
    /// Versions a migration may start from; empty accepts any
    supported_versions: Vec<String>,
    state: MigrationState,
    transitions: Vec<MigrationState>,
}

impl SandboxMigrator<FsSnapshotStore> {
    pub fn new(root: impl Into<PathBuf>, layout: SandboxLayout) -> Self {
        Self::with_store(root, layout, FsSnapshotStore)
    }
}

impl<S: SnapshotStore> SandboxMigrator<S> {
    pub fn with_store(root: impl Into<PathBuf>, layout: SandboxLayout, store: S) -> Self {
        Self {
            root: root.into(),
            layout,
            store,
            supported_versions: Vec::new(),
            state: MigrationState::Idle,
            transitions: Vec::new(),
        }
    }

    /// Only migrate sandboxes currently at one of `versions`.
    pub fn with_supported_versions<V: Into<String>>(mut self, versions: impl IntoIterator<Item = V>) -> Self {
        self.supported_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> MigrationState {
        self.state
    }

    /// Every state entered by the last [`migrate`](Self::migrate) call.
    pub fn transitions(&self) -> &[MigrationState] {
        &self.transitions
    }

    /// Whether a migration may start from `version`.
    pub fn supports(&self, version: &str) -> bool {
        self.supported_versions.is_empty() || self.supported_versions.iter().any(|v| v == version)
    }

    /// Version shared by all users of the sandbox.
    pub fn detect_version(&self) -> Result<String> {
        self.layout.detect_version(&self.root)
    }

    /// Run `upgrades`, in order, against every repository of every user.
    ///
    /// Returns the version the sandbox was migrated from. Version checks and
    /// the backup directory check happen before any data is touched. On an
    /// upgrade failure every user directory is restored and the upgrade error
    /// is returned.
    pub fn migrate(&mut self, upgrades: &[UpgradeFn<'_>]) -> Result<String> {
        self.transitions.clear();

        let version = self.detect_version()?;
        if !self.supports(&version) {
            return Err(SandboxError::SandboxVersionNotSupported(version));
        }
        let users = self.layout.discover(&self.root)?;
        let backup_dir = self.layout.backup_dir(&self.root);

        self.enter(MigrationState::BackingUp);
        if let Err(e) = self.store.prepare(&backup_dir) {
            self.enter(MigrationState::Idle);
            return Err(e);
        }
        if let Err(e) = self.backup(&users, &backup_dir) {
            log::error!("backup failed: {}", e);
            let discarded = self.store.discard(&backup_dir);
            self.enter(MigrationState::Idle);
            discarded?;
            return Err(e);
        }

        self.enter(MigrationState::Upgrading);
        if let Err(e) = self.upgrade_all(&users, upgrades) {
            log::error!("{}, rolling back {} users", e, users.len());
            self.enter(MigrationState::RollingBack);
            let rolled_back = self.roll_back(&users, &backup_dir);
            self.enter(MigrationState::Idle);
            if let Err(rollback_error) = rolled_back {
                log::error!(
                    "rollback failed, backup kept at {:?}: {}",
                    backup_dir,
                    rollback_error
                );
                return Err(rollback_error);
            }
            return Err(e);
        }

        self.enter(MigrationState::CleaningUp);
        let discarded = self.store.discard(&backup_dir);
        self.enter(MigrationState::Idle);
        discarded?;

        log::info!("sandbox {:?} migrated from version {}", self.root, version);
        Ok(version)
    }

    fn enter(&mut self, state: MigrationState) {
        log::debug!("migration state {:?} -> {:?}", self.state, state);
        self.state = state;
        self.transitions.push(state);
    }

    fn backup(&self, users: &UserRepos, backup_dir: &Path) -> Result<()> {
        for user_id in users.keys() {
            let live = self.layout.user_dir(&self.root, user_id);
            self.store.save(&live, &backup_dir.join(user_id))?;
        }
        log::info!("backed up {} users to {:?}", users.len(), backup_dir);
        Ok(())
    }

    fn upgrade_all(&self, users: &UserRepos, upgrades: &[UpgradeFn<'_>]) -> Result<()> {
        for (user_id, repo_ids) in users {
            for repo_id in repo_ids {
                let repo = self.layout.repo_dir(&self.root, user_id, repo_id);
                log::info!("upgrading {:?}", repo);
                for upgrade in upgrades {
                    upgrade(&repo).map_err(|source| SandboxError::UpgradeFailed {
                        repo: repo.clone(),
                        source,
                    })?;
                }
            }
        }
        Ok(())
    }

    fn roll_back(&self, users: &UserRepos, backup_dir: &Path) -> Result<()> {
        for user_id in users.keys() {
            let live = self.layout.user_dir(&self.root, user_id);
            self.store.restore(&backup_dir.join(user_id), &live)?;
        }
        self.store.discard(backup_dir)
    }
}
