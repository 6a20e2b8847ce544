//! End-to-end migration tests on temporary sandboxes.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use annostore_sandbox::{
    BoxError, FsSnapshotStore, MigrationState, SandboxError, SandboxLayout, SandboxMigrator,
    SnapshotStore, UpgradeFn,
};
use tempfile::TempDir;
use walkdir::WalkDir;

/// Two users, three repos: 0001/000001, 0001/000002, 0002/000001.
fn sandbox(versions: [&str; 2]) -> TempDir {
    let dir = TempDir::new().unwrap();
    for (user, version) in ["0001", "0002"].iter().zip(versions) {
        let user_dir = dir.path().join(user);
        std::fs::create_dir_all(&user_dir).unwrap();
        std::fs::write(
            user_dir.join("labels.yaml"),
            format!("version: {}\nlabels: []\n", version),
        )
        .unwrap();
    }
    for (user, repo) in [("0001", "000001"), ("0001", "000002"), ("0002", "000001")] {
        let repo_dir = dir.path().join(user).join(repo);
        std::fs::create_dir_all(repo_dir.join(".git")).unwrap();
        std::fs::write(repo_dir.join(".git").join("HEAD"), "ref: refs/heads/master\n").unwrap();
        std::fs::write(repo_dir.join("annotations.mir"), format!("{}/{}", user, repo)).unwrap();
    }
    dir
}

/// Relative path to content (`None` for directories) of every entry.
fn tree(root: &Path) -> BTreeMap<PathBuf, Option<Vec<u8>>> {
    WalkDir::new(root)
        .into_iter()
        .map(|entry| entry.unwrap())
        .map(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let content = entry
                .file_type()
                .is_file()
                .then(|| std::fs::read(entry.path()).unwrap());
            (relative, content)
        })
        .collect()
}

fn rewrite(repo: &Path) -> Result<(), BoxError> {
    std::fs::write(repo.join("annotations.mir"), "upgraded")?;
    std::fs::write(repo.join("upgraded.flag"), "1")?;
    Ok(())
}

#[test]
fn test_successful_migration() {
    let dir = sandbox(["1.1.0", "1.1.0"]);
    let visited = RefCell::new(Vec::new());
    let record = |repo: &Path| -> Result<(), BoxError> {
        visited.borrow_mut().push(repo.to_path_buf());
        Ok(())
    };
    let upgrades: [UpgradeFn<'_>; 2] = [&rewrite, &record];

    let mut migrator = SandboxMigrator::new(dir.path(), SandboxLayout::default())
        .with_supported_versions(["1.1.0"]);
    let version = migrator.migrate(&upgrades).unwrap();

    assert_eq!(version, "1.1.0");
    assert_eq!(migrator.state(), MigrationState::Idle);
    assert_eq!(
        migrator.transitions(),
        &[
            MigrationState::BackingUp,
            MigrationState::Upgrading,
            MigrationState::CleaningUp,
            MigrationState::Idle,
        ]
    );
    assert_eq!(
        *visited.borrow(),
        vec![
            dir.path().join("0001").join("000001"),
            dir.path().join("0001").join("000002"),
            dir.path().join("0002").join("000001"),
        ]
    );
    for (user, repo) in [("0001", "000001"), ("0001", "000002"), ("0002", "000001")] {
        let repo_dir = dir.path().join(user).join(repo);
        assert_eq!(std::fs::read_to_string(repo_dir.join("annotations.mir")).unwrap(), "upgraded");
        assert!(repo_dir.join("upgraded.flag").exists());
    }
    assert!(!dir.path().join("backup").exists());
}

#[test]
fn test_failure_on_second_repo_rolls_back_everything() {
    let dir = sandbox(["1.1.0", "1.1.0"]);
    let before = tree(dir.path());
    let calls = Cell::new(0);
    let fail_second = |repo: &Path| -> Result<(), BoxError> {
        calls.set(calls.get() + 1);
        if calls.get() == 2 {
            return Err("schema conversion failed".into());
        }
        rewrite(repo)
    };
    let upgrades: [UpgradeFn<'_>; 1] = [&fail_second];

    let mut migrator = SandboxMigrator::new(dir.path(), SandboxLayout::default());
    let err = migrator.migrate(&upgrades).err().unwrap();

    match &err {
        SandboxError::UpgradeFailed { repo, source } => {
            assert_eq!(repo, &dir.path().join("0001").join("000002"));
            assert_eq!(source.to_string(), "schema conversion failed");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(err.code(), 170_005);
    assert_eq!(calls.get(), 2);
    assert_eq!(tree(dir.path()), before);
    assert!(!dir.path().join("backup").exists());
    assert!(migrator.transitions().contains(&MigrationState::RollingBack));
    assert_eq!(migrator.state(), MigrationState::Idle);
}

#[test]
fn test_mixed_versions_leave_sandbox_untouched() {
    let dir = sandbox(["1.1.0", "2.0.0"]);
    let before = tree(dir.path());
    let upgrades: [UpgradeFn<'_>; 1] = [&rewrite];

    let mut migrator = SandboxMigrator::new(dir.path(), SandboxLayout::default());
    let err = migrator.migrate(&upgrades).err().unwrap();

    assert!(matches!(err, SandboxError::InvalidUserSpaceVersions { .. }));
    assert_eq!(tree(dir.path()), before);
    assert!(!dir.path().join("backup").exists());
    assert!(migrator.transitions().is_empty());
}

#[test]
fn test_unsupported_version() {
    let dir = sandbox(["2.0.0", "2.0.0"]);
    let before = tree(dir.path());
    let upgrades: [UpgradeFn<'_>; 1] = [&rewrite];

    let mut migrator = SandboxMigrator::new(dir.path(), SandboxLayout::default())
        .with_supported_versions(["1.1.0"]);
    let err = migrator.migrate(&upgrades).err().unwrap();

    assert_eq!(err.code(), 170_004);
    assert_eq!(tree(dir.path()), before);
}

#[test]
fn test_non_empty_backup_dir() {
    let dir = sandbox(["1.1.0", "1.1.0"]);
    std::fs::create_dir_all(dir.path().join("backup")).unwrap();
    std::fs::write(dir.path().join("backup").join("stale"), "old").unwrap();
    let before = tree(dir.path());
    let upgrades: [UpgradeFn<'_>; 1] = [&rewrite];

    let mut migrator = SandboxMigrator::new(dir.path(), SandboxLayout::default());
    let err = migrator.migrate(&upgrades).err().unwrap();

    assert!(matches!(err, SandboxError::BackupDirNotEmpty(_)));
    assert_eq!(tree(dir.path()), before);
    assert_eq!(migrator.state(), MigrationState::Idle);
}

/// Delegates to the file system and counts snapshot operations.
#[derive(Default)]
struct CountingStore {
    saves: Cell<usize>,
    restores: Cell<usize>,
}

impl SnapshotStore for CountingStore {
    fn prepare(&self, backup_dir: &Path) -> annostore_sandbox::Result<()> {
        FsSnapshotStore.prepare(backup_dir)
    }

    fn save(&self, live: &Path, snapshot: &Path) -> annostore_sandbox::Result<()> {
        self.saves.set(self.saves.get() + 1);
        FsSnapshotStore.save(live, snapshot)
    }

    fn restore(&self, snapshot: &Path, live: &Path) -> annostore_sandbox::Result<()> {
        self.restores.set(self.restores.get() + 1);
        FsSnapshotStore.restore(snapshot, live)
    }

    fn discard(&self, backup_dir: &Path) -> annostore_sandbox::Result<()> {
        FsSnapshotStore.discard(backup_dir)
    }
}

#[test]
fn test_rollback_restores_every_user() {
    let dir = sandbox(["1.1.0", "1.1.0"]);
    let always_fail = |_: &Path| -> Result<(), BoxError> { Err("nope".into()) };
    let upgrades: [UpgradeFn<'_>; 1] = [&always_fail];

    let mut migrator =
        SandboxMigrator::with_store(dir.path(), SandboxLayout::default(), CountingStore::default());
    assert!(migrator.migrate(&upgrades).is_err());

    // One snapshot and one restore per user, even though only the first repo failed
    assert_eq!(migrator.store().saves.get(), 2);
    assert_eq!(migrator.store().restores.get(), 2);
    assert!(!dir.path().join("backup").exists());
}
