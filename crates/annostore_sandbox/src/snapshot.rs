//! Copy-based snapshots backing the migration rollback.

use std::path::Path;

use walkdir::WalkDir;

use crate::error::{Result, SandboxError};

/// Storage able to snapshot and restore directory trees.
///
/// Snapshots live under a backup directory owned by one migration at a time.
pub trait SnapshotStore {
    /// Make sure `backup_dir` exists and is empty.
    ///
    /// Fails with `BackupDirNotEmpty` without touching anything otherwise.
    fn prepare(&self, backup_dir: &Path) -> Result<()>;

    /// Copy the tree at `live` to `snapshot`.
    fn save(&self, live: &Path, snapshot: &Path) -> Result<()>;

    /// Replace the tree at `live` with the one at `snapshot`.
    fn restore(&self, snapshot: &Path, live: &Path) -> Result<()>;

    /// Delete `backup_dir` and every snapshot in it.
    fn discard(&self, backup_dir: &Path) -> Result<()>;
}

/// [`SnapshotStore`] doing full recursive copies on the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSnapshotStore;

impl SnapshotStore for FsSnapshotStore {
    fn prepare(&self, backup_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(backup_dir)?;
        if std::fs::read_dir(backup_dir)?.next().is_some() {
            return Err(SandboxError::BackupDirNotEmpty(backup_dir.to_path_buf()));
        }
        Ok(())
    }

    fn save(&self, live: &Path, snapshot: &Path) -> Result<()> {
        copy_tree(live, snapshot)
    }

    fn restore(&self, snapshot: &Path, live: &Path) -> Result<()> {
        if live.exists() {
            std::fs::remove_dir_all(live)?;
        }
        copy_tree(snapshot, live)
    }

    fn discard(&self, backup_dir: &Path) -> Result<()> {
        if backup_dir.exists() {
            std::fs::remove_dir_all(backup_dir)?;
        }
        Ok(())
    }
}

/// Recursively copy `src` to `dst`. Symlinks are recreated, not followed.
fn copy_tree(src: &Path, dst: &Path) -> Result<()> {
    let mut files = 0usize;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| SandboxError::Io(std::io::Error::other(e)))?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            std::fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
            files += 1;
        }
    }
    log::trace!("copied {} files from {:?} to {:?}", files, src, dst);
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let link = std::fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dst)?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    std::fs::copy(src, dst)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_prepare_requires_empty_dir() {
        let dir = TempDir::new().unwrap();
        let backup = dir.path().join("backup");

        FsSnapshotStore.prepare(&backup).unwrap();
        assert!(backup.is_dir());

        std::fs::write(backup.join("leftover"), "x").unwrap();
        let err = FsSnapshotStore.prepare(&backup).err().unwrap();
        assert!(matches!(err, SandboxError::BackupDirNotEmpty(_)));
        assert!(backup.join("leftover").exists());
    }

    #[test]
    fn test_save_and_restore_tree() {
        let dir = TempDir::new().unwrap();
        let live = dir.path().join("live");
        let snapshot = dir.path().join("snap");
        std::fs::create_dir_all(live.join("a/b")).unwrap();
        std::fs::write(live.join("a/b/file.txt"), "before").unwrap();
        std::fs::write(live.join("top.txt"), "top").unwrap();

        FsSnapshotStore.save(&live, &snapshot).unwrap();
        std::fs::write(live.join("a/b/file.txt"), "after").unwrap();
        std::fs::write(live.join("new.txt"), "new").unwrap();
        FsSnapshotStore.restore(&snapshot, &live).unwrap();

        assert_eq!(std::fs::read_to_string(live.join("a/b/file.txt")).unwrap(), "before");
        assert_eq!(std::fs::read_to_string(live.join("top.txt")).unwrap(), "top");
        assert!(!live.join("new.txt").exists());

        FsSnapshotStore.discard(&snapshot).unwrap();
        assert!(!snapshot.exists());
    }
}
