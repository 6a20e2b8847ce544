//! Branch housekeeping.

use std::path::Path;

use crate::error::{MirError, MirResult};
use crate::model::{MirTasks, Revision};
use crate::storage::{StorageOps, VcsBackend};

/// Branch that can never be deleted.
pub const MASTER_BRANCH: &str = "master";

/// Force-delete `branch` together with the tag of its head task.
pub fn delete_branch<B: VcsBackend + ?Sized>(backend: &B, repo_root: &Path, branch: &str) -> MirResult<()> {
    if branch.is_empty() {
        return Err(MirError::invalid_args("empty branch"));
    }
    if branch == MASTER_BRANCH {
        return Err(MirError::InvalidBranchOrTag {
            name: branch.to_string(),
        });
    }

    let tasks: MirTasks = StorageOps::new(backend).load(repo_root, branch, None)?;
    backend.delete_branch(repo_root, branch)?;
    log::info!("deleted branch {}", branch);

    if !tasks.head_task_id.is_empty() {
        let tag = Revision::join(branch, &tasks.head_task_id);
        backend.delete_tag(repo_root, &tag)?;
        log::debug!("deleted tag {}", tag);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MirAnnotations, MirMetadatas, Task, TaskType};
    use crate::storage::SaveRequest;
    use crate::storage::memory::MemoryBackend;

    fn commit(backend: &MemoryBackend, branch: &str, task_id: &str) {
        StorageOps::new(backend)
            .save_and_commit(SaveRequest {
                repo_root: Path::new("/repo"),
                branch,
                base: None,
                task: Task::new(task_id, TaskType::Importing, "import"),
                metadatas: &MirMetadatas::default(),
                annotations: &MirAnnotations::new(),
            })
            .unwrap();
    }

    #[test]
    fn test_delete_branch_and_head_tag() {
        let backend = MemoryBackend::default();
        commit(&backend, "a", "t0");
        commit(&backend, "a", "t1");
        commit(&backend, "b", "t2");

        delete_branch(&backend, Path::new("/repo"), "a").unwrap();

        assert!(!backend.branches.borrow().contains_key("a"));
        assert!(backend.branches.borrow().contains_key("b"));
        let tags = backend.tags.borrow();
        assert!(!tags.contains_key("a@t1"));
        // Older task tags stay reachable
        assert!(tags.contains_key("a@t0"));
        assert!(tags.contains_key("b@t2"));
    }

    #[test]
    fn test_master_is_protected() {
        let backend = MemoryBackend::default();
        commit(&backend, "master", "t0");

        let err = delete_branch(&backend, Path::new("/repo"), "master").err().unwrap();
        assert!(matches!(err, MirError::InvalidBranchOrTag { .. }));
        assert!(backend.branches.borrow().contains_key("master"));
    }

    #[test]
    fn test_missing_branch() {
        let backend = MemoryBackend::default();
        let err = delete_branch(&backend, Path::new("/repo"), "nope").err().unwrap();
        assert!(matches!(err, MirError::Vcs(_)));
    }
}
