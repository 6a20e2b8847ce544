//! Typed record load/save at a revision.

use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::backend::VcsBackend;
use crate::error::{MirError, MirResult};
use crate::model::{
    MirAnnotations, MirContext, MirKeywords, MirMetadatas, MirTasks, Revision, Task,
};

/// Kinds of record stored in every revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MirStorage {
    Metadatas,
    Annotations,
    Keywords,
    Tasks,
    Context,
}

impl MirStorage {
    pub const ALL: [MirStorage; 5] = [
        MirStorage::Metadatas,
        MirStorage::Annotations,
        MirStorage::Keywords,
        MirStorage::Tasks,
        MirStorage::Context,
    ];

    /// File name of this record inside the working copy.
    pub fn file_name(&self) -> &'static str {
        match self {
            MirStorage::Metadatas => "metadatas.mir",
            MirStorage::Annotations => "annotations.mir",
            MirStorage::Keywords => "keywords.mir",
            MirStorage::Tasks => "tasks.mir",
            MirStorage::Context => "context.mir",
        }
    }
}

/// A record type that lives in one storage file.
pub trait StorageRecord: Serialize + DeserializeOwned {
    const STORAGE: MirStorage;
}

impl StorageRecord for MirMetadatas {
    const STORAGE: MirStorage = MirStorage::Metadatas;
}

impl StorageRecord for MirAnnotations {
    const STORAGE: MirStorage = MirStorage::Annotations;
}

impl StorageRecord for MirKeywords {
    const STORAGE: MirStorage = MirStorage::Keywords;
}

impl StorageRecord for MirTasks {
    const STORAGE: MirStorage = MirStorage::Tasks;
}

impl StorageRecord for MirContext {
    const STORAGE: MirStorage = MirStorage::Context;
}

/// Any record, as returned by [`StorageOps::load_many`].
#[derive(Debug, Clone, PartialEq)]
pub enum MirRecord {
    Metadatas(MirMetadatas),
    Annotations(MirAnnotations),
    Keywords(MirKeywords),
    Tasks(MirTasks),
    Context(MirContext),
}

impl MirRecord {
    pub fn storage(&self) -> MirStorage {
        match self {
            MirRecord::Metadatas(_) => MirStorage::Metadatas,
            MirRecord::Annotations(_) => MirStorage::Annotations,
            MirRecord::Keywords(_) => MirStorage::Keywords,
            MirRecord::Tasks(_) => MirStorage::Tasks,
            MirRecord::Context(_) => MirStorage::Context,
        }
    }
}

/// What [`StorageOps::save_and_commit`] writes.
#[derive(Debug)]
pub struct SaveRequest<'a> {
    pub repo_root: &'a Path,
    pub branch: &'a str,
    /// Revision the new commit starts from; its task history is inherited
    pub base: Option<Revision>,
    pub task: Task,
    pub metadatas: &'a MirMetadatas,
    pub annotations: &'a MirAnnotations,
}

/// Data-access layer over a [`VcsBackend`]. No business logic.
pub struct StorageOps<'b, B: VcsBackend + ?Sized> {
    backend: &'b B,
}

impl<'b, B: VcsBackend + ?Sized> StorageOps<'b, B> {
    pub fn new(backend: &'b B) -> Self {
        Self { backend }
    }

    /// Load one typed record at `branch` (or `branch@task_id`).
    pub fn load<T: StorageRecord>(
        &self,
        repo_root: &Path,
        branch: &str,
        task_id: Option<&str>,
    ) -> MirResult<T> {
        let rev = Revision::join(branch, task_id.unwrap_or_default());
        let bytes = self
            .backend
            .read_file(repo_root, &rev, T::STORAGE.file_name())?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Load a record selected at runtime.
    pub fn load_single(
        &self,
        repo_root: &Path,
        branch: &str,
        storage: MirStorage,
        task_id: Option<&str>,
    ) -> MirResult<MirRecord> {
        Ok(match storage {
            MirStorage::Metadatas => MirRecord::Metadatas(self.load(repo_root, branch, task_id)?),
            MirStorage::Annotations => {
                MirRecord::Annotations(self.load(repo_root, branch, task_id)?)
            }
            MirStorage::Keywords => MirRecord::Keywords(self.load(repo_root, branch, task_id)?),
            MirStorage::Tasks => MirRecord::Tasks(self.load(repo_root, branch, task_id)?),
            MirStorage::Context => MirRecord::Context(self.load(repo_root, branch, task_id)?),
        })
    }

    /// Load several records from the same revision, in request order.
    pub fn load_many(
        &self,
        repo_root: &Path,
        branch: &str,
        storages: &[MirStorage],
        task_id: Option<&str>,
    ) -> MirResult<Vec<MirRecord>> {
        storages
            .iter()
            .map(|storage| self.load_single(repo_root, branch, *storage, task_id))
            .collect()
    }

    /// Write all five records for a new task and commit them, tagged
    /// `branch@task_id`.
    ///
    /// Keywords and context are derived from the metadatas and annotations.
    pub fn save_and_commit(&self, request: SaveRequest<'_>) -> MirResult<()> {
        let task_id = request.task.task_id.clone();
        if task_id.is_empty() {
            return Err(MirError::invalid_args("empty task id"));
        }
        if request.branch.is_empty() {
            return Err(MirError::invalid_args("empty branch"));
        }

        let base_rev = request.base.as_ref().map(Revision::to_string);
        let mut tasks: MirTasks = match &request.base {
            Some(base) => self.load(request.repo_root, &base.branch, base.task_id.as_deref())?,
            None => MirTasks::default(),
        };
        let message = format!("task {}: {}", task_id, request.task.name);
        tasks.push_head(request.task);

        let keywords = MirKeywords::from_annotations(request.annotations);
        let context = MirContext::from_annotations(request.metadatas, request.annotations);

        let files = vec![
            encode(request.metadatas)?,
            encode(request.annotations)?,
            encode(&keywords)?,
            encode(&tasks)?,
            encode(&context)?,
        ];

        let tag = Revision::join(request.branch, &task_id);
        self.backend.commit_files(
            request.repo_root,
            request.branch,
            base_rev.as_deref(),
            &files,
            &message,
            &tag,
        )?;
        log::info!(
            "Committed {} ({} assets, {} pred / {} gt objects)",
            tag,
            context.images_cnt,
            context.pred_stats.total_cnt,
            context.gt_stats.total_cnt
        );
        Ok(())
    }
}

fn encode<T: StorageRecord>(record: &T) -> MirResult<(String, Vec<u8>)> {
    Ok((
        T::STORAGE.file_name().to_string(),
        serde_json::to_vec(record)?,
    ))
}
