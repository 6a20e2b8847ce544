//! Record storage on top of a version-controlled working copy.

mod backend;
mod ops;

pub use backend::{GitCli, VcsBackend};
pub use ops::{MirRecord, MirStorage, SaveRequest, StorageOps, StorageRecord};

#[cfg(test)]
pub(crate) use backend::memory;
