//! Operations over whole annotation sets.
//!
//! - [`merge_annotations`]: reconcile two sets under a [`MergeStrategy`]
//! - [`copy_annotations`]: translate class ids between label files
//! - [`filter_annotations`], [`sampling_annotations`], [`mining_annotations`]:
//!   derive subsets
//! - [`delete_branch`]: remove a branch and its head tag

mod branch;
mod filter;
mod merge;
mod mining;
mod remap;

pub use branch::{MASTER_BRANCH, delete_branch};
pub use filter::{copy_pred_meta, filter_annotations, sampling_annotations};
pub use merge::{AssetIdPartition, MergeStrategy, match_asset_ids, merge_annotations};
pub use mining::{INFER_RESULT_FILE, ModelStorage, mining_annotations};
pub use remap::{ClassIdTable, copy_annotations, remap_annotations, translation_table};
