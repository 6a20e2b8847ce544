//! Schema migration of a whole annotation store sandbox.
//!
//! A sandbox holds one directory per user (`<sandbox>/<user id>/`), each with
//! a label file and one git working copy per repository
//! (`<sandbox>/<user id>/<repo id>/.git`). [`SandboxMigrator`] upgrades every
//! repository of every user, or none of them.

pub mod error;
pub mod layout;
pub mod migrate;
pub mod snapshot;

pub use error::{BoxError, Result, SandboxError};
pub use layout::{DEFAULT_SANDBOX_VERSION, SandboxLayout, UserRepos};
pub use migrate::{MigrationState, SandboxMigrator, UpgradeFn};
pub use snapshot::{FsSnapshotStore, SnapshotStore};
