use std::collections::BTreeMap;
use std::path::PathBuf;

use thiserror::Error;

/// Error type returned by caller-supplied upgrade functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Invalid label file {path:?}: {message}")]
    InvalidUserLabelFile { path: PathBuf, message: String },

    #[error("Invalid user space versions: {versions:?}")]
    InvalidUserSpaceVersions {
        /// Declared version to the users declaring it
        versions: BTreeMap<String, Vec<String>>,
    },

    #[error("Backup directory not empty: {0:?}")]
    BackupDirNotEmpty(PathBuf),

    #[error("Sandbox version {0} not supported")]
    SandboxVersionNotSupported(String),

    #[error("Upgrade of {repo:?} failed: {source}")]
    UpgradeFailed {
        repo: PathBuf,
        #[source]
        source: BoxError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            SandboxError::InvalidUserLabelFile { .. } => 170_001,
            SandboxError::InvalidUserSpaceVersions { .. } => 170_002,
            SandboxError::BackupDirNotEmpty(_) => 170_003,
            SandboxError::SandboxVersionNotSupported(_) => 170_004,
            SandboxError::UpgradeFailed { .. } => 170_005,
            SandboxError::Io(_) => 170_006,
        }
    }
}

impl From<walkdir::Error> for SandboxError {
    fn from(e: walkdir::Error) -> Self {
        SandboxError::Io(e.into())
    }
}

pub type Result<T> = std::result::Result<T, SandboxError>;
