//! Error types for repository and annotation operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading, importing, merging or saving
/// annotation records.
///
/// Every variant maps to a stable numeric code (see [`MirError::code`]) that
/// outer layers translate into exit codes or RPC status.
#[derive(Error, Debug)]
pub enum MirError {
    /// Invalid arguments or an unsupported record
    #[error("Invalid args: {message}")]
    InvalidArgs {
        /// Description of the problem
        message: String,
    },

    /// Branch or tag cannot be used for this operation
    #[error("Invalid branch or tag: {name}")]
    InvalidBranchOrTag {
        /// The offending branch or tag
        name: String,
    },

    /// Referenced entity does not exist
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up
        what: String,
    },

    /// Feature is recognised but has no implementation
    #[error("Not implemented: {feature}")]
    NotImplemented {
        /// Name of the missing feature
        feature: String,
    },

    /// Unknown class names found while importing with the `stop` strategy
    #[error("Unknown types: {names:?}")]
    UnknownTypes {
        /// Canonical names that could not be resolved
        names: Vec<String>,
    },

    /// `meta.yaml` exists but cannot be parsed
    #[error("Invalid meta.yaml: {path:?}: {message}")]
    InvalidMetaYaml {
        /// Path of the sidecar file
        path: PathBuf,
        /// Parser message
        message: String,
    },

    /// Host and guest annotation types differ
    #[error("Annotation type mismatch: host {host}, guest {guest}")]
    InvalidAnnoType {
        /// Host task annotation type
        host: String,
        /// Guest task annotation type
        guest: String,
    },

    /// Joint asset ids found while merging with the `stop` strategy
    #[error("Merge conflict in {section}: {count} joint asset(s)")]
    MergeConflict {
        /// Which pair conflicted (prediction, ground truth, image cks)
        section: &'static str,
        /// Number of joint asset ids
        count: usize,
    },

    /// Label file cannot be read or written
    #[error("Invalid label file {path:?}: {message}")]
    InvalidLabelFile {
        /// Path of the label file
        path: PathBuf,
        /// Description of the problem
        message: String,
    },

    /// Revision string is not `branch@task-id`
    #[error("Invalid revision: {0}")]
    InvalidRevision(String),

    /// Version-control backend failure
    #[error("VCS error: {0}")]
    Vcs(String),

    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing or serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing or serialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// XML parsing error
    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    /// Image decode or encode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl MirError {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            MirError::InvalidArgs { .. } => 160_002,
            MirError::InvalidBranchOrTag { .. } => 160_003,
            MirError::NotFound { .. } => 160_004,
            MirError::NotImplemented { .. } => 160_005,
            MirError::UnknownTypes { .. } => 160_006,
            MirError::InvalidMetaYaml { .. } => 160_007,
            MirError::InvalidAnnoType { .. } => 160_008,
            MirError::MergeConflict { .. } => 160_009,
            MirError::InvalidLabelFile { .. } => 160_010,
            MirError::InvalidRevision(_) => 160_011,
            MirError::Vcs(_) => 160_012,
            MirError::Io(_) => 160_013,
            MirError::Json(_) => 160_014,
            MirError::Yaml(_) => 160_015,
            MirError::Xml(_) => 160_016,
            MirError::Image(_) => 160_017,
        }
    }

    /// Create an invalid args error with a message.
    pub fn invalid_args(message: impl Into<String>) -> Self {
        Self::InvalidArgs {
            message: message.into(),
        }
    }

    /// Create a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    /// Create a not implemented error.
    pub fn not_implemented(feature: impl Into<String>) -> Self {
        Self::NotImplemented {
            feature: feature.into(),
        }
    }

    /// Create an invalid label file error.
    pub fn invalid_label_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::InvalidLabelFile {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenience alias used across the crate.
pub type MirResult<T> = Result<T, MirError>;
