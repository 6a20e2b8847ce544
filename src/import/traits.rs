//! Trait definitions for annotation importers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::class_ids::ClassIdRegistry;
use crate::error::MirResult;
use crate::model::{AnnoType, AssetId, ImageCustomKeys, TaskAnnotations};

use super::{NameCounts, UnknownTypesStrategy};

/// Importer of one external annotation layout into [`TaskAnnotations`].
///
/// Per-asset problems (missing or corrupt files) are recorded as warnings and
/// the asset is skipped; structural problems are returned as errors.
pub trait AnnotationImporter: Send + Sync {
    /// Unique identifier (e.g. "voc-xml", "seg-mask").
    fn id(&self) -> &'static str;

    /// Human-readable name for logs.
    fn display_name(&self) -> &'static str;

    /// Whether this importer produces annotations of `anno_type`.
    fn supports(&self, anno_type: AnnoType) -> bool;

    /// Import every asset of `ctx.asset_files` found under `dir` into `target`.
    ///
    /// Returns the number of assets imported.
    fn import_dir(
        &self,
        ctx: &mut ImportContext<'_>,
        dir: &Path,
        target: &mut TaskAnnotations,
        image_cks: &mut BTreeMap<AssetId, ImageCustomKeys>,
    ) -> MirResult<usize>;
}

/// Shared state of one import call.
pub struct ImportContext<'a> {
    pub registry: &'a mut ClassIdRegistry,
    pub strategy: UnknownTypesStrategy,
    /// Asset id to base file name (no extension)
    pub asset_files: &'a BTreeMap<AssetId, String>,
    /// Unknown class names with occurrence counts
    pub unknown_names: NameCounts,
    pub warnings: Vec<ImportWarning>,
}

impl<'a> ImportContext<'a> {
    pub fn new(
        registry: &'a mut ClassIdRegistry,
        strategy: UnknownTypesStrategy,
        asset_files: &'a BTreeMap<AssetId, String>,
    ) -> Self {
        Self {
            registry,
            strategy,
            asset_files,
            unknown_names: NameCounts::default(),
            warnings: Vec::new(),
        }
    }

    /// Log a skipped asset and keep it for the report.
    pub fn skip_asset(&mut self, path: &Path, message: impl Into<String>) {
        let warning = ImportWarning::new(message).with_path(path);
        log::warn!("Skipping {:?}: {}", path, warning.message);
        self.warnings.push(warning);
    }
}

/// Asset skipped during import.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportWarning {
    /// Annotation file this warning relates to (if applicable).
    pub path: Option<PathBuf>,

    /// Human-readable warning message.
    pub message: String,
}

impl ImportWarning {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            path: None,
            message: message.into(),
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }
}
