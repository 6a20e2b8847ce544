//! Annotation import pipeline.
//!
//! Converts per-asset annotation files into [`MirAnnotations`]. Importers
//! implement [`AnnotationImporter`] and are looked up by annotation type in
//! an [`ImporterRegistry`].
//!
//! ## Supported layouts
//!
//! - **VOC XML**: one `<base name>.xml` per asset (detection boxes)
//! - **Segmentation mask**: `labelmap.txt` plus `SegmentationClass/<base name>.png`
//!
//! A directory holding both `SegmentationClass/` and `labelmap.txt` is always
//! imported as segmentation masks, whatever type the caller declared.

mod meta;
mod registry;
mod seg_mask;
mod traits;
mod voc_xml;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::class_ids::ClassIdRegistry;
use crate::error::{MirError, MirResult};
use crate::model::{AnnoType, AssetId, MirAnnotations};

pub use meta::{META_FILE, import_meta};
pub use registry::ImporterRegistry;
pub use seg_mask::{BACKGROUND, LABELMAP_FILE, SEGMENTATION_CLASS_DIR, SegMaskImporter, parse_labelmap};
pub use traits::{AnnotationImporter, ImportContext, ImportWarning};
pub use voc_xml::VocXmlImporter;

/// What to do with class names the registry does not know.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownTypesStrategy {
    /// Fail the import, listing the unknown names
    #[default]
    Stop,
    /// Drop objects of unknown classes
    Ignore,
    /// Register unknown names with fresh ids
    Add,
}

impl FromStr for UnknownTypesStrategy {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stop" => Ok(Self::Stop),
            "ignore" => Ok(Self::Ignore),
            "add" => Ok(Self::Add),
            other => Err(MirError::invalid_args(format!(
                "unknown types strategy: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for UnknownTypesStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Stop => "stop",
            Self::Ignore => "ignore",
            Self::Add => "add",
        })
    }
}

/// Occurrence counts of class names, keyed by canonical name.
///
/// Entries are created explicitly on first observation; lookups of names
/// never observed return `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameCounts(BTreeMap<String, u64>);

impl NameCounts {
    /// Count of `name`, or `None` if it was never observed.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.0.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Record the first observation of `name` with count 0. Existing counts
    /// are left untouched.
    pub fn first_seen(&mut self, name: &str) {
        if !self.0.contains_key(name) {
            self.0.insert(name.to_string(), 0);
        }
    }

    /// Increment `name` if it was observed before; returns whether it was.
    pub fn bump(&mut self, name: &str) -> bool {
        match self.0.get_mut(name) {
            Some(count) => {
                *count += 1;
                true
            }
            None => false,
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> BTreeMap<String, u64> {
        self.0
    }
}

/// Which half of a [`MirAnnotations`] an import fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationSlot {
    Prediction,
    GroundTruth,
}

/// Inputs of [`import_annotations`].
#[derive(Debug, Clone)]
pub struct ImportRequest<'a> {
    pub prediction_dir: Option<&'a Path>,
    pub ground_truth_dir: Option<&'a Path>,
    /// Asset id to base file name; drives which files are looked up
    pub asset_files: &'a BTreeMap<AssetId, String>,
    pub strategy: UnknownTypesStrategy,
    pub anno_type: AnnoType,
}

/// Result of a successful import.
#[derive(Debug, Default)]
pub struct ImportOutcome {
    /// Unknown names and how often they occurred after the first sighting
    pub unknown_names: NameCounts,
    /// Assets skipped along the way
    pub warnings: Vec<ImportWarning>,
    pub prediction_assets: usize,
    pub ground_truth_assets: usize,
}

/// Annotation type a directory will actually be imported as.
///
/// A `SegmentationClass/` directory next to a `labelmap.txt` forces
/// [`AnnoType::SegMask`], overriding `declared`.
pub fn detect_anno_type(dir: &Path, declared: AnnoType) -> AnnoType {
    let is_seg_mask_dir =
        dir.join(SEGMENTATION_CLASS_DIR).is_dir() && dir.join(LABELMAP_FILE).is_file();
    if !is_seg_mask_dir {
        return declared;
    }
    if declared != AnnoType::SegMask {
        log::warn!(
            "{:?} holds segmentation masks, importing as {} instead of {}",
            dir,
            AnnoType::SegMask,
            declared
        );
    }
    AnnoType::SegMask
}

/// Import prediction and ground-truth directories into `annotations`.
///
/// Unknown class names are handled per `request.strategy`: with
/// [`UnknownTypesStrategy::Stop`] the call fails with `UnknownTypes` after
/// both directories were read; otherwise the names and counts are returned.
pub fn import_annotations(
    annotations: &mut MirAnnotations,
    registry: &mut ClassIdRegistry,
    request: &ImportRequest<'_>,
) -> MirResult<ImportOutcome> {
    let importers = ImporterRegistry::new();
    log::info!("Loaded {} class ids", registry.len());

    let mut ctx = ImportContext::new(registry, request.strategy, request.asset_files);
    let mut outcome = ImportOutcome::default();

    if let Some(dir) = request.prediction_dir {
        log::info!("Importing prediction from {:?}", dir);
        outcome.prediction_assets = import_slot(
            &importers,
            &mut ctx,
            annotations,
            AnnotationSlot::Prediction,
            dir,
            request.anno_type,
        )?;
        import_meta(&*ctx.registry, dir, &mut annotations.prediction)?;
    }

    if let Some(dir) = request.ground_truth_dir {
        log::info!("Importing ground truth from {:?}", dir);
        outcome.ground_truth_assets = import_slot(
            &importers,
            &mut ctx,
            annotations,
            AnnotationSlot::GroundTruth,
            dir,
            request.anno_type,
        )?;
    }

    if request.strategy == UnknownTypesStrategy::Stop && !ctx.unknown_names.is_empty() {
        return Err(MirError::UnknownTypes {
            names: ctx.unknown_names.names(),
        });
    }

    outcome.unknown_names = ctx.unknown_names;
    outcome.warnings = ctx.warnings;
    Ok(outcome)
}

/// Import one directory into the given slot of `annotations`.
pub fn import_slot(
    importers: &ImporterRegistry,
    ctx: &mut ImportContext<'_>,
    annotations: &mut MirAnnotations,
    slot: AnnotationSlot,
    dir: &Path,
    declared: AnnoType,
) -> MirResult<usize> {
    let anno_type = detect_anno_type(dir, declared);
    let importer = importers.for_type(anno_type)?;

    let MirAnnotations {
        prediction,
        ground_truth,
        image_cks,
    } = annotations;
    let target = match slot {
        AnnotationSlot::Prediction => prediction,
        AnnotationSlot::GroundTruth => ground_truth,
    };
    target.anno_type = anno_type;

    let imported = importer.import_dir(ctx, dir, target, image_cks)?;
    log::info!(
        "{}: imported {} / {} annotations from {:?}",
        importer.display_name(),
        imported,
        ctx.asset_files.len(),
        dir
    );
    Ok(imported)
}
