//! Canonical annotation records.
//!
//! Maps are `BTreeMap` keyed by asset id so that serialized records and
//! iteration order are deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Asset id: stable content hash of the image.
pub type AssetId = String;

/// Kind of annotations held by a [`TaskAnnotations`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnnoType {
    /// No type declared yet
    #[default]
    Unknown,
    /// Axis-aligned detection boxes
    DetBox,
    /// Segmentation polygons
    SegPolygon,
    /// Semantic segmentation masks
    SegMask,
}

impl AnnoType {
    /// Parse a type name (`det-box`, `seg-poly`, `seg-mask`), case-insensitive.
    /// Anything else is [`AnnoType::Unknown`].
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "det-box" => AnnoType::DetBox,
            "seg-poly" => AnnoType::SegPolygon,
            "seg-mask" => AnnoType::SegMask,
            _ => AnnoType::Unknown,
        }
    }

    /// Whether a concrete type has been declared.
    pub fn is_known(&self) -> bool {
        !matches!(self, AnnoType::Unknown)
    }

    /// Short name as used in requests and logs.
    pub fn name(&self) -> &'static str {
        match self {
            AnnoType::Unknown => "unknown",
            AnnoType::DetBox => "det-box",
            AnnoType::SegPolygon => "seg-poly",
            AnnoType::SegMask => "seg-mask",
        }
    }
}

impl fmt::Display for AnnoType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// External annotation file formats accepted by importers and exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnnoFormat {
    /// No annotations requested
    NoAnnotation,
    /// Pascal VOC XML, one file per asset
    DetPascalVoc,
    /// Ark JSON
    DetArkJson,
    /// Label Studio JSON
    DetLsJson,
    /// Segmentation polygons
    SegPolygon,
    /// Segmentation masks with labelmap
    SegMask,
}

impl AnnoFormat {
    /// Parse a format name, accepting the legacy short names too.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "voc" | "det-voc" => AnnoFormat::DetPascalVoc,
            "ark" | "det-ark" => AnnoFormat::DetArkJson,
            "ls_json" | "det-ls-json" => AnnoFormat::DetLsJson,
            "seg-poly" => AnnoFormat::SegPolygon,
            "seg-mask" => AnnoFormat::SegMask,
            _ => AnnoFormat::NoAnnotation,
        }
    }
}

/// Axis-aligned box with inclusive pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
    #[serde(default)]
    pub rotate_angle: f32,
}

impl Rect {
    /// Build a box from inclusive corner coordinates: `w = xmax - xmin + 1`.
    pub fn from_corners(xmin: i32, ymin: i32, xmax: i32, ymax: i32) -> Self {
        Self {
            x: xmin,
            y: ymin,
            w: xmax - xmin + 1,
            h: ymax - ymin + 1,
            rotate_angle: 0.0,
        }
    }
}

fn absent_score() -> f32 {
    -1.0
}

/// A single detected or labeled object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectAnnotation {
    /// Position within the image, stable ordering key
    pub index: i32,
    pub class_id: i32,
    #[serde(rename = "box")]
    pub bbox: Rect,
    /// -1.0 when absent
    #[serde(default = "absent_score")]
    pub score: f32,
    /// -1.0 when absent
    #[serde(default = "absent_score")]
    pub anno_quality: f32,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ObjectAnnotation {
    /// Create an object with absent score and quality.
    pub fn new(index: i32, class_id: i32, bbox: Rect) -> Self {
        Self {
            index,
            class_id,
            bbox,
            score: absent_score(),
            anno_quality: absent_score(),
            tags: BTreeMap::new(),
        }
    }
}

/// Encoded semantic mask. Only registered colors survive import; `(0,0,0)` is
/// background.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MaskAnnotation {
    /// Lossless (PNG) image bytes
    pub semantic_mask: Vec<u8>,
}

/// All annotations of one image.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImageAnnotations {
    #[serde(default)]
    pub boxes: Vec<ObjectAnnotation>,
    #[serde(default)]
    pub masks: Vec<MaskAnnotation>,
    /// Class ids present in this image, for fast filtering
    #[serde(default)]
    pub img_class_ids: BTreeSet<i32>,
}

impl ImageAnnotations {
    /// Number of object annotations.
    pub fn object_count(&self) -> usize {
        self.boxes.len()
    }
}

/// Model description attached to a prediction set.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelMeta {
    pub model_hash: String,
    pub mean_average_precision: f32,
    pub context: String,
    pub stages: BTreeMap<String, ModelStage>,
    pub best_stage_name: String,
    pub class_names: Vec<String>,
}

/// One saved stage of a trained model.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStage {
    pub stage_name: String,
    pub files: Vec<String>,
    pub timestamp: i64,
    pub mean_average_precision: f32,
}

/// Predictions or ground truth of one dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskAnnotations {
    #[serde(rename = "type")]
    pub anno_type: AnnoType,
    pub image_annotations: BTreeMap<AssetId, ImageAnnotations>,
    /// Union of all image class ids
    pub task_class_ids: BTreeSet<i32>,
    /// Kept as a list: merging concatenates host then guest
    pub eval_class_ids: Vec<i32>,
    /// Segmentation color table: class id to RGB
    pub map_id_color: BTreeMap<i32, [u8; 3]>,
    pub model: Option<ModelMeta>,
    /// Opaque JSON blob, carried through unmodified
    pub executor_config: String,
}

impl TaskAnnotations {
    /// Create an empty set of the given type.
    pub fn with_type(anno_type: AnnoType) -> Self {
        Self {
            anno_type,
            ..Self::default()
        }
    }

    /// Asset ids present in this set.
    pub fn asset_ids(&self) -> BTreeSet<AssetId> {
        self.image_annotations.keys().cloned().collect()
    }

    /// Total object annotation count across all images.
    pub fn total_objects(&self) -> usize {
        self.image_annotations
            .values()
            .map(ImageAnnotations::object_count)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.image_annotations.is_empty()
    }
}

/// Free-form per-image tags plus image quality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageCustomKeys {
    #[serde(default)]
    pub cks: BTreeMap<String, String>,
    #[serde(default = "absent_score")]
    pub image_quality: f32,
}

impl Default for ImageCustomKeys {
    fn default() -> Self {
        Self {
            cks: BTreeMap::new(),
            image_quality: absent_score(),
        }
    }
}

/// Annotation record of a dataset revision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirAnnotations {
    pub prediction: TaskAnnotations,
    pub ground_truth: TaskAnnotations,
    pub image_cks: BTreeMap<AssetId, ImageCustomKeys>,
}

impl MirAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when neither predictions nor ground truth hold any image.
    pub fn has_no_annotations(&self) -> bool {
        self.prediction.is_empty() && self.ground_truth.is_empty()
    }
}
