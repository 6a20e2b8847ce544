//! Non-annotation records stored alongside each revision.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::annotation::{AssetId, MirAnnotations, TaskAnnotations};

/// Image file type of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    #[default]
    Unknown,
    Jpeg,
    Png,
    Bmp,
    Tiff,
    Webp,
}

impl AssetType {
    /// Guess the asset type from a file extension.
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => AssetType::Jpeg,
            "png" => AssetType::Png,
            "bmp" => AssetType::Bmp,
            "tif" | "tiff" => AssetType::Tiff,
            "webp" => AssetType::Webp,
            _ => AssetType::Unknown,
        }
    }
}

/// Per-asset image attributes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataAttributes {
    pub width: u32,
    pub height: u32,
    pub image_channels: u32,
    pub asset_type: AssetType,
    /// Seconds since epoch
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirMetadatas {
    pub attributes: BTreeMap<AssetId, MetadataAttributes>,
}

/// Searchable keywords of one asset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetKeywords {
    pub pred_class_ids: BTreeSet<i32>,
    pub gt_class_ids: BTreeSet<i32>,
    pub cks: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirKeywords {
    pub keywords: BTreeMap<AssetId, AssetKeywords>,
}

impl MirKeywords {
    /// Derive the keyword index from an annotation record.
    pub fn from_annotations(annotations: &MirAnnotations) -> Self {
        let mut keywords: BTreeMap<AssetId, AssetKeywords> = BTreeMap::new();
        for (asset_id, image) in &annotations.prediction.image_annotations {
            keywords
                .entry(asset_id.clone())
                .or_default()
                .pred_class_ids
                .extend(image.img_class_ids.iter().copied());
        }
        for (asset_id, image) in &annotations.ground_truth.image_annotations {
            keywords
                .entry(asset_id.clone())
                .or_default()
                .gt_class_ids
                .extend(image.img_class_ids.iter().copied());
        }
        for (asset_id, cks) in &annotations.image_cks {
            keywords
                .entry(asset_id.clone())
                .or_default()
                .cks
                .extend(cks.cks.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Self { keywords }
    }
}

/// Kind of task that produced a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    #[default]
    Unknown,
    Training,
    Mining,
    Label,
    Filter,
    Importing,
    Exporting,
    Copy,
    Merge,
    Infer,
    Sampling,
}

/// A task recorded in a repository's history.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    pub task_id: String,
    pub task_type: TaskType,
    pub name: String,
    /// Seconds since epoch
    pub timestamp: i64,
    /// Names dropped or seen as unknown while the task ran, with counts
    pub unknown_types: BTreeMap<String, u64>,
    pub return_code: i32,
    pub return_msg: String,
}

impl Task {
    pub fn new(task_id: impl Into<String>, task_type: TaskType, name: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            task_type,
            name: name.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirTasks {
    pub tasks: BTreeMap<String, Task>,
    pub head_task_id: String,
}

impl MirTasks {
    /// Record `task` and make it the head.
    pub fn push_head(&mut self, task: Task) {
        self.head_task_id = task.task_id.clone();
        self.tasks.insert(task.task_id.clone(), task);
    }

    pub fn head_task(&self) -> Option<&Task> {
        self.tasks.get(&self.head_task_id)
    }
}

/// Object statistics of one [`TaskAnnotations`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnoStats {
    pub total_cnt: u64,
    pub positive_asset_cnt: u64,
    pub negative_asset_cnt: u64,
    /// Objects per class id
    pub class_ids_cnt: BTreeMap<i32, u64>,
    /// Images per class id
    pub class_ids_image_cnt: BTreeMap<i32, u64>,
}

impl AnnoStats {
    /// Compute statistics for a task annotation set.
    pub fn from_task(task: &TaskAnnotations) -> Self {
        let mut stats = Self::default();
        for image in task.image_annotations.values() {
            if image.img_class_ids.is_empty() && image.boxes.is_empty() {
                stats.negative_asset_cnt += 1;
            } else {
                stats.positive_asset_cnt += 1;
            }
            for object in &image.boxes {
                stats.total_cnt += 1;
                *stats.class_ids_cnt.entry(object.class_id).or_insert(0) += 1;
            }
            for class_id in &image.img_class_ids {
                *stats.class_ids_image_cnt.entry(*class_id).or_insert(0) += 1;
            }
        }
        stats
    }

    /// Object count of `class_id`; zero when the class never occurs.
    pub fn count_of(&self, class_id: i32) -> u64 {
        self.class_ids_cnt.get(&class_id).copied().unwrap_or(0)
    }
}

/// Summary record of a revision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MirContext {
    pub images_cnt: u64,
    pub pred_stats: AnnoStats,
    pub gt_stats: AnnoStats,
    /// Custom key to image count
    pub cks_cnt: BTreeMap<String, u64>,
}

impl MirContext {
    pub fn from_annotations(metadatas: &MirMetadatas, annotations: &MirAnnotations) -> Self {
        let mut cks_cnt: BTreeMap<String, u64> = BTreeMap::new();
        for cks in annotations.image_cks.values() {
            for key in cks.cks.keys() {
                *cks_cnt.entry(key.clone()).or_insert(0) += 1;
            }
        }
        Self {
            images_cnt: metadatas.attributes.len() as u64,
            pred_stats: AnnoStats::from_task(&annotations.prediction),
            gt_stats: AnnoStats::from_task(&annotations.ground_truth),
            cks_cnt,
        }
    }
}
