//! Reconciling two annotation sets under a conflict strategy.
//!
//! Three pairs are merged: predictions, ground truth and per-image custom
//! keys. Every pair is validated before anything is written, so a failed
//! merge leaves the host untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{MirError, MirResult};
use crate::model::{AnnoType, AssetId, MirAnnotations, TaskAnnotations};

/// How to resolve asset ids present on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Keep the host entry
    Host,
    /// Overwrite with the guest entry
    Guest,
    /// Fail on any joint asset id
    #[default]
    Stop,
}

impl FromStr for MergeStrategy {
    type Err = MirError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "host" => Ok(Self::Host),
            "guest" => Ok(Self::Guest),
            "stop" => Ok(Self::Stop),
            other => Err(MirError::invalid_args(format!("unknown merge strategy: {}", other))),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Host => "host",
            Self::Guest => "guest",
            Self::Stop => "stop",
        })
    }
}

/// Disjoint split of two asset id sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetIdPartition {
    pub host_only: BTreeSet<AssetId>,
    pub guest_only: BTreeSet<AssetId>,
    pub joint: BTreeSet<AssetId>,
}

/// Partition `host` and `guest` into host-only, guest-only and joint ids.
pub fn match_asset_ids(host: &BTreeSet<AssetId>, guest: &BTreeSet<AssetId>) -> AssetIdPartition {
    AssetIdPartition {
        host_only: host.difference(guest).cloned().collect(),
        guest_only: guest.difference(host).cloned().collect(),
        joint: host.intersection(guest).cloned().collect(),
    }
}

/// Merge `guest` into `host`.
///
/// Fails with `InvalidAnnoType` when both sides of a task pair declare
/// different concrete types, and with `MergeConflict` under
/// [`MergeStrategy::Stop`] when any pair shares an asset id. Prediction
/// `eval_class_ids` are concatenated, host first.
pub fn merge_annotations(
    host: &mut MirAnnotations,
    guest: &MirAnnotations,
    strategy: MergeStrategy,
) -> MirResult<()> {
    let prediction_type = merged_type(&host.prediction, &guest.prediction)?;
    let ground_truth_type = merged_type(&host.ground_truth, &guest.ground_truth)?;

    if strategy == MergeStrategy::Stop {
        check_no_conflict(
            "prediction",
            &host.prediction.image_annotations,
            &guest.prediction.image_annotations,
        )?;
        check_no_conflict(
            "ground truth",
            &host.ground_truth.image_annotations,
            &guest.ground_truth.image_annotations,
        )?;
        check_no_conflict("image cks", &host.image_cks, &guest.image_cks)?;
    }

    host.prediction.anno_type = prediction_type;
    merge_map(
        &mut host.prediction.image_annotations,
        &guest.prediction.image_annotations,
        strategy,
    );
    host.prediction
        .eval_class_ids
        .extend(guest.prediction.eval_class_ids.iter().copied());

    host.ground_truth.anno_type = ground_truth_type;
    merge_map(
        &mut host.ground_truth.image_annotations,
        &guest.ground_truth.image_annotations,
        strategy,
    );

    merge_map(&mut host.image_cks, &guest.image_cks, strategy);

    for (host_task, guest_task) in [
        (&mut host.prediction, &guest.prediction),
        (&mut host.ground_truth, &guest.ground_truth),
    ] {
        merge_colors(&mut host_task.map_id_color, &guest_task.map_id_color, strategy);
    }

    for task in [&mut host.prediction, &mut host.ground_truth] {
        task.task_class_ids = task
            .image_annotations
            .values()
            .flat_map(|image| image.img_class_ids.iter().copied())
            .collect();
    }

    log::debug!(
        "merged with strategy {}: {} predictions, {} ground truths, {} image cks",
        strategy,
        host.prediction.image_annotations.len(),
        host.ground_truth.image_annotations.len(),
        host.image_cks.len()
    );
    Ok(())
}

/// Type of a merged task pair: the non-unknown side, host preferred.
fn merged_type(host: &TaskAnnotations, guest: &TaskAnnotations) -> MirResult<AnnoType> {
    if host.anno_type.is_known() && guest.anno_type.is_known() && host.anno_type != guest.anno_type {
        return Err(MirError::InvalidAnnoType {
            host: host.anno_type.to_string(),
            guest: guest.anno_type.to_string(),
        });
    }
    Ok(if host.anno_type.is_known() {
        host.anno_type
    } else {
        guest.anno_type
    })
}

fn check_no_conflict<V>(
    section: &'static str,
    host: &BTreeMap<AssetId, V>,
    guest: &BTreeMap<AssetId, V>,
) -> MirResult<()> {
    let count = host.keys().filter(|id| guest.contains_key(*id)).count();
    if count > 0 {
        return Err(MirError::MergeConflict { section, count });
    }
    Ok(())
}

fn merge_map<V: Clone>(host: &mut BTreeMap<AssetId, V>, guest: &BTreeMap<AssetId, V>, strategy: MergeStrategy) {
    let host_ids: BTreeSet<AssetId> = host.keys().cloned().collect();
    let guest_ids: BTreeSet<AssetId> = guest.keys().cloned().collect();
    let partition = match_asset_ids(&host_ids, &guest_ids);

    for asset_id in &partition.guest_only {
        host.insert(asset_id.clone(), guest[asset_id].clone());
    }
    if strategy == MergeStrategy::Guest {
        for asset_id in &partition.joint {
            host.insert(asset_id.clone(), guest[asset_id].clone());
        }
    }
}

/// Union of two color tables; on a class present in both, the host color
/// stays unless `strategy` is [`MergeStrategy::Guest`].
fn merge_colors(host: &mut BTreeMap<i32, [u8; 3]>, guest: &BTreeMap<i32, [u8; 3]>, strategy: MergeStrategy) {
    for (class_id, color) in guest {
        if strategy == MergeStrategy::Guest || !host.contains_key(class_id) {
            host.insert(*class_id, *color);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ImageAnnotations, ImageCustomKeys, ObjectAnnotation, Rect};

    fn image(class_id: i32, x: i32) -> ImageAnnotations {
        let mut image = ImageAnnotations::default();
        image
            .boxes
            .push(ObjectAnnotation::new(0, class_id, Rect::from_corners(x, x, x + 9, x + 9)));
        image.img_class_ids.insert(class_id);
        image
    }

    fn annotations(anno_type: AnnoType, entries: &[(&str, i32, i32)]) -> MirAnnotations {
        let mut annotations = MirAnnotations::new();
        annotations.prediction.anno_type = anno_type;
        annotations.ground_truth.anno_type = anno_type;
        for (asset_id, class_id, x) in entries {
            annotations
                .prediction
                .image_annotations
                .insert(asset_id.to_string(), image(*class_id, *x));
            annotations
                .ground_truth
                .image_annotations
                .insert(asset_id.to_string(), image(*class_id, *x));
            let mut cks = ImageCustomKeys::default();
            cks.cks.insert("source".into(), format!("{}", x));
            annotations.image_cks.insert(asset_id.to_string(), cks);
        }
        annotations
    }

    fn ids(values: &[&str]) -> BTreeSet<AssetId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_partition_is_exhaustive_and_disjoint() {
        let host = ids(&["a", "b", "c"]);
        let guest = ids(&["b", "c", "d", "e"]);
        let partition = match_asset_ids(&host, &guest);

        assert_eq!(partition.host_only, ids(&["a"]));
        assert_eq!(partition.guest_only, ids(&["d", "e"]));
        assert_eq!(partition.joint, ids(&["b", "c"]));

        let union: BTreeSet<AssetId> = partition
            .host_only
            .iter()
            .chain(&partition.guest_only)
            .chain(&partition.joint)
            .cloned()
            .collect();
        assert_eq!(union, host.union(&guest).cloned().collect());
        assert!(partition.host_only.is_disjoint(&partition.guest_only));
        assert!(partition.host_only.is_disjoint(&partition.joint));
        assert!(partition.guest_only.is_disjoint(&partition.joint));
    }

    #[test]
    fn test_host_strategy_keeps_host_entries() {
        let mut host = annotations(AnnoType::DetBox, &[("a", 0, 0), ("b", 0, 0)]);
        let guest = annotations(AnnoType::DetBox, &[("b", 1, 50), ("c", 1, 50)]);

        merge_annotations(&mut host, &guest, MergeStrategy::Host).unwrap();

        assert_eq!(host.prediction.image_annotations.len(), 3);
        assert_eq!(host.prediction.image_annotations["b"], image(0, 0));
        assert_eq!(host.ground_truth.image_annotations["c"], image(1, 50));
        assert_eq!(host.image_cks["b"].cks["source"], "0");
        assert_eq!(
            host.prediction.task_class_ids.iter().copied().collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_guest_strategy_overwrites_joint_entries() {
        let mut host = annotations(AnnoType::DetBox, &[("a", 0, 0), ("b", 0, 0)]);
        let guest = annotations(AnnoType::DetBox, &[("b", 1, 50)]);

        merge_annotations(&mut host, &guest, MergeStrategy::Guest).unwrap();

        assert_eq!(
            host.prediction.image_annotations["b"],
            guest.prediction.image_annotations["b"]
        );
        assert_eq!(
            host.ground_truth.image_annotations["b"],
            guest.ground_truth.image_annotations["b"]
        );
        assert_eq!(host.image_cks["b"], guest.image_cks["b"]);
        assert_eq!(host.prediction.image_annotations["a"], image(0, 0));
    }

    #[test]
    fn test_stop_strategy_leaves_host_untouched() {
        // Only the custom keys collide, so a per-pair check would have
        // already merged predictions and ground truth.
        let mut host = annotations(AnnoType::DetBox, &[("a", 0, 0)]);
        let mut guest = annotations(AnnoType::DetBox, &[("b", 1, 50)]);
        guest.image_cks.insert("a".into(), ImageCustomKeys::default());
        let before = host.clone();

        let err = merge_annotations(&mut host, &guest, MergeStrategy::Stop).err().unwrap();

        match err {
            MirError::MergeConflict { section, count } => {
                assert_eq!(section, "image cks");
                assert_eq!(count, 1);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(host, before);
    }

    #[test]
    fn test_stop_strategy_without_conflicts_merges() {
        let mut host = annotations(AnnoType::DetBox, &[("a", 0, 0)]);
        let guest = annotations(AnnoType::DetBox, &[("b", 1, 50)]);

        merge_annotations(&mut host, &guest, MergeStrategy::Stop).unwrap();
        assert_eq!(host.ground_truth.asset_ids(), ids(&["a", "b"]));
    }

    #[test]
    fn test_type_mismatch() {
        let mut host = annotations(AnnoType::DetBox, &[("a", 0, 0)]);
        let guest = annotations(AnnoType::SegMask, &[("b", 1, 50)]);
        let before = host.clone();

        let err = merge_annotations(&mut host, &guest, MergeStrategy::Host).err().unwrap();
        assert!(matches!(err, MirError::InvalidAnnoType { .. }));
        assert_eq!(host, before);
    }

    #[test]
    fn test_unknown_type_takes_other_side() {
        let mut host = annotations(AnnoType::Unknown, &[]);
        let guest = annotations(AnnoType::SegMask, &[("b", 1, 50)]);

        merge_annotations(&mut host, &guest, MergeStrategy::Host).unwrap();
        assert_eq!(host.prediction.anno_type, AnnoType::SegMask);
        assert_eq!(host.ground_truth.anno_type, AnnoType::SegMask);
    }

    #[test]
    fn test_color_tables_are_merged() {
        let mut host = annotations(AnnoType::Unknown, &[]);
        let mut guest = annotations(AnnoType::SegMask, &[("b", 1, 50)]);
        guest.prediction.map_id_color.insert(1, [10, 20, 30]);
        guest.ground_truth.map_id_color.insert(1, [10, 20, 30]);

        merge_annotations(&mut host, &guest, MergeStrategy::Host).unwrap();
        assert_eq!(host.prediction.anno_type, AnnoType::SegMask);
        assert_eq!(host.prediction.map_id_color, guest.prediction.map_id_color);
        assert_eq!(host.ground_truth.map_id_color, guest.ground_truth.map_id_color);
    }

    #[test]
    fn test_color_clash_follows_strategy() {
        let mut guest = annotations(AnnoType::SegMask, &[]);
        guest.prediction.map_id_color.insert(0, [9, 9, 9]);
        guest.prediction.map_id_color.insert(2, [7, 7, 7]);

        for (strategy, expected) in [(MergeStrategy::Host, [1, 1, 1]), (MergeStrategy::Guest, [9, 9, 9])] {
            let mut host = annotations(AnnoType::SegMask, &[]);
            host.prediction.map_id_color.insert(0, [1, 1, 1]);

            merge_annotations(&mut host, &guest, strategy).unwrap();
            assert_eq!(host.prediction.map_id_color[&0], expected);
            assert_eq!(host.prediction.map_id_color[&2], [7, 7, 7]);
        }
    }

    #[test]
    fn test_eval_class_ids_are_concatenated() {
        let mut host = annotations(AnnoType::DetBox, &[]);
        host.prediction.eval_class_ids = vec![0, 1];
        let mut guest = annotations(AnnoType::DetBox, &[]);
        guest.prediction.eval_class_ids = vec![1, 2];

        merge_annotations(&mut host, &guest, MergeStrategy::Host).unwrap();
        assert_eq!(host.prediction.eval_class_ids, vec![0, 1, 1, 2]);
    }

    #[test]
    fn test_parse_strategy() {
        assert_eq!("GUEST".parse::<MergeStrategy>().unwrap(), MergeStrategy::Guest);
        assert_eq!(MergeStrategy::default(), MergeStrategy::Stop);
        assert!("both".parse::<MergeStrategy>().is_err());
    }
}
