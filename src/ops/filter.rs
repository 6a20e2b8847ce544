//! Masked views of an annotation set: filtering and sampling.
//!
//! Both produce a fresh [`MirAnnotations`] holding deep copies of the
//! selected entries; the source is never aliased.

use std::collections::BTreeSet;

use crate::model::{AssetId, MirAnnotations, TaskAnnotations};

/// Copy prediction-level metadata (eval class ids, executor config, model).
pub fn copy_pred_meta(src: &TaskAnnotations, dst: &mut TaskAnnotations) {
    dst.eval_class_ids = src.eval_class_ids.clone();
    dst.executor_config = src.executor_config.clone();
    dst.model = src.model.clone();
}

/// Keep only predictions, ground truth and custom keys of `asset_ids`.
pub fn filter_annotations(annotations: &MirAnnotations, asset_ids: &BTreeSet<AssetId>) -> MirAnnotations {
    let mut filtered = MirAnnotations::new();
    filter_task(&annotations.prediction, &mut filtered.prediction, asset_ids);
    filter_task(&annotations.ground_truth, &mut filtered.ground_truth, asset_ids);
    filtered.image_cks = annotations
        .image_cks
        .iter()
        .filter(|(asset_id, _)| asset_ids.contains(*asset_id))
        .map(|(asset_id, cks)| (asset_id.clone(), cks.clone()))
        .collect();
    copy_pred_meta(&annotations.prediction, &mut filtered.prediction);

    log::debug!(
        "filtered {} of {} ground-truth images",
        filtered.ground_truth.image_annotations.len(),
        annotations.ground_truth.image_annotations.len()
    );
    filtered
}

/// Keep the entries of `sampled_asset_ids`, chosen beforehand by the caller.
///
/// Ids with no annotations are ignored.
pub fn sampling_annotations(annotations: &MirAnnotations, sampled_asset_ids: &[AssetId]) -> MirAnnotations {
    let mut sampled = MirAnnotations::new();
    for (src, dst) in [
        (&annotations.prediction, &mut sampled.prediction),
        (&annotations.ground_truth, &mut sampled.ground_truth),
    ] {
        dst.anno_type = src.anno_type;
        dst.map_id_color = src.map_id_color.clone();
    }

    for asset_id in sampled_asset_ids {
        for (src, dst) in [
            (&annotations.prediction, &mut sampled.prediction),
            (&annotations.ground_truth, &mut sampled.ground_truth),
        ] {
            if let Some(image) = src.image_annotations.get(asset_id) {
                dst.task_class_ids.extend(image.img_class_ids.iter().copied());
                dst.image_annotations.insert(asset_id.clone(), image.clone());
            }
        }
        if let Some(cks) = annotations.image_cks.get(asset_id) {
            sampled.image_cks.insert(asset_id.clone(), cks.clone());
        }
    }
    copy_pred_meta(&annotations.prediction, &mut sampled.prediction);
    sampled
}

fn filter_task(src: &TaskAnnotations, dst: &mut TaskAnnotations, asset_ids: &BTreeSet<AssetId>) {
    dst.anno_type = src.anno_type;
    dst.map_id_color = src.map_id_color.clone();
    for (asset_id, image) in &src.image_annotations {
        if asset_ids.contains(asset_id) {
            dst.task_class_ids.extend(image.img_class_ids.iter().copied());
            dst.image_annotations.insert(asset_id.clone(), image.clone());
        }
    }
}
