//! Building the annotation set of a mining (inference) batch.
//!
//! Fresh predictions come from the executor's output directory:
//!
//! - detection models write `infer-result.json`:
//!   `{"detection": {"<file name>": {"boxes": [{"class_name", "score", "box"}]}}}`
//! - segmentation models write a mask directory importable as
//!   [`AnnoType::SegMask`]
//!
//! Ground truth and custom keys are always carried over for the candidate
//! assets.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::filter::copy_pred_meta;
use crate::class_ids::ClassIdRegistry;
use crate::error::{MirError, MirResult};
use crate::import::{AnnotationImporter, ImportContext, SegMaskImporter, UnknownTypesStrategy};
use crate::model::{
    AnnoType, AssetId, ImageAnnotations, MirAnnotations, ModelMeta, ObjectAnnotation, Rect,
    TaskAnnotations,
};

/// File written by detection executors.
pub const INFER_RESULT_FILE: &str = "infer-result.json";

/// Description of the model that produced a mining batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelStorage {
    pub model_type: AnnoType,
    pub class_names: Vec<String>,
    pub executor_config: serde_json::Value,
    pub meta: ModelMeta,
}

/// Build the annotations of the candidate `asset_ids`.
///
/// With `add_prediction`, predictions are read from `work_out_dir` and the
/// model's evaluation classes, executor config and metadata are attached.
/// Otherwise the existing predictions of the candidates are carried forward.
/// The prediction type is always `model.model_type`.
pub fn mining_annotations(
    work_out_dir: &Path,
    asset_ids: &BTreeSet<AssetId>,
    registry: &mut ClassIdRegistry,
    model: &ModelStorage,
    add_prediction: bool,
    annotations: &MirAnnotations,
) -> MirResult<MirAnnotations> {
    let mut mined = MirAnnotations::new();

    if add_prediction {
        let prediction = &mut mined.prediction;
        match model.model_type {
            AnnoType::DetBox => {
                let path = work_out_dir.join(INFER_RESULT_FILE);
                read_detbox_infer_result(prediction, &path, asset_ids, registry)?;
            }
            AnnoType::SegMask => {
                let asset_files: BTreeMap<AssetId, String> =
                    asset_ids.iter().map(|id| (id.clone(), id.clone())).collect();
                let mut ctx =
                    ImportContext::new(registry, UnknownTypesStrategy::Ignore, &asset_files);
                SegMaskImporter.import_dir(&mut ctx, work_out_dir, prediction, &mut BTreeMap::new())?;
            }
            other => {
                log::warn!("no inference reader for {} models, predictions left empty", other);
            }
        }

        let (class_ids, _) = registry.id_for_names(&model.class_names, true);
        prediction.eval_class_ids = class_ids
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        prediction.executor_config = serde_json::to_string(&model.executor_config)?;
        prediction.model = Some(model.meta.clone());
    } else {
        carry_forward(&annotations.prediction, &mut mined.prediction, asset_ids);
        copy_pred_meta(&annotations.prediction, &mut mined.prediction);
    }
    // The mining model decides the prediction type, carried forward or not
    mined.prediction.anno_type = model.model_type;

    carry_forward(&annotations.ground_truth, &mut mined.ground_truth, asset_ids);
    mined.image_cks = annotations
        .image_cks
        .iter()
        .filter(|(asset_id, _)| asset_ids.contains(*asset_id))
        .map(|(asset_id, cks)| (asset_id.clone(), cks.clone()))
        .collect();

    log::info!(
        "mining batch: {} candidates, {} predictions, {} ground truths",
        asset_ids.len(),
        mined.prediction.image_annotations.len(),
        mined.ground_truth.image_annotations.len()
    );
    Ok(mined)
}

fn carry_forward(src: &TaskAnnotations, dst: &mut TaskAnnotations, asset_ids: &BTreeSet<AssetId>) {
    dst.anno_type = src.anno_type;
    dst.map_id_color = src.map_id_color.clone();
    for asset_id in asset_ids {
        if let Some(image) = src.image_annotations.get(asset_id) {
            dst.task_class_ids.extend(image.img_class_ids.iter().copied());
            dst.image_annotations.insert(asset_id.clone(), image.clone());
        }
    }
}

// ============================================================================
// infer-result.json
// ============================================================================

#[derive(Debug, Deserialize)]
struct InferResult {
    detection: Option<BTreeMap<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct InferImage {
    boxes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct InferBox {
    class_name: String,
    #[serde(default)]
    score: f32,
    #[serde(rename = "box")]
    bbox: Rect,
}

/// Fill `task` from a detection result file. Objects of unknown classes and
/// malformed boxes are dropped.
fn read_detbox_infer_result(
    task: &mut TaskAnnotations,
    path: &Path,
    asset_ids: &BTreeSet<AssetId>,
    registry: &ClassIdRegistry,
) -> MirResult<()> {
    let content = std::fs::read_to_string(path)?;
    let result: InferResult = serde_json::from_str(&content)?;
    let detections = result
        .detection
        .ok_or_else(|| MirError::invalid_args(format!("{:?} has no detection section", path)))?;

    for (asset_name, value) in detections {
        let asset_id = match Path::new(&asset_name).file_stem().and_then(|s| s.to_str()) {
            Some(stem) => stem.to_string(),
            None => continue,
        };
        if !asset_ids.contains(&asset_id) {
            continue;
        }
        let infer_image: InferImage = match serde_json::from_value(value) {
            Ok(infer_image) => infer_image,
            Err(e) => {
                log::error!("invalid inference result for {}: {}", asset_name, e);
                continue;
            }
        };

        let mut image = ImageAnnotations::default();
        for value in infer_image.boxes {
            let infer_box: InferBox = match serde_json::from_value(value) {
                Ok(infer_box) => infer_box,
                Err(e) => {
                    log::warn!("invalid inference box for {}: {}", asset_name, e);
                    continue;
                }
            };
            let (class_id, _) = registry.resolve(&infer_box.class_name);
            if class_id < 0 {
                continue;
            }
            let mut object = ObjectAnnotation::new(image.boxes.len() as i32, class_id, infer_box.bbox);
            object.score = infer_box.score;
            image.boxes.push(object);
            image.img_class_ids.insert(class_id);
        }
        task.task_class_ids.extend(image.img_class_ids.iter().copied());
        task.image_annotations.insert(asset_id, image);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use image::{ImageFormat, Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;
    use crate::import::{LABELMAP_FILE, SEGMENTATION_CLASS_DIR};
    use crate::model::ImageCustomKeys;

    fn ids(values: &[&str]) -> BTreeSet<AssetId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn existing() -> MirAnnotations {
        let mut annotations = MirAnnotations::new();
        annotations.prediction.anno_type = AnnoType::DetBox;
        annotations.ground_truth.anno_type = AnnoType::DetBox;
        for asset_id in ["a", "b", "c"] {
            let mut image = ImageAnnotations::default();
            image
                .boxes
                .push(ObjectAnnotation::new(0, 0, Rect::from_corners(0, 0, 4, 4)));
            image.img_class_ids.insert(0);
            annotations
                .prediction
                .image_annotations
                .insert(asset_id.into(), image.clone());
            annotations
                .ground_truth
                .image_annotations
                .insert(asset_id.into(), image);
            annotations
                .image_cks
                .insert(asset_id.into(), ImageCustomKeys::default());
        }
        annotations.prediction.eval_class_ids = vec![0];
        annotations
    }

    fn det_model() -> ModelStorage {
        ModelStorage {
            model_type: AnnoType::DetBox,
            class_names: vec!["cat".into(), "dog".into(), "ghost".into()],
            executor_config: serde_json::json!({"batch": 4}),
            meta: ModelMeta {
                model_hash: "m1".into(),
                ..ModelMeta::default()
            },
        }
    }

    #[test]
    fn test_detbox_inference_result() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join(INFER_RESULT_FILE),
            r#"{
                "detection": {
                    "a.jpg": {"boxes": [
                        {"class_name": "dog", "score": 0.9, "box": {"x": 1, "y": 2, "w": 3, "h": 4}},
                        {"class_name": "wolf", "score": 0.8, "box": {"x": 0, "y": 0, "w": 1, "h": 1}},
                        {"class_name": "dog", "score": 0.7},
                        {"class_name": "Cat", "box": {"x": 5, "y": 5, "w": 2, "h": 2}}
                    ]},
                    "b.jpg": {"boxes": "broken"},
                    "z.jpg": {"boxes": []}
                }
            }"#,
        )
        .unwrap();
        let mut registry = ClassIdRegistry::from_names(&["cat", "dog"]).unwrap();

        let mined = mining_annotations(
            dir.path(),
            &ids(&["a", "b"]),
            &mut registry,
            &det_model(),
            true,
            &existing(),
        )
        .unwrap();

        let prediction = &mined.prediction;
        assert_eq!(prediction.anno_type, AnnoType::DetBox);
        assert_eq!(prediction.asset_ids(), ids(&["a"]));
        let boxes = &prediction.image_annotations["a"].boxes;
        assert_eq!(boxes.len(), 2);
        assert_eq!((boxes[0].index, boxes[0].class_id), (0, 1));
        assert_eq!(boxes[0].bbox.w, 3);
        assert_eq!((boxes[1].index, boxes[1].class_id), (1, 0));
        assert_eq!(boxes[1].score, 0.0);
        assert_eq!(prediction.eval_class_ids, vec![0, 1]);
        assert_eq!(prediction.executor_config, "{\"batch\":4}");
        assert_eq!(prediction.model.as_ref().unwrap().model_hash, "m1");

        // Ground truth and custom keys follow the candidates
        assert_eq!(mined.ground_truth.asset_ids(), ids(&["a", "b"]));
        assert_eq!(mined.image_cks.len(), 2);
    }

    #[test]
    fn test_without_inference_carries_predictions() {
        let dir = TempDir::new().unwrap();
        let mut registry = ClassIdRegistry::from_names(&["cat"]).unwrap();
        let annotations = existing();

        let mined = mining_annotations(
            dir.path(),
            &ids(&["b", "c", "x"]),
            &mut registry,
            &det_model(),
            false,
            &annotations,
        )
        .unwrap();

        assert_eq!(mined.prediction.asset_ids(), ids(&["b", "c"]));
        assert_eq!(
            mined.prediction.image_annotations["b"],
            annotations.prediction.image_annotations["b"]
        );
        assert_eq!(mined.prediction.eval_class_ids, vec![0]);
        assert!(mined.prediction.model.is_none());
        assert_eq!(mined.ground_truth.asset_ids(), ids(&["b", "c"]));
    }

    #[test]
    fn test_carried_predictions_take_model_type_and_colors() {
        let dir = TempDir::new().unwrap();
        let mut registry = ClassIdRegistry::from_names(&["cat"]).unwrap();
        let mut annotations = existing();
        annotations.prediction.map_id_color.insert(0, [10, 20, 30]);
        annotations.ground_truth.map_id_color.insert(0, [10, 20, 30]);
        let model = ModelStorage {
            model_type: AnnoType::SegMask,
            ..det_model()
        };

        let mined = mining_annotations(dir.path(), &ids(&["a"]), &mut registry, &model, false, &annotations)
            .unwrap();

        assert_eq!(mined.prediction.anno_type, AnnoType::SegMask);
        assert_eq!(mined.ground_truth.anno_type, AnnoType::DetBox);
        assert_eq!(mined.prediction.map_id_color[&0], [10, 20, 30]);
        assert_eq!(mined.ground_truth.map_id_color[&0], [10, 20, 30]);
    }

    #[test]
    fn test_missing_detection_section() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(INFER_RESULT_FILE), "{}").unwrap();
        let mut registry = ClassIdRegistry::from_names(&["cat"]).unwrap();

        let err = mining_annotations(
            dir.path(),
            &ids(&["a"]),
            &mut registry,
            &det_model(),
            true,
            &existing(),
        )
        .err()
        .unwrap();
        assert!(matches!(err, MirError::InvalidArgs { .. }));
    }

    #[test]
    fn test_seg_mask_inference_output() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(LABELMAP_FILE), "cat:10,20,30::\nsky:5,5,5::\n").unwrap();
        let mask_dir = dir.path().join(SEGMENTATION_CLASS_DIR);
        std::fs::create_dir_all(&mask_dir).unwrap();
        let mask = RgbImage::from_fn(2, 2, |x, _| if x == 0 { Rgb([10, 20, 30]) } else { Rgb([5, 5, 5]) });
        let mut png = Cursor::new(Vec::new());
        mask.write_to(&mut png, ImageFormat::Png).unwrap();
        std::fs::write(mask_dir.join("a.png"), png.into_inner()).unwrap();

        let mut registry = ClassIdRegistry::from_names(&["cat"]).unwrap();
        let model = ModelStorage {
            model_type: AnnoType::SegMask,
            class_names: vec!["cat".into()],
            ..ModelStorage::default()
        };

        let mined = mining_annotations(
            dir.path(),
            &ids(&["a"]),
            &mut registry,
            &model,
            true,
            &MirAnnotations::new(),
        )
        .unwrap();

        // Unknown names are ignored, never registered
        assert_eq!(registry.len(), 1);
        let image = &mined.prediction.image_annotations["a"];
        assert_eq!(image.masks.len(), 1);
        assert_eq!(image.img_class_ids.iter().copied().collect::<Vec<_>>(), vec![0]);
        assert_eq!(mined.prediction.anno_type, AnnoType::SegMask);
        assert_eq!(mined.prediction.eval_class_ids, vec![0]);
        assert_eq!(mined.prediction.executor_config, "null");
    }
}
