//! Translating class ids between two label vocabularies.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::class_ids::{ClassIdRegistry, UNKNOWN_CLASS_ID};
use crate::error::MirResult;
use crate::model::{MirAnnotations, MirContext, TaskAnnotations};

/// Source class id to destination class id; unresolved names map to `-1`.
pub type ClassIdTable = HashMap<i32, i32>;

/// Rewrite the class ids of `annotations` from the vocabulary in
/// `src_label_file` to the one in `dst_label_file`.
///
/// Nothing is changed when both paths are the same file or when there are no
/// annotations at all. Returns the source classes without a destination
/// counterpart, with their object counts from `context`.
pub fn copy_annotations(
    annotations: &mut MirAnnotations,
    context: &MirContext,
    src_label_file: &Path,
    dst_label_file: &Path,
) -> MirResult<BTreeMap<String, u64>> {
    if src_label_file == dst_label_file || annotations.has_no_annotations() {
        return Ok(BTreeMap::new());
    }

    let src = ClassIdRegistry::load_or_create(src_label_file)?;
    let dst = ClassIdRegistry::load_or_create(dst_label_file)?;
    remap_annotations(annotations, context, &src, &dst)
}

/// Rewrite class ids from `src` to `dst`, dropping objects whose class has
/// no destination counterpart.
///
/// Fails with `NotFound` before touching `annotations` if `context` counts a
/// class id `src` does not know.
pub fn remap_annotations(
    annotations: &mut MirAnnotations,
    context: &MirContext,
    src: &ClassIdRegistry,
    dst: &ClassIdRegistry,
) -> MirResult<BTreeMap<String, u64>> {
    let table = translation_table(src, dst);
    let unknown = unknown_names_and_count(src, context, &table)?;
    remap_task(&mut annotations.prediction, &table);
    remap_task(&mut annotations.ground_truth, &table);
    Ok(unknown)
}

/// Build the `src_id -> dst_id` table over every source main name.
pub fn translation_table(src: &ClassIdRegistry, dst: &ClassIdRegistry) -> ClassIdTable {
    src.labels()
        .iter()
        .map(|label| (label.id, dst.resolve(&label.name).0))
        .collect()
}

fn translate(table: &ClassIdTable, class_id: i32) -> i32 {
    table.get(&class_id).copied().unwrap_or(UNKNOWN_CLASS_ID)
}

fn remap_task(task: &mut TaskAnnotations, table: &ClassIdTable) {
    let mut dropped = 0usize;
    for image in task.image_annotations.values_mut() {
        let before = image.boxes.len();
        image.boxes.retain_mut(|object| {
            object.class_id = translate(table, object.class_id);
            object.class_id >= 0
        });
        dropped += before - image.boxes.len();

        image.img_class_ids = image
            .img_class_ids
            .iter()
            .map(|class_id| translate(table, *class_id))
            .filter(|class_id| *class_id >= 0)
            .collect();
    }

    task.task_class_ids = task
        .task_class_ids
        .iter()
        .map(|class_id| translate(table, *class_id))
        .filter(|class_id| *class_id >= 0)
        .collect();
    task.eval_class_ids = task
        .eval_class_ids
        .iter()
        .map(|class_id| translate(table, *class_id))
        .filter(|class_id| *class_id >= 0)
        .collect();
    task.map_id_color = std::mem::take(&mut task.map_id_color)
        .into_iter()
        .map(|(class_id, color)| (translate(table, class_id), color))
        .filter(|(class_id, _)| *class_id >= 0)
        .collect();

    if dropped > 0 {
        log::info!("remap dropped {} objects without a destination class", dropped);
    }
}

fn unknown_names_and_count(
    src: &ClassIdRegistry,
    context: &MirContext,
    table: &ClassIdTable,
) -> MirResult<BTreeMap<String, u64>> {
    let mut unknown = BTreeMap::new();
    let class_ids = context
        .pred_stats
        .class_ids_cnt
        .keys()
        .chain(context.gt_stats.class_ids_cnt.keys());
    for class_id in class_ids {
        if translate(table, *class_id) >= 0 {
            continue;
        }
        let name = src.main_name_for_id(*class_id)?;
        let count = context.pred_stats.count_of(*class_id) + context.gt_stats.count_of(*class_id);
        unknown.insert(name.to_string(), count);
    }
    if !unknown.is_empty() {
        log::warn!("classes without destination id: {:?}", unknown);
    }
    Ok(unknown)
}
