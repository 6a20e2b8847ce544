//! Semantic segmentation mask importer.
//!
//! Layout of an annotation directory:
//!
//! ```text
//! labelmap.txt              name:R,G,B:: or name:gray:: per line
//! SegmentationClass/
//!   <base name>.png         RGB mask, one color per class
//! ```
//!
//! Masks are rebuilt pixel by pixel: only colors of registered classes are
//! copied, everything else becomes background `(0,0,0)`. The stored bytes are
//! a fresh PNG encoding, never the original file.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::Path;

use image::{ImageFormat, RgbImage};
use ndarray::{Array3, Axis, Zip, aview1};

use super::UnknownTypesStrategy;
use super::traits::{AnnotationImporter, ImportContext};
use crate::error::{MirError, MirResult};
use crate::model::{
    AnnoType, AssetId, ImageAnnotations, ImageCustomKeys, MaskAnnotation, TaskAnnotations,
};

/// Name of the label/color map file.
pub const LABELMAP_FILE: &str = "labelmap.txt";

/// Directory holding per-asset mask images.
pub const SEGMENTATION_CLASS_DIR: &str = "SegmentationClass";

/// Reserved background color.
pub const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Importer for semantic masks plus `labelmap.txt`.
pub struct SegMaskImporter;

impl AnnotationImporter for SegMaskImporter {
    fn id(&self) -> &'static str {
        "seg-mask"
    }

    fn display_name(&self) -> &'static str {
        "Segmentation mask (PNG + labelmap)"
    }

    fn supports(&self, anno_type: AnnoType) -> bool {
        anno_type == AnnoType::SegMask
    }

    fn import_dir(
        &self,
        ctx: &mut ImportContext<'_>,
        dir: &Path,
        target: &mut TaskAnnotations,
        _image_cks: &mut BTreeMap<AssetId, ImageCustomKeys>,
    ) -> MirResult<usize> {
        let labelmap_path = dir.join(LABELMAP_FILE);
        if !labelmap_path.is_file() {
            return Err(MirError::invalid_args(format!(
                "{} is required in {:?}",
                LABELMAP_FILE, dir
            )));
        }
        let records = parse_labelmap(&std::fs::read_to_string(&labelmap_path)?);

        // Canonical name to color; later lines win on duplicates.
        let mut name_colors: BTreeMap<String, [u8; 3]> = BTreeMap::new();
        for (name, color) in records {
            let (_, main_name) = ctx.registry.resolve(&name);
            name_colors.insert(main_name, color);
        }

        let unknown: Vec<String> = name_colors
            .keys()
            .filter(|name| ctx.registry.resolve(name).0 < 0)
            .cloned()
            .collect();
        for name in &unknown {
            ctx.unknown_names.first_seen(name);
        }
        if ctx.strategy == UnknownTypesStrategy::Add && !unknown.is_empty() {
            ctx.registry.add_main_names(&unknown)?;
        }

        let mut color_to_cid: BTreeMap<[u8; 3], i32> = BTreeMap::new();
        for (name, color) in &name_colors {
            let (class_id, _) = ctx.registry.resolve(name);
            if class_id >= 0 {
                target.map_id_color.insert(class_id, *color);
                color_to_cid.insert(*color, class_id);
            }
        }
        log::debug!(
            "labelmap {:?}: {} colors mapped to classes",
            labelmap_path,
            color_to_cid.len()
        );

        let mask_dir = dir.join(SEGMENTATION_CLASS_DIR);
        let asset_files = ctx.asset_files;
        let mut imported = 0;
        for (asset_id, base_name) in asset_files {
            let mask_path = mask_dir.join(format!("{}.png", base_name));
            if !mask_path.is_file() {
                continue;
            }

            let bytes = match std::fs::read(&mask_path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    ctx.skip_asset(&mask_path, format!("cannot read: {}", e));
                    continue;
                }
            };
            match image::guess_format(&bytes) {
                Ok(ImageFormat::Png) => {}
                Ok(other) => {
                    ctx.skip_asset(&mask_path, format!("cannot import as type {:?}", other));
                    continue;
                }
                Err(e) => {
                    ctx.skip_asset(&mask_path, format!("unidentified image: {}", e));
                    continue;
                }
            }
            let decoded = match image::load_from_memory_with_format(&bytes, ImageFormat::Png) {
                Ok(decoded) => decoded.to_rgb8(),
                Err(e) => {
                    ctx.skip_asset(&mask_path, format!("cannot decode: {}", e));
                    continue;
                }
            };

            let (semantic_mask, img_class_ids) = rebuild_mask(&decoded, &color_to_cid)?;
            target
                .task_class_ids
                .extend(img_class_ids.iter().copied());
            let image = target
                .image_annotations
                .entry(asset_id.clone())
                .or_insert_with(ImageAnnotations::default);
            image.masks.push(MaskAnnotation { semantic_mask });
            image.img_class_ids = img_class_ids;
            imported += 1;
        }

        Ok(imported)
    }
}

/// Parse `labelmap.txt` into `(name, color)` records.
///
/// Lines without a colon, with other than 4 colon-separated fields, or with
/// other than 1 or 3 intensity values are skipped, as is the background
/// color.
pub fn parse_labelmap(content: &str) -> Vec<(String, [u8; 3])> {
    let mut records = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || !line.contains(':') {
            log::info!("place-holder labelmap line, skipping");
            continue;
        }

        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() != 4 {
            log::info!("invalid labelmap line: {}", line);
            continue;
        }
        let name = fields[0].trim();
        if name.is_empty() {
            log::info!("labelmap line without name: {}", line);
            continue;
        }

        let values: Result<Vec<u8>, _> = fields[1]
            .split(',')
            .map(|v| v.trim().parse::<u8>())
            .collect();
        let color = match values.as_deref() {
            Ok([gray]) => [*gray, *gray, *gray],
            Ok([r, g, b]) => [*r, *g, *b],
            _ => {
                log::info!("invalid labelmap color: {}", fields[1]);
                continue;
            }
        };
        if color == BACKGROUND {
            log::info!("ignore background color for '{}'", name);
            continue;
        }

        records.push((name.to_string(), color));
    }
    records
}

/// Keep only pixels whose color is a key of `color_to_cid`.
///
/// Returns the re-encoded PNG and the class ids that occurred.
pub(crate) fn rebuild_mask(
    rgb: &RgbImage,
    color_to_cid: &BTreeMap<[u8; 3], i32>,
) -> MirResult<(Vec<u8>, BTreeSet<i32>)> {
    let (width, height) = rgb.dimensions();
    let shape = (height as usize, width as usize, 3);
    let pixels = Array3::from_shape_vec(shape, rgb.as_raw().clone())
        .map_err(|e| MirError::invalid_args(format!("mask shape: {}", e)))?;
    let mut output = Array3::<u8>::zeros(shape);
    let mut class_ids = BTreeSet::new();

    for (color, class_id) in color_to_cid {
        let matched = pixels.map_axis(Axis(2), |px| px[0] == color[0] && px[1] == color[1] && px[2] == color[2]);
        if !matched.iter().any(|&m| m) {
            continue;
        }
        class_ids.insert(*class_id);
        let fill = aview1(color);
        Zip::from(output.lanes_mut(Axis(2)))
            .and(&matched)
            .for_each(|mut px, &m| {
                if m {
                    px.assign(&fill);
                }
            });
    }

    let raw: Vec<u8> = output.iter().copied().collect();
    let mask = RgbImage::from_raw(width, height, raw)
        .ok_or_else(|| MirError::invalid_args("mask buffer size mismatch"))?;
    let mut encoded = Cursor::new(Vec::new());
    mask.write_to(&mut encoded, ImageFormat::Png)?;
    Ok((encoded.into_inner(), class_ids))
}
