//! Pascal VOC style XML importer.
//!
//! One XML file per asset, named after the asset's base file name:
//!
//! ```xml
//! <annotation>
//!   <cks><weather>sunny</weather></cks>
//!   <image_quality>0.9</image_quality>
//!   <object>
//!     <name>person</name>
//!     <bndbox>
//!       <xmin>10</xmin><ymin>10</ymin><xmax>19</xmax><ymax>14</ymax>
//!       <rotate_angle>0.0</rotate_angle>
//!     </bndbox>
//!     <confidence>0.8</confidence>
//!     <box_quality>0.5</box_quality>
//!     <tags><difficult>0</difficult></tags>
//!   </object>
//! </annotation>
//! ```
//!
//! Bounds are inclusive: `w = xmax - xmin + 1`.

use std::collections::BTreeMap;
use std::path::Path;

use quick_xml::de::from_str;
use serde::Deserialize;
use serde::de::IgnoredAny;

use super::UnknownTypesStrategy;
use super::traits::{AnnotationImporter, ImportContext};
use crate::error::{MirError, MirResult};
use crate::model::{
    AnnoType, AssetId, ImageAnnotations, ImageCustomKeys, ObjectAnnotation, Rect,
    TaskAnnotations,
};

/// Importer for detection boxes (and, eventually, polygons) in VOC XML.
pub struct VocXmlImporter;

impl AnnotationImporter for VocXmlImporter {
    fn id(&self) -> &'static str {
        "voc-xml"
    }

    fn display_name(&self) -> &'static str {
        "Pascal VOC (XML)"
    }

    fn supports(&self, anno_type: AnnoType) -> bool {
        matches!(anno_type, AnnoType::DetBox | AnnoType::SegPolygon)
    }

    fn import_dir(
        &self,
        ctx: &mut ImportContext<'_>,
        dir: &Path,
        target: &mut TaskAnnotations,
        image_cks: &mut BTreeMap<AssetId, ImageCustomKeys>,
    ) -> MirResult<usize> {
        let add_if_not_found = ctx.strategy == UnknownTypesStrategy::Add;
        let asset_files = ctx.asset_files;
        let mut imported = 0;

        for (asset_id, base_name) in asset_files {
            let xml_path = dir.join(format!("{}.xml", base_name));
            if !xml_path.is_file() {
                continue;
            }

            let content = match std::fs::read_to_string(&xml_path) {
                Ok(content) => content,
                Err(e) => {
                    ctx.skip_asset(&xml_path, format!("cannot read: {}", e));
                    continue;
                }
            };
            if content.trim().is_empty() {
                ctx.skip_asset(&xml_path, "empty annotation file");
                continue;
            }
            let voc: VocAnnotation = match from_str(&content) {
                Ok(voc) => voc,
                Err(e) => {
                    ctx.skip_asset(&xml_path, format!("cannot parse: {}", e));
                    continue;
                }
            };

            let cks = image_cks.entry(asset_id.clone()).or_default();
            if let Some(keys) = voc.cks {
                cks.cks.extend(keys);
            }
            cks.image_quality = voc.image_quality.unwrap_or(-1.0);

            let mut image = ImageAnnotations::default();
            for object in &voc.objects {
                let (mut class_id, name) = ctx.registry.resolve(&object.name);

                // Only unknown names are ever tracked, so a hit means a repeat.
                if !ctx.unknown_names.bump(&name) && class_id < 0 {
                    if add_if_not_found {
                        class_id = ctx.registry.add(&name)?.0;
                    }
                    ctx.unknown_names.first_seen(&name);
                }

                if class_id >= 0 {
                    let index = image.boxes.len() as i32;
                    image.boxes.push(object.to_annotation(index, class_id)?);
                    image.img_class_ids.insert(class_id);
                }
            }

            target
                .task_class_ids
                .extend(image.img_class_ids.iter().copied());
            target.image_annotations.insert(asset_id.clone(), image);
            imported += 1;
        }

        Ok(imported)
    }
}

// ============================================================================
// XML Structures
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename = "annotation")]
struct VocAnnotation {
    #[serde(default)]
    cks: Option<BTreeMap<String, String>>,
    #[serde(default)]
    image_quality: Option<f32>,
    #[serde(rename = "object", default)]
    objects: Vec<VocObject>,
}

#[derive(Debug, Deserialize)]
struct VocObject {
    name: String,
    #[serde(default)]
    bndbox: Option<VocBndbox>,
    #[serde(default)]
    polygon: Option<IgnoredAny>,
    #[serde(default)]
    confidence: Option<f32>,
    #[serde(default)]
    box_quality: Option<f32>,
    #[serde(default)]
    tags: Option<BTreeMap<String, String>>,
}

/// Coordinates may be written as floats; they are truncated to pixels.
#[derive(Debug, Deserialize)]
struct VocBndbox {
    xmin: f64,
    ymin: f64,
    xmax: f64,
    ymax: f64,
    #[serde(default)]
    rotate_angle: f32,
}

impl VocObject {
    fn to_annotation(&self, index: i32, class_id: i32) -> MirResult<ObjectAnnotation> {
        let bbox = match (&self.bndbox, &self.polygon) {
            (Some(bndbox), _) => {
                let mut rect = Rect::from_corners(
                    bndbox.xmin as i32,
                    bndbox.ymin as i32,
                    bndbox.xmax as i32,
                    bndbox.ymax as i32,
                );
                rect.rotate_angle = bndbox.rotate_angle;
                rect
            }
            (None, Some(_)) => return Err(MirError::not_implemented("polygon annotations")),
            (None, None) => {
                return Err(MirError::invalid_args(format!(
                    "no value for bndbox or polygon in object '{}'",
                    self.name
                )));
            }
        };

        let mut annotation = ObjectAnnotation::new(index, class_id, bbox);
        annotation.score = self.confidence.unwrap_or(-1.0);
        annotation.anno_quality = self.box_quality.unwrap_or(-1.0);
        if let Some(tags) = &self.tags {
            annotation.tags = tags.clone();
        }
        Ok(annotation)
    }
}

