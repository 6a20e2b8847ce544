//! Record model stored in every repository revision.

mod annotation;
mod records;
mod revision;

pub use annotation::{
    AnnoFormat, AnnoType, AssetId, ImageAnnotations, ImageCustomKeys, MaskAnnotation,
    MirAnnotations, ModelMeta, ModelStage, ObjectAnnotation, Rect, TaskAnnotations,
};
pub use records::{
    AnnoStats, AssetKeywords, AssetType, MetadataAttributes, MirContext, MirKeywords,
    MirMetadatas, MirTasks, Task, TaskType,
};
pub use revision::Revision;
