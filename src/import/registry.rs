//! Registry for discovering importers by id or annotation type.

use std::collections::HashMap;

use super::seg_mask::SegMaskImporter;
use super::traits::AnnotationImporter;
use super::voc_xml::VocXmlImporter;
use crate::error::{MirError, MirResult};
use crate::model::AnnoType;

/// Registry of available annotation importers.
///
/// All built-in importers are registered on creation.
pub struct ImporterRegistry {
    importers: HashMap<&'static str, Box<dyn AnnotationImporter>>,
}

impl ImporterRegistry {
    /// Create a new registry with all built-in importers registered.
    pub fn new() -> Self {
        let mut registry = Self {
            importers: HashMap::new(),
        };

        registry.register(Box::new(VocXmlImporter));
        registry.register(Box::new(SegMaskImporter));

        registry
    }

    /// Register an importer implementation.
    pub fn register(&mut self, importer: Box<dyn AnnotationImporter>) {
        self.importers.insert(importer.id(), importer);
    }

    /// Get an importer by its ID.
    pub fn get(&self, id: &str) -> Option<&dyn AnnotationImporter> {
        self.importers.get(id).map(|i| i.as_ref())
    }

    /// Importer for an annotation type.
    ///
    /// Fails with `NotImplemented` when no importer handles `anno_type`.
    pub fn for_type(&self, anno_type: AnnoType) -> MirResult<&dyn AnnotationImporter> {
        self.importers
            .values()
            .find(|i| i.supports(anno_type))
            .map(|i| i.as_ref())
            .ok_or_else(|| MirError::not_implemented(format!("import of {} annotations", anno_type)))
    }

    /// Get all importer IDs.
    pub fn ids(&self) -> Vec<&'static str> {
        self.importers.keys().copied().collect()
    }
}

impl Default for ImporterRegistry {
    fn default() -> Self {
        Self::new()
    }
}
