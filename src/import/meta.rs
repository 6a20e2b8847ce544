//! Optional `meta.yaml` sidecar of a prediction directory.
//!
//! Recognized keys:
//! - `model`: [`ModelMeta`]
//! - `eval_class_names`: list of class names; defaults to `model.class_names`
//! - `executor_config`: any object, stored as an opaque JSON string

use std::collections::BTreeSet;
use std::path::Path;

use crate::class_ids::ClassIdRegistry;
use crate::error::{MirError, MirResult};
use crate::model::{ModelMeta, TaskAnnotations};

/// File name of the sidecar.
pub const META_FILE: &str = "meta.yaml";

/// Apply `dir/meta.yaml` to `task` if present.
///
/// A present but unparsable file fails with `InvalidMetaYaml`.
pub fn import_meta(registry: &ClassIdRegistry, dir: &Path, task: &mut TaskAnnotations) -> MirResult<()> {
    let path = dir.join(META_FILE);
    if !path.is_file() {
        return Ok(());
    }

    let invalid = |message: String| MirError::InvalidMetaYaml {
        path: path.clone(),
        message,
    };

    let content = std::fs::read_to_string(&path)?;
    let value: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| invalid(e.to_string()))?;
    let mapping = value
        .as_mapping()
        .ok_or_else(|| invalid("top level is not a mapping".to_string()))?;

    if let Some(model) = mapping.get("model") {
        let model: ModelMeta =
            serde_yaml::from_value(model.clone()).map_err(|e| invalid(format!("model: {}", e)))?;
        task.model = Some(model);
    }

    let eval_class_names: Vec<String> = match mapping.get("eval_class_names") {
        Some(names) if !names.is_null() => serde_yaml::from_value(names.clone())
            .map_err(|e| invalid(format!("eval_class_names: {}", e)))?,
        _ => Vec::new(),
    };
    let eval_class_names = if eval_class_names.is_empty() {
        task.model
            .as_ref()
            .map(|m| m.class_names.clone())
            .unwrap_or_default()
    } else {
        eval_class_names
    };
    let (ids, unknown) = registry.id_for_names(&eval_class_names, true);
    if !unknown.is_empty() {
        log::warn!("{:?}: eval class names not registered: {:?}", path, unknown);
    }
    task.eval_class_ids = ids.into_iter().collect::<BTreeSet<_>>().into_iter().collect();

    if let Some(executor_config) = mapping.get("executor_config") {
        task.executor_config = serde_json::to_string(executor_config)
            .map_err(|e| invalid(format!("executor_config: {}", e)))?;
    }

    Ok(())
}
