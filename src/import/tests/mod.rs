//! Unit tests for the annotation importers.
//!
//! Fixtures are written into temporary directories.


use std::collections::BTreeMap;
use std::path::Path;

use crate::model::AssetId;

/// Write `content` to `dir/name`, creating parent directories.
pub(super) fn write_file(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write fixture");
}

/// Asset id to base file name map.
pub(super) fn asset_files(pairs: &[(&str, &str)]) -> BTreeMap<AssetId, String> {
    pairs
        .iter()
        .map(|(id, base)| (id.to_string(), base.to_string()))
        .collect()
}
