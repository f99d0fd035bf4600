//! Mapping file loading.
//!
//! YAML is the primary format; `.json` files are accepted too. A mapping
//! that fails to parse is fatal — there is nothing sensible to convert
//! against.

use std::fs;
use std::path::Path;

use super::model::MappingDocument;
use crate::sfm::error::ConvertError;

/// Load a mapping description from disk, choosing the parser by extension.
pub fn load_mapping(path: &Path) -> Result<MappingDocument, ConvertError> {
    let source = fs::read_to_string(path).map_err(|e| ConvertError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_mapping(&source, path)
}

fn parse_mapping(source: &str, path: &Path) -> Result<MappingDocument, ConvertError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if is_json {
        serde_json::from_str(source).map_err(|e| ConvertError::MappingLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    } else {
        serde_yaml::from_str(source).map_err(|e| ConvertError::MappingLoad {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}
