//! Sidecar metadata for corpus documents.
//!
//! `guide.pdf` may be accompanied by `guide.yaml` holding a flat mapping of
//! extra fields. Missing or broken sidecars never stop corpus loading; the
//! document simply gets no extra metadata.

use crate::models::{Metadata, MetadataValue};
use serde_yaml::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const METADATA_EXTENSION: &str = "yaml";

pub fn sidecar_path(document: &Path) -> PathBuf {
    document.with_extension(METADATA_EXTENSION)
}

/// Reads the sidecar of `document`, returning an empty mapping when the file
/// is absent, unreadable, unparsable, or not a mapping at the top level.
pub fn load_sidecar_metadata(document: &Path) -> Metadata {
    let path = sidecar_path(document);
    if !path.is_file() {
        debug!(document = %document.display(), "no sidecar metadata");
        return Metadata::new();
    }

    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(error) => {
            warn!(path = %path.display(), %error, "unable to read sidecar metadata");
            return Metadata::new();
        }
    };

    match parse_metadata(&content) {
        Ok(Some(metadata)) => {
            debug!(
                path = %path.display(),
                keys = ?metadata.keys().collect::<Vec<_>>(),
                "loaded sidecar metadata"
            );
            metadata
        }
        Ok(None) => {
            warn!(path = %path.display(), "sidecar metadata is not a mapping, ignoring it");
            Metadata::new()
        }
        Err(error) => {
            warn!(path = %path.display(), %error, "unable to parse sidecar metadata");
            Metadata::new()
        }
    }
}

/// Parses sidecar content. `Ok(None)` means the document parsed but its top
/// level is not a mapping. An empty document is an empty mapping.
pub fn parse_metadata(content: &str) -> Result<Option<Metadata>, serde_yaml::Error> {
    let value: Value = serde_yaml::from_str(content)?;

    let mapping = match value {
        Value::Null => return Ok(Some(Metadata::new())),
        Value::Mapping(mapping) => mapping,
        _ => return Ok(None),
    };

    let mut metadata = Metadata::new();
    for (key, value) in mapping {
        let Some(key) = scalar_key(&key) else {
            debug!(key = ?key, "skipping non-scalar metadata key");
            continue;
        };
        match convert_value(value) {
            Some(converted) => {
                metadata.insert(key, converted);
            }
            None => debug!(key = %key, "skipping nested metadata value"),
        }
    }

    Ok(Some(metadata))
}

fn scalar_key(key: &Value) -> Option<String> {
    match key {
        Value::String(value) => Some(value.clone()),
        Value::Number(value) => Some(value.to_string()),
        Value::Bool(value) => Some(value.to_string()),
        _ => None,
    }
}

fn convert_value(value: Value) -> Option<MetadataValue> {
    match value {
        Value::Null => Some(MetadataValue::Null),
        Value::Bool(value) => Some(MetadataValue::Bool(value)),
        Value::Number(number) => match number.as_i64() {
            Some(integer) => Some(MetadataValue::Integer(integer)),
            None => number.as_f64().map(MetadataValue::Float),
        },
        Value::String(value) => Some(MetadataValue::Text(value)),
        Value::Sequence(items) => {
            let items = items
                .into_iter()
                .filter_map(|item| match item {
                    Value::Sequence(_) | Value::Mapping(_) => None,
                    scalar => convert_value(scalar),
                })
                .collect();
            Some(MetadataValue::List(items))
        }
        Value::Mapping(_) => None,
        Value::Tagged(tagged) => convert_value(tagged.value),
    }
}
