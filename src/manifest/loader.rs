//! Manifest and chart descriptor loading.

use super::ManifestError;
use crate::constants::CHART_DESCRIPTOR_FILE;
use kube::core::DynamicObject;
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

fn is_manifest(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext == "yaml" || ext == "yml")
}

fn parse_documents(path: &Path, content: &str) -> Result<Vec<DynamicObject>, ManifestError> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(content) {
        let value = serde_json::Value::deserialize(document).map_err(|source| ManifestError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        if value.is_null() {
            continue;
        }

        let invalid = |reason: &str| ManifestError::Invalid {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        };
        if value["apiVersion"].as_str().is_none_or(str::is_empty) {
            return Err(invalid("document without apiVersion"));
        }
        if value["kind"].as_str().is_none_or(str::is_empty) {
            return Err(invalid("document without kind"));
        }
        if value["metadata"]["name"].as_str().is_none_or(str::is_empty) {
            return Err(invalid("document without metadata.name"));
        }
        objects.push(serde_json::from_value(value)?);
    }
    Ok(objects)
}

/// Load every object defined in the `.yaml`/`.yml` files below `dir`
///
/// Files are read in path order. A missing directory yields no objects.
pub fn load_manifests(dir: &Path) -> Result<Vec<DynamicObject>, ManifestError> {
    if !dir.exists() {
        warn!("Manifest directory does not exist: {}", dir.display());
        return Ok(Vec::new());
    }

    let mut objects = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_manifest(path) {
            continue;
        }
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let parsed = parse_documents(path, &content)?;
        debug!(file = %path.display(), objects = parsed.len(), "Loaded manifest file");
        objects.extend(parsed);
    }
    Ok(objects)
}

#[derive(Debug, Deserialize)]
struct ChartDescriptor {
    version: Option<String>,
}

/// Version of the module chart, read from its descriptor
pub fn chart_version(chart_path: &Path) -> Result<String, ManifestError> {
    let path = chart_path.join(CHART_DESCRIPTOR_FILE);
    let content = std::fs::read_to_string(&path).map_err(|source| ManifestError::Io {
        path: path.clone(),
        source,
    })?;
    let descriptor: ChartDescriptor =
        serde_yaml::from_str(&content).map_err(|source| ManifestError::Yaml {
            path: path.clone(),
            source,
        })?;
    descriptor
        .version
        .filter(|version| !version.is_empty())
        .ok_or_else(|| ManifestError::ChartVersion(format!("no version in {}", path.display())))
}
