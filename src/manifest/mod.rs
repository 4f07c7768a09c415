//! # Module Manifests
//!
//! Loading, preparing, applying and deleting the module's cluster resources.
//!
//! ## Module Structure
//!
//! - `loader.rs` - Reads multi-document YAML manifests and the chart version
//! - `prepare.rs` - Labels, namespace and credential injection
//! - `apply.rs` - Server-side apply and best-effort deletion
//! - `readiness.rs` - Concurrent existence polling under one deadline
//! - `pipeline.rs` - The install pipeline run for Processing and Ready

mod apply;
mod loader;
mod pipeline;
mod prepare;
mod readiness;

pub use apply::{apply_resources, delete_resources, ResourceError};
pub use loader::{chart_version, load_manifests};
pub use pipeline::{delete_outdated_resources, reconcile_resources, PipelineError, PrepareError};
pub use prepare::{prepare_module_resources, ModuleInputs};
pub use readiness::{wait_for_resources_readiness, ReadinessError};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to walk manifest directory: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("failed to parse {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid manifest in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("{kind} {name} not found among module manifests")]
    MissingObject { kind: String, name: String },
    #[error("{0}")]
    ChartVersion(String),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
