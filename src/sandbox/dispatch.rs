//! Validator artifact lookup and runtime selection.
//!
//! The runtime is decided once, by which artifact key exists in the object
//! store — never inferred from executor output. A missing artifact is a
//! valid state: packages without a validator script are allowed without
//! touching the admission controller.

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ValidationError};
use crate::store::ObjectStore;

/// Which scripting runtime a validator artifact targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidatorRuntime {
    /// External Python subprocess (Runtime A).
    Python,
    /// In-process WebAssembly isolate (Runtime B).
    Wasm,
}

impl ValidatorRuntime {
    /// File extension of this runtime's artifact.
    pub fn extension(&self) -> &'static str {
        match self {
            ValidatorRuntime::Python => "py",
            ValidatorRuntime::Wasm => "wasm",
        }
    }
}

/// A fetched validator script with its target runtime.
#[derive(Debug, Clone)]
pub struct ValidatorArtifact {
    /// Target runtime, selected once at lookup.
    pub runtime: ValidatorRuntime,
    /// Raw script or module bytes.
    pub source: Vec<u8>,
}

/// The payload handed to a validator, in both runtimes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorPayload {
    /// Package being downloaded.
    pub package_name: String,
    /// Version being downloaded.
    pub version: String,
    /// Package metadata from the registry.
    pub package_data: serde_json::Value,
    /// Caller requesting the download.
    pub caller_id: String,
    /// Caller's group memberships, sorted for stable output.
    pub caller_groups: Vec<String>,
}

/// Deterministic object key for a validator artifact.
pub fn artifact_key(package_name: &str, version: &str, runtime: ValidatorRuntime) -> String {
    format!(
        "validators/{package_name}/{version}/validator.{}",
        runtime.extension()
    )
}

/// Fetch the validator artifact for a package version, if any.
///
/// Tries the Python artifact first, falls back to the Wasm artifact.
/// Returns `Ok(None)` when neither exists. Store transport failures are
/// `ValidationError::Internal`, distinct from not-found.
pub async fn fetch_artifact(
    objects: &Arc<dyn ObjectStore>,
    package_name: &str,
    version: &str,
) -> Result<Option<ValidatorArtifact>> {
    for runtime in [ValidatorRuntime::Python, ValidatorRuntime::Wasm] {
        let key = artifact_key(package_name, version, runtime);
        let fetched = objects
            .get_object(&key)
            .await
            .map_err(ValidationError::Internal)?;
        if let Some(source) = fetched {
            debug!(key = %key, runtime = ?runtime, "validator artifact found");
            return Ok(Some(ValidatorArtifact { runtime, source }));
        }
    }
    debug!(package = %package_name, version = %version, "no validator artifact");
    Ok(None)
}
