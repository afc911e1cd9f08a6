//! Error types for the validation engine.
//!
//! Sandbox-level denials, timeouts, and crashes are *outcomes*
//! ([`crate::sandbox::outcome::SandboxOutcome`]), not errors: a validator
//! that says "no" or blows up still produces a terminal decision and an
//! audit record. `ValidationError` covers the cases where the engine
//! cannot produce a decision at all.

use thiserror::Error;

/// Errors that prevent a validation request from reaching a decision.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// The request was malformed and never reached the access gate.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No package record exists for `packageName@version`.
    #[error("package not found: {package}@{version}")]
    PackageNotFound {
        /// The requested package name.
        package: String,
        /// The requested version.
        version: String,
    },

    /// The admission queue is at its configured depth bound.
    ///
    /// Only produced when `EngineConfig::max_queue_depth` is set; the
    /// default queue is unbounded.
    #[error("sandbox admission queue is full")]
    Overloaded,

    /// A store or transport failure unrelated to the untrusted script.
    #[error("internal error: {0}")]
    Internal(#[source] anyhow::Error),
}

impl ValidationError {
    /// Check if this error represents a missing package record.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ValidationError::PackageNotFound { .. })
    }

    /// Check if this error represents admission-queue rejection.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, ValidationError::Overloaded)
    }

    /// HTTP-style status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ValidationError::InvalidRequest(_) => 400,
            ValidationError::PackageNotFound { .. } => 404,
            ValidationError::Overloaded => 503,
            ValidationError::Internal(_) => 500,
        }
    }
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, ValidationError>;
