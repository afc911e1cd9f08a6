//! Prelude module for convenient imports.

pub use crate::engine::{ValidationEngine, ValidationRequest, ValidationResponse};
pub use crate::error::{Result, ValidationError};
pub use crate::sandbox::config::EngineConfig;
pub use crate::sandbox::outcome::{SandboxErrorKind, SandboxOutcome};
pub use crate::store::Stores;
