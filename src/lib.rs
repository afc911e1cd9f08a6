//! # Validator Sandbox
//!
//! Admission-controlled sandbox execution of untrusted registry validator
//! scripts.
//!
//! Package publishers may attach a validator script to a release; on every
//! sensitive download this engine runs that script and returns an
//! allow/deny decision. The script is untrusted third-party input, so the
//! engine enforces:
//!
//! - **Access control first**: group membership is checked before any
//!   artifact fetch or execution; denied callers never run untrusted code
//! - **Admission control**: at most N sandboxes run concurrently,
//!   system-wide, with FIFO queuing for the rest
//! - **Hard deadlines**: validators are forcibly killed at
//!   `timeout + grace`, whether they are computing or stuck
//! - **Memory budgets**: subprocess rlimits for Python validators, a
//!   wasmtime resource limiter for Wasm validators
//! - **Mandatory audit**: every terminal decision appends one immutable
//!   audit record; a decision that cannot be recorded is not returned
//!
//! ## Runtimes
//!
//! Two validator runtimes are supported, selected by which artifact exists
//! in the object store (never inferred from output):
//!
//! - **Python** (`validator.py`): an isolated OS subprocess run by a fixed
//!   driver; protocol is exit code 0 (allow) / 3 (deny) plus one JSON
//!   object on stdout
//! - **Wasm** (`validator.wasm`): a `wasm32-wasip1` module in a fresh
//!   in-process wasmtime isolate; protocol is one JSON message
//!   `{valid, error?, reason?}` on stdout
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use validator_sandbox::prelude::*;
//! use validator_sandbox::store::{MemoryAuditStore, MemoryMetadataStore, MemoryObjectStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let stores = Stores {
//!         metadata: Arc::new(MemoryMetadataStore::new()),
//!         objects: Arc::new(MemoryObjectStore::new()),
//!         audit: Arc::new(MemoryAuditStore::new()),
//!     };
//!     let engine = ValidationEngine::new(EngineConfig::default(), stores)?;
//!
//!     let validation = engine
//!         .validate(ValidationRequest {
//!             package_name: "acme".into(),
//!             version: "1.0.0".into(),
//!             caller_id: "user-1".into(),
//!             caller_groups: ["devs".to_string()].into(),
//!             timeout: None,
//!         })
//!         .await?;
//!
//!     let response = ValidationResponse::from(&validation);
//!     assert_eq!(response.status, 200);
//!     Ok(())
//! }
//! ```

pub mod audit;
pub mod engine;
pub mod error;
pub mod gate;
pub mod prelude;
pub mod sandbox;
pub mod store;

// Re-export main types at crate root for convenience
pub use engine::{Validation, ValidationEngine, ValidationRequest, ValidationResponse};
pub use error::{Result, ValidationError};
pub use sandbox::admission::{AdmissionController, AdmissionSlot};
pub use sandbox::config::{EngineConfig, EngineConfigBuilder};
pub use sandbox::outcome::{SandboxErrorKind, SandboxOutcome};
