//! The validation engine: gate, dispatch, admission, execution, audit.
//!
//! One call to [`ValidationEngine::validate`] walks the whole pipeline:
//! access gate → validator dispatch → admission slot → executor →
//! normalized outcome → audit record. Every accepted request yields
//! exactly one outcome and one audit record; there is no silent failure
//! mode and no automatic retry — retrying a hung or crashing validator
//! would amplify a denial-of-service attempt, not mitigate it.

use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::AuditRecord;
use crate::error::{Result, ValidationError};
use crate::gate::{check_access, GateDecision, DENY_INSUFFICIENT_GROUP_ACCESS};
use crate::sandbox::admission::AdmissionController;
use crate::sandbox::config::EngineConfig;
use crate::sandbox::dispatch::{fetch_artifact, ValidatorPayload, ValidatorRuntime};
use crate::sandbox::isolate::IsolateExecutor;
use crate::sandbox::outcome::SandboxOutcome;
use crate::sandbox::process::ProcessExecutor;
use crate::store::Stores;

/// Reason attached when a package has no validator script.
pub const ALLOW_NO_VALIDATOR_SCRIPT: &str = "no_validator_script";

/// One inbound validation request. Immutable for its lifetime.
#[derive(Debug, Clone)]
pub struct ValidationRequest {
    /// Package being downloaded.
    pub package_name: String,
    /// Version being downloaded.
    pub version: String,
    /// Caller requesting the download.
    pub caller_id: String,
    /// Caller's group memberships.
    pub caller_groups: HashSet<String>,
    /// Execution timeout; falls back to the engine default when `None`.
    /// Queue wait time does not count against it.
    pub timeout: Option<Duration>,
}

/// The terminal result of one validation request.
#[derive(Debug, Clone)]
pub struct Validation {
    /// Normalized decision.
    pub outcome: SandboxOutcome,
    /// Event id of the audit record written for this decision.
    pub audit_event_id: Uuid,
}

/// Wire shape handed back to the registry's API layer.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResponse {
    /// Whether the download may proceed.
    pub valid: bool,
    /// Reason for the decision, when one exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// HTTP-style status: 200 allow, 403 deny, 502 timeout/crash,
    /// 500 other errors.
    pub status: u16,
}

impl From<&Validation> for ValidationResponse {
    fn from(validation: &Validation) -> Self {
        let reason = match &validation.outcome {
            SandboxOutcome::Allow { reason } => reason.clone(),
            other => Some(other.reason()),
        };
        Self {
            valid: validation.outcome.is_allow(),
            reason,
            status: validation.outcome.status_code(),
        }
    }
}

/// Admission-controlled sandbox execution of validator scripts.
pub struct ValidationEngine {
    config: EngineConfig,
    stores: Stores,
    admission: AdmissionController,
    process: ProcessExecutor,
    isolate: IsolateExecutor,
}

impl ValidationEngine {
    /// Create an engine with the given configuration and store handles.
    pub fn new(config: EngineConfig, stores: Stores) -> Result<Self> {
        let admission = AdmissionController::new(config.admission_limit, config.max_queue_depth);
        let process = ProcessExecutor::new(&config)?;
        let isolate = IsolateExecutor::new(&config)?;
        Ok(Self {
            config,
            stores,
            admission,
            process,
            isolate,
        })
    }

    /// The admission controller, exposed for observability.
    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    /// Validate one download request end to end.
    ///
    /// Returns `Err` only when no decision could be made (bad request,
    /// unknown package, store failure, queue rejection). Denials,
    /// timeouts, and validator crashes are `Ok` with the corresponding
    /// outcome, each backed by an audit record.
    pub async fn validate(&self, request: ValidationRequest) -> Result<Validation> {
        validate_request(&request)?;

        // Metadata is fetched fresh per request; caching it would let a
        // revoked group keep passing the gate.
        let record = self
            .stores
            .metadata
            .get_package(&request.package_name, &request.version)
            .await
            .map_err(ValidationError::Internal)?
            .ok_or_else(|| ValidationError::PackageNotFound {
                package: request.package_name.clone(),
                version: request.version.clone(),
            })?;

        // Gate before artifact fetch: untrusted code never runs for a
        // caller who was already going to be denied.
        if check_access(&record, &request.caller_groups) == GateDecision::Deny {
            let outcome = SandboxOutcome::Deny {
                reason: DENY_INSUFFICIENT_GROUP_ACCESS.to_string(),
            };
            return self.finish(&request, outcome).await;
        }

        let artifact = fetch_artifact(
            &self.stores.objects,
            &request.package_name,
            &request.version,
        )
        .await?;

        let Some(artifact) = artifact else {
            // No validator attached: allow without consuming a slot.
            let outcome = SandboxOutcome::Allow {
                reason: Some(ALLOW_NO_VALIDATOR_SCRIPT.to_string()),
            };
            return self.finish(&request, outcome).await;
        };

        let payload = build_payload(&request, record.data);
        let timeout = request.timeout.unwrap_or(self.config.default_timeout);

        // The timeout clock starts here, after the slot is granted, not
        // while queued.
        let slot = self.admission.acquire().await?;
        let outcome = match artifact.runtime {
            ValidatorRuntime::Python => {
                self.process.execute(&artifact.source, &payload, timeout).await
            }
            ValidatorRuntime::Wasm => {
                self.isolate.execute(&artifact.source, &payload, timeout).await
            }
        };
        drop(slot);

        self.finish(&request, outcome).await
    }

    /// Append the audit record and assemble the terminal result.
    ///
    /// Audit failure fails the request: a decision that cannot be
    /// recorded is not returned as success.
    async fn finish(&self, request: &ValidationRequest, outcome: SandboxOutcome) -> Result<Validation> {
        let record = AuditRecord::for_outcome(
            &request.package_name,
            &request.version,
            &request.caller_id,
            &outcome,
        );
        if let Err(e) = self.stores.audit.append(&record).await {
            warn!(event_id = %record.event_id, error = %e, "audit append failed");
            return Err(ValidationError::Internal(e));
        }

        info!(
            package = %request.package_name,
            version = %request.version,
            caller = %request.caller_id,
            status = record.status.as_str(),
            reason = %record.reason,
            event_id = %record.event_id,
            "validation decision"
        );

        Ok(Validation {
            outcome,
            audit_event_id: record.event_id,
        })
    }
}

fn validate_request(request: &ValidationRequest) -> Result<()> {
    if request.package_name.is_empty() {
        return Err(ValidationError::InvalidRequest("empty package name".into()));
    }
    if request.version.is_empty() {
        return Err(ValidationError::InvalidRequest("empty version".into()));
    }
    if request.caller_id.is_empty() {
        return Err(ValidationError::InvalidRequest("empty caller id".into()));
    }
    if request.timeout == Some(Duration::ZERO) {
        return Err(ValidationError::InvalidRequest("zero timeout".into()));
    }
    Ok(())
}

fn build_payload(request: &ValidationRequest, package_data: serde_json::Value) -> ValidatorPayload {
    let mut caller_groups: Vec<String> = request.caller_groups.iter().cloned().collect();
    caller_groups.sort();
    ValidatorPayload {
        package_name: request.package_name.clone(),
        version: request.version.clone(),
        package_data,
        caller_id: request.caller_id.clone(),
        caller_groups,
    }
}
