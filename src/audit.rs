//! Audit records for terminal validation decisions.
//!
//! Every terminal decision — gate-level denial, no-validator allow,
//! sandbox allow/deny, executor error — appends exactly one immutable
//! record. Records are never mutated or deleted by this engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sandbox::outcome::SandboxOutcome;

/// Terminal status of a validation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The download was allowed.
    Validated,
    /// The download was denied or the validator failed.
    Blocked,
}

impl AuditStatus {
    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Validated => "validated",
            AuditStatus::Blocked => "blocked",
        }
    }
}

/// One immutable audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Unique id for this decision, even under concurrent writes.
    pub event_id: Uuid,
    /// Package the decision applies to.
    pub package_name: String,
    /// Version the decision applies to.
    pub version: String,
    /// Caller the decision applies to.
    pub caller_id: String,
    /// When the decision was made.
    pub timestamp: DateTime<Utc>,
    /// Terminal status.
    pub status: AuditStatus,
    /// Human-readable reason for the decision.
    pub reason: String,
}

impl AuditRecord {
    /// Create a record with a fresh v4 event id and the current time.
    pub fn new(
        package_name: &str,
        version: &str,
        caller_id: &str,
        status: AuditStatus,
        reason: &str,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            package_name: package_name.to_string(),
            version: version.to_string(),
            caller_id: caller_id.to_string(),
            timestamp: Utc::now(),
            status,
            reason: reason.to_string(),
        }
    }

    /// Build the record for a sandbox outcome.
    pub fn for_outcome(
        package_name: &str,
        version: &str,
        caller_id: &str,
        outcome: &SandboxOutcome,
    ) -> Self {
        let status = if outcome.is_allow() {
            AuditStatus::Validated
        } else {
            AuditStatus::Blocked
        };
        Self::new(package_name, version, caller_id, status, &outcome.reason())
    }
}
