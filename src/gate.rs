//! Access control gate: group checks before any untrusted code runs.
//!
//! Authorization failure must be cheaper and faster than running a
//! validator, and must not depend on sandbox availability. The gate is
//! checked before the artifact is even fetched; a caller who was already
//! going to be denied never causes untrusted code to execute.

use std::collections::HashSet;

use tracing::debug;

use crate::store::PackageRecord;

/// Reason attached to gate-level denials.
pub const DENY_INSUFFICIENT_GROUP_ACCESS: &str = "insufficient_group_access";

/// Outcome of the gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Proceed to validator dispatch.
    Proceed,
    /// Deny immediately; no sandbox is invoked.
    Deny,
}

/// Check a caller's groups against a package record.
///
/// Non-sensitive packages always proceed. Sensitive packages proceed only
/// when the caller shares at least one group with `allowed_groups`
/// (fail-closed: empty intersection denies).
pub fn check_access(record: &PackageRecord, caller_groups: &HashSet<String>) -> GateDecision {
    if !record.is_sensitive {
        return GateDecision::Proceed;
    }
    let authorized = record
        .allowed_groups
        .intersection(caller_groups)
        .next()
        .is_some();
    if authorized {
        GateDecision::Proceed
    } else {
        debug!("sensitive package denied: no overlapping groups");
        GateDecision::Deny
    }
}
