//! The normalized sandbox decision and the two wire-shape mappings.
//!
//! The two executors speak different protocols: Runtime A reports an exit
//! code plus one JSON line on stdout, Runtime B returns one structured
//! message. Both collapse into a single `SandboxOutcome` here so the audit
//! logger and the HTTP-facing layer never see executor-specific shapes.

use serde::Deserialize;

/// Why a sandbox run ended in an error instead of a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxErrorKind {
    /// The validator was forcibly killed at the deadline.
    Timeout,
    /// The validator exited abnormally.
    Crash,
    /// Exit code claimed a decision but stdout was not one JSON object.
    BadOutput,
    /// The isolate returned a message without a boolean `valid` field.
    BadResponseFormat,
    /// The validator exceeded its memory budget.
    MemoryLimit,
    /// A host-side failure while running the validator.
    Internal,
}

impl SandboxErrorKind {
    /// Stable wire name for audit records and responses.
    pub fn as_str(&self) -> &'static str {
        match self {
            SandboxErrorKind::Timeout => "validator_timeout",
            SandboxErrorKind::Crash => "validator_crash",
            SandboxErrorKind::BadOutput => "validator_bad_output",
            SandboxErrorKind::BadResponseFormat => "invalid_validator_response_format",
            SandboxErrorKind::MemoryLimit => "validator_memory_limit",
            SandboxErrorKind::Internal => "validator_internal_error",
        }
    }
}

/// Terminal decision for one validation request.
///
/// Produced exactly once per accepted request; never partially applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// The download may proceed.
    Allow {
        /// Optional reason supplied by the validator (or the dispatcher).
        reason: Option<String>,
    },
    /// The validator denied the download.
    Deny {
        /// Reason supplied by the validator.
        reason: String,
    },
    /// The validator could not produce a decision. Never defaulted to
    /// `Allow`.
    Error {
        /// What went wrong.
        kind: SandboxErrorKind,
        /// Executor-specific detail (stderr, parse error, kill notice).
        detail: String,
    },
}

impl SandboxOutcome {
    /// Check if this outcome allows the download.
    pub fn is_allow(&self) -> bool {
        matches!(self, SandboxOutcome::Allow { .. })
    }

    /// Check if this outcome is an executor error.
    pub fn is_error(&self) -> bool {
        matches!(self, SandboxOutcome::Error { .. })
    }

    /// Reason string for audit records and responses.
    pub fn reason(&self) -> String {
        match self {
            SandboxOutcome::Allow { reason } => {
                reason.clone().unwrap_or_else(|| "validated".to_string())
            }
            SandboxOutcome::Deny { reason } => reason.clone(),
            SandboxOutcome::Error { kind, detail } => {
                if detail.is_empty() {
                    kind.as_str().to_string()
                } else {
                    format!("{}: {}", kind.as_str(), detail)
                }
            }
        }
    }

    /// HTTP-style status code: 200 allow, 403 deny, 502 timeout/crash,
    /// 500 other executor errors.
    pub fn status_code(&self) -> u16 {
        match self {
            SandboxOutcome::Allow { .. } => 200,
            SandboxOutcome::Deny { .. } => 403,
            SandboxOutcome::Error { kind, .. } => match kind {
                SandboxErrorKind::Timeout | SandboxErrorKind::Crash => 502,
                _ => 500,
            },
        }
    }
}

/// Exit code a Runtime A validator uses to deny a download.
pub const EXIT_CODE_DENY: i32 = 3;

/// The JSON object a Runtime A validator prints on stdout.
#[derive(Debug, Deserialize)]
struct ProcessReport {
    reason: Option<String>,
    error: Option<String>,
}

/// Normalize a Runtime A result: exit code plus the single JSON object the
/// child printed on stdout.
///
/// Malformed stdout on a decision exit code (0 or 3) is escalated to
/// `Error(BadOutput)`, never silently treated as allow or deny.
pub fn normalize_process_result(exit_code: i32, stdout: &str, stderr: &str) -> SandboxOutcome {
    let report: Option<ProcessReport> = serde_json::from_str(stdout.trim()).ok();

    match exit_code {
        0 => match report {
            Some(report) => SandboxOutcome::Allow {
                reason: report.reason,
            },
            None => SandboxOutcome::Error {
                kind: SandboxErrorKind::BadOutput,
                detail: format!("exit 0 with non-JSON stdout: {:?}", truncate(stdout)),
            },
        },
        EXIT_CODE_DENY => match report.and_then(|r| r.reason) {
            Some(reason) => SandboxOutcome::Deny { reason },
            None => SandboxOutcome::Error {
                kind: SandboxErrorKind::BadOutput,
                detail: format!(
                    "exit {EXIT_CODE_DENY} without a reason field: {:?}",
                    truncate(stdout)
                ),
            },
        },
        code => {
            // Prefer the parsed error field, fall back to stderr.
            let detail = report
                .and_then(|r| r.error)
                .unwrap_or_else(|| truncate(stderr));
            SandboxOutcome::Error {
                kind: SandboxErrorKind::Crash,
                detail: format!("exit code {code}: {detail}"),
            }
        }
    }
}

/// Normalize the single message a Runtime B isolate sends back.
///
/// The message must be a JSON object with a boolean `valid` field;
/// anything else is `Error(BadResponseFormat)`.
pub fn normalize_isolate_message(message: &serde_json::Value) -> SandboxOutcome {
    let Some(object) = message.as_object() else {
        return SandboxOutcome::Error {
            kind: SandboxErrorKind::BadResponseFormat,
            detail: "validator message is not an object".to_string(),
        };
    };
    let Some(valid) = object.get("valid").and_then(|v| v.as_bool()) else {
        return SandboxOutcome::Error {
            kind: SandboxErrorKind::BadResponseFormat,
            detail: "validator message has no boolean `valid` field".to_string(),
        };
    };

    let text = |key: &str| {
        object
            .get(key)
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
    };

    if valid {
        SandboxOutcome::Allow {
            reason: text("reason"),
        }
    } else {
        let reason = text("error")
            .or_else(|| text("reason"))
            .unwrap_or_else(|| "validation_failed".to_string());
        SandboxOutcome::Deny { reason }
    }
}

fn truncate(s: &str) -> String {
    const MAX: usize = 256;
    let s = s.trim();
    if s.len() <= MAX {
        s.to_string()
    } else {
        let cut: String = s.chars().take(MAX).collect();
        format!("{cut}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_process_allow_with_reason() {
        let outcome = normalize_process_result(0, r#"{"reason":"ok"}"#, "");
        assert_eq!(
            outcome,
            SandboxOutcome::Allow {
                reason: Some("ok".into())
            }
        );
        assert_eq!(outcome.status_code(), 200);
    }

    #[test]
    fn test_process_allow_without_reason() {
        let outcome = normalize_process_result(0, "{}", "");
        assert_eq!(outcome, SandboxOutcome::Allow { reason: None });
        assert_eq!(outcome.reason(), "validated");
    }

    #[test]
    fn test_process_deny_requires_reason() {
        let outcome = normalize_process_result(3, r#"{"reason":"license_mismatch"}"#, "");
        assert_eq!(
            outcome,
            SandboxOutcome::Deny {
                reason: "license_mismatch".into()
            }
        );
        assert_eq!(outcome.status_code(), 403);

        // Deny exit code with no reason is a protocol violation
        let outcome = normalize_process_result(3, "{}", "");
        assert!(matches!(
            outcome,
            SandboxOutcome::Error {
                kind: SandboxErrorKind::BadOutput,
                ..
            }
        ));
    }

    #[test]
    fn test_process_malformed_stdout_is_never_allow() {
        let outcome = normalize_process_result(0, "not json at all", "");
        assert!(matches!(
            outcome,
            SandboxOutcome::Error {
                kind: SandboxErrorKind::BadOutput,
                ..
            }
        ));
        assert!(!outcome.is_allow());
    }

    #[test]
    fn test_process_crash_prefers_error_field() {
        let outcome = normalize_process_result(1, r#"{"error":"boom"}"#, "traceback...");
        match outcome {
            SandboxOutcome::Error {
                kind: SandboxErrorKind::Crash,
                detail,
            } => {
                assert!(detail.contains("exit code 1"));
                assert!(detail.contains("boom"));
            }
            other => panic!("expected crash, got {other:?}"),
        }
    }

    #[test]
    fn test_process_crash_falls_back_to_stderr() {
        let outcome = normalize_process_result(2, "", "SyntaxError: bad validator");
        match outcome {
            SandboxOutcome::Error { detail, .. } => {
                assert!(detail.contains("SyntaxError"));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_eq!(
            normalize_process_result(2, "", "x").status_code(),
            502
        );
    }

    #[test]
    fn test_isolate_valid_true() {
        let outcome = normalize_isolate_message(&json!({"valid": true, "reason": "ok"}));
        assert_eq!(
            outcome,
            SandboxOutcome::Allow {
                reason: Some("ok".into())
            }
        );
    }

    #[test]
    fn test_isolate_valid_false_uses_error_then_reason() {
        let outcome = normalize_isolate_message(&json!({"valid": false, "error": "quota_exceeded"}));
        assert_eq!(
            outcome,
            SandboxOutcome::Deny {
                reason: "quota_exceeded".into()
            }
        );

        let outcome = normalize_isolate_message(&json!({"valid": false, "reason": "expired"}));
        assert_eq!(
            outcome,
            SandboxOutcome::Deny {
                reason: "expired".into()
            }
        );

        let outcome = normalize_isolate_message(&json!({"valid": false}));
        assert_eq!(
            outcome,
            SandboxOutcome::Deny {
                reason: "validation_failed".into()
            }
        );
    }

    #[test]
    fn test_isolate_missing_valid_field() {
        for message in [json!({"ok": true}), json!([1, 2, 3]), json!("allow")] {
            let outcome = normalize_isolate_message(&message);
            assert!(matches!(
                outcome,
                SandboxOutcome::Error {
                    kind: SandboxErrorKind::BadResponseFormat,
                    ..
                }
            ));
        }
    }

    #[test]
    fn test_error_reason_includes_kind() {
        let outcome = SandboxOutcome::Error {
            kind: SandboxErrorKind::Timeout,
            detail: "killed".into(),
        };
        assert_eq!(outcome.reason(), "validator_timeout: killed");
        assert_eq!(outcome.status_code(), 502);
    }
}
