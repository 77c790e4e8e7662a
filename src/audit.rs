//! Audit logging for reconciliation events.
//!
//! Every change KeyMaster makes (or declines to make) on the backend is
//! emitted via `tracing::info!` with the event serialized as JSON.
//!
//! # Events
//!
//! | Event | When |
//! |-------|------|
//! | `tls_role.written` | A TLS-auth role document was fully replaced |
//! | `tls_role.policy_added` | A policy was appended to a role's policy set |
//! | `tls_role.policy_removed` | A policy was dropped from a role's policy set |
//! | `tls_role.unchanged` | An add/remove was a no-op; nothing was written |
//! | `tls_role.deleted` | A TLS-auth role document was deleted |
//! | `policy.written` | A policy document was written |
//! | `policy.deleted` | A policy document was deleted |

use serde::Serialize;

/// Structured audit event.
#[derive(Debug, Serialize)]
pub struct AuditEvent {
    /// Event type string (e.g., `"tls_role.written"`).
    pub event: &'static str,
    /// Backend path that was touched.
    pub path: String,
    /// Policy the event is about (added/removed/written).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<String>,
    /// Resulting attached policy set, for role events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policies: Option<Vec<String>>,
}

impl AuditEvent {
    /// Construct a `tls_role.written` event.
    #[must_use]
    pub fn tls_role_written(path: &str, policies: &[String]) -> Self {
        Self {
            event: "tls_role.written",
            path: path.to_string(),
            policy: None,
            policies: Some(policies.to_vec()),
        }
    }

    /// Construct a `tls_role.policy_added` event.
    #[must_use]
    pub fn policy_added(path: &str, policy: &str, policies: &[String]) -> Self {
        Self {
            event: "tls_role.policy_added",
            path: path.to_string(),
            policy: Some(policy.to_string()),
            policies: Some(policies.to_vec()),
        }
    }

    /// Construct a `tls_role.policy_removed` event.
    #[must_use]
    pub fn policy_removed(path: &str, policy: &str, policies: &[String]) -> Self {
        Self {
            event: "tls_role.policy_removed",
            path: path.to_string(),
            policy: Some(policy.to_string()),
            policies: Some(policies.to_vec()),
        }
    }

    /// Construct a `tls_role.unchanged` event.
    #[must_use]
    pub fn unchanged(path: &str, policy: &str) -> Self {
        Self {
            event: "tls_role.unchanged",
            path: path.to_string(),
            policy: Some(policy.to_string()),
            policies: None,
        }
    }

    /// Construct a `tls_role.deleted` event.
    #[must_use]
    pub fn tls_role_deleted(path: &str) -> Self {
        Self {
            event: "tls_role.deleted",
            path: path.to_string(),
            policy: None,
            policies: None,
        }
    }

    /// Construct a `policy.written` event.
    #[must_use]
    pub fn policy_written(path: &str, policy: &str) -> Self {
        Self {
            event: "policy.written",
            path: path.to_string(),
            policy: Some(policy.to_string()),
            policies: None,
        }
    }

    /// Construct a `policy.deleted` event.
    #[must_use]
    pub fn policy_deleted(path: &str, policy: &str) -> Self {
        Self {
            event: "policy.deleted",
            path: path.to_string(),
            policy: Some(policy.to_string()),
            policies: None,
        }
    }
}

/// Emit an audit event via `tracing::info!` with structured fields.
///
/// ```text
/// INFO keymaster::audit audit={"event":"tls_role.written","path":...}
/// ```
pub fn emit(event: &AuditEvent) {
    match serde_json::to_string(event) {
        Ok(ref json) => tracing::info!(audit = %json, "keymaster audit"),
        Err(ref e) => tracing::warn!(error = %e, "Failed to serialize audit event"),
    }
}
