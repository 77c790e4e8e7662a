//! The KeyMaster engine.
//!
//! Holds the backend handle and the mount layout. The engine keeps no state
//! between calls: every operation is rebuilt from the caller's [`Role`] and
//! whatever currently lives in the backend. Per-write settings (CA
//! certificate, IP restriction) are passed explicitly to each call; see
//! [`crate::tls_auth::TlsAuthSettings`].

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::audit::{self, AuditEvent};
use crate::backend::{Document, HttpBackend, SecretBackend};
use crate::config::Config;
use crate::model::Role;
use crate::policy::{self, Policy};
use crate::{Error, Result};

/// Default mount of the cert auth method.
pub const DEFAULT_TLS_AUTH_MOUNT: &str = "cert";

/// Reconciliation engine bound to one backend.
#[derive(Clone)]
pub struct KeyMaster {
    pub(crate) backend: Arc<dyn SecretBackend>,
    tls_auth_mount: String,
}

impl KeyMaster {
    /// Create an engine over `backend` with the default cert mount.
    #[must_use]
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            backend,
            tls_auth_mount: DEFAULT_TLS_AUTH_MOUNT.to_string(),
        }
    }

    /// Use a non-default mount for the cert auth method.
    #[must_use]
    pub fn with_tls_auth_mount(mut self, mount: impl Into<String>) -> Self {
        self.tls_auth_mount = mount.into().trim_matches('/').to_string();
        self
    }

    /// Build an engine talking to the Vault server named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if the backend cannot be built.
    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = HttpBackend::new(&config.vault)?;
        Ok(Self::new(Arc::new(backend)).with_tls_auth_mount(config.tls_auth.mount.clone()))
    }

    /// The backend this engine writes to.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SecretBackend> {
        &self.backend
    }

    /// Backend path of the TLS-auth role named `name`.
    #[must_use]
    pub fn tls_auth_path(&self, name: &str) -> String {
        format!("auth/{}/certs/{name}", self.tls_auth_mount)
    }

    /// Backend path of the policy named `name`.
    #[must_use]
    pub fn policy_path(name: &str) -> String {
        format!("sys/policy/{name}")
    }

    /// Synthesize the policy for `role` in `environment`.
    ///
    /// Pure; see [`policy::new_policy`].
    pub fn new_policy(role: &Role, environment: &str) -> Result<Policy> {
        policy::new_policy(role, environment)
    }

    /// Write a synthesized policy to the backend as HCL.
    pub async fn write_policy(&self, policy: &Policy) -> Result<()> {
        if policy.name.is_empty() {
            return Err(Error::InvalidRole("policy has no name".to_string()));
        }
        let path = Self::policy_path(&policy.name);
        let mut body = Document::new();
        body.insert("policy".to_string(), Value::String(policy.document.to_hcl()));

        debug!(policy = %policy.name, grants = policy.document.grants.len(), "Writing policy");
        self.backend.write(&path, &body).await?;
        audit::emit(&AuditEvent::policy_written(&path, &policy.name));
        Ok(())
    }

    /// Delete the policy named `name`. Deleting an absent policy succeeds.
    pub async fn delete_policy(&self, name: &str) -> Result<()> {
        let path = Self::policy_path(name);
        self.backend.delete(&path).await?;
        audit::emit(&AuditEvent::policy_deleted(&path, name));
        Ok(())
    }
}
