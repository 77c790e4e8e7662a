//! Configuration management
//!
//! # Example YAML
//!
//! ```yaml
//! vault:
//!   address: "https://vault.internal:8200"
//!   timeout: 10s
//! tls_auth:
//!   mount: cert
//!   ca_cert_file: /etc/keymaster/host-ca.pem
//!   ip_restrict: true
//! ```
//!
//! Every key can be overridden from the environment with the `KEYMASTER_`
//! prefix and `__` as the nesting separator, e.g.
//! `KEYMASTER_TLS_AUTH__IP_RESTRICT=true`.

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};

use crate::tls_auth::TlsAuthSettings;
use crate::{Error, Result};

/// Environment variable consulted when `vault.token` is unset.
pub const VAULT_TOKEN_ENV: &str = "VAULT_TOKEN";

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Backend connection
    pub vault: VaultConfig,
    /// Certificate auth settings
    pub tls_auth: TlsAuthConfig,
}

/// Vault connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Server address
    pub address: String,
    /// Token sent as `X-Vault-Token`; falls back to `VAULT_TOKEN`
    pub token: Option<String>,
    /// Enterprise namespace sent as `X-Vault-Namespace`
    pub namespace: Option<String>,
    /// Timeout applied to every backend request
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            token: None,
            namespace: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl VaultConfig {
    /// Configured token, or the `VAULT_TOKEN` environment variable.
    #[must_use]
    pub fn resolved_token(&self) -> Option<String> {
        self.token
            .clone()
            .or_else(|| env::var(VAULT_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
    }
}

/// Certificate auth configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsAuthConfig {
    /// Mount point of the cert auth method
    pub mount: String,
    /// Inline PEM CA certificate
    pub ca_cert: Option<String>,
    /// Path to a PEM CA certificate; used when `ca_cert` is unset
    pub ca_cert_file: Option<String>,
    /// Populate `bound_cidrs` / `token_bound_cidrs`
    pub ip_restrict: bool,
}

impl Default for TlsAuthConfig {
    fn default() -> Self {
        Self {
            mount: "cert".to_string(),
            ca_cert: None,
            ca_cert_file: None,
            ip_restrict: false,
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        figment = figment.merge(Env::prefixed("KEYMASTER_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.tls_auth.mount.trim_matches('/').is_empty() {
            return Err(Error::Config("tls_auth.mount must not be empty".to_string()));
        }
        if self.vault.timeout.is_zero() {
            return Err(Error::Config("vault.timeout must be positive".to_string()));
        }
        Ok(())
    }

    /// Build the immutable settings passed to each TLS-auth write.
    ///
    /// # Errors
    ///
    /// Returns an error if `ca_cert_file` is set but cannot be read.
    pub fn tls_auth_settings(&self) -> Result<TlsAuthSettings> {
        let ca_cert = match (&self.tls_auth.ca_cert, &self.tls_auth.ca_cert_file) {
            (Some(pem), _) => pem.clone(),
            (None, Some(file)) => std::fs::read_to_string(file).map_err(|e| {
                Error::Config(format!("Failed to read CA certificate {file}: {e}"))
            })?,
            (None, None) => String::new(),
        };
        Ok(TlsAuthSettings {
            ca_cert,
            ip_restrict: self.tls_auth.ip_restrict,
        })
    }
}
