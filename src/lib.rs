//! KeyMaster Library
//!
//! Translates declarative access-control intent (roles, the secrets they
//! need, and the certificate realms allowed to assume them) into HashiCorp
//! Vault configuration, and keeps that configuration converged.
//!
//! # Features
//!
//! - **Policy synthesis**: deterministic `{team}-{role}-{environment}` policies
//!   with one read grant per secret
//! - **TLS auth reconciliation**: full-replace writes plus idempotent
//!   add/remove of attached policies
//! - **CIDR restriction**: resolved addresses become host CIDRs
//! - **Convergence checks**: structural diff of intended vs. actual documents
//!
//! # Example
//!
//! ```no_run
//! # async fn run() -> keymaster::Result<()> {
//! use std::sync::Arc;
//! use keymaster::{KeyMaster, backend::InMemoryBackend, model::Role, tls_auth::TlsAuthSettings};
//!
//! let role = Role::from_yaml_file("roles/app1.yaml".as_ref())?;
//! let km = KeyMaster::new(Arc::new(InMemoryBackend::new()));
//! let policy = KeyMaster::new_policy(&role, "production")?;
//! let settings = TlsAuthSettings::default();
//! km.write_tls_auth(&role, "production", &[policy.name], &["10.0.0.1"], &settings)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod backend;
pub mod cidr;
pub mod cli;
pub mod config;
pub mod diff;
pub mod error;
pub mod generator;
pub mod keymaster;
pub mod model;
pub mod policy;
pub mod tls_auth;

pub use error::{Error, Result};
pub use keymaster::KeyMaster;

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        _ => subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
