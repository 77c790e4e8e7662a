//! Error types for KeyMaster

use std::io;

use thiserror::Error;

use crate::diff::MismatchReport;

/// Result type alias for KeyMaster
pub type Result<T> = std::result::Result<T, Error>;

/// KeyMaster errors
#[derive(Error, Debug)]
pub enum Error {
    /// Bad generator or engine parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Malformed role (empty name/team, missing principals, ...)
    #[error("Invalid role: {0}")]
    InvalidRole(String),

    /// Empty or malformed environment name
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),

    /// IP address that cannot be turned into a CIDR
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Remote document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure or unexpected backend status
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Documents differ; carries every discrepancy found
    #[error("Structural mismatch: {0}")]
    StructuralMismatch(MismatchReport),

    /// Configuration loading error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Returns `true` when the error means the remote document is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Process exit code used by the CLI for this error class.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidRole(_)
            | Self::InvalidEnvironment(_)
            | Self::InvalidAddress(_)
            | Self::InvalidConfiguration(_)
            | Self::Config(_) => 2,
            Self::NotFound(_) => 3,
            Self::BackendUnavailable(_) => 4,
            Self::StructuralMismatch(_) => 5,
            Self::Io(_) | Self::Json(_) | Self::Yaml(_) => 1,
        }
    }
}
