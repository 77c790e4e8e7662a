//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// KeyMaster - declarative Vault policies and TLS certificate-auth roles
#[derive(Parser, Debug)]
#[command(name = "keymaster")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "KEYMASTER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "KEYMASTER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "KEYMASTER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand
    #[command(subcommand)]
    pub command: Command,
}

/// Policy output format
#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolicyFormat {
    /// Vault HCL
    #[default]
    Hcl,
    /// JSON policy document
    Json,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the policy synthesized for a role
    Policy {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
        /// Output format
        #[arg(short, long, value_enum, default_value_t = PolicyFormat::Hcl)]
        format: PolicyFormat,
    },

    /// Write a role's policy and TLS auth role, then verify convergence
    Apply {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
        /// Resolved addresses allowed to authenticate (repeatable)
        #[arg(short, long = "address")]
        addresses: Vec<String>,
    },

    /// TLS certificate-auth role commands
    #[command(subcommand, name = "tls-auth")]
    TlsAuth(TlsAuthCommand),
}

/// TLS auth subcommands
#[derive(Subcommand, Debug)]
pub enum TlsAuthCommand {
    /// Print the role's current TLS auth document
    Read {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
    },

    /// Attach another role's policy to this role
    AddPolicy {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
        /// Role whose policy is attached (YAML)
        #[arg(short, long)]
        grant: PathBuf,
    },

    /// Detach another role's policy from this role
    RemovePolicy {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
        /// Role whose policy is detached (YAML)
        #[arg(short, long)]
        grant: PathBuf,
    },

    /// Delete the role's TLS auth document
    Delete {
        /// Role definition (YAML)
        role: PathBuf,
        /// Environment name
        #[arg(short, long)]
        env: String,
    },
}
