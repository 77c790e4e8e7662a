//! KeyMaster - declarative Vault policies and TLS certificate-auth roles

use std::path::Path;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use keymaster::{
    KeyMaster, Result,
    cli::{Cli, Command, PolicyFormat, TlsAuthCommand},
    config::Config,
    model::Role,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup tracing
    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let outcome = match cli.command {
        Command::Policy { role, env, format } => run_policy(&role, &env, format),
        Command::Apply {
            role,
            env,
            addresses,
        } => run_apply(cli.config.as_deref(), &role, &env, &addresses).await,
        Command::TlsAuth(cmd) => run_tls_auth(cli.config.as_deref(), cmd).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("❌ {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

/// Print the synthesized policy
fn run_policy(role: &Path, env: &str, format: PolicyFormat) -> Result<()> {
    let role = Role::from_yaml_file(role)?;
    let policy = KeyMaster::new_policy(&role, env)?;

    match format {
        PolicyFormat::Hcl => print!("{}", policy.document.to_hcl()),
        PolicyFormat::Json => println!("{}", serde_json::to_string_pretty(&policy)?),
    }
    Ok(())
}

/// Write policy and TLS auth role, then verify the backend converged
async fn run_apply(
    config_path: Option<&Path>,
    role: &Path,
    env: &str,
    addresses: &[String],
) -> Result<()> {
    let config = Config::load(config_path)?;
    let settings = config.tls_auth_settings()?;
    let km = KeyMaster::from_config(&config)?;
    let role = Role::from_yaml_file(role)?;

    let policy = KeyMaster::new_policy(&role, env)?;
    km.write_policy(&policy).await?;

    let policy_names = vec![policy.name.clone()];
    km.write_tls_auth(&role, env, &policy_names, addresses, &settings)
        .await?;

    km.verify_tls_auth(&role, env, &policy_names, addresses, &settings)
        .await?;

    info!(policy = %policy.name, "Role converged");
    println!("✅ {} converged ({} grants)", policy.name, policy.document.grants.len());
    Ok(())
}

/// Run a TLS auth subcommand
async fn run_tls_auth(config_path: Option<&Path>, cmd: TlsAuthCommand) -> Result<()> {
    let config = Config::load(config_path)?;
    let km = KeyMaster::from_config(&config)?;

    match cmd {
        TlsAuthCommand::Read { role, env } => {
            let role = Role::from_yaml_file(&role)?;
            let document = km.read_tls_auth(&role, &env).await?;
            println!("{}", serde_json::to_string_pretty(&document)?);
        }
        TlsAuthCommand::AddPolicy { role, env, grant } => {
            let role = Role::from_yaml_file(&role)?;
            let policy = KeyMaster::new_policy(&Role::from_yaml_file(&grant)?, &env)?;
            km.add_policy_to_tls_role(&role, &env, &policy).await?;
            println!("✅ {} attached", policy.name);
        }
        TlsAuthCommand::RemovePolicy { role, env, grant } => {
            let role = Role::from_yaml_file(&role)?;
            let policy = KeyMaster::new_policy(&Role::from_yaml_file(&grant)?, &env)?;
            km.remove_policy_from_tls_role(&role, &env, &policy).await?;
            println!("✅ {} detached", policy.name);
        }
        TlsAuthCommand::Delete { role, env } => {
            let role = Role::from_yaml_file(&role)?;
            km.delete_tls_auth(&role, &env).await?;
            println!("✅ TLS auth role deleted");
        }
    }
    Ok(())
}
