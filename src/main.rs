//! abap-remote-auth - OAuth logins for remote ABAP systems
//!
#![doc = "abap-remote-auth - OAuth logins for remote ABAP systems"]
#![doc = "Main entry point for the abap-remote-auth command."]

use anyhow::Result;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use abap_remote_auth::cli::{Cli, Commands};
use abap_remote_auth::commands;
use abap_remote_auth::config::Config;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let cli = Cli::parse_args();

    init_tracing(cli.verbose);

    // Load configuration
    let config_path = cli.config.as_deref().unwrap_or("config/config.yaml");
    let config = Config::load(config_path, &cli)?;

    // Validate configuration
    config.validate()?;

    match cli.command {
        Commands::Login {
            connection,
            print_token,
        } => {
            tracing::info!(connection = %connection, "Starting login");
            commands::login::run_login(config, connection, print_token).await?;
            Ok(())
        }
        Commands::Logout { connection } => {
            tracing::info!(connection = %connection, "Starting logout");
            commands::logout::run_logout(config, connection).await?;
            Ok(())
        }
        Commands::Connections => {
            commands::connections::list_connections(&config)?;
            Ok(())
        }
    }
}

/// Initialize tracing subscriber with environment filter
fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "abap_remote_auth=debug"
    } else {
        "abap_remote_auth=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
