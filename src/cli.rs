//! Command-line interface definition for abap-remote-auth
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands to log in to, log out of and list remote connections.

use clap::{Parser, Subcommand};

/// abap-remote-auth - OAuth logins for remote ABAP systems
///
/// Obtains access tokens for configured connections, reusing cached and
/// vault-stored tokens before falling back to a browser login.
#[derive(Parser, Debug, Clone)]
#[command(name = "abap-remote-auth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the interactive login timeout in seconds
    #[arg(long)]
    pub login_timeout: Option<u64>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Obtain an access token for a connection
    Login {
        /// Connection name as configured
        #[arg(short = 'n', long)]
        connection: String,

        /// Print the access token to stdout
        #[arg(long)]
        print_token: bool,
    },

    /// Forget the stored token of a connection
    Logout {
        /// Connection name as configured
        #[arg(short = 'n', long)]
        connection: String,
    },

    /// List configured connections
    Connections,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            config: Some("config/config.yaml".to_string()),
            verbose: false,
            login_timeout: None,
            command: Commands::Connections,
        }
    }
}
