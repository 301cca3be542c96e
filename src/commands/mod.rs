/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes three top-level command modules:

- `login`       -- Obtain an access token for a connection
- `logout`      -- Forget the stored token of a connection
- `connections` -- List configured connections

The handlers build a [`GrantOrchestrator`] from the configuration and
delegate to it; the `*_with` variants take an orchestrator so tests can
inject fakes.
*/

use crate::auth::GrantOrchestrator;
use crate::config::Config;
use crate::error::Result;

/// Login command handler
pub mod login {
    use super::*;

    /// Resolves the access token for `connection_name`.
    ///
    /// Returns `Ok(None)` when the connection does not use OAuth. Waits for
    /// background vault saves before returning, so a saved token is on disk
    /// once the process exits.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is unknown or the login fails.
    pub async fn login_with(
        orchestrator: &GrantOrchestrator,
        config: &Config,
        connection_name: &str,
    ) -> Result<Option<String>> {
        let connection = config.connection(connection_name)?;
        let Some(login) = orchestrator.login(connection) else {
            tracing::debug!(connection = %connection.name, "Connection does not use OAuth");
            return Ok(None);
        };

        let result = login.invoke().await;
        orchestrator.flush().await;
        result.map(Some)
    }

    /// Run the `login` command.
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (consumed)
    /// * `connection_name` - Name of the configured connection
    /// * `print_token` - Print the access token instead of a confirmation
    pub async fn run_login(config: Config, connection_name: String, print_token: bool) -> Result<()> {
        let orchestrator = GrantOrchestrator::with_defaults(&config.auth);
        let outcome = login_with(&orchestrator, &config, &connection_name).await;
        orchestrator.shutdown().await;

        match outcome? {
            Some(token) if print_token => println!("{}", token),
            Some(_) => println!("Logged in to {}", connection_name),
            None => println!("{} does not use OAuth; no login required", connection_name),
        }
        Ok(())
    }

}

/// Logout command handler
pub mod logout {
    use super::*;

    /// Forgets the token of `connection_name` in memory and in the vault.
    ///
    /// # Errors
    ///
    /// Returns an error when the connection is unknown or the vault delete
    /// fails.
    pub async fn logout_with(
        orchestrator: &GrantOrchestrator,
        config: &Config,
        connection_name: &str,
    ) -> Result<()> {
        let connection = config.connection(connection_name)?;
        orchestrator.logout(connection).await
    }

    /// Run the `logout` command.
    pub async fn run_logout(config: Config, connection_name: String) -> Result<()> {
        let orchestrator = GrantOrchestrator::with_defaults(&config.auth);
        logout_with(&orchestrator, &config, &connection_name).await?;
        println!("Logged out of {}", connection_name);
        Ok(())
    }

}

/// Connections command handler
pub mod connections {
    use super::*;
    use crate::config::ConnectionConfig;

    /// One display line per configured connection.
    pub fn format_connections(config: &Config) -> Vec<String> {
        config
            .connections
            .iter()
            .map(|connection| format!("{:<20} {:<12} {}", connection.name, auth_kind(connection), connection.url))
            .collect()
    }

    fn auth_kind(connection: &ConnectionConfig) -> &'static str {
        match &connection.oauth {
            Some(oauth) if oauth.save_credentials => "oauth+vault",
            Some(_) => "oauth",
            None => "none",
        }
    }

    /// Run the `connections` command.
    pub fn list_connections(config: &Config) -> Result<()> {
        if config.connections.is_empty() {
            println!("No connections configured");
            return Ok(());
        }
        println!("{:<20} {:<12} URL", "NAME", "AUTH");
        for line in format_connections(config) {
            println!("{}", line);
        }
        Ok(())
    }

}
