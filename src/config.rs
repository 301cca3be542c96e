//! Configuration management for abap-remote-auth
//!
//! This module handles loading, parsing, validating, and managing
//! configuration from files, environment variables, and CLI overrides.

use crate::auth::connection_key;
use crate::error::{AbapAuthError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default interactive login timeout in seconds
pub const DEFAULT_LOGIN_TIMEOUT_SECONDS: u64 = 60;

/// Main configuration structure
///
/// Holds the auth runtime settings and the list of remote connections.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Login runtime settings
    #[serde(default)]
    pub auth: AuthSettings,

    /// Remote ABAP connections
    #[serde(default)]
    pub connections: Vec<ConnectionConfig>,
}

/// Settings shared by every interactive login
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Seconds an interactive grant may take before it is abandoned
    #[serde(default = "default_login_timeout")]
    pub login_timeout_seconds: u64,

    /// Local port for the OAuth redirect listener (`0` lets the OS pick)
    #[serde(default)]
    pub redirect_port: u16,
}

fn default_login_timeout() -> u64 {
    DEFAULT_LOGIN_TIMEOUT_SECONDS
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            login_timeout_seconds: default_login_timeout(),
            redirect_port: 0,
        }
    }
}

/// A single remote ABAP connection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Logical connection name, also the connection id
    pub name: String,

    /// Base URL of the ABAP system
    #[serde(default)]
    pub url: String,

    /// OAuth settings; absent when the system uses basic authentication
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthConfig>,
}

/// Per-connection OAuth client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthConfig {
    /// OAuth client id
    pub client_id: String,

    /// OAuth client secret
    pub client_secret: String,

    /// Base URL of the authorization server
    pub login_url: String,

    /// Persist tokens in the OS keyring between runs
    #[serde(default)]
    pub save_credentials: bool,
}

impl OAuthConfig {
    /// Returns `true` when client id, client secret and login URL are all set.
    pub fn is_complete(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty() && !self.login_url.is_empty()
    }
}

impl Config {
    /// Load configuration from file with environment and CLI overrides
    ///
    /// # Arguments
    ///
    /// * `path` - Path to configuration file
    /// * `cli` - CLI arguments for overrides
    ///
    /// # Returns
    ///
    /// Returns the loaded and merged configuration
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read or parsed
    pub fn load(path: &str, cli: &crate::cli::Cli) -> Result<Self> {
        let mut config = if Path::new(path).exists() {
            Self::from_file(path)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path);
            Self::default()
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(AbapAuthError::from)
            .with_context(|| format!("Failed to read config file {}", path))?;
        serde_yaml::from_str(&contents)
            .map_err(AbapAuthError::from)
            .with_context(|| format!("Failed to parse config file {}", path))
    }

    fn apply_env_vars(&mut self) {
        if let Ok(timeout) = std::env::var("ABAP_REMOTE_AUTH_LOGIN_TIMEOUT") {
            match timeout.parse::<u64>() {
                Ok(v) => {
                    self.auth.login_timeout_seconds = v;
                    tracing::debug!(
                        login_timeout_seconds = v,
                        "Env override: ABAP_REMOTE_AUTH_LOGIN_TIMEOUT"
                    );
                }
                Err(_) => {
                    tracing::warn!(
                        "Invalid value for ABAP_REMOTE_AUTH_LOGIN_TIMEOUT: {}",
                        timeout
                    );
                }
            }
        }

        if let Ok(port) = std::env::var("ABAP_REMOTE_AUTH_REDIRECT_PORT") {
            match port.parse::<u16>() {
                Ok(v) => {
                    self.auth.redirect_port = v;
                    tracing::debug!(redirect_port = v, "Env override: ABAP_REMOTE_AUTH_REDIRECT_PORT");
                }
                Err(_) => {
                    tracing::warn!("Invalid value for ABAP_REMOTE_AUTH_REDIRECT_PORT: {}", port);
                }
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &crate::cli::Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }
        if let Some(timeout) = cli.login_timeout {
            self.auth.login_timeout_seconds = timeout;
            tracing::debug!(login_timeout_seconds = timeout, "CLI override: --login-timeout");
        }
    }

    /// Looks up a connection by name using the same key normalization as
    /// the token cache.
    pub fn connection(&self, name: &str) -> Result<&ConnectionConfig> {
        let key = connection_key(name);
        self.connections
            .iter()
            .find(|c| connection_key(&c.name) == key)
            .ok_or_else(|| AbapAuthError::ConnectionNotFound(name.to_string()).into())
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns error if the timeout is zero, a connection name is empty or
    /// duplicated, or an `oauth` block is missing required fields.
    pub fn validate(&self) -> Result<()> {
        if self.auth.login_timeout_seconds == 0 {
            return Err(AbapAuthError::Config(
                "auth.login_timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        let mut seen = HashSet::new();
        for connection in &self.connections {
            let key = connection_key(&connection.name);
            if key.is_empty() {
                return Err(
                    AbapAuthError::Config("connection name cannot be empty".to_string()).into(),
                );
            }
            if !seen.insert(key) {
                return Err(AbapAuthError::Config(format!(
                    "duplicate connection name: {}",
                    connection.name
                ))
                .into());
            }
            if let Some(oauth) = &connection.oauth {
                if !oauth.is_complete() {
                    return Err(AbapAuthError::Config(format!(
                        "connection {}: oauth requires client_id, client_secret and login_url",
                        connection.name
                    ))
                    .into());
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oauth() -> OAuthConfig {
        OAuthConfig {
            client_id: "c1".to_string(),
            client_secret: "s1".to_string(),
            login_url: "https://login.example.com".to_string(),
            save_credentials: true,
        }
    }

    fn connection(name: &str, oauth: Option<OAuthConfig>) -> ConnectionConfig {
        ConnectionConfig {
            name: name.to_string(),
            url: "https://dev.example.com".to_string(),
            oauth,
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.auth.login_timeout_seconds, 60);
        assert_eq!(config.auth.redirect_port, 0);
        assert!(config.connections.is_empty());
    }

    #[test]
    fn test_config_validation_success() {
        let mut config = Config::default();
        config.connections.push(connection("dev100", Some(oauth())));
        config.connections.push(connection("qas", None));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_zero_timeout() {
        let mut config = Config::default();
        config.auth.login_timeout_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_duplicate_names_ignore_case() {
        let mut config = Config::default();
        config.connections.push(connection("DEV100", None));
        config.connections.push(connection("dev100", None));
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"), "unexpected error: {err}");
    }

    #[test]
    fn test_config_validation_empty_name() {
        let mut config = Config::default();
        config.connections.push(connection("  ", None));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_incomplete_oauth() {
        let mut config = Config::default();
        let mut partial = oauth();
        partial.client_secret.clear();
        config.connections.push(connection("dev100", Some(partial)));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
auth:
  login_timeout_seconds: 30
connections:
  - name: dev100
    url: https://dev100.example.com
    oauth:
      client_id: c1
      client_secret: s1
      login_url: https://login.example.com
      save_credentials: true
  - name: qas
    url: https://qas.example.com
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.auth.login_timeout_seconds, 30);
        assert_eq!(config.auth.redirect_port, 0);
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].oauth, Some(oauth()));
        assert!(config.connections[1].oauth.is_none());
    }

    #[test]
    fn test_save_credentials_defaults_to_false() {
        let yaml = "client_id: a\nclient_secret: b\nlogin_url: https://x\n";
        let oauth: OAuthConfig = serde_yaml::from_str(yaml).unwrap();
        assert!(!oauth.save_credentials);
    }

    #[test]
    fn test_connection_lookup_is_case_insensitive() {
        let mut config = Config::default();
        config.connections.push(connection("Dev100", None));
        assert_eq!(config.connection("DEV100").unwrap().name, "Dev100");
        assert!(config.connection("missing").is_err());
    }

    #[test]
    fn test_oauth_is_complete() {
        assert!(oauth().is_complete());
        let mut missing = oauth();
        missing.login_url.clear();
        assert!(!missing.is_complete());
    }
}
