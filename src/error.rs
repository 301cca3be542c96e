//! Error types for abap-remote-auth
//!
//! This module defines all error types used throughout the crate,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for abap-remote-auth operations
///
/// Covers configuration loading, collaborator failures (login server,
/// OAuth endpoints, OS keyring) and lookup errors. Failures of an
/// interactive grant are reported separately through [`GrantFailure`].
#[derive(Error, Debug)]
pub enum AbapAuthError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No connection with the given name is configured
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// The connection exists but carries no OAuth configuration
    #[error("OAuth is not configured for connection: {0}")]
    OAuthNotConfigured(String),

    /// Token endpoint rejected a request or returned garbage
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Local redirect listener failures
    #[error("Login server error: {0}")]
    LoginServer(String),

    /// Secret vault read/write failures
    #[error("Vault error: {0}")]
    Vault(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Outcome of a failed interactive grant.
///
/// A single grant is awaited by every caller that joined it while it was
/// pending, so the failure has to be `Clone`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrantFailure {
    /// The grant did not settle before the login timeout elapsed
    #[error("Logon timed out after {seconds} seconds")]
    LogonTimeout {
        /// The timeout that elapsed
        seconds: u64,
    },

    /// The login server or the code exchange failed
    #[error("Grant exchange failed: {0}")]
    Exchange(String),

    /// The grant task stopped without producing an outcome
    #[error("Grant aborted: {0}")]
    Aborted(String),
}

/// Result type alias for abap-remote-auth operations
///
/// Uses `anyhow::Error` so callers can attach context; the concrete
/// [`AbapAuthError`] or [`GrantFailure`] can be recovered with
/// `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;
