//! Durable per-connection token records
//!
//! The vault writes the stripped form of a token to a [`SecretStore`] under
//! service [`vault_key`]`(connection name)` and account `client_id`. On
//! restore the stored refresh token is always exchanged for a fresh token,
//! so the raw stored access token is never handed out.
//!
//! Restore never fails: a missing, unreadable or malformed record, or a
//! rejected refresh, is reported as `None` so the caller falls back to an
//! interactive login.

use std::sync::Arc;

use crate::auth::provider::Authenticator;
use crate::auth::secret_store::SecretStore;
use crate::auth::token::{OAuthToken, StrippedToken, TokenStore};
use crate::config::{ConnectionConfig, OAuthConfig};
use crate::error::{AbapAuthError, Result};

/// Namespace prefix of every vault service name.
pub const VAULT_NAMESPACE: &str = "vscode_git_";

/// Builds the secret-store service name for a connection.
///
/// The name is trimmed, lowercased and form-url-encoded, so distinct
/// connection names never share a record and the result is safe for every
/// keyring backend.
///
/// # Examples
///
/// ```
/// use abap_remote_auth::auth::vault::vault_key;
///
/// assert_eq!(vault_key("Dev100"), "vscode_git_dev100");
/// assert_eq!(vault_key("my sys/100"), "vscode_git_my+sys%2F100");
/// ```
pub fn vault_key(connection_name: &str) -> String {
    let normalized = crate::auth::connection_key(connection_name);
    let escaped: String = url::form_urlencoded::byte_serialize(normalized.as_bytes()).collect();
    format!("{VAULT_NAMESPACE}{escaped}")
}

/// Token persistence over a [`SecretStore`].
pub struct SecretVault {
    secrets: Arc<dyn SecretStore>,
    authenticator: Arc<dyn Authenticator>,
}

impl SecretVault {
    /// Creates a vault writing to `secrets` and refreshing through
    /// `authenticator`.
    pub fn new(secrets: Arc<dyn SecretStore>, authenticator: Arc<dyn Authenticator>) -> Self {
        Self {
            secrets,
            authenticator,
        }
    }

    /// Persists the stripped form of `token` for `connection`.
    ///
    /// Does nothing when the connection has no complete OAuth configuration.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization or the secret store write fails.
    pub async fn save(&self, connection: &ConnectionConfig, token: &OAuthToken) -> Result<()> {
        let Some(oauth) = complete_oauth(connection) else {
            return Ok(());
        };

        let record = TokenStore::strip(token)
            .to_json()
            .map_err(AbapAuthError::Serialization)?;
        self.secrets
            .set_password(&vault_key(&connection.name), &oauth.client_id, &record)
            .await?;
        tracing::debug!(connection = %connection.name, "Saved token to vault");
        Ok(())
    }

    /// Restores and refreshes the token stored for `connection`.
    ///
    /// Returns `None` on any failure; see the module documentation.
    pub async fn load(&self, connection: &ConnectionConfig) -> Option<OAuthToken> {
        let oauth = complete_oauth(connection)?;

        let record = match self.read_record(connection, oauth).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                tracing::debug!(connection = %connection.name, "No usable vault record");
                return None;
            }
            Err(e) => {
                tracing::warn!(connection = %connection.name, error = %e, "Failed to read vault record");
                return None;
            }
        };

        match self.authenticator.refresh(oauth, &record).await {
            Ok(token) if token.is_usable() => {
                tracing::debug!(connection = %connection.name, "Restored token from vault");
                Some(token)
            }
            Ok(_) => {
                tracing::warn!(connection = %connection.name, "Refresh returned an unusable token");
                None
            }
            Err(e) => {
                tracing::warn!(connection = %connection.name, error = %e, "Failed to refresh vault token");
                None
            }
        }
    }

    /// Removes the record stored for `connection`.
    ///
    /// # Errors
    ///
    /// Returns an error when the secret store delete fails.
    pub async fn delete(&self, connection: &ConnectionConfig) -> Result<()> {
        let Some(oauth) = complete_oauth(connection) else {
            return Ok(());
        };
        self.secrets
            .delete_password(&vault_key(&connection.name), &oauth.client_id)
            .await
            .map_err(|e| AbapAuthError::Vault(format!("failed to delete record: {e}")))?;
        Ok(())
    }

    async fn read_record(
        &self,
        connection: &ConnectionConfig,
        oauth: &OAuthConfig,
    ) -> Result<Option<StrippedToken>> {
        let secret = self
            .secrets
            .get_password(&vault_key(&connection.name), &oauth.client_id)
            .await?;
        Ok(secret.as_deref().and_then(StrippedToken::from_json))
    }
}

fn complete_oauth(connection: &ConnectionConfig) -> Option<&OAuthConfig> {
    connection.oauth.as_ref().filter(|oauth| oauth.is_complete())
}
