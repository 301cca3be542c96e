//! Secret storage via the OS keyring
//!
//! [`SecretStore`] is the narrow interface the vault needs: set, get and
//! delete a secret addressed by `(service, account)`.
//! [`KeyringSecretStore`] backs it with the operating system's native
//! credential store (Keychain on macOS, Secret Service on Linux, Windows
//! Credential Manager on Windows).

use async_trait::async_trait;

use crate::error::{AbapAuthError, Result};

/// Durable secret storage addressed by service name and account.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stores `secret`, replacing any previous value.
    async fn set_password(&self, service: &str, account: &str, secret: &str) -> Result<()>;

    /// Returns the stored secret, or `Ok(None)` when nothing is stored.
    async fn get_password(&self, service: &str, account: &str) -> Result<Option<String>>;

    /// Removes the stored secret. Removing a missing entry is not an error.
    async fn delete_password(&self, service: &str, account: &str) -> Result<()>;
}

/// Stateless accessor for the OS native keyring.
///
/// Keyring calls block, so each one runs on the blocking thread pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeyringSecretStore;

impl KeyringSecretStore {
    async fn with_entry<T, F>(service: &str, account: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(keyring::Entry) -> std::result::Result<T, keyring::Error> + Send + 'static,
    {
        let service = service.to_string();
        let account = account.to_string();
        tokio::task::spawn_blocking(move || {
            let entry = keyring::Entry::new(&service, &account)?;
            op(entry)
        })
        .await
        .map_err(|e| AbapAuthError::Vault(format!("keyring task failed: {e}")))?
        .map_err(|e| AbapAuthError::Keyring(e).into())
    }
}

#[async_trait]
impl SecretStore for KeyringSecretStore {
    async fn set_password(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        let secret = secret.to_string();
        Self::with_entry(service, account, move |entry| entry.set_password(&secret)).await
    }

    async fn get_password(&self, service: &str, account: &str) -> Result<Option<String>> {
        Self::with_entry(service, account, |entry| match entry.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e),
        })
        .await
    }

    async fn delete_password(&self, service: &str, account: &str) -> Result<()> {
        Self::with_entry(service, account, |entry| match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e),
        })
        .await
    }
}
