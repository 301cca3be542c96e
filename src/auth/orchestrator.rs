//! Login orchestration for remote connections
//!
//! [`GrantOrchestrator`] owns the in-memory [`TokenStore`], the
//! [`PendingGrants`] registry and the [`SecretVault`], and resolves an access
//! token for a connection through a fallback chain where the first hit wins:
//!
//! 1. **Cache** -- a usable token in the [`TokenStore`]; no I/O.
//! 2. **Vault** -- only with `save_credentials`: restore the stored record and
//!    refresh it.
//! 3. **Interactive grant** -- bind a login server, run the code grant and
//!    race it against the login timeout.
//!
//! Everything after the cache miss runs as one task registered in
//! [`PendingGrants`], so concurrent callers for a connection join the same
//! vault restore or grant. The task checks the cache once more before it
//! starts. When it settles it writes the token cache (on success) and then
//! removes itself from the registry, whatever the outcome. With
//! `save_credentials` a usable token from an interactive grant is persisted
//! by a tracked background task; a failed save is logged and never fails
//! the login.
//!
//! # Examples
//!
//! ```no_run
//! use abap_remote_auth::auth::GrantOrchestrator;
//! use abap_remote_auth::config::{AuthSettings, ConnectionConfig, OAuthConfig};
//!
//! # async fn example() -> abap_remote_auth::error::Result<()> {
//! let orchestrator = GrantOrchestrator::with_defaults(&AuthSettings::default());
//! let connection = ConnectionConfig {
//!     name: "dev100".to_string(),
//!     url: "https://dev100.example.com".to_string(),
//!     oauth: Some(OAuthConfig {
//!         client_id: "c1".to_string(),
//!         client_secret: "s1".to_string(),
//!         login_url: "https://login.example.com".to_string(),
//!         save_credentials: true,
//!     }),
//! };
//!
//! if let Some(login) = orchestrator.login(&connection) {
//!     let access_token = login.invoke().await?;
//!     println!("got {} bytes of token", access_token.len());
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_util::task::TaskTracker;

use crate::auth::connection_key;
use crate::auth::login_server::{LocalLoginServerFactory, LoginServer, LoginServerFactory};
use crate::auth::pending::{GrantOutcome, PendingGrants, SharedGrant};
use crate::auth::provider::{Authenticator, HttpAuthenticator};
use crate::auth::secret_store::{KeyringSecretStore, SecretStore};
use crate::auth::token::{OAuthToken, TokenStore};
use crate::auth::vault::SecretVault;
use crate::config::{AuthSettings, ConnectionConfig, DEFAULT_LOGIN_TIMEOUT_SECONDS};
use crate::error::{AbapAuthError, GrantFailure, Result};

/// Default bound on an interactive grant.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(DEFAULT_LOGIN_TIMEOUT_SECONDS);

// ---------------------------------------------------------------------------
// GrantOrchestrator
// ---------------------------------------------------------------------------

/// Resolves access tokens for remote connections.
///
/// Cloning is cheap and every clone shares the same caches.
#[derive(Clone)]
pub struct GrantOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    tokens: TokenStore,
    pending: PendingGrants,
    vault: SecretVault,
    authenticator: Arc<dyn Authenticator>,
    login_servers: Arc<dyn LoginServerFactory>,
    login_timeout: Duration,
    background: TaskTracker,
}

impl GrantOrchestrator {
    /// Creates an orchestrator with empty caches and the default timeout.
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        login_servers: Arc<dyn LoginServerFactory>,
        secrets: Arc<dyn SecretStore>,
    ) -> Self {
        Self::with_login_timeout(authenticator, login_servers, secrets, DEFAULT_LOGIN_TIMEOUT)
    }

    /// Creates an orchestrator whose interactive grants give up after
    /// `login_timeout`.
    pub fn with_login_timeout(
        authenticator: Arc<dyn Authenticator>,
        login_servers: Arc<dyn LoginServerFactory>,
        secrets: Arc<dyn SecretStore>,
        login_timeout: Duration,
    ) -> Self {
        let vault = SecretVault::new(secrets, Arc::clone(&authenticator));
        Self {
            inner: Arc::new(Inner {
                tokens: TokenStore::new(),
                pending: PendingGrants::new(),
                vault,
                authenticator,
                login_servers,
                login_timeout,
                background: TaskTracker::new(),
            }),
        }
    }

    /// Wires the production collaborators: HTTP token endpoint, loopback
    /// login server and OS keyring.
    pub fn with_defaults(settings: &AuthSettings) -> Self {
        Self::with_login_timeout(
            Arc::new(HttpAuthenticator::new(Arc::new(reqwest::Client::new()))),
            Arc::new(LocalLoginServerFactory::new(settings.redirect_port)),
            Arc::new(KeyringSecretStore),
            Duration::from_secs(settings.login_timeout_seconds),
        )
    }

    /// Returns a re-invokable login for `connection`, or `None` when the
    /// connection has no OAuth configuration and needs no login.
    pub fn login(&self, connection: &ConnectionConfig) -> Option<DeferredLogin> {
        connection.oauth.as_ref()?;
        Some(DeferredLogin {
            orchestrator: self.clone(),
            connection: connection.clone(),
        })
    }

    /// Returns the access token for `conn_id` without starting a login.
    ///
    /// Answers from the token cache, else waits for the grant in flight,
    /// else resolves to `None`.
    pub async fn future_token(&self, conn_id: &str) -> Option<String> {
        let key = connection_key(conn_id);
        if let Some(token) = self.inner.tokens.get(&key) {
            return Some(token.access_token);
        }
        let grant = self.inner.pending.get(&key)?;
        tracing::debug!(connection = %key, "Waiting for pending grant");
        grant.await.ok().map(|token| token.access_token)
    }

    /// Forgets the token of `connection` in memory and in the vault.
    ///
    /// # Errors
    ///
    /// Returns an error when the vault record cannot be deleted.
    pub async fn logout(&self, connection: &ConnectionConfig) -> Result<()> {
        let key = connection_key(&connection.name);
        self.inner.tokens.remove(&key);
        self.inner.vault.delete(connection).await?;
        tracing::info!(connection = %key, "Logged out");
        Ok(())
    }

    /// Waits for every background vault save started so far.
    pub async fn flush(&self) {
        let background = &self.inner.background;
        background.close();
        background.wait().await;
        background.reopen();
    }

    /// Flushes pending saves and drops every cached token.
    pub async fn shutdown(&self) {
        self.flush().await;
        self.inner.tokens.clear();
    }

    /// The in-memory token cache.
    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    /// The in-flight grant registry.
    pub fn pending(&self) -> &PendingGrants {
        &self.inner.pending
    }

    /// The configured interactive login timeout.
    pub fn login_timeout(&self) -> Duration {
        self.inner.login_timeout
    }

    // -----------------------------------------------------------------------
    // Fallback chain
    // -----------------------------------------------------------------------

    async fn acquire(&self, connection: &ConnectionConfig) -> Result<String> {
        let key = connection_key(&connection.name);

        if let Some(token) = self.cached_token(&key) {
            return Ok(token.access_token);
        }

        let (acquisition, started) = self
            .inner
            .pending
            .get_or_register(&key, || self.start_acquisition(&key, connection));
        if !started {
            tracing::debug!(connection = %key, "Joining pending login");
        }
        let token = acquisition.await.map_err(anyhow::Error::from)?;
        Ok(token.access_token)
    }

    fn cached_token(&self, key: &str) -> Option<OAuthToken> {
        let token = self.inner.tokens.get(key);
        if token.is_some() {
            tracing::debug!(connection = %key, "Using cached token");
        }
        token
    }

    /// Spawns the vault-then-grant part of the chain as one task shared by
    /// every caller that joins it through the registry.
    fn start_acquisition(&self, key: &str, connection: &ConnectionConfig) -> SharedGrant {
        let this = self.clone();
        let key = key.to_string();
        let connection = connection.clone();

        let task = tokio::spawn(async move {
            let outcome = this.resolve_token(&key, &connection).await;
            let outcome = match outcome {
                Ok((token, source)) => {
                    this.store(&key, &connection, &token, source);
                    Ok(token)
                }
                Err(e) => Err(e),
            };
            this.inner.pending.clear(&key);
            outcome
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(GrantFailure::Aborted(e.to_string())))
        }
        .boxed()
        .shared()
    }

    async fn resolve_token(
        &self,
        key: &str,
        connection: &ConnectionConfig,
    ) -> std::result::Result<(OAuthToken, TokenSource), GrantFailure> {
        // A login that settled after the caller's cache miss has already
        // written the cache before leaving the registry.
        if let Some(token) = self.cached_token(key) {
            return Ok((token, TokenSource::Cache));
        }

        let save_credentials = connection
            .oauth
            .as_ref()
            .is_some_and(|oauth| oauth.save_credentials);
        if save_credentials {
            if let Some(token) = self.inner.vault.load(connection).await {
                tracing::info!(connection = %key, "Restored token from vault");
                return Ok((token, TokenSource::Vault));
            }
        }

        let token = self.run_grant(key, connection).await?;
        Ok((token, TokenSource::Grant))
    }

    fn store(&self, key: &str, connection: &ConnectionConfig, token: &OAuthToken, source: TokenSource) {
        if source == TokenSource::Cache {
            return;
        }
        self.inner.tokens.set(key, token.clone());

        let save_credentials = connection
            .oauth
            .as_ref()
            .is_some_and(|oauth| oauth.save_credentials);
        if source == TokenSource::Grant && save_credentials && token.is_usable() {
            self.persist(connection.clone(), token.clone());
        }
    }

    // -----------------------------------------------------------------------
    // Interactive grant
    // -----------------------------------------------------------------------

    async fn run_grant(&self, key: &str, connection: &ConnectionConfig) -> GrantOutcome {
        let oauth = connection.oauth.as_ref().ok_or_else(|| {
            GrantFailure::Exchange(AbapAuthError::OAuthNotConfigured(connection.name.clone()).to_string())
        })?;

        tracing::info!(connection = %key, "Starting interactive login");
        let server = self
            .inner
            .login_servers
            .bind()
            .await
            .map_err(|e| GrantFailure::Exchange(format!("{e:#}")))?;
        let server = ServerGuard::new(server);
        let timeout = self.inner.login_timeout;

        let outcome = tokio::select! {
            biased;
            result = self.inner.authenticator.code_grant(oauth, server.server()) => {
                result.map_err(|e| GrantFailure::Exchange(format!("{e:#}")))
            }
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(connection = %key, timeout_secs = timeout.as_secs(), "Interactive login timed out");
                Err(GrantFailure::LogonTimeout { seconds: timeout.as_secs() })
            }
        };
        server.close();

        match &outcome {
            Ok(token) if !token.is_usable() => {
                tracing::warn!(connection = %key, "Login returned a token without refresh token; it will not be reused or saved");
            }
            Ok(_) => tracing::info!(connection = %key, "Interactive login finished"),
            Err(e) => tracing::warn!(connection = %key, error = %e, "Interactive login failed"),
        }
        outcome
    }

    fn persist(&self, connection: ConnectionConfig, token: OAuthToken) {
        let this = self.clone();
        self.inner.background.spawn(async move {
            if let Err(e) = this.inner.vault.save(&connection, &token).await {
                tracing::warn!(connection = %connection.name, error = %e, "Failed to save token to vault");
            }
        });
    }
}

/// Where a shared acquisition found its token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenSource {
    Cache,
    Vault,
    Grant,
}

// ---------------------------------------------------------------------------
// DeferredLogin
// ---------------------------------------------------------------------------

/// A login bound to one connection, run on demand.
///
/// Each [`invoke`](Self::invoke) walks the fallback chain again, so after
/// the first successful call further calls are answered from the cache.
#[derive(Clone)]
pub struct DeferredLogin {
    orchestrator: GrantOrchestrator,
    connection: ConnectionConfig,
}

impl DeferredLogin {
    /// Returns an access token for the connection.
    ///
    /// # Errors
    ///
    /// Fails with a [`GrantFailure`] when an interactive grant times out or
    /// is rejected.
    pub async fn invoke(&self) -> Result<String> {
        if self.connection.oauth.is_none() {
            return Err(AbapAuthError::OAuthNotConfigured(self.connection.name.clone()).into());
        }
        self.orchestrator.acquire(&self.connection).await
    }
}

// ---------------------------------------------------------------------------
// ServerGuard
// ---------------------------------------------------------------------------

/// Closes the wrapped login server at most once.
struct ServerGuard {
    server: Arc<dyn LoginServer>,
    closed: AtomicBool,
}

impl ServerGuard {
    fn new(server: Arc<dyn LoginServer>) -> Self {
        Self {
            server,
            closed: AtomicBool::new(false),
        }
    }

    fn server(&self) -> Arc<dyn LoginServer> {
        Arc::clone(&self.server)
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.server.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
