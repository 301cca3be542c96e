//! In-process fake collaborators for unit and integration tests
//!
//! - [`FakeSecretStore`] -- in-memory [`SecretStore`] with a failure switch
//!   and read/write counters.
//! - [`FakeAuthenticator`] -- scripted [`Authenticator`] recording every
//!   grant and refresh.
//! - [`FakeLoginServerFactory`] / [`FakeLoginServer`] -- login servers that
//!   count `bind` and `close` calls.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use abap_remote_auth::auth::fake::{FakeAuthenticator, FakeLoginServerFactory, FakeSecretStore};
//! use abap_remote_auth::auth::token::OAuthToken;
//! use abap_remote_auth::auth::GrantOrchestrator;
//!
//! let authenticator = Arc::new(FakeAuthenticator::new());
//! authenticator.set_grant_token(OAuthToken::new("a1", "bearer", Some("r1".to_string())));
//!
//! let orchestrator = GrantOrchestrator::new(
//!     authenticator,
//!     Arc::new(FakeLoginServerFactory::new()),
//!     Arc::new(FakeSecretStore::new()),
//! );
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::login_server::{LoginServer, LoginServerFactory};
use crate::auth::provider::Authenticator;
use crate::auth::secret_store::SecretStore;
use crate::auth::token::{OAuthToken, StrippedToken};
use crate::config::OAuthConfig;
use crate::error::{AbapAuthError, Result};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ---------------------------------------------------------------------------
// FakeSecretStore
// ---------------------------------------------------------------------------

/// In-memory [`SecretStore`].
#[derive(Debug, Default)]
pub struct FakeSecretStore {
    secrets: Mutex<HashMap<(String, String), String>>,
    should_fail: AtomicBool,
    writes: AtomicUsize,
    reads: AtomicUsize,
}

impl FakeSecretStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populates a secret without counting it as a write.
    pub fn insert(&self, service: &str, account: &str, secret: &str) -> &Self {
        lock(&self.secrets).insert(
            (service.to_string(), account.to_string()),
            secret.to_string(),
        );
        self
    }

    /// Returns the secret stored at `(service, account)`.
    pub fn secret(&self, service: &str, account: &str) -> Option<String> {
        lock(&self.secrets)
            .get(&(service.to_string(), account.to_string()))
            .cloned()
    }

    /// Makes every operation fail while set.
    pub fn set_should_fail(&self, should_fail: bool) -> &Self {
        self.should_fail.store(should_fail, Ordering::SeqCst);
        self
    }

    /// Number of successful `set_password` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of `get_password` calls, failed ones included.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check_error(&self) -> Result<()> {
        if self.should_fail.load(Ordering::SeqCst) {
            return Err(AbapAuthError::Vault("fake secret store failure".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl SecretStore for FakeSecretStore {
    async fn set_password(&self, service: &str, account: &str, secret: &str) -> Result<()> {
        self.check_error()?;
        self.insert(service, account, secret);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get_password(&self, service: &str, account: &str) -> Result<Option<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_error()?;
        Ok(self.secret(service, account))
    }

    async fn delete_password(&self, service: &str, account: &str) -> Result<()> {
        self.check_error()?;
        lock(&self.secrets).remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeAuthenticator
// ---------------------------------------------------------------------------

/// How [`FakeAuthenticator::code_grant`] behaves.
#[derive(Debug, Clone)]
pub enum GrantBehavior {
    /// Resolve with the token after the delay.
    Succeed {
        /// Token to return
        token: OAuthToken,
        /// Simulated time the user needs to log in
        delay: Duration,
    },
    /// Fail with the message.
    Fail(String),
    /// Never settle.
    Hang,
}

/// Scripted [`Authenticator`].
#[derive(Debug)]
pub struct FakeAuthenticator {
    grant: Mutex<GrantBehavior>,
    refresh_result: Mutex<std::result::Result<OAuthToken, String>>,
    grant_calls: AtomicUsize,
    refresh_calls: Mutex<Vec<String>>,
}

impl Default for FakeAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAuthenticator {
    /// Grants fail and refreshes fail until configured otherwise.
    pub fn new() -> Self {
        Self {
            grant: Mutex::new(GrantBehavior::Fail("no grant configured".to_string())),
            refresh_result: Mutex::new(Err("no refresh configured".to_string())),
            grant_calls: AtomicUsize::new(0),
            refresh_calls: Mutex::new(Vec::new()),
        }
    }

    /// Grants resolve immediately with `token`.
    pub fn set_grant_token(&self, token: OAuthToken) -> &Self {
        self.set_grant_behavior(GrantBehavior::Succeed {
            token,
            delay: Duration::ZERO,
        })
    }

    /// Replaces the grant behavior.
    pub fn set_grant_behavior(&self, behavior: GrantBehavior) -> &Self {
        *lock(&self.grant) = behavior;
        self
    }

    /// Sets what `refresh` returns; `Err` carries the error message.
    pub fn set_refresh_result(&self, result: std::result::Result<OAuthToken, String>) -> &Self {
        *lock(&self.refresh_result) = result;
        self
    }

    /// Number of `code_grant` calls so far.
    pub fn grant_calls(&self) -> usize {
        self.grant_calls.load(Ordering::SeqCst)
    }

    /// Refresh tokens passed to `refresh`, in call order.
    pub fn refresh_calls(&self) -> Vec<String> {
        lock(&self.refresh_calls).clone()
    }
}

#[async_trait]
impl Authenticator for FakeAuthenticator {
    async fn code_grant(
        &self,
        _oauth: &OAuthConfig,
        _server: Arc<dyn LoginServer>,
    ) -> Result<OAuthToken> {
        self.grant_calls.fetch_add(1, Ordering::SeqCst);
        let behavior = lock(&self.grant).clone();
        match behavior {
            GrantBehavior::Succeed { token, delay } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                Ok(token)
            }
            GrantBehavior::Fail(message) => Err(AbapAuthError::Authentication(message).into()),
            GrantBehavior::Hang => std::future::pending().await,
        }
    }

    async fn refresh(&self, _oauth: &OAuthConfig, token: &StrippedToken) -> Result<OAuthToken> {
        lock(&self.refresh_calls).push(token.refresh_token.clone());
        lock(&self.refresh_result)
            .clone()
            .map_err(|message| AbapAuthError::Authentication(message).into())
    }
}

// ---------------------------------------------------------------------------
// FakeLoginServer
// ---------------------------------------------------------------------------

/// [`LoginServer`] that records how often it was closed.
#[derive(Debug, Default)]
pub struct FakeLoginServer {
    close_calls: AtomicUsize,
}

impl FakeLoginServer {
    /// Number of `close` calls that reached this server.
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LoginServer for FakeLoginServer {
    fn redirect_uri(&self) -> String {
        "http://127.0.0.1:0/callback".to_string()
    }

    async fn wait_for_code(&self, _expected_state: &str) -> Result<String> {
        Ok("fake-code".to_string())
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out [`FakeLoginServer`]s and keeps them for inspection.
#[derive(Debug, Default)]
pub struct FakeLoginServerFactory {
    servers: Mutex<Vec<Arc<FakeLoginServer>>>,
    fail_bind: AtomicBool,
}

impl FakeLoginServerFactory {
    /// Creates a factory whose `bind` succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `bind` fail while set.
    pub fn set_fail_bind(&self, fail: bool) -> &Self {
        self.fail_bind.store(fail, Ordering::SeqCst);
        self
    }

    /// Every server bound so far.
    pub fn servers(&self) -> Vec<Arc<FakeLoginServer>> {
        lock(&self.servers).clone()
    }
}

#[async_trait]
impl LoginServerFactory for FakeLoginServerFactory {
    async fn bind(&self) -> Result<Arc<dyn LoginServer>> {
        if self.fail_bind.load(Ordering::SeqCst) {
            return Err(AbapAuthError::LoginServer("fake bind failure".to_string()).into());
        }
        let server = Arc::new(FakeLoginServer::default());
        lock(&self.servers).push(Arc::clone(&server));
        Ok(server)
    }
}
