//! OAuth token acquisition and caching
//!
//! Obtains access tokens for remote ABAP connections, reusing cached tokens
//! where possible and running at most one interactive login per connection
//! at a time.
//!
//! # Module Layout
//!
//! - [`token`]        -- token types and the in-memory [`token::TokenStore`]
//! - [`vault`]        -- durable per-connection token records in a secret store
//! - [`pending`]      -- registry of in-flight grants used for dedup
//! - [`orchestrator`] -- the login fallback chain and the grant/timeout race
//! - [`provider`]     -- OAuth endpoint client (`code_grant`, `refresh`)
//! - [`login_server`] -- local redirect listener for the code grant
//! - [`secret_store`] -- OS keyring access
//! - [`fake`]         -- in-process collaborators for tests

pub mod fake;
pub mod login_server;
pub mod orchestrator;
pub mod pending;
pub mod provider;
pub mod secret_store;
pub mod token;
pub mod vault;

pub use orchestrator::{DeferredLogin, GrantOrchestrator};

/// Normalizes a connection id into the key shared by the token cache and
/// the pending-grant registry.
///
/// # Examples
///
/// ```
/// use abap_remote_auth::auth::connection_key;
///
/// assert_eq!(connection_key(" Dev100 "), "dev100");
/// ```
pub fn connection_key(conn_id: &str) -> String {
    conn_id.trim().to_lowercase()
}
