//! Registry of in-flight interactive grants
//!
//! At most one grant is registered per connection key. Every caller that
//! finds a registered grant awaits the same [`SharedGrant`] and so observes
//! the same token or the same [`GrantFailure`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use futures::future::{BoxFuture, Shared};

use crate::auth::token::OAuthToken;
use crate::error::GrantFailure;

/// Result of one interactive grant, shared by all of its waiters.
pub type GrantOutcome = std::result::Result<OAuthToken, GrantFailure>;

/// A cloneable handle to an in-flight grant.
pub type SharedGrant = Shared<BoxFuture<'static, GrantOutcome>>;

/// Connection key -> in-flight grant.
#[derive(Default)]
pub struct PendingGrants {
    grants: Mutex<HashMap<String, SharedGrant>>,
}

impl PendingGrants {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `grant` for `key`, replacing any previous entry.
    pub fn register(&self, key: &str, grant: SharedGrant) {
        self.lock().insert(key.to_string(), grant);
    }

    /// Returns the grant in flight for `key`.
    pub fn get(&self, key: &str) -> Option<SharedGrant> {
        self.lock().get(key).cloned()
    }

    /// Removes the entry for `key`.
    pub fn clear(&self, key: &str) {
        self.lock().remove(key);
    }

    /// Returns the grant in flight for `key`, registering the one built by
    /// `start` when there is none.
    ///
    /// The lookup and the registration happen under a single lock, so
    /// concurrent callers can never start two grants for the same key. The
    /// returned flag is `true` when `start` was called.
    pub fn get_or_register<F>(&self, key: &str, start: F) -> (SharedGrant, bool)
    where
        F: FnOnce() -> SharedGrant,
    {
        let mut grants = self.lock();
        if let Some(existing) = grants.get(key) {
            return (existing.clone(), false);
        }
        let grant = start();
        grants.insert(key.to_string(), grant.clone());
        (grant, true)
    }

    /// Number of grants currently in flight.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Returns `true` when no grant is in flight.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SharedGrant>> {
        self.grants
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
