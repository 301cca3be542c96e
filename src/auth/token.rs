//! OAuth token types and the in-memory token cache
//!
//! [`OAuthToken`] is the full credential returned by the authorization
//! server. [`StrippedToken`] is the minimal projection written to the secret
//! vault: enough to run a refresh exchange on the next start.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// OAuthToken
// ---------------------------------------------------------------------------

/// A complete OAuth token response.
///
/// Fields map to the token endpoint response of RFC 6749. `expires_at` is
/// computed from `expires_in` when the token is received; any other response
/// members are kept in `extra` and passed through untouched.
///
/// # Examples
///
/// ```
/// use abap_remote_auth::auth::token::OAuthToken;
///
/// let token = OAuthToken::new("a1", "bearer", Some("r1".to_string()));
/// assert!(token.is_usable());
///
/// let no_refresh = OAuthToken::new("a1", "bearer", None);
/// assert!(!no_refresh.is_usable());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OAuthToken {
    /// The access token string issued by the authorization server.
    pub access_token: String,

    /// The token type, typically `"bearer"`.
    pub token_type: String,

    /// Refresh token used to restore the session on a later start.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// UTC timestamp at which the access token expires.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Space-separated scopes granted by the authorization server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Remaining response members (e.g. `jti`, `id_token`).
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl OAuthToken {
    /// Creates a token with no expiry, scope or extra metadata.
    pub fn new(
        access_token: impl Into<String>,
        token_type: impl Into<String>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            token_type: token_type.into(),
            refresh_token,
            expires_at: None,
            scope: None,
            extra: HashMap::new(),
        }
    }

    /// Returns `true` when access token, refresh token and token type are
    /// all non-empty.
    pub fn is_usable(&self) -> bool {
        !self.access_token.is_empty()
            && !self.token_type.is_empty()
            && self
                .refresh_token
                .as_deref()
                .is_some_and(|refresh| !refresh.is_empty())
    }
}

// ---------------------------------------------------------------------------
// StrippedToken
// ---------------------------------------------------------------------------

/// The minimal, serializable subset of an [`OAuthToken`].
///
/// Serialized with the camelCase member names `accessToken`,
/// `refreshToken` and `tokenType`. Unknown members are ignored when reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrippedToken {
    /// Access token at the time the record was written.
    pub access_token: String,
    /// Refresh token used to restore the session.
    pub refresh_token: String,
    /// Token type, typically `"bearer"`.
    pub token_type: String,
}

/// Lenient shape used to read vault records; every member may be missing.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecord {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

impl StrippedToken {
    /// Serializes the record to its JSON transport form.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parses a vault record.
    ///
    /// Returns `None` unless `json` is an object carrying non-empty
    /// `accessToken`, `refreshToken` and `tokenType` strings.
    ///
    /// # Examples
    ///
    /// ```
    /// use abap_remote_auth::auth::token::StrippedToken;
    ///
    /// let ok = StrippedToken::from_json(
    ///     r#"{"accessToken":"a","refreshToken":"r","tokenType":"bearer","expires":"x"}"#,
    /// );
    /// assert!(ok.is_some());
    ///
    /// assert!(StrippedToken::from_json(r#"{"accessToken":"a","tokenType":"bearer"}"#).is_none());
    /// assert!(StrippedToken::from_json("not json").is_none());
    /// ```
    pub fn from_json(json: &str) -> Option<Self> {
        let raw: RawRecord = serde_json::from_str(json).ok()?;
        let non_empty = |value: Option<String>| value.filter(|v| !v.is_empty());
        Some(Self {
            access_token: non_empty(raw.access_token)?,
            refresh_token: non_empty(raw.refresh_token)?,
            token_type: non_empty(raw.token_type)?,
        })
    }
}

// ---------------------------------------------------------------------------
// TokenStore
// ---------------------------------------------------------------------------

/// In-memory map from connection key to the last known valid token.
///
/// Keys are expected to come from [`connection_key`](super::connection_key).
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: Mutex<HashMap<String, OAuthToken>>,
}

impl TokenStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached token for `key` when it is usable.
    pub fn get(&self, key: &str) -> Option<OAuthToken> {
        self.lock()
            .get(key)
            .filter(|token| token.is_usable())
            .cloned()
    }

    /// Caches `token` for `key`, replacing any previous token.
    pub fn set(&self, key: &str, token: OAuthToken) {
        self.lock().insert(key.to_string(), token);
    }

    /// Drops the cached token for `key`. Returns whether one was present.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    /// Drops every cached token.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Projects a token onto the fields persisted in the vault.
    pub fn strip(token: &OAuthToken) -> StrippedToken {
        StrippedToken {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone().unwrap_or_default(),
            token_type: token.token_type.clone(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, OAuthToken>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.tokens
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_token() -> OAuthToken {
        let mut token = OAuthToken::new("a1", "bearer", Some("r1".to_string()));
        token.scope = Some("openid".to_string());
        token.expires_at = DateTime::from_timestamp(1_800_000_000, 0);
        token
            .extra
            .insert("jti".to_string(), serde_json::json!("abc"));
        token
    }

    #[test]
    fn test_is_usable_requires_all_three_fields() {
        assert!(full_token().is_usable());

        let mut empty_access = full_token();
        empty_access.access_token.clear();
        assert!(!empty_access.is_usable());

        let mut empty_type = full_token();
        empty_type.token_type.clear();
        assert!(!empty_type.is_usable());

        let mut empty_refresh = full_token();
        empty_refresh.refresh_token = Some(String::new());
        assert!(!empty_refresh.is_usable());
    }

    #[test]
    fn test_store_get_returns_cached_token() {
        let store = TokenStore::new();
        store.set("dev100", full_token());
        assert_eq!(store.get("dev100"), Some(full_token()));
        assert!(store.get("qas").is_none());
    }

    #[test]
    fn test_store_get_skips_unusable_token() {
        let store = TokenStore::new();
        store.set("dev100", OAuthToken::new("a1", "bearer", None));
        assert!(store.get("dev100").is_none());
    }

    #[test]
    fn test_store_set_supersedes_previous_token() {
        let store = TokenStore::new();
        store.set("dev100", full_token());
        store.set("dev100", OAuthToken::new("a2", "bearer", Some("r2".to_string())));
        assert_eq!(store.get("dev100").unwrap().access_token, "a2");
    }

    #[test]
    fn test_store_remove_and_clear() {
        let store = TokenStore::new();
        store.set("a", full_token());
        store.set("b", full_token());
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        store.clear();
        assert!(store.get("b").is_none());
    }

    #[test]
    fn test_strip_keeps_only_restore_fields() {
        let stripped = TokenStore::strip(&full_token());
        assert_eq!(
            stripped,
            StrippedToken {
                access_token: "a1".to_string(),
                refresh_token: "r1".to_string(),
                token_type: "bearer".to_string(),
            }
        );
        let json = stripped.to_json().unwrap();
        assert!(!json.contains("jti"));
        assert!(!json.contains("scope"));
    }

    #[test]
    fn test_stripped_record_uses_camel_case_members() {
        let json = TokenStore::strip(&full_token()).to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["accessToken"], "a1");
        assert_eq!(value["refreshToken"], "r1");
        assert_eq!(value["tokenType"], "bearer");
    }

    #[test]
    fn test_from_json_recovers_serialized_record() {
        let stripped = TokenStore::strip(&full_token());
        let restored = StrippedToken::from_json(&stripped.to_json().unwrap());
        assert_eq!(restored, Some(stripped));
    }

    #[test]
    fn test_from_json_rejects_missing_or_empty_fields() {
        for json in [
            r#"{"refreshToken":"r","tokenType":"bearer"}"#,
            r#"{"accessToken":"a","tokenType":"bearer"}"#,
            r#"{"accessToken":"a","refreshToken":"r"}"#,
            r#"{"accessToken":"","refreshToken":"r","tokenType":"bearer"}"#,
            r#"["accessToken","refreshToken","tokenType"]"#,
            r#""just a string""#,
            "{truncated",
        ] {
            assert!(StrippedToken::from_json(json).is_none(), "accepted {json}");
        }
    }

    #[test]
    fn test_from_json_tolerates_extra_members() {
        let json = r#"{"accessToken":"a","refreshToken":"r","tokenType":"bearer","expires":123}"#;
        assert!(StrippedToken::from_json(json).is_some());
    }

    #[test]
    fn test_full_token_json_keeps_extra_members() {
        let json = serde_json::to_string(&full_token()).unwrap();
        let restored: OAuthToken = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, full_token());
    }
}
