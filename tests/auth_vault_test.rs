//! Secret vault integration tests
//!
//! Tests the observable behaviour of `src/auth/vault.rs` and the stripped
//! token record it stores:
//!
//! - A stripped record carries exactly access token, refresh token and
//!   token type, and parses back to the same values.
//! - A record missing any of those fields reads as absent.
//! - Records are keyed by `vscode_git_<escaped name>` and the client id.
//!
//! Tests that interact with the OS keychain are marked `#[ignore]` with the
//! reason `"requires system keyring"`.

mod common;

use std::sync::Arc;

use abap_remote_auth::auth::fake::{FakeAuthenticator, FakeSecretStore};
use abap_remote_auth::auth::secret_store::{KeyringSecretStore, SecretStore};
use abap_remote_auth::auth::token::{StrippedToken, TokenStore};
use abap_remote_auth::auth::vault::{vault_key, SecretVault, VAULT_NAMESPACE};

use common::{oauth_connection, token};

// ---------------------------------------------------------------------------
// Stripped record
// ---------------------------------------------------------------------------

#[test]
fn test_stripped_record_keeps_required_fields() {
    let mut full = token("a1", "r1");
    full.scope = Some("openid".to_string());
    full.extra.insert("jti".to_string(), serde_json::json!("abc"));

    let json = TokenStore::strip(&full).to_json().unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        serde_json::json!({
            "accessToken": "a1",
            "refreshToken": "r1",
            "tokenType": "bearer"
        })
    );

    let parsed = StrippedToken::from_json(&json).unwrap();
    assert_eq!(parsed.access_token, "a1");
    assert_eq!(parsed.refresh_token, "r1");
    assert_eq!(parsed.token_type, "bearer");
}

#[test]
fn test_record_missing_any_field_is_absent() {
    for json in [
        r#"{"refreshToken":"r","tokenType":"bearer"}"#,
        r#"{"accessToken":"a","tokenType":"bearer"}"#,
        r#"{"accessToken":"a","refreshToken":"r"}"#,
        r#"{"accessToken":"","refreshToken":"r","tokenType":"bearer"}"#,
        "null",
        "",
    ] {
        assert!(StrippedToken::from_json(json).is_none(), "accepted {json:?}");
    }
}

#[test]
fn test_vault_key_format() {
    assert_eq!(VAULT_NAMESPACE, "vscode_git_");
    assert_eq!(vault_key("Dev100"), "vscode_git_dev100");
    assert_eq!(vault_key("a b&c"), "vscode_git_a+b%26c");
}

// ---------------------------------------------------------------------------
// SecretVault over the fake store
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_saved_record_restores_through_refresh() {
    let secrets = Arc::new(FakeSecretStore::new());
    let authenticator = Arc::new(FakeAuthenticator::new());
    authenticator.set_refresh_result(Ok(token("a2", "r2")));
    let vault = SecretVault::new(secrets.clone(), authenticator.clone());
    let connection = oauth_connection("dev100", true);

    vault.save(&connection, &token("a1", "r1")).await.unwrap();
    assert_eq!(secrets.write_count(), 1);

    let restored = vault.load(&connection).await.unwrap();
    assert_eq!(restored.access_token, "a2");
    assert_eq!(authenticator.refresh_calls(), vec!["r1".to_string()]);
}

#[tokio::test]
async fn test_unusable_refresh_result_is_absent() {
    let secrets = Arc::new(FakeSecretStore::new());
    let authenticator = Arc::new(FakeAuthenticator::new());
    let mut refreshed = token("a2", "r2");
    refreshed.token_type.clear();
    authenticator.set_refresh_result(Ok(refreshed));

    let vault = SecretVault::new(secrets.clone(), authenticator);
    let connection = oauth_connection("dev100", true);
    vault.save(&connection, &token("a1", "r1")).await.unwrap();

    assert!(vault.load(&connection).await.is_none());
}

// ---------------------------------------------------------------------------
// OS keyring (manual)
// ---------------------------------------------------------------------------

#[tokio::test]
#[ignore = "requires system keyring"]
async fn test_keyring_secret_store_round_trip() {
    let store = KeyringSecretStore;
    let service = vault_key("abap-remote-auth-test");

    store.set_password(&service, "c1", "secret").await.unwrap();
    assert_eq!(
        store.get_password(&service, "c1").await.unwrap().as_deref(),
        Some("secret")
    );

    store.delete_password(&service, "c1").await.unwrap();
    assert!(store.get_password(&service, "c1").await.unwrap().is_none());
}
