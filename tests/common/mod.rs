use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use abap_remote_auth::auth::fake::{FakeAuthenticator, FakeLoginServerFactory, FakeSecretStore};
use abap_remote_auth::auth::token::OAuthToken;
use abap_remote_auth::config::{ConnectionConfig, OAuthConfig};
use abap_remote_auth::GrantOrchestrator;

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// OAuth settings `{c1, s1, https://host}`.
#[allow(dead_code)]
pub fn oauth_config(save_credentials: bool) -> OAuthConfig {
    OAuthConfig {
        client_id: "c1".to_string(),
        client_secret: "s1".to_string(),
        login_url: "https://host".to_string(),
        save_credentials,
    }
}

#[allow(dead_code)]
pub fn oauth_connection(name: &str, save_credentials: bool) -> ConnectionConfig {
    ConnectionConfig {
        name: name.to_string(),
        url: format!("https://{name}.example.com"),
        oauth: Some(oauth_config(save_credentials)),
    }
}

#[allow(dead_code)]
pub fn basic_connection(name: &str) -> ConnectionConfig {
    ConnectionConfig {
        name: name.to_string(),
        url: format!("https://{name}.example.com"),
        oauth: None,
    }
}

#[allow(dead_code)]
pub fn token(access_token: &str, refresh_token: &str) -> OAuthToken {
    OAuthToken::new(access_token, "bearer", Some(refresh_token.to_string()))
}

/// An orchestrator over fresh fakes, with the fakes returned for inspection.
#[allow(dead_code)]
pub struct Harness {
    pub orchestrator: GrantOrchestrator,
    pub authenticator: Arc<FakeAuthenticator>,
    pub servers: Arc<FakeLoginServerFactory>,
    pub secrets: Arc<FakeSecretStore>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new() -> Self {
        Self::with_secrets(Arc::new(FakeSecretStore::new()))
    }

    /// Shares `secrets` with a previous harness, as a second process would
    /// share the OS keyring.
    pub fn with_secrets(secrets: Arc<FakeSecretStore>) -> Self {
        let authenticator = Arc::new(FakeAuthenticator::new());
        let servers = Arc::new(FakeLoginServerFactory::new());
        let orchestrator =
            GrantOrchestrator::new(authenticator.clone(), servers.clone(), secrets.clone());
        Self {
            orchestrator,
            authenticator,
            servers,
            secrets,
        }
    }
}
