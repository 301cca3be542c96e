//! OAuth endpoint client
//!
//! [`Authenticator`] is the capability the orchestrator and the vault
//! consume: run an interactive authorization code grant against a
//! [`LoginServer`], or exchange a stored refresh token for a new token.
//!
//! [`HttpAuthenticator`] implements it over `reqwest` for authorization
//! servers exposing `<login_url>/oauth/authorize` and
//! `<login_url>/oauth/token` (the layout used by SAP BTP's XSUAA), with the
//! client authenticating through HTTP basic auth.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use base64::Engine as _;
use url::Url;

use crate::auth::login_server::LoginServer;
use crate::auth::token::{OAuthToken, StrippedToken};
use crate::config::OAuthConfig;
use crate::error::{AbapAuthError, Result};

/// OAuth operations needed to obtain and restore tokens.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Runs the interactive authorization code grant.
    ///
    /// The browser redirect is received by `server`; the caller owns the
    /// server's lifecycle.
    async fn code_grant(&self, oauth: &OAuthConfig, server: Arc<dyn LoginServer>)
        -> Result<OAuthToken>;

    /// Exchanges the refresh token of `token` for a new token.
    async fn refresh(&self, oauth: &OAuthConfig, token: &StrippedToken) -> Result<OAuthToken>;
}

// ---------------------------------------------------------------------------
// Token endpoint response (raw deserialization)
// ---------------------------------------------------------------------------

/// Raw JSON response from an OAuth token endpoint.
#[derive(Debug, serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
    #[serde(flatten)]
    extra: HashMap<String, serde_json::Value>,
}

impl TokenResponse {
    /// Converts the raw response, turning `expires_in` into an absolute
    /// `expires_at`.
    ///
    /// Refresh responses may omit `refresh_token`; the previous one stays
    /// valid in that case and is carried over from `previous_refresh`.
    fn into_oauth_token(self, previous_refresh: Option<&str>) -> OAuthToken {
        let expires_at = self.expires_in.map(|secs| {
            chrono::Utc::now() + chrono::Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
        });

        OAuthToken {
            access_token: self.access_token,
            token_type: self.token_type,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_at,
            scope: self.scope,
            extra: self.extra,
        }
    }
}

// ---------------------------------------------------------------------------
// HttpAuthenticator
// ---------------------------------------------------------------------------

/// `reqwest`-based [`Authenticator`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use abap_remote_auth::auth::provider::HttpAuthenticator;
///
/// let authenticator = HttpAuthenticator::new(Arc::new(reqwest::Client::new()));
/// ```
pub struct HttpAuthenticator {
    http: Arc<reqwest::Client>,
    open_browser: bool,
}

impl HttpAuthenticator {
    /// Creates an authenticator that opens the system browser for consent.
    pub fn new(http: Arc<reqwest::Client>) -> Self {
        Self {
            http,
            open_browser: true,
        }
    }

    /// Only prints the authorization URL instead of opening a browser.
    pub fn without_browser(mut self) -> Self {
        self.open_browser = false;
        self
    }

    /// `<login_url>/oauth/authorize`
    pub fn authorization_endpoint(oauth: &OAuthConfig) -> String {
        format!("{}/oauth/authorize", oauth.login_url.trim_end_matches('/'))
    }

    /// `<login_url>/oauth/token`
    pub fn token_endpoint(oauth: &OAuthConfig) -> String {
        format!("{}/oauth/token", oauth.login_url.trim_end_matches('/'))
    }

    /// Builds the authorization URL the user has to open.
    fn build_authorization_url(
        oauth: &OAuthConfig,
        redirect_uri: &str,
        state: &str,
    ) -> Result<String> {
        let mut url = Url::parse(&Self::authorization_endpoint(oauth)).map_err(|e| {
            AbapAuthError::Config(format!("invalid login_url {}: {e}", oauth.login_url))
        })?;

        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", oauth.client_id.as_str())
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("state", state);

        Ok(url.to_string())
    }

    /// 16 random bytes encoded as base64url without padding.
    fn generate_state() -> String {
        use rand::RngCore as _;
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Attempts to open the authorization URL in the user's default browser.
    ///
    /// Errors are ignored; the URL is also printed to stderr.
    fn try_open_browser(&self, url: &str) {
        if !self.open_browser {
            return;
        }
        #[cfg(target_os = "macos")]
        {
            let _ = std::process::Command::new("open").arg(url).spawn();
        }
        #[cfg(target_os = "linux")]
        {
            let _ = std::process::Command::new("xdg-open").arg(url).spawn();
        }
        #[cfg(target_os = "windows")]
        {
            let _ = std::process::Command::new("cmd")
                .args(["/C", "start", "", url])
                .spawn();
        }
    }

    /// POSTs a form to the token endpoint and parses the response.
    async fn token_request(
        &self,
        oauth: &OAuthConfig,
        params: &[(&str, &str)],
        what: &str,
    ) -> Result<TokenResponse> {
        let resp = self
            .http
            .post(Self::token_endpoint(oauth))
            .basic_auth(&oauth.client_id, Some(&oauth.client_secret))
            .form(params)
            .send()
            .await
            .map_err(AbapAuthError::Http)
            .with_context(|| format!("{what} request failed"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(AbapAuthError::Authentication(format!(
                "{what} endpoint returned {status}: {body}"
            ))
            .into());
        }

        resp.json()
            .await
            .map_err(AbapAuthError::Http)
            .with_context(|| format!("failed to parse {what} response"))
    }
}

#[async_trait]
impl Authenticator for HttpAuthenticator {
    async fn code_grant(
        &self,
        oauth: &OAuthConfig,
        server: Arc<dyn LoginServer>,
    ) -> Result<OAuthToken> {
        let redirect_uri = server.redirect_uri();
        let state = Self::generate_state();
        let auth_url = Self::build_authorization_url(oauth, &redirect_uri, &state)?;

        eprintln!("Open the following URL in your browser to log in:\n{}", auth_url);
        self.try_open_browser(&auth_url);

        let code = server.wait_for_code(&state).await?;
        tracing::debug!(client_id = %oauth.client_id, "Received authorization code");

        let raw = self
            .token_request(
                oauth,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("client_id", oauth.client_id.as_str()),
                ],
                "token exchange",
            )
            .await?;

        Ok(raw.into_oauth_token(None))
    }

    async fn refresh(&self, oauth: &OAuthConfig, token: &StrippedToken) -> Result<OAuthToken> {
        let raw = self
            .token_request(
                oauth,
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", token.refresh_token.as_str()),
                ],
                "refresh token",
            )
            .await?;

        Ok(raw.into_oauth_token(Some(&token.refresh_token)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
