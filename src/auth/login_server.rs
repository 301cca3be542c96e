//! Local redirect listener for the OAuth authorization code grant
//!
//! The browser is sent to the authorization server with a loopback
//! `redirect_uri`; after consent it is redirected to
//! `http://127.0.0.1:<port>/callback?code=...&state=...`. [`LocalLoginServer`]
//! accepts that request, validates `state` and hands back the code.
//!
//! Connections that send nothing within the read timeout, requests for other
//! paths and callbacks carrying a different `state` are answered or dropped
//! and the listener keeps waiting for the real redirect.
//!
//! Closing the server cancels a pending `accept()` and drops the listening
//! socket. [`LoginServer::close`] must be safe to call more than once.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{AbapAuthError, Result};

/// Path the authorization server redirects the browser to.
pub const CALLBACK_PATH: &str = "/callback";

/// How long one connection may take to send its request head.
pub const DEFAULT_CALLBACK_READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_RESPONSE: &str = "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nLogin successful. You may close this tab.";
const NOT_FOUND_RESPONSE: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A listening endpoint that receives the authorization code redirect.
#[async_trait]
pub trait LoginServer: Send + Sync {
    /// The `redirect_uri` to register with the authorization request.
    fn redirect_uri(&self) -> String;

    /// Waits for the redirect and returns the authorization code.
    ///
    /// Callbacks carrying a different `state` are ignored. Fails if the
    /// server is closed first, or if the matching callback reports an error
    /// or carries no `code`.
    async fn wait_for_code(&self, expected_state: &str) -> Result<String>;

    /// Stops listening. Idempotent.
    fn close(&self);
}

/// Creates one [`LoginServer`] per interactive grant.
#[async_trait]
pub trait LoginServerFactory: Send + Sync {
    /// Binds a fresh login server.
    async fn bind(&self) -> Result<Arc<dyn LoginServer>>;
}

// ---------------------------------------------------------------------------
// LocalLoginServer
// ---------------------------------------------------------------------------

/// Loopback HTTP listener accepting a single OAuth callback.
#[derive(Debug)]
pub struct LocalLoginServer {
    addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    closed: CancellationToken,
    read_timeout: Duration,
}

impl LocalLoginServer {
    /// Binds `127.0.0.1:<port>`; `0` lets the OS assign a free port.
    ///
    /// # Errors
    ///
    /// Returns [`AbapAuthError::LoginServer`] when the port cannot be bound.
    pub async fn bind(port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| AbapAuthError::LoginServer(format!("failed to bind redirect listener: {e}")))?;
        let addr = listener
            .local_addr()
            .map_err(|e| AbapAuthError::LoginServer(format!("failed to get local address: {e}")))?;
        tracing::debug!(%addr, "Login server listening");

        Ok(Self {
            addr,
            listener: Mutex::new(Some(listener)),
            closed: CancellationToken::new(),
            read_timeout: DEFAULT_CALLBACK_READ_TIMEOUT,
        })
    }

    /// Sets how long a single connection may take to send its request.
    pub fn with_read_timeout(mut self, read_timeout: Duration) -> Self {
        self.read_timeout = read_timeout;
        self
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Returns `true` once [`close`](LoginServer::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    async fn accept_callback(&self, listener: &TcpListener, expected_state: &str) -> Result<String> {
        loop {
            let (stream, peer) = listener.accept().await.map_err(|e| {
                AbapAuthError::LoginServer(format!("failed to accept OAuth callback connection: {e}"))
            })?;
            tracing::trace!(%peer, "Login server accepted connection");

            let params = match tokio::time::timeout(self.read_timeout, read_callback(stream)).await {
                Ok(Ok(Some(params))) => params,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    tracing::debug!(%peer, error = %e, "Dropping unreadable connection");
                    continue;
                }
                Err(_) => {
                    tracing::debug!(%peer, "Dropping idle connection");
                    continue;
                }
            };

            if params.get("state").map(String::as_str) != Some(expected_state) {
                tracing::warn!(%peer, "Ignoring OAuth callback with unexpected state");
                continue;
            }
            return extract_code(&params, expected_state);
        }
    }
}

#[async_trait]
impl LoginServer for LocalLoginServer {
    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}{}", self.addr.port(), CALLBACK_PATH)
    }

    async fn wait_for_code(&self, expected_state: &str) -> Result<String> {
        if self.closed.is_cancelled() {
            return Err(AbapAuthError::LoginServer("login server is closed".to_string()).into());
        }

        // The listener is taken out so it is dropped, and the port released,
        // as soon as this call returns.
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or_else(|| AbapAuthError::LoginServer("login server already used".to_string()))?;

        tokio::select! {
            _ = self.closed.cancelled() => {
                Err(AbapAuthError::LoginServer("login server closed while waiting for callback".to_string()).into())
            }
            result = self.accept_callback(&listener, expected_state) => result,
        }
    }

    fn close(&self) {
        if !self.closed.is_cancelled() {
            tracing::debug!(addr = %self.addr, "Closing login server");
            self.closed.cancel();
        }
    }
}

/// Binds a [`LocalLoginServer`] on a configured port.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalLoginServerFactory {
    /// Port to bind; `0` picks a free port.
    pub port: u16,
}

impl LocalLoginServerFactory {
    /// Creates a factory binding `port`.
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

#[async_trait]
impl LoginServerFactory for LocalLoginServerFactory {
    async fn bind(&self) -> Result<Arc<dyn LoginServer>> {
        Ok(Arc::new(LocalLoginServer::bind(self.port).await?))
    }
}

// ---------------------------------------------------------------------------
// Request handling
// ---------------------------------------------------------------------------

/// Reads one HTTP request head. Returns its query parameters when the
/// request targets [`CALLBACK_PATH`], otherwise answers 404 and returns
/// `None`.
async fn read_callback(stream: TcpStream) -> Result<Option<HashMap<String, String>>> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();
    let mut request_line = String::new();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| AbapAuthError::LoginServer(format!("failed to read callback request: {e}")))?
    {
        // HTTP headers end at the first empty line.
        if line.is_empty() {
            break;
        }
        if request_line.is_empty() {
            request_line = line;
        }
    }

    // "GET /callback?code=...&state=... HTTP/1.1"
    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (path, query) = target.split_once('?').unwrap_or((target, ""));

    let response = if path == CALLBACK_PATH {
        SUCCESS_RESPONSE
    } else {
        NOT_FOUND_RESPONSE
    };
    // The browser tab only shows this text; a failed write changes nothing.
    let _ = write_half.write_all(response.as_bytes()).await;
    let _ = write_half.shutdown().await;

    if path != CALLBACK_PATH {
        return Ok(None);
    }
    Ok(Some(parse_query_string(query)))
}

/// Parses a URL query string into a key-value map, percent-decoding values.
fn parse_query_string(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

fn extract_code(params: &HashMap<String, String>, expected_state: &str) -> Result<String> {
    if let Some(error) = params.get("error") {
        let description = params
            .get("error_description")
            .map(|d| format!(": {d}"))
            .unwrap_or_default();
        return Err(AbapAuthError::Authentication(format!(
            "authorization server returned {error}{description}"
        ))
        .into());
    }

    if params.get("state").map(String::as_str) != Some(expected_state) {
        return Err(
            AbapAuthError::Authentication("state mismatch in OAuth callback".to_string()).into(),
        );
    }

    params
        .get("code")
        .filter(|code| !code.is_empty())
        .cloned()
        .ok_or_else(|| {
            AbapAuthError::Authentication("authorization code missing from callback".to_string())
                .into()
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    async fn send_request(addr: SocketAddr, target: &str) -> String {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!("GET {target} HTTP/1.1\r\nHost: 127.0.0.1\r\n\r\n");
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();
        response
    }

    #[test]
    fn test_parse_query_string_decodes_values() {
        let map = parse_query_string("code=abc%2F123&state=x+y");
        assert_eq!(map.get("code"), Some(&"abc/123".to_string()));
        assert_eq!(map.get("state"), Some(&"x y".to_string()));
    }

    #[test]
    fn test_parse_query_string_empty_returns_empty_map() {
        assert!(parse_query_string("").is_empty());
    }

    #[test]
    fn test_extract_code_requires_matching_state() {
        let params = parse_query_string("code=abc&state=other");
        let err = extract_code(&params, "expected").unwrap_err().to_string();
        assert!(err.contains("state mismatch"), "unexpected error: {err}");
    }

    #[test]
    fn test_extract_code_reports_provider_error() {
        let params = parse_query_string("error=access_denied&error_description=User+cancelled");
        let err = extract_code(&params, "s").unwrap_err().to_string();
        assert!(err.contains("access_denied"));
        assert!(err.contains("User cancelled"));
    }

    #[test]
    fn test_extract_code_missing_code() {
        let params = parse_query_string("state=s");
        assert!(extract_code(&params, "s").is_err());
    }

    #[tokio::test]
    async fn test_redirect_uri_uses_bound_port() {
        let server = LocalLoginServer::bind(0).await.unwrap();
        let port = server.local_addr().port();
        assert_ne!(port, 0);
        assert_eq!(
            server.redirect_uri(),
            format!("http://127.0.0.1:{port}/callback")
        );
    }

    #[tokio::test]
    async fn test_wait_for_code_returns_code_from_callback() {
        let server = Arc::new(LocalLoginServer::bind(0).await.unwrap());
        let addr = server.local_addr();

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_for_code("s1").await })
        };

        let response = send_request(addr, "/callback?code=c0de&state=s1").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "c0de");
    }

    #[tokio::test]
    async fn test_wait_for_code_ignores_other_paths() {
        let server = Arc::new(LocalLoginServer::bind(0).await.unwrap());
        let addr = server.local_addr();

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_for_code("s1").await })
        };

        let response = send_request(addr, "/favicon.ico").await;
        assert!(response.starts_with("HTTP/1.1 404"));
        send_request(addr, "/callback?code=later&state=s1").await;

        assert_eq!(waiter.await.unwrap().unwrap(), "later");
    }

    #[tokio::test]
    async fn test_wait_for_code_ignores_callback_with_other_state() {
        let server = Arc::new(LocalLoginServer::bind(0).await.unwrap());
        let addr = server.local_addr();

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_for_code("s1").await })
        };

        send_request(addr, "/callback?code=stray&state=old").await;
        send_request(addr, "/callback?error=access_denied&state=old").await;
        send_request(addr, "/callback?code=c0de&state=s1").await;

        assert_eq!(waiter.await.unwrap().unwrap(), "c0de");
    }

    #[tokio::test]
    async fn test_wait_for_code_drops_idle_connection() {
        let server = Arc::new(
            LocalLoginServer::bind(0)
                .await
                .unwrap()
                .with_read_timeout(Duration::from_millis(100)),
        );
        let addr = server.local_addr();

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_for_code("s1").await })
        };

        let _idle = TcpStream::connect(addr).await.unwrap();
        let response = send_request(addr, "/callback?code=c0de&state=s1").await;
        assert!(response.starts_with("HTTP/1.1 200"));

        assert_eq!(waiter.await.unwrap().unwrap(), "c0de");
    }

    #[tokio::test]
    async fn test_close_aborts_pending_wait() {
        let server = Arc::new(LocalLoginServer::bind(0).await.unwrap());

        let waiter = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.wait_for_code("s1").await })
        };
        tokio::task::yield_now().await;

        server.close();
        server.close();
        assert!(server.is_closed());

        let err = waiter.await.unwrap().unwrap_err().to_string();
        assert!(err.contains("closed"), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_wait_after_close_fails_immediately() {
        let server = LocalLoginServer::bind(0).await.unwrap();
        server.close();
        assert!(server.wait_for_code("s1").await.is_err());
    }
}
