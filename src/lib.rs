//! abap-remote-auth - OAuth token acquisition for remote ABAP connections
//!
//! This library obtains and caches access tokens for remote ABAP systems
//! secured with OAuth, persisting them across runs in the OS keyring.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Token cache, secret vault, pending grant registry and the login
//!   orchestrator
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Command handlers used by the binary
//!
//! # Example
//!
//! ```no_run
//! use abap_remote_auth::{Config, GrantOrchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let orchestrator = GrantOrchestrator::with_defaults(&config.auth);
//!     let connection = config.connection("dev100")?;
//!     if let Some(login) = orchestrator.login(connection) {
//!         let _token = login.invoke().await?;
//!     }
//!     orchestrator.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::{DeferredLogin, GrantOrchestrator};
pub use config::Config;
pub use error::{AbapAuthError, GrantFailure, Result};
