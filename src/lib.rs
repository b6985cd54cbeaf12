//! Client library for the HTTP/CGI control API of networked IP cameras
//!
//! Devices expose their functions as CGI commands under
//! `scheme://host:port/cgi-bin/`. This crate provides the engine every such
//! command runs through: a one-time choice between HTTP Basic and HTTP Digest
//! authentication, connection pools keyed by retry count, and a retry and
//! timeout policy around each request.
//!
//! # Modules
//!
//! - [`auth`] - Authentication negotiation and Digest request signing
//! - [`client`] - The device client and its command executor
//! - [`config`] - Client settings and saved camera profiles
//! - [`error`] - Error types for the library
//! - [`identity`] - Best-effort device name and serial lookup
//! - [`pool`] - Connection pools keyed by retry count
//! - [`url`] - CGI endpoint URL construction
//!
//! # Example Usage
//!
//! ```no_run
//! use ipcam_cgi::{Client, ClientConfig};
//!
//! let config = ClientConfig::new("192.168.1.108", 80, "admin", "secret").with_retries(2);
//! let camera = Client::new(config).expect("Authentication failed");
//! println!("Connected to {} using {} auth", camera, camera.auth_method());
//!
//! let body = camera
//!     .command("magicBox.cgi?action=getSoftwareVersion", None, None)
//!     .and_then(|r| Ok(r.into_string()?))
//!     .expect("Query failed");
//! println!("{}", body);
//! ```

/// Basic/Digest negotiation and RFC 2617 request signing.
pub mod auth;

/// The device client, its command executor and redacted diagnostics.
pub mod client;

/// Client settings and the CLI's saved camera profiles (TOML).
pub mod config;

/// Error types, built with `thiserror`.
pub mod error;

/// Best-effort device name and serial lookup.
pub mod identity;

/// Connection pools keyed by retry count.
pub mod pool;

/// CGI endpoint URL and request-URI construction.
pub mod url;

pub use auth::{AuthMethod, Credential};
pub use client::{CgiCommand, Client, RedactedClient};
pub use config::ClientConfig;
pub use error::{CameraError, Result};
pub use identity::DeviceIdentity;
pub use pool::{ConnectionPool, PooledConnection};
