//! Device client and command execution.
//!
//! Feature wrappers (snapshot, PTZ, motion detection, ...) only need the
//! [`CgiCommand`] capability: they format a CGI path, call
//! [`CgiCommand::command`] and interpret the response body themselves.
//!
//! # Example
//!
//! ```no_run
//! use ipcam_cgi::{Client, ClientConfig};
//!
//! let client = Client::new(ClientConfig::new("192.168.1.108", 80, "admin", "secret"))
//!     .expect("Authentication failed");
//!
//! let response = client
//!     .command("global.cgi?action=getCurrentTime", None, None)
//!     .expect("Command failed");
//! println!("{}", response.into_string().unwrap_or_default());
//! ```

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, warn};

use crate::auth::{self, AuthMethod, Credential, REDACTED};
use crate::config::ClientConfig;
use crate::error::{CameraError, Result};
use crate::identity::DeviceIdentity;
use crate::pool::{ConnectionPool, Outgoing, is_read_timeout};
use crate::url::Endpoint;

/// Request execution contract consumed by feature wrappers.
pub trait CgiCommand {
    /// Runs `command` (the part after `/cgi-bin/`) with GET, retrying failed
    /// attempts. `None` selects the client's defaults.
    fn command(
        &self,
        command: &str,
        retries: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<ureq::Response>;

    /// Uploads `payload` with a single POST. A read timeout counts as success.
    fn command_with_payload(
        &self,
        command: &str,
        payload: &[u8],
        headers: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<()>;
}

pub struct Client {
    config: ClientConfig,
    endpoint: Endpoint,
    auth_method: AuthMethod,
    credential: Credential,
    pools: ConnectionPool,
    identity: DeviceIdentity,
}

impl Client {
    /// Negotiates authentication and resolves the device identity.
    ///
    /// Fails with [`CameraError::Authentication`] when the device accepts
    /// neither scheme. Identity lookup never fails construction.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let endpoint = Endpoint::new(&config.protocol, &config.host, config.port);
        let (auth_method, credential) = auth::negotiate(&config, &endpoint)?;

        let mut client = Self {
            config,
            endpoint,
            auth_method,
            credential,
            pools: ConnectionPool::new(),
            identity: DeviceIdentity::default(),
        };
        client.identity = DeviceIdentity::resolve(&client);
        Ok(client)
    }

    /// Shorthand for [`Client::new`] with default protocol, retries and timeout.
    pub fn connect(host: &str, port: u16, username: &str, password: &str) -> Result<Self> {
        Self::new(ClientConfig::new(host, port, username, password))
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn auth_method(&self) -> AuthMethod {
        self.auth_method
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn base_url(&self) -> &str {
        self.endpoint.base_url()
    }

    pub fn pools(&self) -> &ConnectionPool {
        &self.pools
    }

    /// Issues a GET for `command`, making at most `retries + 1` attempts.
    ///
    /// Non-2xx statuses and read timeouts are retried immediately, without
    /// backoff. The last failure is returned once the budget is spent. The
    /// successful response is returned unread.
    pub fn command(
        &self,
        command: &str,
        retries: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<ureq::Response> {
        let retries = retries.unwrap_or(self.config.retries);
        let timeout = timeout.unwrap_or(self.config.timeout);

        let connection = self.pools.get(retries);
        let request = Outgoing::get(&self.endpoint, command, timeout);

        let mut attempt = 1;
        loop {
            debug!(attempt, url = %request.url, "running query");
            match connection.execute(&self.credential, &request) {
                Ok(response) => {
                    debug!(status = response.status(), "query worked");
                    return Ok(response);
                }
                Err(err) if is_retryable(&err) && attempt <= retries => {
                    warn!(attempt, error = %err, "trying again");
                    attempt += 1;
                }
                Err(err) => {
                    error!(attempt, error = %err, "query failed");
                    return Err(CameraError::from_ureq(&request.url, err));
                }
            }
        }
    }

    /// Posts `payload` once with the given headers, without retries of any
    /// kind.
    ///
    /// Devices accept uploads such as audio clips without ever answering, so
    /// a read timeout is deliberately swallowed and reported as success. Any
    /// HTTP reply, whatever its status, also counts as delivered. Only
    /// transport failures other than a read timeout are returned.
    pub fn command_with_payload(
        &self,
        command: &str,
        payload: &[u8],
        headers: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.timeout);
        let connection = self.pools.get(0);
        let request = Outgoing::post(&self.endpoint, command, timeout, headers, payload);

        match connection.execute(&self.credential, &request) {
            Ok(response) => {
                debug!(status = response.status(), url = %request.url, "payload accepted");
                Ok(())
            }
            Err(ureq::Error::Status(status, _)) => {
                warn!(status, url = %request.url, "payload upload answered with error status");
                Ok(())
            }
            Err(err) if is_read_timeout(&err) => {
                debug!(url = %request.url, "no response to payload upload, assuming accepted");
                Ok(())
            }
            Err(err) => Err(CameraError::from_ureq(&request.url, err)),
        }
    }

    /// Client state with secrets masked, for logs and diagnostics.
    pub fn redacted(&self) -> RedactedClient {
        RedactedClient {
            host: self.config.host.clone(),
            port: self.config.port,
            protocol: self.config.protocol.clone(),
            base_url: self.endpoint.base_url().to_string(),
            username: self.config.username.clone(),
            password: REDACTED,
            auth_method: self.auth_method,
            token: REDACTED,
            retries: self.config.retries,
            timeout_ms: self.config.timeout.as_millis() as u64,
            identity: self.identity.clone(),
            pooled_retry_counts: self.pools.retry_counts(),
        }
    }
}

fn is_retryable(err: &ureq::Error) -> bool {
    matches!(err, ureq::Error::Status(..)) || is_read_timeout(err)
}

impl CgiCommand for Client {
    fn command(
        &self,
        command: &str,
        retries: Option<u32>,
        timeout: Option<Duration>,
    ) -> Result<ureq::Response> {
        Client::command(self, command, retries, timeout)
    }

    fn command_with_payload(
        &self,
        command: &str,
        payload: &[u8],
        headers: &[(String, String)],
        timeout: Option<Duration>,
    ) -> Result<()> {
        Client::command_with_payload(self, command, payload, headers, timeout)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RedactedClient {
    pub host: String,
    pub port: u16,
    pub protocol: String,
    pub base_url: String,
    pub username: String,
    pub password: &'static str,
    pub auth_method: AuthMethod,
    pub token: &'static str,
    pub retries: u32,
    pub timeout_ms: u64,
    pub identity: DeviceIdentity,
    pub pooled_retry_counts: Vec<u32>,
}

impl fmt::Display for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<{}: {}>",
            self.identity.name.as_deref().unwrap_or("None"),
            self.identity.serial.as_deref().unwrap_or("None")
        )
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .field("protocol", &self.config.protocol)
            .field("username", &self.config.username)
            .field("password", &REDACTED)
            .field("auth_method", &self.auth_method)
            .field("token", &REDACTED)
            .field("retries", &self.config.retries)
            .field("timeout", &self.config.timeout)
            .field("identity", &self.identity)
            .finish()
    }
}
