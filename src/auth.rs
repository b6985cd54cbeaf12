//! Authentication method negotiation and request signing.
//!
//! Older firmwares accept HTTP Basic, newer ones insist on HTTP Digest. The
//! client probes once at construction, Basic first, and keeps whichever
//! scheme the device accepted for the rest of its lifetime. There is no
//! re-negotiation later, even if a request is rejected with `401`.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info};

use crate::config::ClientConfig;
use crate::error::{CameraError, Result};
use crate::pool::{Outgoing, PooledConnection};
use crate::url::Endpoint;

/// Lightweight command used to discover the authentication scheme.
pub const PROBE_COMMAND: &str = "magicBox.cgi?action=getMachineName";

pub(crate) const REDACTED: &str = "**********";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Basic,
    Digest,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Basic => write!(f, "basic"),
            AuthMethod::Digest => write!(f, "digest"),
        }
    }
}

/// Authentication material reused for every request of a client.
#[derive(Clone)]
pub enum Credential {
    /// Precomputed `Authorization` header value.
    Basic { username: String, header: String },
    Digest { username: String, password: String },
}

impl Credential {
    pub fn new(method: AuthMethod, username: &str, password: &str) -> Self {
        match method {
            AuthMethod::Basic => Credential::Basic {
                username: username.to_string(),
                header: format!(
                    "Basic {}",
                    STANDARD.encode(format!("{}:{}", username, password))
                ),
            },
            AuthMethod::Digest => Credential::Digest {
                username: username.to_string(),
                password: password.to_string(),
            },
        }
    }

    pub fn method(&self) -> AuthMethod {
        match self {
            Credential::Basic { .. } => AuthMethod::Basic,
            Credential::Digest { .. } => AuthMethod::Digest,
        }
    }

    pub fn username(&self) -> &str {
        match self {
            Credential::Basic { username, .. } | Credential::Digest { username, .. } => username,
        }
    }

    /// Sends `request` through `agent`, answering a Digest challenge if the
    /// device issues one.
    pub(crate) fn send(
        &self,
        agent: &ureq::Agent,
        request: &Outgoing<'_>,
    ) -> std::result::Result<ureq::Response, ureq::Error> {
        match self {
            Credential::Basic { header, .. } => request.send(agent, Some(header)),
            Credential::Digest { username, password } => match request.send(agent, None) {
                Err(ureq::Error::Status(401, response)) => {
                    let challenge = response
                        .all("www-authenticate")
                        .into_iter()
                        .find_map(DigestChallenge::parse);

                    match challenge {
                        Some(challenge) => {
                            let cnonce = uuid::Uuid::new_v4().simple().to_string();
                            let header = challenge.authorization(
                                username,
                                password,
                                request.method,
                                &request.uri,
                                &cnonce,
                            );
                            request.send(agent, Some(&header))
                        }
                        None => Err(ureq::Error::Status(401, response)),
                    }
                }
                other => other,
            },
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("header", &REDACTED)
                .finish(),
            Credential::Digest { username, .. } => f
                .debug_struct("Digest")
                .field("username", username)
                .field("password", &REDACTED)
                .finish(),
        }
    }
}

/// Determines which scheme the device accepts. Called once per client.
///
/// Basic is tried first; any HTTP error status falls through to a single
/// Digest attempt. A Digest failure, or a `2xx` body mentioning "invalid" or
/// "error", is fatal. Transport failures are returned as-is without trying
/// the other scheme.
pub fn negotiate(config: &ClientConfig, endpoint: &Endpoint) -> Result<(AuthMethod, Credential)> {
    let connection = PooledConnection::new(0);
    let probe = Outgoing::get(endpoint, PROBE_COMMAND, config.timeout);

    let basic = Credential::new(AuthMethod::Basic, &config.username, &config.password);
    match connection.execute(&basic, &probe) {
        Ok(_) => {
            info!(host = %config.host, "device accepted basic authentication");
            return Ok((AuthMethod::Basic, basic));
        }
        Err(ureq::Error::Status(status, _)) => {
            debug!(status, "basic probe rejected, trying digest");
        }
        Err(err) => return Err(CameraError::from_ureq(&probe.url, err)),
    }

    let digest = Credential::new(AuthMethod::Digest, &config.username, &config.password);
    let response = connection.execute(&digest, &probe).map_err(|err| match err {
        ureq::Error::Status(status, _) => {
            CameraError::Authentication(format!("digest probe returned HTTP {}", status))
        }
        other => CameraError::from_ureq(&probe.url, other),
    })?;

    let body = response.into_string()?;
    let lowered = body.to_lowercase();
    if lowered.contains("invalid") || lowered.contains("error") {
        info!(body = %body.trim(), "invalid credentials");
        return Err(CameraError::Authentication(
            "device rejected the credentials".to_string(),
        ));
    }

    info!(host = %config.host, "device accepted digest authentication");
    Ok((AuthMethod::Digest, digest))
}

/// Parameters of a `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DigestChallenge {
    realm: String,
    nonce: String,
    opaque: Option<String>,
    algorithm: Option<String>,
    qop_auth: bool,
}

impl DigestChallenge {
    /// Returns `None` for non-Digest schemes and for challenges this client
    /// cannot answer (no nonce, unknown algorithm, `auth-int` only).
    pub(crate) fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, rest) = header.split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut params = parse_params(rest);
        let nonce = params.remove("nonce")?;

        let algorithm = params.remove("algorithm");
        if let Some(ref algorithm) = algorithm {
            if !algorithm.eq_ignore_ascii_case("md5") && !algorithm.eq_ignore_ascii_case("md5-sess") {
                return None;
            }
        }

        let qop_auth = match params.get("qop") {
            Some(qop) => {
                if !qop.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")) {
                    return None;
                }
                true
            }
            None => false,
        };

        Some(Self {
            realm: params.remove("realm").unwrap_or_default(),
            nonce,
            opaque: params.remove("opaque"),
            algorithm,
            qop_auth,
        })
    }

    /// Builds the `Authorization` header value answering this challenge.
    pub(crate) fn authorization(
        &self,
        username: &str,
        password: &str,
        method: &str,
        uri: &str,
        cnonce: &str,
    ) -> String {
        const NONCE_COUNT: &str = "00000001";

        let mut ha1 = md5_hex(&format!("{}:{}:{}", username, self.realm, password));
        let sess = self
            .algorithm
            .as_deref()
            .is_some_and(|a| a.eq_ignore_ascii_case("md5-sess"));
        if sess {
            ha1 = md5_hex(&format!("{}:{}:{}", ha1, self.nonce, cnonce));
        }
        let ha2 = md5_hex(&format!("{}:{}", method, uri));

        let response = if self.qop_auth {
            md5_hex(&format!(
                "{}:{}:{}:{}:auth:{}",
                ha1, self.nonce, NONCE_COUNT, cnonce, ha2
            ))
        } else {
            md5_hex(&format!("{}:{}:{}", ha1, self.nonce, ha2))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\"",
            username, self.realm, self.nonce, uri, response
        );
        if let Some(ref opaque) = self.opaque {
            header.push_str(&format!(", opaque=\"{}\"", opaque));
        }
        if let Some(ref algorithm) = self.algorithm {
            header.push_str(&format!(", algorithm={}", algorithm));
        }
        if self.qop_auth {
            header.push_str(&format!(
                ", qop=auth, nc={}, cnonce=\"{}\"",
                NONCE_COUNT, cnonce
            ));
        }
        header
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}

/// Splits `key=value, key="quoted, value"` pairs. Keys are lowercased.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut rest = input.trim();

    while let Some(eq) = rest.find('=') {
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();

        let value = if let Some(quoted) = rest.strip_prefix('"') {
            let (value, consumed) = unquote(quoted);
            rest = &quoted[consumed..];
            value
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            let value = rest[..end].trim().to_string();
            rest = &rest[end..];
            value
        };

        if !key.is_empty() {
            params.insert(key, value);
        }
        rest = rest.trim_start().trim_start_matches(',').trim_start();
    }

    params
}

/// Reads a quoted-string body (opening quote already stripped), resolving
/// `\x` quoted-pairs. Returns the value and the bytes consumed, including
/// the closing quote.
fn unquote(quoted: &str) -> (String, usize) {
    let mut value = String::new();
    let mut chars = quoted.char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            '"' => return (value, i + 1),
            '\\' => match chars.next() {
                Some((_, escaped)) => value.push(escaped),
                None => return (value, quoted.len()),
            },
            _ => value.push(c),
        }
    }

    (value, quoted.len())
}
