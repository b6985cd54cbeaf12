//! CGI endpoint URL construction.
//!
//! Every device command lives under `scheme://host:port/cgi-bin/`. Feature
//! wrappers supply the part after `cgi-bin/` verbatim, e.g.
//! `magicBox.cgi?action=getMachineName`.

/// Strips a leading `http://`/`https://` (any case) and one trailing `/`
/// from a user-supplied host.
pub fn clean_host(host: &str) -> String {
    let trimmed = host.trim();
    let lower = trimmed.to_ascii_lowercase();

    let without_scheme = if lower.starts_with("https://") {
        &trimmed["https://".len()..]
    } else if lower.starts_with("http://") {
        &trimmed["http://".len()..]
    } else {
        trimmed
    };

    without_scheme
        .strip_suffix('/')
        .unwrap_or(without_scheme)
        .to_string()
}

/// Base endpoint of one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    base: String,
}

impl Endpoint {
    pub fn new(protocol: &str, host: &str, port: u16) -> Self {
        Self {
            base: format!("{}://{}:{}/cgi-bin/", protocol, host, port),
        }
    }

    /// `scheme://host:port/cgi-bin/`
    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Full URL for a command path.
    pub fn url(&self, command: &str) -> String {
        format!("{}{}", self.base, command)
    }

    /// Request-URI (path and query) exactly as it goes on the wire, with
    /// the same percent-encoding the HTTP client applies. Digest signs this.
    pub fn request_uri(&self, command: &str) -> String {
        match ::url::Url::parse(&self.url(command)) {
            Ok(url) => match url.query() {
                Some(query) => format!("{}?{}", url.path(), query),
                None => url.path().to_string(),
            },
            Err(_) => format!("/cgi-bin/{}", command),
        }
    }
}
