use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Failed to read response: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    /// Converts a `ureq` failure for `url` into the crate taxonomy.
    pub(crate) fn from_ureq(url: &str, err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(status, _) => CameraError::Status {
                status,
                url: url.to_string(),
            },
            ureq::Error::Transport(transport) => CameraError::Transport {
                url: url.to_string(),
                reason: transport.to_string(),
            },
        }
    }

    /// The HTTP status code, when the failure was a non-2xx response.
    pub fn status(&self) -> Option<u16> {
        match self {
            CameraError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, CameraError>;
