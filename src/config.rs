use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::url::clean_host;

/// Extra attempts per command when the caller does not specify any.
pub const DEFAULT_RETRIES: u32 = 1;

/// Per-attempt timeout when the caller does not specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3050);

/// Connection settings for one device. Immutable once a client is built.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub protocol: String,
    pub retries: u32,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(host: &str, port: u16, username: &str, password: &str) -> Self {
        Self {
            host: clean_host(host),
            port,
            username: username.to_string(),
            password: password.to_string(),
            protocol: "http".to_string(),
            retries: DEFAULT_RETRIES,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = protocol.to_ascii_lowercase();
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Saved camera profiles for the command-line front end.
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cameras: Vec<CameraProfile>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CameraProfile {
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub protocol: Option<String>,
}

fn default_port() -> u16 {
    80
}

impl CameraProfile {
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::new(&self.host, self.port, &self.username, &self.password);
        match self.protocol {
            Some(ref protocol) => config.with_protocol(protocol),
            None => config,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    pub fn find_camera(&self, name: &str) -> Option<&CameraProfile> {
        self.cameras.iter().find(|c| c.name == name)
    }

    pub fn add_camera(&mut self, camera: CameraProfile) {
        // Remove existing entry with same name
        self.cameras.retain(|c| c.name != camera.name);
        self.cameras.push(camera);
    }

    /// Adds `camera` to the config file at `path`. An unreadable or
    /// malformed file is an error and is left untouched.
    pub fn store_camera_at(path: &Path, camera: CameraProfile) -> Result<()> {
        let mut config = Self::load_from(path)?;
        config.add_camera(camera);
        config.save_to(path)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join("ipcam-cgi").join("config.toml"))
}
