//! Server configuration.
//!
//! Every option can come from a JSON config file, a CLI flag, or the
//! built-in defaults. Validation happens once at startup; a bad
//! configuration is fatal and never reachable at request time.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing addr")]
    MissingAddr,

    #[error("missing front_addr")]
    MissingFrontAddr,

    #[error("missing storage_dir")]
    MissingStorageDir,

    #[error("sha_cache_size must be positive")]
    InvalidCacheSize,

    #[error("cert_file and key_file must be configured together")]
    PartialTls,

    #[error("invalid upstream_url: {0}")]
    InvalidUpstreamUrl(#[from] url::ParseError),

    #[error("failed to build upstream HTTP client: {0}")]
    UpstreamClient(#[from] reqwest::Error),

    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Registry server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing one bare git repository per package.
    pub storage_dir: PathBuf,
    /// Base URL of the fallback registry; empty disables the fallback.
    pub upstream_url: String,
    /// Capacity of the archive digest cache.
    pub sha_cache_size: usize,
    /// Socket address the listener binds to.
    pub addr: String,
    /// Canonical externally visible base URL, used when constructing
    /// tarball links and the registry root listing. Deliberately not
    /// derived from the request's Host header so cached links stay stable
    /// behind load balancers.
    pub front_addr: String,
    /// TLS certificate path; must be set together with `key_file`.
    pub cert_file: String,
    /// TLS private key path; must be set together with `cert_file`.
    pub key_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage_dir: PathBuf::from("./packages"),
            upstream_url: "http://registry.npmjs.com".to_string(),
            sha_cache_size: 500,
            addr: "127.0.0.1:8200".to_string(),
            front_addr: "http://127.0.0.1:8200".to_string(),
            cert_file: String::new(),
            key_file: String::new(),
        }
    }
}

impl Config {
    /// Loads configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Loads from `path` when it exists, otherwise returns the defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Whether any TLS option is set.
    pub fn tls_requested(&self) -> bool {
        !self.cert_file.is_empty() || !self.key_file.is_empty()
    }

    /// Whether the listener should serve TLS.
    pub fn tls_enabled(&self) -> bool {
        !self.cert_file.is_empty() && !self.key_file.is_empty()
    }

    /// Checks the configuration before any component is constructed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.is_empty() {
            return Err(ConfigError::MissingAddr);
        }
        if self.front_addr.is_empty() {
            return Err(ConfigError::MissingFrontAddr);
        }
        if self.storage_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingStorageDir);
        }
        if self.sha_cache_size == 0 {
            return Err(ConfigError::InvalidCacheSize);
        }
        if self.tls_requested() && !self.tls_enabled() {
            return Err(ConfigError::PartialTls);
        }
        Ok(())
    }
}
