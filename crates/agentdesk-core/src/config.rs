//! Platform configuration.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{DeskError, Result};

/// Default upload limit (10 MiB).
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

/// Server configuration, loaded from `~/.agentdesk/config.toml` when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// HTTP port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// SQLite database path (`~` is expanded).
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// HS256 secret for bearer tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Lifetime of tokens minted by `--init-admin`.
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: i64,
    /// Largest accepted upload body.
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Allowed CORS origins. Empty means same-origin only.
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Bind 0.0.0.0 instead of 127.0.0.1.
    #[serde(default)]
    pub bind_all: bool,
}

fn default_port() -> u16 { 3000 }
fn default_db_path() -> String { "~/.agentdesk/agentdesk.db".into() }
fn default_jwt_secret() -> String { "agentdesk-secret-change-me".into() }
fn default_token_ttl_hours() -> i64 { 24 }
fn default_max_upload_bytes() -> usize { DEFAULT_MAX_UPLOAD_BYTES }

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            db_path: default_db_path(),
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl_hours(),
            max_upload_bytes: default_max_upload_bytes(),
            cors_origins: Vec::new(),
            bind_all: false,
        }
    }
}

impl PlatformConfig {
    /// Load config from the default path, falling back to defaults.
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DeskError::Config(format!("Failed to read config: {e}")))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| DeskError::Config(format!("Failed to parse config: {e}")))
    }

    /// `~/.agentdesk/config.toml`
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the AgentDesk home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".agentdesk")
    }

    /// Database path with `~` expanded.
    pub fn resolved_db_path(&self) -> PathBuf {
        PathBuf::from(expand_path(&self.db_path))
    }

    /// True when the secret is still the shipped placeholder.
    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == default_jwt_secret()
    }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_path(p: &str) -> String {
    shellexpand::tilde(p).to_string()
}
