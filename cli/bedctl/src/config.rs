//! Configuration and credential storage.
//!
//! Handles:
//! - API endpoint and live feed path
//! - The persisted session credential (the only durable client state)

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use smartbed_reconcile::session::{CredentialStore, StoredSession};

/// Configuration file name.
const CONFIG_FILE: &str = "config.json";

/// Credentials file name.
const CREDENTIALS_FILE: &str = "credentials.json";

/// Default push endpoint for dashboard updates.
pub const DEFAULT_LIVE_PATH: &str = "/ws/dashboard";

/// Get the config directory path.
fn config_dir() -> Result<PathBuf> {
    ProjectDirs::from("org", "smartbed", "bedctl")
        .map(|dirs| dirs.config_dir().to_path_buf())
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
}

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// API endpoint URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Path of the live update socket, relative to the API URL.
    #[serde(default = "default_live_path")]
    pub live_path: String,
}

fn default_api_url() -> String {
    std::env::var("BEDCTL_API_URL").unwrap_or_else(|_| "http://localhost:8000".to_string())
}

fn default_live_path() -> String {
    DEFAULT_LIVE_PATH.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            live_path: default_live_path(),
        }
    }
}

impl Config {
    /// Load config from the platform config dir, or return default.
    pub fn load() -> Result<Self> {
        Self::load_from(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {:?}", path))
    }

    /// Get the API URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Save config to the platform config dir.
    pub fn save(&self) -> Result<()> {
        self.save_to(&config_dir()?.join(CONFIG_FILE))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        write_private(path, &contents)
    }
}

/// Write a file readable only by the owner.
fn write_private(path: &Path, contents: &str) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {:?}", path))?;
        file.write_all(contents.as_bytes())?;
    }

    #[cfg(not(unix))]
    {
        fs::write(path, contents).with_context(|| format!("Failed to write {:?}", path))?;
    }

    Ok(())
}

/// Session credential kept as JSON next to the config.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store under the platform config dir.
    pub fn default_location() -> Result<Self> {
        Ok(Self::new(config_dir()?.join(CREDENTIALS_FILE)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<Option<StoredSession>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credentials from {:?}", self.path))?;

        let stored = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credentials from {:?}", self.path))?;

        Ok(Some(stored))
    }

    fn save(&self, session: &StoredSession) -> Result<()> {
        let contents = serde_json::to_string_pretty(session)?;
        write_private(&self.path, &contents)
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete credentials at {:?}", self.path))?;
        }
        Ok(())
    }
}
