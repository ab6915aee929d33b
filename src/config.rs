//! Configuration system using TOML files.
//!
//! Config is stored in the OS-standard config directory:
//! - Windows: %APPDATA%\tuneweaver\config.toml
//! - macOS: ~/Library/Application Support/tuneweaver/config.toml
//! - Linux: ~/.config/tuneweaver/config.toml
//!
//! The config file is human-readable and editable. Every field has a
//! default, so a partial file (or none at all) is fine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::model::ImageResolver;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Identity reconciliation settings
    pub identity: IdentityConfig,

    /// Ranking and listening-tracker settings
    pub ranking: RankingConfig,

    /// Store and image settings
    pub library: LibraryConfig,
}

/// Identity settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// How long to wait for the session provider before falling back
    pub session_timeout_secs: u64,

    /// Where the local identity record is kept (default: data dir)
    pub identity_file: Option<PathBuf>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: 8,
            identity_file: None,
        }
    }
}

impl IdentityConfig {
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Configured identity file, or `identity.json` in the data directory.
    pub fn identity_path(&self) -> Option<PathBuf> {
        self.identity_file
            .clone()
            .or_else(|| data_dir().map(|d| d.join("identity.json")))
    }
}

/// Ranking settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
    /// Results returned for a seed song
    pub seed_limit: usize,

    /// Results returned for the listening-history view
    pub history_limit: usize,

    /// Results in the trending view
    pub trending_limit: usize,

    /// Most-listened history songs forming the reference batch
    pub history_batch_size: usize,

    /// Multiplier on each mode's jitter range (0 disables jitter)
    pub jitter_scale: f64,

    /// Fixed jitter seed for reproducible rankings
    pub jitter_seed: Option<u64>,

    /// Listening intervals at or below this many minutes are not recorded
    pub min_flush_minutes: f64,
}

impl Default for RankingConfig {
    fn default() -> Self {
        Self {
            seed_limit: 10,
            history_limit: 15,
            trending_limit: 15,
            history_batch_size: 15,
            jitter_scale: 1.0,
            jitter_seed: None,
            min_flush_minutes: 0.1,
        }
    }
}

/// Store and image settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    /// SQLite database path (default: `tuneweaver.db` in the data dir)
    pub database: Option<PathBuf>,

    /// Prefix for derived song image references
    pub image_base_url: String,

    /// Cover used by empty playlists
    pub default_cover: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            database: None,
            image_base_url: "/images/songs".to_string(),
            default_cover: "/images/default-cover.png".to_string(),
        }
    }
}

impl LibraryConfig {
    pub fn images(&self) -> ImageResolver {
        ImageResolver::new(&self.image_base_url, &self.default_cover)
    }

    /// Configured database path, or `tuneweaver.db` in the data directory.
    pub fn database_path(&self) -> Option<PathBuf> {
        self.database
            .clone()
            .or_else(|| data_dir().map(|d| d.join(crate::store::sqlite::DEFAULT_DB_NAME)))
    }
}

// ============================================================================
// Config File Operations
// ============================================================================

/// Get the config directory path
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tuneweaver"))
}

/// Get the data directory path
pub fn data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("tuneweaver"))
}

/// Get the full path to the config file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.toml"))
}

/// Load configuration from the default location.
///
/// Returns default config if file doesn't exist or can't be parsed.
/// Logs warnings but doesn't fail - we always return a usable config.
pub fn load() -> Config {
    let Some(path) = config_path() else {
        tracing::warn!("Could not determine config directory, using defaults");
        return Config::default();
    };
    load_from(&path)
}

/// Load configuration from an explicit path, falling back to defaults.
pub fn load_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::info!("No config file found at {:?}, using defaults", path);
        return Config::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {:?}", path);
                config
            }
            Err(e) => {
                tracing::error!("Failed to parse config file {:?}: {}", path, e);
                tracing::warn!("Using default configuration");
                Config::default()
            }
        },
        Err(e) => {
            tracing::error!("Failed to read config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

/// Save configuration to the default location.
///
/// Creates the config directory if it doesn't exist.
pub fn save(config: &Config) -> Result<(), ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_to(config, &path)
}

/// Save configuration to an explicit path.
pub fn save_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| ConfigError::CreateDir(dir.to_path_buf(), e))?;
    }

    // Serialize to pretty TOML
    let contents = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;

    // Write atomically (write to temp, then rename)
    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, &contents).map_err(|e| ConfigError::Write(temp_path.clone(), e))?;
    std::fs::rename(&temp_path, path)
        .map_err(|e| ConfigError::Rename(temp_path, path.to_path_buf(), e))?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}

// ============================================================================
// Error Types
// ============================================================================

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Failed to create config directory {0}: {1}")]
    CreateDir(PathBuf, std::io::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    #[error("Failed to write config to {0}: {1}")]
    Write(PathBuf, std::io::Error),

    #[error("Failed to rename temp file {0} to {1}: {2}")]
    Rename(PathBuf, PathBuf, std::io::Error),
}

// ============================================================================
// Tests
// ============================================================================
