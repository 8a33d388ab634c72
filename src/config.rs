//! Ambient configuration (SPEC_FULL.md §10.3): a `serde`+`toml` settings
//! file under the platform config directory, resolved by `directories-next`,
//! covering the settings an index/search pair actually needs.

use std::fs;
use std::path::{Path, PathBuf};

use directories_next::ProjectDirs;
use log::info;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use serde_derive::{Deserialize, Serialize};

use crate::store::Store;

/// Durable settings: where mail lives, where the index lives, and which
/// addresses count as "mine" for the Contacts cache's personal flag.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct MuConfig {
    #[serde(default)]
    pub maildir_root: Option<PathBuf>,
    #[serde(default)]
    pub store_dir: Option<PathBuf>,
    #[serde(default)]
    pub personal_addresses: Vec<String>,
    #[serde(default = "MuConfig::default_batch_size")]
    pub batch_size: u64,
}

impl MuConfig {
    fn default_batch_size() -> u64 {
        Store::DEFAULT_BATCH_SIZE
    }

    /// The Maildir root to index: config value, falling back to `$MAILDIR`.
    pub fn resolve_maildir_root(&self) -> Option<PathBuf> {
        self.maildir_root
            .clone()
            .or_else(|| std::env::var_os("MAILDIR").map(PathBuf::from))
    }

    /// Where the index and contacts cache live: config value, falling back
    /// to `$MUHOME`, falling back to the platform data directory.
    pub fn resolve_store_dir(&self) -> Option<PathBuf> {
        self.store_dir
            .clone()
            .or_else(|| std::env::var_os("MUHOME").map(PathBuf::from))
            .or_else(|| get_paths().ok().map(|p| p.data_dir().to_path_buf()))
    }

    fn load_from_fs() -> Result<Option<Self>, ConfigError> {
        let path = get_config_path()?;
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(Some(toml::from_str(&content)?))
        } else {
            Ok(None)
        }
    }

    pub fn save(&self) -> Result<(), ConfigError> {
        let path = get_config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, toml::to_string(self)?)?;
        Ok(())
    }
}

impl Default for MuConfig {
    fn default() -> Self {
        MuConfig {
            maildir_root: None,
            store_dir: None,
            personal_addresses: Vec::new(),
            batch_size: MuConfig::default_batch_size(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Toml(#[from] toml::de::Error),
    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
    #[error("unable to determine configuration directory")]
    NoConfigDir,
}

fn get_paths() -> Result<ProjectDirs, ConfigError> {
    ProjectDirs::from("", "", "maildex").ok_or(ConfigError::NoConfigDir)
}

fn get_config_path() -> Result<PathBuf, ConfigError> {
    Ok(get_paths()?.config_dir().join("config.toml"))
}

pub static CONFIG: OnceCell<RwLock<MuConfig>> = OnceCell::new();

/// Load the global config once, from the platform config path, or fall
/// back to defaults. Idempotent: later calls are no-ops.
pub fn load_config() {
    CONFIG.get_or_init(|| {
        let config = match MuConfig::load_from_fs() {
            Ok(Some(config)) => config,
            Ok(None) => MuConfig::default(),
            Err(e) => {
                info!("failed to load configuration, using defaults: {}", e);
                MuConfig::default()
            }
        };
        info!("config loaded: {:?}", config);
        RwLock::new(config)
    });
}

/// A config loaded from an explicit path, bypassing the platform config
/// directory entirely -- used by tests and by binaries invoked with an
/// explicit `--config` override.
pub fn load_config_from(path: &Path) -> Result<MuConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}
