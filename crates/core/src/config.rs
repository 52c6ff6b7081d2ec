//! Configuration file handling
//!
//! The configuration lives in `config.toml` under the platform config
//! directory (`~/.config/cdrive` on Linux). `CDRIVE_CONFIG_DIR` overrides
//! the directory, which is what the tests and CI use.
//!
//! ```toml
//! schema_version = 1
//!
//! [[drives]]
//! name = "prod"
//! kind = "azureblob"
//! endpoint = "https://prodacct.blob.core.windows.net"
//! account = "prodacct"
//! key = "base64=="
//!
//! [scan]
//! initial_window = 4194304
//! grow_below = 200
//! shrink_above = 500
//!
//! [defaults]
//! output = "human"
//! ```

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::mount::Drive;
use crate::pages::ScanConfig;

/// Current configuration layout
pub const SCHEMA_VERSION: u32 = 1;

const CONFIG_DIR_ENV: &str = "CDRIVE_CONFIG_DIR";
const CONFIG_FILE: &str = "config.toml";

/// Output format used when no flag is given
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub output: OutputFormat,
}

/// Everything persisted between invocations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    #[serde(default)]
    pub drives: Vec<Drive>,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub defaults: Defaults,
}

fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            drives: Vec::new(),
            scan: ScanConfig::default(),
            defaults: Defaults::default(),
        }
    }
}

/// Loads and saves [`Config`]
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Manager for the default location, honoring `CDRIVE_CONFIG_DIR`
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => dirs::config_dir()
                .map(|d| d.join("cdrive"))
                .ok_or_else(|| Error::Config("Cannot determine the user config directory".into()))?,
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the configuration; a missing file yields the defaults
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(&self.config_path)?;
        let config: Config = toml::from_str(&contents)?;
        if config.schema_version > SCHEMA_VERSION {
            return Err(Error::Config(format!(
                "{} was written by a newer version (schema {}, supported {SCHEMA_VERSION})",
                self.config_path.display(),
                config.schema_version
            )));
        }
        config.scan.validate()?;
        Ok(config)
    }

    /// Write the configuration, creating the directory if needed
    ///
    /// The file holds account keys, so on Unix it is made owner-only.
    pub fn save(&self, config: &Config) -> Result<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(config)?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.config_path)?;

        // `mode` only applies on creation; tighten a file that already existed.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(fs::Permissions::from_mode(0o600))?;
        }
        file.write_all(contents.as_bytes())?;

        tracing::debug!(path = %self.config_path.display(), "Config saved");
        Ok(())
    }
}
