//! Drive definitions
//!
//! A drive is a named storage account: the kind of storage behind it, the
//! service endpoint and the shared key used to sign requests. Definitions are
//! kept in the config file and managed through [`DriveManager`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::ConfigManager;
use crate::error::{Error, Result};

/// Kind of storage a drive is mounted on
///
/// Only blob storage is implemented; the others are recognized so that a
/// config naming them fails with a clear message at connect time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    #[serde(rename = "azureblob")]
    Blob,
    #[serde(rename = "azurefile")]
    File,
    #[serde(rename = "azuretable")]
    Table,
    #[serde(rename = "azurequeue")]
    Queue,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Blob => "azureblob",
            StorageKind::File => "azurefile",
            StorageKind::Table => "azuretable",
            StorageKind::Queue => "azurequeue",
        }
    }

    pub fn is_supported(&self) -> bool {
        matches!(self, StorageKind::Blob)
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "azureblob" | "blob" => Ok(StorageKind::Blob),
            "azurefile" | "file" => Ok(StorageKind::File),
            "azuretable" | "table" => Ok(StorageKind::Table),
            "azurequeue" | "queue" => Ok(StorageKind::Queue),
            other => Err(Error::InvalidValue(format!(
                "Unknown storage kind '{other}'. Expected one of: azureblob, azurefile, azuretable, azurequeue"
            ))),
        }
    }
}

/// Retry settings for a drive's HTTP exchanges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
        }
    }
}

/// A named storage account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    pub name: String,
    pub kind: StorageKind,
    /// Service endpoint, e.g. `https://acct.blob.core.windows.net`
    pub endpoint: String,
    pub account: String,
    /// Base64 shared key
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,
}

impl Drive {
    pub fn new(
        name: impl Into<String>,
        kind: StorageKind,
        endpoint: impl Into<String>,
        account: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            endpoint: endpoint.into(),
            account: account.into(),
            key: key.into(),
            retry: None,
        }
    }

    /// Build a drive from `endpoint?account=<name>&key=<key>`
    ///
    /// The key is taken verbatim; base64 padding and `+` survive.
    pub fn from_connection(name: impl Into<String>, kind: StorageKind, connection: &str) -> Result<Self> {
        let (endpoint, query) = connection.trim().split_once('?').ok_or_else(|| {
            Error::InvalidValue("Connection must look like <endpoint>?account=<account>&key=<key>".into())
        })?;

        let mut account = None;
        let mut key = None;
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((k, v)) if k.eq_ignore_ascii_case("account") => account = Some(v.to_string()),
                Some((k, v)) if k.eq_ignore_ascii_case("key") => key = Some(v.to_string()),
                _ => {
                    return Err(Error::InvalidValue(format!(
                        "Unexpected connection parameter '{pair}'. Expected: account=<account>&key=<key>"
                    )));
                }
            }
        }

        let account = account.filter(|a| !a.is_empty()).ok_or_else(|| {
            Error::MissingValue("Connection is missing 'account'".into())
        })?;
        let key = key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::MissingValue("Connection is missing 'key'".into()))?;

        let drive = Self::new(name, kind, endpoint.trim_end_matches('/'), account, key);
        drive.validate()?;
        Ok(drive)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.contains(['/', ':', '?']) {
            return Err(Error::InvalidValue(format!(
                "Drive name '{}' must be non-empty and free of '/', ':' and '?'",
                self.name
            )));
        }
        let url = url::Url::parse(&self.endpoint)
            .map_err(|e| Error::InvalidValue(format!("Invalid endpoint '{}': {e}", self.endpoint)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidValue(format!(
                "Endpoint '{}' must use http or https",
                self.endpoint
            )));
        }
        Ok(())
    }

    pub fn retry_config(&self) -> RetryConfig {
        self.retry.unwrap_or_default()
    }
}

/// CRUD over the drives stored in the config file
pub struct DriveManager {
    config_manager: ConfigManager,
}

impl DriveManager {
    pub fn new() -> Result<Self> {
        Ok(Self {
            config_manager: ConfigManager::new()?,
        })
    }

    pub fn with_config_manager(config_manager: ConfigManager) -> Self {
        Self { config_manager }
    }

    /// Add a drive or replace the one with the same name
    pub fn set(&self, drive: Drive) -> Result<()> {
        drive.validate()?;
        let mut config = self.config_manager.load()?;
        match config.drives.iter_mut().find(|d| d.name == drive.name) {
            Some(existing) => *existing = drive,
            None => config.drives.push(drive),
        }
        self.config_manager.save(&config)
    }

    pub fn get(&self, name: &str) -> Result<Drive> {
        self.config_manager
            .load()?
            .drives
            .into_iter()
            .find(|d| d.name == name)
            .ok_or_else(|| Error::DriveNotFound(name.to_string()))
    }

    pub fn list(&self) -> Result<Vec<Drive>> {
        Ok(self.config_manager.load()?.drives)
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        let mut config = self.config_manager.load()?;
        let before = config.drives.len();
        config.drives.retain(|d| d.name != name);
        if config.drives.len() == before {
            return Err(Error::DriveNotFound(name.to_string()));
        }
        self.config_manager.save(&config)
    }
}
