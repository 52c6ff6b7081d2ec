//! Error types for cd-core
//!
//! Grammar and validation failures carry a message that restates the
//! expected input so the caller can correct it without reading docs.

use thiserror::Error;

/// Result type alias for cd-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cd-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// The path does not resolve to a valid operand for the requested action
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A required value argument was not supplied
    #[error("Missing value: {0}")]
    MissingValue(String),

    /// An unrecognized key was used in a value grammar
    #[error("Unknown parameter: {key}. Expected: {expected}")]
    UnknownParameter { key: String, expected: String },

    /// A value was supplied but could not be interpreted
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure before a service response was received
    #[error("Network error: {0}")]
    Network(String),

    /// The object store rejected the call; status and body are kept verbatim
    #[error("Backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Drive not found: {0}")]
    DriveNotFound(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("{0}")]
    General(String),
}

impl Error {
    /// Whether this error came from validating caller input rather than from the store
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidPath(_)
                | Error::MissingValue(_)
                | Error::UnknownParameter { .. }
                | Error::InvalidValue(_)
        )
    }
}
