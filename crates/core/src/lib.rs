//! cd-core: core library for the cdrive blob storage drive
//!
//! This crate provides everything that does not depend on a particular
//! storage SDK:
//! - Path resolution (containers, key prefixes, listing options)
//! - Lazy, capped enumeration over paginated listings
//! - Adaptive page-range scanning and concurrent random page writes
//! - The access policy grammar used for shared access tokens
//! - Drive operations, drive definitions and the config file
//!
//! Storage is reached through the [`BlobStore`] trait so that all of the
//! above can be tested against mocks.

pub mod access;
pub mod config;
pub mod drive;
pub mod error;
pub mod listing;
pub mod mount;
pub mod pages;
pub mod path;
pub mod retry;
pub mod traits;

pub use access::{AccessPolicy, Permission, Permissions, PolicySpec, parse_policy_spec};
pub use config::{Config, ConfigManager, OutputFormat};
pub use drive::{BlobDrive, DriveItem, PolicyOutcome, RemoveReport};
pub use error::{Error, Result};
pub use listing::enumerate;
pub use mount::{Drive, DriveManager, RetryConfig, StorageKind};
pub use pages::{FillReport, PageRangeScanner, RandomWriteDriver, ScanConfig};
pub use path::{
    BlobPathResolver, DrivePath, ListingDetail, ListingOptions, PathCategory, ResolvedPath, parse_drive_path,
};
pub use retry::{is_retryable_error, retry_with_backoff};
pub use traits::{
    BlobEntry, BlobKind, BlobProperties, BlobStore, ContainerAcl, ContainerInfo, ListSegment, PAGE_SIZE, PageRange,
    SasResource,
};
