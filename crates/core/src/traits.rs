//! BlobStore trait definition
//!
//! The seam between drive operations and a concrete object-store SDK.
//! Everything in cd-core talks to storage through this trait, which keeps
//! the algorithms testable against mocks and in-memory fakes.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use crate::access::AccessPolicy;
use crate::error::Result;
use crate::path::ListingOptions;

/// Size of one page in a page blob
pub const PAGE_SIZE: u64 = 512;

/// Blob flavor as reported by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BlobKind {
    #[default]
    Block,
    Page,
    Append,
}

impl BlobKind {
    /// Parse the service's `BlobType` value (`BlockBlob`, `PageBlob`, `AppendBlob`)
    pub fn from_wire(value: &str) -> Option<Self> {
        match value {
            "BlockBlob" => Some(BlobKind::Block),
            "PageBlob" => Some(BlobKind::Page),
            "AppendBlob" => Some(BlobKind::Append),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &'static str {
        match self {
            BlobKind::Block => "BlockBlob",
            BlobKind::Page => "PageBlob",
            BlobKind::Append => "AppendBlob",
        }
    }
}

impl std::fmt::Display for BlobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlobKind::Block => write!(f, "block"),
            BlobKind::Page => write!(f, "page"),
            BlobKind::Append => write!(f, "append"),
        }
    }
}

/// A container in the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
}

impl ContainerInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_modified: None,
            etag: None,
        }
    }
}

/// A blob as returned by a listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BlobEntry {
    pub name: String,
    pub kind: BlobKind,
    pub size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Snapshot timestamp when the entry is a snapshot rather than the base blob
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub deleted: bool,
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub metadata: BTreeMap<String, String>,
}

impl BlobEntry {
    pub fn new(name: impl Into<String>, kind: BlobKind, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            ..Default::default()
        }
    }
}

/// One page of a segmented listing
#[derive(Debug, Clone, Default)]
pub struct ListSegment {
    pub items: Vec<BlobEntry>,
    /// Continuation marker; `None` once the listing is exhausted
    pub next_marker: Option<String>,
}

/// Properties of a single blob
#[derive(Debug, Clone, PartialEq)]
pub struct BlobProperties {
    pub kind: BlobKind,
    pub size: u64,
    pub last_modified: Option<Timestamp>,
    pub etag: Option<String>,
    pub content_type: Option<String>,
}

/// An occupied span of a page blob, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u64,
    pub end: u64,
}

impl PageRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Access control list of a container: public access level plus named policies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerAcl {
    /// `container`, `blob` or `None` for private
    pub public_access: Option<String>,
    pub policies: BTreeMap<String, AccessPolicy>,
}

/// What a shared access token grants access to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SasResource {
    pub container: String,
    pub blob: Option<String>,
}

impl SasResource {
    pub fn container(container: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: None,
        }
    }

    pub fn blob(container: impl Into<String>, blob: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            blob: Some(blob.into()),
        }
    }
}

/// Object store operations used by the drive
///
/// Implementations must be cheap to share across concurrent calls; the
/// random page writer issues many calls against one `&self` at once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>>;

    async fn container_exists(&self, container: &str) -> Result<bool>;

    async fn create_container(&self, container: &str) -> Result<()>;

    /// Delete a container; returns `false` when it did not exist
    async fn delete_container(&self, container: &str) -> Result<bool>;

    /// List every matching blob, following continuation markers internally
    async fn list_blobs(&self, container: &str, options: &ListingOptions) -> Result<Vec<BlobEntry>>;

    /// List at most `max_results` blobs starting at `marker`
    async fn list_blobs_segment(
        &self,
        container: &str,
        options: &ListingOptions,
        max_results: usize,
        marker: Option<String>,
    ) -> Result<ListSegment>;

    /// Blob properties, or `None` when the blob does not exist
    async fn blob_properties(&self, container: &str, blob: &str) -> Result<Option<BlobProperties>>;

    async fn create_page_blob(&self, container: &str, blob: &str, size: u64) -> Result<()>;

    /// Occupied ranges inside `[offset, offset + length)`, ascending
    async fn page_ranges(
        &self,
        container: &str,
        blob: &str,
        offset: u64,
        length: u64,
    ) -> Result<Vec<PageRange>>;

    /// Write page-aligned `data` at page-aligned `offset`
    async fn write_pages(&self, container: &str, blob: &str, offset: u64, data: Bytes) -> Result<()>;

    async fn put_block_blob(
        &self,
        container: &str,
        blob: &str,
        data: Bytes,
        content_type: Option<String>,
    ) -> Result<()>;

    async fn create_append_blob(&self, container: &str, blob: &str) -> Result<()>;

    async fn append_block(&self, container: &str, blob: &str, data: Bytes) -> Result<()>;

    async fn get_blob(&self, container: &str, blob: &str) -> Result<Bytes>;

    async fn delete_blob(&self, container: &str, blob: &str, snapshot: Option<String>) -> Result<()>;

    async fn get_container_acl(&self, container: &str) -> Result<ContainerAcl>;

    async fn set_container_acl(&self, container: &str, acl: ContainerAcl) -> Result<()>;

    /// Generate a `?`-prefixed shared access token
    ///
    /// With `policy_name` set the token references the stored policy of
    /// that name instead of embedding all parameters.
    fn sas_token(
        &self,
        resource: &SasResource,
        policy: &AccessPolicy,
        policy_name: Option<String>,
    ) -> Result<String>;

    fn blob_url(&self, container: &str, blob: &str) -> String;
}
