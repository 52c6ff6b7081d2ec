//! Drive operations over a blob store
//!
//! `BlobDrive` is what a host shell talks to. It resolves a drive-relative
//! path, decides which store primitive or algorithm applies, and enforces the
//! segment-count rules of each verb. Listing and removal treat a missing
//! container as empty; grammar and arity problems fail before any I/O.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use serde::Serialize;

use crate::access::{AccessPolicy, PolicySpec};
use crate::error::{Error, Result};
use crate::listing::enumerate;
use crate::pages::{FillReport, PageRangeScanner, RandomWriteDriver, ScanConfig};
use crate::path::{BlobPathResolver, ListingOptions, PathCategory, split_path, subpath};
use crate::traits::{BlobEntry, BlobStore, ContainerInfo, PAGE_SIZE, PageRange, SasResource};

/// One item of a drive listing
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DriveItem {
    Container(ContainerInfo),
    Blob(BlobEntry),
}

impl DriveItem {
    pub fn name(&self) -> &str {
        match self {
            DriveItem::Container(c) => &c.name,
            DriveItem::Blob(b) => &b.name,
        }
    }
}

/// What a removal touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RemoveReport {
    pub containers_deleted: usize,
    pub blobs_deleted: usize,
}

/// Result of storing a named container policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyOutcome {
    Added,
    Updated,
    /// An existing policy was found and the caller declined to overwrite it
    Cancelled,
}

/// Path-addressable view of one storage account
pub struct BlobDrive<S> {
    store: S,
    scan: ScanConfig,
}

impl<S: BlobStore> BlobDrive<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            scan: ScanConfig::default(),
        }
    }

    pub fn with_scan_config(mut self, scan: ScanConfig) -> Self {
        self.scan = scan;
        self
    }

    /// List what lives at `path`
    ///
    /// The root lists containers, a container lists all of its blobs and a
    /// query path lists the blobs matching its prefix and options.
    pub async fn list_items(&self, path: &str) -> Result<BoxStream<'_, Result<DriveItem>>> {
        let resolved = BlobPathResolver::resolve(path)?;
        let Some(container) = resolved.container else {
            let containers = self.store.list_containers().await?;
            return Ok(stream::iter(containers.into_iter().map(|c| Ok(DriveItem::Container(c)))).boxed());
        };

        if !self.store.container_exists(&container).await? {
            tracing::debug!(container = %container, "Container missing, listing is empty");
            return Ok(stream::empty().boxed());
        }

        let options = match resolved.category {
            PathCategory::Query => resolved.options.unwrap_or_default(),
            _ => ListingOptions::default(),
        };
        Ok(enumerate(&self.store, &container, &options)
            .map_ok(DriveItem::Blob)
            .boxed())
    }

    /// Names directly below `path`; only the root has children
    pub async fn child_names(&self, path: &str) -> Result<Vec<String>> {
        if !split_path(strip_suffix(path)).is_empty() {
            return Ok(Vec::new());
        }
        let containers = self.store.list_containers().await?;
        Ok(containers.into_iter().map(|c| c.name).collect())
    }

    /// Delete what `path` names
    ///
    /// A container path deletes the container. A query path deletes every
    /// blob it lists, snapshots included when the options ask for them.
    pub async fn remove_item(&self, path: &str) -> Result<RemoveReport> {
        let resolved = BlobPathResolver::resolve(path)?;
        let mut report = RemoveReport::default();

        match (resolved.category, resolved.container) {
            (PathCategory::Root, _) | (_, None) => {}
            (PathCategory::Container, Some(container)) => {
                if self.store.delete_container(&container).await? {
                    report.containers_deleted = 1;
                }
            }
            (PathCategory::Query, Some(container)) => {
                if !self.store.container_exists(&container).await? {
                    return Ok(report);
                }
                let options = resolved.options.unwrap_or_default();
                let targets: Vec<BlobEntry> = enumerate(&self.store, &container, &options)
                    .try_collect()
                    .await?;
                for entry in targets {
                    self.store
                        .delete_blob(&container, &entry.name, entry.snapshot.clone())
                        .await?;
                    report.blobs_deleted += 1;
                }
                tracing::debug!(container = %container, deleted = report.blobs_deleted, "Blobs removed");
            }
        }

        Ok(report)
    }

    /// Make sure the container named by the first segment exists
    ///
    /// Returns `true` when the container had to be created.
    pub async fn create_directory(&self, path: &str) -> Result<bool> {
        let segments = split_path(strip_suffix(path));
        let container = segments
            .first()
            .ok_or_else(|| Error::InvalidPath("A container name is required".into()))?;
        self.ensure_container(container).await
    }

    pub async fn create_page_blob(&self, path: &str, size: u64) -> Result<()> {
        let (container, blob) = blob_target(path, "creating a page blob")?;
        if size % PAGE_SIZE != 0 {
            return Err(Error::InvalidValue(format!(
                "Page blob size {size} must be a multiple of {PAGE_SIZE} bytes"
            )));
        }
        self.ensure_container(&container).await?;
        self.store.create_page_blob(&container, &blob, size).await
    }

    /// Upload `content` as a block blob; a single-segment path only creates the container
    pub async fn write_block_blob(&self, path: &str, content: Bytes, content_type: Option<String>) -> Result<()> {
        let segments = split_path(strip_suffix(path));
        match segments.as_slice() {
            [] => Err(Error::InvalidPath("A container name is required".into())),
            [container] => self.ensure_container(container).await.map(|_| ()),
            [container, ..] => {
                self.ensure_container(container).await?;
                let blob = subpath(strip_suffix(path));
                self.store.put_block_blob(container, &blob, content, content_type).await
            }
        }
    }

    /// Append `content`, creating the append blob on first use
    pub async fn append_blob(&self, path: &str, content: Bytes) -> Result<()> {
        let segments = split_path(strip_suffix(path));
        match segments.as_slice() {
            [] => Err(Error::InvalidPath("A container name is required".into())),
            [container] => self.ensure_container(container).await.map(|_| ()),
            [container, ..] => {
                self.ensure_container(container).await?;
                let blob = subpath(strip_suffix(path));
                if self.store.blob_properties(container, &blob).await?.is_none() {
                    tracing::debug!(container = %container, blob = %blob, "Creating append blob");
                    self.store.create_append_blob(container, &blob).await?;
                }
                self.store.append_block(container, &blob, content).await
            }
        }
    }

    /// Stream the occupied ranges of the page blob at `path`
    pub async fn list_page_ranges(&self, path: &str) -> Result<BoxStream<'_, Result<PageRange>>> {
        let (container, blob) = blob_target(path, "listing page ranges")?;
        let size = self.page_blob_size(&container, &blob).await?;
        Ok(PageRangeScanner::new(self.scan).scan(&self.store, &container, &blob, size))
    }

    /// Write `count` random pages into the page blob at `path`
    pub async fn fill_random_pages(
        &self,
        path: &str,
        count: Option<&str>,
        driver: RandomWriteDriver,
    ) -> Result<FillReport> {
        let count = match count.map(str::trim).filter(|c| !c.is_empty()) {
            None => return Err(Error::MissingValue("A page count is required".into())),
            Some(c) => c.parse::<u64>().map_err(|_| {
                Error::InvalidValue(format!("Page count must be a non-negative integer, got '{c}'"))
            })?,
        };
        let (container, blob) = blob_target(path, "filling pages")?;
        let size = self.page_blob_size(&container, &blob).await?;
        driver.fill(&self.store, &container, &blob, size, count).await
    }

    /// Shared access token scoped to the container at `path`
    pub fn container_sas(&self, path: &str, spec: &PolicySpec) -> Result<String> {
        let segments = split_path(strip_suffix(path));
        let container = segments
            .first()
            .ok_or_else(|| Error::InvalidPath("A container name is required".into()))?;
        self.store
            .sas_token(&SasResource::container(*container), &spec.policy, spec.policy_name.clone())
    }

    /// Full URL plus shared access token for the blob at `path`
    pub fn blob_sas(&self, path: &str, spec: &PolicySpec) -> Result<String> {
        let (container, blob) = blob_target(path, "a blob token")?;
        let token = self.store.sas_token(
            &SasResource::blob(&container, &blob),
            &spec.policy,
            spec.policy_name.clone(),
        )?;
        Ok(format!("{}{}", self.store.blob_url(&container, &blob), token))
    }

    /// Store `spec` as a named policy on the container
    ///
    /// The container is the first segment and the policy name the last. An
    /// existing policy is only overwritten when `confirm` agrees.
    pub async fn set_policy<F>(&self, path: &str, spec: &PolicySpec, confirm: F) -> Result<PolicyOutcome>
    where
        F: FnOnce(&str) -> bool,
    {
        let segments = split_path(strip_suffix(path));
        let (container, name) = match segments.as_slice() {
            [container, .., name] => (*container, *name),
            _ => {
                return Err(Error::InvalidPath(
                    "A policy path needs a container and a policy name (container/name)".into(),
                ));
            }
        };

        let mut acl = self.store.get_container_acl(container).await?;
        let outcome = if acl.policies.contains_key(name) {
            if !confirm(&format!("Should continue to update existing policy {name}?")) {
                return Ok(PolicyOutcome::Cancelled);
            }
            PolicyOutcome::Updated
        } else {
            PolicyOutcome::Added
        };

        acl.policies.insert(name.to_string(), spec.policy.clone());
        self.store.set_container_acl(container, acl).await?;
        tracing::debug!(container = %container, policy = %name, ?outcome, "Container policy stored");
        Ok(outcome)
    }

    /// Named policies stored on the container at `path`
    pub async fn list_policies(&self, path: &str) -> Result<BTreeMap<String, AccessPolicy>> {
        let segments = split_path(strip_suffix(path));
        let container = segments
            .first()
            .ok_or_else(|| Error::InvalidPath("A container name is required".into()))?;
        Ok(self.store.get_container_acl(container).await?.policies)
    }

    /// Content of the first blob a query path lists
    pub async fn read_content(&self, path: &str) -> Result<Option<Bytes>> {
        let resolved = BlobPathResolver::resolve(path)?;
        let (PathCategory::Query, Some(container)) = (resolved.category, resolved.container) else {
            return Ok(None);
        };
        if !self.store.container_exists(&container).await? {
            return Ok(None);
        }

        // Only the first entry is read, so never walk past one listing page.
        let mut options = resolved.options.unwrap_or_default();
        options.max_results = options.max_results.or(NonZeroUsize::new(1));
        let first = enumerate(&self.store, &container, &options).next().await.transpose()?;
        match first {
            Some(entry) => Ok(Some(self.store.get_blob(&container, &entry.name).await?)),
            None => Ok(None),
        }
    }

    /// Upload `data` as a block blob at a query path with a non-empty key
    pub async fn write_content(&self, path: &str, data: Bytes, content_type: Option<String>) -> Result<()> {
        let resolved = BlobPathResolver::resolve(path)?;
        match (resolved.category, resolved.container.as_deref(), resolved.prefix()) {
            (PathCategory::Query, Some(container), key) if !key.is_empty() => {
                self.store.put_block_blob(container, key, data, content_type).await
            }
            _ => Err(Error::InvalidPath(format!(
                "'{path}' does not name a blob (container/key)"
            ))),
        }
    }

    async fn ensure_container(&self, container: &str) -> Result<bool> {
        if self.store.container_exists(container).await? {
            return Ok(false);
        }
        tracing::debug!(container = %container, "Creating container");
        self.store.create_container(container).await?;
        Ok(true)
    }

    async fn page_blob_size(&self, container: &str, blob: &str) -> Result<u64> {
        self.store
            .blob_properties(container, blob)
            .await?
            .map(|p| p.size)
            .ok_or_else(|| Error::NotFound(format!("{container}/{blob}")))
    }
}

fn strip_suffix(path: &str) -> &str {
    path.split_once('?').map(|(body, _)| body).unwrap_or(path)
}

/// Container and blob name of a path with at least two segments
fn blob_target(path: &str, action: &str) -> Result<(String, String)> {
    let body = strip_suffix(path);
    let segments = split_path(body);
    match segments.first() {
        Some(container) if segments.len() >= 2 => Ok((container.to_string(), subpath(body))),
        _ => Err(Error::InvalidPath(format!(
            "'{path}' does not name a blob; {action} needs container/blob"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use futures::TryStreamExt;
    use mockall::predicate::eq;

    use super::*;
    use crate::access::Permissions;
    use crate::traits::{BlobKind, BlobProperties, ContainerAcl, ListSegment, MockBlobStore};

    fn drive(store: MockBlobStore) -> BlobDrive<MockBlobStore> {
        BlobDrive::new(store)
    }

    fn page_blob(size: u64) -> BlobProperties {
        BlobProperties {
            kind: BlobKind::Page,
            size,
            last_modified: None,
            etag: None,
            content_type: None,
        }
    }

    fn spec(letters: &str, name: Option<&str>) -> PolicySpec {
        PolicySpec {
            policy: AccessPolicy {
                permissions: Permissions::from_letters(letters),
                ..Default::default()
            },
            policy_name: name.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_list_root_yields_containers() {
        let mut store = MockBlobStore::new();
        store
            .expect_list_containers()
            .times(1)
            .returning(|| Ok(vec![ContainerInfo::new("logs"), ContainerInfo::new("vhds")]));

        let drive = drive(store);
        let items: Vec<_> = drive.list_items("/").await.unwrap().try_collect().await.unwrap();
        let names: Vec<_> = items.iter().map(DriveItem::name).collect();
        assert_eq!(names, vec!["logs", "vhds"]);
    }

    #[tokio::test]
    async fn test_list_container_lists_everything() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store
            .expect_list_blobs()
            .withf(|c, o| c == "logs" && *o == ListingOptions::default())
            .times(1)
            .returning(|_, _| Ok(vec![BlobEntry::new("a", BlobKind::Block, 1)]));

        let drive = drive(store);
        let items: Vec<_> = drive.list_items("logs").await.unwrap().try_collect().await.unwrap();
        assert_eq!(items, vec![DriveItem::Blob(BlobEntry::new("a", BlobKind::Block, 1))]);
    }

    #[tokio::test]
    async fn test_list_query_applies_prefix_and_cap() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store
            .expect_list_blobs_segment()
            .withf(|c, o, max, _| c == "logs" && o.prefix == "2024" && *max == 2)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(ListSegment {
                    items: vec![
                        BlobEntry::new("2024/a", BlobKind::Block, 1),
                        BlobEntry::new("2024/b", BlobKind::Block, 1),
                    ],
                    next_marker: Some("next".into()),
                })
            });

        let drive = drive(store);
        let items: Vec<_> = drive
            .list_items("logs/2024/?max=2")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
    }

    #[tokio::test]
    async fn test_list_missing_container_is_empty() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(false));
        store.expect_list_blobs().never();

        let drive = drive(store);
        let items: Vec<_> = drive.list_items("ghost/x").await.unwrap().try_collect().await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_list_bad_suffix_fails_before_io() {
        let store = MockBlobStore::new();
        let drive = drive(store);
        assert!(matches!(
            drive.list_items("logs?max=zero").await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_child_names_only_at_root() {
        let mut store = MockBlobStore::new();
        store
            .expect_list_containers()
            .times(1)
            .returning(|| Ok(vec![ContainerInfo::new("logs")]));

        let drive = drive(store);
        assert_eq!(drive.child_names("").await.unwrap(), vec!["logs"]);
        assert!(drive.child_names("logs").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_root_is_noop() {
        let store = MockBlobStore::new();
        let report = drive(store).remove_item("/").await.unwrap();
        assert_eq!(report, RemoveReport::default());
    }

    #[tokio::test]
    async fn test_remove_container() {
        let mut store = MockBlobStore::new();
        store
            .expect_delete_container()
            .with(eq("logs"))
            .times(1)
            .returning(|_| Ok(true));

        let report = drive(store).remove_item("logs").await.unwrap();
        assert_eq!(report.containers_deleted, 1);
    }

    #[tokio::test]
    async fn test_remove_query_deletes_each_match_with_snapshot() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_list_blobs().times(1).returning(|_, _| {
            let mut snap = BlobEntry::new("tmp/a", BlobKind::Block, 1);
            snap.snapshot = Some("2024-01-01T00:00:00.0000000Z".into());
            Ok(vec![BlobEntry::new("tmp/a", BlobKind::Block, 1), snap])
        });
        store
            .expect_delete_blob()
            .withf(|c, b, s| c == "logs" && b == "tmp/a" && s.is_none())
            .times(1)
            .returning(|_, _, _| Ok(()));
        store
            .expect_delete_blob()
            .withf(|_, _, s| s.is_some())
            .times(1)
            .returning(|_, _, _| Ok(()));

        let report = drive(store).remove_item("logs/tmp/?include=snapshots").await.unwrap();
        assert_eq!(report.blobs_deleted, 2);
    }

    #[tokio::test]
    async fn test_remove_query_on_missing_container_is_empty() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(false));
        store.expect_delete_blob().never();

        let report = drive(store).remove_item("ghost/tmp").await.unwrap();
        assert_eq!(report.blobs_deleted, 0);
    }

    #[tokio::test]
    async fn test_create_directory_creates_missing_container_once() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(false));
        store
            .expect_create_container()
            .with(eq("logs"))
            .times(1)
            .returning(|_| Ok(()));

        assert!(drive(store).create_directory("logs/a/b").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_directory_at_root_fails() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).create_directory("/").await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_create_page_blob_requires_two_segments() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).create_page_blob("vhds", 512).await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_create_page_blob_rejects_unaligned_size() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).create_page_blob("vhds/disk.vhd", 1000).await,
            Err(Error::InvalidValue(_))
        ));
    }

    #[tokio::test]
    async fn test_create_page_blob() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_create_container().never();
        store
            .expect_create_page_blob()
            .withf(|c, b, size| c == "vhds" && b == "os/disk.vhd" && *size == 1024)
            .times(1)
            .returning(|_, _, _| Ok(()));

        drive(store).create_page_blob("vhds/os/disk.vhd", 1024).await.unwrap();
    }

    #[tokio::test]
    async fn test_write_block_blob_single_segment_only_creates_container() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(false));
        store.expect_create_container().times(1).returning(|_| Ok(()));
        store.expect_put_block_blob().never();

        drive(store)
            .write_block_blob("docs", Bytes::from_static(b"hi"), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_write_block_blob() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store
            .expect_put_block_blob()
            .withf(|c, b, data, ct| {
                c == "docs" && b == "a/readme.txt" && data.as_ref() == b"hi" && ct.as_deref() == Some("text/plain")
            })
            .times(1)
            .returning(|_, _, _, _| Ok(()));

        drive(store)
            .write_block_blob("docs/a/readme.txt", Bytes::from_static(b"hi"), Some("text/plain".into()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_creates_blob_when_missing() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_blob_properties().returning(|_, _| Ok(None));
        store.expect_create_append_blob().times(1).returning(|_, _| Ok(()));
        store.expect_append_block().times(1).returning(|_, _, _| Ok(()));

        drive(store)
            .append_blob("logs/app.log", Bytes::from_static(b"line\n"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_append_to_existing_blob() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_blob_properties().returning(|_, _| {
            Ok(Some(BlobProperties {
                kind: BlobKind::Append,
                size: 5,
                last_modified: None,
                etag: None,
                content_type: None,
            }))
        });
        store.expect_create_append_blob().never();
        store.expect_append_block().times(1).returning(|_, _, _| Ok(()));

        drive(store)
            .append_blob("logs/app.log", Bytes::from_static(b"more\n"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_list_page_ranges_missing_blob() {
        let mut store = MockBlobStore::new();
        store.expect_blob_properties().returning(|_, _| Ok(None));

        let drive = drive(store);
        assert!(matches!(
            drive.list_page_ranges("vhds/missing.vhd").await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_page_ranges_streams_scanner() {
        let mut store = MockBlobStore::new();
        store.expect_blob_properties().returning(|_, _| Ok(Some(page_blob(1024))));
        store
            .expect_page_ranges()
            .withf(|_, _, offset, length| *offset == 0 && *length == 1024)
            .times(1)
            .returning(|_, _, _, _| Ok(vec![PageRange::new(0, 511)]));

        let drive = drive(store);
        let ranges: Vec<_> = drive
            .list_page_ranges("vhds/disk.vhd")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(ranges, vec![PageRange::new(0, 511)]);
    }

    #[tokio::test]
    async fn test_fill_requires_count() {
        let store = MockBlobStore::new();
        let drive = drive(store);
        for count in [None, Some(""), Some("  ")] {
            assert!(matches!(
                drive
                    .fill_random_pages("vhds/disk.vhd", count, RandomWriteDriver::new())
                    .await,
                Err(Error::MissingValue(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_fill_rejects_malformed_count() {
        let store = MockBlobStore::new();
        let drive = drive(store);
        for count in ["many", "-3", "1.5"] {
            assert!(matches!(
                drive
                    .fill_random_pages("vhds/disk.vhd", Some(count), RandomWriteDriver::new())
                    .await,
                Err(Error::InvalidValue(msg)) if msg.contains(count)
            ));
        }
    }

    #[tokio::test]
    async fn test_fill_random_pages() {
        let mut store = MockBlobStore::new();
        store.expect_blob_properties().returning(|_, _| Ok(Some(page_blob(4096))));
        store.expect_write_pages().times(3).returning(|_, _, _, _| Ok(()));

        let report = drive(store)
            .fill_random_pages("vhds/disk.vhd", Some("3"), RandomWriteDriver::with_seed(9))
            .await
            .unwrap();
        assert_eq!(report.writes, 3);
    }

    #[test]
    fn test_container_sas_policy_bound() {
        let mut store = MockBlobStore::new();
        store
            .expect_sas_token()
            .withf(|r, _, name| *r == SasResource::container("logs") && name.as_deref() == Some("readers"))
            .times(1)
            .returning(|_, _, _| Ok("?sv=x&si=readers&sig=y".into()));

        let token = drive(store)
            .container_sas("logs", &spec("", Some("readers")))
            .unwrap();
        assert_eq!(token, "?sv=x&si=readers&sig=y");
    }

    #[test]
    fn test_blob_sas_prefixes_url() {
        let mut store = MockBlobStore::new();
        store
            .expect_sas_token()
            .withf(|r, p, name| {
                *r == SasResource::blob("logs", "a/b.txt") && p.permissions.to_string() == "r" && name.is_none()
            })
            .returning(|_, _, _| Ok("?sig=abc".into()));
        store
            .expect_blob_url()
            .returning(|c, b| format!("https://acct.blob.core.windows.net/{c}/{b}"));

        let url = drive(store).blob_sas("logs/a/b.txt", &spec("r", None)).unwrap();
        assert_eq!(url, "https://acct.blob.core.windows.net/logs/a/b.txt?sig=abc");
    }

    #[test]
    fn test_blob_sas_requires_blob() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).blob_sas("logs", &spec("r", None)),
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_set_policy_adds_new() {
        let mut store = MockBlobStore::new();
        store.expect_get_container_acl().returning(|_| Ok(ContainerAcl::default()));
        store
            .expect_set_container_acl()
            .withf(|c, acl| c == "logs" && acl.policies.contains_key("readers"))
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = drive(store)
            .set_policy("logs/readers", &spec("rl", None), |_| panic!("no prompt for new policy"))
            .await
            .unwrap();
        assert_eq!(outcome, PolicyOutcome::Added);
    }

    fn acl_with(name: &str) -> ContainerAcl {
        let mut policies = BTreeMap::new();
        policies.insert(name.to_string(), AccessPolicy::default());
        ContainerAcl {
            public_access: None,
            policies,
        }
    }

    #[tokio::test]
    async fn test_set_policy_declined_leaves_acl_untouched() {
        let mut store = MockBlobStore::new();
        store.expect_get_container_acl().returning(|_| Ok(acl_with("readers")));
        store.expect_set_container_acl().never();

        let outcome = drive(store)
            .set_policy("logs/readers", &spec("r", None), |prompt| {
                assert!(prompt.contains("readers"));
                false
            })
            .await
            .unwrap();
        assert_eq!(outcome, PolicyOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_set_policy_confirmed_overwrites() {
        let mut store = MockBlobStore::new();
        store.expect_get_container_acl().returning(|_| Ok(acl_with("readers")));
        store
            .expect_set_container_acl()
            .withf(|_, acl| acl.policies["readers"].permissions.to_string() == "rw")
            .times(1)
            .returning(|_, _| Ok(()));

        let outcome = drive(store)
            .set_policy("logs/readers", &spec("wr", None), |_| true)
            .await
            .unwrap();
        assert_eq!(outcome, PolicyOutcome::Updated);
    }

    #[tokio::test]
    async fn test_set_policy_needs_name() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).set_policy("logs", &spec("r", None), |_| true).await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_read_content_first_match() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store.expect_list_blobs().never();
        store
            .expect_list_blobs_segment()
            .withf(|c, o, max, marker| c == "docs" && o.prefix == "notes" && *max == 1 && marker.is_none())
            .times(1)
            .returning(|_, _, _, _| {
                Ok(ListSegment {
                    items: vec![BlobEntry::new("notes/a.txt", BlobKind::Block, 2)],
                    next_marker: Some("more".into()),
                })
            });
        store
            .expect_get_blob()
            .with(eq("docs"), eq("notes/a.txt"))
            .times(1)
            .returning(|_, _| Ok(Bytes::from_static(b"aa")));

        let content = drive(store).read_content("docs/notes/").await.unwrap();
        assert_eq!(content.as_deref(), Some(&b"aa"[..]));
    }

    #[tokio::test]
    async fn test_read_content_keeps_explicit_cap() {
        let mut store = MockBlobStore::new();
        store.expect_container_exists().returning(|_| Ok(true));
        store
            .expect_list_blobs_segment()
            .withf(|_, _, max, _| *max == 5)
            .times(1)
            .returning(|_, _, _, _| {
                Ok(ListSegment {
                    items: vec![],
                    next_marker: None,
                })
            });

        assert_eq!(drive(store).read_content("docs/notes?max=5").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_content_container_path_is_none() {
        let store = MockBlobStore::new();
        assert_eq!(drive(store).read_content("docs").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_content_needs_key() {
        let store = MockBlobStore::new();
        assert!(matches!(
            drive(store).write_content("docs?max=1", Bytes::new(), None).await,
            Err(Error::InvalidPath(_))
        ));
    }
}
