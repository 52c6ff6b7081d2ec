//! Page blob scanning and random fill
//!
//! `PageRangeScanner` walks the occupied-range index of a page blob with a
//! window that adapts to how dense the blob is: sparse windows grow, dense
//! windows shrink. `RandomWriteDriver` writes pages at random offsets
//! concurrently, which is handy for producing sparse test blobs.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use futures::future::join_all;
use futures::stream::{self, BoxStream, StreamExt};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::traits::{BlobStore, PAGE_SIZE, PageRange};

/// Tuning for the adaptive page-range window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Window size of the first query, in bytes
    pub initial_window: u64,
    /// Double the window when a query returns fewer ranges than this
    pub grow_below: usize,
    /// Halve the window when a query returns more ranges than this
    pub shrink_above: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            initial_window: 4 * 1024 * 1024,
            grow_below: 200,
            shrink_above: 500,
        }
    }
}

impl ScanConfig {
    /// Reject windows the page-range API cannot be queried with
    pub fn validate(&self) -> Result<()> {
        if self.initial_window == 0 || self.initial_window % PAGE_SIZE != 0 {
            return Err(Error::Config(format!(
                "scan.initial_window must be a non-zero multiple of {PAGE_SIZE} bytes, got {}",
                self.initial_window
            )));
        }
        Ok(())
    }

    /// Window for the next query given how many ranges the last one returned
    pub fn next_window(&self, window: u64, round: usize) -> u64 {
        if round < self.grow_below {
            window.saturating_mul(2)
        } else if round > self.shrink_above {
            (window / 2).max(PAGE_SIZE)
        } else {
            window
        }
    }
}

struct Scan<'a, S: ?Sized> {
    store: &'a S,
    container: String,
    blob: String,
    config: ScanConfig,
    total_length: u64,
    offset: u64,
    window: u64,
    buffer: VecDeque<PageRange>,
    done: bool,
}

impl<'a, S> Scan<'a, S>
where
    S: BlobStore + ?Sized,
{
    async fn advance(mut self) -> Result<Option<(PageRange, Self)>> {
        loop {
            if let Some(range) = self.buffer.pop_front() {
                return Ok(Some((range, self)));
            }
            if self.done || self.offset >= self.total_length {
                return Ok(None);
            }

            let length = self.window.min(self.total_length - self.offset);
            let ranges = self
                .store
                .page_ranges(&self.container, &self.blob, self.offset, length)
                .await?;
            let round = ranges.len();

            tracing::debug!(
                blob = %self.blob,
                offset = self.offset,
                length,
                round,
                "Page ranges queried"
            );
            self.buffer.extend(ranges);

            if self.offset + length >= self.total_length {
                self.done = true;
            } else {
                self.offset += length;
                self.window = self.config.next_window(self.window, round);
            }
        }
    }
}

/// Walks the occupied ranges of a page blob with an adaptive window
#[derive(Debug, Clone, Copy, Default)]
pub struct PageRangeScanner {
    config: ScanConfig,
}

impl PageRangeScanner {
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Stream every occupied range of a blob of `total_length` bytes
    ///
    /// Ranges arrive in ascending order. A zero-length blob yields nothing
    /// and issues no query.
    pub fn scan<'a, S>(
        &self,
        store: &'a S,
        container: &str,
        blob: &str,
        total_length: u64,
    ) -> BoxStream<'a, Result<PageRange>>
    where
        S: BlobStore + ?Sized,
    {
        let scan = Scan {
            store,
            container: container.to_string(),
            blob: blob.to_string(),
            config: self.config,
            total_length,
            offset: 0,
            window: self.config.initial_window.max(PAGE_SIZE),
            buffer: VecDeque::new(),
            done: total_length == 0,
        };

        stream::try_unfold(scan, Scan::advance).boxed()
    }
}

/// Outcome of a random page fill
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FillReport {
    /// Writes issued
    pub writes: u64,
    /// Distinct pages targeted; lower than `writes` when offsets collided
    pub distinct_pages: usize,
}

/// Writes pages of random content at random page offsets, concurrently
///
/// Every invocation owns its generator. All offsets are drawn before the
/// first write is dispatched, so the generator is never touched from more
/// than one place. Offsets may coincide; the last write the store applies
/// wins.
///
/// Failure policy: every dispatched write runs to completion. If any of them
/// failed, the fill fails with the error of the first failed write in
/// dispatch order.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomWriteDriver {
    seed: Option<u64>,
}

impl RandomWriteDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a fixed seed, making offsets and content reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }

    pub async fn fill<S>(
        &self,
        store: &S,
        container: &str,
        blob: &str,
        total_length: u64,
        count: u64,
    ) -> Result<FillReport>
    where
        S: BlobStore + ?Sized,
    {
        if count == 0 {
            return Ok(FillReport {
                writes: 0,
                distinct_pages: 0,
            });
        }
        if total_length == 0 || total_length % PAGE_SIZE != 0 {
            return Err(Error::InvalidValue(format!(
                "Page blob length {total_length} is not a non-zero multiple of {PAGE_SIZE} bytes"
            )));
        }

        let total_pages = total_length / PAGE_SIZE;
        let (page, offsets) = {
            let mut rng = match self.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_rng(&mut rand::rng()),
            };
            let mut page = vec![0u8; PAGE_SIZE as usize];
            rng.fill(&mut page[..]);
            let offsets: Vec<u64> = (0..count)
                .map(|_| rng.random_range(0..total_pages) * PAGE_SIZE)
                .collect();
            (Bytes::from(page), offsets)
        };

        let distinct_pages = offsets.iter().collect::<HashSet<_>>().len();
        tracing::debug!(blob = %blob, count, distinct_pages, "Dispatching page writes");

        let writes = offsets
            .iter()
            .map(|offset| store.write_pages(container, blob, *offset, page.clone()));
        let results = join_all(writes).await;

        let failures = results.iter().filter(|r| r.is_err()).count();
        if let Some(first) = results.into_iter().find_map(|r| r.err()) {
            tracing::warn!(blob = %blob, failures, count, "Some page writes failed");
            return Err(first);
        }

        Ok(FillReport {
            writes: count,
            distinct_pages,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::TryStreamExt;

    use super::*;
    use crate::access::AccessPolicy;
    use crate::path::ListingOptions;
    use crate::traits::{
        BlobEntry, BlobProperties, ContainerAcl, ContainerInfo, ListSegment, MockBlobStore,
        SasResource,
    };

    /// In-memory page blob that records every page-range query
    struct FakePageBlob {
        ranges: Vec<PageRange>,
        queries: Mutex<Vec<(u64, u64)>>,
        /// Fixed range count reported for the first query, if set
        first_round: Option<usize>,
    }

    impl FakePageBlob {
        fn new(ranges: Vec<PageRange>) -> Self {
            Self {
                ranges,
                queries: Mutex::new(Vec::new()),
                first_round: None,
            }
        }

        fn queries(&self) -> Vec<(u64, u64)> {
            self.queries.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BlobStore for FakePageBlob {
        async fn page_ranges(
            &self,
            _container: &str,
            _blob: &str,
            offset: u64,
            length: u64,
        ) -> Result<Vec<PageRange>> {
            let mut queries = self.queries.lock().unwrap();
            queries.push((offset, length));
            if queries.len() == 1
                && let Some(round) = self.first_round
            {
                let end = offset + length;
                return Ok((0..round as u64)
                    .map(|i| offset + i * PAGE_SIZE)
                    .filter(|s| *s < end)
                    .map(|s| PageRange::new(s, s + PAGE_SIZE - 1))
                    .collect());
            }

            let end = offset + length;
            Ok(self
                .ranges
                .iter()
                .filter(|r| r.end >= offset && r.start < end)
                .map(|r| PageRange::new(r.start.max(offset), r.end.min(end - 1)))
                .collect())
        }

        async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
            unimplemented!()
        }
        async fn container_exists(&self, _: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn create_container(&self, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn delete_container(&self, _: &str) -> Result<bool> {
            unimplemented!()
        }
        async fn list_blobs(&self, _: &str, _: &ListingOptions) -> Result<Vec<BlobEntry>> {
            unimplemented!()
        }
        async fn list_blobs_segment(
            &self,
            _: &str,
            _: &ListingOptions,
            _: usize,
            _: Option<String>,
        ) -> Result<ListSegment> {
            unimplemented!()
        }
        async fn blob_properties(&self, _: &str, _: &str) -> Result<Option<BlobProperties>> {
            unimplemented!()
        }
        async fn create_page_blob(&self, _: &str, _: &str, _: u64) -> Result<()> {
            unimplemented!()
        }
        async fn write_pages(&self, _: &str, _: &str, _: u64, _: Bytes) -> Result<()> {
            unimplemented!()
        }
        async fn put_block_blob(&self, _: &str, _: &str, _: Bytes, _: Option<String>) -> Result<()> {
            unimplemented!()
        }
        async fn create_append_blob(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
        async fn append_block(&self, _: &str, _: &str, _: Bytes) -> Result<()> {
            unimplemented!()
        }
        async fn get_blob(&self, _: &str, _: &str) -> Result<Bytes> {
            unimplemented!()
        }
        async fn delete_blob(&self, _: &str, _: &str, _: Option<String>) -> Result<()> {
            unimplemented!()
        }
        async fn get_container_acl(&self, _: &str) -> Result<ContainerAcl> {
            unimplemented!()
        }
        async fn set_container_acl(&self, _: &str, _: ContainerAcl) -> Result<()> {
            unimplemented!()
        }
        fn sas_token(&self, _: &SasResource, _: &AccessPolicy, _: Option<String>) -> Result<String> {
            unimplemented!()
        }
        fn blob_url(&self, _: &str, _: &str) -> String {
            unimplemented!()
        }
    }

    const MIB: u64 = 1024 * 1024;

    fn page(index: u64) -> PageRange {
        PageRange::new(index * PAGE_SIZE, index * PAGE_SIZE + PAGE_SIZE - 1)
    }

    /// Merge adjacent ranges so split-at-window-boundary results compare equal
    fn coalesce(ranges: &[PageRange]) -> Vec<PageRange> {
        let mut out: Vec<PageRange> = Vec::new();
        for r in ranges {
            match out.last_mut() {
                Some(last) if last.end + 1 == r.start => last.end = r.end,
                _ => out.push(*r),
            }
        }
        out
    }

    #[test]
    fn test_initial_window_must_be_page_aligned() {
        assert!(ScanConfig::default().validate().is_ok());
        for initial_window in [0, 1000, PAGE_SIZE + 1] {
            let config = ScanConfig {
                initial_window,
                ..ScanConfig::default()
            };
            assert!(matches!(config.validate(), Err(Error::Config(_))), "{initial_window}");
        }
    }

    #[test]
    fn test_next_window_band() {
        let config = ScanConfig::default();
        assert_eq!(config.next_window(4 * MIB, 50), 8 * MIB);
        assert_eq!(config.next_window(4 * MIB, 600), 2 * MIB);
        assert_eq!(config.next_window(4 * MIB, 300), 4 * MIB);
        assert_eq!(config.next_window(4 * MIB, 200), 4 * MIB);
        assert_eq!(config.next_window(4 * MIB, 500), 4 * MIB);
        assert_eq!(config.next_window(PAGE_SIZE, 501), PAGE_SIZE);
    }

    async fn second_window(first_round: usize) -> u64 {
        let mut fake = FakePageBlob::new(vec![]);
        fake.first_round = Some(first_round);
        let scanner = PageRangeScanner::default();

        let _: Vec<_> = scanner
            .scan(&fake, "disks", "vm.vhd", 64 * MIB)
            .try_collect()
            .await
            .unwrap();

        let queries = fake.queries();
        assert_eq!(queries[0], (0, 4 * MIB));
        queries[1].1
    }

    #[tokio::test]
    async fn test_window_halves_after_dense_round() {
        assert_eq!(second_window(600).await, 2 * MIB);
    }

    #[tokio::test]
    async fn test_window_doubles_after_sparse_round() {
        assert_eq!(second_window(50).await, 8 * MIB);
    }

    #[tokio::test]
    async fn test_window_kept_inside_band() {
        assert_eq!(second_window(300).await, 4 * MIB);
    }

    #[tokio::test]
    async fn test_scan_returns_exactly_the_injected_ranges() {
        // Dense region up front forces shrinking, sparse tail forces growth.
        let mut injected: Vec<PageRange> = (0..3000u64).map(|i| page(i * 2)).collect();
        injected.push(PageRange::new(20 * MIB, 20 * MIB + 8 * PAGE_SIZE - 1));
        injected.push(page((100 * MIB) / PAGE_SIZE - 1));
        let total = 100 * MIB;

        let fake = FakePageBlob::new(injected.clone());
        let scanned: Vec<_> = PageRangeScanner::default()
            .scan(&fake, "disks", "vm.vhd", total)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(coalesce(&scanned), coalesce(&injected));
        assert!(scanned.windows(2).all(|w| w[0].end < w[1].start));
        assert!(scanned.iter().all(|r| r.end < total));

        let queries = fake.queries();
        let covered: u64 = queries.iter().map(|(_, len)| len).sum();
        assert_eq!(covered, total);
        assert!(queries.windows(2).all(|w| w[0].0 + w[0].1 == w[1].0));
        let sizes: BTreeSet<u64> = queries.iter().map(|(_, len)| *len).collect();
        assert!(sizes.len() > 1, "window never adapted: {sizes:?}");
    }

    #[tokio::test]
    async fn test_scan_clamps_last_window() {
        let fake = FakePageBlob::new(vec![page(0)]);
        let total = 4 * MIB + 3 * PAGE_SIZE;
        let scanned: Vec<_> = PageRangeScanner::default()
            .scan(&fake, "disks", "small.vhd", total)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(scanned, vec![page(0)]);
        assert_eq!(fake.queries(), vec![(0, 4 * MIB), (4 * MIB, 3 * PAGE_SIZE)]);
    }

    #[tokio::test]
    async fn test_scan_empty_blob_issues_no_query() {
        let fake = FakePageBlob::new(vec![]);
        let scanned: Vec<_> = PageRangeScanner::default()
            .scan(&fake, "disks", "empty.vhd", 0)
            .try_collect()
            .await
            .unwrap();

        assert!(scanned.is_empty());
        assert!(fake.queries().is_empty());
    }

    #[tokio::test]
    async fn test_scan_uses_configured_window() {
        let fake = FakePageBlob::new(vec![]);
        let config = ScanConfig {
            initial_window: MIB,
            grow_below: 0,
            shrink_above: usize::MAX,
        };
        let _: Vec<_> = PageRangeScanner::new(config)
            .scan(&fake, "disks", "vm.vhd", 3 * MIB)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(fake.queries(), vec![(0, MIB), (MIB, MIB), (2 * MIB, MIB)]);
    }

    #[tokio::test]
    async fn test_fill_zero_count_issues_no_writes() {
        let mut store = MockBlobStore::new();
        store.expect_write_pages().never();

        let report = RandomWriteDriver::new()
            .fill(&store, "disks", "vm.vhd", 8 * PAGE_SIZE, 0)
            .await
            .unwrap();

        assert_eq!(report.writes, 0);
    }

    #[tokio::test]
    async fn test_fill_issues_every_write_page_aligned() {
        let total = 64 * PAGE_SIZE;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();

        let mut store = MockBlobStore::new();
        store
            .expect_write_pages()
            .times(25)
            .returning(move |_, _, offset, data| {
                seen_clone.lock().unwrap().push((offset, data.len()));
                Ok(())
            });

        let report = RandomWriteDriver::with_seed(7)
            .fill(&store, "disks", "vm.vhd", total, 25)
            .await
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 25);
        assert!(
            seen.iter()
                .all(|(o, len)| o % PAGE_SIZE == 0 && *o < total && *len == PAGE_SIZE as usize)
        );
        let distinct: BTreeMap<u64, ()> = seen.iter().map(|(o, _)| (*o, ())).collect();
        assert_eq!(report.writes, 25);
        assert_eq!(report.distinct_pages, distinct.len());
    }

    #[tokio::test]
    async fn test_fill_single_failure_fails_call_after_all_writes() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();

        let mut store = MockBlobStore::new();
        store
            .expect_write_pages()
            .times(10)
            .returning(move |_, _, _, _| {
                let n = calls_clone.fetch_add(1, Ordering::SeqCst);
                if n == 3 {
                    Err(Error::Backend {
                        status: 500,
                        message: "InternalError".to_string(),
                    })
                } else {
                    Ok(())
                }
            });

        let err = RandomWriteDriver::with_seed(1)
            .fill(&store, "disks", "vm.vhd", 16 * PAGE_SIZE, 10)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Backend { status: 500, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_fill_rejects_unaligned_length() {
        let mut store = MockBlobStore::new();
        store.expect_write_pages().never();

        let err = RandomWriteDriver::new()
            .fill(&store, "disks", "odd.bin", 1000, 3)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidValue(_)));
    }

    #[tokio::test]
    async fn test_fill_seeded_is_reproducible() {
        async fn offsets(seed: u64) -> Vec<u64> {
            let seen = Arc::new(Mutex::new(Vec::new()));
            let seen_clone = seen.clone();
            let mut store = MockBlobStore::new();
            store.expect_write_pages().returning(move |_, _, offset, _| {
                seen_clone.lock().unwrap().push(offset);
                Ok(())
            });
            RandomWriteDriver::with_seed(seed)
                .fill(&store, "c", "b", 1024 * PAGE_SIZE, 16)
                .await
                .unwrap();
            let mut v = seen.lock().unwrap().clone();
            v.sort();
            v
        }

        assert_eq!(offsets(42).await, offsets(42).await);
    }
}
