//! Lazy blob enumeration
//!
//! Turns the store's listing calls into a pull-based stream. With no result
//! cap a single unbounded listing call is issued. With a cap of `K`, pages
//! of at most `remaining` entries are requested until `K` entries have been
//! yielded or the store reports no continuation marker. No page is fetched
//! once the cap is reached, even if a marker is still available.
//!
//! Dropping the stream is the only cancellation needed.

use std::collections::VecDeque;

use futures::stream::{self, BoxStream, StreamExt};

use crate::error::Result;
use crate::path::ListingOptions;
use crate::traits::{BlobEntry, BlobStore};

#[derive(Debug)]
enum Phase {
    NotStarted,
    AwaitingPage(Option<String>),
    Exhausted,
}

struct Walk<'a, S: ?Sized> {
    store: &'a S,
    container: String,
    options: ListingOptions,
    /// Entries still allowed to be yielded; `None` is unbounded
    remaining: Option<usize>,
    buffer: VecDeque<BlobEntry>,
    phase: Phase,
}

impl<'a, S> Walk<'a, S>
where
    S: BlobStore + ?Sized,
{
    async fn advance(mut self) -> Result<Option<(BlobEntry, Self)>> {
        loop {
            if let Some(entry) = self.buffer.pop_front() {
                if let Some(remaining) = self.remaining.as_mut() {
                    *remaining -= 1;
                    if *remaining == 0 {
                        self.phase = Phase::Exhausted;
                        self.buffer.clear();
                    }
                }
                return Ok(Some((entry, self)));
            }

            match std::mem::replace(&mut self.phase, Phase::Exhausted) {
                Phase::Exhausted => return Ok(None),
                Phase::NotStarted => match self.remaining {
                    None => {
                        let entries = self.store.list_blobs(&self.container, &self.options).await?;
                        tracing::debug!(
                            container = %self.container,
                            prefix = %self.options.prefix,
                            count = entries.len(),
                            "Unbounded listing returned"
                        );
                        self.buffer.extend(entries);
                    }
                    Some(_) => self.phase = Phase::AwaitingPage(None),
                },
                Phase::AwaitingPage(marker) => {
                    let Some(remaining) = self.remaining else {
                        return Ok(None);
                    };
                    let segment = self
                        .store
                        .list_blobs_segment(&self.container, &self.options, remaining, marker)
                        .await?;
                    tracing::debug!(
                        container = %self.container,
                        requested = remaining,
                        returned = segment.items.len(),
                        more = segment.next_marker.is_some(),
                        "Listing segment fetched"
                    );
                    self.buffer.extend(segment.items);
                    if let Some(next) = segment.next_marker.filter(|m| !m.is_empty()) {
                        self.phase = Phase::AwaitingPage(Some(next));
                    }
                }
            }
        }
    }
}

/// Enumerate the blobs of `container` matching `options`
///
/// Each call starts a fresh cursor walk. Entries arrive in store order.
pub fn enumerate<'a, S>(
    store: &'a S,
    container: &str,
    options: &ListingOptions,
) -> BoxStream<'a, Result<BlobEntry>>
where
    S: BlobStore + ?Sized,
{
    let walk = Walk {
        store,
        container: container.to_string(),
        options: options.clone(),
        remaining: options.max_results.map(|n| n.get()),
        buffer: VecDeque::new(),
        phase: Phase::NotStarted,
    };

    stream::try_unfold(walk, Walk::advance).boxed()
}
