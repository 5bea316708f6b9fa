//! History recorder: de-duplicating per-control buffers flushed in batches.
//!
//! An entry is buffered only when its control has nothing buffered yet,
//! when its value differs from the last buffered value, or when more than
//! the heartbeat window separates it from the last buffered entry. Buffers
//! are drained into one `append_many` call per flush interval. A failed
//! batch is kept for the next flush, up to a retry limit beyond which the
//! oldest entries are dropped.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

use wbhub_domain::history::HistoryEntry;
use wbhub_domain::id::ControlKey;
use wbhub_domain::time;

use crate::flush::FlushSlot;
use crate::ports::HistoryRepository;

/// Entries kept across failed appends unless overridden.
pub const DEFAULT_RETRY_LIMIT: usize = 10_000;

/// Buffers control readings and appends them through a [`HistoryRepository`].
pub struct HistoryRecorder<H> {
    repo: Arc<H>,
    buffers: BTreeMap<ControlKey, Vec<HistoryEntry>>,
    heartbeat: Duration,
    flush_interval: Duration,
    last_flush: Instant,
    slot: FlushSlot,
    // Batches whose append failed; prepended to the next flush.
    retry: Arc<Mutex<Vec<HistoryEntry>>>,
    retry_limit: usize,
}

impl<H> HistoryRecorder<H>
where
    H: HistoryRepository + Send + Sync + 'static,
{
    pub fn new(repo: Arc<H>, heartbeat: Duration, flush_interval: Duration) -> Self {
        Self {
            repo,
            buffers: BTreeMap::new(),
            heartbeat,
            flush_interval,
            last_flush: Instant::now(),
            slot: FlushSlot::new("history"),
            retry: Arc::default(),
            retry_limit: DEFAULT_RETRY_LIMIT,
        }
    }

    #[must_use]
    pub fn with_retry_limit(mut self, retry_limit: usize) -> Self {
        self.retry_limit = retry_limit;
        self
    }

    /// Offer a reading to the recorder. Returns whether it was buffered.
    pub fn add(&mut self, entry: HistoryEntry) -> bool {
        let buffer = self.buffers.entry(entry.key()).or_default();
        let keep = match buffer.last() {
            None => true,
            Some(last) => {
                last.value != entry.value
                    || time::exceeds(last.created_at, entry.created_at, self.heartbeat)
            }
        };
        if keep {
            buffer.push(entry);
        }
        keep
    }

    /// Number of entries waiting for the next flush.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn buffered_for(&self, key: &ControlKey) -> &[HistoryEntry] {
        self.buffers.get(key).map_or(&[], Vec::as_slice)
    }

    /// Flush when the flush interval has elapsed since the last flush.
    pub fn maybe_flush(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_flush) > self.flush_interval {
            self.flush_now(now)
        } else {
            false
        }
    }

    /// Start a background append of everything buffered.
    ///
    /// Does nothing, and keeps the timer running, while a previous append is
    /// still in flight.
    pub fn flush_now(&mut self, now: Instant) -> bool {
        if self.slot.is_busy() {
            return false;
        }
        self.last_flush = now;

        let mut batch: Vec<HistoryEntry> = std::mem::take(
            &mut *self.retry.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut drained: Vec<HistoryEntry> = std::mem::take(&mut self.buffers)
            .into_values()
            .flatten()
            .collect();
        drained.sort_by_key(|entry| entry.created_at);
        batch.extend(drained);
        if batch.is_empty() {
            return false;
        }

        let repo = Arc::clone(&self.repo);
        let retry = Arc::clone(&self.retry);
        let retry_limit = self.retry_limit;
        self.slot.spawn(async move {
            let count = batch.len();
            match repo.append_many(batch.clone()).await {
                Ok(written) => tracing::debug!(written, "history flushed"),
                Err(err) => {
                    tracing::warn!(error = %err, count, "history flush failed, will retry");
                    let mut pending = retry.lock().unwrap_or_else(PoisonError::into_inner);
                    batch.append(&mut pending);
                    requeue(&mut pending, batch, retry_limit);
                }
            }
        })
    }

    /// Wait for the in-flight append, then flush whatever is left.
    pub async fn drain(&mut self) {
        self.slot.settle().await;
        self.flush_now(Instant::now());
        self.slot.settle().await;
        let lost = self
            .retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        if lost > 0 {
            tracing::error!(lost, "history entries could not be written before shutdown");
        }
    }
}

/// Replace `pending` with `batch`, keeping only the newest `limit` entries.
fn requeue(pending: &mut Vec<HistoryEntry>, mut batch: Vec<HistoryEntry>, limit: usize) {
    if batch.len() > limit {
        let dropped = batch.len() - limit;
        batch.drain(..dropped);
        tracing::error!(dropped, limit, "history retry queue full, dropping oldest entries");
    }
    *pending = batch;
}
