//! Ledger queueing, durability, and Merkle anchoring.
//!
//! `commit` is the hot-path producer: it derives the entry id, try-pushes
//! onto a bounded queue, and never blocks. `flush_pending` is the
//! low-priority consumer: it writes records through to append-only flash,
//! feeds ids into the Merkle batch, anchors full batches, and mirrors every
//! durable record to the downlink. Producer and consumer share one mutex;
//! the commit-side critical section is a capacity check and a push.
//!
//! Failure semantics: a full queue drops the commit (null-id return plus
//! the `itl.queue_full` metric); telemetry loss is observable but
//! non-fatal. A flash-write failure stops the drain; everything still
//! queued retries on the next flush, so nothing is lost to backpressure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::entry::{EntryPayload, LedgerEntry};
use super::merkle::compute_merkle_root;
use crate::config::KernelConfig;
use crate::hal::Hal;
use crate::types::Hash256;

/// Snapshot of ledger counters for introspection and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerStats {
    /// Entries accepted by `commit`.
    pub committed: u64,
    /// Commits dropped because the queue was full.
    pub dropped: u64,
    /// Entries written through to flash.
    pub flushed: u64,
    /// Merkle anchors emitted.
    pub anchors: u64,
    /// Entries currently queued.
    pub queue_depth: usize,
    /// Ids waiting in the current Merkle batch.
    pub merkle_pending: usize,
    /// Next write offset within this ledger's flash partition.
    pub flash_cursor: u32,
}

#[derive(Debug, Default)]
struct LedgerInner {
    queue: VecDeque<LedgerEntry>,
    merkle_batch: Vec<Hash256>,
    flash_cursor: u32,
    committed: u64,
    dropped: u64,
    flushed: u64,
    anchors: u64,
}

/// The immutable telemetry ledger for one redundancy channel.
pub struct Ledger {
    hal: Arc<dyn Hal>,
    inner: Mutex<LedgerInner>,
    queue_capacity: usize,
    batch_size: usize,
    flash_base: u32,
}

impl Ledger {
    /// Creates a ledger writing into the flash partition at `flash_base`.
    ///
    /// Each redundancy channel gets its own partition; cursors never
    /// cross partitions.
    #[must_use]
    pub fn new(hal: Arc<dyn Hal>, config: &KernelConfig, flash_base: u32) -> Self {
        Self {
            hal,
            inner: Mutex::new(LedgerInner::default()),
            queue_capacity: config.ledger_queue_size,
            batch_size: config.merkle_batch_size,
            flash_base,
        }
    }

    /// Base address of this ledger's flash partition.
    #[must_use]
    pub const fn flash_base(&self) -> u32 {
        self.flash_base
    }

    /// Non-blocking commit.
    ///
    /// Derives the content id from the canonical bytes and enqueues the
    /// entry. Returns `None` (and bumps `itl.queue_full`) when the queue
    /// is at capacity; callers treat that as observable telemetry loss,
    /// never as a fault.
    pub fn commit(&self, timestamp_ms: u32, payload: EntryPayload) -> Option<Hash256> {
        let mut inner = self.inner.lock().expect("ledger lock");
        if inner.queue.len() >= self.queue_capacity {
            inner.dropped += 1;
            drop(inner);
            self.hal.metric_emit("itl.queue_full", 1.0);
            return None;
        }

        let mut entry = LedgerEntry {
            timestamp_ms,
            entry_id: Hash256::null(),
            payload,
        };
        entry.entry_id = self.hal.sha256(&entry.canonical_bytes());
        let id = entry.entry_id;

        inner.queue.push_back(entry);
        inner.committed += 1;
        Some(id)
    }

    /// Drains the queue: flash write-through, Merkle batching, downlink.
    ///
    /// Stops at the first flash failure; the failed entry and everything
    /// behind it retry on the next call. Returns the number of entries
    /// made durable.
    pub fn flush_pending(&self) -> usize {
        let mut inner = self.inner.lock().expect("ledger lock");
        let mut written = 0usize;

        loop {
            // A batch left full by an earlier anchor-write failure must
            // anchor before any further entry extends it.
            if inner.merkle_batch.len() >= self.batch_size && !self.anchor_locked(&mut inner) {
                break;
            }

            let Some(entry) = inner.queue.front().cloned() else {
                break;
            };

            let record = entry.encode_record();
            let addr = self.flash_base + inner.flash_cursor;
            if !self.hal.flash_write(addr, &record) {
                self.hal.metric_emit("itl.flash_write_stop", 1.0);
                break;
            }

            #[allow(clippy::cast_possible_truncation)] // record len < 200
            {
                inner.flash_cursor += record.len() as u32;
            }
            inner.merkle_batch.push(entry.entry_id);
            self.hal.downlink_queue(&record);
            inner.queue.pop_front();
            inner.flushed += 1;
            written += 1;

            if inner.merkle_batch.len() >= self.batch_size && !self.anchor_locked(&mut inner) {
                break;
            }
        }

        written
    }

    /// Drains the queue, then anchors whatever partial batch remains.
    ///
    /// Only for controlled shutdown; the background drain never anchors a
    /// partial batch.
    pub fn flush_partial_batch(&self) -> usize {
        let written = self.flush_pending();
        let mut inner = self.inner.lock().expect("ledger lock");
        if inner.queue.is_empty() && !inner.merkle_batch.is_empty() {
            self.anchor_locked(&mut inner);
        }
        written
    }

    /// Counter snapshot.
    pub fn stats(&self) -> LedgerStats {
        let inner = self.inner.lock().expect("ledger lock");
        LedgerStats {
            committed: inner.committed,
            dropped: inner.dropped,
            flushed: inner.flushed,
            anchors: inner.anchors,
            queue_depth: inner.queue.len(),
            merkle_pending: inner.merkle_batch.len(),
            flash_cursor: inner.flash_cursor,
        }
    }

    /// Computes the batch root, writes the anchor record, clears the
    /// batch. Returns `false` when the anchor write failed; the batch is
    /// left intact for retry.
    fn anchor_locked(&self, inner: &mut LedgerInner) -> bool {
        let root = compute_merkle_root(self.hal.as_ref(), &inner.merkle_batch);

        let mut anchor = LedgerEntry {
            timestamp_ms: self.hal.now_ms(),
            entry_id: Hash256::null(),
            payload: EntryPayload::MerkleAnchor { root },
        };
        anchor.entry_id = self.hal.sha256(&anchor.canonical_bytes());

        let record = anchor.encode_record();
        let addr = self.flash_base + inner.flash_cursor;
        if !self.hal.flash_write(addr, &record) {
            self.hal.metric_emit("itl.flash_write_stop", 1.0);
            return false;
        }

        #[allow(clippy::cast_possible_truncation)] // record len < 200
        {
            inner.flash_cursor += record.len() as u32;
        }
        self.hal.downlink_queue(&record);
        // Anchors additionally carry a signature frame on the downlink;
        // ground verification checks the root against the signed id.
        if let Some(signature) = self.hal.ed25519_sign(&anchor.entry_id) {
            self.hal.downlink_queue(&signature);
        }
        inner.merkle_batch.clear();
        inner.anchors += 1;
        self.hal.metric_emit("itl.merkle_anchored", 1.0);
        tracing::debug!(root = %root, "merkle batch anchored");
        true
    }
}
