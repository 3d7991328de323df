//! Immutable telemetry ledger.
//!
//! Content-addressed, Merkle-anchored, append-only record of every
//! decision the kernel takes. The ledger accepts entries from the cycle's
//! hot path through a bounded non-blocking queue and makes them durable
//! from a low-priority drain: flash write-through, Merkle batching with
//! anchor entries every 32 ids, and a best-effort downlink mirror.
//!
//! # Ordering invariants
//!
//! - Entries are processed strictly FIFO; the persisted order equals the
//!   commit order.
//! - An anchor entry appears within one batch length of its constituents'
//!   writes and covers exactly the non-anchor entries since the previous
//!   anchor.
//! - No record is ever rewritten; the flash cursor only advances.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use vgk_core::config::KernelConfig;
//! use vgk_core::hal::SilHal;
//! use vgk_core::ledger::{EntryPayload, Ledger};
//!
//! let hal = Arc::new(SilHal::new(42));
//! let ledger = Ledger::new(hal, &KernelConfig::default(), 0);
//!
//! let id = ledger.commit(0, EntryPayload::NominalTrace);
//! assert!(id.is_some());
//! assert_eq!(ledger.flush_pending(), 1);
//! ```

pub mod audit;
mod entry;
mod manager;
mod merkle;


pub use entry::{
    CommandExecution, EntryDecodeError, EntryKind, EntryPayload, LedgerEntry, ReasonCode,
    MAX_PAYLOAD_LEN, REASON_LEN, RECORD_HEADER_LEN,
};
pub use manager::{Ledger, LedgerStats};
pub use merkle::compute_merkle_root;
