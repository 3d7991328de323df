//! Offline verification of persisted ledger records.
//!
//! An auditor holding only the raw flash image and a SHA-256
//! implementation can re-derive every entry id and every anchor root.
//! These helpers implement that reconstruction; the scenario suite runs
//! them over real SIL flash images.

use thiserror::Error;

use super::entry::{EntryDecodeError, EntryKind, EntryPayload, LedgerEntry};
use super::merkle::compute_merkle_root;
use crate::hal::Hal;
use crate::types::Hash256;

/// Errors raised by ledger audits.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// A record failed to decode.
    #[error("record {index} failed to decode: {source}")]
    Decode {
        /// Ordinal of the failing record.
        index: usize,
        /// Underlying decode failure.
        #[source]
        source: EntryDecodeError,
    },

    /// A recomputed entry id disagrees with the stored id.
    #[error("entry {index}: stored id {stored} != recomputed {recomputed}")]
    EntryIdMismatch {
        /// Ordinal of the failing record.
        index: usize,
        /// Id stored in the record.
        stored: Hash256,
        /// Id recomputed from the canonical bytes.
        recomputed: Hash256,
    },

    /// An anchor's root disagrees with the recomputed batch root.
    #[error("anchor at entry {index}: stored root {stored} != recomputed {recomputed}")]
    AnchorRootMismatch {
        /// Ordinal of the anchor record.
        index: usize,
        /// Root stored in the anchor.
        stored: Hash256,
        /// Root recomputed over the preceding batch.
        recomputed: Hash256,
    },

    /// Flash could not be read at the given offset.
    #[error("flash read failed at offset {offset}")]
    FlashRead {
        /// Offset of the failed read.
        offset: u32,
    },
}

/// Decodes consecutive records from a raw partition image.
///
/// # Errors
///
/// Returns [`AuditError::Decode`] at the first malformed record.
pub fn decode_partition(image: &[u8]) -> Result<Vec<LedgerEntry>, AuditError> {
    let mut entries = Vec::new();
    let mut offset = 0usize;
    while offset < image.len() {
        let index = entries.len();
        let (entry, consumed) = LedgerEntry::decode_record(&image[offset..])
            .map_err(|source| AuditError::Decode { index, source })?;
        entries.push(entry);
        offset += consumed;
    }
    Ok(entries)
}

/// Reads and decodes a ledger partition straight from flash.
///
/// # Errors
///
/// Returns [`AuditError::FlashRead`] when the HAL refuses the read and
/// decode errors as [`decode_partition`] does.
pub fn read_partition(
    hal: &dyn Hal,
    flash_base: u32,
    length: u32,
) -> Result<Vec<LedgerEntry>, AuditError> {
    let mut image = vec![0u8; length as usize];
    if length > 0 && !hal.flash_read(flash_base, &mut image) {
        return Err(AuditError::FlashRead { offset: flash_base });
    }
    decode_partition(&image)
}

/// Recomputes every entry id from canonical bytes and compares.
///
/// # Errors
///
/// Returns [`AuditError::EntryIdMismatch`] at the first tampered entry.
pub fn verify_entry_ids(hal: &dyn Hal, entries: &[LedgerEntry]) -> Result<(), AuditError> {
    for (index, entry) in entries.iter().enumerate() {
        let recomputed = hal.sha256(&entry.canonical_bytes());
        if recomputed != entry.entry_id {
            return Err(AuditError::EntryIdMismatch {
                index,
                stored: entry.entry_id,
                recomputed,
            });
        }
    }
    Ok(())
}

/// Recomputes every anchor root over the non-anchor entries since the
/// previous anchor and compares.
///
/// # Errors
///
/// Returns [`AuditError::AnchorRootMismatch`] at the first bad anchor.
pub fn verify_anchors(hal: &dyn Hal, entries: &[LedgerEntry]) -> Result<(), AuditError> {
    let mut batch: Vec<Hash256> = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        if let EntryPayload::MerkleAnchor { root } = &entry.payload {
            let recomputed = compute_merkle_root(hal, &batch);
            if recomputed != *root {
                return Err(AuditError::AnchorRootMismatch {
                    index,
                    stored: *root,
                    recomputed,
                });
            }
            batch.clear();
        } else {
            batch.push(entry.entry_id);
        }
    }
    Ok(())
}

/// Counts the entries of one kind in a decoded partition.
#[must_use]
pub fn count_kind(entries: &[LedgerEntry], kind: EntryKind) -> usize {
    entries.iter().filter(|e| e.kind() == kind).count()
}
