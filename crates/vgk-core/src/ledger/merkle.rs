//! Binary Merkle root over entry ids.
//!
//! Pairing rule: adjacent ids are concatenated (64 bytes) and hashed; an
//! odd node at the end of a level is paired with itself. An empty batch
//! roots to the null digest and a single id roots to itself. Auditors
//! recompute roots with the same rule.

use crate::hal::Hal;
use crate::types::{Hash256, HASH_SIZE};

/// Computes the Merkle root of an ordered id batch.
#[must_use]
pub fn compute_merkle_root(hal: &dyn Hal, ids: &[Hash256]) -> Hash256 {
    if ids.is_empty() {
        return Hash256::null();
    }
    if ids.len() == 1 {
        return ids[0];
    }

    let mut level: Vec<Hash256> = ids.to_vec();
    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let left = pair[0];
            let right = if pair.len() == 2 { pair[1] } else { left };
            let mut combined = [0u8; HASH_SIZE * 2];
            combined[..HASH_SIZE].copy_from_slice(left.as_bytes());
            combined[HASH_SIZE..].copy_from_slice(right.as_bytes());
            next.push(hal.sha256(&combined));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SilHal;

    fn ids(n: u8) -> Vec<Hash256> {
        (0..n).map(|i| Hash256([i + 1; 32])).collect()
    }

    #[test]
    fn test_empty_batch_roots_to_null() {
        let hal = SilHal::new(42);
        assert!(compute_merkle_root(&hal, &[]).is_null());
    }

    #[test]
    fn test_single_id_is_its_own_root() {
        let hal = SilHal::new(42);
        let batch = ids(1);
        assert_eq!(compute_merkle_root(&hal, &batch), batch[0]);
    }

    #[test]
    fn test_pair_root_is_hash_of_concatenation() {
        let hal = SilHal::new(42);
        let batch = ids(2);
        let mut combined = [0u8; 64];
        combined[..32].copy_from_slice(batch[0].as_bytes());
        combined[32..].copy_from_slice(batch[1].as_bytes());
        assert_eq!(compute_merkle_root(&hal, &batch), hal.sha256(&combined));
    }

    #[test]
    fn test_odd_count_duplicates_last_node() {
        let hal = SilHal::new(42);
        let three = ids(3);
        // Root over [a, b, c] equals root over [a, b, c, c].
        let mut four = three.clone();
        four.push(three[2]);
        assert_eq!(
            compute_merkle_root(&hal, &three),
            compute_merkle_root(&hal, &four)
        );
    }

    #[test]
    fn test_order_sensitivity() {
        let hal = SilHal::new(42);
        let forward = ids(4);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_ne!(
            compute_merkle_root(&hal, &forward),
            compute_merkle_root(&hal, &reversed)
        );
    }
}
