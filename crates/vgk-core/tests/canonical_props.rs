//! Property tests for canonical encoding and Merkle anchoring.

use std::sync::Arc;

use proptest::prelude::*;

use vgk_core::config::KernelConfig;
use vgk_core::hal::{Hal, SilHal};
use vgk_core::ledger::{
    audit, compute_merkle_root, CommandExecution, EntryPayload, Ledger, LedgerEntry, ReasonCode,
};
use vgk_core::types::{Hash256, PhysicsState, TxId};

fn finite_f32() -> impl Strategy<Value = f32> {
    (-1.0e6f32..1.0e6f32).prop_filter("finite", |v| v.is_finite())
}

fn arb_hash() -> impl Strategy<Value = Hash256> {
    any::<[u8; 32]>().prop_map(Hash256::from)
}

fn arb_state() -> impl Strategy<Value = PhysicsState> {
    (
        [finite_f32(), finite_f32(), finite_f32()],
        [finite_f32(), finite_f32(), finite_f32()],
        [finite_f32(), finite_f32(), finite_f32(), finite_f32()],
        0.1f32..1.0e7f32,
        any::<u32>(),
    )
        .prop_map(
            |(position_m, velocity_m_s, attitude_q, mass_kg, timestamp_ms)| PhysicsState {
                position_m,
                velocity_m_s,
                attitude_q,
                mass_kg,
                timestamp_ms,
            },
        )
}

fn arb_tx_id() -> impl Strategy<Value = TxId> {
    proptest::collection::vec(proptest::sample::select(b"0123456789abcdef".to_vec()), 24)
        .prop_map(|bytes| {
            let mut buf = [0u8; 24];
            buf.copy_from_slice(&bytes);
            TxId::from_bytes(buf).expect("hex alphabet")
        })
}

fn arb_command() -> impl Strategy<Value = CommandExecution> {
    (arb_hash(), arb_tx_id(), arb_hash(), arb_hash(), any::<u32>()).prop_map(
        |(policy_hash, tx_id, command_set_hash, reference_prediction_id, elapsed_ms)| {
            CommandExecution {
                policy_hash,
                tx_id,
                command_set_hash,
                reference_prediction_id,
                elapsed_ms,
            }
        },
    )
}

fn arb_payload() -> impl Strategy<Value = EntryPayload> {
    prop_oneof![
        (arb_hash(), arb_state()).prop_map(|(snapshot_hash, state)| {
            EntryPayload::StateSnapshot {
                snapshot_hash,
                state,
            }
        }),
        (arb_hash(), 0.0f32..=1.0, 0.0f32..=1.0, arb_hash(), arb_state()).prop_map(
            |(prediction_id, confidence, uncertainty, ref_snapshot, end_state)| {
                EntryPayload::PredictionCommit {
                    prediction_id,
                    confidence,
                    uncertainty,
                    ref_snapshot,
                    end_state,
                }
            }
        ),
        (arb_hash(), arb_hash(), finite_f32()).prop_map(
            |(policy_hash, prediction_id, cost)| EntryPayload::PolicyPreflight {
                policy_hash,
                prediction_id,
                cost,
            }
        ),
        arb_command().prop_map(EntryPayload::CommandCommit),
        arb_command().prop_map(EntryPayload::RollbackCommit),
        (arb_hash(), arb_hash()).prop_map(|(policy_hash, rollback_hash)| {
            EntryPayload::RollbackMetadata {
                policy_hash,
                rollback_hash,
            }
        }),
        "[ -~]{0,40}".prop_map(|reason| EntryPayload::FallbackTriggered {
            reason: ReasonCode::new(&reason),
        }),
        arb_hash().prop_map(|root| EntryPayload::MerkleAnchor { root }),
        any::<u32>().prop_map(|elapsed_ms| EntryPayload::GovernanceBudgetViolation { elapsed_ms }),
        Just(EntryPayload::NominalTrace),
    ]
}

proptest! {
    /// A persisted record decodes back to the exact entry.
    #[test]
    fn prop_record_roundtrip(timestamp_ms in any::<u32>(), payload in arb_payload()) {
        let entry = LedgerEntry {
            timestamp_ms,
            entry_id: Hash256([0x5a; 32]),
            payload,
        };
        let record = entry.encode_record();
        let (decoded, consumed) = LedgerEntry::decode_record(&record).unwrap();
        prop_assert_eq!(consumed, record.len());
        prop_assert_eq!(decoded, entry);
    }

    /// An auditor recomputing ids from persisted bytes gets the stored
    /// ids, for any payload committed through the ledger.
    #[test]
    fn prop_auditor_recomputes_committed_ids(
        timestamp_ms in any::<u32>(),
        payload in arb_payload(),
    ) {
        let hal = Arc::new(SilHal::new(7));
        let ledger = Ledger::new(hal.clone(), &KernelConfig::default(), 0);
        let id = ledger.commit(timestamp_ms, payload).unwrap();
        ledger.flush_pending();

        let entries =
            audit::read_partition(hal.as_ref(), 0, ledger.stats().flash_cursor).unwrap();
        // An anchor may follow depending on batch state; the first record
        // is the committed entry.
        prop_assert_eq!(entries[0].entry_id, id);
        audit::verify_entry_ids(hal.as_ref(), &entries).unwrap();
    }

    /// The duplicate-last-node rule: a batch and the same batch with its
    /// last id appended root identically when the batch length is odd.
    #[test]
    fn prop_merkle_duplicate_last_rule(ids in proptest::collection::vec(arb_hash(), 1..32)) {
        let hal = SilHal::new(7);
        let root = compute_merkle_root(&hal, &ids);
        if ids.len() % 2 == 1 && ids.len() > 1 {
            let mut padded = ids.clone();
            padded.push(*ids.last().unwrap());
            prop_assert_eq!(root, compute_merkle_root(&hal, &padded));
        }
        // Roots are stable.
        prop_assert_eq!(root, compute_merkle_root(&hal, &ids));
    }

    /// Merkle roots commit to content: changing any single id changes
    /// the root.
    #[test]
    fn prop_merkle_commits_to_content(
        ids in proptest::collection::vec(arb_hash(), 2..32),
        index in any::<proptest::sample::Index>(),
    ) {
        let hal = SilHal::new(7);
        let root = compute_merkle_root(&hal, &ids);

        let i = index.index(ids.len());
        let mut tampered = ids.clone();
        let mut bytes = *tampered[i].as_bytes();
        bytes[0] ^= 0x01;
        tampered[i] = Hash256(bytes);
        prop_assert_ne!(root, compute_merkle_root(&hal, &tampered));
    }

    /// Canonical bytes start with the tag byte and the little-endian
    /// timestamp, for every payload kind.
    #[test]
    fn prop_canonical_prefix(timestamp_ms in any::<u32>(), payload in arb_payload()) {
        let hal = SilHal::new(7);
        let kind = payload.kind();
        let entry = LedgerEntry {
            timestamp_ms,
            entry_id: Hash256::null(),
            payload,
        };
        let canonical = entry.canonical_bytes();
        prop_assert_eq!(canonical[0], kind as u8);
        prop_assert_eq!(&canonical[1..5], &timestamp_ms.to_le_bytes());
        prop_assert_eq!(canonical.len(), 5 + kind.effective_payload_len());
        // The id is a pure function of the canonical bytes.
        prop_assert_eq!(hal.sha256(&canonical), hal.sha256(&entry.canonical_bytes()));
    }
}
