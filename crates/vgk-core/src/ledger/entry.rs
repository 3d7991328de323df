//! Ledger entry payloads and their canonical wire encoding.
//!
//! Every entry is content-addressed: `entry_id = sha256(type_byte ||
//! timestamp_le || payload_bytes)`, where the payload byte count is derived
//! from the entry tag alone. External auditors reconstruct ids from
//! persisted records, so the layouts here are part of the public contract
//! and never hash padding or uninitialized bytes.
//!
//! # Persisted record layout
//!
//! ```text
//! type: u8 | timestamp_ms: u32 LE | entry_id: [u8; 32] |
//! payload_len: u16 LE | payload: [u8; payload_len]
//! ```

use thiserror::Error;

use crate::types::{
    AileeStatus, Hash256, PhysicsState, TxId, HASH_SIZE, PHYSICS_STATE_WIRE_LEN, TX_ID_LEN,
};

/// Largest payload across all entry kinds (the command-execution family).
pub const MAX_PAYLOAD_LEN: usize = 124;

/// Fixed size of a reason string field.
pub const REASON_LEN: usize = 32;

/// Size of the fixed record header preceding the payload.
pub const RECORD_HEADER_LEN: usize = 1 + 4 + HASH_SIZE + 2;

/// Entry type tags. The discriminant is the persisted type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EntryKind {
    /// Sensed state at the top of a cycle.
    StateSnapshot = 0,
    /// Twin prediction committed for audit.
    PredictionCommit = 1,
    /// Predicted safety excursion.
    EseAlert = 2,
    /// Chosen policy before validation.
    PolicyPreflight = 3,
    /// Actuator command about to be dispatched.
    CommandPending = 4,
    /// Actuator dispatch failed.
    ExecutionFailure = 5,
    /// Actuator dispatch succeeded.
    CommandCommit = 6,
    /// Rollback plan bound to an executed policy.
    RollbackMetadata = 7,
    /// Rollback command executed.
    RollbackCommit = 8,
    /// The fallback path was entered.
    FallbackTriggered = 9,
    /// Merkle root anchoring the preceding batch.
    MerkleAnchor = 10,
    /// Cycle exceeded its wall-time budget.
    GovernanceBudgetViolation = 11,
    /// Heartbeat with no payload.
    NominalTrace = 12,
    /// Supervisor-level exception.
    SupervisorException = 13,
    /// Final layered-validation verdict.
    AileeSafetyStatus = 14,
    /// Outcome of a grace re-evaluation.
    AileeGraceResult = 15,
    /// Outcome of the consensus layer.
    AileeConsensusResult = 16,
}

impl EntryKind {
    /// Decodes a persisted type byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::StateSnapshot),
            1 => Some(Self::PredictionCommit),
            2 => Some(Self::EseAlert),
            3 => Some(Self::PolicyPreflight),
            4 => Some(Self::CommandPending),
            5 => Some(Self::ExecutionFailure),
            6 => Some(Self::CommandCommit),
            7 => Some(Self::RollbackMetadata),
            8 => Some(Self::RollbackCommit),
            9 => Some(Self::FallbackTriggered),
            10 => Some(Self::MerkleAnchor),
            11 => Some(Self::GovernanceBudgetViolation),
            12 => Some(Self::NominalTrace),
            13 => Some(Self::SupervisorException),
            14 => Some(Self::AileeSafetyStatus),
            15 => Some(Self::AileeGraceResult),
            16 => Some(Self::AileeConsensusResult),
            _ => None,
        }
    }

    /// Effective payload byte count, derived from the tag alone.
    ///
    /// The ledger computes this itself rather than taking a per-call
    /// length, so every producer hashes identically.
    #[must_use]
    pub const fn effective_payload_len(self) -> usize {
        match self {
            Self::StateSnapshot | Self::EseAlert => HASH_SIZE + PHYSICS_STATE_WIRE_LEN,
            Self::PredictionCommit => HASH_SIZE + 4 + 4 + HASH_SIZE + PHYSICS_STATE_WIRE_LEN,
            Self::PolicyPreflight => HASH_SIZE + HASH_SIZE + 4,
            Self::CommandPending
            | Self::ExecutionFailure
            | Self::CommandCommit
            | Self::RollbackCommit => HASH_SIZE + TX_ID_LEN + HASH_SIZE + HASH_SIZE + 4,
            Self::RollbackMetadata => HASH_SIZE + HASH_SIZE,
            Self::FallbackTriggered | Self::SupervisorException => REASON_LEN,
            Self::MerkleAnchor => HASH_SIZE,
            Self::GovernanceBudgetViolation => 4,
            Self::NominalTrace => 0,
            Self::AileeSafetyStatus | Self::AileeGraceResult => 1 + 4,
            Self::AileeConsensusResult => 1,
        }
    }
}

/// A fixed-width, zero-padded reason string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReasonCode([u8; REASON_LEN]);

impl ReasonCode {
    /// Builds a reason code, truncating to the field width.
    #[must_use]
    pub fn new(reason: &str) -> Self {
        let mut bytes = [0u8; REASON_LEN];
        let take = reason.len().min(REASON_LEN);
        bytes[..take].copy_from_slice(&reason.as_bytes()[..take]);
        Self(bytes)
    }

    /// Raw field bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; REASON_LEN] {
        &self.0
    }

    /// The reason with zero padding stripped.
    #[must_use]
    pub fn as_str(&self) -> &str {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(REASON_LEN);
        std::str::from_utf8(&self.0[..end]).unwrap_or("")
    }
}

impl From<[u8; REASON_LEN]> for ReasonCode {
    fn from(bytes: [u8; REASON_LEN]) -> Self {
        Self(bytes)
    }
}

/// Shared payload of the command-execution entry family.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandExecution {
    /// Digest of the policy being executed.
    pub policy_hash: Hash256,
    /// Actuator transaction id.
    pub tx_id: TxId,
    /// Digest of the dispatched command tuple.
    pub command_set_hash: Hash256,
    /// Digest of the prediction this command was validated against.
    pub reference_prediction_id: Hash256,
    /// Milliseconds elapsed since the pending entry, where applicable.
    pub elapsed_ms: u32,
}

/// Closed set of entry payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryPayload {
    /// Sensed state at the top of a cycle.
    StateSnapshot {
        /// Digest of the canonical state bytes.
        snapshot_hash: Hash256,
        /// The sensed state.
        state: PhysicsState,
    },
    /// Twin prediction committed for audit.
    PredictionCommit {
        /// Content digest of the prediction.
        prediction_id: Hash256,
        /// Model confidence.
        confidence: f32,
        /// Ensemble spread.
        uncertainty: f32,
        /// Snapshot this prediction was derived from.
        ref_snapshot: Hash256,
        /// Predicted end state.
        end_state: PhysicsState,
    },
    /// Predicted safety excursion.
    EseAlert {
        /// Prediction that raised the alert.
        prediction_id: Hash256,
        /// Predicted violating state.
        violating_state: PhysicsState,
    },
    /// Chosen policy before validation.
    PolicyPreflight {
        /// Digest of the policy command tuple.
        policy_hash: Hash256,
        /// Prediction the policy was ranked against.
        prediction_id: Hash256,
        /// Ranking cost of the chosen policy.
        cost: f32,
    },
    /// Actuator command about to be dispatched.
    CommandPending(CommandExecution),
    /// Actuator dispatch failed.
    ExecutionFailure(CommandExecution),
    /// Actuator dispatch succeeded.
    CommandCommit(CommandExecution),
    /// Rollback plan bound to an executed policy.
    RollbackMetadata {
        /// Digest of the covered policy.
        policy_hash: Hash256,
        /// Digest of the fallback command tuple.
        rollback_hash: Hash256,
    },
    /// Rollback command executed.
    RollbackCommit(CommandExecution),
    /// The fallback path was entered.
    FallbackTriggered {
        /// Short reason.
        reason: ReasonCode,
    },
    /// Merkle root anchoring the preceding batch.
    MerkleAnchor {
        /// Root over the batch's entry ids.
        root: Hash256,
    },
    /// Cycle exceeded its wall-time budget.
    GovernanceBudgetViolation {
        /// Observed cycle wall time.
        elapsed_ms: u32,
    },
    /// Heartbeat with no payload.
    NominalTrace,
    /// Supervisor-level exception.
    SupervisorException {
        /// Short reason.
        reason: ReasonCode,
    },
    /// Final layered-validation verdict.
    AileeSafetyStatus {
        /// Verdict.
        status: AileeStatus,
        /// Confidence at the decision point.
        confidence: f32,
    },
    /// Outcome of a grace re-evaluation.
    AileeGraceResult {
        /// Whether the secondary evaluation passed.
        grace_pass: bool,
        /// Confidence after the secondary evaluation.
        confidence: f32,
    },
    /// Outcome of the consensus layer.
    AileeConsensusResult {
        /// Verdict.
        status: AileeStatus,
    },
}

impl EntryPayload {
    /// The tag of this payload.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        match self {
            Self::StateSnapshot { .. } => EntryKind::StateSnapshot,
            Self::PredictionCommit { .. } => EntryKind::PredictionCommit,
            Self::EseAlert { .. } => EntryKind::EseAlert,
            Self::PolicyPreflight { .. } => EntryKind::PolicyPreflight,
            Self::CommandPending(_) => EntryKind::CommandPending,
            Self::ExecutionFailure(_) => EntryKind::ExecutionFailure,
            Self::CommandCommit(_) => EntryKind::CommandCommit,
            Self::RollbackMetadata { .. } => EntryKind::RollbackMetadata,
            Self::RollbackCommit(_) => EntryKind::RollbackCommit,
            Self::FallbackTriggered { .. } => EntryKind::FallbackTriggered,
            Self::MerkleAnchor { .. } => EntryKind::MerkleAnchor,
            Self::GovernanceBudgetViolation { .. } => EntryKind::GovernanceBudgetViolation,
            Self::NominalTrace => EntryKind::NominalTrace,
            Self::SupervisorException { .. } => EntryKind::SupervisorException,
            Self::AileeSafetyStatus { .. } => EntryKind::AileeSafetyStatus,
            Self::AileeGraceResult { .. } => EntryKind::AileeGraceResult,
            Self::AileeConsensusResult { .. } => EntryKind::AileeConsensusResult,
        }
    }

    /// Encodes the payload into a zero-initialized region, returning the
    /// effective length.
    #[must_use]
    pub fn encode_into(&self, buf: &mut [u8; MAX_PAYLOAD_LEN]) -> usize {
        buf.fill(0);
        let mut w = Writer { buf, off: 0 };
        match self {
            Self::StateSnapshot {
                snapshot_hash,
                state,
            } => {
                w.hash(snapshot_hash);
                w.state(state);
            },
            Self::PredictionCommit {
                prediction_id,
                confidence,
                uncertainty,
                ref_snapshot,
                end_state,
            } => {
                w.hash(prediction_id);
                w.f32(*confidence);
                w.f32(*uncertainty);
                w.hash(ref_snapshot);
                w.state(end_state);
            },
            Self::EseAlert {
                prediction_id,
                violating_state,
            } => {
                w.hash(prediction_id);
                w.state(violating_state);
            },
            Self::PolicyPreflight {
                policy_hash,
                prediction_id,
                cost,
            } => {
                w.hash(policy_hash);
                w.hash(prediction_id);
                w.f32(*cost);
            },
            Self::CommandPending(cmd)
            | Self::ExecutionFailure(cmd)
            | Self::CommandCommit(cmd)
            | Self::RollbackCommit(cmd) => {
                w.hash(&cmd.policy_hash);
                w.bytes(cmd.tx_id.as_bytes());
                w.hash(&cmd.command_set_hash);
                w.hash(&cmd.reference_prediction_id);
                w.u32(cmd.elapsed_ms);
            },
            Self::RollbackMetadata {
                policy_hash,
                rollback_hash,
            } => {
                w.hash(policy_hash);
                w.hash(rollback_hash);
            },
            Self::FallbackTriggered { reason } | Self::SupervisorException { reason } => {
                w.bytes(reason.as_bytes());
            },
            Self::MerkleAnchor { root } => w.hash(root),
            Self::GovernanceBudgetViolation { elapsed_ms } => w.u32(*elapsed_ms),
            Self::NominalTrace => {},
            Self::AileeSafetyStatus { status, confidence } => {
                w.u8(status.as_u8());
                w.f32(*confidence);
            },
            Self::AileeGraceResult {
                grace_pass,
                confidence,
            } => {
                w.u8(u8::from(*grace_pass));
                w.f32(*confidence);
            },
            Self::AileeConsensusResult { status } => w.u8(status.as_u8()),
        }
        let written = w.off;
        debug_assert_eq!(written, self.kind().effective_payload_len());
        written
    }

    /// Decodes a payload of the given kind from persisted bytes.
    ///
    /// # Errors
    ///
    /// Returns [`EntryDecodeError`] when the bytes are shorter than the
    /// kind's effective length or a field fails validation.
    pub fn decode(kind: EntryKind, bytes: &[u8]) -> Result<Self, EntryDecodeError> {
        let needed = kind.effective_payload_len();
        if bytes.len() < needed {
            return Err(EntryDecodeError::Truncated {
                needed,
                available: bytes.len(),
            });
        }
        let mut r = Reader { buf: bytes, off: 0 };
        let payload = match kind {
            EntryKind::StateSnapshot => Self::StateSnapshot {
                snapshot_hash: r.hash(),
                state: r.state(),
            },
            EntryKind::PredictionCommit => Self::PredictionCommit {
                prediction_id: r.hash(),
                confidence: r.f32(),
                uncertainty: r.f32(),
                ref_snapshot: r.hash(),
                end_state: r.state(),
            },
            EntryKind::EseAlert => Self::EseAlert {
                prediction_id: r.hash(),
                violating_state: r.state(),
            },
            EntryKind::PolicyPreflight => Self::PolicyPreflight {
                policy_hash: r.hash(),
                prediction_id: r.hash(),
                cost: r.f32(),
            },
            EntryKind::CommandPending
            | EntryKind::ExecutionFailure
            | EntryKind::CommandCommit
            | EntryKind::RollbackCommit => {
                let cmd = CommandExecution {
                    policy_hash: r.hash(),
                    tx_id: r.tx_id()?,
                    command_set_hash: r.hash(),
                    reference_prediction_id: r.hash(),
                    elapsed_ms: r.u32(),
                };
                match kind {
                    EntryKind::CommandPending => Self::CommandPending(cmd),
                    EntryKind::ExecutionFailure => Self::ExecutionFailure(cmd),
                    EntryKind::CommandCommit => Self::CommandCommit(cmd),
                    _ => Self::RollbackCommit(cmd),
                }
            },
            EntryKind::RollbackMetadata => Self::RollbackMetadata {
                policy_hash: r.hash(),
                rollback_hash: r.hash(),
            },
            EntryKind::FallbackTriggered => Self::FallbackTriggered { reason: r.reason() },
            EntryKind::MerkleAnchor => Self::MerkleAnchor { root: r.hash() },
            EntryKind::GovernanceBudgetViolation => Self::GovernanceBudgetViolation {
                elapsed_ms: r.u32(),
            },
            EntryKind::NominalTrace => Self::NominalTrace,
            EntryKind::SupervisorException => Self::SupervisorException { reason: r.reason() },
            EntryKind::AileeSafetyStatus => Self::AileeSafetyStatus {
                status: r.ailee_status()?,
                confidence: r.f32(),
            },
            EntryKind::AileeGraceResult => Self::AileeGraceResult {
                grace_pass: r.u8() != 0,
                confidence: r.f32(),
            },
            EntryKind::AileeConsensusResult => Self::AileeConsensusResult {
                status: r.ailee_status()?,
            },
        };
        Ok(payload)
    }
}

/// Errors decoding a persisted ledger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntryDecodeError {
    /// Record bytes ended before the payload did.
    #[error("record truncated: needed {needed} payload bytes, had {available}")]
    Truncated {
        /// Bytes the tag requires.
        needed: usize,
        /// Bytes available.
        available: usize,
    },

    /// Unknown entry type byte.
    #[error("unknown entry type byte {0:#04x}")]
    UnknownKind(u8),

    /// Persisted payload length disagrees with the tag-derived length.
    #[error("payload length {stored} does not match tag-derived length {derived}")]
    LengthMismatch {
        /// Length stored in the record header.
        stored: usize,
        /// Length derived from the tag.
        derived: usize,
    },

    /// A transaction id field held bytes outside the hex alphabet.
    #[error("malformed transaction id field")]
    MalformedTxId,

    /// A status byte was outside the closed set.
    #[error("invalid validation status byte {0}")]
    InvalidStatus(u8),
}

/// A committed ledger entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    /// Commit timestamp, milliseconds.
    pub timestamp_ms: u32,
    /// Content digest over the canonical bytes.
    pub entry_id: Hash256,
    /// The payload.
    pub payload: EntryPayload,
}

impl LedgerEntry {
    /// The entry's type tag.
    #[must_use]
    pub const fn kind(&self) -> EntryKind {
        self.payload.kind()
    }

    /// Canonical bytes hashed into the entry id:
    /// `type_byte || timestamp_le || payload[0..effective_len]`.
    #[must_use]
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let mut region = [0u8; MAX_PAYLOAD_LEN];
        let len = self.payload.encode_into(&mut region);
        let mut out = Vec::with_capacity(1 + 4 + len);
        out.push(self.kind() as u8);
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.extend_from_slice(&region[..len]);
        out
    }

    /// Full persisted record bytes (header plus payload).
    #[must_use]
    pub fn encode_record(&self) -> Vec<u8> {
        let mut region = [0u8; MAX_PAYLOAD_LEN];
        let len = self.payload.encode_into(&mut region);
        let mut out = Vec::with_capacity(RECORD_HEADER_LEN + len);
        out.push(self.kind() as u8);
        out.extend_from_slice(&self.timestamp_ms.to_le_bytes());
        out.extend_from_slice(self.entry_id.as_bytes());
        #[allow(clippy::cast_possible_truncation)] // len <= MAX_PAYLOAD_LEN
        out.extend_from_slice(&(len as u16).to_le_bytes());
        out.extend_from_slice(&region[..len]);
        out
    }

    /// Decodes one record from the front of `bytes`, returning the entry
    /// and the number of bytes consumed.
    ///
    /// # Errors
    ///
    /// Returns [`EntryDecodeError`] on truncation, an unknown tag, a
    /// length mismatch, or a malformed field.
    pub fn decode_record(bytes: &[u8]) -> Result<(Self, usize), EntryDecodeError> {
        if bytes.len() < RECORD_HEADER_LEN {
            return Err(EntryDecodeError::Truncated {
                needed: RECORD_HEADER_LEN,
                available: bytes.len(),
            });
        }
        let kind = EntryKind::from_u8(bytes[0]).ok_or(EntryDecodeError::UnknownKind(bytes[0]))?;
        let timestamp_ms = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        let mut id = [0u8; HASH_SIZE];
        id.copy_from_slice(&bytes[5..5 + HASH_SIZE]);
        let stored_len =
            u16::from_le_bytes([bytes[RECORD_HEADER_LEN - 2], bytes[RECORD_HEADER_LEN - 1]])
                as usize;
        let derived_len = kind.effective_payload_len();
        if stored_len != derived_len {
            return Err(EntryDecodeError::LengthMismatch {
                stored: stored_len,
                derived: derived_len,
            });
        }
        let payload = EntryPayload::decode(kind, &bytes[RECORD_HEADER_LEN..])?;
        Ok((
            Self {
                timestamp_ms,
                entry_id: Hash256(id),
                payload,
            },
            RECORD_HEADER_LEN + derived_len,
        ))
    }
}

struct Writer<'a> {
    buf: &'a mut [u8; MAX_PAYLOAD_LEN],
    off: usize,
}

impl Writer<'_> {
    fn bytes(&mut self, src: &[u8]) {
        self.buf[self.off..self.off + src.len()].copy_from_slice(src);
        self.off += src.len();
    }

    fn hash(&mut self, h: &Hash256) {
        self.bytes(h.as_bytes());
    }

    fn state(&mut self, s: &PhysicsState) {
        self.bytes(&s.canonical_bytes());
    }

    fn f32(&mut self, v: f32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u32(&mut self, v: u32) {
        self.bytes(&v.to_le_bytes());
    }

    fn u8(&mut self, v: u8) {
        self.bytes(&[v]);
    }
}

struct Reader<'a> {
    buf: &'a [u8],
    off: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.buf[self.off..self.off + N]);
        self.off += N;
        out
    }

    fn hash(&mut self) -> Hash256 {
        Hash256(self.take::<HASH_SIZE>())
    }

    fn state(&mut self) -> PhysicsState {
        PhysicsState::from_canonical_bytes(&self.take::<PHYSICS_STATE_WIRE_LEN>())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take::<4>())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take::<4>())
    }

    fn u8(&mut self) -> u8 {
        self.take::<1>()[0]
    }

    fn reason(&mut self) -> ReasonCode {
        ReasonCode::from(self.take::<REASON_LEN>())
    }

    fn tx_id(&mut self) -> Result<TxId, EntryDecodeError> {
        TxId::from_bytes(self.take::<TX_ID_LEN>()).ok_or(EntryDecodeError::MalformedTxId)
    }

    fn ailee_status(&mut self) -> Result<AileeStatus, EntryDecodeError> {
        let byte = self.u8();
        AileeStatus::from_u8(byte).ok_or(EntryDecodeError::InvalidStatus(byte))
    }
}
