//! Shared kernel data types.
//!
//! Every type here is either carried inside a ledger entry or crosses a
//! component boundary (twin -> policy engine -> safety monitor ->
//! orchestrator), so each one defines a fixed canonical byte layout where it
//! participates in hashing. Canonical encodings are little-endian and
//! hand-rolled: entry ids are recomputed by external auditors and must not
//! depend on a serializer's field ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Size of a content digest in bytes.
pub const HASH_SIZE: usize = 32;

/// Length of an actuator transaction id (lowercase hex characters).
pub const TX_ID_LEN: usize = 24;

/// Maximum length of a policy identifier.
pub const MAX_POLICY_ID_LEN: usize = 31;

/// Canonical encoded size of a [`PhysicsState`] in bytes.
pub const PHYSICS_STATE_WIRE_LEN: usize = 48;

/// A 32-byte content digest.
///
/// The all-zero value is reserved as the null digest and doubles as the
/// "commit was dropped" sentinel on the ledger's non-blocking path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash256(pub [u8; HASH_SIZE]);

impl Hash256 {
    /// Returns the reserved all-zero digest.
    #[must_use]
    pub const fn null() -> Self {
        Self([0u8; HASH_SIZE])
    }

    /// Returns `true` if this is the reserved all-zero digest.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; HASH_SIZE]
    }

    /// Returns the raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl From<[u8; HASH_SIZE]> for Hash256 {
    fn from(bytes: [u8; HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

/// An actuator transaction id: 24 lowercase hex characters.
///
/// Tx ids key the actuator's idempotency fence. Replaying the same id is a
/// no-op success by HAL contract, which is what makes retries inside a
/// cycle safe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TxId([u8; TX_ID_LEN]);

impl TxId {
    /// Builds a tx id from raw bytes, verifying the lowercase-hex alphabet.
    #[must_use]
    pub fn from_bytes(bytes: [u8; TX_ID_LEN]) -> Option<Self> {
        if bytes
            .iter()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(b))
        {
            Some(Self(bytes))
        } else {
            None
        }
    }

    /// Returns the id as raw ASCII bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; TX_ID_LEN] {
        &self.0
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        // Constructed from a validated hex alphabet.
        std::str::from_utf8(&self.0).unwrap_or("")
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sensed physical state of the vehicle for one decision cycle.
///
/// Immutable within a cycle: the orchestrator snapshots it once in the
/// Sense step and every downstream consumer works from that snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsState {
    /// Position relative to the planet center, meters.
    pub position_m: [f32; 3],
    /// Velocity, meters per second.
    pub velocity_m_s: [f32; 3],
    /// Attitude as a unit quaternion (w, x, y, z).
    pub attitude_q: [f32; 4],
    /// Vehicle mass, kilograms.
    pub mass_kg: f32,
    /// Monotonic sample timestamp, milliseconds.
    pub timestamp_ms: u32,
}

impl PhysicsState {
    /// Distance from the planet center, meters.
    #[must_use]
    pub fn radius_m(&self) -> f32 {
        let [x, y, z] = self.position_m;
        z.mul_add(z, x.mul_add(x, y * y)).sqrt()
    }

    /// Speed magnitude, meters per second.
    #[must_use]
    pub fn speed_m_s(&self) -> f32 {
        let [x, y, z] = self.velocity_m_s;
        z.mul_add(z, x.mul_add(x, y * y)).sqrt()
    }

    /// Returns `true` when every field is finite.
    #[must_use]
    pub fn is_finite(&self) -> bool {
        self.position_m.iter().all(|v| v.is_finite())
            && self.velocity_m_s.iter().all(|v| v.is_finite())
            && self.attitude_q.iter().all(|v| v.is_finite())
            && self.mass_kg.is_finite()
    }

    /// Canonical wire encoding: position, velocity, attitude, mass,
    /// timestamp, all little-endian.
    #[must_use]
    pub fn canonical_bytes(&self) -> [u8; PHYSICS_STATE_WIRE_LEN] {
        let mut buf = [0u8; PHYSICS_STATE_WIRE_LEN];
        let mut off = 0;
        for v in self
            .position_m
            .iter()
            .chain(self.velocity_m_s.iter())
            .chain(self.attitude_q.iter())
        {
            buf[off..off + 4].copy_from_slice(&v.to_le_bytes());
            off += 4;
        }
        buf[off..off + 4].copy_from_slice(&self.mass_kg.to_le_bytes());
        off += 4;
        buf[off..off + 4].copy_from_slice(&self.timestamp_ms.to_le_bytes());
        debug_assert_eq!(off + 4, PHYSICS_STATE_WIRE_LEN);
        buf
    }

    /// Decodes the canonical wire encoding.
    #[must_use]
    pub fn from_canonical_bytes(buf: &[u8; PHYSICS_STATE_WIRE_LEN]) -> Self {
        let f = |i: usize| {
            f32::from_le_bytes([buf[i], buf[i + 1], buf[i + 2], buf[i + 3]])
        };
        Self {
            position_m: [f(0), f(4), f(8)],
            velocity_m_s: [f(12), f(16), f(20)],
            attitude_q: [f(24), f(28), f(32), f(36)],
            mass_kg: f(40),
            timestamp_ms: u32::from_le_bytes([buf[44], buf[45], buf[46], buf[47]]),
        }
    }
}

/// A control command applied over a simulation horizon.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControlInput {
    /// Commanded thrust magnitude, kilonewtons. Non-negative.
    pub thrust_magnitude_kn: f32,
    /// Gimbal polar angle, radians.
    pub gimbal_theta_rad: f32,
    /// Gimbal azimuthal angle, radians.
    pub gimbal_phi_rad: f32,
    /// Propellant mass flow, kilograms per second. Non-negative.
    pub propellant_flow_kg_s: f32,
    /// Simulation horizon, milliseconds.
    pub duration_ms: u32,
}

/// Outcome classification of a twin prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PredictionStatus {
    /// Trajectory stays inside the envelope with acceptable spread.
    Nominal,
    /// A significant fraction of sampled trajectories exits the envelope.
    PredictedExcursion,
    /// Inputs were unusable; the prediction carries no information.
    Invalid,
}

/// Result of one short-horizon prediction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictionResult {
    /// Outcome classification.
    pub status: PredictionStatus,
    /// Expected state at the end of the horizon (unperturbed trajectory,
    /// residual-corrected).
    pub predicted_end_state: PhysicsState,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    /// Normalized spread of the Monte Carlo ensemble in `[0, 1]`.
    pub uncertainty: f32,
    /// Timestamp of the predicted end state, milliseconds.
    pub timestamp_ms: u32,
    /// Content digest of the prediction.
    pub prediction_id: Hash256,
}

impl PredictionResult {
    /// Scalar summary of the predicted end position used by the A/B
    /// cross-check: the component sum, so a divergence on any axis shows.
    #[must_use]
    pub fn position_summary_m(&self) -> f32 {
        let [x, y, z] = self.predicted_end_state.position_m;
        x + y + z
    }
}

/// A candidate actuator policy produced by the policy engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    /// Policy identifier, at most [`MAX_POLICY_ID_LEN`] characters.
    pub id: String,
    /// Commanded thrust magnitude, kilonewtons.
    pub thrust_magnitude_kn: f32,
    /// Gimbal polar angle, radians.
    pub gimbal_theta_rad: f32,
    /// Gimbal azimuthal angle, radians.
    pub gimbal_phi_rad: f32,
    /// Ranking cost; lower is preferred.
    pub cost: f32,
    /// Content digest of the command tuple.
    pub policy_hash: Hash256,
}

impl Policy {
    /// Canonical bytes of the command tuple, hashed into `policy_hash`.
    #[must_use]
    pub fn command_bytes(&self) -> [u8; 12] {
        let mut buf = [0u8; 12];
        buf[0..4].copy_from_slice(&self.thrust_magnitude_kn.to_le_bytes());
        buf[4..8].copy_from_slice(&self.gimbal_theta_rad.to_le_bytes());
        buf[8..12].copy_from_slice(&self.gimbal_phi_rad.to_le_bytes());
        buf
    }
}

/// A pre-approved safe fallback command bound to a parent policy.
#[derive(Debug, Clone, PartialEq)]
pub struct RollbackPlan {
    /// Id of the policy this plan covers.
    pub policy_id: String,
    /// Fallback thrust magnitude, kilonewtons.
    pub thrust_magnitude_kn: f32,
    /// Fallback gimbal polar angle, radians.
    pub gimbal_theta_rad: f32,
    /// Fallback gimbal azimuthal angle, radians.
    pub gimbal_phi_rad: f32,
    /// Content digest of the fallback command tuple.
    pub rollback_hash: Hash256,
    /// Whether the plan may be executed.
    pub valid: bool,
}

/// Validation verdict of the layered safety monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum AileeStatus {
    /// No decision taken yet.
    Undefined = 0,
    /// Confidence at or above the accept band; execute directly.
    Accepted = 1,
    /// Confidence in the grace band; a secondary evaluation decides.
    Borderline = 2,
    /// Confidence below the grace band; never executed.
    OutrightRejected = 3,
    /// Secondary evaluation passed.
    GracePass = 4,
    /// Secondary evaluation failed.
    GraceFail = 5,
    /// Consensus layer approved.
    ConsensusPass = 6,
    /// Consensus layer rejected.
    ConsensusFail = 7,
}

impl AileeStatus {
    /// Wire byte used in ledger payloads.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Decodes the wire byte.
    #[must_use]
    pub const fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Undefined),
            1 => Some(Self::Accepted),
            2 => Some(Self::Borderline),
            3 => Some(Self::OutrightRejected),
            4 => Some(Self::GracePass),
            5 => Some(Self::GraceFail),
            6 => Some(Self::ConsensusPass),
            7 => Some(Self::ConsensusFail),
            _ => None,
        }
    }

    /// Returns `true` for the statuses that allow command execution.
    #[must_use]
    pub const fn permits_execution(self) -> bool {
        matches!(self, Self::Accepted | Self::GracePass | Self::ConsensusPass)
    }
}

/// Sensor tuple consumed by the deterministic safety monitor.
///
/// Sampled on a channel independent of the main state estimator; the
/// monitor trusts nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DsmSensorInputs {
    /// Measured proper-time dilation factor.
    pub time_dilation: f64,
    /// Oscillatory modulation prefactor A(t).
    pub oscillatory_prefactor: f64,
    /// Tri-cell coupling observable J.
    pub coupling_j: f64,
    /// Current resonance amplitude.
    pub resonance_amplitude: f64,
    /// Health flag reported by the main control system.
    pub main_controller_healthy: bool,
}

impl DsmSensorInputs {
    /// A quiescent, healthy sensor frame.
    #[must_use]
    pub const fn quiescent() -> Self {
        Self {
            time_dilation: 1.0,
            oscillatory_prefactor: 1.0,
            coupling_j: 0.0,
            resonance_amplitude: 0.0,
            main_controller_healthy: true,
        }
    }
}

/// One cycle's worth of sensed inputs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorFrame {
    /// Main state estimate.
    pub physics: PhysicsState,
    /// Independent safety-monitor channel.
    pub dsm: DsmSensorInputs,
}

impl SensorFrame {
    /// Wraps a physics state with a quiescent safety-sensor tuple.
    #[must_use]
    pub const fn from_state(physics: PhysicsState) -> Self {
        Self {
            physics,
            dsm: DsmSensorInputs::quiescent(),
        }
    }
}

/// Redundancy failure classifications reported to the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// The active channel's rollback dispatch failed.
    CriticalRollbackFail,
    /// The active channel had no rollback plan to execute.
    CriticalNoRollback,
    /// The active channel stopped making progress.
    PrimaryChannelLockup,
    /// A/B predictions diverged beyond the acceptance bound.
    MismatchedPrediction,
}

impl FailureMode {
    /// Short reason string recorded in supervisor-exception entries.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::CriticalRollbackFail => "CRITICAL_ROLLBACK_FAIL",
            Self::CriticalNoRollback => "CRITICAL_NO_ROLLBACK",
            Self::PrimaryChannelLockup => "PRIMARY_CHANNEL_LOCKUP",
            Self::MismatchedPrediction => "MISMATCHED_PREDICTION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_null_roundtrip() {
        assert!(Hash256::null().is_null());
        assert!(!Hash256::from([1u8; 32]).is_null());
        assert_eq!(Hash256::null().to_string(), "0".repeat(64));
    }

    #[test]
    fn test_tx_id_rejects_uppercase() {
        let mut bytes = [b'a'; TX_ID_LEN];
        assert!(TxId::from_bytes(bytes).is_some());
        bytes[3] = b'F';
        assert!(TxId::from_bytes(bytes).is_none());
        bytes[3] = b'g';
        assert!(TxId::from_bytes(bytes).is_none());
    }

    #[test]
    fn test_physics_state_canonical_roundtrip() {
        let state = PhysicsState {
            position_m: [6_371_000.0, -12.5, 3.25],
            velocity_m_s: [1.0, 2.0, -3.0],
            attitude_q: [1.0, 0.0, 0.0, 0.0],
            mass_kg: 250_000.0,
            timestamp_ms: 12_345,
        };
        let bytes = state.canonical_bytes();
        assert_eq!(PhysicsState::from_canonical_bytes(&bytes), state);
    }

    #[test]
    fn test_ailee_status_wire_roundtrip() {
        for byte in 0..=7u8 {
            let status = AileeStatus::from_u8(byte).unwrap();
            assert_eq!(status.as_u8(), byte);
        }
        assert!(AileeStatus::from_u8(8).is_none());
    }

    #[test]
    fn test_execution_permitting_statuses() {
        assert!(AileeStatus::Accepted.permits_execution());
        assert!(AileeStatus::GracePass.permits_execution());
        assert!(AileeStatus::ConsensusPass.permits_execution());
        assert!(!AileeStatus::Borderline.permits_execution());
        assert!(!AileeStatus::OutrightRejected.permits_execution());
        assert!(!AileeStatus::GraceFail.permits_execution());
    }
}
