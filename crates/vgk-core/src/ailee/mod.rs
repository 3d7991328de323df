//! Layered policy-validation monitor.
//!
//! Three confidence bands gate execution:
//!
//! - `confidence >= 0.90`: accepted, execute directly;
//! - `0.70 <= confidence < 0.90`: borderline, a lighter secondary
//!   evaluation (the grace pass) decides;
//! - `confidence < 0.70`: rejected outright.
//!
//! Before any banding, the policy is simulated forward and its predicted
//! end state checked against the static safety envelope. An envelope
//! violation forces confidence to zero regardless of what the model
//! believed. The monitor also owns the rollback store: every executed
//! policy is paired with a safe fallback, and a default engine-off plan is
//! seeded at init so failover always has something safe to dispatch.

mod rollback_store;

pub use rollback_store::RollbackStore;

use crate::config::{KernelConfig, SafetyEnvelope};
use crate::hal::Hal;
use crate::physics::{DriveFieldModel, PropulsionDynamics};
use crate::policy::control_input_from_policy;
use crate::twin::DigitalTwin;
use crate::types::{
    AileeStatus, Hash256, PhysicsState, Policy, PredictionResult, RollbackPlan,
};

/// Mass-burn anomaly bound: live mass below this fraction of the
/// reference snapshot while thrusting fails integrity monitoring.
const MASS_ANOMALY_FRACTION: f32 = 0.99;

/// Outcome of the primary layered validation.
#[derive(Debug, Clone)]
pub struct AileeDecision {
    /// Band classification of the policy.
    pub status: AileeStatus,
    /// Confidence at the decision point (zero after an envelope
    /// violation).
    pub confidence: f32,
    /// The prediction the decision was based on.
    pub prediction: PredictionResult,
}

/// Outcome of the secondary grace evaluation.
#[derive(Debug, Clone, Copy)]
pub struct GraceOutcome {
    /// Whether the policy cleared the grace threshold.
    pub pass: bool,
    /// Confidence produced by the secondary evaluator.
    pub confidence: f32,
}

impl GraceOutcome {
    /// The ledger status corresponding to this outcome.
    #[must_use]
    pub const fn status(self) -> AileeStatus {
        if self.pass {
            AileeStatus::GracePass
        } else {
            AileeStatus::GraceFail
        }
    }
}

/// The layered safety monitor for one redundancy channel.
#[derive(Debug)]
pub struct SafetyMonitor {
    envelope: SafetyEnvelope,
    dynamics: PropulsionDynamics,
    field: DriveFieldModel,
    store: RollbackStore,
    accept_confidence: f32,
    borderline_confidence: f32,
    grace_threshold: f32,
    horizon_ms: u32,
}

impl SafetyMonitor {
    /// Creates a monitor and seeds the rollback store with the default
    /// engine-off plan.
    #[must_use]
    pub fn new(hal: &dyn Hal, config: &KernelConfig, envelope: SafetyEnvelope) -> Self {
        let mut monitor = Self {
            envelope,
            dynamics: PropulsionDynamics,
            field: DriveFieldModel::default(),
            store: RollbackStore::new(config.max_rollback_store),
            accept_confidence: config.accept_confidence,
            borderline_confidence: config.borderline_confidence,
            grace_threshold: config.grace_threshold,
            horizon_ms: config.decision_horizon_ms,
        };

        let engine_off = Policy {
            id: "SAFE_FALLBACK".to_string(),
            thrust_magnitude_kn: 0.0,
            gimbal_theta_rad: 0.0,
            gimbal_phi_rad: 0.0,
            cost: 0.0,
            policy_hash: Hash256::null(),
        };
        monitor.commit_rollback(hal, &engine_off, &engine_off);
        monitor
    }

    /// Band classification of a raw confidence value.
    ///
    /// The bands partition all of `[0, 1]`: the accept bound and the
    /// borderline bound are both inclusive on their lower edge.
    #[must_use]
    pub fn classify(&self, confidence: f32) -> AileeStatus {
        if confidence >= self.accept_confidence {
            AileeStatus::Accepted
        } else if confidence >= self.borderline_confidence {
            AileeStatus::Borderline
        } else {
            AileeStatus::OutrightRejected
        }
    }

    /// Primary validation: simulate the policy, check the envelope, band
    /// the confidence.
    pub fn validate(
        &self,
        hal: &dyn Hal,
        twin: &mut DigitalTwin,
        policy: &Policy,
        mc_runs: u32,
    ) -> AileeDecision {
        let control = control_input_from_policy(policy, self.horizon_ms);
        let prediction = twin.predict(hal, &control, self.horizon_ms, mc_runs);

        if let Err(violation) = self.envelope.check(&prediction.predicted_end_state) {
            tracing::warn!(policy = %policy.id, %violation, "policy rejected by envelope");
            hal.metric_emit_tagged("ailee.status", 3.0, "status", "OUTRIGHT_REJECTED");
            self.emit_envelope_metric(hal, &prediction.predicted_end_state);
            return AileeDecision {
                status: AileeStatus::OutrightRejected,
                confidence: 0.0,
                prediction,
            };
        }

        let status = self.classify(prediction.confidence);
        match status {
            AileeStatus::Accepted => {
                hal.metric_emit_tagged("ailee.status", 1.0, "status", "ACCEPTED");
            },
            AileeStatus::Borderline => {
                hal.metric_emit_tagged("ailee.status", 2.0, "status", "BORDERLINE");
            },
            _ => {
                hal.metric_emit_tagged("ailee.status", 3.0, "status", "OUTRIGHT_REJECTED");
            },
        }

        AileeDecision {
            status,
            confidence: prediction.confidence,
            prediction,
        }
    }

    /// Secondary grace evaluation for borderline policies.
    ///
    /// A single deterministic trajectory stands in for the Monte Carlo
    /// ensemble: the grace confidence is the prior spread applied to the
    /// re-simulated end state's stability. The envelope still binds.
    pub fn run_grace(
        &self,
        hal: &dyn Hal,
        state: &PhysicsState,
        policy: &Policy,
        prior: &AileeDecision,
    ) -> GraceOutcome {
        let control = control_input_from_policy(policy, self.horizon_ms);
        let end = self.dynamics.predict_state(state, &control);

        if self.envelope.check(&end).is_err() {
            hal.metric_emit("ailee.grace_fail", 1.0);
            return GraceOutcome {
                pass: false,
                confidence: 0.0,
            };
        }

        let excitation = self.field.excitation(&end, &control);
        let stability = self.field.stability(&end, excitation);
        let confidence = (1.0 - prior.prediction.uncertainty) * stability;
        let pass = confidence >= self.grace_threshold;

        if pass {
            hal.metric_emit("ailee.grace_pass", 1.0);
        } else {
            hal.metric_emit("ailee.grace_fail", 1.0);
        }
        GraceOutcome { pass, confidence }
    }

    /// Live execution-integrity check while a command is active.
    ///
    /// Fails on an implausible state or on a mass burn faster than the
    /// commanded thrust explains.
    #[must_use]
    pub fn monitor_execution(
        &self,
        hal: &dyn Hal,
        current: &PhysicsState,
        reference: &PhysicsState,
        active_thrust_kn: f32,
    ) -> bool {
        if !self.dynamics.is_state_plausible(current) {
            hal.metric_emit("safety.realtime_violation", 1.0);
            return false;
        }
        if active_thrust_kn > 0.0 && current.mass_kg < reference.mass_kg * MASS_ANOMALY_FRACTION {
            hal.metric_emit("safety.mass_anomaly", 1.0);
            return false;
        }
        true
    }

    /// Binds a safe fallback to a policy and stores the plan.
    pub fn commit_rollback(&mut self, hal: &dyn Hal, policy: &Policy, fallback: &Policy) {
        let rollback_hash = hal.sha256(&fallback.command_bytes());
        self.store.push(RollbackPlan {
            policy_id: policy.id.clone(),
            thrust_magnitude_kn: fallback.thrust_magnitude_kn,
            gimbal_theta_rad: fallback.gimbal_theta_rad,
            gimbal_phi_rad: fallback.gimbal_phi_rad,
            rollback_hash,
            valid: true,
        });
    }

    /// The most recent valid rollback plan.
    #[must_use]
    pub fn last_rollback(&self) -> Option<RollbackPlan> {
        self.store.last().cloned()
    }

    fn emit_envelope_metric(&self, hal: &dyn Hal, state: &PhysicsState) {
        if state.mass_kg < self.envelope.min_mass_kg {
            hal.metric_emit("safety.mass_fail", f64::from(state.mass_kg));
        } else {
            hal.metric_emit("safety.trajectory_fail", f64::from(state.radius_m()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::SilHal;
    use crate::physics::consts::{MAX_THRUST_KN, R_REF_M};

    fn pad_state() -> PhysicsState {
        PhysicsState {
            position_m: [R_REF_M, 0.0, 0.0],
            velocity_m_s: [0.0, 0.0, 0.0],
            attitude_q: [1.0, 0.0, 0.0, 0.0],
            mass_kg: 250_000.0,
            timestamp_ms: 0,
        }
    }

    fn monitor(hal: &SilHal) -> SafetyMonitor {
        SafetyMonitor::new(hal, &KernelConfig::default(), SafetyEnvelope::default())
    }

    fn climb_policy(hal: &SilHal) -> Policy {
        let mut p = Policy {
            id: "TEST_CLIMB".to_string(),
            thrust_magnitude_kn: MAX_THRUST_KN * 0.8,
            gimbal_theta_rad: 0.0,
            gimbal_phi_rad: 0.0,
            cost: 1.0,
            policy_hash: Hash256::null(),
        };
        p.policy_hash = hal.sha256(&p.command_bytes());
        p
    }

    #[test]
    fn test_band_boundaries_are_exact() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        assert_eq!(m.classify(0.90), AileeStatus::Accepted);
        assert_eq!(m.classify(0.95), AileeStatus::Accepted);
        assert_eq!(m.classify(0.899_999), AileeStatus::Borderline);
        assert_eq!(m.classify(0.70), AileeStatus::Borderline);
        assert_eq!(m.classify(0.699_999), AileeStatus::OutrightRejected);
        assert_eq!(m.classify(0.0), AileeStatus::OutrightRejected);
        assert_eq!(m.classify(1.0), AileeStatus::Accepted);
    }

    #[test]
    fn test_nominal_policy_accepted() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        let mut twin = DigitalTwin::new(42, pad_state());
        let decision = m.validate(&hal, &mut twin, &climb_policy(&hal), 5);
        assert_eq!(decision.status, AileeStatus::Accepted);
        assert!(decision.confidence >= 0.90);
        assert!((0.0..=1.0).contains(&decision.confidence));
    }

    #[test]
    fn test_envelope_violation_forces_zero_confidence() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        // Below the envelope's 0.95 radius bound but above the twin's 0.9
        // plausibility floor, so the model alone would not object.
        let mut low = pad_state();
        low.position_m = [R_REF_M * 0.92, 0.0, 0.0];
        let mut twin = DigitalTwin::new(42, low);
        let decision = m.validate(&hal, &mut twin, &climb_policy(&hal), 5);
        assert_eq!(decision.status, AileeStatus::OutrightRejected);
        assert_eq!(decision.confidence, 0.0);
        assert!(hal.metric_count("safety.trajectory_fail") > 0);
    }

    #[test]
    fn test_grace_threshold_boundary() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        let mut twin = DigitalTwin::new(42, pad_state());
        let policy = climb_policy(&hal);
        let mut decision = m.validate(&hal, &mut twin, &policy, 5);

        // A stable end state gives grace confidence 1 - uncertainty.
        decision.prediction.uncertainty = 0.25;
        let outcome = m.run_grace(&hal, &pad_state(), &policy, &decision);
        assert!(outcome.pass, "confidence = {}", outcome.confidence);
        assert_eq!(outcome.status(), AileeStatus::GracePass);

        decision.prediction.uncertainty = 0.35;
        let outcome = m.run_grace(&hal, &pad_state(), &policy, &decision);
        assert!(!outcome.pass);
        assert_eq!(outcome.status(), AileeStatus::GraceFail);
    }

    #[test]
    fn test_grace_fails_on_envelope_violation() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        let mut low = pad_state();
        low.position_m = [R_REF_M * 0.92, 0.0, 0.0];
        let mut twin = DigitalTwin::new(42, low);
        let policy = climb_policy(&hal);
        let decision = m.validate(&hal, &mut twin, &policy, 5);
        let outcome = m.run_grace(&hal, &low, &policy, &decision);
        assert!(!outcome.pass);
        assert_eq!(outcome.confidence, 0.0);
    }

    #[test]
    fn test_execution_integrity_mass_anomaly() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        let reference = pad_state();

        let mut nominal_burn = reference;
        nominal_burn.mass_kg = reference.mass_kg * 0.995;
        assert!(m.monitor_execution(&hal, &nominal_burn, &reference, 2_000.0));

        let mut anomalous = reference;
        anomalous.mass_kg = reference.mass_kg * 0.97;
        assert!(!m.monitor_execution(&hal, &anomalous, &reference, 2_000.0));
        // The same burn with engines off is someone else's problem.
        assert!(m.monitor_execution(&hal, &anomalous, &reference, 0.0));
    }

    #[test]
    fn test_rollback_store_seeded_with_engine_off() {
        let hal = SilHal::new(42);
        let m = monitor(&hal);
        let plan = m.last_rollback().expect("seed plan present");
        assert_eq!(plan.thrust_magnitude_kn, 0.0);
        assert!(plan.valid);
        assert!(!plan.rollback_hash.is_null());
    }

    #[test]
    fn test_commit_rollback_binds_fallback_hash() {
        let hal = SilHal::new(42);
        let mut m = monitor(&hal);
        let policy = climb_policy(&hal);
        let fallback = Policy {
            id: "ABORT".to_string(),
            thrust_magnitude_kn: 0.0,
            gimbal_theta_rad: 0.0,
            gimbal_phi_rad: 0.0,
            cost: 0.0,
            policy_hash: Hash256::null(),
        };
        m.commit_rollback(&hal, &policy, &fallback);
        let plan = m.last_rollback().unwrap();
        assert_eq!(plan.policy_id, policy.id);
        assert_eq!(plan.rollback_hash, hal.sha256(&fallback.command_bytes()));
    }
}
