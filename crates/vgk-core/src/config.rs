//! Kernel configuration and the static safety envelope.
//!
//! All limits are serde-loadable with defaults equal to the flight
//! constants, so a SIL run can tighten or relax individual bounds without
//! recompiling. The envelope check reports *which* bound failed; the
//! layered monitor logs that and collapses it to a zero-confidence verdict.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::physics::consts::{MAX_VELOCITY_M_S, MIN_MASS_KG, R_REF_M};
use crate::types::PhysicsState;

/// Decision-cycle and ledger limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KernelConfig {
    /// Prediction horizon for one decision cycle, milliseconds.
    #[serde(default = "default_decision_horizon_ms")]
    pub decision_horizon_ms: u32,

    /// Wall-time budget for one cycle, milliseconds. Actuator dispatch
    /// gets half of this, rollback dispatch a quarter.
    #[serde(default = "default_watchdog_ms")]
    pub watchdog_ms: u32,

    /// Capacity of the ledger's bounded commit queue.
    #[serde(default = "default_ledger_queue_size")]
    pub ledger_queue_size: usize,

    /// Number of entry ids batched into one Merkle anchor.
    #[serde(default = "default_merkle_batch_size")]
    pub merkle_batch_size: usize,

    /// Capacity of the rollback-plan ring.
    #[serde(default = "default_max_rollback_store")]
    pub max_rollback_store: usize,

    /// Confidence at or above which a policy is accepted outright.
    #[serde(default = "default_accept_confidence")]
    pub accept_confidence: f32,

    /// Confidence at or above which a policy enters the grace band.
    #[serde(default = "default_borderline_confidence")]
    pub borderline_confidence: f32,

    /// Threshold the secondary grace evaluation must reach.
    #[serde(default = "default_grace_threshold")]
    pub grace_threshold: f32,

    /// A/B predicted-position divergence bound, meters.
    #[serde(default = "default_accept_position_dev_m")]
    pub accept_position_dev_m: f32,

    /// Interval between standby-channel state syncs, milliseconds.
    #[serde(default = "default_sync_interval_ms")]
    pub sync_interval_ms: u32,

    /// Monte Carlo trajectories per prediction.
    #[serde(default = "default_mc_runs")]
    pub mc_runs: u32,
}

const fn default_decision_horizon_ms() -> u32 {
    300
}

const fn default_watchdog_ms() -> u32 {
    120
}

const fn default_ledger_queue_size() -> usize {
    128
}

const fn default_merkle_batch_size() -> usize {
    32
}

const fn default_max_rollback_store() -> usize {
    16
}

const fn default_accept_confidence() -> f32 {
    0.90
}

const fn default_borderline_confidence() -> f32 {
    0.70
}

const fn default_grace_threshold() -> f32 {
    0.72
}

const fn default_accept_position_dev_m() -> f32 {
    500.0
}

const fn default_sync_interval_ms() -> u32 {
    1000
}

const fn default_mc_runs() -> u32 {
    5
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            decision_horizon_ms: default_decision_horizon_ms(),
            watchdog_ms: default_watchdog_ms(),
            ledger_queue_size: default_ledger_queue_size(),
            merkle_batch_size: default_merkle_batch_size(),
            max_rollback_store: default_max_rollback_store(),
            accept_confidence: default_accept_confidence(),
            borderline_confidence: default_borderline_confidence(),
            grace_threshold: default_grace_threshold(),
            accept_position_dev_m: default_accept_position_dev_m(),
            sync_interval_ms: default_sync_interval_ms(),
            mc_runs: default_mc_runs(),
        }
    }
}

/// A bound of the safety envelope that a predicted state violated.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum EnvelopeViolation {
    /// Mass fell below the structural minimum.
    #[error("mass {mass_kg} kg below structural minimum {min_kg} kg")]
    Mass {
        /// Observed mass.
        mass_kg: f32,
        /// Structural minimum.
        min_kg: f32,
    },

    /// Trajectory dipped below the minimum safe radius.
    #[error("radius {radius_m} m below minimum safe radius {min_m} m")]
    Radius {
        /// Observed radius from the planet center.
        radius_m: f32,
        /// Minimum safe radius.
        min_m: f32,
    },

    /// A velocity component exceeded the per-axis bound.
    #[error("velocity component {component} of {value_m_s} m/s exceeds {max_m_s} m/s")]
    Velocity {
        /// Axis index (0 = x, 1 = y, 2 = z).
        component: usize,
        /// Observed component magnitude.
        value_m_s: f32,
        /// Per-axis bound.
        max_m_s: f32,
    },

    /// A field was non-finite.
    #[error("state contains a non-finite field")]
    NonFinite,
}

/// Static hard bounds a predicted end state must satisfy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyEnvelope {
    /// Structural mass minimum, kilograms.
    #[serde(default = "default_min_mass_kg")]
    pub min_mass_kg: f32,

    /// Minimum safe radius as a fraction of the reference radius.
    #[serde(default = "default_min_radius_ratio")]
    pub min_radius_ratio: f32,

    /// Per-axis velocity magnitude bound, meters per second.
    #[serde(default = "default_max_axis_velocity_m_s")]
    pub max_axis_velocity_m_s: f32,
}

const fn default_min_mass_kg() -> f32 {
    MIN_MASS_KG
}

const fn default_min_radius_ratio() -> f32 {
    0.95
}

const fn default_max_axis_velocity_m_s() -> f32 {
    MAX_VELOCITY_M_S
}

impl Default for SafetyEnvelope {
    fn default() -> Self {
        Self {
            min_mass_kg: default_min_mass_kg(),
            min_radius_ratio: default_min_radius_ratio(),
            max_axis_velocity_m_s: default_max_axis_velocity_m_s(),
        }
    }
}

impl SafetyEnvelope {
    /// Minimum safe radius in meters.
    #[must_use]
    pub fn min_radius_m(&self) -> f32 {
        self.min_radius_ratio * R_REF_M
    }

    /// Checks a state against every bound, reporting the first violation.
    ///
    /// The radius bound is inclusive: a trajectory ending exactly at the
    /// minimum safe radius passes.
    ///
    /// # Errors
    ///
    /// Returns the first violated bound.
    pub fn check(&self, state: &PhysicsState) -> Result<(), EnvelopeViolation> {
        if !state.is_finite() {
            return Err(EnvelopeViolation::NonFinite);
        }
        if state.mass_kg < self.min_mass_kg {
            return Err(EnvelopeViolation::Mass {
                mass_kg: state.mass_kg,
                min_kg: self.min_mass_kg,
            });
        }
        let radius = state.radius_m();
        if radius < self.min_radius_m() {
            return Err(EnvelopeViolation::Radius {
                radius_m: radius,
                min_m: self.min_radius_m(),
            });
        }
        for (component, v) in state.velocity_m_s.iter().enumerate() {
            if v.abs() > self.max_axis_velocity_m_s {
                return Err(EnvelopeViolation::Velocity {
                    component,
                    value_m_s: *v,
                    max_m_s: self.max_axis_velocity_m_s,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_at_radius(radius_m: f32) -> PhysicsState {
        PhysicsState {
            position_m: [radius_m, 0.0, 0.0],
            velocity_m_s: [0.0, 0.0, 0.0],
            attitude_q: [1.0, 0.0, 0.0, 0.0],
            mass_kg: 250_000.0,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_defaults_match_flight_constants() {
        let cfg = KernelConfig::default();
        assert_eq!(cfg.decision_horizon_ms, 300);
        assert_eq!(cfg.watchdog_ms, 120);
        assert_eq!(cfg.ledger_queue_size, 128);
        assert_eq!(cfg.merkle_batch_size, 32);
        assert_eq!(cfg.max_rollback_store, 16);
        assert!((cfg.accept_confidence - 0.90).abs() < f32::EPSILON);
        assert!((cfg.borderline_confidence - 0.70).abs() < f32::EPSILON);
        assert!((cfg.grace_threshold - 0.72).abs() < f32::EPSILON);
    }

    #[test]
    fn test_envelope_radius_boundary_inclusive() {
        let envelope = SafetyEnvelope::default();
        let at_boundary = state_at_radius(envelope.min_radius_m());
        assert!(envelope.check(&at_boundary).is_ok());

        let below = state_at_radius(envelope.min_radius_m() - 1_000.0);
        assert!(matches!(
            envelope.check(&below),
            Err(EnvelopeViolation::Radius { .. })
        ));
    }

    #[test]
    fn test_envelope_mass_and_velocity_bounds() {
        let envelope = SafetyEnvelope::default();

        let mut starved = state_at_radius(R_REF_M);
        starved.mass_kg = envelope.min_mass_kg - 1.0;
        assert!(matches!(
            envelope.check(&starved),
            Err(EnvelopeViolation::Mass { .. })
        ));

        let mut fast = state_at_radius(R_REF_M);
        fast.velocity_m_s[1] = -(envelope.max_axis_velocity_m_s + 1.0);
        assert!(matches!(
            envelope.check(&fast),
            Err(EnvelopeViolation::Velocity { component: 1, .. })
        ));
    }

    #[test]
    fn test_envelope_rejects_non_finite() {
        let envelope = SafetyEnvelope::default();
        let mut bad = state_at_radius(R_REF_M);
        bad.position_m[2] = f32::NAN;
        assert_eq!(envelope.check(&bad), Err(EnvelopeViolation::NonFinite));
    }

    #[test]
    fn test_config_deserializes_with_partial_fields() {
        let cfg: KernelConfig = serde_json::from_str(r#"{"watchdog_ms": 80}"#).unwrap();
        assert_eq!(cfg.watchdog_ms, 80);
        assert_eq!(cfg.decision_horizon_ms, 300);
    }
}
