//! Online linear residual model.
//!
//! After each executed cycle the twin receives the (simulated, observed)
//! state pair and folds the difference into a per-field bias with an
//! exponential moving average. The correction is additive on later
//! predictions and clamped so a corrupted observation cannot steer the
//! model outside physical bounds.

use crate::physics::consts::MIN_MASS_KG;
use crate::types::PhysicsState;

/// Largest position correction the model may apply, meters.
const MAX_POSITION_CORRECTION_M: f32 = 50.0;

/// Largest velocity correction the model may apply, meters per second.
const MAX_VELOCITY_CORRECTION_M_S: f32 = 5.0;

/// Largest mass correction the model may apply, kilograms.
const MAX_MASS_CORRECTION_KG: f32 = 100.0;

/// Exponentially averaged per-field prediction bias.
#[derive(Debug, Clone, Copy)]
pub struct ResidualModel {
    position_bias_m: [f32; 3],
    velocity_bias_m_s: [f32; 3],
    mass_bias_kg: f32,
    alpha: f32,
    samples: u64,
}

impl Default for ResidualModel {
    fn default() -> Self {
        Self {
            position_bias_m: [0.0; 3],
            velocity_bias_m_s: [0.0; 3],
            mass_bias_kg: 0.0,
            alpha: 0.2,
            samples: 0,
        }
    }
}

impl ResidualModel {
    /// Folds one (simulated, observed) pair into the bias estimate.
    ///
    /// Non-finite observations are discarded.
    pub fn update(&mut self, simulated: &PhysicsState, observed: &PhysicsState) {
        if !simulated.is_finite() || !observed.is_finite() {
            return;
        }
        for axis in 0..3 {
            let pos_err = observed.position_m[axis] - simulated.position_m[axis];
            self.position_bias_m[axis] += self.alpha * (pos_err - self.position_bias_m[axis]);
            let vel_err = observed.velocity_m_s[axis] - simulated.velocity_m_s[axis];
            self.velocity_bias_m_s[axis] += self.alpha * (vel_err - self.velocity_bias_m_s[axis]);
        }
        let mass_err = observed.mass_kg - simulated.mass_kg;
        self.mass_bias_kg += self.alpha * (mass_err - self.mass_bias_kg);
        self.samples += 1;
    }

    /// Applies the clamped additive correction to a predicted state.
    #[must_use]
    pub fn correct(&self, predicted: &PhysicsState) -> PhysicsState {
        let mut corrected = *predicted;
        for axis in 0..3 {
            corrected.position_m[axis] += self.position_bias_m[axis]
                .clamp(-MAX_POSITION_CORRECTION_M, MAX_POSITION_CORRECTION_M);
            corrected.velocity_m_s[axis] += self.velocity_bias_m_s[axis]
                .clamp(-MAX_VELOCITY_CORRECTION_M_S, MAX_VELOCITY_CORRECTION_M_S);
        }
        corrected.mass_kg += self
            .mass_bias_kg
            .clamp(-MAX_MASS_CORRECTION_KG, MAX_MASS_CORRECTION_KG);
        corrected.mass_kg = corrected.mass_kg.max(MIN_MASS_KG);
        corrected
    }

    /// Number of observation pairs folded in so far.
    #[must_use]
    pub const fn samples(&self) -> u64 {
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::consts::R_REF_M;

    fn state() -> PhysicsState {
        PhysicsState {
            position_m: [R_REF_M, 0.0, 0.0],
            velocity_m_s: [0.0, 0.0, 0.0],
            attitude_q: [1.0, 0.0, 0.0, 0.0],
            mass_kg: 250_000.0,
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_fresh_model_is_identity() {
        let model = ResidualModel::default();
        assert_eq!(model.correct(&state()), state());
    }

    #[test]
    fn test_bias_converges_toward_observed_error() {
        let mut model = ResidualModel::default();
        let simulated = state();
        let mut observed = state();
        observed.velocity_m_s[0] = 2.0;

        for _ in 0..50 {
            model.update(&simulated, &observed);
        }
        let corrected = model.correct(&simulated);
        assert!((corrected.velocity_m_s[0] - 2.0).abs() < 0.05);
    }

    #[test]
    fn test_correction_clamped_against_outliers() {
        let mut model = ResidualModel::default();
        let simulated = state();
        let mut observed = state();
        observed.position_m[1] = R_REF_M; // absurd jump

        for _ in 0..100 {
            model.update(&simulated, &observed);
        }
        let corrected = model.correct(&simulated);
        assert!((corrected.position_m[1] - simulated.position_m[1]).abs() <= 50.0 + f32::EPSILON);
    }

    #[test]
    fn test_non_finite_observation_discarded() {
        let mut model = ResidualModel::default();
        let mut observed = state();
        observed.mass_kg = f32::NAN;
        model.update(&state(), &observed);
        assert_eq!(model.samples(), 0);
    }

    #[test]
    fn test_mass_correction_respects_floor() {
        let mut model = ResidualModel::default();
        let mut simulated = state();
        simulated.mass_kg = MIN_MASS_KG + 1.0;
        let mut observed = simulated;
        observed.mass_kg = MIN_MASS_KG - 400.0;

        for _ in 0..100 {
            model.update(&simulated, &observed);
        }
        let corrected = model.correct(&simulated);
        assert!(corrected.mass_kg >= MIN_MASS_KG);
    }
}
