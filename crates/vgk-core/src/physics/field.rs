//! Drive-field observable model.
//!
//! The Monte Carlo estimator does not score raw trajectories; it scores a
//! scalar field excitation derived from each trajectory's end state. This
//! module holds that mapping. The excitation is a unitless amplitude in
//! `[0, MAX_FIELD_AMPLITUDE]` driven by commanded thrust fraction and
//! achieved speed; the stability factor degrades as the excitation
//! approaches its ceiling and collapses for implausible states.

use crate::physics::consts::{MAX_THRUST_KN, MAX_VELOCITY_M_S};
use crate::physics::PropulsionDynamics;
use crate::types::{ControlInput, PhysicsState};

/// Ceiling of the field excitation scale.
pub const MAX_FIELD_AMPLITUDE: f32 = 10.0;

/// Fraction of the ceiling at which a trajectory counts as an excursion.
pub const EXCURSION_FRACTION: f32 = 0.95;

/// Maps trajectory end states to the field excitation observable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DriveFieldModel {
    dynamics: PropulsionDynamics,
}

impl DriveFieldModel {
    /// Field excitation at a trajectory end state under a control input.
    ///
    /// Half the scale comes from the commanded thrust fraction, a quarter
    /// from the achieved speed fraction; the result saturates at the
    /// ceiling.
    #[must_use]
    pub fn excitation(&self, state: &PhysicsState, control: &ControlInput) -> f32 {
        let thrust_fraction = (control.thrust_magnitude_kn / MAX_THRUST_KN).clamp(0.0, 1.0);
        let speed_fraction = (state.speed_m_s() / MAX_VELOCITY_M_S).clamp(0.0, 1.0);
        let drive = 0.25f32.mul_add(speed_fraction, 0.5 * thrust_fraction);
        MAX_FIELD_AMPLITUDE * drive.clamp(0.0, 1.0)
    }

    /// Stability factor of a trajectory end state in `[0, 1]`.
    ///
    /// Unity while the excitation stays below 80% of the ceiling, ramping
    /// linearly to zero at the ceiling. Implausible states are unstable by
    /// definition.
    #[must_use]
    pub fn stability(&self, state: &PhysicsState, excitation: f32) -> f32 {
        if !self.dynamics.is_state_plausible(state) {
            return 0.0;
        }
        let fraction = excitation / MAX_FIELD_AMPLITUDE;
        (1.0 - (fraction - 0.8).clamp(0.0, 0.2) * 5.0).clamp(0.0, 1.0)
    }

    /// Whether an end state counts as a safety excursion.
    ///
    /// Either the excitation crossed the excursion threshold or the
    /// trajectory left the plausible region entirely.
    #[must_use]
    pub fn is_excursion(&self, state: &PhysicsState, excitation: f32) -> bool {
        excitation >= EXCURSION_FRACTION * MAX_FIELD_AMPLITUDE
            || !self.dynamics.is_state_plausible(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::consts::R_REF_M;

    fn pad_state() -> PhysicsState {
        PhysicsState {
            position_m: [R_REF_M, 0.0, 0.0],
            velocity_m_s: [0.0, 0.0, 0.0],
            attitude_q: [1.0, 0.0, 0.0, 0.0],
            mass_kg: 250_000.0,
            timestamp_ms: 0,
        }
    }

    fn full_thrust() -> ControlInput {
        ControlInput {
            thrust_magnitude_kn: MAX_THRUST_KN,
            gimbal_theta_rad: 0.0,
            gimbal_phi_rad: 0.0,
            propellant_flow_kg_s: 100.0,
            duration_ms: 300,
        }
    }

    #[test]
    fn test_full_thrust_at_rest_is_half_scale() {
        let model = DriveFieldModel::default();
        let psi = model.excitation(&pad_state(), &full_thrust());
        assert!((psi - 0.5 * MAX_FIELD_AMPLITUDE).abs() < 1e-4);
        assert!(!model.is_excursion(&pad_state(), psi));
    }

    #[test]
    fn test_stability_ramps_down_near_ceiling() {
        let model = DriveFieldModel::default();
        let state = pad_state();
        assert!((model.stability(&state, 0.5 * MAX_FIELD_AMPLITUDE) - 1.0).abs() < 1e-6);
        assert!((model.stability(&state, 0.9 * MAX_FIELD_AMPLITUDE) - 0.5).abs() < 1e-5);
        assert!(model.stability(&state, MAX_FIELD_AMPLITUDE) < 1e-6);
    }

    #[test]
    fn test_implausible_state_is_excursion() {
        let model = DriveFieldModel::default();
        let mut sunk = pad_state();
        sunk.position_m = [R_REF_M * 0.8, 0.0, 0.0];
        assert_eq!(model.stability(&sunk, 0.0), 0.0);
        assert!(model.is_excursion(&sunk, 0.0));
    }

    #[test]
    fn test_excursion_threshold() {
        let model = DriveFieldModel::default();
        let state = pad_state();
        assert!(model.is_excursion(&state, EXCURSION_FRACTION * MAX_FIELD_AMPLITUDE));
        assert!(!model.is_excursion(&state, EXCURSION_FRACTION * MAX_FIELD_AMPLITUDE - 0.01));
    }
}
