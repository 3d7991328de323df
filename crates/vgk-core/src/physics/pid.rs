//! Generic PID control-law core with anti-windup.

use serde::{Deserialize, Serialize};

/// PID gains and the integral clamp.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: f32,
    /// Integral gain.
    pub ki: f32,
    /// Derivative gain.
    pub kd: f32,
    /// Symmetric clamp applied to the accumulated integral term.
    pub integral_limit: f32,
}

/// Mutable per-loop PID state.
#[derive(Debug, Clone, Copy, Default)]
pub struct PidState {
    /// Accumulated integral term.
    pub integral: f32,
    /// Error from the previous step, for the derivative term.
    pub previous_error: f32,
}

impl PidState {
    /// Advances the controller one step and returns the output.
    ///
    /// A non-positive `elapsed_ms` freezes the integral and derivative
    /// terms; only the proportional term contributes.
    pub fn step(&mut self, error: f32, gains: &PidGains, elapsed_ms: f32) -> f32 {
        let dt_s = if elapsed_ms > 0.0 {
            elapsed_ms / 1_000.0
        } else {
            0.0
        };

        let mut derivative = 0.0;
        if dt_s > 0.0 {
            self.integral = (error.mul_add(dt_s, self.integral))
                .clamp(-gains.integral_limit, gains.integral_limit);
            derivative = (error - self.previous_error) / dt_s;
        }

        let output = gains
            .kd
            .mul_add(derivative, gains.kp.mul_add(error, gains.ki * self.integral));

        self.previous_error = error;
        output
    }

    /// Clears accumulated state.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAINS: PidGains = PidGains {
        kp: 2.0,
        ki: 1.0,
        kd: 0.5,
        integral_limit: 10.0,
    };

    #[test]
    fn test_proportional_only_with_zero_dt() {
        let mut state = PidState::default();
        let out = state.step(3.0, &GAINS, 0.0);
        assert!((out - 6.0).abs() < 1e-6);
        assert_eq!(state.integral, 0.0);
    }

    #[test]
    fn test_integral_anti_windup_clamps() {
        let mut state = PidState::default();
        for _ in 0..1_000 {
            state.step(100.0, &GAINS, 100.0);
        }
        assert!(state.integral <= GAINS.integral_limit);
        assert!(state.integral >= -GAINS.integral_limit);
    }

    #[test]
    fn test_derivative_tracks_error_change() {
        let mut state = PidState::default();
        state.step(1.0, &GAINS, 1_000.0);
        // Error unchanged: derivative contribution is zero.
        let integral_before = state.integral;
        let out = state.step(1.0, &GAINS, 1_000.0);
        let expected = GAINS.kp + GAINS.ki * (integral_before + 1.0);
        assert!((out - expected).abs() < 1e-5, "out = {out}");
    }
}
