//! Candidate generation and cost ranking.

use crate::hal::Hal;
use crate::physics::consts::MAX_THRUST_KN;
use crate::physics::{PidGains, PidState};
use crate::types::{ControlInput, Hash256, PhysicsState, Policy, MAX_POLICY_ID_LEN};

/// Target radial climb rate the thrust law steers toward, m/s.
const TARGET_RADIAL_RATE_M_S: f32 = 50.0;

/// Baseline thrust fraction before the control-law trim.
const BASE_THRUST_FRACTION: f32 = 0.8;

/// Gimbal trim applied by the lateral candidates, radians.
const GIMBAL_TRIM_RAD: f32 = 0.05;

/// Propellant flow assumed for candidate simulation, kg/s.
const CANDIDATE_FLOW_KG_S: f32 = 100.0;

/// Derives the control input a policy commands over a horizon.
#[must_use]
pub fn control_input_from_policy(policy: &Policy, duration_ms: u32) -> ControlInput {
    ControlInput {
        thrust_magnitude_kn: policy.thrust_magnitude_kn,
        gimbal_theta_rad: policy.gimbal_theta_rad,
        gimbal_phi_rad: policy.gimbal_phi_rad,
        propellant_flow_kg_s: CANDIDATE_FLOW_KG_S,
        duration_ms,
    }
}

/// Generates and ranks candidate policies.
#[derive(Debug)]
pub struct PolicyEngine {
    thrust_pid: PidState,
    gains: PidGains,
    cycle_counter: u64,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PolicyEngine {
    /// Creates an engine with the default thrust-law gains.
    #[must_use]
    pub fn new() -> Self {
        Self {
            thrust_pid: PidState::default(),
            gains: PidGains {
                kp: 0.004,
                ki: 0.0005,
                kd: 0.0,
                integral_limit: 50.0,
            },
            cycle_counter: 0,
        }
    }

    /// Enumerates this cycle's candidates.
    ///
    /// The baseline thrust is the PID-trimmed climb command; the other
    /// candidates trade thrust or gimbal authority against it. All ids
    /// stay within [`MAX_POLICY_ID_LEN`].
    pub fn generate(
        &mut self,
        hal: &dyn Hal,
        state: &PhysicsState,
        elapsed_ms: u32,
    ) -> Vec<Policy> {
        self.cycle_counter += 1;
        let seq = self.cycle_counter;

        let radial_rate = Self::radial_rate_m_s(state);
        let error = TARGET_RADIAL_RATE_M_S - radial_rate;
        #[allow(clippy::cast_precision_loss)] // cycle periods are small
        let trim = self.thrust_pid.step(error, &self.gains, elapsed_ms as f32);
        let baseline_kn =
            (MAX_THRUST_KN * (BASE_THRUST_FRACTION + trim)).clamp(0.0, MAX_THRUST_KN);

        let specs: [(&str, f32, f32, f32); 4] = [
            ("CLIMB", baseline_kn, 0.0, 0.0),
            ("TRIM", baseline_kn * 0.96, 0.0, 0.0),
            ("GIMP", baseline_kn * 0.98, GIMBAL_TRIM_RAD, 0.0),
            ("GIMN", baseline_kn * 0.98, -GIMBAL_TRIM_RAD, 0.0),
        ];

        specs
            .iter()
            .map(|(suffix, thrust_kn, theta, phi)| {
                self.build_policy(hal, seq, suffix, *thrust_kn, *theta, *phi)
            })
            .collect()
    }

    /// Risk-aware ranking cost; lower is preferred.
    ///
    /// Dominated by the propellant proxy (thrust fraction), with a
    /// penalty for spent gimbal authority.
    #[must_use]
    pub fn cost(thrust_kn: f32, gimbal_theta_rad: f32, gimbal_phi_rad: f32) -> f32 {
        let propellant = thrust_kn / MAX_THRUST_KN;
        let authority = gimbal_theta_rad.abs() + gimbal_phi_rad.abs();
        2.0f32.mul_add(authority, propellant)
    }

    /// Selects the lowest-cost candidate. Candidates with a non-finite
    /// cost never win.
    #[must_use]
    pub fn select_best(candidates: &[Policy]) -> Option<Policy> {
        candidates
            .iter()
            .filter(|p| p.cost.is_finite())
            .min_by(|a, b| a.cost.total_cmp(&b.cost))
            .cloned()
    }

    fn build_policy(
        &self,
        hal: &dyn Hal,
        seq: u64,
        suffix: &str,
        thrust_kn: f32,
        theta: f32,
        phi: f32,
    ) -> Policy {
        let id = format!("POL_{seq:08}_{suffix}");
        debug_assert!(id.len() <= MAX_POLICY_ID_LEN);
        let mut policy = Policy {
            id,
            thrust_magnitude_kn: thrust_kn,
            gimbal_theta_rad: theta,
            gimbal_phi_rad: phi,
            cost: Self::cost(thrust_kn, theta, phi),
            policy_hash: Hash256::null(),
        };
        policy.policy_hash = hal.sha256(&policy.command_bytes());
        policy
    }

    fn radial_rate_m_s(state: &PhysicsState) -> f32 {
        let radius = state.radius_m();
        if radius < 1.0 {
            return 0.0;
        }
        let [px, py, pz] = state.position_m;
        let [vx, vy, vz] = state.velocity_m_s;
        pz.mul_add(vz, px.mul_add(vx, py * vy)) / radius
    }
}
