//! Deterministic safety monitor.
//!
//! Hard-physics, last-line-of-defense gate, independent of the twin, the
//! policy engine, and the ledger. It consumes its own sensor tuple, keeps
//! a single safing latch, and answers one question per cycle: do nothing,
//! roll back, or shut down. Its verdict is advisory to the orchestrator
//! and overrides the layered monitor when it says anything but `None`.
//!
//! Decision order, first match wins:
//!
//! 1. any non-finite input: full shutdown;
//! 2. estimated curvature at or above the absolute limit (equivalently a
//!    dilation above one): full shutdown;
//! 3. A(t) below the stability window or coupling J above its limit:
//!    rollback;
//! 4. main controller unhealthy while resonance amplitude is above the
//!    cutoff: rollback;
//! 5. active safing with curvature back under half the limit: the latch
//!    clears, no action;
//! 6. otherwise no action.

use crate::types::DsmSensorInputs;

/// Absolute curvature limit.
pub const MAX_CURVATURE_THRESHOLD: f64 = 1.0e-12;

/// Curvature estimator prefactor.
pub const CURVATURE_FACTOR: f64 = 1.0e-10;

/// Lower bound of the oscillatory stability window.
pub const MIN_ACCEPTABLE_A_T: f64 = 0.80;

/// Upper bound on the tri-cell coupling observable.
pub const MAX_COUPLING_J: f64 = 1.0e4;

/// Resonance amplitude above which an unhealthy controller forces
/// rollback.
pub const RESONANCE_AMPLITUDE_CUTOFF: f64 = 0.10;

/// Action demanded by the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SafingAction {
    /// No action required.
    None,
    /// Execute the rollback plan.
    Rollback,
    /// Full shutdown, irrespective of everything else.
    FullShutdown,
}

/// The deterministic safety monitor.
#[derive(Debug, Default)]
pub struct DeterministicSafetyMonitor {
    safing_active: bool,
    last_estimated_curvature: f64,
}

impl DeterministicSafetyMonitor {
    /// Creates a monitor with the safing latch clear.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the safing latch is currently set.
    #[must_use]
    pub const fn safing_active(&self) -> bool {
        self.safing_active
    }

    /// Curvature estimated from the last evaluation.
    #[must_use]
    pub const fn last_estimated_curvature(&self) -> f64 {
        self.last_estimated_curvature
    }

    /// Evaluates one sensor frame.
    pub fn evaluate(&mut self, inputs: &DsmSensorInputs) -> SafingAction {
        if Self::has_invalid_inputs(inputs) {
            self.safing_active = true;
            tracing::error!("non-finite safety sensor input, full shutdown");
            return SafingAction::FullShutdown;
        }

        let curvature = Self::estimate_curvature(inputs.time_dilation);
        self.last_estimated_curvature = curvature;

        if curvature >= MAX_CURVATURE_THRESHOLD {
            self.safing_active = true;
            tracing::error!(curvature, "absolute curvature violation, full shutdown");
            return SafingAction::FullShutdown;
        }

        if inputs.oscillatory_prefactor < MIN_ACCEPTABLE_A_T {
            self.safing_active = true;
            tracing::warn!(
                a_t = inputs.oscillatory_prefactor,
                "oscillatory prefactor unstable, rollback"
            );
            return SafingAction::Rollback;
        }
        if inputs.coupling_j > MAX_COUPLING_J {
            self.safing_active = true;
            tracing::warn!(j = inputs.coupling_j, "coupling limit exceeded, rollback");
            return SafingAction::Rollback;
        }

        if !inputs.main_controller_healthy
            && inputs.resonance_amplitude > RESONANCE_AMPLITUDE_CUTOFF
        {
            self.safing_active = true;
            tracing::warn!(
                amplitude = inputs.resonance_amplitude,
                "controller unhealthy with live resonance, rollback"
            );
            return SafingAction::Rollback;
        }

        if self.safing_active && curvature < MAX_CURVATURE_THRESHOLD * 0.5 {
            self.safing_active = false;
            tracing::info!("safety margins restored, safing cleared");
        }

        SafingAction::None
    }

    /// Curvature estimate `K * (1 - dilation)^2`; a dilation above one has
    /// no real solution and maps to infinity.
    fn estimate_curvature(dilation: f64) -> f64 {
        let time_stretch = 1.0 - dilation;
        if time_stretch < 0.0 {
            return f64::INFINITY;
        }
        CURVATURE_FACTOR * time_stretch * time_stretch
    }

    fn has_invalid_inputs(inputs: &DsmSensorInputs) -> bool {
        !inputs.time_dilation.is_finite()
            || !inputs.oscillatory_prefactor.is_finite()
            || !inputs.coupling_j.is_finite()
            || !inputs.resonance_amplitude.is_finite()
    }
}
