//! Predictive digital twin.
//!
//! Short-horizon state prediction with a Monte Carlo confidence estimate.
//! The twin holds the latest sensed snapshot, an internal seeded RNG, and
//! an online residual model; everything else it derives per call, so two
//! twins constructed with the same seed and fed the same inputs produce
//! bit-identical predictions. That determinism is what the A/B cross-check
//! and replay tooling lean on.
//!
//! # Confidence model
//!
//! Each of `mc_runs` trajectories starts from a perturbed copy of the
//! snapshot and integrates forward. The scored observable is the drive
//! field excitation at the end state:
//!
//! - `uncertainty = clamp(5 * stdev / MAX_FIELD_AMPLITUDE, 0, 1)`
//! - `confidence = max(0, (1 - uncertainty) * mean_stability
//!   - 0.5 * ese_fraction)`
//! - status is `PredictedExcursion` when more than 20% of trajectories
//!   cross the excursion threshold.

mod residual;

pub use residual::ResidualModel;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::hal::Hal;
use crate::physics::field::MAX_FIELD_AMPLITUDE;
use crate::physics::{nominal_control, DriveFieldModel, PropulsionDynamics};
use crate::types::{ControlInput, Hash256, PhysicsState, PredictionResult, PredictionStatus};

/// Velocity perturbation half-width per axis, meters per second.
const VELOCITY_NOISE_M_S: f32 = 0.05;

/// Mass perturbation half-width, kilograms.
const MASS_NOISE_KG: f32 = 0.5;

/// Fraction of excursion trajectories above which the prediction itself
/// is an excursion.
const ESE_STATUS_FRACTION: f32 = 0.2;

/// The predictive digital twin for one redundancy channel.
#[derive(Debug)]
pub struct DigitalTwin {
    dynamics: PropulsionDynamics,
    field: DriveFieldModel,
    snapshot: PhysicsState,
    residual: ResidualModel,
    rng: StdRng,
}

impl DigitalTwin {
    /// Creates a twin with a seeded RNG and an initial snapshot.
    #[must_use]
    pub fn new(seed: u64, initial: PhysicsState) -> Self {
        Self {
            dynamics: PropulsionDynamics,
            field: DriveFieldModel::default(),
            snapshot: initial,
            residual: ResidualModel::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Replaces the snapshot with the latest sensed state.
    pub fn update_snapshot(&mut self, state: &PhysicsState) {
        self.snapshot = *state;
    }

    /// The latest sensed state.
    #[must_use]
    pub const fn snapshot(&self) -> &PhysicsState {
        &self.snapshot
    }

    /// Baseline guidance input for the current snapshot.
    #[must_use]
    pub fn nominal_control(&self, horizon_ms: u32) -> ControlInput {
        nominal_control(horizon_ms)
    }

    /// Predicts the state at the end of the horizon under `control`.
    ///
    /// The returned end state is the unperturbed trajectory with the
    /// residual correction applied; confidence statistics come from the
    /// perturbed ensemble.
    pub fn predict(
        &mut self,
        hal: &dyn Hal,
        control: &ControlInput,
        horizon_ms: u32,
        mc_runs: u32,
    ) -> PredictionResult {
        let mut effective = *control;
        effective.duration_ms = horizon_ms;

        if !self.snapshot.is_finite() || mc_runs == 0 {
            return self.invalid_result(hal, horizon_ms);
        }

        let mean_end = self.dynamics.predict_state(&self.snapshot, &effective);
        let corrected_end = self.residual.correct(&mean_end);

        let mut excitations = Vec::with_capacity(mc_runs as usize);
        let mut stability_sum = 0.0f32;
        let mut excursions = 0u32;

        for _ in 0..mc_runs {
            let mut perturbed = self.snapshot;
            for v in &mut perturbed.velocity_m_s {
                *v += self.rng.gen_range(-VELOCITY_NOISE_M_S..=VELOCITY_NOISE_M_S);
            }
            perturbed.mass_kg += self.rng.gen_range(-MASS_NOISE_KG..=MASS_NOISE_KG);

            let end = self.dynamics.predict_state(&perturbed, &effective);
            let excitation = self.field.excitation(&end, &effective);
            stability_sum += self.field.stability(&end, excitation);
            if self.field.is_excursion(&end, excitation) {
                excursions += 1;
            }
            excitations.push(excitation);
        }

        #[allow(clippy::cast_precision_loss)] // mc_runs is small
        let runs = mc_runs as f32;
        let mean_excitation = excitations.iter().sum::<f32>() / runs;
        let variance = excitations
            .iter()
            .map(|x| (x - mean_excitation) * (x - mean_excitation))
            .sum::<f32>()
            / runs;
        let stdev = variance.sqrt();

        let uncertainty = (stdev / MAX_FIELD_AMPLITUDE * 5.0).clamp(0.0, 1.0);
        let mean_stability = stability_sum / runs;
        #[allow(clippy::cast_precision_loss)]
        let ese_fraction = excursions as f32 / runs;
        let confidence =
            ((1.0 - uncertainty) * mean_stability - 0.5 * ese_fraction).max(0.0);

        let status = if ese_fraction > ESE_STATUS_FRACTION {
            PredictionStatus::PredictedExcursion
        } else {
            PredictionStatus::Nominal
        };

        let timestamp_ms = self.snapshot.timestamp_ms.wrapping_add(horizon_ms);
        let prediction_id = Self::content_id(hal, status, confidence, &corrected_end);

        PredictionResult {
            status,
            predicted_end_state: corrected_end,
            confidence,
            uncertainty,
            timestamp_ms,
            prediction_id,
        }
    }

    /// Feeds one executed cycle's (simulated, observed) pair into the
    /// residual model.
    pub fn observe(&mut self, simulated: &PhysicsState, observed: &PhysicsState) {
        self.residual.update(simulated, observed);
    }

    /// Read access to the residual model, for introspection.
    #[must_use]
    pub const fn residual(&self) -> &ResidualModel {
        &self.residual
    }

    fn invalid_result(&self, hal: &dyn Hal, horizon_ms: u32) -> PredictionResult {
        let end = self.snapshot;
        PredictionResult {
            status: PredictionStatus::Invalid,
            predicted_end_state: end,
            confidence: 0.0,
            uncertainty: 1.0,
            timestamp_ms: self.snapshot.timestamp_ms.wrapping_add(horizon_ms),
            prediction_id: Self::content_id(hal, PredictionStatus::Invalid, 0.0, &end),
        }
    }

    fn content_id(
        hal: &dyn Hal,
        status: PredictionStatus,
        confidence: f32,
        end_state: &PhysicsState,
    ) -> Hash256 {
        let mut bytes = Vec::with_capacity(1 + 4 + 48);
        bytes.push(match status {
            PredictionStatus::Nominal => 0u8,
            PredictionStatus::PredictedExcursion => 1,
            PredictionStatus::Invalid => 2,
        });
        bytes.extend_from_slice(&confidence.to_le_bytes());
        bytes.extend_from_slice(&end_state.canonical_bytes());
        hal.sha256(&bytes)
    }
}
