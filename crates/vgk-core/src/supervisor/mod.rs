//! Redundant A/B supervisor.
//!
//! Owns two orchestrator channels. One is active; the other is a hot
//! standby kept current through periodic state syncs. The supervisor
//! arbitrates: it drives the active channel's cycle, scores the previous
//! cycle's prediction against the fresh sensor state (feeding the twin's
//! residual model), reacts to the critical conditions the cycle reports,
//! performs failover, and cross-checks A/B predictions for silent
//! divergence.
//!
//! # Failover policy
//!
//! `CriticalRollbackFail`, `CriticalNoRollback`, and
//! `PrimaryChannelLockup` each force a switch: the standby becomes
//! active, receives an immediate state sync, and runs its fallback path
//! with reason "Failover Switch" so the vehicle lands in a known-safe
//! command before the next cycle. If the standby has already failed
//! critically, there is nowhere left to go: the supervisor emits the
//! fatal-halt metric and refuses further cycles.
//!
//! `MismatchedPrediction` is logged as a supervisor exception but does
//! not flip channels on its own.

use std::sync::Arc;

use crate::config::{KernelConfig, SafetyEnvelope};
use crate::hal::Hal;
use crate::orchestrator::{ChannelId, CycleReport, Orchestrator};
use crate::types::{FailureMode, PhysicsState, PredictionResult, SensorFrame};

/// The A/B redundancy supervisor.
pub struct Supervisor {
    hal: Arc<dyn Hal>,
    config: KernelConfig,
    channel_a: Orchestrator,
    channel_b: Orchestrator,
    active: ChannelId,
    channel_failed: [bool; 2],
    halted: bool,
    last_sync_ms: u32,
    last_active_prediction: Option<(ChannelId, PredictionResult)>,
}

impl Supervisor {
    /// Creates both channels and activates channel A.
    ///
    /// The twins get distinct seeds so the A/B cross-check compares
    /// genuinely independent ensembles.
    #[must_use]
    pub fn new(
        hal: Arc<dyn Hal>,
        config: KernelConfig,
        envelope: SafetyEnvelope,
        seed: u64,
        initial_state: PhysicsState,
    ) -> Self {
        let channel_a = Orchestrator::new(
            hal.clone(),
            config.clone(),
            envelope.clone(),
            ChannelId::A,
            seed,
            initial_state,
        );
        let channel_b = Orchestrator::new(
            hal.clone(),
            config.clone(),
            envelope,
            ChannelId::B,
            seed.wrapping_add(1),
            initial_state,
        );
        let now = hal.now_ms();
        hal.metric_emit_tagged("supervisor.active_channel", 0.0, "channel", "A");
        Self {
            hal,
            config,
            channel_a,
            channel_b,
            active: ChannelId::A,
            channel_failed: [false, false],
            halted: false,
            last_sync_ms: now,
            last_active_prediction: None,
        }
    }

    /// Which channel is currently active.
    #[must_use]
    pub const fn active_channel(&self) -> ChannelId {
        self.active
    }

    /// Whether both channels are exhausted.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        self.halted
    }

    /// Borrow a channel's orchestrator, for introspection.
    #[must_use]
    pub const fn channel(&self, id: ChannelId) -> &Orchestrator {
        match id {
            ChannelId::A => &self.channel_a,
            ChannelId::B => &self.channel_b,
        }
    }

    /// Runs one supervised cycle on the active channel.
    ///
    /// Handles any critical condition the cycle reports, then performs
    /// the periodic standby sync and the A/B prediction cross-check.
    /// Returns `None` once the supervisor has halted.
    pub fn run_cycle(&mut self, frame: &SensorFrame) -> Option<CycleReport> {
        if self.halted {
            tracing::error!("supervisor halted, cycle refused");
            return None;
        }

        // Score the previous cycle's prediction against what the sensors
        // now report; the residual model only learns from the channel
        // that actually made the prediction.
        if let Some((channel, prev)) = self.last_active_prediction {
            if channel == self.active {
                self.active_mut()
                    .observe(&prev.predicted_end_state, &frame.physics);
            }
        }

        let report = self.active_mut().run_cycle(frame);
        self.last_active_prediction = self
            .channel(self.active)
            .last_prediction()
            .map(|p| (self.active, *p));

        if let Some(mode) = report.failure {
            self.handle_failure(mode, &frame.physics);
        }

        if !self.halted {
            let now = self.hal.now_ms();
            if now.wrapping_sub(self.last_sync_ms) >= self.config.sync_interval_ms {
                self.sync_standby(&frame.physics);
                self.cross_check(frame);
                self.last_sync_ms = now;
            }
        }

        Some(report)
    }

    /// External failure notification (fault detectors, lockup monitors).
    pub fn notify_failure(&mut self, mode: FailureMode) {
        let state = *self.channel(self.active).current_state();
        self.handle_failure(mode, &state);
    }

    /// Synchronizes the standby channel's state snapshot.
    pub fn sync_standby(&mut self, state: &PhysicsState) {
        self.standby_mut().sync_state(state);
        self.hal.metric_emit("supervisor.sync_complete", 1.0);
    }

    /// Whether two channel predictions diverge beyond the acceptance
    /// bound.
    #[must_use]
    pub fn predictions_mismatch(&self, a: &PredictionResult, b: &PredictionResult) -> bool {
        (a.position_summary_m() - b.position_summary_m()).abs() > self.config.accept_position_dev_m
    }

    /// Controlled shutdown: drain and anchor both channels' ledgers.
    pub fn shutdown(&self) {
        self.channel_a.shutdown_flush();
        self.channel_b.shutdown_flush();
    }

    fn handle_failure(&mut self, mode: FailureMode, state: &PhysicsState) {
        self.log_exception(mode);

        if !matches!(
            mode,
            FailureMode::CriticalRollbackFail
                | FailureMode::CriticalNoRollback
                | FailureMode::PrimaryChannelLockup
        ) {
            return;
        }

        self.channel_failed[channel_index(self.active)] = true;

        if self.channel_failed[channel_index(self.active.other())] {
            self.halted = true;
            self.hal.metric_emit("supervisor.fatal_system_halt", 1.0);
            tracing::error!("both channels exhausted, fatal halt");
            return;
        }

        let from = self.active;
        self.active = self.active.other();
        self.hal
            .metric_emit_tagged("supervisor.failover", 1.0, "from", from.label());
        self.hal.metric_emit_tagged(
            "supervisor.active_channel",
            match self.active {
                ChannelId::A => 0.0,
                ChannelId::B => 1.0,
            },
            "channel",
            self.active.label(),
        );
        tracing::warn!(
            from = from.label(),
            to = self.active.label(),
            reason = mode.reason(),
            "failover"
        );

        // The new active channel gets current state immediately, then
        // executes its fallback so the vehicle is in a safe command
        // before its first full cycle.
        self.active_mut().sync_state(state);
        if let Some(next_failure) = self.active_mut().trigger_fallback("Failover Switch") {
            self.handle_failure(next_failure, state);
        }
    }

    fn cross_check(&mut self, frame: &SensorFrame) {
        let Some((_, active_prediction)) = self.last_active_prediction else {
            return;
        };
        let standby_prediction = self.standby_mut().shadow_predict(frame);

        if self.predictions_mismatch(&active_prediction, &standby_prediction) {
            self.log_exception(FailureMode::MismatchedPrediction);
        }
    }

    fn log_exception(&self, mode: FailureMode) {
        let active = self.channel(self.active);
        active.commit_supervisor_exception(mode.reason());
        // Exceptions are made durable immediately; the failing channel
        // may never reach another Audit drain.
        active.ledger().flush_pending();
        self.hal
            .metric_emit_tagged("supervisor.exception", 1.0, "mode", mode.reason());
    }

    fn active_mut(&mut self) -> &mut Orchestrator {
        match self.active {
            ChannelId::A => &mut self.channel_a,
            ChannelId::B => &mut self.channel_b,
        }
    }

    fn standby_mut(&mut self) -> &mut Orchestrator {
        match self.active {
            ChannelId::A => &mut self.channel_b,
            ChannelId::B => &mut self.channel_a,
        }
    }
}

const fn channel_index(id: ChannelId) -> usize {
    match id {
        ChannelId::A => 0,
        ChannelId::B => 1,
    }
}
