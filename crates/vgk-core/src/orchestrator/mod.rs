//! Cycle orchestrator.
//!
//! Drives one decision cycle through an explicit state machine
//! (`Sense -> Predict -> Plan -> Validate -> Execute -> Audit`, with
//! every failure edge landing in `Fallback`) so the failure paths are
//! enumerated states, not implicit control flow.
//!
//! # Ledger ordering
//!
//! Within a cycle, commits happen in narrative order and that order is
//! observable: `StateSnapshot`, `PredictionCommit`, optional `EseAlert`,
//! `PolicyPreflight`, optional `AileeGraceResult`, `AileeSafetyStatus`,
//! `CommandPending`, then `CommandCommit` (followed immediately by the
//! `RollbackMetadata` that covers the executed policy) or
//! `ExecutionFailure`. The Audit step drains the ledger.
//!
//! # Budget
//!
//! The whole cycle is budgeted: wall time beyond the watchdog commits a
//! `GovernanceBudgetViolation`. The cycle's decisions still stand; the
//! overrun is recorded, never aborted. Actuator dispatch gets half the
//! watchdog, rollback dispatch a quarter.
//!
//! # Failure notification
//!
//! The orchestrator never calls back into the supervisor; critical
//! conditions (`CriticalNoRollback`, `CriticalRollbackFail`) travel in the
//! returned [`CycleReport`] and the supervisor, which owns both
//! channels, acts on them at the boundary.

use std::sync::Arc;

use crate::ailee::SafetyMonitor;
use crate::config::{KernelConfig, SafetyEnvelope};
use crate::dsm::{DeterministicSafetyMonitor, SafingAction};
use crate::hal::Hal;
use crate::ledger::{CommandExecution, EntryPayload, Ledger, ReasonCode};
use crate::physics::PropulsionDynamics;
use crate::policy::PolicyEngine;
use crate::rollback::execute_rollback;
use crate::twin::DigitalTwin;
use crate::types::{
    AileeStatus, FailureMode, Hash256, PhysicsState, Policy, PredictionResult, PredictionStatus,
    SensorFrame, MAX_POLICY_ID_LEN,
};

/// Flash partition size reserved per redundancy channel.
pub const FLASH_PARTITION_SIZE: u32 = 0x0010_0000;

/// Redundancy channel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    /// Channel A.
    A,
    /// Channel B.
    B,
}

impl ChannelId {
    /// Display label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }

    /// Base address of this channel's ledger partition.
    #[must_use]
    pub const fn flash_base(self) -> u32 {
        match self {
            Self::A => 0,
            Self::B => FLASH_PARTITION_SIZE,
        }
    }

    /// The other channel.
    #[must_use]
    pub const fn other(self) -> Self {
        match self {
            Self::A => Self::B,
            Self::B => Self::A,
        }
    }
}

/// Named states of the per-cycle machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStep {
    /// Snapshot sensors, gate plausibility, consult the DSM, check
    /// execution integrity.
    Sense,
    /// Twin prediction under the nominal control.
    Predict,
    /// Candidate enumeration and selection.
    Plan,
    /// Layered validation of the chosen policy.
    Validate,
    /// Transactional actuator dispatch.
    Execute,
    /// Ledger drain and budget accounting.
    Audit,
    /// Safe-command recovery path.
    Fallback,
}

/// Summary of one cycle, returned to the supervisor.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Step at which the decision flow ended (`Audit` on the happy path,
    /// `Fallback` otherwise).
    pub terminal_step: CycleStep,
    /// Final validation verdict, when one was reached.
    pub ailee_status: Option<AileeStatus>,
    /// Whether a policy command was committed this cycle.
    pub executed: bool,
    /// Whether a rollback command was committed this cycle.
    pub rolled_back: bool,
    /// Reason the fallback path was entered, if it was.
    pub fallback_reason: Option<String>,
    /// Critical condition for the supervisor, if one arose.
    pub failure: Option<FailureMode>,
    /// Whether the cycle overran its budget.
    pub budget_violation: bool,
    /// Observed cycle wall time, milliseconds.
    pub elapsed_ms: u32,
    /// Entries made durable by the Audit drain.
    pub flushed_entries: usize,
}

impl CycleReport {
    fn new() -> Self {
        Self {
            terminal_step: CycleStep::Sense,
            ailee_status: None,
            executed: false,
            rolled_back: false,
            fallback_reason: None,
            failure: None,
            budget_violation: false,
            elapsed_ms: 0,
            flushed_entries: 0,
        }
    }
}

/// Per-cycle working set threaded through the state machine.
struct CycleContext {
    start_ms: u32,
    state: PhysicsState,
    snapshot_id: Hash256,
    prediction: Option<PredictionResult>,
    policy: Option<Policy>,
}

/// The decision-cycle engine for one redundancy channel.
pub struct Orchestrator {
    hal: Arc<dyn Hal>,
    config: KernelConfig,
    channel: ChannelId,
    ledger: Ledger,
    twin: DigitalTwin,
    policy_engine: PolicyEngine,
    safety: SafetyMonitor,
    dsm: DeterministicSafetyMonitor,
    dynamics: PropulsionDynamics,
    is_thrusting: bool,
    active_thrust_kn: f32,
    execution_reference: Option<PhysicsState>,
    last_prediction: Option<PredictionResult>,
    last_cycle_start_ms: Option<u32>,
}

impl Orchestrator {
    /// Creates a channel's orchestrator with its own ledger partition,
    /// twin, policy engine, and monitors.
    #[must_use]
    pub fn new(
        hal: Arc<dyn Hal>,
        config: KernelConfig,
        envelope: SafetyEnvelope,
        channel: ChannelId,
        twin_seed: u64,
        initial_state: PhysicsState,
    ) -> Self {
        let ledger = Ledger::new(hal.clone(), &config, channel.flash_base());
        let safety = SafetyMonitor::new(hal.as_ref(), &config, envelope);
        Self {
            twin: DigitalTwin::new(twin_seed, initial_state),
            policy_engine: PolicyEngine::new(),
            safety,
            dsm: DeterministicSafetyMonitor::new(),
            dynamics: PropulsionDynamics,
            ledger,
            hal,
            config,
            channel,
            is_thrusting: false,
            active_thrust_kn: 0.0,
            execution_reference: None,
            last_prediction: None,
            last_cycle_start_ms: None,
        }
    }

    /// This channel's identity.
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }

    /// This channel's ledger.
    #[must_use]
    pub const fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// The most recent prediction, for the A/B cross-check.
    #[must_use]
    pub const fn last_prediction(&self) -> Option<&PredictionResult> {
        self.last_prediction.as_ref()
    }

    /// The channel's latest sensed state.
    #[must_use]
    pub const fn current_state(&self) -> &PhysicsState {
        self.twin.snapshot()
    }

    /// Replaces this channel's state snapshot (hot-standby sync).
    pub fn sync_state(&mut self, state: &PhysicsState) {
        self.twin.update_snapshot(state);
    }

    /// Runs a prediction without any ledger side effects.
    ///
    /// Used on the standby channel so the supervisor can cross-check
    /// A/B agreement without the standby committing entries.
    pub fn shadow_predict(&mut self, frame: &SensorFrame) -> PredictionResult {
        self.twin.update_snapshot(&frame.physics);
        let control = self.twin.nominal_control(self.config.decision_horizon_ms);
        self.twin.predict(
            self.hal.as_ref(),
            &control,
            self.config.decision_horizon_ms,
            self.config.mc_runs,
        )
    }

    /// Feeds the executed cycle's observation back into the twin's
    /// residual model.
    pub fn observe(&mut self, simulated: &PhysicsState, observed: &PhysicsState) {
        self.twin.observe(simulated, observed);
    }

    /// Read access to this channel's twin, for introspection.
    #[must_use]
    pub const fn twin(&self) -> &DigitalTwin {
        &self.twin
    }

    /// Runs one full decision cycle.
    pub fn run_cycle(&mut self, frame: &SensorFrame) -> CycleReport {
        let start_ms = self.hal.now_ms();
        let mut report = CycleReport::new();
        let mut ctx = CycleContext {
            start_ms,
            state: frame.physics,
            snapshot_id: Hash256::null(),
            prediction: None,
            policy: None,
        };

        let mut step = CycleStep::Sense;
        loop {
            let next = match step {
                CycleStep::Sense => self.step_sense(frame, &mut ctx),
                CycleStep::Predict => self.step_predict(&mut ctx),
                CycleStep::Plan => self.step_plan(&mut ctx),
                CycleStep::Validate => self.step_validate(&mut ctx, &mut report),
                CycleStep::Execute => self.step_execute(&mut ctx, &mut report),
                CycleStep::Audit | CycleStep::Fallback => unreachable!("terminal steps break"),
            };
            match next {
                Ok(CycleStep::Audit) => {
                    report.terminal_step = CycleStep::Audit;
                    break;
                },
                Ok(s) => step = s,
                Err(reason) => {
                    report.terminal_step = CycleStep::Fallback;
                    self.run_fallback(&reason, &mut report);
                    break;
                },
            }
        }

        self.step_audit(&ctx, &mut report);
        self.last_cycle_start_ms = Some(start_ms);
        report
    }

    /// Forces the fallback path outside a cycle (supervisor failover).
    ///
    /// Returns the critical condition, if the recovery itself failed.
    pub fn trigger_fallback(&mut self, reason: &str) -> Option<FailureMode> {
        let mut report = CycleReport::new();
        report.terminal_step = CycleStep::Fallback;
        self.run_fallback(reason, &mut report);
        self.ledger.flush_pending();
        report.failure
    }

    /// Commits a supervisor exception into this channel's ledger.
    pub fn commit_supervisor_exception(&self, reason: &str) {
        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::SupervisorException {
                reason: ReasonCode::new(reason),
            },
        );
    }

    /// Drains the ledger and anchors any partial batch (controlled
    /// shutdown).
    pub fn shutdown_flush(&self) -> usize {
        self.ledger.flush_partial_batch()
    }

    fn step_sense(
        &mut self,
        frame: &SensorFrame,
        ctx: &mut CycleContext,
    ) -> Result<CycleStep, String> {
        // Plausibility gate: an implausible state is never forwarded to
        // the twin or the ledger.
        if !self.dynamics.is_state_plausible(&ctx.state) {
            self.hal.metric_emit("vgk.implausible_state", 1.0);
            return Err("Implausible Sensor State".to_string());
        }

        self.twin.update_snapshot(&ctx.state);

        let snapshot_hash = self.hal.sha256(&ctx.state.canonical_bytes());
        let committed = self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::StateSnapshot {
                snapshot_hash,
                state: ctx.state,
            },
        );
        ctx.snapshot_id = committed.unwrap_or(Hash256::null());

        // Independent hard gate. Anything but None overrides the layered
        // monitor entirely.
        match self.dsm.evaluate(&frame.dsm) {
            SafingAction::FullShutdown => return Err("DSM Full Shutdown".to_string()),
            SafingAction::Rollback => return Err("DSM Rollback".to_string()),
            SafingAction::None => {},
        }

        if self.is_thrusting {
            let reference = self.execution_reference.unwrap_or(ctx.state);
            if !self.safety.monitor_execution(
                self.hal.as_ref(),
                &ctx.state,
                &reference,
                self.active_thrust_kn,
            ) {
                return Err("Execution Integrity Failed".to_string());
            }
        }

        Ok(CycleStep::Predict)
    }

    fn step_predict(&mut self, ctx: &mut CycleContext) -> Result<CycleStep, String> {
        let control = self.twin.nominal_control(self.config.decision_horizon_ms);
        let prediction = self.twin.predict(
            self.hal.as_ref(),
            &control,
            self.config.decision_horizon_ms,
            self.config.mc_runs,
        );

        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::PredictionCommit {
                prediction_id: prediction.prediction_id,
                confidence: prediction.confidence,
                uncertainty: prediction.uncertainty,
                ref_snapshot: ctx.snapshot_id,
                end_state: prediction.predicted_end_state,
            },
        );

        match prediction.status {
            PredictionStatus::PredictedExcursion => {
                self.ledger.commit(
                    self.hal.now_ms(),
                    EntryPayload::EseAlert {
                        prediction_id: prediction.prediction_id,
                        violating_state: prediction.predicted_end_state,
                    },
                );
            },
            PredictionStatus::Invalid => {
                self.last_prediction = Some(prediction);
                return Err("Invalid Prediction".to_string());
            },
            PredictionStatus::Nominal => {},
        }

        self.last_prediction = Some(prediction);
        ctx.prediction = Some(prediction);
        Ok(CycleStep::Plan)
    }

    fn step_plan(&mut self, ctx: &mut CycleContext) -> Result<CycleStep, String> {
        let elapsed_ms = self
            .last_cycle_start_ms
            .map_or(0, |prev| ctx.start_ms.wrapping_sub(prev));
        let candidates = self
            .policy_engine
            .generate(self.hal.as_ref(), &ctx.state, elapsed_ms);
        let Some(best) = PolicyEngine::select_best(&candidates) else {
            return Err("No Policy Generated".to_string());
        };

        let prediction_id = ctx
            .prediction
            .as_ref()
            .map_or(Hash256::null(), |p| p.prediction_id);
        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::PolicyPreflight {
                policy_hash: best.policy_hash,
                prediction_id,
                cost: best.cost,
            },
        );

        ctx.policy = Some(best);
        Ok(CycleStep::Validate)
    }

    fn step_validate(
        &mut self,
        ctx: &mut CycleContext,
        report: &mut CycleReport,
    ) -> Result<CycleStep, String> {
        let policy = ctx.policy.clone().expect("Plan populated the policy");
        let decision =
            self.safety
                .validate(self.hal.as_ref(), &mut self.twin, &policy, self.config.mc_runs);

        let final_status = match decision.status {
            AileeStatus::Borderline => {
                let grace =
                    self.safety
                        .run_grace(self.hal.as_ref(), &ctx.state, &policy, &decision);
                self.ledger.commit(
                    self.hal.now_ms(),
                    EntryPayload::AileeGraceResult {
                        grace_pass: grace.pass,
                        confidence: grace.confidence,
                    },
                );
                grace.status()
            },
            other => other,
        };

        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::AileeSafetyStatus {
                status: final_status,
                confidence: decision.confidence,
            },
        );
        report.ailee_status = Some(final_status);
        ctx.prediction = Some(decision.prediction);

        if final_status.permits_execution() {
            Ok(CycleStep::Execute)
        } else {
            Err("Policy Rejected by AILEE".to_string())
        }
    }

    fn step_execute(
        &mut self,
        ctx: &mut CycleContext,
        report: &mut CycleReport,
    ) -> Result<CycleStep, String> {
        let policy = ctx.policy.clone().expect("Validate kept the policy");
        let tx_id = self.hal.generate_tx_id();
        let pending_ms = self.hal.now_ms();

        let mut command = CommandExecution {
            policy_hash: policy.policy_hash,
            tx_id,
            command_set_hash: self.hal.sha256(&policy.command_bytes()),
            reference_prediction_id: ctx
                .prediction
                .as_ref()
                .map_or(Hash256::null(), |p| p.prediction_id),
            elapsed_ms: 0,
        };
        self.ledger
            .commit(pending_ms, EntryPayload::CommandPending(command));

        let ok = self.hal.actuator_execute(
            &tx_id,
            policy.thrust_magnitude_kn,
            policy.gimbal_theta_rad,
            self.config.watchdog_ms / 2,
        );
        command.elapsed_ms = self.hal.now_ms().wrapping_sub(pending_ms);

        if !ok {
            self.hal.metric_emit("vgk.execution_failure", 1.0);
            self.ledger
                .commit(self.hal.now_ms(), EntryPayload::ExecutionFailure(command));
            return Err("Actuator Execution Timeout".to_string());
        }

        self.ledger
            .commit(self.hal.now_ms(), EntryPayload::CommandCommit(command));

        // Every executed policy gets its rollback bound in the same
        // cycle: immediate engine shutdown is the default safe abort.
        let mut abort_id = format!("ABORT_{}", policy.id);
        abort_id.truncate(MAX_POLICY_ID_LEN);
        let safe_abort = Policy {
            id: abort_id,
            thrust_magnitude_kn: 0.0,
            gimbal_theta_rad: 0.0,
            gimbal_phi_rad: 0.0,
            cost: 0.0,
            policy_hash: Hash256::null(),
        };
        self.safety
            .commit_rollback(self.hal.as_ref(), &policy, &safe_abort);
        let rollback_hash = self
            .safety
            .last_rollback()
            .map_or(Hash256::null(), |p| p.rollback_hash);
        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::RollbackMetadata {
                policy_hash: policy.policy_hash,
                rollback_hash,
            },
        );

        self.is_thrusting = policy.thrust_magnitude_kn > 0.0;
        self.active_thrust_kn = policy.thrust_magnitude_kn;
        self.execution_reference = Some(ctx.state);
        report.executed = true;
        self.hal.metric_emit("vgk.command_executed", 1.0);
        tracing::debug!(
            channel = self.channel.label(),
            policy = %policy.id,
            tx = %tx_id,
            "command committed"
        );

        Ok(CycleStep::Audit)
    }

    fn step_audit(&mut self, ctx: &CycleContext, report: &mut CycleReport) {
        report.flushed_entries = self.ledger.flush_pending();

        let elapsed_ms = self.hal.now_ms().wrapping_sub(ctx.start_ms);
        report.elapsed_ms = elapsed_ms;
        self.hal
            .metric_emit("vgk.cycle_time_ms", f64::from(elapsed_ms));

        if elapsed_ms > self.config.watchdog_ms {
            report.budget_violation = true;
            self.hal
                .metric_emit("vgk.budget_violation", f64::from(elapsed_ms));
            self.ledger.commit(
                ctx.start_ms,
                EntryPayload::GovernanceBudgetViolation { elapsed_ms },
            );
            tracing::warn!(
                channel = self.channel.label(),
                elapsed_ms,
                budget_ms = self.config.watchdog_ms,
                "cycle budget violated"
            );
        }
    }

    fn run_fallback(&mut self, reason: &str, report: &mut CycleReport) {
        report.fallback_reason = Some(reason.to_string());
        self.hal
            .metric_emit_tagged("vgk.fallback_triggered", 1.0, "reason", reason);
        tracing::warn!(channel = self.channel.label(), reason, "fallback triggered");

        self.ledger.commit(
            self.hal.now_ms(),
            EntryPayload::FallbackTriggered {
                reason: ReasonCode::new(reason),
            },
        );

        let Some(plan) = self.safety.last_rollback() else {
            self.hal.metric_emit("vgk.no_rollback_plan", 1.0);
            report.failure = Some(FailureMode::CriticalNoRollback);
            return;
        };

        match execute_rollback(self.hal.as_ref(), &plan, self.config.watchdog_ms / 4) {
            Ok(tx_id) => {
                let command = CommandExecution {
                    policy_hash: self.hal.sha256(plan.policy_id.as_bytes()),
                    tx_id,
                    command_set_hash: plan.rollback_hash,
                    reference_prediction_id: self
                        .last_prediction
                        .as_ref()
                        .map_or(Hash256::null(), |p| p.prediction_id),
                    elapsed_ms: 0,
                };
                self.ledger
                    .commit(self.hal.now_ms(), EntryPayload::RollbackCommit(command));
                self.is_thrusting = false;
                self.active_thrust_kn = 0.0;
                report.rolled_back = true;
                self.hal.metric_emit("vgk.rollback_success", 1.0);
            },
            Err(err) => {
                self.hal
                    .metric_emit_tagged("vgk.critical_failure", 1.0, "reason", "RollbackFailed");
                tracing::error!(channel = self.channel.label(), %err, "rollback failed");
                report.failure = Some(FailureMode::CriticalRollbackFail);
            },
        }
    }
}

#[cfg(test)]
mod tests;
