//! SIL scenario runner.
//!
//! Drives the full supervisor stack against the deterministic SIL HAL at
//! a fixed cadence, optionally injecting faults, then prints a run
//! summary and the per-channel ledger audit result.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};

use vgk_core::config::{KernelConfig, SafetyEnvelope};
use vgk_core::hal::{SilFaultConfig, SilHal};
use vgk_core::ledger::{audit, EntryKind};
use vgk_core::orchestrator::ChannelId;
use vgk_core::physics::consts::R_REF_M;
use vgk_core::supervisor::Supervisor;
use vgk_core::types::{FailureMode, PhysicsState, SensorFrame};

/// Canned SIL scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Scenario {
    /// Nominal cycles, no faults.
    Nominal,
    /// One-shot actuator timeout partway through the run.
    ActuatorFault,
    /// Forced failover to channel B partway through the run.
    Failover,
    /// Deterministic-safety-monitor shutdown frame partway through.
    DsmShutdown,
}

#[derive(Debug, Parser)]
#[command(name = "vgk-sil", about = "SIL scenario runner for the governance kernel")]
struct Args {
    /// Scenario to run.
    #[arg(long, value_enum, default_value_t = Scenario::Nominal)]
    scenario: Scenario,

    /// Number of decision cycles.
    #[arg(long, default_value_t = 40)]
    cycles: u32,

    /// Cycle period, milliseconds.
    #[arg(long, default_value_t = 50)]
    period_ms: u32,

    /// HAL and twin RNG seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Cycle index at which the scenario's fault fires.
    #[arg(long, default_value_t = 10)]
    fault_at: u32,
}

fn launch_state(timestamp_ms: u32) -> PhysicsState {
    PhysicsState {
        position_m: [R_REF_M, 0.0, 0.0],
        velocity_m_s: [0.0, 0.0, 0.0],
        attitude_q: [1.0, 0.0, 0.0, 0.0],
        mass_kg: 250_000.0,
        timestamp_ms,
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.fault_at >= args.cycles && args.scenario != Scenario::Nominal {
        bail!("--fault-at must be below --cycles");
    }

    let hal = Arc::new(SilHal::new(args.seed));
    let mut supervisor = Supervisor::new(
        hal.clone(),
        KernelConfig::default(),
        SafetyEnvelope::default(),
        args.seed,
        launch_state(0),
    );

    let mut fallbacks = 0u32;
    let mut executed = 0u32;
    for cycle in 0..args.cycles {
        hal.advance_clock(args.period_ms);
        let mut frame = SensorFrame::from_state(launch_state(cycle * args.period_ms));

        if cycle == args.fault_at {
            match args.scenario {
                Scenario::Nominal => {},
                Scenario::ActuatorFault => {
                    tracing::info!(cycle, "injecting one-shot actuator timeout");
                    hal.set_faults(SilFaultConfig {
                        actuator_timeout_once: true,
                        ..SilFaultConfig::default()
                    });
                },
                Scenario::Failover => {
                    tracing::info!(cycle, "notifying primary channel lockup");
                    supervisor.notify_failure(FailureMode::PrimaryChannelLockup);
                },
                Scenario::DsmShutdown => {
                    tracing::info!(cycle, "feeding superluminal dilation frame");
                    frame.dsm.time_dilation = 1.5;
                },
            }
        }

        let Some(report) = supervisor.run_cycle(&frame) else {
            tracing::error!(cycle, "supervisor halted, stopping run");
            break;
        };
        if report.executed {
            executed += 1;
        }
        if report.fallback_reason.is_some() {
            fallbacks += 1;
        }
    }

    supervisor.shutdown();

    println!("run complete: {executed} commands executed, {fallbacks} fallbacks");
    println!("active channel: {}", supervisor.active_channel().label());

    for id in [ChannelId::A, ChannelId::B] {
        let stats = supervisor.channel(id).ledger().stats();
        let entries = audit::read_partition(hal.as_ref(), id.flash_base(), stats.flash_cursor)
            .with_context(|| format!("decoding channel {} partition", id.label()))?;
        audit::verify_entry_ids(hal.as_ref(), &entries)
            .with_context(|| format!("channel {} entry ids", id.label()))?;
        audit::verify_anchors(hal.as_ref(), &entries)
            .with_context(|| format!("channel {} anchors", id.label()))?;

        println!(
            "channel {}: {} records, {} anchors, {} commits, {} rollbacks, audit ok",
            id.label(),
            entries.len(),
            audit::count_kind(&entries, EntryKind::MerkleAnchor),
            audit::count_kind(&entries, EntryKind::CommandCommit),
            audit::count_kind(&entries, EntryKind::RollbackCommit),
        );
    }

    Ok(())
}
