//! # vgk-core
//!
//! Decision-cycle engine of a redundant vehicle-governance stack. Each
//! real-time cycle the kernel senses the physical state, predicts a
//! short-horizon future with a Monte Carlo digital twin, proposes and
//! ranks candidate actuator policies, admits them through a layered
//! safety monitor backed by an independent deterministic gate, executes
//! the admitted policy transactionally, and records every decision into a
//! content-addressed, Merkle-anchored telemetry ledger. A redundant A/B
//! supervisor arbitrates two independent channels and fails over on
//! critical faults.
//!
//! ## Components
//!
//! - [`ledger`]: bounded non-blocking queue, canonical entry encoding,
//!   flash write-through, Merkle anchoring, offline audits
//! - [`twin`]: Euler-integrated prediction with Monte Carlo confidence
//!   and an online residual model
//! - [`policy`]: candidate enumeration and cost ranking
//! - [`ailee`]: accept / borderline-grace / reject validation bands,
//!   envelope checks, the rollback store
//! - [`dsm`]: deterministic last-line-of-defense gate
//! - [`orchestrator`]: the per-cycle state machine
//! - [`supervisor`]: A/B arbitration and failover
//! - [`rollback`]: validated, idempotent rollback dispatch
//! - [`hal`]: the platform capability boundary, with a deterministic
//!   SIL implementation
//! - [`physics`]: pluggable integrator, PID law, and field model
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use vgk_core::config::{KernelConfig, SafetyEnvelope};
//! use vgk_core::hal::SilHal;
//! use vgk_core::physics::consts::R_REF_M;
//! use vgk_core::supervisor::Supervisor;
//! use vgk_core::types::{PhysicsState, SensorFrame};
//!
//! let hal = Arc::new(SilHal::new(42));
//! let launch_state = PhysicsState {
//!     position_m: [R_REF_M, 0.0, 0.0],
//!     velocity_m_s: [0.0, 0.0, 0.0],
//!     attitude_q: [1.0, 0.0, 0.0, 0.0],
//!     mass_kg: 250_000.0,
//!     timestamp_ms: 0,
//! };
//!
//! let mut supervisor = Supervisor::new(
//!     hal.clone(),
//!     KernelConfig::default(),
//!     SafetyEnvelope::default(),
//!     42,
//!     launch_state,
//! );
//!
//! let report = supervisor
//!     .run_cycle(&SensorFrame::from_state(launch_state))
//!     .expect("supervisor is live");
//! assert!(report.executed);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod ailee;
pub mod config;
pub mod dsm;
pub mod hal;
pub mod ledger;
pub mod orchestrator;
pub mod physics;
pub mod policy;
pub mod rollback;
pub mod supervisor;
pub mod twin;
pub mod types;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::{KernelConfig, SafetyEnvelope};
    pub use crate::hal::{Hal, SilHal};
    pub use crate::orchestrator::{ChannelId, CycleReport, CycleStep, Orchestrator};
    pub use crate::supervisor::Supervisor;
    pub use crate::types::{PhysicsState, SensorFrame};
}

pub use config::KernelConfig;
pub use orchestrator::Orchestrator;
pub use supervisor::Supervisor;
