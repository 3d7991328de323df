//! Policy engine.
//!
//! Enumerates a bounded set of candidate actuator policies around the
//! guidance baseline each cycle and ranks them by a risk-aware cost,
//! lower preferred. The engine proposes; it never gates. Admission is
//! entirely the safety monitor's job.

mod engine;

pub use engine::{control_input_from_policy, PolicyEngine};
