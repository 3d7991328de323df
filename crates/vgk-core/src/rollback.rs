//! Idempotent rollback dispatch.
//!
//! The last hop of every fallback path. The plan is validated before it
//! touches the actuator: an unvalidated rollback is how a recovery path
//! becomes a second failure. Dispatch is keyed by a fresh transaction id;
//! replaying the same id is a no-op success by HAL contract, so a retry
//! after a spurious failure cannot double-apply.

use thiserror::Error;

use crate::hal::Hal;
use crate::types::{RollbackPlan, TxId};

/// Errors from rollback dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RollbackError {
    /// The plan is marked invalid.
    #[error("rollback plan for policy {policy_id} is marked invalid")]
    PlanInvalid {
        /// Policy the plan covers.
        policy_id: String,
    },

    /// The fallback command holds a negative or non-finite thrust.
    #[error("rollback plan carries unusable thrust command")]
    BadThrust,

    /// A gimbal angle is non-finite.
    #[error("rollback plan carries non-finite gimbal angles")]
    BadGimbal,

    /// The actuator refused or timed out.
    #[error("actuator rejected rollback transaction {tx_id}")]
    ActuatorFailed {
        /// The failed transaction id.
        tx_id: TxId,
    },
}

/// Validates a plan without dispatching it.
///
/// # Errors
///
/// Returns the first failed check.
pub fn validate_plan(plan: &RollbackPlan) -> Result<(), RollbackError> {
    if !plan.valid {
        return Err(RollbackError::PlanInvalid {
            policy_id: plan.policy_id.clone(),
        });
    }
    if !plan.thrust_magnitude_kn.is_finite() || plan.thrust_magnitude_kn < 0.0 {
        return Err(RollbackError::BadThrust);
    }
    if !plan.gimbal_theta_rad.is_finite() || !plan.gimbal_phi_rad.is_finite() {
        return Err(RollbackError::BadGimbal);
    }
    Ok(())
}

/// Validates and dispatches a rollback plan.
///
/// Returns the transaction id of the applied command.
///
/// # Errors
///
/// Returns a validation error without touching the actuator, or
/// [`RollbackError::ActuatorFailed`] on dispatch failure.
pub fn execute_rollback(
    hal: &dyn Hal,
    plan: &RollbackPlan,
    timeout_ms: u32,
) -> Result<TxId, RollbackError> {
    validate_plan(plan)?;

    let tx_id = hal.generate_tx_id();
    let ok = hal.actuator_execute(
        &tx_id,
        plan.thrust_magnitude_kn,
        plan.gimbal_theta_rad,
        timeout_ms,
    );
    if ok {
        tracing::info!(tx = %tx_id, policy = %plan.policy_id, "rollback command applied");
        Ok(tx_id)
    } else {
        tracing::error!(tx = %tx_id, policy = %plan.policy_id, "rollback dispatch failed");
        Err(RollbackError::ActuatorFailed { tx_id })
    }
}
