//! Physical constants and integrator limits.

/// Gravitational constant, m^3 kg^-1 s^-2.
pub const G_GRAVITATIONAL: f32 = 6.674e-11;

/// Reference planet mass, kilograms.
pub const M_PLANET_KG: f32 = 5.972e24;

/// Reference planet radius, meters.
pub const R_REF_M: f32 = 6.371e6;

/// Simplified atmospheric drag coefficient (lumped `0.5 * rho * Cd * A`).
pub const ATMOSPHERIC_DRAG_COEFF: f32 = 0.3;

/// Altitude below which the drag term is active, meters.
pub const DRAG_CEILING_M: f32 = 100_000.0;

/// Maximum commandable thrust, kilonewtons.
pub const MAX_THRUST_KN: f32 = 2_500.0;

/// Structural mass floor, kilograms.
pub const MIN_MASS_KG: f32 = 100.0;

/// Per-axis velocity sanity bound, meters per second.
pub const MAX_VELOCITY_M_S: f32 = 20_000.0;

/// Fixed integration step, milliseconds.
pub const PHYSICS_DT_MS: u32 = 10;

/// Squared magnitude below which a vector normalizes to zero.
pub const NORMALIZE_EPSILON_SQ: f32 = 1e-12;
