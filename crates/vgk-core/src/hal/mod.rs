//! Hardware abstraction capability.
//!
//! The kernel never touches a clock, a hash engine, flash, or an actuator
//! directly; everything goes through the [`Hal`] trait, injected once at
//! supervisor construction and shared by both redundancy channels. This is
//! the seam where SIL stubs, HIL transports, and flight drivers plug in.
//!
//! # Contract highlights
//!
//! - `now_ms` is monotonic; wraparound is permitted and callers use deltas.
//! - `sha256` is deterministic for the same input. Flight builds use a
//!   certified implementation; the SIL stub uses a real SHA-256 so audit
//!   invariants hold in simulation too.
//! - `actuator_execute` is idempotent by transaction id: replaying an
//!   already-applied id is a no-op success.
//! - `flash_write` appends at the given address with no observable partial
//!   writes.
//! - `metric_emit` and `downlink_queue` are best-effort and non-blocking.

mod sil;

pub use sil::{SilFaultConfig, SilHal};

use crate::types::{Hash256, TxId};

/// Platform capability required by the kernel.
pub trait Hal: Send + Sync {
    /// Monotonic milliseconds. Wraparound permitted.
    fn now_ms(&self) -> u32;

    /// SHA-256 digest of `data`.
    fn sha256(&self, data: &[u8]) -> Hash256;

    /// Signs a digest. Returns `None` when the signing element is
    /// unavailable.
    fn ed25519_sign(&self, digest: &Hash256) -> Option<[u8; 64]>;

    /// Appends `data` to flash at `addr`. Returns `false` on failure; no
    /// partial write is observable.
    fn flash_write(&self, addr: u32, data: &[u8]) -> bool;

    /// Reads `buf.len()` bytes from flash at `addr`.
    fn flash_read(&self, addr: u32, buf: &mut [u8]) -> bool;

    /// Dispatches an actuator command, bounded by `timeout_ms`.
    ///
    /// Idempotent by `tx_id`: a replay of an applied id returns `true`
    /// without re-applying.
    fn actuator_execute(
        &self,
        tx_id: &TxId,
        thrust_kn: f32,
        gimbal_rad: f32,
        timeout_ms: u32,
    ) -> bool;

    /// Enqueues bytes for downlink. Best-effort.
    fn downlink_queue(&self, data: &[u8]) -> bool;

    /// Emits a metric sample. Best-effort, non-blocking.
    fn metric_emit(&self, name: &str, value: f64);

    /// Emits a tagged metric sample. Best-effort, non-blocking.
    fn metric_emit_tagged(&self, name: &str, value: f64, tag_key: &str, tag_value: &str);

    /// Returns a transaction id unique within this run: 24 lowercase hex
    /// characters.
    fn generate_tx_id(&self) -> TxId;
}
