//! Software-in-the-loop HAL.
//!
//! A deterministic, fully in-memory platform: a controllable monotonic
//! clock, real SHA-256, a byte-vector flash, an idempotency-fenced
//! actuator, and a metric recorder that tests can query. Fault injection
//! covers one-shot and probabilistic flash/actuator failures plus a forced
//! actuator latency, mirroring the knobs a HIL rig exposes.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use super::Hal;
use crate::types::{Hash256, TxId, TX_ID_LEN};

/// Fault-injection knobs for the SIL HAL.
///
/// One-shot flags clear after firing; probabilistic faults draw from the
/// HAL RNG so a seeded run replays identically.
#[derive(Debug, Clone, Copy, Default)]
pub struct SilFaultConfig {
    /// Fail the next flash write, once.
    pub flash_write_fail_once: bool,
    /// Time out the next actuator dispatch, once.
    pub actuator_timeout_once: bool,
    /// Probability in `[0, 1]` that any flash write fails.
    pub flash_write_fail_probability: f32,
    /// Probability in `[0, 1]` that any actuator dispatch times out.
    pub actuator_timeout_probability: f32,
    /// Simulated actuator latency in milliseconds; dispatch fails when it
    /// exceeds the caller's timeout.
    pub actuator_forced_latency_ms: Option<u32>,
}

#[derive(Debug, Default)]
struct MetricRecorder {
    sums: HashMap<String, f64>,
    counts: HashMap<String, u64>,
}

impl MetricRecorder {
    fn record(&mut self, name: &str, value: f64) {
        *self.sums.entry(name.to_string()).or_insert(0.0) += value;
        *self.counts.entry(name.to_string()).or_insert(0) += 1;
    }
}

/// Deterministic in-memory HAL for SIL runs and tests.
pub struct SilHal {
    clock_ms: AtomicU32,
    auto_tick_ms: AtomicU32,
    tx_counter: AtomicU64,
    flash: Mutex<Vec<u8>>,
    downlink: Mutex<Vec<Vec<u8>>>,
    applied_tx: Mutex<HashSet<TxId>>,
    commands: Mutex<Vec<(TxId, f32, f32)>>,
    metrics: Mutex<MetricRecorder>,
    rng: Mutex<StdRng>,
    faults: Mutex<SilFaultConfig>,
}

impl SilHal {
    /// Flash capacity of the simulated part, bytes.
    pub const FLASH_CAPACITY: usize = 4 * 1024 * 1024;

    /// Creates a HAL with the RNG seeded for deterministic replay.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            clock_ms: AtomicU32::new(0),
            auto_tick_ms: AtomicU32::new(0),
            tx_counter: AtomicU64::new(1),
            flash: Mutex::new(Vec::new()),
            downlink: Mutex::new(Vec::new()),
            applied_tx: Mutex::new(HashSet::new()),
            commands: Mutex::new(Vec::new()),
            metrics: Mutex::new(MetricRecorder::default()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            faults: Mutex::new(SilFaultConfig::default()),
        }
    }

    /// Reseeds the HAL RNG at a known replay point.
    pub fn reseed(&self, seed: u64) {
        *self.rng.lock().expect("rng lock") = StdRng::seed_from_u64(seed);
    }

    /// Advances the monotonic clock.
    pub fn advance_clock(&self, delta_ms: u32) {
        self.clock_ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    /// Makes every `now_ms` call advance the clock by `tick_ms`.
    pub fn set_auto_tick_ms(&self, tick_ms: u32) {
        self.auto_tick_ms.store(tick_ms, Ordering::SeqCst);
    }

    /// Replaces the fault configuration.
    pub fn set_faults(&self, faults: SilFaultConfig) {
        *self.faults.lock().expect("fault lock") = faults;
    }

    /// Clears all injected faults.
    pub fn reset_faults(&self) {
        self.set_faults(SilFaultConfig::default());
    }

    /// Sum of all samples emitted for a metric, if any were.
    #[must_use]
    pub fn metric_sum(&self, name: &str) -> Option<f64> {
        self.metrics
            .lock()
            .expect("metric lock")
            .sums
            .get(name)
            .copied()
    }

    /// Number of samples emitted for a metric.
    #[must_use]
    pub fn metric_count(&self, name: &str) -> u64 {
        self.metrics
            .lock()
            .expect("metric lock")
            .counts
            .get(name)
            .copied()
            .unwrap_or(0)
    }

    /// Snapshot of the flash contents.
    #[must_use]
    pub fn flash_snapshot(&self) -> Vec<u8> {
        self.flash.lock().expect("flash lock").clone()
    }

    /// Number of frames queued for downlink.
    #[must_use]
    pub fn downlink_depth(&self) -> usize {
        self.downlink.lock().expect("downlink lock").len()
    }

    /// Actuator command history as `(tx_id, thrust_kn, gimbal_rad)`.
    #[must_use]
    pub fn command_history(&self) -> Vec<(TxId, f32, f32)> {
        self.commands.lock().expect("command lock").clone()
    }

    fn draw_probability(&self, p: f32) -> bool {
        if p <= 0.0 {
            return false;
        }
        self.rng.lock().expect("rng lock").gen::<f32>() < p
    }
}

impl Hal for SilHal {
    fn now_ms(&self) -> u32 {
        let tick = self.auto_tick_ms.load(Ordering::SeqCst);
        if tick > 0 {
            self.clock_ms.fetch_add(tick, Ordering::SeqCst).wrapping_add(tick)
        } else {
            self.clock_ms.load(Ordering::SeqCst)
        }
    }

    fn sha256(&self, data: &[u8]) -> Hash256 {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Hash256(out)
    }

    fn ed25519_sign(&self, digest: &Hash256) -> Option<[u8; 64]> {
        // The SIL part has no signing element; a deterministic stamp keeps
        // downstream plumbing exercised.
        let mut sig = [0u8; 64];
        sig[..32].copy_from_slice(digest.as_bytes());
        sig[32..].copy_from_slice(digest.as_bytes());
        Some(sig)
    }

    fn flash_write(&self, addr: u32, data: &[u8]) -> bool {
        {
            let mut faults = self.faults.lock().expect("fault lock");
            if faults.flash_write_fail_once {
                faults.flash_write_fail_once = false;
                return false;
            }
            if self.draw_probability(faults.flash_write_fail_probability) {
                return false;
            }
        }

        let addr = addr as usize;
        let end = addr + data.len();
        if end > Self::FLASH_CAPACITY {
            return false;
        }
        let mut flash = self.flash.lock().expect("flash lock");
        if end > flash.len() {
            flash.resize(end, 0xff);
        }
        flash[addr..end].copy_from_slice(data);
        true
    }

    fn flash_read(&self, addr: u32, buf: &mut [u8]) -> bool {
        let flash = self.flash.lock().expect("flash lock");
        let addr = addr as usize;
        let end = addr + buf.len();
        if end > flash.len() {
            return false;
        }
        buf.copy_from_slice(&flash[addr..end]);
        true
    }

    fn actuator_execute(
        &self,
        tx_id: &TxId,
        thrust_kn: f32,
        gimbal_rad: f32,
        timeout_ms: u32,
    ) -> bool {
        if self.applied_tx.lock().expect("tx lock").contains(tx_id) {
            self.metric_emit("actuator.idempotent_shortcircuit", 1.0);
            return true;
        }

        {
            let mut faults = self.faults.lock().expect("fault lock");
            if faults.actuator_timeout_once {
                faults.actuator_timeout_once = false;
                return false;
            }
            if let Some(latency) = faults.actuator_forced_latency_ms {
                if latency > timeout_ms {
                    return false;
                }
            }
            if self.draw_probability(faults.actuator_timeout_probability) {
                return false;
            }
        }

        self.applied_tx.lock().expect("tx lock").insert(*tx_id);
        self.commands
            .lock()
            .expect("command lock")
            .push((*tx_id, thrust_kn, gimbal_rad));
        true
    }

    fn downlink_queue(&self, data: &[u8]) -> bool {
        self.downlink
            .lock()
            .expect("downlink lock")
            .push(data.to_vec());
        true
    }

    fn metric_emit(&self, name: &str, value: f64) {
        self.metrics.lock().expect("metric lock").record(name, value);
    }

    fn metric_emit_tagged(&self, name: &str, value: f64, tag_key: &str, tag_value: &str) {
        let tagged = format!("{name}.{tag_key}.{tag_value}");
        let mut metrics = self.metrics.lock().expect("metric lock");
        metrics.record(name, value);
        metrics.record(&tagged, value);
    }

    fn generate_tx_id(&self) -> TxId {
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        let hex = format!("{n:024x}");
        let mut bytes = [0u8; TX_ID_LEN];
        bytes.copy_from_slice(hex.as_bytes());
        TxId::from_bytes(bytes).expect("counter renders as lowercase hex")
    }
}
