//! Router metrics.
//!
//! Counters are lock-free so packets on different tasks never contend.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tripwire_core::PacketStatus;

/// Live counters
#[derive(Debug, Default)]
pub struct RouterMetrics {
    received: AtomicU64,
    succeeded: AtomicU64,
    validation_failures: AtomicU64,
    execution_errors: AtomicU64,
    timeouts: AtomicU64,
    total_elapsed_us: AtomicU64,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Packets received
    pub packets_received: u64,
    /// Packets that finished in `success`
    pub packets_succeeded: u64,
    /// Packets rejected by validation
    pub validation_failures: u64,
    /// Packets that failed during load or dispatch
    pub execution_errors: u64,
    /// Packets that timed out
    pub timeouts: u64,
    /// Succeeded over finished
    pub success_rate: f64,
    /// Mean time per finished packet
    pub average_elapsed_ms: f64,
}

impl RouterMetrics {
    /// Create zeroed metrics
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Count an incoming packet
    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a packet rejected by validation
    pub fn record_rejected(&self, elapsed: Duration) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    /// Count a dispatched packet by its terminal status
    pub fn record_finished(&self, status: PacketStatus, elapsed: Duration) {
        let counter = match status {
            PacketStatus::Success => &self.succeeded,
            PacketStatus::Timeout => &self.timeouts,
            _ => &self.execution_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.add_elapsed(elapsed);
    }

    fn add_elapsed(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.total_elapsed_us.fetch_add(micros, Ordering::Relaxed);
    }

    /// Copy the counters
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        let succeeded = self.succeeded.load(Ordering::Relaxed);
        let validation_failures = self.validation_failures.load(Ordering::Relaxed);
        let execution_errors = self.execution_errors.load(Ordering::Relaxed);
        let timeouts = self.timeouts.load(Ordering::Relaxed);
        let finished = succeeded + validation_failures + execution_errors + timeouts;
        let total_ms = self.total_elapsed_us.load(Ordering::Relaxed) as f64 / 1000.0;

        MetricsSnapshot {
            packets_received: self.received.load(Ordering::Relaxed),
            packets_succeeded: succeeded,
            validation_failures,
            execution_errors,
            timeouts,
            success_rate: if finished == 0 { 0.0 } else { succeeded as f64 / finished as f64 },
            average_elapsed_ms: if finished == 0 { 0.0 } else { total_ms / finished as f64 },
        }
    }
}
