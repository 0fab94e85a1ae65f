// Dispatch metrics module
//
// Provides lightweight counters for monitoring the dispatch bridge

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Dispatch counters
///
/// Uses atomic operations for thread-safe tracking without locks. One instance is
/// shared by a bridge and every supervisor and load task spawned through it.
#[derive(Debug)]
pub struct DispatchMetrics {
    /// Supervisor ticks executed
    pub ticks: AtomicU64,

    /// Worker messages taken off transports
    pub messages_received: AtomicU64,

    /// Transport reads that failed for a reason other than close
    pub receive_faults: AtomicU64,

    /// Ticks whose drain had nothing to send
    pub empty_flushes: AtomicU64,

    /// Deliveries accepted by the consumer sink
    pub deliveries: AtomicU64,

    /// Deliveries rejected because the consumer had gone away
    pub deliveries_dropped: AtomicU64,

    pub workers_launched: AtomicU64,

    pub launch_failures: AtomicU64,

    /// Workers terminated and joined
    pub workers_torn_down: AtomicU64,

    pub loads_completed: AtomicU64,

    /// Loads whose delivery was suppressed by cancellation
    pub loads_suppressed: AtomicU64,

    start_time: Instant,
}

impl DispatchMetrics {
    pub fn new() -> Self {
        Self {
            ticks: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            receive_faults: AtomicU64::new(0),
            empty_flushes: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
            deliveries_dropped: AtomicU64::new(0),
            workers_launched: AtomicU64::new(0),
            launch_failures: AtomicU64::new(0),
            workers_torn_down: AtomicU64::new(0),
            loads_completed: AtomicU64::new(0),
            loads_suppressed: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_fault(&self) {
        self.receive_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_empty_flush(&self) {
        self.empty_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery(&self) {
        self.deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_delivery_dropped(&self) {
        self.deliveries_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_launched(&self) {
        self.workers_launched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_torn_down(&self) {
        self.workers_torn_down.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_completed(&self) {
        self.loads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_load_suppressed(&self) {
        self.loads_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total uptime
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average messages coalesced into each delivery
    pub fn messages_per_delivery(&self) -> f64 {
        let messages = self.messages_received.load(Ordering::Relaxed);
        let deliveries = self.deliveries.load(Ordering::Relaxed);
        if deliveries > 0 {
            messages as f64 / deliveries as f64
        } else {
            0.0
        }
    }

    /// Log metrics summary
    pub fn log_summary(&self) {
        tracing::info!("=== Dispatch Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Workers: {} launched, {} torn down, {} launch failures",
            self.workers_launched.load(Ordering::Relaxed),
            self.workers_torn_down.load(Ordering::Relaxed),
            self.launch_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Ticks: {}, messages: {}, receive faults: {}, empty flushes: {}",
            self.ticks.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
            self.receive_faults.load(Ordering::Relaxed),
            self.empty_flushes.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Deliveries: {} ({:.1} messages each), dropped: {}",
            self.deliveries.load(Ordering::Relaxed),
            self.messages_per_delivery(),
            self.deliveries_dropped.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Loads: {} completed, {} suppressed",
            self.loads_completed.load(Ordering::Relaxed),
            self.loads_suppressed.load(Ordering::Relaxed)
        );
    }
}

impl Default for DispatchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_metrics_creation() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.ticks.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.deliveries.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_worker_counters() {
        let metrics = DispatchMetrics::new();

        metrics.record_worker_launched();
        metrics.record_worker_launched();
        metrics.record_launch_failure();
        metrics.record_worker_torn_down();

        assert_eq!(metrics.workers_launched.load(Ordering::Relaxed), 2);
        assert_eq!(metrics.launch_failures.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.workers_torn_down.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_messages_per_delivery() {
        let metrics = DispatchMetrics::new();
        assert_eq!(metrics.messages_per_delivery(), 0.0);

        for _ in 0..6 {
            metrics.record_message();
        }
        metrics.record_delivery();
        metrics.record_delivery();

        assert_eq!(metrics.messages_per_delivery(), 3.0);
    }

    #[test]
    fn test_uptime() {
        let metrics = DispatchMetrics::new();
        thread::sleep(Duration::from_millis(10));
        assert!(metrics.uptime().as_millis() >= 10);
    }
}
