use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use parking_lot::Mutex;

use crate::reconcile::ReconcileReport;

/// Operation metrics collector for a shard handler
#[derive(Debug)]
pub struct MetricsCollector {
    // Operation counts
    /// Number of successful builds
    build_count: AtomicUsize,
    /// Number of shard-count changes
    rebalance_count: AtomicUsize,
    /// Number of replication level changes
    replication_change_count: AtomicUsize,
    /// Number of reconciliation passes
    reconcile_count: AtomicUsize,
    /// Number of interrupted rebalances rolled forward
    roll_forward_count: AtomicUsize,

    // Repair metrics
    /// Orphaned content entries removed
    orphans_removed: AtomicUsize,
    /// Primaries restored from a replica
    primaries_recovered: AtomicUsize,
    /// Replicas recopied from their primary
    replicas_repaired: AtomicUsize,
    /// Shards found with no surviving copy
    shards_lost: AtomicUsize,

    // Data metrics
    /// Total bytes written to the content store
    bytes_written: AtomicUsize,
    /// Total bytes read from the content store
    bytes_read: AtomicUsize,

    // Timing metrics
    /// Total rebalance duration in nanoseconds
    rebalance_duration_ns: AtomicU64,
    /// Total reconciliation duration in nanoseconds
    reconcile_duration_ns: AtomicU64,
    /// Last reconciliation duration
    last_reconcile_duration: Mutex<Duration>,

    // Internal state
    /// Start time of the metrics collector
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            build_count: AtomicUsize::new(0),
            rebalance_count: AtomicUsize::new(0),
            replication_change_count: AtomicUsize::new(0),
            reconcile_count: AtomicUsize::new(0),
            roll_forward_count: AtomicUsize::new(0),

            orphans_removed: AtomicUsize::new(0),
            primaries_recovered: AtomicUsize::new(0),
            replicas_repaired: AtomicUsize::new(0),
            shards_lost: AtomicUsize::new(0),

            bytes_written: AtomicUsize::new(0),
            bytes_read: AtomicUsize::new(0),

            rebalance_duration_ns: AtomicU64::new(0),
            reconcile_duration_ns: AtomicU64::new(0),
            last_reconcile_duration: Mutex::new(Duration::from_secs(0)),

            start_time: Instant::now(),
        }
    }

    /// Increment build count
    pub fn increment_builds(&self) {
        self.build_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rebalance count
    pub fn increment_rebalances(&self) {
        self.rebalance_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment replication change count
    pub fn increment_replication_changes(&self) {
        self.replication_change_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment roll-forward count
    pub fn increment_roll_forwards(&self) {
        self.roll_forward_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Add bytes written
    pub fn add_bytes_written(&self, bytes: usize) {
        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Add bytes read
    pub fn add_bytes_read(&self, bytes: usize) {
        self.bytes_read.fetch_add(bytes, Ordering::Relaxed);
    }

    /// Record a rebalance operation duration
    pub fn record_rebalance_duration(&self, duration: Duration) {
        self.rebalance_duration_ns.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
    }

    /// Record the outcome of one reconciliation pass
    pub fn record_reconcile(&self, report: &ReconcileReport, duration: Duration) {
        self.reconcile_count.fetch_add(1, Ordering::Relaxed);
        self.orphans_removed.fetch_add(report.orphans_removed.len(), Ordering::Relaxed);
        self.primaries_recovered.fetch_add(report.primaries_recovered.len(), Ordering::Relaxed);
        self.replicas_repaired.fetch_add(report.replicas_repaired.len(), Ordering::Relaxed);
        self.shards_lost.fetch_add(report.lost_shards.len(), Ordering::Relaxed);
        self.reconcile_duration_ns.fetch_add(duration.as_nanos() as u64, Ordering::Relaxed);
        *self.last_reconcile_duration.lock() = duration;
    }

    // Getters

    /// Get number of builds
    pub fn get_build_count(&self) -> usize {
        self.build_count.load(Ordering::Relaxed)
    }

    /// Get number of rebalances
    pub fn get_rebalance_count(&self) -> usize {
        self.rebalance_count.load(Ordering::Relaxed)
    }

    /// Get number of replication level changes
    pub fn get_replication_change_count(&self) -> usize {
        self.replication_change_count.load(Ordering::Relaxed)
    }

    /// Get number of reconciliation passes
    pub fn get_reconcile_count(&self) -> usize {
        self.reconcile_count.load(Ordering::Relaxed)
    }

    /// Get number of roll-forwards
    pub fn get_roll_forward_count(&self) -> usize {
        self.roll_forward_count.load(Ordering::Relaxed)
    }

    /// Get number of orphans removed
    pub fn get_orphans_removed(&self) -> usize {
        self.orphans_removed.load(Ordering::Relaxed)
    }

    /// Get number of primaries recovered
    pub fn get_primaries_recovered(&self) -> usize {
        self.primaries_recovered.load(Ordering::Relaxed)
    }

    /// Get number of replicas repaired
    pub fn get_replicas_repaired(&self) -> usize {
        self.replicas_repaired.load(Ordering::Relaxed)
    }

    /// Get number of shards reported lost
    pub fn get_shards_lost(&self) -> usize {
        self.shards_lost.load(Ordering::Relaxed)
    }

    /// Get total bytes written
    pub fn get_bytes_written(&self) -> usize {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// Get total bytes read
    pub fn get_bytes_read(&self) -> usize {
        self.bytes_read.load(Ordering::Relaxed)
    }

    /// Get total rebalance duration
    pub fn get_rebalance_duration(&self) -> Duration {
        Duration::from_nanos(self.rebalance_duration_ns.load(Ordering::Relaxed))
    }

    /// Get total reconciliation duration
    pub fn get_reconcile_duration(&self) -> Duration {
        Duration::from_nanos(self.reconcile_duration_ns.load(Ordering::Relaxed))
    }

    /// Get the last reconciliation duration
    pub fn get_last_reconcile_duration(&self) -> Duration {
        *self.last_reconcile_duration.lock()
    }

    /// Get uptime of the collector
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create a human-readable report of the metrics
    pub fn report(&self) -> String {
        let mut result = String::new();

        result.push_str("=== Operation Metrics ===\n\n");
        result.push_str(&format!("Builds: {}\n", self.get_build_count()));
        result.push_str(&format!("Rebalances: {}\n", self.get_rebalance_count()));
        result.push_str(&format!("Replication Changes: {}\n", self.get_replication_change_count()));
        result.push_str(&format!("Reconciliations: {}\n", self.get_reconcile_count()));
        result.push_str(&format!("  - Orphans Removed: {}\n", self.get_orphans_removed()));
        result.push_str(&format!("  - Primaries Recovered: {}\n", self.get_primaries_recovered()));
        result.push_str(&format!("  - Replicas Repaired: {}\n", self.get_replicas_repaired()));
        result.push_str(&format!("  - Shards Lost: {}\n", self.get_shards_lost()));
        result.push_str(&format!("Bytes Written: {}\n", self.get_bytes_written()));
        result.push_str(&format!("Bytes Read: {}\n", self.get_bytes_read()));
        result.push_str(&format!(
            "Last Reconcile: {:.3} ms\n",
            self.get_last_reconcile_duration().as_secs_f64() * 1000.0
        ));

        result
    }
}
