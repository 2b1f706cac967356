//! Writer metrics for observability
//!
//! Counters shared between a writer's producer side and its background
//! worker, useful for detecting buffer overflow and delivery trouble.

use std::sync::atomic::{AtomicU64, Ordering};

/// Metrics for one writer
///
/// # Example
///
/// ```
/// use rust_logmanager::WriterMetrics;
///
/// let metrics = WriterMetrics::new();
///
/// metrics.record_accepted();
/// metrics.record_dropped();
///
/// assert_eq!(metrics.accepted_count(), 1);
/// assert_eq!(metrics.dropped_count(), 1);
/// ```
#[derive(Debug)]
pub struct WriterMetrics {
    /// Events accepted into the writer's buffer
    accepted: AtomicU64,

    /// Events dropped because the buffer was full or the batch was discarded
    dropped: AtomicU64,

    /// Events written or acknowledged by the destination
    delivered: AtomicU64,

    /// Failed write or delivery attempts
    failures: AtomicU64,

    /// Events put back into the buffer after a transient failure
    requeued: AtomicU64,

    /// Reconnections performed by the worker
    reconnects: AtomicU64,
}

impl WriterMetrics {
    /// Create a new metrics instance with all counters at zero
    pub const fn new() -> Self {
        Self {
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            requeued: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    #[inline]
    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn delivered_count(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn requeued_count(&self) -> u64 {
        self.requeued.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::Relaxed)
    }

    /// Record an accepted event, returning the previous count
    #[inline]
    pub fn record_accepted(&self) -> u64 {
        self.accepted.fetch_add(1, Ordering::Relaxed)
    }

    /// Record a dropped event, returning the previous count
    #[inline]
    pub fn record_dropped(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed)
    }

    /// Record `n` dropped events at once
    #[inline]
    pub fn record_dropped_many(&self, n: u64) -> u64 {
        self.dropped.fetch_add(n, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_delivered(&self, n: u64) -> u64 {
        self.delivered.fetch_add(n, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_failure(&self) -> u64 {
        self.failures.fetch_add(1, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_requeued(&self, n: u64) -> u64 {
        self.requeued.fetch_add(n, Ordering::Relaxed)
    }

    #[inline]
    pub fn record_reconnect(&self) -> u64 {
        self.reconnects.fetch_add(1, Ordering::Relaxed)
    }

    /// Get drop rate as a percentage (0.0 - 100.0)
    ///
    /// Returns 0.0 if nothing has been accepted or dropped.
    pub fn drop_rate(&self) -> f64 {
        let dropped = self.dropped_count() as f64;
        let total = self.accepted_count() as f64 + dropped;
        if total == 0.0 {
            0.0
        } else {
            (dropped / total) * 100.0
        }
    }
}

impl Default for WriterMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for WriterMetrics {
    /// Create a snapshot of the current metrics values
    fn clone(&self) -> Self {
        Self {
            accepted: AtomicU64::new(self.accepted_count()),
            dropped: AtomicU64::new(self.dropped_count()),
            delivered: AtomicU64::new(self.delivered_count()),
            failures: AtomicU64::new(self.failure_count()),
            requeued: AtomicU64::new(self.requeued_count()),
            reconnects: AtomicU64::new(self.reconnect_count()),
        }
    }
}
