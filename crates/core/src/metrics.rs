use std::sync::atomic::{AtomicU64, Ordering};

/// Lightweight counters for decode jobs and scratch-memory placement.
///
/// # Example
/// ```rust
/// use vdec_core::metrics::DecoderMetrics;
///
/// let metrics = DecoderMetrics::default();
/// metrics.job_dispatched();
/// metrics.job_completed(false);
/// assert_eq!(metrics.snapshot().failed, 1);
/// ```
#[derive(Debug, Default)]
pub struct DecoderMetrics {
    dispatched: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    hangs: AtomicU64,
    programming_errors: AtomicU64,
    power_failures: AtomicU64,
    recoveries: AtomicU64,
    fast_pool_hits: AtomicU64,
    fast_pool_fallbacks: AtomicU64,
    done_queue_overflows: AtomicU64,
}

impl DecoderMetrics {
    pub fn job_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a finished job; `ok` selects the success or failure bucket.
    pub fn job_completed(&self, ok: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !ok {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn hang(&self) {
        self.hangs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn programming_error(&self) {
        self.programming_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn power_failure(&self) {
        self.power_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn recovery(&self) {
        self.recoveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fast_pool_hit(&self) {
        self.fast_pool_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn fast_pool_fallback(&self) {
        self.fast_pool_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn done_queue_overflow(&self) {
        self.done_queue_overflows.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            hangs: self.hangs.load(Ordering::Relaxed),
            programming_errors: self.programming_errors.load(Ordering::Relaxed),
            power_failures: self.power_failures.load(Ordering::Relaxed),
            recoveries: self.recoveries.load(Ordering::Relaxed),
            fast_pool_hits: self.fast_pool_hits.load(Ordering::Relaxed),
            fast_pool_fallbacks: self.fast_pool_fallbacks.load(Ordering::Relaxed),
            done_queue_overflows: self.done_queue_overflows.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`DecoderMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub dispatched: u64,
    pub completed: u64,
    pub failed: u64,
    pub hangs: u64,
    pub programming_errors: u64,
    pub power_failures: u64,
    pub recoveries: u64,
    pub fast_pool_hits: u64,
    pub fast_pool_fallbacks: u64,
    pub done_queue_overflows: u64,
}
