//! Runtime power management of the decoder block.
use parking_lot::Mutex;
use std::{
    sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    time::Duration,
};

use crate::PlatformError;

pub trait PowerControl: Send + Sync {
    /// Take a usage reference, powering the block up if needed. May block.
    fn resume(&self) -> Result<(), PlatformError>;

    /// Restart the autosuspend countdown.
    fn mark_last_busy(&self);

    /// Drop a usage reference; the block suspends after the autosuspend delay.
    fn put_autosuspend(&self);

    fn set_autosuspend_delay(&self, delay: Duration);
}

/// Usage-counting power domain with resume-failure injection.
///
/// # Example
/// ```rust
/// use vdec_platform::prelude::*;
///
/// let power = SimPower::default();
/// power.resume().unwrap();
/// power.put_autosuspend();
/// assert_eq!(power.usage(), 0);
/// power.fail_next_resume();
/// assert!(power.resume().is_err());
/// assert_eq!(power.usage(), 0);
/// ```
#[derive(Debug, Default)]
pub struct SimPower {
    usage: AtomicI64,
    resumes: AtomicU64,
    busy_marks: AtomicU64,
    fail_next: AtomicBool,
    delay: Mutex<Duration>,
}

impl SimPower {
    pub fn fail_next_resume(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Outstanding usage references.
    pub fn usage(&self) -> i64 {
        self.usage.load(Ordering::SeqCst)
    }

    pub fn resumes(&self) -> u64 {
        self.resumes.load(Ordering::SeqCst)
    }

    pub fn busy_marks(&self) -> u64 {
        self.busy_marks.load(Ordering::SeqCst)
    }

    pub fn autosuspend_delay(&self) -> Duration {
        *self.delay.lock()
    }
}

impl PowerControl for SimPower {
    fn resume(&self) -> Result<(), PlatformError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PlatformError::PowerOn("simulated resume failure".into()));
        }
        self.usage.fetch_add(1, Ordering::SeqCst);
        self.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn mark_last_busy(&self) {
        self.busy_marks.fetch_add(1, Ordering::SeqCst);
    }

    fn put_autosuspend(&self) {
        let prev = self.usage.fetch_sub(1, Ordering::SeqCst);
        if prev <= 0 {
            tracing::warn!(usage = prev - 1, "power usage count underflow");
        }
    }

    fn set_autosuspend_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}
