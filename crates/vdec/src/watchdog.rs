//! Per-job hang detection.
//!
//! One timer thread per device. A job is armed before the hardware starts and
//! claimed exactly once, by whichever of the interrupt path, the timer or the
//! dispatcher's error path gets to the armed slot first.
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use tracing::debug;

/// Identifier of one dispatched decode job. Never zero.
pub type JobId = u64;

const DISARMED: JobId = 0;

pub(crate) type ExpiryHandler = Arc<dyn Fn(JobId) + Send + Sync>;

struct TimerState {
    deadline: Option<(JobId, Instant)>,
    shutdown: bool,
}

struct Shared {
    armed: AtomicU64,
    timer: Mutex<TimerState>,
    wake: Condvar,
}

impl Shared {
    fn claim(&self, job: JobId) -> bool {
        job != DISARMED
            && self
                .armed
                .compare_exchange(job, DISARMED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}

pub(crate) struct Watchdog {
    shared: Arc<Shared>,
    handler: ExpiryHandler,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Watchdog {
    /// Timer state without a thread; call [`Watchdog::start`] to begin firing.
    pub(crate) fn new(handler: ExpiryHandler) -> Self {
        Self {
            shared: Arc::new(Shared {
                armed: AtomicU64::new(DISARMED),
                timer: Mutex::new(TimerState {
                    deadline: None,
                    shutdown: false,
                }),
                wake: Condvar::new(),
            }),
            handler,
            thread: Mutex::new(None),
        }
    }

    pub(crate) fn start(&self) -> std::io::Result<()> {
        let mut slot = self.thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        let shared = self.shared.clone();
        let handler = self.handler.clone();
        let handle = thread::Builder::new()
            .name("vdec-watchdog".into())
            .spawn(move || run_timer(&shared, &handler))?;
        *slot = Some(handle);
        Ok(())
    }

    pub(crate) fn arm(&self, job: JobId, timeout: Duration) {
        self.shared.armed.store(job, Ordering::Release);
        let mut timer = self.shared.timer.lock();
        timer.deadline = Some((job, Instant::now() + timeout));
        self.shared.wake.notify_all();
    }

    /// Disarm `job`; `true` when the caller won the claim.
    pub(crate) fn cancel(&self, job: JobId) -> bool {
        if !self.shared.claim(job) {
            return false;
        }
        let mut timer = self.shared.timer.lock();
        if timer.deadline.is_some_and(|(armed, _)| armed == job) {
            timer.deadline = None;
        }
        true
    }

    /// Claim whatever job is armed, if any.
    pub(crate) fn claim_current(&self) -> Option<JobId> {
        let job = self.shared.armed.load(Ordering::Acquire);
        self.cancel(job).then_some(job)
    }

    /// Expire the armed job immediately on the calling thread.
    pub(crate) fn expire_now(&self) -> Option<JobId> {
        let job = self.claim_current()?;
        (self.handler)(job);
        Some(job)
    }

    /// Stop the timer thread and wait for it. Must not run on the timer thread.
    pub(crate) fn shutdown(&self) {
        self.signal_shutdown();
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
    }

    fn signal_shutdown(&self) {
        let mut timer = self.shared.timer.lock();
        timer.shutdown = true;
        self.shared.wake.notify_all();
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        // The last owner may be the timer thread itself, so never join here.
        self.signal_shutdown();
    }
}

fn run_timer(shared: &Shared, handler: &ExpiryHandler) {
    let mut timer = shared.timer.lock();
    loop {
        if timer.shutdown {
            break;
        }
        match timer.deadline {
            None => shared.wake.wait(&mut timer),
            Some((job, at)) if Instant::now() >= at => {
                timer.deadline = None;
                if shared.claim(job) {
                    debug!(job, "watchdog expired");
                    MutexGuard::unlocked(&mut timer, || handler(job));
                }
            }
            Some((_, at)) => {
                shared.wake.wait_until(&mut timer, at);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Barrier, atomic::AtomicUsize};

    fn counting() -> (ExpiryHandler, Arc<AtomicUsize>) {
        let fired = Arc::new(AtomicUsize::new(0));
        let count = fired.clone();
        let handler: ExpiryHandler = Arc::new(move |_| {
            count.fetch_add(1, Ordering::SeqCst);
        });
        (handler, fired)
    }

    #[test]
    fn timer_fires_after_timeout() {
        let (handler, fired) = counting();
        let dog = Watchdog::new(handler);
        dog.start().expect("start");
        dog.arm(1, Duration::from_millis(10));
        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(!dog.cancel(1));
        dog.shutdown();
    }

    #[test]
    fn cancel_before_expiry_suppresses_the_handler() {
        let (handler, fired) = counting();
        let dog = Watchdog::new(handler);
        dog.start().expect("start");
        dog.arm(7, Duration::from_millis(20));
        assert!(dog.cancel(7));
        assert!(!dog.cancel(7));
        thread::sleep(Duration::from_millis(60));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(dog.expire_now(), None);
        dog.shutdown();
    }

    #[test]
    fn stale_job_cannot_be_cancelled() {
        let (handler, _) = counting();
        let dog = Watchdog::new(handler);
        dog.arm(2, Duration::from_secs(60));
        assert!(!dog.cancel(1));
        assert_eq!(dog.claim_current(), Some(2));
        assert_eq!(dog.claim_current(), None);
    }

    #[test]
    fn concurrent_claims_have_one_winner() {
        for round in 1..=50 {
            let (handler, fired) = counting();
            let dog = Arc::new(Watchdog::new(handler));
            dog.arm(round, Duration::from_secs(60));
            let barrier = Arc::new(Barrier::new(2));
            let expirer = {
                let dog = dog.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    dog.expire_now().is_some()
                })
            };
            barrier.wait();
            let cancelled = dog.claim_current().is_some();
            let expired = expirer.join().expect("expirer");
            assert!(cancelled ^ expired);
            assert_eq!(fired.load(Ordering::SeqCst), usize::from(expired));
        }
    }
}
