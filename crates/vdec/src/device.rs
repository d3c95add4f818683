//! One decoder hardware instance and its completion paths.
use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, error, info, warn};
use vdec_core::prelude::{DecoderMetrics, MetricsSnapshot};
use vdec_platform::prelude::{
    CoherentAllocator, FastPool, PowerControl, RegisterIo, TranslationDomain,
};

use crate::{
    error::{DecodeError, JobFailure, JobResult},
    rcb::RcbBackends,
    recovery, regs,
    scheduler::{JobState, Message, Scheduler, SchedulerStatus},
    session::{Session, SessionShared},
    tunables::{DecoderTunables, decoder_tunables},
    watchdog::{ExpiryHandler, JobId, Watchdog},
};

/// Identification strings reported to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Capabilities {
    pub driver: &'static str,
    pub card: &'static str,
    pub bus_info: &'static str,
}

pub const CAPABILITIES: Capabilities = Capabilities {
    driver: "vdec",
    card: "vdec",
    bus_info: "platform:vdec",
};

/// Assembles a [`Device`] from its platform backends.
///
/// # Example
/// ```rust
/// use std::sync::Arc;
/// use vdec::prelude::*;
///
/// let device = DeviceBuilder::new(
///     Arc::new(RecordingRegisters::default()),
///     Arc::new(SimCoherent::new(0x8000_0000)),
///     Arc::new(SimPower::default()),
/// )
/// .translation(Arc::new(SimDomain::new("live", 0x1000)))
/// .build()
/// .unwrap();
/// assert_eq!(device.capabilities().bus_info, "platform:vdec");
/// assert_eq!(device.scheduler_state(), JobState::Idle);
/// ```
pub struct DeviceBuilder {
    regs: Arc<dyn RegisterIo>,
    coherent: Arc<dyn CoherentAllocator>,
    power: Arc<dyn PowerControl>,
    domain: Option<Arc<dyn TranslationDomain>>,
    empty_domain: Option<Arc<dyn TranslationDomain>>,
    pool: Option<Arc<dyn FastPool>>,
    tunables: Option<DecoderTunables>,
}

impl DeviceBuilder {
    pub fn new(
        regs: Arc<dyn RegisterIo>,
        coherent: Arc<dyn CoherentAllocator>,
        power: Arc<dyn PowerControl>,
    ) -> Self {
        Self {
            regs,
            coherent,
            power,
            domain: None,
            empty_domain: None,
            pool: None,
            tunables: None,
        }
    }

    /// Live translation domain the device is attached to.
    pub fn translation(mut self, domain: Arc<dyn TranslationDomain>) -> Self {
        self.domain = Some(domain);
        self
    }

    /// Domain with no mappings, bounced through to reset the translation unit.
    pub fn empty_domain(mut self, domain: Arc<dyn TranslationDomain>) -> Self {
        self.empty_domain = Some(domain);
        self
    }

    pub fn fast_pool(mut self, pool: Arc<dyn FastPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// Per-device tunables; defaults to the process-wide ones.
    pub fn tunables(mut self, tunables: DecoderTunables) -> Self {
        self.tunables = Some(tunables);
        self
    }

    pub fn build(self) -> Result<Device, DecodeError> {
        let tunables = self.tunables.unwrap_or_else(decoder_tunables).sanitized();
        match (&self.domain, &self.empty_domain) {
            (None, _) => info!("no translation domain, scratch buffers use bus addresses"),
            (Some(_), None) => info!("no empty translation domain, fault recovery disabled"),
            (Some(_), Some(_)) => {}
        }
        if self.pool.is_none() {
            info!("no fast memory pool, scratch buffers use coherent memory");
        }
        self.power.set_autosuspend_delay(tunables.autosuspend_delay());

        let (sender, rx) = mpsc::channel();
        let inner = Arc::new_cyclic(|weak: &Weak<DeviceInner>| {
            let weak = weak.clone();
            let on_expiry: ExpiryHandler = Arc::new(move |job| {
                if let Some(device) = weak.upgrade() {
                    device.on_watchdog(job);
                }
            });
            DeviceInner {
                regs: self.regs,
                coherent: self.coherent,
                power: self.power,
                domain: self.domain,
                empty_domain: self.empty_domain,
                pool: self.pool,
                tunables,
                metrics: DecoderMetrics::default(),
                watchdog: Watchdog::new(on_expiry),
                status: SchedulerStatus::default(),
                sender,
                next_session: AtomicU64::new(1),
            }
        });
        inner.watchdog.start()?;
        let scheduler = Scheduler::new(inner.clone(), rx);
        let worker = match thread::Builder::new()
            .name("vdec-sched".into())
            .spawn(move || scheduler.run())
        {
            Ok(worker) => worker,
            Err(err) => {
                inner.watchdog.shutdown();
                return Err(err.into());
            }
        };
        Ok(Device {
            inner,
            worker: Some(worker),
        })
    }
}

pub(crate) struct DeviceInner {
    pub(crate) regs: Arc<dyn RegisterIo>,
    pub(crate) coherent: Arc<dyn CoherentAllocator>,
    pub(crate) power: Arc<dyn PowerControl>,
    pub(crate) domain: Option<Arc<dyn TranslationDomain>>,
    pub(crate) empty_domain: Option<Arc<dyn TranslationDomain>>,
    pub(crate) pool: Option<Arc<dyn FastPool>>,
    pub(crate) tunables: DecoderTunables,
    pub(crate) metrics: DecoderMetrics,
    pub(crate) watchdog: Watchdog,
    pub(crate) status: SchedulerStatus,
    sender: Sender<Message>,
    next_session: AtomicU64,
}

impl DeviceInner {
    pub(crate) fn rcb_backends(&self) -> RcbBackends<'_> {
        RcbBackends {
            pool: self.pool.as_deref(),
            domain: self.domain.as_deref(),
            coherent: &*self.coherent,
            pool_align: self.tunables.fast_pool_align,
            metrics: &self.metrics,
        }
    }

    /// Ask the scheduler to look at `session` for runnable work.
    pub(crate) fn schedule(&self, session: &Arc<SessionShared>) -> Result<(), DecodeError> {
        self.sender
            .send(Message::Schedule(Arc::downgrade(session)))
            .map_err(|_| DecodeError::DeviceGone)
    }

    fn complete(&self, job: JobId, result: JobResult) {
        if self.sender.send(Message::Finish { job, result }).is_err() {
            warn!(job, "scheduler gone, dropping completion");
        }
    }

    fn recover(&self) {
        recovery::restore_translation(
            self.domain.as_deref(),
            self.empty_domain.as_deref(),
            &self.metrics,
        );
    }

    fn handle_interrupt(&self) -> bool {
        let status = self.regs.read(regs::REG_STA_INT);
        let result = if status & regs::STA_INT_DEC_RDY_STA != 0 {
            JobResult::Done
        } else {
            JobResult::Error(JobFailure::Hardware)
        };
        let need_reset = !result.is_ok() || status & regs::STA_INT_SOFTRESET_RDY != 0;
        self.regs.write(regs::REG_STA_INT, 0);
        let Some(job) = self.watchdog.claim_current() else {
            debug!(status, "interrupt without an armed job");
            return false;
        };
        self.status.mark_finishing(job);
        debug!(job, status, ?result, "decode interrupt");
        // Recovery belongs to whoever claimed the job.
        if need_reset {
            self.recover();
        }
        self.complete(job, result);
        true
    }

    fn on_watchdog(&self, job: JobId) {
        error!(job, "frame processing timed out");
        self.regs.write(regs::REG_IMPORTANT_EN, regs::DEC_IRQ_DISABLE);
        self.regs.write(regs::REG_DEC_E, 0);
        self.metrics.hang();
        self.status.mark_finishing(job);
        self.recover();
        self.complete(job, JobResult::Error(JobFailure::Hang));
    }
}

/// A decoder hardware instance.
///
/// Owns the scheduler worker and the watchdog timer; dropping the device stops
/// both. Sessions opened from it outlive it but can no longer decode.
pub struct Device {
    inner: Arc<DeviceInner>,
    worker: Option<JoinHandle<()>>,
}

impl Device {
    pub fn open_session(&self) -> Session {
        let id = self.inner.next_session.fetch_add(1, Ordering::Relaxed);
        Session::open(id, self.inner.clone())
    }

    /// Interrupt entry point; `true` when the interrupt completed the running job.
    pub fn handle_interrupt(&self) -> bool {
        self.inner.handle_interrupt()
    }

    /// Fire the watchdog now for whatever job is armed; `true` when one was expired.
    pub fn expire_watchdog(&self) -> bool {
        self.inner.watchdog.expire_now().is_some()
    }

    pub fn capabilities(&self) -> Capabilities {
        CAPABILITIES
    }

    pub fn tunables(&self) -> DecoderTunables {
        self.inner.tunables
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    pub fn scheduler_state(&self) -> JobState {
        self.inner.status.state()
    }

    /// Job currently running or finishing.
    pub fn current_job(&self) -> Option<JobId> {
        self.inner.status.job()
    }

    /// Block until the scheduler reaches `state`; `false` on timeout.
    pub fn wait_for_state(&self, state: JobState, timeout: Duration) -> bool {
        self.inner.status.wait_for(state, timeout)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        let _ = self.inner.sender.send(Message::Shutdown);
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            error!("scheduler worker panicked");
        }
        self.inner.watchdog.shutdown();
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("tunables", &self.inner.tunables)
            .field("state", &self.inner.status.state())
            .finish()
    }
}
