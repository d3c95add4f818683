//! Single-flight job dispatch and completion.
//!
//! A worker thread owns the job slot. Sessions ask to be scheduled; the
//! interrupt path and the watchdog report completions. Both arrive as
//! messages, so the slot has exactly one mutator and a job token is consumed
//! exactly once.
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::{Arc, Weak, mpsc::Receiver},
    time::{Duration, Instant},
};

use tracing::{debug, error, warn};
use vdec_core::prelude::VideoBuffer;

use crate::{
    codec::{DoneContext, RunContext},
    device::DeviceInner,
    error::{JobFailure, JobResult},
    m2m::QueuedBuffer,
    negotiator,
    session::SessionShared,
    watchdog::JobId,
};

/// Where the device is in the life of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobState {
    #[default]
    Idle,
    /// The hardware has been started and completion is pending.
    Running,
    /// The completion claimant won; buffers are being handed back.
    Finishing,
}

pub(crate) enum Message {
    Schedule(Weak<SessionShared>),
    Finish { job: JobId, result: JobResult },
    Shutdown,
}

/// The one in-flight job. Not `Clone`; finishing consumes it.
pub(crate) struct JobToken {
    id: JobId,
    session: Arc<SessionShared>,
    source: QueuedBuffer,
    destination: VideoBuffer,
    powered: bool,
}

#[derive(Debug, Default)]
struct Status {
    state: JobState,
    session: Option<u64>,
    job: Option<JobId>,
}

/// Scheduler state mirrored for other threads to observe and wait on.
#[derive(Debug, Default)]
pub(crate) struct SchedulerStatus {
    status: Mutex<Status>,
    changed: Condvar,
}

impl SchedulerStatus {
    fn set(&self, state: JobState, session: Option<u64>, job: Option<JobId>) {
        let mut status = self.status.lock();
        *status = Status {
            state,
            session,
            job,
        };
        self.changed.notify_all();
    }

    /// Move `job` from `Running` to `Finishing` once its completion has been claimed.
    pub(crate) fn mark_finishing(&self, job: JobId) {
        let mut status = self.status.lock();
        if status.state == JobState::Running && status.job == Some(job) {
            status.state = JobState::Finishing;
            self.changed.notify_all();
        }
    }

    pub(crate) fn state(&self) -> JobState {
        self.status.lock().state
    }

    pub(crate) fn job(&self) -> Option<JobId> {
        self.status.lock().job
    }

    /// Wait until the scheduler reaches `state`; `false` on timeout.
    pub(crate) fn wait_for(&self, state: JobState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while status.state != state {
            if self.changed.wait_until(&mut status, deadline).timed_out() {
                return status.state == state;
            }
        }
        true
    }

    /// Block until no job of `session` is in flight.
    pub(crate) fn drain(&self, session: u64) {
        let mut status = self.status.lock();
        while status.state != JobState::Idle && status.session == Some(session) {
            self.changed.wait(&mut status);
        }
    }
}

enum Slot {
    Idle,
    Running(JobToken),
}

enum Dispatch {
    NotReady,
    Running(JobToken),
    Failed(JobToken, JobResult),
}

pub(crate) struct Scheduler {
    device: Arc<DeviceInner>,
    rx: Receiver<Message>,
    pending: VecDeque<Weak<SessionShared>>,
    slot: Slot,
    next_job: JobId,
}

impl Scheduler {
    pub(crate) fn new(device: Arc<DeviceInner>, rx: Receiver<Message>) -> Self {
        Self {
            device,
            rx,
            pending: VecDeque::new(),
            slot: Slot::Idle,
            next_job: 1,
        }
    }

    pub(crate) fn run(mut self) {
        while let Ok(message) = self.rx.recv() {
            match message {
                Message::Schedule(session) => self.enqueue(session),
                Message::Finish { job, result } => self.on_finish(job, result),
                Message::Shutdown => break,
            }
            self.pump();
        }
        self.abandon();
    }

    fn enqueue(&mut self, session: Weak<SessionShared>) {
        if !self.pending.iter().any(|s| s.ptr_eq(&session)) {
            self.pending.push_back(session);
        }
    }

    /// Start jobs until one is in flight or nobody is ready.
    fn pump(&mut self) {
        while matches!(self.slot, Slot::Idle) {
            let Some(session) = self.pending.pop_front() else {
                break;
            };
            let Some(session) = session.upgrade() else {
                continue;
            };
            match self.dispatch(session) {
                Dispatch::NotReady => {}
                Dispatch::Running(token) => self.slot = Slot::Running(token),
                Dispatch::Failed(token, result) => self.finish(token, result),
            }
        }
    }

    fn dispatch(&mut self, session: Arc<SessionShared>) -> Dispatch {
        let device = &*self.device;
        let mut guard = session.state.lock();
        let state = &mut *guard;
        let Some((source, mut destination)) = state.take_job_buffers() else {
            return Dispatch::NotReady;
        };
        let id = self.next_job;
        self.next_job += 1;
        device.metrics.job_dispatched();

        destination.copy_metadata_from(&source.buffer);
        if let Some(request) = &source.request {
            for (control, value) in &request.controls {
                negotiator::commit_control(state, *control, value.clone());
            }
        }
        let mut token = JobToken {
            id,
            session: session.clone(),
            source,
            destination,
            powered: false,
        };

        if let Err(err) = device.power.resume() {
            error!(job = id, error = %err, "powering up the decoder failed");
            device.metrics.power_failure();
            device.status.set(JobState::Finishing, Some(state.id), Some(id));
            return Dispatch::Failed(token, JobResult::Error(JobFailure::PowerOn));
        }
        token.powered = true;

        device.watchdog.arm(id, device.tunables.watchdog_timeout());
        device.status.set(JobState::Running, Some(state.id), Some(id));
        let ops = state.coded_desc.ops;
        let ran = ops.run(RunContext {
            regs: &*device.regs,
            controls: &state.controls,
            coded: &state.coded,
            decoded: &state.decoded,
            colmv_offset: state.colmv_offset,
            rcb: &state.rcb,
            private: &mut state.codec,
            source: &token.source.buffer,
            destination: &token.destination,
        });
        match ran {
            Ok(()) => {
                debug!(job = id, session = state.id, codec = ops.name(), "job started");
                Dispatch::Running(token)
            }
            Err(err) => {
                error!(job = id, error = %err, "programming the decoder failed");
                device.metrics.programming_error();
                // Losing the cancel means a completion is already on its way.
                if device.watchdog.cancel(id) {
                    device.status.set(JobState::Finishing, Some(state.id), Some(id));
                    Dispatch::Failed(token, JobResult::Error(JobFailure::Programming))
                } else {
                    Dispatch::Running(token)
                }
            }
        }
    }

    fn on_finish(&mut self, job: JobId, result: JobResult) {
        match std::mem::replace(&mut self.slot, Slot::Idle) {
            Slot::Running(token) if token.id == job => self.finish(token, result),
            Slot::Running(token) => {
                warn!(job, running = token.id, "completion for a job that is not in flight");
                self.slot = Slot::Running(token);
            }
            Slot::Idle => warn!(job, "completion with no job in flight"),
        }
    }

    fn finish(&mut self, token: JobToken, result: JobResult) {
        let device = &*self.device;
        let JobToken {
            id,
            session,
            source,
            destination,
            powered,
        } = token;
        device.status.set(JobState::Finishing, Some(session.id), Some(id));
        let ok = result.is_ok();
        {
            let mut guard = session.state.lock();
            let state = &mut *guard;
            if let Some(request) = &source.request {
                state.completed_requests.push(request.id);
            }
            state.coded_desc.ops.done(
                DoneContext {
                    private: &mut state.codec,
                    source: &source.buffer,
                    destination: &destination,
                },
                result,
            );
            if powered {
                device.power.mark_last_busy();
                device.power.put_autosuspend();
            }
            state.source.buf_done(source.buffer, ok, &device.metrics);
            state.destination.buf_done(destination, ok, &device.metrics);
        }
        device.status.set(JobState::Idle, None, None);
        device.metrics.job_completed(ok);
        debug!(job = id, ?result, "job finished");
        self.enqueue(Arc::downgrade(&session));
    }

    fn abandon(&mut self) {
        if let Slot::Running(token) = std::mem::replace(&mut self.slot, Slot::Idle) {
            let _ = self.device.watchdog.claim_current();
            warn!(job = token.id, "decoder shut down with a job in flight");
            self.finish(token, JobResult::Error(JobFailure::Hang));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claimed_job_reports_finishing() {
        let status = SchedulerStatus::default();
        status.set(JobState::Running, Some(1), Some(3));
        status.mark_finishing(4);
        assert_eq!(status.state(), JobState::Running);
        status.mark_finishing(3);
        assert_eq!(status.state(), JobState::Finishing);
        assert_eq!(status.job(), Some(3));
        assert!(status.wait_for(JobState::Finishing, Duration::from_millis(1)));
    }

    #[test]
    fn idle_status_ignores_late_claims() {
        let status = SchedulerStatus::default();
        status.mark_finishing(1);
        assert_eq!(status.state(), JobState::Idle);
        assert_eq!(status.job(), None);
    }
}
