//! Client sessions: formats, controls, buffer queues and streaming.
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};

use smallvec::SmallVec;
use tracing::{debug, warn};
use vdec_core::prelude::{
    ControlId, ControlMeta, ControlValue, Direction, Field, FourCc, FrameSizeStepwise,
    ImageFormatClass, PixFormat, VideoBuffer,
};

use crate::{
    codec::{CodecPrivate, StreamContext},
    controls::{BoundControls, ControlHandler, Request, RequestId},
    device::DeviceInner,
    error::DecodeError,
    formats::{CodedFormatDesc, QueueFeatures, default_coded_format},
    m2m::{BufferQueue, QueueSetup, QueuedBuffer},
    negotiator,
    rcb::{self, RcbSet, ScratchBuffer},
    tunables::DecoderTunables,
};

pub(crate) struct SessionState {
    pub(crate) id: u64,
    pub(crate) coded: PixFormat,
    pub(crate) coded_desc: &'static CodedFormatDesc,
    pub(crate) decoded: PixFormat,
    pub(crate) colmv_offset: u64,
    pub(crate) image_fmt: ImageFormatClass,
    pub(crate) rcb: RcbSet,
    pub(crate) controls: ControlHandler,
    pub(crate) source: BufferQueue,
    pub(crate) destination: BufferQueue,
    pub(crate) codec: CodecPrivate,
    pub(crate) completed_requests: Vec<RequestId>,
}

impl SessionState {
    /// Fresh state: coded format reset, then decoded format reset, then controls at their defaults.
    pub(crate) fn new(id: u64, tunables: &DecoderTunables) -> Self {
        let desc = default_coded_format();
        let mut state = Self {
            id,
            coded: PixFormat::new(desc.fourcc, 0, 0),
            coded_desc: desc,
            decoded: PixFormat::new(FourCc::NV12, 0, 0),
            colmv_offset: 0,
            image_fmt: ImageFormatClass::Any,
            rcb: RcbSet::default(),
            controls: ControlHandler::new(&[]),
            source: BufferQueue::new(Direction::Source, tunables),
            destination: BufferQueue::new(Direction::Destination, tunables),
            codec: CodecPrivate::default(),
            completed_requests: Vec::new(),
        };
        negotiator::reset_coded_format(&mut state);
        negotiator::reset_decoded_format(&mut state);
        state.controls = ControlHandler::new((state.coded_desc.controls)());
        // Defaults are committed without validation, as a freshly registered handler would.
        let defaults: Vec<_> = state
            .controls
            .metas()
            .filter(|m| m.format_aware)
            .map(|m| (m.id, m.default_value()))
            .collect();
        for (id, value) in defaults {
            negotiator::commit_control(&mut state, id, value);
        }
        state
    }

    fn queue(&self, direction: Direction) -> &BufferQueue {
        match direction {
            Direction::Source => &self.source,
            Direction::Destination => &self.destination,
        }
    }

    fn queue_mut(&mut self, direction: Direction) -> &mut BufferQueue {
        match direction {
            Direction::Source => &mut self.source,
            Direction::Destination => &mut self.destination,
        }
    }

    fn format(&self, direction: Direction) -> &PixFormat {
        match direction {
            Direction::Source => &self.coded,
            Direction::Destination => &self.decoded,
        }
    }

    pub(crate) fn next_source(&self) -> Option<&VideoBuffer> {
        self.source.next_ready()
    }

    pub(crate) fn next_destination(&self) -> Option<&VideoBuffer> {
        self.destination.next_ready()
    }

    /// Both queues streaming with a buffer waiting on each side.
    pub(crate) fn take_job_buffers(&mut self) -> Option<(QueuedBuffer, VideoBuffer)> {
        let ready = self.source.streaming
            && self.destination.streaming
            && self.next_source().is_some()
            && self.next_destination().is_some();
        if !ready {
            return None;
        }
        let source = self.source.pop_ready()?;
        let destination = self.destination.pop_ready()?;
        Some((source, destination.buffer))
    }

    /// Check declared plane sizes against the negotiated format.
    fn buf_prepare(&self, buffer: &mut VideoBuffer) -> Result<(), DecodeError> {
        let fmt = self.format(buffer.direction);
        if buffer.planes.len() < fmt.num_planes() {
            return Err(DecodeError::InvalidBuffer(format!(
                "buffer {} has {} planes, format needs {}",
                buffer.index,
                buffer.planes.len(),
                fmt.num_planes()
            )));
        }
        for (i, plane) in buffer.planes.iter().take(fmt.num_planes()).enumerate() {
            let needed = fmt.plane_size(i);
            if plane.length < needed {
                return Err(DecodeError::InvalidBuffer(format!(
                    "plane {i} of buffer {} holds {} bytes, {needed} needed",
                    buffer.index, plane.length
                )));
            }
        }
        match buffer.direction {
            Direction::Destination => {
                for (i, plane) in buffer.planes.iter_mut().enumerate() {
                    plane.bytesused = fmt.plane_size(i);
                }
            }
            Direction::Source => {
                if let Some(plane) = buffer.planes.iter().find(|p| p.bytesused > p.length) {
                    return Err(DecodeError::InvalidBuffer(format!(
                        "bytesused {} exceeds length {}",
                        plane.bytesused, plane.length
                    )));
                }
                buffer.field = Field::None;
            }
        }
        Ok(())
    }
}

pub(crate) struct SessionShared {
    pub(crate) id: u64,
    pub(crate) state: Mutex<SessionState>,
}

/// One client's view of the decoder.
///
/// Coded (source) buffers travel inside [`Request`]s that carry the per-frame
/// controls; decoded (destination) buffers are queued directly.
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
/// .build()
/// .unwrap();
/// let session = device.open_session();
/// let coded = session
///     .set_output_format(&PixFormat::new(FourCc::H264_SLICE, 1920, 1080))
///     .unwrap();
/// assert_eq!((coded.width, coded.height), (1920, 1088));
/// assert_eq!(session.decoded_format().fourcc, FourCc::NV12);
/// ```
pub struct Session {
    shared: Arc<SessionShared>,
    device: Arc<DeviceInner>,
}

impl Session {
    pub(crate) fn open(id: u64, device: Arc<DeviceInner>) -> Self {
        let state = SessionState::new(id, &device.tunables);
        Self {
            shared: Arc::new(SessionShared {
                id,
                state: Mutex::new(state),
            }),
            device,
        }
    }

    pub fn id(&self) -> u64 {
        self.shared.id
    }

    pub fn output_format(&self) -> PixFormat {
        self.shared.state.lock().coded.clone()
    }

    pub fn decoded_format(&self) -> PixFormat {
        self.shared.state.lock().decoded.clone()
    }

    /// Offset of motion-vector storage inside each decoded buffer.
    pub fn colmv_offset(&self) -> u64 {
        self.shared.state.lock().colmv_offset
    }

    pub fn image_format_class(&self) -> ImageFormatClass {
        self.shared.state.lock().image_fmt
    }

    pub fn output_queue_features(&self) -> QueueFeatures {
        self.shared.state.lock().source.features
    }

    pub fn try_output_format(&self, requested: &PixFormat) -> Result<PixFormat, DecodeError> {
        negotiator::try_output_format(requested).map(|(_, fmt)| fmt)
    }

    pub fn set_output_format(&self, requested: &PixFormat) -> Result<PixFormat, DecodeError> {
        negotiator::commit_output_format(&mut self.shared.state.lock(), requested)
    }

    pub fn try_decoded_format(&self, requested: &PixFormat) -> Result<PixFormat, DecodeError> {
        negotiator::try_decoded_format(&self.shared.state.lock(), requested)
    }

    pub fn set_decoded_format(&self, requested: &PixFormat) -> Result<PixFormat, DecodeError> {
        negotiator::commit_decoded_format(&mut self.shared.state.lock(), requested)
    }

    pub fn enum_output_format(&self, index: usize) -> Result<FourCc, DecodeError> {
        negotiator::enum_output_format(index)
    }

    /// Decoded formats usable with the current image-format class.
    pub fn enum_decoded_format(&self, index: usize) -> Result<FourCc, DecodeError> {
        negotiator::enum_decoded_format(&self.shared.state.lock(), index)
    }

    pub fn enum_framesizes(
        &self,
        fourcc: FourCc,
        index: usize,
    ) -> Result<FrameSizeStepwise, DecodeError> {
        negotiator::enum_framesizes(fourcc, index)
    }

    pub fn query_control(&self, id: ControlId) -> Option<ControlMeta> {
        self.shared.state.lock().controls.meta(id).copied()
    }

    pub fn control(&self, id: ControlId) -> Option<ControlValue> {
        self.shared.state.lock().controls.value(id).cloned()
    }

    pub fn try_control(&self, id: ControlId, value: &ControlValue) -> Result<(), DecodeError> {
        negotiator::try_control(&self.shared.state.lock(), id, value)
    }

    pub fn set_control(&self, id: ControlId, value: ControlValue) -> Result<(), DecodeError> {
        let mut state = self.shared.state.lock();
        negotiator::try_control(&state, id, &value)?;
        negotiator::commit_control(&mut state, id, value);
        Ok(())
    }

    /// Allocate `count` buffers on one queue; zero frees them.
    ///
    /// Returns the granted count and the minimum size of every plane.
    pub fn request_buffers(
        &self,
        direction: Direction,
        count: u32,
    ) -> Result<QueueSetup, DecodeError> {
        self.setup_queue(direction, count, None)
    }

    /// Allocate `count` buffers with client-chosen plane sizes.
    ///
    /// The sizes must cover every plane of the negotiated format and none may
    /// be smaller than what that format needs.
    pub fn request_buffers_sized(
        &self,
        direction: Direction,
        count: u32,
        plane_sizes: &[u64],
    ) -> Result<QueueSetup, DecodeError> {
        self.setup_queue(direction, count, Some(plane_sizes))
    }

    fn setup_queue(
        &self,
        direction: Direction,
        count: u32,
        requested: Option<&[u64]>,
    ) -> Result<QueueSetup, DecodeError> {
        let mut state = self.shared.state.lock();
        let fmt = state.format(direction);
        let plane_sizes: SmallVec<[u64; 3]> = match requested {
            Some(sizes) if count > 0 => {
                if sizes.len() != fmt.num_planes() {
                    return Err(DecodeError::InvalidBuffer(format!(
                        "{} plane sizes given, format has {} planes",
                        sizes.len(),
                        fmt.num_planes()
                    )));
                }
                if let Some((plane, (size, need))) = sizes
                    .iter()
                    .zip(fmt.planes.iter().map(|p| p.sizeimage))
                    .enumerate()
                    .find(|(_, (size, need))| **size < *need)
                {
                    return Err(DecodeError::InvalidBuffer(format!(
                        "plane {plane} size {size} below required {need}"
                    )));
                }
                sizes.iter().copied().collect()
            }
            _ => fmt.planes.iter().map(|p| p.sizeimage).collect(),
        };
        let count = state.queue_mut(direction).reqbufs(count)?;
        debug!(session = self.id(), ?direction, count, "buffers requested");
        Ok(QueueSetup { count, plane_sizes })
    }

    /// Queue a decoded-picture buffer.
    pub fn queue_buffer(&self, mut buffer: VideoBuffer) -> Result<(), DecodeError> {
        {
            let mut state = self.shared.state.lock();
            let queue = state.queue(buffer.direction);
            if queue.requires_requests {
                return Err(DecodeError::InvalidRequest(
                    "coded buffers must be queued through a request".into(),
                ));
            }
            queue.check_index(buffer.index)?;
            state.buf_prepare(&mut buffer)?;
            state
                .queue_mut(buffer.direction)
                .push(QueuedBuffer::plain(buffer));
        }
        self.device.schedule(&self.shared)
    }

    /// Queue a coded buffer together with the controls that decode it.
    pub fn queue_request(&self, request: Request) -> Result<(), DecodeError> {
        request.validate()?;
        let Request {
            id,
            controls,
            buffers,
        } = request;
        let Some(mut buffer) = buffers.into_iter().next() else {
            return Err(DecodeError::InvalidRequest(format!("request {id} has no buffer")));
        };
        {
            let mut state = self.shared.state.lock();
            for (control, value) in &controls {
                negotiator::try_control(&state, *control, value)?;
            }
            state.source.check_index(buffer.index)?;
            state.buf_prepare(&mut buffer)?;
            state.source.push(QueuedBuffer {
                buffer,
                request: Some(BoundControls { id, controls }),
            });
        }
        self.device.schedule(&self.shared)
    }

    /// Next finished buffer of `direction`, without waiting.
    pub fn dequeue_buffer(&self, direction: Direction) -> Option<VideoBuffer> {
        let done = self.shared.state.lock().queue(direction).done();
        done.pop()
    }

    pub fn dequeue_buffer_timeout(
        &self,
        direction: Direction,
        timeout: Duration,
    ) -> Option<VideoBuffer> {
        // Wait outside the session lock so the scheduler can complete the job.
        let done = self.shared.state.lock().queue(direction).done();
        done.pop_timeout(timeout)
    }

    pub fn stream_on(&self, direction: Direction) -> Result<(), DecodeError> {
        {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            if state.queue(direction).streaming {
                return Ok(());
            }
            if direction == Direction::Source {
                let backends = self.device.rcb_backends();
                let (width, height) = (state.decoded.width, state.decoded.height);
                rcb::allocate(&backends, &mut state.rcb, width, height)?;
                let started = state.coded_desc.ops.start(StreamContext {
                    coherent: &*self.device.coherent,
                    coded: &state.coded,
                    decoded: &state.decoded,
                    private: &mut state.codec,
                });
                if let Err(err) = started {
                    warn!(session = state.id, error = %err, "codec start failed");
                    rcb::release(&backends, &mut state.rcb);
                    return Err(err);
                }
            }
            state.queue_mut(direction).start_streaming();
            debug!(session = state.id, ?direction, "streaming on");
        }
        self.device.schedule(&self.shared)
    }

    /// Stop a queue, waiting for this session's in-flight job.
    ///
    /// Buffers still waiting on the queue are returned with errors.
    pub fn stream_off(&self, direction: Direction) -> Result<(), DecodeError> {
        {
            let mut state = self.shared.state.lock();
            let queue = state.queue_mut(direction);
            if !queue.streaming {
                return Ok(());
            }
            queue.streaming = false;
        }
        self.device.status.drain(self.shared.id);

        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if direction == Direction::Source {
            state.coded_desc.ops.stop(StreamContext {
                coherent: &*self.device.coherent,
                coded: &state.coded,
                decoded: &state.decoded,
                private: &mut state.codec,
            });
            rcb::release(&self.device.rcb_backends(), &mut state.rcb);
        }
        let metrics = &self.device.metrics;
        let returned = state.queue_mut(direction).return_all(metrics);
        state.completed_requests.extend(returned);
        debug!(session = state.id, ?direction, "streaming off");
        Ok(())
    }

    pub fn is_streaming(&self, direction: Direction) -> bool {
        self.shared.state.lock().queue(direction).streaming
    }

    /// Ids of requests whose job finished or was cancelled since the last call.
    pub fn take_completed_requests(&self) -> Vec<RequestId> {
        std::mem::take(&mut self.shared.state.lock().completed_requests)
    }

    /// Scratch buffers currently held, in purpose order.
    pub fn scratch_buffers(&self) -> Vec<ScratchBuffer> {
        self.shared.state.lock().rcb.iter().copied().collect()
    }

    pub fn allocated_buffers(&self, direction: Direction) -> u32 {
        self.shared.state.lock().queue(direction).allocated()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for direction in [Direction::Source, Direction::Destination] {
            if let Err(err) = self.stream_off(direction) {
                warn!(session = self.shared.id, error = %err, "stream off on close failed");
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("id", &self.shared.id).finish()
    }
}
