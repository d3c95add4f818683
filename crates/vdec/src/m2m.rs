//! Memory-to-memory buffer queues, one per direction of a session.
use std::{collections::VecDeque, sync::Arc};

use smallvec::SmallVec;
use tracing::{debug, warn};
use vdec_core::prelude::{
    BufferFlags, BufferState, CompletionQueue, DecoderMetrics, Direction, VideoBuffer,
};

use crate::{
    controls::{BoundControls, RequestId},
    error::DecodeError,
    formats::QueueFeatures,
    tunables::DecoderTunables,
};

/// A buffer waiting for the hardware, with the request that carried it.
#[derive(Debug)]
pub(crate) struct QueuedBuffer {
    pub(crate) buffer: VideoBuffer,
    pub(crate) request: Option<BoundControls>,
}

impl QueuedBuffer {
    pub(crate) fn plain(buffer: VideoBuffer) -> Self {
        Self {
            buffer,
            request: None,
        }
    }
}

/// Plane count and minimum plane sizes a queue was set up with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSetup {
    pub count: u32,
    pub plane_sizes: SmallVec<[u64; 3]>,
}

pub(crate) struct BufferQueue {
    pub(crate) direction: Direction,
    allocated: u32,
    pub(crate) streaming: bool,
    pub(crate) requires_requests: bool,
    pub(crate) features: QueueFeatures,
    ready: VecDeque<QueuedBuffer>,
    done: Arc<CompletionQueue<VideoBuffer>>,
    sequence: u32,
    max_buffers: u32,
}

impl BufferQueue {
    pub(crate) fn new(direction: Direction, tunables: &DecoderTunables) -> Self {
        Self {
            direction,
            allocated: 0,
            streaming: false,
            requires_requests: direction == Direction::Source,
            features: QueueFeatures::NONE,
            ready: VecDeque::new(),
            done: Arc::new(CompletionQueue::new(tunables.done_queue_depth)),
            sequence: 0,
            max_buffers: tunables.max_buffers,
        }
    }

    /// A queue with buffers allocated pins the format it was set up with.
    pub(crate) fn is_busy(&self) -> bool {
        self.allocated > 0
    }

    pub(crate) fn allocated(&self) -> u32 {
        self.allocated
    }

    /// Allocate `count` buffers, capped at the configured maximum; zero frees them all.
    pub(crate) fn reqbufs(&mut self, count: u32) -> Result<u32, DecodeError> {
        if self.streaming {
            return Err(DecodeError::Busy("queue is streaming"));
        }
        self.ready.clear();
        // Finished buffers of the previous allocation are gone with it.
        let mut stale = 0usize;
        while self.done.pop().is_some() {
            stale += 1;
        }
        if stale > 0 {
            debug!(direction = ?self.direction, stale, "dropped undequeued buffers");
        }
        self.allocated = count.min(self.max_buffers);
        Ok(self.allocated)
    }

    pub(crate) fn check_index(&self, index: u32) -> Result<(), DecodeError> {
        if index >= self.allocated {
            return Err(DecodeError::InvalidBuffer(format!(
                "index {index} out of range ({} allocated)",
                self.allocated
            )));
        }
        if self.ready.iter().any(|q| q.buffer.index == index) {
            return Err(DecodeError::InvalidBuffer(format!(
                "buffer {index} is already queued"
            )));
        }
        Ok(())
    }

    pub(crate) fn push(&mut self, mut queued: QueuedBuffer) {
        queued.buffer.state = BufferState::Queued;
        self.ready.push_back(queued);
    }

    pub(crate) fn next_ready(&self) -> Option<&VideoBuffer> {
        self.ready.front().map(|q| &q.buffer)
    }

    pub(crate) fn pop_ready(&mut self) -> Option<QueuedBuffer> {
        self.ready.pop_front().map(|mut q| {
            q.buffer.state = BufferState::Active;
            q
        })
    }

    pub(crate) fn start_streaming(&mut self) {
        self.streaming = true;
        self.sequence = 0;
    }

    /// Hand a finished buffer back to the client.
    pub(crate) fn buf_done(
        &mut self,
        mut buffer: VideoBuffer,
        ok: bool,
        metrics: &DecoderMetrics,
    ) {
        buffer.state = if ok {
            BufferState::Done
        } else {
            BufferState::Error
        };
        if !ok {
            buffer.flags.0 |= BufferFlags::ERROR;
        }
        buffer.sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        if let Err(buffer) = self.done.push(buffer) {
            metrics.done_queue_overflow();
            warn!(
                direction = ?self.direction,
                index = buffer.index,
                "completion queue full, buffer dropped"
            );
        }
    }

    /// Return every waiting buffer with an error, collecting the ids of their requests.
    pub(crate) fn return_all(&mut self, metrics: &DecoderMetrics) -> Vec<RequestId> {
        let mut requests = Vec::new();
        while let Some(queued) = self.ready.pop_front() {
            if let Some(request) = queued.request {
                requests.push(request.id);
            }
            self.buf_done(queued.buffer, false, metrics);
        }
        requests
    }

    pub(crate) fn done(&self) -> Arc<CompletionQueue<VideoBuffer>> {
        self.done.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> BufferQueue {
        BufferQueue::new(Direction::Destination, &DecoderTunables::default())
    }

    #[test]
    fn reqbufs_caps_and_refuses_while_streaming() {
        let mut q = queue();
        assert_eq!(q.reqbufs(100).expect("reqbufs"), 32);
        assert!(q.is_busy());
        q.start_streaming();
        assert!(matches!(q.reqbufs(0), Err(DecodeError::Busy(_))));
    }

    #[test]
    fn rejects_out_of_range_and_double_queue() {
        let mut q = queue();
        q.reqbufs(2).expect("reqbufs");
        assert!(q.check_index(2).is_err());
        q.check_index(1).expect("index 1");
        q.push(QueuedBuffer::plain(VideoBuffer::new(1, Direction::Destination)));
        assert!(q.check_index(1).is_err());
    }

    #[test]
    fn return_all_marks_errors_in_order() {
        let metrics = DecoderMetrics::default();
        let mut q = queue();
        q.reqbufs(2).expect("reqbufs");
        q.push(QueuedBuffer::plain(VideoBuffer::new(0, Direction::Destination)));
        q.push(QueuedBuffer {
            buffer: VideoBuffer::new(1, Direction::Destination),
            request: Some(BoundControls {
                id: 9,
                controls: Vec::new(),
            }),
        });
        assert_eq!(q.return_all(&metrics), vec![9]);
        let done = q.done();
        for expected in 0..2 {
            let buf = done.pop().expect("returned buffer");
            assert_eq!(buf.index, expected);
            assert_eq!(buf.state, BufferState::Error);
            assert!(buf.flags.contains(BufferFlags::ERROR));
        }
        assert!(q.next_ready().is_none());
    }

    #[test]
    fn reqbufs_drops_undequeued_completions() {
        let metrics = DecoderMetrics::default();
        let mut q = queue();
        q.reqbufs(2).expect("reqbufs");
        q.buf_done(VideoBuffer::new(0, Direction::Destination), true, &metrics);
        q.buf_done(VideoBuffer::new(1, Direction::Destination), false, &metrics);
        let done = q.done();
        assert_eq!(done.len(), 2);

        q.reqbufs(4).expect("reqbufs");
        assert!(done.is_empty());
        q.buf_done(VideoBuffer::new(3, Direction::Destination), true, &metrics);
        assert_eq!(done.pop().map(|b| b.index), Some(3));
        assert_eq!(metrics.snapshot().done_queue_overflows, 0);
    }
}
