//! Per-session control storage and request batches.
use smallvec::SmallVec;
use vdec_core::prelude::{ControlId, ControlMeta, ControlValue, Direction, VideoBuffer};

use crate::error::DecodeError;

/// Current values of the controls a coded format registers.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let handler = ControlHandler::new(h264_controls());
/// let profile = handler.value(ControlId::H264_PROFILE).and_then(|v| v.as_int());
/// assert_eq!(profile, Some(2));
/// ```
#[derive(Debug, Clone)]
pub struct ControlHandler {
    entries: Vec<(ControlMeta, ControlValue)>,
}

impl ControlHandler {
    /// Register `metas` with their default values.
    pub fn new(metas: &[ControlMeta]) -> Self {
        Self {
            entries: metas.iter().map(|m| (*m, m.default_value())).collect(),
        }
    }

    pub fn metas(&self) -> impl Iterator<Item = &ControlMeta> {
        self.entries.iter().map(|(meta, _)| meta)
    }

    pub fn meta(&self, id: ControlId) -> Option<&ControlMeta> {
        self.entries.iter().find(|(m, _)| m.id == id).map(|(m, _)| m)
    }

    pub fn value(&self, id: ControlId) -> Option<&ControlValue> {
        self.entries.iter().find(|(m, _)| m.id == id).map(|(_, v)| v)
    }

    /// Metadata of `id` if `value` passes its range and type checks.
    pub fn check(&self, id: ControlId, value: &ControlValue) -> Result<ControlMeta, DecodeError> {
        let meta = self
            .meta(id)
            .ok_or_else(|| DecodeError::control(id, "not registered"))?;
        if !meta.validate(value) {
            return Err(DecodeError::control(id, "value out of range or wrong type"));
        }
        Ok(*meta)
    }

    pub(crate) fn store(&mut self, id: ControlId, value: ControlValue) {
        if let Some((_, slot)) = self.entries.iter_mut().find(|(m, _)| m.id == id) {
            *slot = value;
        }
    }
}

/// Identifier the client assigns to a request.
pub type RequestId = u64;

/// A batch of control values bound to exactly one coded buffer.
///
/// The controls are validated when the request is queued and applied to the
/// session just before the buffer is decoded.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let request = Request::new(1)
///     .control(ControlId::H264_SPS, ControlValue::H264Sps(H264Sps::default()))
///     .buffer(VideoBuffer::new(0, Direction::Source));
/// assert!(request.validate().is_ok());
/// assert!(Request::new(2).validate().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    pub id: RequestId,
    pub controls: Vec<(ControlId, ControlValue)>,
    pub buffers: SmallVec<[VideoBuffer; 1]>,
}

impl Request {
    pub fn new(id: RequestId) -> Self {
        Self {
            id,
            controls: Vec::new(),
            buffers: SmallVec::new(),
        }
    }

    pub fn control(mut self, id: ControlId, value: ControlValue) -> Self {
        self.controls.push((id, value));
        self
    }

    pub fn buffer(mut self, buffer: VideoBuffer) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// A request must carry exactly one buffer, and it must be a coded one.
    pub fn validate(&self) -> Result<(), DecodeError> {
        match self.buffers.as_slice() {
            [] => Err(DecodeError::InvalidRequest(format!(
                "request {} has no buffer",
                self.id
            ))),
            [buf] if buf.direction == Direction::Source => Ok(()),
            [_] => Err(DecodeError::InvalidRequest(
                "requests may only carry coded buffers".into(),
            )),
            _ => Err(DecodeError::InvalidRequest(format!(
                "request {} carries {} buffers",
                self.id,
                self.buffers.len()
            ))),
        }
    }
}

/// Request controls detached from their buffer, kept until the job completes.
#[derive(Debug, Clone)]
pub(crate) struct BoundControls {
    pub(crate) id: RequestId,
    pub(crate) controls: Vec<(ControlId, ControlValue)>,
}
