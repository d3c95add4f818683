//! Codec-specific operation tables.
//!
//! A coded format descriptor points at one [`CodecOps`] implementation; the
//! session and scheduler call into it at fixed points of format negotiation,
//! streaming and job execution. Every hook except [`CodecOps::run`] has a
//! no-op default.
use std::any::Any;

use vdec_core::prelude::{ControlId, ControlValue, ImageFormatClass, PixFormat, VideoBuffer};
use vdec_platform::prelude::{CoherentAllocator, RegisterIo};

use crate::{
    controls::ControlHandler,
    error::{DecodeError, JobResult},
    rcb::RcbSet,
};

pub mod h264;

/// Per-session state owned by a codec implementation.
#[derive(Default)]
pub struct CodecPrivate(Option<Box<dyn Any + Send>>);

impl CodecPrivate {
    pub fn set<T: Any + Send>(&mut self, value: T) {
        self.0 = Some(Box::new(value));
    }

    pub fn get_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.0.as_mut().and_then(|b| b.downcast_mut::<T>())
    }

    /// Remove and return the state if it has type `T`.
    pub fn take<T: Any + Send>(&mut self) -> Option<T> {
        match self.0.take()?.downcast::<T>() {
            Ok(value) => Some(*value),
            Err(other) => {
                self.0 = Some(other);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }
}

impl std::fmt::Debug for CodecPrivate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CodecPrivate")
            .field(&self.0.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Session view handed to `start` and `stop`.
pub struct StreamContext<'a> {
    pub coherent: &'a dyn CoherentAllocator,
    pub coded: &'a PixFormat,
    pub decoded: &'a PixFormat,
    pub private: &'a mut CodecPrivate,
}

/// Everything `run` needs to program one picture.
pub struct RunContext<'a> {
    pub regs: &'a dyn RegisterIo,
    pub controls: &'a ControlHandler,
    pub coded: &'a PixFormat,
    pub decoded: &'a PixFormat,
    /// Offset of the motion-vector column storage inside destination plane 0.
    pub colmv_offset: u64,
    pub rcb: &'a RcbSet,
    pub private: &'a mut CodecPrivate,
    pub source: &'a VideoBuffer,
    pub destination: &'a VideoBuffer,
}

/// Buffers of a finished job, before they are handed back to the client.
pub struct DoneContext<'a> {
    pub private: &'a mut CodecPrivate,
    pub source: &'a VideoBuffer,
    pub destination: &'a VideoBuffer,
}

/// Codec-specific hooks.
pub trait CodecOps: Send + Sync {
    fn name(&self) -> &'static str;

    /// Final say over a normalized coded format.
    fn adjust_fmt(&self, _fmt: &mut PixFormat) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Validate a control value against the current coded format.
    fn try_ctrl(
        &self,
        _coded: &PixFormat,
        _id: ControlId,
        _value: &ControlValue,
    ) -> Result<(), DecodeError> {
        Ok(())
    }

    /// Image-format class implied by a control value, `None` when the control has no say.
    fn get_image_fmt(&self, _id: ControlId, _value: &ControlValue) -> Option<ImageFormatClass> {
        None
    }

    fn start(&self, _ctx: StreamContext<'_>) -> Result<(), DecodeError> {
        Ok(())
    }

    fn stop(&self, _ctx: StreamContext<'_>) {}

    /// Program the hardware for one picture and start it. Must not block.
    fn run(&self, ctx: RunContext<'_>) -> Result<(), DecodeError>;

    fn done(&self, _ctx: DoneContext<'_>, _result: JobResult) {}
}
