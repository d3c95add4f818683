#![doc = include_str!("../README.md")]

pub use vdec_core as core;
pub use vdec_platform as platform;

pub use thiserror;

pub mod codec;
pub mod controls;
pub mod device;
mod error;
pub mod formats;
mod m2m;
pub mod negotiator;
pub mod rcb;
mod recovery;
pub mod regs;
pub mod scheduler;
mod session;
pub mod tunables;
mod watchdog;

pub use error::{DecodeError, JobFailure, JobResult};
pub use m2m::QueueSetup;
pub use session::Session;
pub use watchdog::JobId;

pub mod prelude {
    pub use crate::codec::{
        CodecOps, CodecPrivate, DoneContext, RunContext, StreamContext,
        h264::{H264_OPS, H264Ops, h264_controls},
    };
    pub use crate::controls::{ControlHandler, Request, RequestId};
    pub use crate::device::{CAPABILITIES, Capabilities, Device, DeviceBuilder};
    pub use crate::formats::{
        CodedFormatDesc, DecodedFormatDesc, QueueFeatures, coded_formats, default_coded_format,
        find_coded_format,
    };
    pub use crate::negotiator::{
        enum_framesizes, enum_output_format, fill_decoded_layout, try_output_format,
    };
    pub use crate::rcb::{Backing, RCB_COUNT, RcbAxis, RcbPurpose, RcbSet, ScratchBuffer};
    pub use crate::scheduler::JobState;
    pub use crate::tunables::{
        DecoderTunables, VdecConfig, decoder_tunables, set_decoder_tunables,
    };
    pub use crate::{DecodeError, JobFailure, JobId, JobResult, QueueSetup, Session};
    #[allow(unused_imports)]
    pub use vdec_core::prelude::*;
    pub use vdec_platform::prelude::*;
}
