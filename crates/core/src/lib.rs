#![doc = include_str!("../README.md")]

pub mod buffer;
pub mod controls;
pub mod format;
pub mod h264;
pub mod layout;
pub mod metrics;
pub mod queue;

pub mod prelude {
    pub use crate::{
        buffer::{BufferFlags, BufferPlane, BufferState, Direction, Timecode, VideoBuffer},
        controls::{ControlId, ControlKind, ControlMeta, ControlValue},
        format::{
            ColorSpace, Colorimetry, Field, FourCc, FrameSizeStepwise, ImageFormatClass,
            PixFormat, PlaneFormat, Quantization, TransferFunction, YcbcrEncoding,
        },
        h264::{H264DecodeParams, H264DpbEntry, H264Pps, H264ScalingMatrix, H264Sps},
        layout::{LayoutError, PixelInfo, fill_pixfmt, pixel_info},
        metrics::{DecoderMetrics, MetricsSnapshot},
        queue::CompletionQueue,
    };
}
