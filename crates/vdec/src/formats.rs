//! Static tables of the formats the decoder accepts and produces.
use std::fmt;

use vdec_core::prelude::{ControlMeta, FourCc, FrameSizeStepwise, ImageFormatClass};

use crate::codec::{
    CodecOps,
    h264::{H264_OPS, h264_controls},
};

/// A decoded pixel format and the image-format class it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedFormatDesc {
    pub fourcc: FourCc,
    pub class: ImageFormatClass,
}

/// Buffer-queue features a coded format turns on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFeatures(u32);

impl QueueFeatures {
    pub const NONE: QueueFeatures = QueueFeatures(0);
    /// The destination buffer may stay queued across several source buffers (slice decoding).
    pub const HOLD_CAPTURE_BUF: QueueFeatures = QueueFeatures(1 << 0);

    pub const fn union(self, other: QueueFeatures) -> QueueFeatures {
        QueueFeatures(self.0 | other.0)
    }

    pub fn contains(self, other: QueueFeatures) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Everything the decoder knows about one bitstream format.
pub struct CodedFormatDesc {
    pub fourcc: FourCc,
    pub frmsize: FrameSizeStepwise,
    /// Compatible decoded formats; the first match for a class is its default.
    pub decoded: &'static [DecodedFormatDesc],
    pub controls: fn() -> &'static [ControlMeta],
    pub ops: &'static dyn CodecOps,
    pub features: QueueFeatures,
}

impl CodedFormatDesc {
    /// Decoded formats usable for `class`, in preference order.
    pub fn decoded_for(
        &self,
        class: ImageFormatClass,
    ) -> impl Iterator<Item = &'static DecodedFormatDesc> + use<> {
        let decoded: &'static [DecodedFormatDesc] = self.decoded;
        decoded.iter().filter(move |d| d.class.matches(class))
    }

    pub fn is_valid_decoded(&self, fourcc: FourCc, class: ImageFormatClass) -> bool {
        self.decoded_for(class).any(|d| d.fourcc == fourcc)
    }

    /// Default decoded format for `class`.
    pub fn first_decoded(&self, class: ImageFormatClass) -> Option<&'static DecodedFormatDesc> {
        self.decoded_for(class).next()
    }
}

impl fmt::Debug for CodedFormatDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodedFormatDesc")
            .field("fourcc", &self.fourcc)
            .field("frmsize", &self.frmsize)
            .field("decoded", &self.decoded)
            .field("ops", &self.ops.name())
            .field("features", &self.features)
            .finish()
    }
}

static H264_DECODED_FORMATS: [DecodedFormatDesc; 4] = [
    DecodedFormatDesc {
        fourcc: FourCc::NV12,
        class: ImageFormatClass::Yuv420_8,
    },
    DecodedFormatDesc {
        fourcc: FourCc::NV15,
        class: ImageFormatClass::Yuv420_10,
    },
    DecodedFormatDesc {
        fourcc: FourCc::NV16,
        class: ImageFormatClass::Yuv422_8,
    },
    DecodedFormatDesc {
        fourcc: FourCc::NV20,
        class: ImageFormatClass::Yuv422_10,
    },
];

static CODED_FORMATS: [CodedFormatDesc; 1] = [CodedFormatDesc {
    fourcc: FourCc::H264_SLICE,
    frmsize: FrameSizeStepwise::new(64, 65520, 64, 16, 65520, 16),
    decoded: &H264_DECODED_FORMATS,
    controls: h264_controls,
    ops: &H264_OPS,
    features: QueueFeatures::HOLD_CAPTURE_BUF,
}];

/// Registered coded formats, in enumeration order.
pub fn coded_formats() -> &'static [CodedFormatDesc] {
    &CODED_FORMATS
}

pub fn find_coded_format(fourcc: FourCc) -> Option<&'static CodedFormatDesc> {
    CODED_FORMATS.iter().find(|d| d.fourcc == fourcc)
}

/// The descriptor used when a request names an unknown format.
pub fn default_coded_format() -> &'static CodedFormatDesc {
    &CODED_FORMATS[0]
}
