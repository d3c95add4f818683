use smallvec::SmallVec;

use crate::format::Field;

/// Which side of the decoder a buffer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Coded bitstream fed to the hardware (the "output" queue).
    Source,
    /// Decoded pictures produced by the hardware (the "capture" queue).
    Destination,
}

/// Lifecycle of a queued buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BufferState {
    #[default]
    Dequeued,
    Queued,
    Active,
    Done,
    Error,
}

/// SMPTE timecode copied verbatim from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Timecode {
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    pub frames: u8,
    pub flags: u32,
}

/// One memory plane of a buffer as seen by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferPlane {
    /// Device-visible address of the plane.
    pub dma_addr: u64,
    /// Allocated length.
    pub length: u64,
    /// Bytes holding payload.
    pub bytesused: u64,
}

/// Buffer flags that travel with the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BufferFlags(pub u32);

impl BufferFlags {
    pub const KEYFRAME: u32 = 0x0008;
    pub const PFRAME: u32 = 0x0010;
    pub const BFRAME: u32 = 0x0020;
    pub const TIMECODE: u32 = 0x0100;
    pub const ERROR: u32 = 0x0040;

    /// Subset of flags that describe the payload rather than the buffer.
    pub const COPIED: u32 = Self::KEYFRAME | Self::PFRAME | Self::BFRAME | Self::TIMECODE;

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }
}

/// Queue-managed video buffer.
///
/// # Example
/// ```rust
/// use vdec_core::prelude::{BufferPlane, Direction, VideoBuffer};
///
/// let mut src = VideoBuffer::new(0, Direction::Source);
/// src.timestamp = 33_000;
/// src.planes.push(BufferPlane { dma_addr: 0x1000, length: 4096, bytesused: 1200 });
/// let mut dst = VideoBuffer::new(0, Direction::Destination);
/// dst.copy_metadata_from(&src);
/// assert_eq!(dst.timestamp, 33_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VideoBuffer {
    pub index: u32,
    pub direction: Direction,
    pub planes: SmallVec<[BufferPlane; 3]>,
    /// Timestamp in nanoseconds; destination buffers are looked up by it as references.
    pub timestamp: u64,
    pub timecode: Timecode,
    pub field: Field,
    pub flags: BufferFlags,
    pub sequence: u32,
    pub state: BufferState,
}

impl VideoBuffer {
    pub fn new(index: u32, direction: Direction) -> Self {
        Self {
            index,
            direction,
            planes: SmallVec::new(),
            timestamp: 0,
            timecode: Timecode::default(),
            field: Field::Any,
            flags: BufferFlags::default(),
            sequence: 0,
            state: BufferState::Dequeued,
        }
    }

    /// Builder-style helper for a single plane buffer.
    pub fn with_plane(mut self, dma_addr: u64, length: u64, bytesused: u64) -> Self {
        self.planes.push(BufferPlane {
            dma_addr,
            length,
            bytesused,
        });
        self
    }

    /// Device address of plane `index`, zero when absent.
    pub fn dma_addr(&self, index: usize) -> u64 {
        self.planes.get(index).map(|p| p.dma_addr).unwrap_or(0)
    }

    pub fn bytesused(&self, index: usize) -> u64 {
        self.planes.get(index).map(|p| p.bytesused).unwrap_or(0)
    }

    /// Copy timing and payload flags from the coded buffer that produced this picture.
    pub fn copy_metadata_from(&mut self, src: &VideoBuffer) {
        self.timestamp = src.timestamp;
        self.timecode = src.timecode;
        self.field = src.field;
        self.flags = BufferFlags(
            (self.flags.0 & !BufferFlags::COPIED) | (src.flags.0 & BufferFlags::COPIED),
        );
    }
}
