use vdec_core::prelude::{ControlId, FourCc};
use vdec_platform::PlatformError;

/// Errors surfaced by decoder sessions and devices.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let err = DecodeError::Busy("decoded queue has buffers allocated");
/// assert_eq!(err.code(), "busy");
/// assert!(err.retryable());
/// ```
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// Unsupported pixel format, geometry or enumeration index.
    #[error("invalid format: {0}")]
    InvalidFormat(String),
    /// A format or queue change was requested while the affected queue holds buffers.
    #[error("busy: {0}")]
    Busy(&'static str),
    /// Scratch or codec memory could not be provided.
    #[error("out of memory allocating {what} ({size} bytes)")]
    OutOfMemory { what: &'static str, size: u64 },
    /// The codec rejected a picture while programming the hardware.
    #[error("hardware programming failed: {0}")]
    HardwareProgramming(String),
    /// The hardware did not signal completion before the watchdog fired.
    #[error("hardware hang")]
    HardwareHang,
    /// The power domain could not be resumed before dispatch.
    #[error("power on failed: {0}")]
    PowerOn(String),
    #[error("control {id:#x?} rejected: {reason}")]
    InvalidControl { id: ControlId, reason: String },
    #[error("invalid buffer: {0}")]
    InvalidBuffer(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("no decoded format for {0}")]
    NoDecodedFormat(FourCc),
    /// The device backing the session has shut down.
    #[error("device is gone")]
    DeviceGone,
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error("failed to spawn worker: {0}")]
    Spawn(#[from] std::io::Error),
}

impl DecodeError {
    /// Stable string code for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            DecodeError::InvalidFormat(_) => "invalid_format",
            DecodeError::Busy(_) => "busy",
            DecodeError::OutOfMemory { .. } => "out_of_memory",
            DecodeError::HardwareProgramming(_) => "hardware_programming",
            DecodeError::HardwareHang => "hardware_hang",
            DecodeError::PowerOn(_) => "power_on",
            DecodeError::InvalidControl { .. } => "invalid_control",
            DecodeError::InvalidBuffer(_) => "invalid_buffer",
            DecodeError::InvalidRequest(_) => "invalid_request",
            DecodeError::NoDecodedFormat(_) => "no_decoded_format",
            DecodeError::DeviceGone => "device_gone",
            DecodeError::Platform(err) => err.code(),
            DecodeError::Spawn(_) => "spawn_failed",
        }
    }

    /// Whether the error may succeed when retried.
    pub fn retryable(&self) -> bool {
        matches!(
            self,
            DecodeError::Busy(_) | DecodeError::OutOfMemory { .. } | DecodeError::PowerOn(_)
        )
    }

    pub(crate) fn control(id: ControlId, reason: impl Into<String>) -> Self {
        DecodeError::InvalidControl {
            id,
            reason: reason.into(),
        }
    }
}

/// Why a decode job ended without a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobFailure {
    /// Interrupt arrived without the decode-ready bit.
    Hardware,
    /// Watchdog expired first.
    Hang,
    /// Codec `run` refused to program the picture.
    Programming,
    /// Device could not be powered up.
    PowerOn,
}

/// Outcome of one decode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobResult {
    Done,
    Error(JobFailure),
}

impl JobResult {
    pub fn is_ok(self) -> bool {
        self == JobResult::Done
    }
}
