/// Errors reported by platform backends.
///
/// # Example
/// ```rust
/// use vdec_platform::PlatformError;
///
/// let err = PlatformError::MapFailed { iova: 0x1000, size: 0x2000 };
/// assert_eq!(err.code(), "map_failed");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    #[error("fast pool exhausted ({size} bytes requested)")]
    PoolExhausted { size: u64 },
    #[error("coherent allocation of {size} bytes failed")]
    OutOfMemory { size: u64 },
    #[error("translation map of {size:#x} bytes at {iova:#x} failed")]
    MapFailed { iova: u64, size: u64 },
    #[error("{iova:#x} is not mapped")]
    NotMapped { iova: u64 },
    #[error("translation domain attach failed: {0}")]
    AttachFailed(String),
    #[error("power domain did not resume: {0}")]
    PowerOn(String),
}

impl PlatformError {
    /// Stable string code for error classification.
    pub fn code(&self) -> &'static str {
        match self {
            PlatformError::PoolExhausted { .. } => "pool_exhausted",
            PlatformError::OutOfMemory { .. } => "out_of_memory",
            PlatformError::MapFailed { .. } => "map_failed",
            PlatformError::NotMapped { .. } => "not_mapped",
            PlatformError::AttachFailed(_) => "attach_failed",
            PlatformError::PowerOn(_) => "power_on",
        }
    }
}
