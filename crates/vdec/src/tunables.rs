use std::{
    sync::{Mutex, OnceLock},
    time::Duration,
};

/// Default time a job may run before the watchdog declares a hang (milliseconds).
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 2_000;
/// Default idle time before the power domain suspends (milliseconds).
pub const DEFAULT_AUTOSUSPEND_DELAY_MS: u64 = 100;
/// Default alignment of fast-pool allocations (bytes).
pub const DEFAULT_FAST_POOL_ALIGN: u64 = 0x1000;
/// Default depth of each completion queue (buffers).
pub const DEFAULT_DONE_QUEUE_DEPTH: usize = 32;
/// Default cap on buffers per queue.
pub const DEFAULT_MAX_BUFFERS: u32 = 32;

/// Tunables for job timing, power and queue sizing.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// set_decoder_tunables(DecoderTunables {
///     watchdog_timeout_ms: 500,
///     ..DecoderTunables::default()
/// });
/// assert_eq!(decoder_tunables().watchdog_timeout_ms, 500);
/// # set_decoder_tunables(DecoderTunables::default());
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DecoderTunables {
    pub watchdog_timeout_ms: u64,
    pub autosuspend_delay_ms: u64,
    pub fast_pool_align: u64,
    pub done_queue_depth: usize,
    pub max_buffers: u32,
}

impl Default for DecoderTunables {
    fn default() -> Self {
        Self {
            watchdog_timeout_ms: DEFAULT_WATCHDOG_TIMEOUT_MS,
            autosuspend_delay_ms: DEFAULT_AUTOSUSPEND_DELAY_MS,
            fast_pool_align: DEFAULT_FAST_POOL_ALIGN,
            done_queue_depth: DEFAULT_DONE_QUEUE_DEPTH,
            max_buffers: DEFAULT_MAX_BUFFERS,
        }
    }
}

impl DecoderTunables {
    pub(crate) fn sanitized(self) -> Self {
        let max_buffers = self.max_buffers.max(1);
        Self {
            watchdog_timeout_ms: self.watchdog_timeout_ms.max(1),
            autosuspend_delay_ms: self.autosuspend_delay_ms,
            fast_pool_align: self.fast_pool_align.max(1).next_power_of_two(),
            // Every allocated buffer must fit in the completion queue.
            done_queue_depth: self.done_queue_depth.max(max_buffers as usize),
            max_buffers,
        }
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn autosuspend_delay(&self) -> Duration {
        Duration::from_millis(self.autosuspend_delay_ms)
    }
}

static DECODER_TUNABLES: OnceLock<Mutex<DecoderTunables>> = OnceLock::new();

/// Override decoder tunables process-wide; devices built afterwards pick them up.
pub fn set_decoder_tunables(tunables: DecoderTunables) {
    let lock = DECODER_TUNABLES.get_or_init(|| Mutex::new(DecoderTunables::default()));
    if let Ok(mut current) = lock.lock() {
        *current = tunables.sanitized();
    }
}

/// Current process-wide tunables.
pub fn decoder_tunables() -> DecoderTunables {
    DECODER_TUNABLES
        .get()
        .and_then(|t| t.lock().ok().map(|v| *v))
        .unwrap_or_default()
}

/// Builder for process-wide decoder tunables.
///
/// # Example
/// ```rust
/// use vdec::prelude::*;
///
/// let tunables = VdecConfig::new()
///     .watchdog_timeout_ms(1_000)
///     .autosuspend_delay_ms(50)
///     .buffers(16, 4)
///     .tunables();
/// assert_eq!(tunables.autosuspend_delay_ms, 50);
/// assert_eq!(tunables.done_queue_depth, 16);
/// ```
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct VdecConfig {
    decoder: DecoderTunables,
}

impl VdecConfig {
    /// Start building a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watchdog_timeout_ms(mut self, ms: u64) -> Self {
        self.decoder.watchdog_timeout_ms = ms;
        self
    }

    pub fn autosuspend_delay_ms(mut self, ms: u64) -> Self {
        self.decoder.autosuspend_delay_ms = ms;
        self
    }

    pub fn fast_pool_align(mut self, align: u64) -> Self {
        self.decoder.fast_pool_align = align;
        self
    }

    /// Override buffer count limit and completion queue depth.
    pub fn buffers(mut self, max_buffers: u32, done_queue_depth: usize) -> Self {
        self.decoder.max_buffers = max_buffers;
        self.decoder.done_queue_depth = done_queue_depth;
        self
    }

    /// Tunables this configuration describes, sanitized.
    pub fn tunables(&self) -> DecoderTunables {
        self.decoder.sanitized()
    }

    /// Apply the configuration to global tunables.
    pub fn apply(self) {
        set_decoder_tunables(self.decoder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_queue_deep_enough() {
        let t = DecoderTunables {
            watchdog_timeout_ms: 0,
            fast_pool_align: 3000,
            done_queue_depth: 4,
            max_buffers: 16,
            ..DecoderTunables::default()
        }
        .sanitized();
        assert_eq!(t.watchdog_timeout_ms, 1);
        assert_eq!(t.fast_pool_align, 4096);
        assert_eq!(t.done_queue_depth, 16);
    }
}
