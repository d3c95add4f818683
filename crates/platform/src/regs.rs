//! Memory-mapped register window.
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// 32-bit register access at byte offsets into the device window.
pub trait RegisterIo: Send + Sync {
    fn read(&self, offset: u32) -> u32;
    fn write(&self, offset: u32, value: u32);
}

/// Register window backed by memory that records every write in order.
///
/// Reads return the last written value (zero when never written), which lets a
/// test stage a status word before invoking the interrupt path.
///
/// # Example
/// ```rust
/// use vdec_platform::prelude::*;
///
/// let regs = RecordingRegisters::default();
/// regs.write(0x28, 1);
/// assert_eq!(regs.read(0x28), 1);
/// assert_eq!(regs.writes(), vec![(0x28, 1)]);
/// ```
#[derive(Debug, Default)]
pub struct RecordingRegisters {
    state: Mutex<RegisterState>,
}

#[derive(Debug, Default)]
struct RegisterState {
    values: BTreeMap<u32, u32>,
    log: Vec<(u32, u32)>,
}

impl RecordingRegisters {
    /// Every `(offset, value)` written so far.
    pub fn writes(&self) -> Vec<(u32, u32)> {
        self.state.lock().log.clone()
    }

    /// Writes to `offset`, oldest first.
    pub fn writes_to(&self, offset: u32) -> Vec<u32> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
            .collect()
    }

    /// Set a register without logging, as the hardware itself would.
    pub fn poke(&self, offset: u32, value: u32) {
        self.state.lock().values.insert(offset, value);
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }
}

impl RegisterIo for RecordingRegisters {
    fn read(&self, offset: u32) -> u32 {
        self.state.lock().values.get(&offset).copied().unwrap_or(0)
    }

    fn write(&self, offset: u32, value: u32) {
        let mut state = self.state.lock();
        state.values.insert(offset, value);
        state.log.push((offset, value));
    }
}
