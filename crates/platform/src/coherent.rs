//! General-purpose device-coherent memory.
use parking_lot::Mutex;
use std::collections::BTreeMap;

use crate::PlatformError;

/// A coherent allocation, identified by its device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoherentBlock {
    pub dma_addr: u64,
    pub size: u64,
}

pub trait CoherentAllocator: Send + Sync {
    fn alloc(&self, size: u64) -> Result<CoherentBlock, PlatformError>;
    fn free(&self, block: CoherentBlock);
}

/// Bump allocator with an optional failure point for exhaustion tests.
///
/// # Example
/// ```rust
/// use vdec_platform::prelude::*;
///
/// let mem = SimCoherent::new(0x8000_0000);
/// mem.fail_after(1);
/// let first = mem.alloc(64).unwrap();
/// assert!(mem.alloc(64).is_err());
/// mem.free(first);
/// assert_eq!(mem.live_blocks(), 0);
/// ```
pub struct SimCoherent {
    state: Mutex<CoherentState>,
}

struct CoherentState {
    next: u64,
    live: BTreeMap<u64, u64>,
    remaining: Option<usize>,
    total_allocs: u64,
}

impl SimCoherent {
    const ALIGN: u64 = 0x1000;

    pub fn new(base: u64) -> Self {
        Self {
            state: Mutex::new(CoherentState {
                next: base,
                live: BTreeMap::new(),
                remaining: None,
                total_allocs: 0,
            }),
        }
    }

    /// Allow `count` more successful allocations, then fail every request.
    pub fn fail_after(&self, count: usize) {
        self.state.lock().remaining = Some(count);
    }

    /// Remove any failure point.
    pub fn unlimited(&self) {
        self.state.lock().remaining = None;
    }

    pub fn live_blocks(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Sizes of live blocks keyed by device address.
    pub fn live(&self) -> BTreeMap<u64, u64> {
        self.state.lock().live.clone()
    }

    pub fn total_allocs(&self) -> u64 {
        self.state.lock().total_allocs
    }
}

impl CoherentAllocator for SimCoherent {
    fn alloc(&self, size: u64) -> Result<CoherentBlock, PlatformError> {
        let mut state = self.state.lock();
        if size == 0 {
            return Err(PlatformError::OutOfMemory { size });
        }
        if let Some(remaining) = state.remaining.as_mut() {
            if *remaining == 0 {
                return Err(PlatformError::OutOfMemory { size });
            }
            *remaining -= 1;
        }
        let dma_addr = state.next;
        state.next += size.next_multiple_of(Self::ALIGN);
        state.live.insert(dma_addr, size);
        state.total_allocs += 1;
        Ok(CoherentBlock { dma_addr, size })
    }

    fn free(&self, block: CoherentBlock) {
        let mut state = self.state.lock();
        match state.live.remove(&block.dma_addr) {
            Some(size) if size == block.size => {}
            Some(size) => {
                tracing::warn!(
                    addr = block.dma_addr,
                    size,
                    freed = block.size,
                    "coherent free size mismatch"
                );
            }
            None => tracing::warn!(addr = block.dma_addr, "freeing unknown coherent block"),
        }
    }
}
