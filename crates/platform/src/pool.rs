//! Small on-chip memory pool preferred for hardware scratch buffers.
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// A block handed out by a [`FastPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBlock {
    /// Host-side address of the block; doubles as the translated device address.
    pub cpu_addr: u64,
    /// Physical address the hardware sees without translation.
    pub dma_addr: u64,
    pub size: u64,
}

pub trait FastPool: Send + Sync {
    /// Zeroed allocation aligned to `align` bytes, `None` when the pool is exhausted.
    fn alloc(&self, size: u64, align: u64) -> Option<PoolBlock>;

    fn free(&self, block: PoolBlock);

    /// Bytes currently handed out.
    fn in_use(&self) -> u64;
}

/// First-fit pool over a fixed address window.
///
/// # Example
/// ```rust
/// use vdec_platform::prelude::*;
///
/// let pool = SimPool::new(0x4000_0000, 0xff00_0000, 0x4000);
/// let block = pool.alloc(0x1000, 0x1000).unwrap();
/// assert_eq!(block.dma_addr, 0xff00_0000);
/// pool.free(block);
/// assert_eq!(pool.in_use(), 0);
/// ```
pub struct SimPool {
    cpu_base: u64,
    dma_base: u64,
    capacity: u64,
    blocks: Mutex<BTreeMap<u64, u64>>,
}

impl SimPool {
    pub fn new(cpu_base: u64, dma_base: u64, capacity: u64) -> Self {
        Self {
            cpu_base,
            dma_base,
            capacity,
            blocks: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    pub fn live_blocks(&self) -> usize {
        self.blocks.lock().len()
    }
}

impl FastPool for SimPool {
    fn alloc(&self, size: u64, align: u64) -> Option<PoolBlock> {
        if size == 0 {
            return None;
        }
        let align = align.max(1);
        let mut blocks = self.blocks.lock();
        let mut cursor = 0u64;
        let mut found = None;
        for (&offset, &len) in blocks.iter() {
            let start = cursor.next_multiple_of(align);
            if start + size <= offset {
                found = Some(start);
                break;
            }
            cursor = offset + len;
        }
        let offset = match found {
            Some(offset) => offset,
            None => {
                let start = cursor.next_multiple_of(align);
                if start + size > self.capacity {
                    return None;
                }
                start
            }
        };
        blocks.insert(offset, size);
        Some(PoolBlock {
            cpu_addr: self.cpu_base + offset,
            dma_addr: self.dma_base + offset,
            size,
        })
    }

    fn free(&self, block: PoolBlock) {
        let offset = block.cpu_addr.wrapping_sub(self.cpu_base);
        if self.blocks.lock().remove(&offset).is_none() {
            tracing::warn!(addr = block.cpu_addr, "freeing unknown fast pool block");
        }
    }

    fn in_use(&self) -> u64 {
        self.blocks.lock().values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_reuses_holes_and_respects_capacity() {
        let pool = SimPool::new(0x1000_0000, 0x2000_0000, 0x3000);
        let a = pool.alloc(0x1000, 0x1000).expect("a");
        let b = pool.alloc(0x1000, 0x1000).expect("b");
        let _c = pool.alloc(0x1000, 0x1000).expect("c");
        assert!(pool.alloc(0x10, 0x1000).is_none());
        pool.free(a);
        let d = pool.alloc(0x800, 0x1000).expect("hole");
        assert_eq!(d.cpu_addr, a.cpu_addr);
        assert_eq!(b.dma_addr - 0x2000_0000, 0x1000);
        assert_eq!(pool.in_use(), 0x2800);
    }
}
