//! Row and column scratch buffers ("RCB") the hardware needs while decoding.
//!
//! Each stream start provisions one buffer per [`RcbPurpose`], sized from the
//! decoded geometry. Buffers prefer the on-chip fast pool and fall back to
//! coherent memory; a stream start either gets the whole set or nothing.
use tracing::{debug, warn};
use vdec_core::prelude::DecoderMetrics;
use vdec_platform::prelude::{
    CoherentAllocator, CoherentBlock, FastPool, PoolBlock, Protection, TranslationDomain,
};

use crate::error::DecodeError;

pub const RCB_COUNT: usize = 10;

/// Which picture dimension a scratch buffer scales with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RcbAxis {
    Width,
    Height,
}

/// Fixed purpose of each scratch buffer, in hardware register order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RcbPurpose {
    IntraRow,
    TransdRow,
    TransdCol,
    StreamdRow,
    InterRow,
    InterCol,
    DblkRow,
    SaoRow,
    FbcRow,
    FiltCol,
}

impl RcbPurpose {
    pub const ALL: [RcbPurpose; RCB_COUNT] = [
        RcbPurpose::IntraRow,
        RcbPurpose::TransdRow,
        RcbPurpose::TransdCol,
        RcbPurpose::StreamdRow,
        RcbPurpose::InterRow,
        RcbPurpose::InterCol,
        RcbPurpose::DblkRow,
        RcbPurpose::SaoRow,
        RcbPurpose::FbcRow,
        RcbPurpose::FiltCol,
    ];

    /// Bytes per pixel of the scaling axis.
    pub const fn multiplier(self) -> u64 {
        match self {
            RcbPurpose::IntraRow => 6,
            RcbPurpose::TransdRow => 1,
            RcbPurpose::TransdCol => 1,
            RcbPurpose::StreamdRow => 3,
            RcbPurpose::InterRow => 6,
            RcbPurpose::InterCol => 3,
            RcbPurpose::DblkRow => 22,
            RcbPurpose::SaoRow => 6,
            RcbPurpose::FbcRow => 11,
            RcbPurpose::FiltCol => 67,
        }
    }

    pub const fn axis(self) -> RcbAxis {
        match self {
            RcbPurpose::TransdCol | RcbPurpose::InterCol | RcbPurpose::FiltCol => RcbAxis::Height,
            _ => RcbAxis::Width,
        }
    }

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn size_for(self, width: u32, height: u32) -> u64 {
        let extent = match self.axis() {
            RcbAxis::Width => width,
            RcbAxis::Height => height,
        };
        self.multiplier() * u64::from(extent)
    }
}

/// Where a scratch buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    /// Fast pool block; `translated` when it is mapped through the translation domain.
    FastPool { block: PoolBlock, translated: bool },
    Coherent(CoherentBlock),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchBuffer {
    pub purpose: RcbPurpose,
    /// Bytes reserved; page-rounded when the buffer is translated.
    pub size: u64,
    /// Address programmed into the hardware.
    pub dma_addr: u64,
    pub backing: Backing,
}

impl ScratchBuffer {
    pub fn in_fast_pool(&self) -> bool {
        matches!(self.backing, Backing::FastPool { .. })
    }
}

/// The scratch buffers a session holds, one slot per purpose.
#[derive(Debug, Default)]
pub struct RcbSet {
    slots: [Option<ScratchBuffer>; RCB_COUNT],
}

impl RcbSet {
    pub fn get(&self, purpose: RcbPurpose) -> Option<&ScratchBuffer> {
        self.slots[purpose.index()].as_ref()
    }

    /// Held buffers in purpose order.
    pub fn iter(&self) -> impl Iterator<Item = &ScratchBuffer> {
        self.slots.iter().flatten()
    }

    pub fn held(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.held() == 0
    }
}

/// Memory providers scratch buffers are carved from.
pub(crate) struct RcbBackends<'a> {
    pub(crate) pool: Option<&'a dyn FastPool>,
    pub(crate) domain: Option<&'a dyn TranslationDomain>,
    pub(crate) coherent: &'a dyn CoherentAllocator,
    pub(crate) pool_align: u64,
    pub(crate) metrics: &'a DecoderMetrics,
}

impl RcbBackends<'_> {
    fn try_fast_pool(&self, purpose: RcbPurpose, size: u64) -> Option<ScratchBuffer> {
        let pool = self.pool?;
        let size = match self.domain {
            Some(domain) => size.next_multiple_of(domain.page_size()),
            None => size,
        };
        let block = pool.alloc(size, self.pool_align)?;
        let Some(domain) = self.domain else {
            return Some(ScratchBuffer {
                purpose,
                size,
                dma_addr: block.dma_addr,
                backing: Backing::FastPool {
                    block,
                    translated: false,
                },
            });
        };
        // The hardware sees the pool through the translation unit at the pool's host address.
        if let Err(err) = domain.map(block.cpu_addr, block.dma_addr, size, Protection::READ_WRITE) {
            warn!(?purpose, size, error = %err, "mapping fast pool block failed");
            pool.free(block);
            return None;
        }
        Some(ScratchBuffer {
            purpose,
            size,
            dma_addr: block.cpu_addr,
            backing: Backing::FastPool {
                block,
                translated: true,
            },
        })
    }

    fn release_one(&self, buf: ScratchBuffer) {
        match buf.backing {
            Backing::FastPool { block, translated } => {
                if translated
                    && let Some(domain) = self.domain
                    && let Err(err) = domain.unmap(block.cpu_addr, buf.size)
                {
                    warn!(purpose = ?buf.purpose, error = %err, "unmapping fast pool block failed");
                }
                if let Some(pool) = self.pool {
                    pool.free(block);
                }
            }
            Backing::Coherent(block) => self.coherent.free(block),
        }
    }
}

/// Provision every scratch buffer for a `width` x `height` decode.
///
/// On failure every buffer obtained so far is released and `set` is left empty.
pub(crate) fn allocate(
    backends: &RcbBackends<'_>,
    set: &mut RcbSet,
    width: u32,
    height: u32,
) -> Result<(), DecodeError> {
    release(backends, set);
    for purpose in RcbPurpose::ALL {
        let size = purpose.size_for(width, height);
        let buf = match backends.try_fast_pool(purpose, size) {
            Some(buf) => {
                backends.metrics.fast_pool_hit();
                buf
            }
            None => {
                if backends.pool.is_some() {
                    backends.metrics.fast_pool_fallback();
                }
                match backends.coherent.alloc(size) {
                    Ok(block) => ScratchBuffer {
                        purpose,
                        size,
                        dma_addr: block.dma_addr,
                        backing: Backing::Coherent(block),
                    },
                    Err(err) => {
                        warn!(?purpose, size, error = %err, "scratch buffer allocation failed");
                        release(backends, set);
                        return Err(DecodeError::OutOfMemory {
                            what: "scratch buffer",
                            size,
                        });
                    }
                }
            }
        };
        debug!(?purpose, size = buf.size, fast = buf.in_fast_pool(), "scratch buffer ready");
        set.slots[purpose.index()] = Some(buf);
    }
    Ok(())
}

/// Return every held scratch buffer to where it came from. Empty slots are skipped.
pub(crate) fn release(backends: &RcbBackends<'_>, set: &mut RcbSet) {
    for slot in set.slots.iter_mut() {
        if let Some(buf) = slot.take() {
            backends.release_one(buf);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdec_platform::prelude::{SimCoherent, SimDomain, SimPool};

    struct Fixture {
        pool: SimPool,
        domain: SimDomain,
        coherent: SimCoherent,
        metrics: DecoderMetrics,
    }

    impl Fixture {
        fn new(pool_bytes: u64) -> Self {
            Self {
                pool: SimPool::new(0x4000_0000, 0xff00_0000, pool_bytes),
                domain: SimDomain::new("live", 0x1000),
                coherent: SimCoherent::new(0x8000_0000),
                metrics: DecoderMetrics::default(),
            }
        }

        fn backends(&self, pool: bool, domain: bool) -> RcbBackends<'_> {
            RcbBackends {
                pool: pool.then_some(&self.pool as &dyn FastPool),
                domain: domain.then_some(&self.domain as &dyn TranslationDomain),
                coherent: &self.coherent,
                pool_align: 0x1000,
                metrics: &self.metrics,
            }
        }
    }

    #[test]
    fn sizes_follow_the_hardware_table() {
        let sizes: Vec<u64> = RcbPurpose::ALL.iter().map(|p| p.size_for(100, 10)).collect();
        assert_eq!(sizes, [600, 100, 10, 300, 600, 30, 2200, 600, 1100, 670]);
    }

    #[test]
    fn coherent_only_without_pool() {
        let fx = Fixture::new(0);
        let mut set = RcbSet::default();
        allocate(&fx.backends(false, false), &mut set, 1920, 1088).expect("allocate");
        assert_eq!(set.held(), RCB_COUNT);
        assert!(set.iter().all(|b| !b.in_fast_pool()));
        let intra = set.get(RcbPurpose::IntraRow).expect("intra");
        assert_eq!(intra.size, 6 * 1920);
        release(&fx.backends(false, false), &mut set);
        assert!(set.is_empty());
        assert_eq!(fx.coherent.live_blocks(), 0);
    }

    #[test]
    fn translated_pool_blocks_are_page_rounded_and_mapped() {
        let fx = Fixture::new(0x100_0000);
        let mut set = RcbSet::default();
        let backends = fx.backends(true, true);
        allocate(&backends, &mut set, 1920, 1088).expect("allocate");
        let intra = set.get(RcbPurpose::IntraRow).expect("intra");
        assert_eq!(intra.size, 0x3000);
        let Backing::FastPool { block, translated } = intra.backing else {
            panic!("expected fast pool backing");
        };
        assert!(translated);
        assert_eq!(intra.dma_addr, block.cpu_addr);
        let mapping = fx.domain.mapping(block.cpu_addr).expect("mapping");
        assert_eq!((mapping.phys, mapping.size), (block.dma_addr, 0x3000));
        release(&backends, &mut set);
        assert_eq!(fx.domain.mapping_count(), 0);
        assert_eq!(fx.pool.live_blocks(), 0);
    }

    #[test]
    fn map_failure_falls_back_to_unrounded_coherent() {
        let fx = Fixture::new(0x100_0000);
        fx.domain.fail_next_maps(1);
        let mut set = RcbSet::default();
        // 6 * 600 = 3600 bytes, rounded to 4096 for the pool.
        allocate(&fx.backends(true, true), &mut set, 600, 64).expect("allocate");
        let intra = set.get(RcbPurpose::IntraRow).expect("intra");
        assert!(matches!(intra.backing, Backing::Coherent(_)));
        assert_eq!(intra.size, 3600);
        assert_eq!(fx.coherent.live().get(&intra.dma_addr), Some(&3600));
        assert_eq!(fx.pool.live_blocks(), RCB_COUNT - 1);
        assert_eq!(fx.metrics.snapshot().fast_pool_fallbacks, 1);
    }

    #[test]
    fn exhaustion_at_any_point_leaves_nothing_held() {
        for budget in 0..RCB_COUNT {
            // Pool fits the first few buffers only, coherent memory runs out later.
            let fx = Fixture::new(0x6000);
            fx.coherent.fail_after(budget);
            let mut set = RcbSet::default();
            let backends = fx.backends(true, true);
            let err = allocate(&backends, &mut set, 1920, 1088);
            if err.is_ok() {
                continue;
            }
            assert!(matches!(err, Err(DecodeError::OutOfMemory { .. })));
            assert!(set.is_empty());
            assert_eq!(fx.pool.live_blocks(), 0);
            assert_eq!(fx.domain.mapping_count(), 0);
            assert_eq!(fx.coherent.live_blocks(), 0);
        }
    }
}
