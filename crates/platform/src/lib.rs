#![doc = include_str!("../README.md")]

mod error;

pub mod coherent;
pub mod iommu;
pub mod pool;
pub mod power;
pub mod regs;

pub use error::PlatformError;

pub mod prelude {
    pub use crate::{
        PlatformError,
        coherent::{CoherentAllocator, CoherentBlock, SimCoherent},
        iommu::{DomainEvent, DomainEventLog, Mapping, Protection, SimDomain, TranslationDomain},
        pool::{FastPool, PoolBlock, SimPool},
        power::{PowerControl, SimPower},
        regs::{RecordingRegisters, RegisterIo},
    };
}
