//! Address-translation domains.
use parking_lot::Mutex;
use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use crate::PlatformError;

/// Access rights of a translation entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Protection(u8);

impl Protection {
    pub const READ: Protection = Protection(0x1);
    pub const WRITE: Protection = Protection(0x2);
    pub const READ_WRITE: Protection = Protection(0x3);

    pub fn allows(self, other: Protection) -> bool {
        self.0 & other.0 == other.0
    }
}

/// An address space the device's translation unit can be attached to.
pub trait TranslationDomain: Send + Sync {
    fn name(&self) -> &str;

    /// Smallest mappable granule; sizes and addresses must be multiples of it.
    fn page_size(&self) -> u64;

    fn map(&self, iova: u64, phys: u64, size: u64, prot: Protection) -> Result<(), PlatformError>;

    /// Remove a mapping, returning the number of bytes unmapped.
    fn unmap(&self, iova: u64, size: u64) -> Result<u64, PlatformError>;

    /// Make this domain the device's active address space.
    fn attach(&self) -> Result<(), PlatformError>;

    fn detach(&self);
}

/// Attach/detach events observed across domains sharing one log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEvent {
    Attach(String),
    Detach(String),
}

/// Shared, ordered record of domain events.
pub type DomainEventLog = Arc<Mutex<Vec<DomainEvent>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub phys: u64,
    pub size: u64,
    pub prot: Protection,
}

/// In-memory translation domain with map-failure injection.
///
/// # Example
/// ```rust
/// use vdec_platform::prelude::*;
///
/// let domain = SimDomain::new("live", 0x1000);
/// domain.map(0x10000, 0xff00_0000, 0x2000, Protection::READ_WRITE).unwrap();
/// assert_eq!(domain.mapping(0x10000).map(|m| m.size), Some(0x2000));
/// domain.fail_next_maps(1);
/// assert!(domain.map(0x20000, 0, 0x1000, Protection::READ).is_err());
/// ```
pub struct SimDomain {
    name: String,
    page_size: u64,
    mappings: Mutex<BTreeMap<u64, Mapping>>,
    fail_maps: AtomicUsize,
    attached: AtomicBool,
    events: DomainEventLog,
}

impl SimDomain {
    pub fn new(name: impl Into<String>, page_size: u64) -> Self {
        Self::with_event_log(name, page_size, DomainEventLog::default())
    }

    /// Build a domain that appends its attach/detach events to `events`.
    pub fn with_event_log(name: impl Into<String>, page_size: u64, events: DomainEventLog) -> Self {
        Self {
            name: name.into(),
            page_size: page_size.max(1),
            mappings: Mutex::new(BTreeMap::new()),
            fail_maps: AtomicUsize::new(0),
            attached: AtomicBool::new(false),
            events,
        }
    }

    /// Make the next `count` map calls fail.
    pub fn fail_next_maps(&self, count: usize) {
        self.fail_maps.store(count, Ordering::SeqCst);
    }

    pub fn mapping(&self, iova: u64) -> Option<Mapping> {
        self.mappings.lock().get(&iova).copied()
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.lock().len()
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    fn take_failure(&self) -> bool {
        self.fail_maps
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TranslationDomain for SimDomain {
    fn name(&self) -> &str {
        &self.name
    }

    fn page_size(&self) -> u64 {
        self.page_size
    }

    fn map(&self, iova: u64, phys: u64, size: u64, prot: Protection) -> Result<(), PlatformError> {
        let unaligned = iova % self.page_size != 0 || size % self.page_size != 0 || size == 0;
        if unaligned || self.take_failure() {
            return Err(PlatformError::MapFailed { iova, size });
        }
        let mut mappings = self.mappings.lock();
        let overlaps = mappings
            .range(..iova + size)
            .next_back()
            .is_some_and(|(start, m)| start + m.size > iova);
        if overlaps {
            return Err(PlatformError::MapFailed { iova, size });
        }
        mappings.insert(iova, Mapping { phys, size, prot });
        Ok(())
    }

    fn unmap(&self, iova: u64, size: u64) -> Result<u64, PlatformError> {
        let mut mappings = self.mappings.lock();
        match mappings.get(&iova) {
            Some(m) if m.size == size => {
                mappings.remove(&iova);
                Ok(size)
            }
            _ => Err(PlatformError::NotMapped { iova }),
        }
    }

    fn attach(&self) -> Result<(), PlatformError> {
        self.attached.store(true, Ordering::SeqCst);
        self.events.lock().push(DomainEvent::Attach(self.name.clone()));
        Ok(())
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        self.events.lock().push(DomainEvent::Detach(self.name.clone()));
    }
}
