use crate::device::DeviceStats;
use crate::fault::{self, FaultSignal, ResolvedPage};
use crate::memory::{is_page_aligned, PAGE_SIZE};
use crate::resource::BackingResource;
use crate::{Error, Result};
use bitflags::bitflags;
use log::{error, trace};
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

bitflags! {
    /// Per-region policy flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmFlags: u32 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const SHARED = 1 << 3;
        /// Region may not be grown by a remap.
        const DONTEXPAND = 1 << 18;
        /// Region content is left out of core dumps.
        const DONTDUMP = 1 << 26;
    }
}

/// Notifications the platform delivers to a mapped region.
pub trait VmOperations: Send + Sync {
    /// A new independent reference to the mapping exists (fork, remap).
    fn open(&self);
    /// One reference to the mapping was torn down.
    fn close(&self) -> Result<()>;
    /// An address inside the mapping was touched and has no page yet.
    fn fault(&self, addr: usize) -> std::result::Result<ResolvedPage, FaultSignal>;
}

/// One virtual-address-range mapping of a backing resource.
pub struct MappingRegion {
    range: Range<usize>,
    flags: VmFlags,
    resource: Weak<BackingResource>,
    ref_count: AtomicUsize,
    stats: Option<Arc<DeviceStats>>,
}

impl MappingRegion {
    /// Create the region with one interest, the mapping request itself.
    /// No page is bound until the first fault.
    pub fn create(
        start: usize,
        len: usize,
        flags: VmFlags,
        resource: &Arc<BackingResource>,
    ) -> Result<Self> {
        let end = start.checked_add(len).ok_or(Error::InvalidRange {
            start,
            end: usize::MAX,
        })?;
        if len == 0 || !is_page_aligned(start) || len % PAGE_SIZE != 0 {
            return Err(Error::InvalidRange { start, end });
        }
        trace!("== vma_create {:#x}..{:#x} ==", start, end);
        Ok(Self {
            range: start..end,
            flags,
            resource: Arc::downgrade(resource),
            ref_count: AtomicUsize::new(1),
            stats: None,
        })
    }

    pub(crate) fn with_stats(mut self, stats: Arc<DeviceStats>) -> Self {
        self.stats = Some(stats);
        self
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.range.start
    }

    /// Exclusive end.
    #[inline]
    pub fn end(&self) -> usize {
        self.range.end
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }

    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        self.range.contains(&addr)
    }

    pub fn flags(&self) -> VmFlags {
        self.flags
    }

    pub fn can_expand(&self) -> bool {
        !self.flags.contains(VmFlags::DONTEXPAND)
    }

    pub fn is_dumpable(&self) -> bool {
        !self.flags.contains(VmFlags::DONTDUMP)
    }

    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// The backing resource, if its handle is still open.
    pub fn resource(&self) -> Option<Arc<BackingResource>> {
        self.resource.upgrade()
    }
}

impl VmOperations for MappingRegion {
    fn open(&self) {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        trace!("== vma_open ==");
    }

    fn close(&self) -> Result<()> {
        let res = self
            .ref_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if res.is_err() {
            error!(
                "== vma_close: reference count underflow on {:#x}..{:#x} ==",
                self.start(),
                self.end()
            );
            if let Some(stats) = &self.stats {
                stats.record_underflow();
            }
            return Err(Error::RefCountUnderflow {
                start: self.start(),
                end: self.end(),
            });
        }
        trace!("== vma_close ==");
        Ok(())
    }

    fn fault(&self, addr: usize) -> std::result::Result<ResolvedPage, FaultSignal> {
        let res = fault::resolve(Some(self), addr);
        if let Some(stats) = &self.stats {
            stats.record_fault(res.is_ok());
        }
        res
    }
}

impl std::fmt::Debug for MappingRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingRegion")
            .field("range", &format_args!("{:#x}..{:#x}", self.start(), self.end()))
            .field("flags", &self.flags)
            .field("ref_count", &self.ref_count())
            .finish()
    }
}
