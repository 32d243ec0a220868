//! A consumer address space as the platform would manage it.
//!
//! It owns the mapping regions installed in it and the pages already bound to
//! its virtual addresses, and only delivers a fault to a region when a touched
//! address has no page yet. Teardown puts the page references that fault
//! resolution took, then closes the region's interest.

use crate::device::DeviceHandle;
use crate::fault::ResolvedPage;
use crate::memory::{page_align_down, Frame, PAGE_SIZE};
use crate::region::{MappingRegion, VmFlags, VmOperations};
use crate::{Error, Result};
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::Arc;

/// First address handed out for mappings.
pub const MMAP_BASE: usize = 0x7f00_0000_0000;

pub struct AddressSpace {
    regions: BTreeMap<usize, Arc<MappingRegion>>,
    resident: BTreeMap<usize, ResolvedPage>,
    next_addr: usize,
}

impl AddressSpace {
    pub fn new() -> Self {
        Self {
            regions: BTreeMap::new(),
            resident: BTreeMap::new(),
            next_addr: MMAP_BASE,
        }
    }

    /// Map `len` bytes of `handle`'s page at the next free address.
    pub fn map(&mut self, handle: &DeviceHandle, len: usize, prot: VmFlags) -> Result<Arc<MappingRegion>> {
        // Leave an unmapped guard page between regions.
        let next_addr = self
            .next_addr
            .checked_add(len)
            .and_then(|end| end.checked_add(PAGE_SIZE))
            .ok_or(Error::InvalidRange {
                start: self.next_addr,
                end: usize::MAX,
            })?;
        let region = handle.mmap(self.next_addr, len, prot)?;
        self.next_addr = next_addr;
        self.regions.insert(region.start(), region.clone());
        debug!("mapped {:?}", region);
        Ok(region)
    }

    pub fn find_region(&self, addr: usize) -> Option<&Arc<MappingRegion>> {
        self.regions
            .range(..=addr)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.contains(addr))
    }

    /// Access `addr`, faulting its page in if it is not resident yet.
    pub fn touch(&mut self, addr: usize) -> Result<Frame> {
        let page_addr = page_align_down(addr);
        if let Some(page) = self.resident.get(&page_addr) {
            return Ok(page.frame.clone());
        }
        let region = self.find_region(addr).ok_or(Error::InvalidAddress(addr))?;
        let page = region.fault(addr).map_err(|_| Error::BusError(addr))?;
        let frame = page.frame.clone();
        self.resident.insert(page.page_addr, page);
        Ok(frame)
    }

    /// Read up to `len` bytes at `addr`, stopping at the page boundary.
    pub fn read(&mut self, addr: usize, len: usize) -> Result<Vec<u8>> {
        let frame = self.touch(addr)?;
        let offset = addr - page_align_down(addr);
        let end = offset.saturating_add(len).min(PAGE_SIZE);
        Ok(frame.as_bytes()[offset..end].to_vec())
    }

    pub fn is_resident(&self, addr: usize) -> bool {
        self.resident.contains_key(&page_align_down(addr))
    }

    /// Drop the page bound at `addr`, so the next access faults again.
    pub fn evict(&mut self, addr: usize) -> bool {
        match self.resident.remove(&page_align_down(addr)) {
            Some(page) => {
                page.frame.put_page();
                true
            }
            None => false,
        }
    }

    /// Duplicate this address space, sharing every mapping.
    ///
    /// Each region gains one interest and each resident page one reference.
    pub fn fork(&self) -> AddressSpace {
        for region in self.regions.values() {
            region.open();
        }
        for page in self.resident.values() {
            page.frame.get_page();
        }
        AddressSpace {
            regions: self.regions.clone(),
            resident: self.resident.clone(),
            next_addr: self.next_addr,
        }
    }

    /// Tear down the region starting at `start`.
    pub fn unmap(&mut self, start: usize) -> Result<()> {
        let region = self.regions.remove(&start).ok_or(Error::InvalidAddress(start))?;
        let pages: Vec<usize> = self
            .resident
            .range(region.start()..region.end())
            .map(|(&addr, _)| addr)
            .collect();
        for addr in pages {
            if let Some(page) = self.resident.remove(&addr) {
                page.frame.put_page();
            }
        }
        region.close()
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn resident_count(&self) -> usize {
        self.resident.len()
    }
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        let starts: Vec<usize> = self.regions.keys().copied().collect();
        for start in starts {
            if let Err(e) = self.unmap(start) {
                warn!("unmap {:#x} on exit failed: {}", start, e);
            }
        }
    }
}
