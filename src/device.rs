use crate::config::Config;
use crate::region::{MappingRegion, VmFlags};
use crate::resource::{BackingResource, HandleContext};
use crate::{Error, Result};
use log::{debug, trace, warn};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Flags every mapping of the device carries regardless of the requested protection.
pub const MAPPING_POLICY: VmFlags = VmFlags::SHARED
    .union(VmFlags::DONTEXPAND)
    .union(VmFlags::DONTDUMP);

/// The device entry point: hands out handles, each with its own backing page.
#[derive(Debug)]
pub struct MmapDevice {
    name: String,
    minor: u32,
    next_handle: AtomicU64,
    stats: Arc<DeviceStats>,
}

impl MmapDevice {
    pub fn new(name: impl Into<String>, minor: u32) -> Self {
        Self {
            name: name.into(),
            minor,
            next_handle: AtomicU64::new(0),
            stats: Arc::new(DeviceStats::default()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.dev_name.clone(), config.minor)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    /// Open a handle under `file_name`, allocating its backing page.
    pub fn open(&self, file_name: &str) -> Result<DeviceHandle> {
        trace!("== open ==");
        let ctx = HandleContext {
            id: self.next_handle.fetch_add(1, Ordering::Relaxed),
            file_name: file_name.to_string(),
        };
        let resource = BackingResource::acquire(&ctx, &ctx.file_name)?;
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        debug!("{}: opened handle {} as {:?}", self.name, ctx.id, ctx.file_name);
        Ok(DeviceHandle {
            ctx,
            resource: Mutex::new(Some(resource)),
            stats: self.stats.clone(),
        })
    }

    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }
}

/// One open instance of the device.
#[derive(Debug)]
pub struct DeviceHandle {
    ctx: HandleContext,
    resource: Mutex<Option<Arc<BackingResource>>>,
    stats: Arc<DeviceStats>,
}

impl DeviceHandle {
    pub fn id(&self) -> u64 {
        self.ctx.id
    }

    pub fn file_name(&self) -> &str {
        &self.ctx.file_name
    }

    pub fn is_open(&self) -> bool {
        self.slot().is_some()
    }

    /// The handle's backing resource, while the handle is open.
    pub fn resource(&self) -> Option<Arc<BackingResource>> {
        self.slot().clone()
    }

    /// Establish a mapping of `len` bytes at `start` over this handle's page.
    ///
    /// The returned region already counts the mapping itself as its first
    /// interest; the platform calls `open` only for later duplicates.
    pub fn mmap(&self, start: usize, len: usize, prot: VmFlags) -> Result<Arc<MappingRegion>> {
        let slot = self.slot();
        let resource = slot.as_ref().ok_or(Error::HandleClosed(self.ctx.id))?;
        let flags = (prot & (VmFlags::READ | VmFlags::WRITE)) | MAPPING_POLICY;
        let region = MappingRegion::create(start, len, flags, resource)?.with_stats(self.stats.clone());
        trace!("== mmap ==");
        self.stats.mappings.fetch_add(1, Ordering::Relaxed);
        Ok(Arc::new(region))
    }

    /// Release the backing page. Every region made from this handle must
    /// already be torn down.
    pub fn close(&self) -> Result<()> {
        let resource = self.slot().take().ok_or(Error::HandleClosed(self.ctx.id))?;
        resource.release();
        self.stats.releases.fetch_add(1, Ordering::Relaxed);
        debug!("closed handle {}", self.ctx.id);
        Ok(())
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<BackingResource>>> {
        self.resource.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for DeviceHandle {
    fn drop(&mut self) {
        if self.is_open() {
            if let Err(e) = self.close() {
                warn!("closing handle {} on drop failed: {}", self.ctx.id, e);
            }
        }
    }
}

/// Lifetime counters for one device.
#[derive(Debug, Default)]
pub struct DeviceStats {
    opens: AtomicU64,
    releases: AtomicU64,
    mappings: AtomicU64,
    faults: AtomicU64,
    bus_errors: AtomicU64,
    underflows: AtomicU64,
}

#[derive(Default, Clone, Debug, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub opens: u64,
    pub releases: u64,
    pub mappings: u64,
    pub faults: u64,
    pub bus_errors: u64,
    pub underflows: u64,
}

impl DeviceStats {
    pub(crate) fn record_fault(&self, resolved: bool) {
        if resolved {
            self.faults.fetch_add(1, Ordering::Relaxed);
        } else {
            self.bus_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_underflow(&self) {
        self.underflows.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            opens: self.opens.load(Ordering::Relaxed),
            releases: self.releases.load(Ordering::Relaxed),
            mappings: self.mappings.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
            bus_errors: self.bus_errors.load(Ordering::Relaxed),
            underflows: self.underflows.load(Ordering::Relaxed),
        }
    }
}
