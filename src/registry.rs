use crate::device::MmapDevice;
use crate::{Error, Result};
use log::{error, info};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Where devices are published so consumers can open them by name.
pub trait DeviceRegistry: Send + Sync {
    fn register(&self, device: Arc<MmapDevice>) -> Result<()>;
    fn deregister(&self, name: &str) -> Result<Arc<MmapDevice>>;
    fn lookup(&self, name: &str) -> Option<Arc<MmapDevice>>;
}

/// In-process registry keyed by device name, with unique minor numbers.
#[derive(Default)]
pub struct MiscRegistry {
    devices: Mutex<HashMap<String, Arc<MmapDevice>>>,
}

impl MiscRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DeviceRegistry for MiscRegistry {
    fn register(&self, device: Arc<MmapDevice>) -> Result<()> {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        let clash = devices
            .values()
            .any(|d| d.name() == device.name() || d.minor() == device.minor());
        if clash {
            error!("== register: {} (minor {}) busy ==", device.name(), device.minor());
            return Err(Error::DeviceBusy(device.name().to_string()));
        }
        info!("registered /dev/{} (minor {})", device.name(), device.minor());
        devices.insert(device.name().to_string(), device);
        Ok(())
    }

    fn deregister(&self, name: &str) -> Result<Arc<MmapDevice>> {
        let removed = self
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
            .ok_or_else(|| Error::NoSuchDevice(name.to_string()))?;
        info!("deregistered /dev/{}", name);
        Ok(removed)
    }

    fn lookup(&self, name: &str) -> Option<Arc<MmapDevice>> {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }
}
