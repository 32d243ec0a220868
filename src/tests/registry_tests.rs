use crate::device::MmapDevice;
use crate::registry::{DeviceRegistry, MiscRegistry};
use crate::Error;
use std::sync::Arc;

#[test]
fn register_lookup_deregister() {
    let registry = MiscRegistry::new();
    assert!(registry.is_empty());
    registry.register(Arc::new(MmapDevice::new("my_mmap", 99))).unwrap();
    assert_eq!(registry.len(), 1);

    let dev = registry.lookup("my_mmap").unwrap();
    assert_eq!(dev.minor(), 99);
    let handle = dev.open("my_mmap").unwrap();
    assert!(handle.is_open());

    let removed = registry.deregister("my_mmap").unwrap();
    assert!(Arc::ptr_eq(&removed, &dev));
    assert!(registry.lookup("my_mmap").is_none());
}

#[test]
fn duplicate_name_or_minor_is_busy() {
    let registry = MiscRegistry::new();
    registry.register(Arc::new(MmapDevice::new("my_mmap", 99))).unwrap();
    let same_name = registry.register(Arc::new(MmapDevice::new("my_mmap", 100)));
    assert!(matches!(same_name, Err(Error::DeviceBusy(n)) if n == "my_mmap"));
    let same_minor = registry.register(Arc::new(MmapDevice::new("other", 99)));
    assert!(matches!(same_minor, Err(Error::DeviceBusy(_))));
    assert_eq!(registry.len(), 1);
}

#[test]
fn deregister_unknown_device_fails() {
    let registry = MiscRegistry::new();
    assert!(matches!(registry.deregister("nope"), Err(Error::NoSuchDevice(_))));
}
