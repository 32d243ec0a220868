use lazy_mmap::address_space::AddressSpace;
use lazy_mmap::config::Config;
use lazy_mmap::device::MmapDevice;
use lazy_mmap::memory::PAGE_SIZE;
use lazy_mmap::region::{VmFlags, VmOperations};
use lazy_mmap::registry::{DeviceRegistry, MiscRegistry};
use lazy_mmap::Result;
use std::sync::Arc;

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::from_env();
    println!(
        "lazy_mmap starting: dev={}, minor={}, map_pages={}",
        config.dev_name, config.minor, config.map_pages
    );

    let registry = MiscRegistry::new();
    registry.register(Arc::new(MmapDevice::from_config(&config)))?;
    let device = registry
        .lookup(&config.dev_name)
        .ok_or_else(|| lazy_mmap::Error::NoSuchDevice(config.dev_name.clone()))?;

    let handle = device.open(&config.dev_name)?;
    let len = config.map_pages as usize * PAGE_SIZE;
    {
        let mut space = AddressSpace::new();
        let region = space.map(&handle, len, VmFlags::READ | VmFlags::WRITE)?;
        println!("mapped {:?}", region);

        // Nothing is bound until the first access.
        let bytes = space.read(region.start(), PAGE_SIZE)?;
        let text = String::from_utf8_lossy(&bytes);
        println!("read at {:#x}: {}", region.start(), text.trim_end_matches('\0'));

        let child = space.fork();
        println!("after fork: ref_count={}", region.ref_count());
        drop(child);
        println!("after child exit: ref_count={}", region.ref_count());

        // A fault one past the end is refused with a bus error.
        match region.fault(region.end()) {
            Ok(_) => println!("unexpected: fault past the mapping resolved"),
            Err(sig) => println!("fault at {:#x}: {:?} (code {:#x})", region.end(), sig, sig.code()),
        }
    }
    handle.close()?;

    registry.deregister(&config.dev_name)?;
    println!("stats: {:?}", device.stats_snapshot());
    Ok(())
}
