use crate::device::MmapDevice;
use crate::fault::FaultSignal;
use crate::memory::frame::fail_next_alloc;
use crate::memory::PAGE_SIZE;
use crate::region::{VmFlags, VmOperations};
use crate::resource::{BackingResource, HandleContext, PAYLOAD_PREFIX};
use crate::Error;

#[test]
fn payload_is_prefix_then_name() {
    let ctx = HandleContext {
        id: 0,
        file_name: "dev0".to_string(),
    };
    let res = BackingResource::acquire(&ctx, &ctx.file_name).unwrap();
    let expected = format!("{}dev0", PAYLOAD_PREFIX);
    assert_eq!(res.payload(), expected.as_bytes());
    assert_eq!(res.payload_str(), expected);
    // The rest of the page stays zero.
    assert!(res.frame().unwrap().as_bytes()[expected.len()..].iter().all(|&b| b == 0));
}

#[test]
fn long_names_are_truncated_to_one_page() {
    let name = "n".repeat(2 * PAGE_SIZE);
    let ctx = HandleContext {
        id: 1,
        file_name: name.clone(),
    };
    let res = BackingResource::acquire(&ctx, &name).unwrap();
    assert_eq!(res.payload().len(), PAGE_SIZE);
    assert!(res.payload().starts_with(PAYLOAD_PREFIX.as_bytes()));
    assert_eq!(*res.payload().last().unwrap(), b'n');
}

#[test]
fn independent_handles_get_distinct_pages() {
    let dev = MmapDevice::new("my_mmap", 99);
    let a = dev.open("alpha").unwrap();
    let b = dev.open("beta").unwrap();
    let ra = a.resource().unwrap();
    let rb = b.resource().unwrap();
    assert!(!ra.frame().unwrap().ptr_eq(&rb.frame().unwrap()));
    assert_eq!(ra.payload_str(), format!("{}alpha", PAYLOAD_PREFIX));
    assert_eq!(rb.payload_str(), format!("{}beta", PAYLOAD_PREFIX));
    assert_ne!(a.id(), b.id());
}

#[test]
fn close_releases_the_page_once() {
    let dev = MmapDevice::new("my_mmap", 99);
    let handle = dev.open("dev0").unwrap();
    let frame = handle.resource().unwrap().frame().unwrap();
    assert_eq!(frame.use_count(), 1);

    handle.close().unwrap();
    assert!(!handle.is_open());
    assert!(handle.resource().is_none());
    assert_eq!(frame.use_count(), 0);

    assert!(matches!(handle.close(), Err(Error::HandleClosed(_))));
    let snap = dev.stats_snapshot();
    assert_eq!(snap.opens, 1);
    assert_eq!(snap.releases, 1);
}

#[test]
fn dropping_an_open_handle_closes_it() {
    let dev = MmapDevice::new("my_mmap", 99);
    let handle = dev.open("dev0").unwrap();
    let frame = handle.resource().unwrap().frame().unwrap();
    drop(handle);
    assert_eq!(frame.use_count(), 0);
    assert_eq!(dev.stats_snapshot().releases, 1);
}

#[test]
fn close_frees_the_page_even_while_the_resource_is_held() {
    let dev = MmapDevice::new("my_mmap", 99);
    let handle = dev.open("dev0").unwrap();
    let region = handle.mmap(0x1000_0000, PAGE_SIZE, VmFlags::READ).unwrap();
    let held = handle.resource().unwrap();
    let frame = held.frame().unwrap();

    handle.close().unwrap();
    assert_eq!(frame.use_count(), 0);
    assert!(held.is_released());
    assert!(held.frame().is_none());
    assert!(held.payload().is_empty());
    assert_eq!(region.fault(region.start()).unwrap_err(), FaultSignal::BusError);
    assert_eq!(dev.stats_snapshot().bus_errors, 1);

    // A second release finds nothing left to put.
    held.release();
    drop(held);
    assert_eq!(frame.use_count(), 0);
}

#[test]
fn allocation_failure_fails_open_without_a_resource() {
    let dev = MmapDevice::new("my_mmap", 99);
    fail_next_alloc();
    let err = dev.open("dev0").unwrap_err();
    assert!(matches!(err, Error::ResourceExhaustion(_)));
    assert_eq!(dev.stats_snapshot().opens, 0);

    fail_next_alloc();
    let ctx = HandleContext {
        id: 3,
        file_name: "dev0".to_string(),
    };
    assert!(matches!(
        BackingResource::acquire(&ctx, "dev0"),
        Err(Error::ResourceExhaustion(_))
    ));

    // The failure is one-shot.
    let handle = dev.open("dev0").unwrap();
    assert!(handle.is_open());
    assert_eq!(dev.stats_snapshot().opens, 1);
}
