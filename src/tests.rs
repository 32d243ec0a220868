use crate::memory::{page_align_down, Frame, PAGE_SIZE};

mod config_tests;
mod registry_tests;
mod resource_tests;

#[test]
fn frame_starts_zeroed_with_one_reference() {
    let frame = Frame::alloc_zeroed().expect("frame alloc");
    assert_eq!(frame.as_bytes().len(), PAGE_SIZE);
    assert!(frame.as_bytes().iter().all(|&b| b == 0));
    assert_eq!(frame.use_count(), 1);
}

#[test]
fn frame_page_references_balance() {
    let frame = Frame::alloc_zeroed().unwrap();
    frame.get_page();
    frame.get_page();
    assert_eq!(frame.use_count(), 3);
    assert_eq!(frame.put_page(), 2);
    assert_eq!(frame.put_page(), 1);
}

#[test]
fn frame_writes_only_while_unshared() {
    let mut frame = Frame::alloc_zeroed().unwrap();
    assert_eq!(frame.write_at(PAGE_SIZE - 2, b"abcd"), Some(2));
    assert_eq!(&frame.as_bytes()[PAGE_SIZE - 2..], b"ab");

    let other = frame.clone();
    assert!(other.ptr_eq(&frame));
    assert_eq!(other.pfn(), frame.pfn());
    assert_eq!(frame.write_at(0, b"x"), None);
}

#[test]
fn page_align_down_rounds_to_page() {
    assert_eq!(page_align_down(0), 0);
    assert_eq!(page_align_down(PAGE_SIZE - 1), 0);
    assert_eq!(page_align_down(PAGE_SIZE), PAGE_SIZE);
    assert_eq!(page_align_down(3 * PAGE_SIZE + 17), 3 * PAGE_SIZE);
}

#[test]
fn put_page_on_free_page_panics_without_wrapping() {
    let frame = Frame::alloc_zeroed().unwrap();
    assert_eq!(frame.put_page(), 0);
    let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| frame.put_page()));
    assert!(res.is_err());
    assert_eq!(frame.use_count(), 0);
}
