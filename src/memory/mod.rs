pub mod frame;
pub use frame::Frame;

/// Page size in bytes.
pub const PAGE_SIZE: usize = 4096;

#[inline]
pub fn is_page_aligned(addr: usize) -> bool {
    addr % PAGE_SIZE == 0
}

#[inline]
pub fn page_align_down(addr: usize) -> usize {
    addr & !(PAGE_SIZE - 1)
}
