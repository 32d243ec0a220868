use crate::memory::PAGE_SIZE;
use crate::{Error, Result};
use libc::{c_void, mmap, munmap, MAP_ANON, MAP_FAILED, MAP_PRIVATE, PROT_READ, PROT_WRITE};
use std::io;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// One page-sized, page-aligned physical page.
///
/// The page is obtained from an anonymous private mapping, so it starts out
/// zero-filled. `use_count` is the page-accounting counter shared with the
/// platform: the allocator holds one reference, and every resolved fault
/// takes one more. It is independent of how many `Frame` handles exist,
/// which only govern when the memory is returned to the host.
struct FrameInner {
    ptr: NonNull<u8>,
    use_count: AtomicUsize,
}

// Safety: the page is only written through `Frame::write_at`, which requires
// a unique handle. Shared handles only read it.
unsafe impl Send for FrameInner {}
unsafe impl Sync for FrameInner {}

impl Drop for FrameInner {
    fn drop(&mut self) {
        unsafe {
            let _ = munmap(self.ptr.as_ptr() as *mut c_void, PAGE_SIZE);
        }
    }
}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_ALLOC: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Make the calling thread's next `Frame::alloc_zeroed` fail.
#[cfg(test)]
pub(crate) fn fail_next_alloc() {
    FAIL_NEXT_ALLOC.with(|f| f.set(true));
}

/// Handle to a single page frame. Clones refer to the same page.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

impl Frame {
    /// Allocate one zero-filled page with a use count of 1.
    pub fn alloc_zeroed() -> Result<Self> {
        #[cfg(test)]
        if FAIL_NEXT_ALLOC.with(|f| f.replace(false)) {
            return Err(Error::ResourceExhaustion(io::Error::from(
                io::ErrorKind::OutOfMemory,
            )));
        }
        let raw = unsafe {
            mmap(
                std::ptr::null_mut(),
                PAGE_SIZE,
                PROT_READ | PROT_WRITE,
                MAP_PRIVATE | MAP_ANON,
                -1,
                0,
            )
        };
        if raw == MAP_FAILED {
            return Err(Error::ResourceExhaustion(io::Error::last_os_error()));
        }
        let ptr = NonNull::new(raw as *mut u8).ok_or_else(|| {
            Error::ResourceExhaustion(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "mmap returned null",
            ))
        })?;
        Ok(Self {
            inner: Arc::new(FrameInner {
                ptr,
                use_count: AtomicUsize::new(1),
            }),
        })
    }

    /// Page frame number, derived from the page's address.
    #[inline]
    pub fn pfn(&self) -> usize {
        self.inner.ptr.as_ptr() as usize / PAGE_SIZE
    }

    pub fn ptr_eq(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.inner.ptr.as_ptr(), PAGE_SIZE) }
    }

    /// Copy `data` into the page at `offset`, truncating at the page end.
    /// Returns the number of bytes written.
    ///
    /// Only possible while this is the sole handle to the frame.
    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Option<usize> {
        if Arc::get_mut(&mut self.inner).is_none() || offset > PAGE_SIZE {
            return None;
        }
        let len = data.len().min(PAGE_SIZE - offset);
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.inner.ptr.as_ptr().add(offset), len);
        }
        Some(len)
    }

    /// Take one page reference (`get_page`).
    #[inline]
    pub fn get_page(&self) {
        self.inner.use_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Drop one page reference (`put_page`), returning the remaining count.
    pub fn put_page(&self) -> usize {
        match self
            .inner
            .use_count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
        {
            Ok(prev) => prev - 1,
            Err(_) => panic!("put_page on free page {:#x}", self.pfn()),
        }
    }

    #[inline]
    pub fn use_count(&self) -> usize {
        self.inner.use_count.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("pfn", &format_args!("{:#x}", self.pfn()))
            .field("use_count", &self.use_count())
            .finish()
    }
}
