use crate::memory::{Frame, PAGE_SIZE};
use crate::Result;
use log::{debug, trace, warn};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Fixed text written at the start of every backing page.
pub const PAYLOAD_PREFIX: &str = "My mmap options implement, this is file: ";

/// Identity of one open handle.
#[derive(Debug, Clone)]
pub struct HandleContext {
    pub id: u64,
    /// Name the consumer opened the device under; it ends up in the payload.
    pub file_name: String,
}

/// The single page that backs every mapping made through one handle.
///
/// Exclusively owned by its handle. Mapping regions only keep a weak
/// back-reference. Releasing empties the page slot no matter who still holds
/// the resource, so later faults find no page.
#[derive(Debug)]
pub struct BackingResource {
    handle_id: u64,
    frame: RwLock<Option<Frame>>,
    payload_len: usize,
}

impl BackingResource {
    /// Allocate the page and write `PAYLOAD_PREFIX` followed by `name` into it.
    ///
    /// The resource becomes visible only after the payload is in place; an
    /// allocation failure leaves nothing behind.
    pub fn acquire(ctx: &HandleContext, name: &str) -> Result<Arc<Self>> {
        trace!("== acquire ==");
        let mut frame = Frame::alloc_zeroed()?;
        let payload_len = write_payload(&mut frame, name);
        debug!(
            "handle {}: backing page {:#x} holds {} payload bytes",
            ctx.id,
            frame.pfn(),
            payload_len
        );
        Ok(Arc::new(Self {
            handle_id: ctx.id,
            frame: RwLock::new(Some(frame)),
            payload_len,
        }))
    }

    /// Free the page by dropping the allocator's reference to it.
    ///
    /// Regions still referring to this resource are the caller's contract
    /// violation; their faults resolve to a bus error from now on. Pages
    /// already bound by earlier faults keep their own references.
    pub fn release(&self) {
        trace!("== release ==");
        let taken = self.slot_mut().take();
        let Some(frame) = taken else {
            warn!("handle {}: page already released", self.handle_id);
            return;
        };
        let left = frame.put_page();
        debug!(
            "handle {}: released page {:#x}, use count now {}",
            self.handle_id,
            frame.pfn(),
            left
        );
    }

    pub fn is_released(&self) -> bool {
        self.slot().is_none()
    }

    /// The backing page, until the resource is released.
    #[inline]
    pub fn frame(&self) -> Option<Frame> {
        self.slot().clone()
    }

    pub fn handle_id(&self) -> u64 {
        self.handle_id
    }

    /// Bytes written at creation: prefix plus name, truncated to one page.
    /// Empty once released.
    pub fn payload(&self) -> Vec<u8> {
        self.slot()
            .as_ref()
            .map(|f| f.as_bytes()[..self.payload_len].to_vec())
            .unwrap_or_default()
    }

    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload()).into_owned()
    }

    fn slot(&self) -> RwLockReadGuard<'_, Option<Frame>> {
        self.frame.read().unwrap_or_else(|e| e.into_inner())
    }

    fn slot_mut(&self) -> RwLockWriteGuard<'_, Option<Frame>> {
        self.frame.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for BackingResource {
    fn drop(&mut self) {
        if !self.is_released() {
            self.release();
        }
    }
}

fn write_payload(frame: &mut Frame, name: &str) -> usize {
    let prefix = PAYLOAD_PREFIX.as_bytes();
    // A freshly allocated frame is uniquely owned, so both writes succeed.
    let head = frame.write_at(0, prefix).unwrap_or(0);
    let tail = if head < PAGE_SIZE {
        frame.write_at(head, name.as_bytes()).unwrap_or(0)
    } else {
        0
    };
    head + tail
}
