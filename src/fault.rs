use crate::memory::{page_align_down, Frame};
use crate::region::MappingRegion;
use log::{error, trace};

/// Fault code for a bus error, as adapters hand it back to the fault dispatcher.
pub const VM_FAULT_SIGBUS: u32 = 0x0002;

/// Terminal outcome of a fault that could not be resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultSignal {
    BusError,
}

impl FaultSignal {
    pub fn code(self) -> u32 {
        match self {
            FaultSignal::BusError => VM_FAULT_SIGBUS,
        }
    }
}

/// A page bound to a faulting address.
///
/// One page reference has already been taken on `frame` on behalf of the
/// mapping; whoever tears the mapping down must put it.
#[derive(Debug, Clone)]
pub struct ResolvedPage {
    pub frame: Frame,
    /// Faulting address rounded down to its page.
    pub page_addr: usize,
}

/// Resolve a fault at `addr` inside `region` to the backing page.
///
/// No "already resolved" state is kept here: every successful call takes one
/// more page reference and returns the same frame.
pub fn resolve(region: Option<&MappingRegion>, addr: usize) -> Result<ResolvedPage, FaultSignal> {
    let Some(region) = region else {
        error!("== fault: no region for {:#x} ==", addr);
        return Err(FaultSignal::BusError);
    };
    if !region.contains(addr) {
        error!(
            "== fault: invalid address {:#x} outside {:#x}..{:#x} ==",
            addr,
            region.start(),
            region.end()
        );
        return Err(FaultSignal::BusError);
    }
    let Some(frame) = region.resource().and_then(|r| r.frame()) else {
        error!("== fault: no backing page for {:#x} ==", addr);
        return Err(FaultSignal::BusError);
    };

    trace!("== fault ==");
    frame.get_page();
    Ok(ResolvedPage {
        frame,
        page_addr: page_align_down(addr),
    })
}
