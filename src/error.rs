use std::io;
use thiserror::Error;

/// Shared result type for fallible operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the device, its handles and mapping regions.
#[derive(Debug, Error)]
pub enum Error {
    /// Page or control-block allocation failed while opening a handle.
    #[error("resource exhausted: {0}")]
    ResourceExhaustion(#[source] io::Error),
    /// An address that no established region covers.
    #[error("invalid address {0:#x}")]
    InvalidAddress(usize),
    /// Mapping request that is empty, misaligned or overflows.
    #[error("invalid mapping range {start:#x}..{end:#x}")]
    InvalidRange { start: usize, end: usize },
    /// Operation issued against a handle that has already been closed.
    #[error("handle {0} is closed")]
    HandleClosed(u64),
    /// `close` delivered to a region that has no interests left.
    #[error("reference count underflow on region {start:#x}..{end:#x}")]
    RefCountUnderflow { start: usize, end: usize },
    /// Fault resolution failed and the faulting context gets a bus error.
    #[error("bus error at {0:#x}")]
    BusError(usize),
    /// Device name or minor already registered.
    #[error("device {0} busy")]
    DeviceBusy(String),
    #[error("no such device {0}")]
    NoSuchDevice(String),
}
