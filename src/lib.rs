pub mod address_space;
pub mod config;
pub mod device;
pub mod error;
pub mod fault;
pub mod memory;
pub mod region;
pub mod registry;
pub mod resource;

pub use error::{Error, Result};

#[cfg(test)]
mod tests;
