//! Root address-space router for the console bus fabric.
//!
//! [`RootBus`] owns the PCI bridges and the flat-mapped system devices, classifies each CPU
//! access, and forwards it to exactly one target. Unclaimed accesses read as zero and drop
//! writes, like permissive hardware during boot probing.
#![forbid(unsafe_code)]

pub mod map;
mod post;
mod ram;
mod range;
mod root_bus;

pub use post::PostBus;
pub use ram::RamDevice;
pub use range::{AddressRange, BusError};
pub use root_bus::{BusTarget, RootBus};
