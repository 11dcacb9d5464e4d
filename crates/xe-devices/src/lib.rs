//! Device models and the PCI plumbing shared by every peripheral on the console bus.
//!
//! - [`BusDevice`] is the memory-mapped capability every addressable device implements.
//! - [`pci::PciDevice`] extends it with configuration-space access for PCI functions.
//! - [`pci::PciBridge`] owns a secondary bus and routes configuration and BAR traffic.
//! - [`usb`] holds the fixed-function USB host controllers found behind the PCI bridge.
#![forbid(unsafe_code)]

mod device;
pub mod pci;
pub mod usb;

pub use device::{all_ones, is_valid_access_size, load_le, store_le, BusDevice};
