//! Fixed physical memory map.

pub use xe_devices::pci::{PCI_CONFIG_REGION_ADDRESS, PCI_CONFIG_REGION_SIZE};

pub const RAM_START_ADDR: u64 = 0;
/// 512 MiB of main memory.
pub const RAM_SIZE: u64 = 0x2000_0000;

/// POST code output register.
pub const POST_BUS_ADDR: u64 = 0x200_0006_1010;
pub const POST_BUS_SIZE: u64 = 8;

/// Secondary bus number of the host bridge (GPU side).
pub const HOST_BRIDGE_BUS: u8 = 0;
/// Secondary bus number of the southbridge PCI bridge (USB, storage, audio...).
pub const SOUTHBRIDGE_BUS: u8 = 1;
