//! PCI core types: addresses, configuration space, the device trait and the bridge.

mod bridge;
mod config;

pub use bridge::{BarConflict, PciBridge};
pub use config::{
    PciClassCode, PciCommand, PciConfigSpace, PciVendorDeviceId, PCI_BAR0_OFFSET, PCI_BAR_COUNT,
    PCI_CLASS_CODE_OFFSET, PCI_COMMAND_OFFSET, PCI_CONFIG_SPACE_SIZE, PCI_DEVICE_ID_OFFSET,
    PCI_HEADER_TYPE_OFFSET, PCI_INTERRUPT_LINE_OFFSET, PCI_INTERRUPT_PIN_OFFSET,
    PCI_REVISION_ID_OFFSET, PCI_STATUS_OFFSET, PCI_SUBSYSTEM_ID_OFFSET,
    PCI_SUBSYSTEM_VENDOR_ID_OFFSET, PCI_VENDOR_ID_OFFSET,
};

use crate::BusDevice;

/// Base of the PCI configuration address window.
pub const PCI_CONFIG_REGION_ADDRESS: u64 = 0xD000_0000;
/// Size of the PCI configuration address window (16 buses of 1 MiB each).
pub const PCI_CONFIG_REGION_SIZE: u64 = 0x0100_0000;

/// PCI bus/device/function identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct PciBdf {
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

impl PciBdf {
    /// Creates a new BDF.
    ///
    /// The caller is responsible for keeping the values within the window's ranges:
    /// bus < 16, device < 32, function < 8.
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }
}

impl core::fmt::Display for PciBdf {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}

/// A decoded access inside the PCI configuration window.
///
/// Layout of the offset from [`PCI_CONFIG_REGION_ADDRESS`] (LSB..MSB):
/// - bits 0..=11: register
/// - bits 12..=14: function
/// - bits 15..=19: device
/// - bits 20..=23: bus
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PciConfigAddress {
    pub bdf: PciBdf,
    pub register: u16,
}

impl PciConfigAddress {
    pub fn contains(paddr: u64) -> bool {
        paddr >= PCI_CONFIG_REGION_ADDRESS
            && paddr - PCI_CONFIG_REGION_ADDRESS < PCI_CONFIG_REGION_SIZE
    }

    /// Decodes `paddr`, or returns `None` when it lies outside the configuration window.
    pub fn decode(paddr: u64) -> Option<Self> {
        if !Self::contains(paddr) {
            return None;
        }
        let offset = paddr - PCI_CONFIG_REGION_ADDRESS;
        Some(Self {
            bdf: PciBdf::new(
                ((offset >> 20) & 0xF) as u8,
                ((offset >> 15) & 0x1F) as u8,
                ((offset >> 12) & 0x7) as u8,
            ),
            register: (offset & 0xFFF) as u16,
        })
    }

    pub fn encode(bdf: PciBdf, register: u16) -> u64 {
        PCI_CONFIG_REGION_ADDRESS
            | (u64::from(bdf.bus & 0xF) << 20)
            | (u64::from(bdf.device & 0x1F) << 15)
            | (u64::from(bdf.function & 0x7) << 12)
            | u64::from(register & 0xFFF)
    }

    /// Byte offset into the 256-byte configuration space.
    pub fn offset(&self) -> u8 {
        (self.register & 0xFF) as u8
    }
}

/// A PCI function: a [`BusDevice`] that also owns a configuration space and claims memory through
/// its BARs.
pub trait PciDevice: BusDevice {
    fn config(&self) -> &PciConfigSpace;

    fn config_mut(&mut self) -> &mut PciConfigSpace;

    /// Size of the window claimed behind every programmed BAR.
    fn bar_size(&self) -> u64;

    fn config_read(&mut self, offset: u8, size: usize) -> u64 {
        self.config().read(offset, size)
    }

    fn config_write(&mut self, offset: u8, size: usize, value: u64) {
        self.config_mut().write(offset, size, value);
    }

    fn is_address_mapped(&self, paddr: u64) -> bool {
        self.config().bars_decode(paddr, self.bar_size())
    }

    /// BAR-gated read: `None` means "not mine" and lets the caller try the next device.
    fn mmio_read(&mut self, paddr: u64, size: usize) -> Option<u64> {
        if !self.is_address_mapped(paddr) {
            return None;
        }
        Some(self.read(paddr, size))
    }

    /// BAR-gated write: returns whether the device accepted it.
    fn mmio_write(&mut self, paddr: u64, size: usize, value: u64) -> bool {
        if !self.is_address_mapped(paddr) {
            return false;
        }
        self.write(paddr, size, value);
        true
    }
}
