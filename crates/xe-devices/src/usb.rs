//! Fixed-function USB host controllers behind the southbridge PCI bridge.
//!
//! These are deliberately thin: the configuration space is a fixed dump and the register window
//! is plain storage with the EHCI capability registers pre-seeded. They exist so the bus fabric
//! has real PCI functions to enumerate and route to besides the GPU.

use crate::pci::{PciBdf, PciCommand, PciConfigSpace, PciDevice};
use crate::{load_le, store_le, BusDevice};

/// Size of the register window behind each controller's BAR0.
pub const USB_CONTROLLER_DEV_SIZE: u64 = 0x1000;

pub const MICROSOFT_VENDOR_ID: u16 = 0x1414;
pub const EHCI_DEVICE_ID: u16 = 0x5805;

const PCI_CLASS_SERIAL_BUS: u8 = 0x0C;
const PCI_SUBCLASS_USB: u8 = 0x03;
const PCI_PROG_IF_EHCI: u8 = 0x20;

/// EHCI CAPLENGTH: operational registers start right after the capability block.
const EHCI_CAPLENGTH: u8 = 0x20;
const EHCI_HCIVERSION: u16 = 0x0100;
/// HCSPARAMS: N_PORTS=4 with port power control, N_PCC=4, N_CC=1.
const EHCI_HCSPARAMS: u32 = 0x0000_1414;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum UsbControllerKind {
    Ehci0,
    Ehci1,
}

impl UsbControllerKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Ehci0 => "ehci0",
            Self::Ehci1 => "ehci1",
        }
    }

    /// Device/function slot on the southbridge bus.
    pub fn slot(self) -> (u8, u8) {
        match self {
            Self::Ehci0 => (4, 1),
            Self::Ehci1 => (5, 1),
        }
    }

    pub fn bdf(self, bus: u8) -> PciBdf {
        let (device, function) = self.slot();
        PciBdf::new(bus, device, function)
    }

    pub fn default_bar0(self) -> u32 {
        match self {
            Self::Ehci0 => 0xEA00_3000,
            Self::Ehci1 => 0xEA00_5000,
        }
    }
}

pub struct UsbHostController {
    kind: UsbControllerKind,
    config: PciConfigSpace,
    regs: Box<[u8]>,
}

impl UsbHostController {
    pub fn new(kind: UsbControllerKind) -> Self {
        let mut config = PciConfigSpace::new(MICROSOFT_VENDOR_ID, EHCI_DEVICE_ID);
        config.set_class_code(PCI_CLASS_SERIAL_BUS, PCI_SUBCLASS_USB, PCI_PROG_IF_EHCI, 0x01);
        config.set_command(PciCommand::MEMORY_SPACE | PciCommand::BUS_MASTER);
        config.set_bar(0, kind.default_bar0());

        let mut regs = vec![0u8; USB_CONTROLLER_DEV_SIZE as usize].into_boxed_slice();
        regs[0] = EHCI_CAPLENGTH;
        regs[2..4].copy_from_slice(&EHCI_HCIVERSION.to_le_bytes());
        regs[4..8].copy_from_slice(&EHCI_HCSPARAMS.to_le_bytes());

        Self { kind, config, regs }
    }

    pub fn kind(&self) -> UsbControllerKind {
        self.kind
    }

    fn reg_offset(paddr: u64) -> usize {
        (paddr & (USB_CONTROLLER_DEV_SIZE - 1)) as usize
    }
}

impl BusDevice for UsbHostController {
    fn name(&self) -> &str {
        self.kind.name()
    }

    fn read(&mut self, paddr: u64, size: usize) -> u64 {
        let offset = Self::reg_offset(paddr);
        let value = load_le(&self.regs[offset..], size);
        tracing::trace!(dev = self.kind.name(), offset, size, value, "usb register read");
        value
    }

    fn write(&mut self, paddr: u64, size: usize, value: u64) {
        let offset = Self::reg_offset(paddr);
        tracing::trace!(dev = self.kind.name(), offset, size, value, "usb register write");
        // Capability registers are read-only.
        if offset < usize::from(EHCI_CAPLENGTH) {
            return;
        }
        store_le(&mut self.regs[offset..], size, value);
    }
}

impl PciDevice for UsbHostController {
    fn config(&self) -> &PciConfigSpace {
        &self.config
    }

    fn config_mut(&mut self) -> &mut PciConfigSpace {
        &mut self.config
    }

    fn bar_size(&self) -> u64 {
        USB_CONTROLLER_DEV_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_registers_are_seeded_and_read_only() {
        let mut ehci = UsbHostController::new(UsbControllerKind::Ehci0);
        let base = u64::from(UsbControllerKind::Ehci0.default_bar0());

        assert_eq!(ehci.mmio_read(base, 1), Some(0x20));
        assert_eq!(ehci.mmio_read(base + 2, 2), Some(0x0100));

        assert!(ehci.mmio_write(base, 4, 0));
        assert_eq!(ehci.mmio_read(base, 1), Some(0x20));
    }

    #[test]
    fn operational_registers_are_storage() {
        let mut ehci = UsbHostController::new(UsbControllerKind::Ehci1);
        let base = u64::from(UsbControllerKind::Ehci1.default_bar0());

        assert!(ehci.mmio_write(base + 0x20, 4, 0x0008_0001));
        assert_eq!(ehci.mmio_read(base + 0x20, 4), Some(0x0008_0001));
        assert_eq!(ehci.mmio_read(base + 0x2000, 4), None);
    }

    #[test]
    fn config_space_identifies_an_ehci_controller() {
        let ehci = UsbHostController::new(UsbControllerKind::Ehci0);
        let class = ehci.config().class_code();
        assert_eq!(
            (class.class, class.subclass, class.prog_if),
            (0x0C, 0x03, 0x20)
        );
        assert_eq!(ehci.config().vendor_device_id().device_id, EHCI_DEVICE_ID);
    }

    #[test]
    fn register_window_wraps_at_its_size_without_faulting() {
        let mut ehci = UsbHostController::new(UsbControllerKind::Ehci0);
        // Inclusive BAR end: base + size decodes and masks back to offset 0.
        let base = u64::from(UsbControllerKind::Ehci0.default_bar0());
        assert_eq!(ehci.mmio_read(base + USB_CONTROLLER_DEV_SIZE, 1), Some(0x20));
        assert_eq!(ehci.read(base + 0xFFF, 8), 0);
    }
}
