use bitflags::bitflags;

use crate::{load_le, store_le};

pub const PCI_CONFIG_SPACE_SIZE: usize = 256;
pub const PCI_BAR_COUNT: usize = 6;

pub const PCI_VENDOR_ID_OFFSET: u8 = 0x00;
pub const PCI_DEVICE_ID_OFFSET: u8 = 0x02;
pub const PCI_COMMAND_OFFSET: u8 = 0x04;
pub const PCI_STATUS_OFFSET: u8 = 0x06;
pub const PCI_REVISION_ID_OFFSET: u8 = 0x08;
/// Programming interface (0x09), subclass (0x0A), base class (0x0B).
pub const PCI_CLASS_CODE_OFFSET: u8 = 0x09;
pub const PCI_HEADER_TYPE_OFFSET: u8 = 0x0E;
pub const PCI_BAR0_OFFSET: u8 = 0x10;
pub const PCI_SUBSYSTEM_VENDOR_ID_OFFSET: u8 = 0x2C;
pub const PCI_SUBSYSTEM_ID_OFFSET: u8 = 0x2E;
pub const PCI_INTERRUPT_LINE_OFFSET: u8 = 0x3C;
pub const PCI_INTERRUPT_PIN_OFFSET: u8 = 0x3D;

/// Memory BARs carry type/prefetch flags in their low nibble.
const PCI_BAR_MEM_FLAGS_MASK: u32 = 0xF;

bitflags! {
    /// PCI command register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PciCommand: u16 {
        const IO_SPACE = 1 << 0;
        const MEMORY_SPACE = 1 << 1;
        const BUS_MASTER = 1 << 2;
        const PARITY_ERROR_RESPONSE = 1 << 6;
        const SERR_ENABLE = 1 << 8;
        const INTX_DISABLE = 1 << 10;
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PciVendorDeviceId {
    pub vendor_id: u16,
    pub device_id: u16,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct PciClassCode {
    pub class: u8,
    pub subclass: u8,
    pub prog_if: u8,
    pub revision_id: u8,
}

/// 256-byte configuration space of one PCI function (type 0 header).
///
/// The bytes are the single source of truth: BARs, IDs and the command register are read back
/// out of them on demand, so a guest write to any header field is immediately reflected in the
/// device's decode behaviour.
#[derive(Clone, PartialEq, Eq)]
pub struct PciConfigSpace {
    bytes: [u8; PCI_CONFIG_SPACE_SIZE],
}

impl core::fmt::Debug for PciConfigSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PciConfigSpace")
            .field("ids", &self.vendor_device_id())
            .field("command", &self.command())
            .field("bars", &core::array::from_fn::<u32, PCI_BAR_COUNT, _>(|i| self.bar(i)))
            .finish()
    }
}

impl PciConfigSpace {
    pub fn new(vendor_id: u16, device_id: u16) -> Self {
        let mut cfg = Self {
            bytes: [0u8; PCI_CONFIG_SPACE_SIZE],
        };
        cfg.write_u16(PCI_VENDOR_ID_OFFSET, vendor_id);
        cfg.write_u16(PCI_DEVICE_ID_OFFSET, device_id);
        cfg
    }

    /// Builds a configuration space from a dump captured as 64 little-endian dwords.
    pub fn from_dwords(dump: &[u32; PCI_CONFIG_SPACE_SIZE / 4]) -> Self {
        let mut bytes = [0u8; PCI_CONFIG_SPACE_SIZE];
        for (chunk, dword) in bytes.chunks_exact_mut(4).zip(dump) {
            chunk.copy_from_slice(&dword.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8; PCI_CONFIG_SPACE_SIZE] {
        &self.bytes
    }

    /// Reads `size` bytes at `offset`.
    ///
    /// Bytes past the end of the 256-byte space read as zero; the access never wraps back into
    /// the header.
    pub fn read(&self, offset: u8, size: usize) -> u64 {
        load_le(&self.bytes[usize::from(offset)..], size)
    }

    /// Writes the low `size` bytes of `value` at `offset`.
    ///
    /// Only the addressed bytes change. Bytes that would fall past the end of the space are
    /// dropped, so a wide write near the top never corrupts the header.
    pub fn write(&mut self, offset: u8, size: usize, value: u64) {
        store_le(&mut self.bytes[usize::from(offset)..], size, value);
    }

    fn read_u16(&self, offset: u8) -> u16 {
        self.read(offset, 2) as u16
    }

    fn write_u16(&mut self, offset: u8, value: u16) {
        self.write(offset, 2, u64::from(value));
    }

    pub fn vendor_device_id(&self) -> PciVendorDeviceId {
        PciVendorDeviceId {
            vendor_id: self.read_u16(PCI_VENDOR_ID_OFFSET),
            device_id: self.read_u16(PCI_DEVICE_ID_OFFSET),
        }
    }

    pub fn class_code(&self) -> PciClassCode {
        PciClassCode {
            revision_id: self.bytes[0x08],
            prog_if: self.bytes[0x09],
            subclass: self.bytes[0x0a],
            class: self.bytes[0x0b],
        }
    }

    pub fn set_class_code(&mut self, class: u8, subclass: u8, prog_if: u8, revision_id: u8) {
        self.bytes[0x08] = revision_id;
        self.bytes[0x09] = prog_if;
        self.bytes[0x0a] = subclass;
        self.bytes[0x0b] = class;
    }

    pub fn header_type(&self) -> u8 {
        self.bytes[usize::from(PCI_HEADER_TYPE_OFFSET)]
    }

    pub fn command(&self) -> PciCommand {
        PciCommand::from_bits_retain(self.read_u16(PCI_COMMAND_OFFSET))
    }

    pub fn set_command(&mut self, command: PciCommand) {
        self.write_u16(PCI_COMMAND_OFFSET, command.bits());
    }

    pub fn interrupt_line(&self) -> u8 {
        self.bytes[usize::from(PCI_INTERRUPT_LINE_OFFSET)]
    }

    /// Raw 32-bit value of BAR `index`, or 0 for an index past BAR5.
    pub fn bar(&self, index: usize) -> u32 {
        if index >= PCI_BAR_COUNT {
            return 0;
        }
        self.read(Self::bar_offset(index), 4) as u32
    }

    pub fn set_bar(&mut self, index: usize, value: u32) {
        if index >= PCI_BAR_COUNT {
            return;
        }
        self.write(Self::bar_offset(index), 4, u64::from(value));
    }

    /// BAR `index` with the memory-BAR flag bits cleared.
    pub fn bar_base(&self, index: usize) -> u32 {
        self.bar(index) & !PCI_BAR_MEM_FLAGS_MASK
    }

    pub const fn bar_offset(index: usize) -> u8 {
        PCI_BAR0_OFFSET + (index as u8) * 4
    }

    /// Returns whether any programmed BAR decodes `paddr`, given the device's claimed `size`.
    ///
    /// - Only the low 32 bits of `paddr` are compared: BARs are 32-bit and the CPU reaches device
    ///   windows through high physical aliases.
    /// - The upper bound is inclusive (`base <= addr <= base + size`), as on the reference
    ///   hardware dumps.
    /// - A BAR whose base is zero is unassigned and decodes nothing. Captured dumps leave unused
    ///   BARs at zero, and letting them decode would claim the bottom of RAM.
    pub fn bars_decode(&self, paddr: u64, size: u64) -> bool {
        let addr = u64::from(paddr as u32);
        (0..PCI_BAR_COUNT).any(|index| {
            let base = u64::from(self.bar_base(index));
            base != 0 && addr >= base && addr <= base + size
        })
    }
}
