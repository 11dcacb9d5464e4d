use thiserror::Error;

/// Errors raised while building the bus topology.
///
/// Only construction can fail; accesses through a built [`crate::RootBus`] never error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("address range at 0x{base:x} is empty")]
    EmptyRange { base: u64 },
    #[error("address range overflows: base=0x{base:x} size=0x{size:x}")]
    RangeOverflow { base: u64, size: u64 },
    #[error("{name} at {range} overlaps {existing} at {existing_range}")]
    Overlap {
        name: String,
        range: AddressRange,
        existing: String,
        existing_range: AddressRange,
    },
    #[error("{name} at {range} overlaps the PCI configuration window")]
    OverlapsConfigWindow { name: String, range: AddressRange },
    #[error("a bridge for PCI bus {bus} is already registered")]
    DuplicateBridge { bus: u8 },
}

/// `[base, base + size)` in the physical address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    base: u64,
    size: u64,
}

impl AddressRange {
    pub fn new(base: u64, size: u64) -> Result<Self, BusError> {
        if size == 0 {
            return Err(BusError::EmptyRange { base });
        }
        if base.checked_add(size).is_none() {
            return Err(BusError::RangeOverflow { base, size });
        }
        Ok(Self { base, size })
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn end_exclusive(&self) -> u64 {
        self.base + self.size
    }

    pub fn contains(&self, paddr: u64) -> bool {
        paddr >= self.base && paddr - self.base < self.size
    }

    pub fn overlaps(&self, other: &AddressRange) -> bool {
        self.base < other.end_exclusive() && other.base < self.end_exclusive()
    }

    /// Offset of `paddr` from the start of the range.
    pub fn offset_of(&self, paddr: u64) -> Option<u64> {
        self.contains(paddr).then(|| paddr - self.base)
    }
}

impl core::fmt::Display for AddressRange {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "0x{:x}..0x{:x}", self.base, self.end_exclusive())
    }
}
