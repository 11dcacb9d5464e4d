use xe_devices::{load_le, store_le};

/// Bytes of register storage behind BAR0.
pub const REGISTER_FILE_SIZE: usize = 0x10_0000;
/// Mask applied to the access address before indexing the register file.
pub const REGISTER_FILE_MASK: u64 = 0xF_FFFF;

// Clock straps, as byte offsets into the register file.
pub const REG_GPU_CLK: usize = 0x210;
pub const REG_FSB_CLK: usize = 0x244;
pub const REG_MEM_CLK: usize = 0x254;
pub const REG_EDRAM_CLK: usize = 0x284;

const CLOCK_STRAPS: [(usize, u32); 4] = [
    (REG_GPU_CLK, 0x0900_0000),
    (REG_EDRAM_CLK, 0x1100_0C00),
    (REG_FSB_CLK, 0x1A00_0001),
    (REG_MEM_CLK, 0x1910_0000),
];

/// Replacement for the value read from one register index.
#[derive(Debug, Clone, Copy)]
pub enum RegisterOverride {
    Fixed(u64),
    /// Computed from the value the generic register-file read produced.
    Computed(fn(u64) -> u64),
}

impl RegisterOverride {
    fn apply(self, stored: u64) -> u64 {
        match self {
            Self::Fixed(value) => value,
            Self::Computed(f) => f(stored),
        }
    }
}

/// Register indices whose reads are hard-wired, consulted after the generic copy.
#[derive(Debug, Clone)]
pub struct OverrideTable {
    entries: Vec<(u32, RegisterOverride)>,
}

impl Default for OverrideTable {
    /// The status registers polled by the console's display driver during bring-up.
    fn default() -> Self {
        Self {
            entries: vec![
                (0x0A07, RegisterOverride::Fixed(0x0200_0000)),
                (0x1928, RegisterOverride::Fixed(0x0200_0000)),
                (0x1E54, RegisterOverride::Fixed(0)),
            ],
        }
    }
}

impl OverrideTable {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Adds or replaces the override for `index`.
    pub fn insert(&mut self, index: u32, value: RegisterOverride) {
        match self.entries.iter_mut().find(|(i, _)| *i == index) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((index, value)),
        }
    }

    pub fn get(&self, index: u32) -> Option<RegisterOverride> {
        self.entries
            .iter()
            .find_map(|&(i, value)| (i == index).then_some(value))
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.entries.iter().map(|(i, _)| *i)
    }

    pub(crate) fn apply(&self, index: u32, stored: u64) -> u64 {
        self.get(index).map_or(stored, |value| value.apply(stored))
    }
}

/// Flat byte storage for the controller's MMIO registers.
///
/// Accesses index by 32-bit register: the address is masked, divided by 4, and the copy starts
/// at the register boundary. A wide access on the last register reads zeros past the end and
/// drops the bytes it would write there.
pub struct RegisterFile {
    bytes: Box<[u8]>,
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl RegisterFile {
    /// Zeroed storage with the clock straps seeded.
    pub fn new() -> Self {
        let mut bytes = vec![0u8; REGISTER_FILE_SIZE].into_boxed_slice();
        for (offset, value) in CLOCK_STRAPS {
            bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
        }
        Self { bytes }
    }

    pub fn index_of(paddr: u64) -> u32 {
        ((paddr & REGISTER_FILE_MASK) / 4) as u32
    }

    pub fn read(&self, paddr: u64, size: usize) -> u64 {
        let offset = Self::index_of(paddr) as usize * 4;
        load_le(&self.bytes[offset..], size)
    }

    pub fn write(&mut self, paddr: u64, size: usize, value: u64) {
        let offset = Self::index_of(paddr) as usize * 4;
        store_le(&mut self.bytes[offset..], size, value);
    }

    pub fn read_u32(&self, index: u32) -> u32 {
        self.read(u64::from(index) * 4, 4) as u32
    }
}

impl core::fmt::Debug for RegisterFile {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RegisterFile")
            .field("size", &self.bytes.len())
            .finish_non_exhaustive()
    }
}
