//! Main RAM shared between the bus-access path and the display production loop.
//!
//! # Benign race region
//! The CPU writes the framebuffer through ordinary bus writes while the production loop samples
//! it once per frame. Nothing orders the two: a frame may show a partially updated picture. That
//! tearing is accepted. What must never happen is undefined behaviour or an out-of-bounds access,
//! so every byte is stored as an [`AtomicU8`] and accessed with [`Ordering::Relaxed`], which
//! compiles to plain loads/stores on every host we care about while keeping the race well-defined.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use crate::phys::{checked_range, GuestMemory, GuestMemoryError, GuestMemoryResult};

/// Cloneable handle to guest main RAM.
///
/// All clones alias the same storage. Writes through one handle become visible to the others
/// without any synchronization beyond relaxed atomics.
#[derive(Clone)]
pub struct SharedGuestRam {
    bytes: Arc<[AtomicU8]>,
}

impl core::fmt::Debug for SharedGuestRam {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SharedGuestRam")
            .field("size", &self.bytes.len())
            .finish()
    }
}

impl SharedGuestRam {
    pub fn new(size: u64) -> GuestMemoryResult<Self> {
        let len = usize::try_from(size).map_err(|_| GuestMemoryError::SizeTooLarge { size })?;
        let bytes = (0..len).map(|_| AtomicU8::new(0)).collect::<Arc<[AtomicU8]>>();
        Ok(Self { bytes })
    }

    /// Copies `dst.len()` bytes starting at `paddr` out of RAM.
    pub fn read_shared(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        let range = checked_range(self.size(), paddr, dst.len())?;
        for (slot, byte) in dst.iter_mut().zip(&self.bytes[range]) {
            *slot = byte.load(Ordering::Relaxed);
        }
        Ok(())
    }

    /// Writes `src` into RAM starting at `paddr`.
    ///
    /// Takes `&self`: any clone of the handle may write.
    pub fn write_shared(&self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        let range = checked_range(self.size(), paddr, src.len())?;
        for (byte, value) in self.bytes[range].iter().zip(src) {
            byte.store(*value, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Returns a read-only view of `[base, base + len)`.
    ///
    /// The window is validated once here; reads through the view are bounds-checked against it.
    pub fn view(&self, base: u64, len: usize) -> GuestMemoryResult<GuestRamView> {
        checked_range(self.size(), base, len)?;
        Ok(GuestRamView {
            ram: self.clone(),
            base,
            len,
        })
    }
}

impl GuestMemory for SharedGuestRam {
    fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    fn read_into(&self, paddr: u64, dst: &mut [u8]) -> GuestMemoryResult<()> {
        self.read_shared(paddr, dst)
    }

    fn write_from(&mut self, paddr: u64, src: &[u8]) -> GuestMemoryResult<()> {
        self.write_shared(paddr, src)
    }
}

/// Byte-addressable, read-only window into [`SharedGuestRam`].
///
/// This is what the memory subsystem hands to the display controller for the framebuffer.
#[derive(Clone, Debug)]
pub struct GuestRamView {
    ram: SharedGuestRam,
    base: u64,
    len: usize,
}

impl GuestRamView {
    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copies the start of the window into `dst`.
    ///
    /// At most `self.len()` bytes are copied; any excess in `dst` is left untouched. Returns the
    /// number of bytes copied.
    pub fn snapshot_into(&self, dst: &mut [u8]) -> usize {
        let n = dst.len().min(self.len);
        // The window was validated in `SharedGuestRam::view`, so this cannot fail.
        match self.ram.read_shared(self.base, &mut dst[..n]) {
            Ok(()) => n,
            Err(_) => 0,
        }
    }

    /// Reads a little-endian `u32` at `offset` bytes into the window.
    pub fn read_u32_le(&self, offset: usize) -> Option<u32> {
        let end = offset.checked_add(4)?;
        if end > self.len {
            return None;
        }
        let mut buf = [0u8; 4];
        self.ram
            .read_shared(self.base + offset as u64, &mut buf)
            .ok()?;
        Some(u32::from_le_bytes(buf))
    }
}
