use xe_devices::BusDevice;
use xe_memory::SharedGuestRam;

/// Main memory as seen from the bus.
///
/// The backing [`SharedGuestRam`] is shared with devices that read guest memory directly (the
/// display controller's scanout), so CPU writes through the bus are visible to them without a
/// copy.
#[derive(Debug, Clone)]
pub struct RamDevice {
    base: u64,
    ram: SharedGuestRam,
}

impl RamDevice {
    pub fn new(base: u64, ram: SharedGuestRam) -> Self {
        Self { base, ram }
    }

    pub fn ram(&self) -> &SharedGuestRam {
        &self.ram
    }

    /// Bytes of the access that fall inside RAM, as `(offset, len)`.
    fn clamp(&self, paddr: u64, size: usize) -> Option<(u64, usize)> {
        use xe_memory::GuestMemory;

        let offset = paddr.checked_sub(self.base)?;
        let remaining = self.ram.size().checked_sub(offset)?;
        let len = size.min(8).min(usize::try_from(remaining).unwrap_or(usize::MAX));
        (len > 0).then_some((offset, len))
    }
}

impl BusDevice for RamDevice {
    fn name(&self) -> &str {
        "ram"
    }

    fn read(&mut self, paddr: u64, size: usize) -> u64 {
        let Some((offset, len)) = self.clamp(paddr, size) else {
            return 0;
        };
        let mut buf = [0u8; 8];
        match self.ram.read_shared(offset, &mut buf[..len]) {
            Ok(()) => u64::from_le_bytes(buf),
            Err(err) => {
                tracing::debug!(%err, "ram read failed");
                0
            }
        }
    }

    fn write(&mut self, paddr: u64, size: usize, value: u64) {
        let Some((offset, len)) = self.clamp(paddr, size) else {
            return;
        };
        if let Err(err) = self.ram.write_shared(offset, &value.to_le_bytes()[..len]) {
            tracing::debug!(%err, "ram write dropped");
        }
    }
}
