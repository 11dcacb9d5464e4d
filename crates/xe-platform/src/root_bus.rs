use crate::range::{AddressRange, BusError};
use xe_devices::pci::{PciBridge, PciConfigAddress, PCI_CONFIG_REGION_ADDRESS, PCI_CONFIG_REGION_SIZE};
use xe_devices::{all_ones, is_valid_access_size, BusDevice};

struct Registration {
    range: AddressRange,
    device: Box<dyn BusDevice>,
}

/// Where a CPU access at a given address would land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusTarget {
    /// Inside the PCI configuration window.
    PciConfig(PciConfigAddress),
    /// Decoded by a BAR of a device behind the bridge for this bus number.
    PciBar { bus: u8 },
    /// A flat-mapped device; `index` is its registration order.
    Device { index: usize },
}

/// The top-level physical address router.
///
/// Routing priority is fixed: the PCI configuration window first, then the bridges in
/// registration order (BAR decode), then flat devices. Flat device ranges are disjoint from each
/// other and from the configuration window; BARs are guest-programmed and are not checked
/// against flat ranges, so a BAR placed on top of a flat device shadows it.
#[derive(Default)]
pub struct RootBus {
    bridges: Vec<PciBridge>,
    devices: Vec<Registration>,
}

impl RootBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_bridge(&mut self, bridge: PciBridge) -> Result<(), BusError> {
        let bus = bridge.bus_number();
        if self.bridges.iter().any(|b| b.bus_number() == bus) {
            return Err(BusError::DuplicateBridge { bus });
        }
        tracing::debug!(bridge = bridge.name(), bus, "registered PCI bridge");
        self.bridges.push(bridge);
        Ok(())
    }

    /// Maps `device` at `range`, rejecting any overlap with an existing device or the
    /// configuration window.
    pub fn add_device(
        &mut self,
        range: AddressRange,
        device: Box<dyn BusDevice>,
    ) -> Result<(), BusError> {
        let window_end = PCI_CONFIG_REGION_ADDRESS + PCI_CONFIG_REGION_SIZE;
        if range.base() < window_end && PCI_CONFIG_REGION_ADDRESS < range.end_exclusive() {
            return Err(BusError::OverlapsConfigWindow {
                name: device.name().to_string(),
                range,
            });
        }
        if let Some(existing) = self.devices.iter().find(|r| r.range.overlaps(&range)) {
            return Err(BusError::Overlap {
                name: device.name().to_string(),
                range,
                existing: existing.device.name().to_string(),
                existing_range: existing.range,
            });
        }
        tracing::debug!(device = device.name(), %range, "mapped device");
        self.devices.push(Registration { range, device });
        Ok(())
    }

    pub fn bridge(&self, bus: u8) -> Option<&PciBridge> {
        self.bridges.iter().find(|b| b.bus_number() == bus)
    }

    pub fn bridge_mut(&mut self, bus: u8) -> Option<&mut PciBridge> {
        self.bridges.iter_mut().find(|b| b.bus_number() == bus)
    }

    pub fn bridges(&self) -> impl Iterator<Item = &PciBridge> + '_ {
        self.bridges.iter()
    }

    /// Flat-mapped devices as `(range, name)`, in registration order.
    pub fn devices(&self) -> impl Iterator<Item = (AddressRange, &str)> + '_ {
        self.devices.iter().map(|r| (r.range, r.device.name()))
    }

    /// Classifies `paddr` without performing an access.
    pub fn target(&self, paddr: u64) -> Option<BusTarget> {
        if let Some(addr) = PciConfigAddress::decode(paddr) {
            return Some(BusTarget::PciConfig(addr));
        }
        if let Some(bridge) = self.bridges.iter().find(|b| b.claims(paddr)) {
            return Some(BusTarget::PciBar {
                bus: bridge.bus_number(),
            });
        }
        self.devices
            .iter()
            .position(|r| r.range.contains(paddr))
            .map(|index| BusTarget::Device { index })
    }

    /// CPU-side read. Unclaimed addresses read as zero.
    pub fn read(&mut self, paddr: u64, size: usize) -> u64 {
        if !is_valid_access_size(size) {
            tracing::warn!(paddr = format_args!("0x{paddr:x}"), size, "invalid bus read size");
            return 0;
        }
        if PciConfigAddress::contains(paddr) {
            return self.config_read(paddr, size);
        }
        for bridge in &mut self.bridges {
            if let Some(value) = bridge.read(paddr, size) {
                return value;
            }
        }
        if let Some(reg) = self.devices.iter_mut().find(|r| r.range.contains(paddr)) {
            return reg.device.read(paddr, size);
        }
        tracing::trace!(paddr = format_args!("0x{paddr:x}"), size, "unmapped read");
        0
    }

    /// CPU-side write. Unclaimed writes are dropped.
    pub fn write(&mut self, paddr: u64, size: usize, value: u64) {
        if !is_valid_access_size(size) {
            tracing::warn!(paddr = format_args!("0x{paddr:x}"), size, "invalid bus write size");
            return;
        }
        if PciConfigAddress::contains(paddr) {
            self.config_write(paddr, size, value);
            return;
        }
        for bridge in &mut self.bridges {
            if bridge.write(paddr, size, value) {
                return;
            }
        }
        if let Some(reg) = self.devices.iter_mut().find(|r| r.range.contains(paddr)) {
            reg.device.write(paddr, size, value);
            return;
        }
        tracing::trace!(
            paddr = format_args!("0x{paddr:x}"),
            size,
            value = format_args!("0x{value:x}"),
            "unmapped write dropped"
        );
    }

    /// Configuration read, routed by bus number. Absent buses and functions read as all-ones.
    pub fn config_read(&mut self, paddr: u64, size: usize) -> u64 {
        if !is_valid_access_size(size) {
            return all_ones(size);
        }
        let Some(addr) = PciConfigAddress::decode(paddr) else {
            tracing::debug!(paddr = format_args!("0x{paddr:x}"), "config read outside the window");
            return all_ones(size);
        };
        match self.bridge_mut(addr.bdf.bus) {
            Some(bridge) => bridge.config_read(paddr, size),
            None => {
                tracing::trace!(bdf = %addr.bdf, "config read of absent bus");
                all_ones(size)
            }
        }
    }

    pub fn config_write(&mut self, paddr: u64, size: usize, value: u64) {
        if !is_valid_access_size(size) {
            return;
        }
        let Some(addr) = PciConfigAddress::decode(paddr) else {
            tracing::debug!(paddr = format_args!("0x{paddr:x}"), "config write outside the window");
            return;
        };
        match self.bridge_mut(addr.bdf.bus) {
            Some(bridge) => bridge.config_write(paddr, size, value),
            None => tracing::trace!(bdf = %addr.bdf, "config write to absent bus dropped"),
        }
    }
}

impl core::fmt::Debug for RootBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RootBus")
            .field("bridges", &self.bridges)
            .field("devices", &self.devices().collect::<Vec<_>>())
            .finish()
    }
}
