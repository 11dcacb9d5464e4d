use crate::pci::{PciBdf, PciConfigAddress, PciConfigSpace, PciDevice, PCI_BAR_COUNT};
use crate::{all_ones, BusDevice};

struct PciSlot {
    bdf: PciBdf,
    device: Box<dyn PciDevice>,
}

/// Two devices on the same bridge whose programmed BARs claim overlapping addresses.
///
/// BAR routing resolves such overlaps by enumeration order (the device attached first wins). The
/// conflict is reported rather than corrected: guest software may rely on that order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BarConflict {
    pub winner: PciBdf,
    pub winner_bar: u8,
    pub shadowed: PciBdf,
    pub shadowed_bar: u8,
}

/// A PCI bridge and the secondary bus behind it.
///
/// The bridge owns its devices. Configuration accesses are routed by device/function; BAR-mapped
/// accesses go to the first attached device whose BARs decode the address.
pub struct PciBridge {
    name: &'static str,
    bus: u8,
    slots: Vec<PciSlot>,
}

impl PciBridge {
    pub fn new(name: &'static str, secondary_bus: u8) -> Self {
        Self {
            name,
            bus: secondary_bus,
            slots: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn bus_number(&self) -> u8 {
        self.bus
    }

    /// Attaches `device` at `device_number`/`function` on this bridge's bus.
    ///
    /// Enumeration order is attach order.
    pub fn attach(&mut self, device_number: u8, function: u8, device: Box<dyn PciDevice>) -> PciBdf {
        let bdf = PciBdf::new(self.bus, device_number, function);
        assert!(
            self.slots.iter().all(|slot| slot.bdf != bdf),
            "duplicate PCI BDF {bdf} on {}",
            self.name
        );
        self.slots.push(PciSlot { bdf, device });

        for conflict in self.bar_conflicts() {
            if conflict.shadowed == bdf {
                tracing::warn!(
                    bridge = self.name,
                    winner = %conflict.winner,
                    winner_bar = conflict.winner_bar,
                    shadowed = %conflict.shadowed,
                    shadowed_bar = conflict.shadowed_bar,
                    "overlapping BARs; the earlier device wins"
                );
            }
        }
        bdf
    }

    pub fn iter_bdfs(&self) -> impl Iterator<Item = PciBdf> + '_ {
        self.slots.iter().map(|slot| slot.bdf)
    }

    pub fn device(&self, bdf: PciBdf) -> Option<&dyn PciDevice> {
        self.slots
            .iter()
            .find(|slot| slot.bdf == bdf)
            .map(|slot| slot.device.as_ref())
    }

    pub fn device_config(&self, bdf: PciBdf) -> Option<&PciConfigSpace> {
        self.device(bdf).map(|dev| dev.config())
    }

    fn slot_mut(&mut self, bdf: PciBdf) -> Option<&mut PciSlot> {
        self.slots.iter_mut().find(|slot| slot.bdf == bdf)
    }

    /// Configuration read at the absolute configuration-window address `paddr`.
    ///
    /// Absent functions read as all-ones.
    pub fn config_read(&mut self, paddr: u64, size: usize) -> u64 {
        let Some(addr) = self.decode_own(paddr) else {
            return all_ones(size);
        };
        match self.slot_mut(addr.bdf) {
            Some(slot) => slot.device.config_read(addr.offset(), size),
            None => {
                tracing::trace!(bridge = self.name, bdf = %addr.bdf, "config read of absent function");
                all_ones(size)
            }
        }
    }

    pub fn config_write(&mut self, paddr: u64, size: usize, value: u64) {
        let Some(addr) = self.decode_own(paddr) else {
            return;
        };
        match self.slot_mut(addr.bdf) {
            Some(slot) => slot.device.config_write(addr.offset(), size, value),
            None => {
                tracing::trace!(bridge = self.name, bdf = %addr.bdf, "config write to absent function dropped");
            }
        }
    }

    fn decode_own(&self, paddr: u64) -> Option<PciConfigAddress> {
        PciConfigAddress::decode(paddr).filter(|addr| addr.bdf.bus == self.bus)
    }

    /// Returns whether any attached device's BARs decode `paddr`.
    pub fn claims(&self, paddr: u64) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.device.is_address_mapped(paddr))
    }

    /// BAR-mapped read; `None` when no attached device decodes `paddr`.
    pub fn read(&mut self, paddr: u64, size: usize) -> Option<u64> {
        self.slots
            .iter_mut()
            .find_map(|slot| slot.device.mmio_read(paddr, size))
    }

    /// BAR-mapped write; returns whether some device accepted it.
    pub fn write(&mut self, paddr: u64, size: usize, value: u64) -> bool {
        self.slots
            .iter_mut()
            .any(|slot| slot.device.mmio_write(paddr, size, value))
    }

    /// Lists every pair of BARs (on different devices) whose decode ranges intersect.
    pub fn bar_conflicts(&self) -> Vec<BarConflict> {
        let mut conflicts = Vec::new();
        for (i, earlier) in self.slots.iter().enumerate() {
            for later in &self.slots[i + 1..] {
                for (winner_bar, a) in decoded_ranges(earlier) {
                    for (shadowed_bar, b) in decoded_ranges(later) {
                        if a.0 <= b.1 && b.0 <= a.1 {
                            conflicts.push(BarConflict {
                                winner: earlier.bdf,
                                winner_bar,
                                shadowed: later.bdf,
                                shadowed_bar,
                            });
                        }
                    }
                }
            }
        }
        conflicts
    }
}

/// Inclusive `(start, end)` decode ranges of a slot's assigned BARs.
fn decoded_ranges(slot: &PciSlot) -> impl Iterator<Item = (u8, (u64, u64))> + '_ {
    let size = slot.device.bar_size();
    (0..PCI_BAR_COUNT).filter_map(move |index| {
        let base = u64::from(slot.device.config().bar_base(index));
        (base != 0).then_some((index as u8, (base, base + size)))
    })
}

impl core::fmt::Debug for PciBridge {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PciBridge")
            .field("name", &self.name)
            .field("bus", &self.bus)
            .field(
                "devices",
                &self
                    .slots
                    .iter()
                    .map(|slot| (slot.bdf, slot.device.name()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pci::PciConfigAddress;
    use crate::{load_le, store_le};

    struct StubPciDevice {
        name: &'static str,
        cfg: PciConfigSpace,
        regs: [u8; 0x20],
    }

    impl StubPciDevice {
        fn new(name: &'static str, device_id: u16, bar0: u32) -> Self {
            let mut cfg = PciConfigSpace::new(0x1414, device_id);
            cfg.set_bar(0, bar0);
            Self {
                name,
                cfg,
                regs: [0; 0x20],
            }
        }
    }

    impl BusDevice for StubPciDevice {
        fn name(&self) -> &str {
            self.name
        }

        fn read(&mut self, paddr: u64, size: usize) -> u64 {
            load_le(&self.regs[(paddr & 0x1F) as usize..], size)
        }

        fn write(&mut self, paddr: u64, size: usize, value: u64) {
            store_le(&mut self.regs[(paddr & 0x1F) as usize..], size, value);
        }
    }

    impl PciDevice for StubPciDevice {
        fn config(&self) -> &PciConfigSpace {
            &self.cfg
        }

        fn config_mut(&mut self) -> &mut PciConfigSpace {
            &mut self.cfg
        }

        fn bar_size(&self) -> u64 {
            0x20
        }
    }

    #[test]
    fn config_accesses_route_by_device_and_function() {
        let mut bridge = PciBridge::new("pci", 1);
        bridge.attach(4, 1, Box::new(StubPciDevice::new("a", 0x0001, 0xE000_0000)));
        bridge.attach(5, 1, Box::new(StubPciDevice::new("b", 0x0002, 0xE000_1000)));

        let a = PciConfigAddress::encode(PciBdf::new(1, 4, 1), 0);
        let b = PciConfigAddress::encode(PciBdf::new(1, 5, 1), 0);
        assert_eq!(bridge.config_read(a, 4), 0x0001_1414);
        assert_eq!(bridge.config_read(b, 4), 0x0002_1414);
        assert_eq!(bridge.config_read(b + 2, 2), 0x0002);

        // Absent function on this bus, and a function on another bus.
        let absent = PciConfigAddress::encode(PciBdf::new(1, 6, 0), 0);
        let other_bus = PciConfigAddress::encode(PciBdf::new(0, 4, 1), 0);
        assert_eq!(bridge.config_read(absent, 4), 0xFFFF_FFFF);
        assert_eq!(bridge.config_read(other_bus, 2), 0xFFFF);
    }

    #[test]
    fn bar_reprogramming_moves_the_decode_window() {
        let mut bridge = PciBridge::new("pci", 1);
        let bdf = bridge.attach(4, 0, Box::new(StubPciDevice::new("a", 0x0001, 0xE000_0000)));
        assert_eq!(bridge.read(0xF000_0000, 4), None);

        let bar0 = PciConfigAddress::encode(bdf, 0x10);
        bridge.config_write(bar0, 4, 0xF000_0000);

        assert!(bridge.write(0xF000_0004, 4, 0xCAFE_F00D));
        assert_eq!(bridge.read(0xF000_0004, 4), Some(0xCAFE_F00D));
        assert_eq!(bridge.read(0xE000_0004, 4), None);
    }

    #[test]
    fn overlapping_bars_resolve_to_the_first_attached_device() {
        let mut bridge = PciBridge::new("pci", 1);
        let first = bridge.attach(1, 0, Box::new(StubPciDevice::new("first", 1, 0xE000_0000)));
        let second = bridge.attach(2, 0, Box::new(StubPciDevice::new("second", 2, 0xE000_0010)));

        assert!(bridge.write(0xE000_0010, 4, 0x1111_1111));
        // The write landed in `first` (offset 0x10 of its window), not in `second`.
        let cfg_second = bridge.device_config(second).unwrap();
        assert_eq!(cfg_second.bar(0), 0xE000_0010);
        assert_eq!(bridge.read(0xE000_0010, 4), Some(0x1111_1111));

        assert_eq!(
            bridge.bar_conflicts(),
            vec![BarConflict {
                winner: first,
                winner_bar: 0,
                shadowed: second,
                shadowed_bar: 0,
            }]
        );
    }

    #[test]
    fn disjoint_bars_report_no_conflicts() {
        let mut bridge = PciBridge::new("pci", 1);
        bridge.attach(1, 0, Box::new(StubPciDevice::new("a", 1, 0xE000_0000)));
        bridge.attach(2, 0, Box::new(StubPciDevice::new("b", 2, 0xE000_1000)));
        assert!(bridge.bar_conflicts().is_empty());
        assert!(bridge.claims(0xE000_1000));
        assert!(!bridge.claims(0xE000_0800));
    }

    #[test]
    #[should_panic(expected = "duplicate PCI BDF")]
    fn duplicate_bdf_panics() {
        let mut bridge = PciBridge::new("pci", 1);
        bridge.attach(1, 0, Box::new(StubPciDevice::new("a", 1, 0)));
        bridge.attach(1, 0, Box::new(StubPciDevice::new("b", 2, 0)));
    }
}
