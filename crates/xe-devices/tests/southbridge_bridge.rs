use proptest::prelude::*;
use xe_devices::pci::{PciBdf, PciBridge, PciConfigAddress, PCI_CONFIG_REGION_ADDRESS};
use xe_devices::usb::{UsbControllerKind, UsbHostController, EHCI_DEVICE_ID};

fn southbridge() -> PciBridge {
    let mut bridge = PciBridge::new("southbridge", 1);
    for kind in [UsbControllerKind::Ehci0, UsbControllerKind::Ehci1] {
        let (device, function) = kind.slot();
        bridge.attach(device, function, Box::new(UsbHostController::new(kind)));
    }
    bridge
}

#[test]
fn enumerates_in_attach_order() {
    let bridge = southbridge();
    assert_eq!(
        bridge.iter_bdfs().collect::<Vec<_>>(),
        vec![PciBdf::new(1, 4, 1), PciBdf::new(1, 5, 1)]
    );
    assert!(bridge.bar_conflicts().is_empty());
}

#[test]
fn config_probe_finds_both_controllers() {
    let mut bridge = southbridge();
    for kind in [UsbControllerKind::Ehci0, UsbControllerKind::Ehci1] {
        let addr = PciConfigAddress::encode(kind.bdf(1), 0);
        assert_eq!(bridge.config_read(addr + 2, 2), u64::from(EHCI_DEVICE_ID));
        assert_eq!(
            bridge.config_read(addr + 0x10, 4),
            u64::from(kind.default_bar0())
        );
    }
}

#[test]
fn bar_traffic_reaches_the_right_controller() {
    let mut bridge = southbridge();
    let ehci0 = u64::from(UsbControllerKind::Ehci0.default_bar0());
    let ehci1 = u64::from(UsbControllerKind::Ehci1.default_bar0());

    assert!(bridge.write(ehci0 + 0x24, 4, 0xAAAA_0000));
    assert!(bridge.write(ehci1 + 0x24, 4, 0x0000_BBBB));

    assert_eq!(bridge.read(ehci0 + 0x24, 4), Some(0xAAAA_0000));
    assert_eq!(bridge.read(ehci1 + 0x24, 4), Some(0x0000_BBBB));
    assert_eq!(bridge.read(0xEA00_8000, 4), None);
    assert!(!bridge.write(0xEA00_8000, 4, 1));
}

proptest! {
    #[test]
    fn config_window_accesses_never_panic(offset in 0u64..0x0100_0000, size in prop::sample::select(vec![1usize, 2, 4, 8]), value: u64) {
        let mut bridge = southbridge();
        let paddr = PCI_CONFIG_REGION_ADDRESS + offset;
        bridge.config_write(paddr, size, value);
        let _ = bridge.config_read(paddr, size);
    }
}
