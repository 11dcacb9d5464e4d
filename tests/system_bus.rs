//! End-to-end checks of the bus fabric with every device wired in.

use std::time::{Duration, Instant};

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use xe_devices::pci::{PciBdf, PciBridge, PciConfigAddress, PCI_BAR0_OFFSET};
use xe_devices::usb::{UsbControllerKind, UsbHostController};
use xe_devices_gpu::tiling::{std_offset, tile_offset};
use xe_devices_gpu::{
    FrameCapture, HeadlessPresenter, PresentError, Presenter, RenderStatus, Resolution,
    XenosConfig, XenosGpu, XENOS_BAR0_DEFAULT, XENOS_SLOT,
};
use xe_memory::SharedGuestRam;
use xe_platform::map::{HOST_BRIDGE_BUS, POST_BUS_ADDR, POST_BUS_SIZE, SOUTHBRIDGE_BUS};
use xe_platform::{AddressRange, BusTarget, PostBus, RamDevice, RootBus};

const RAM_SIZE: u64 = 0x80_0000;
const FB_BASE: u64 = 0x40_0000;

struct System {
    bus: RootBus,
    display: RenderStatus,
    capture: FrameCapture,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn build_system(config: XenosConfig) -> System {
    init_tracing();
    let ram = SharedGuestRam::new(RAM_SIZE).unwrap();
    let mut bus = RootBus::new();
    bus.add_device(
        AddressRange::new(0, RAM_SIZE).unwrap(),
        Box::new(RamDevice::new(0, ram.clone())),
    )
    .unwrap();
    bus.add_device(
        AddressRange::new(POST_BUS_ADDR, POST_BUS_SIZE).unwrap(),
        Box::new(PostBus::new()),
    )
    .unwrap();

    let capture = FrameCapture::new();
    let presenter_capture = capture.clone();
    let gpu = XenosGpu::new(
        config,
        &ram,
        Some(Box::new(
            move |_: &XenosConfig| -> Result<Box<dyn Presenter>, PresentError> {
                Ok(Box::new(
                    HeadlessPresenter::new().with_capture(presenter_capture),
                ))
            },
        )),
    )
    .unwrap();
    let display = gpu.status();

    let mut host = PciBridge::new("host", HOST_BRIDGE_BUS);
    host.attach(XENOS_SLOT.0, XENOS_SLOT.1, Box::new(gpu));
    bus.add_bridge(host).unwrap();

    let mut southbridge = PciBridge::new("southbridge", SOUTHBRIDGE_BUS);
    for kind in [UsbControllerKind::Ehci0, UsbControllerKind::Ehci1] {
        let (dev, func) = kind.slot();
        southbridge.attach(dev, func, Box::new(UsbHostController::new(kind)));
    }
    bus.add_bridge(southbridge).unwrap();

    System {
        bus,
        display,
        capture,
    }
}

fn small_display(render_thread_enabled: bool) -> XenosConfig {
    XenosConfig {
        render_thread_enabled,
        resolution: Resolution {
            width: 256,
            height: 128,
        },
        framebuffer_base: FB_BASE,
        vsync: false,
        ..XenosConfig::default()
    }
}

fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn enumeration_finds_every_function() {
    let mut system = build_system(small_display(false));
    let mut found = Vec::new();
    for bus in 0..4u8 {
        for device in 0..32u8 {
            for function in 0..8u8 {
                let bdf = PciBdf::new(bus, device, function);
                let id = system.bus.read(PciConfigAddress::encode(bdf, 0), 4);
                if id != 0xFFFF_FFFF {
                    found.push((bdf, id));
                }
            }
        }
    }
    assert_eq!(
        found,
        vec![
            (PciBdf::new(0, 2, 0), 0x5831_1414),
            (PciBdf::new(1, 4, 1), 0x5805_1414),
            (PciBdf::new(1, 5, 1), 0x5805_1414),
        ]
    );
}

#[test]
fn display_registers_are_reachable_through_the_root_bus() {
    let mut system = build_system(small_display(false));
    let bar0 = u64::from(XENOS_BAR0_DEFAULT);
    assert_eq!(system.bus.target(bar0), Some(BusTarget::PciBar { bus: 0 }));

    system.bus.write(bar0 + 0x0A07 * 4, 4, 0x1234_5678);
    assert_eq!(system.bus.read(bar0 + 0x0A07 * 4, 4), 0x0200_0000);

    system.bus.write(bar0 + 0x2000, 4, 0x1234_5678);
    assert_eq!(system.bus.read(bar0 + 0x2000, 4), 0x1234_5678);
}

#[test]
fn moving_bar0_through_the_config_window_remaps_registers() {
    let mut system = build_system(small_display(false));
    let gpu_bar0 = PciConfigAddress::encode(
        PciBdf::new(HOST_BRIDGE_BUS, XENOS_SLOT.0, XENOS_SLOT.1),
        u16::from(PCI_BAR0_OFFSET),
    );
    assert_eq!(gpu_bar0, 0xD001_0010);

    let new_base = 0xE800_0000u64;
    assert_eq!(system.bus.read(new_base + 0x2000, 4), 0);
    system.bus.write(gpu_bar0, 4, new_base);
    assert_eq!(system.bus.read(gpu_bar0, 4), new_base);

    system.bus.write(new_base + 0x2000, 4, 0xCAFE);
    assert_eq!(system.bus.read(new_base + 0x2000, 4), 0xCAFE);
    assert_eq!(system.bus.target(u64::from(XENOS_BAR0_DEFAULT)), None);
}

#[test]
fn unmapped_accesses_leave_every_device_untouched() {
    let mut system = build_system(small_display(false));
    let bar0 = u64::from(XENOS_BAR0_DEFAULT);
    let before = system.bus.read(bar0 + 0x210, 4);

    system.bus.write(0x9000_0000, 8, u64::MAX);
    assert_eq!(system.bus.read(0x9000_0000, 8), 0);
    assert_eq!(system.bus.read(bar0 + 0x210, 4), before);
    assert_eq!(system.bus.read(0, 8), 0);
}

#[test]
fn cpu_writes_through_the_bus_reach_the_display() {
    let mut system = build_system(small_display(true));
    let width = 256usize;
    let height = 128usize;
    let pixel = |x: usize, y: usize| 0xFF00_0000u32 | ((x as u32 & 0xFF) << 16) | (y as u32 & 0xFF);

    // Repaint the whole framebuffer while the production loop samples it.
    for _ in 0..3 {
        for y in 0..height {
            for x in 0..width {
                let offset = tile_offset(width, std_offset(width, x, y)) as u64;
                system
                    .bus
                    .write(FB_BASE + offset, 4, u64::from(pixel(x, y)));
            }
        }
    }

    // Any frame started after the writes completed shows the finished picture.
    let done = system.display.frames_presented();
    wait_until(|| system.display.frames_presented() >= done + 2);
    let frame = system.capture.latest().unwrap();
    for (x, y) in [(0, 0), (1, 0), (37, 9), (255, 127), (100, 64)] {
        assert_eq!(
            frame.pixel(x as u32, (height - 1 - y) as u32),
            Some(pixel(x, y)),
            "pixel ({x}, {y})"
        );
    }
}

#[test]
fn post_codes_are_latched() {
    let mut system = build_system(small_display(false));
    system.bus.write(POST_BUS_ADDR, 8, 0x5900_0000_0000_0000);
    assert_eq!(system.bus.read(POST_BUS_ADDR, 8) >> 56, 0x59);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn reads_between_windows_are_zero(paddr in RAM_SIZE..0xC000_0000u64) {
        let mut system = build_system(small_display(false));
        prop_assume!(system.bus.target(paddr).is_none());
        prop_assert_eq!(system.bus.read(paddr, 4), 0);
    }
}
