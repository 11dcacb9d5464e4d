//! Minimal system wiring: RAM, POST port, the host bridge with the display controller, and the
//! southbridge with the USB host controllers.

use anyhow::{Context, Result};
use xe_devices::pci::{PciBdf, PciBridge, PciConfigAddress, PCI_BAR0_OFFSET};
use xe_devices::usb::{UsbControllerKind, UsbHostController};
use xe_devices_gpu::tiling::{std_offset, tile_offset};
use xe_devices_gpu::{
    FrameCapture, FramebufferLayout, HeadlessPresenter, LinearFrame, PresentError, Presenter,
    RenderStatus, XenosConfig, XenosGpu, XENOS_SLOT,
};
use xe_memory::SharedGuestRam;
use xe_platform::map::{HOST_BRIDGE_BUS, POST_BUS_ADDR, POST_BUS_SIZE, RAM_START_ADDR, SOUTHBRIDGE_BUS};
use xe_platform::{AddressRange, PostBus, RamDevice, RootBus};

#[derive(Debug, Clone)]
pub struct MachineConfig {
    pub ram_bytes: u64,
    /// Frames to present before the headless display asks to quit.
    pub frames: u64,
    pub xenos: XenosConfig,
}

pub struct Machine {
    bus: RootBus,
    xenos: XenosConfig,
    capture: FrameCapture,
    display: RenderStatus,
}

impl Machine {
    pub fn new(config: MachineConfig) -> Result<Self> {
        let ram = SharedGuestRam::new(config.ram_bytes).context("failed to allocate guest RAM")?;
        let mut bus = RootBus::new();
        bus.add_device(
            AddressRange::new(RAM_START_ADDR, config.ram_bytes)?,
            Box::new(RamDevice::new(RAM_START_ADDR, ram.clone())),
        )?;
        bus.add_device(
            AddressRange::new(POST_BUS_ADDR, POST_BUS_SIZE)?,
            Box::new(PostBus::new()),
        )?;

        let capture = FrameCapture::new();
        let presenter_capture = capture.clone();
        let frames = config.frames;
        let gpu = XenosGpu::new(
            config.xenos.clone(),
            &ram,
            Some(Box::new(
                move |_: &XenosConfig| -> Result<Box<dyn Presenter>, PresentError> {
                    Ok(Box::new(
                        HeadlessPresenter::new()
                            .with_capture(presenter_capture)
                            .quit_after(frames),
                    ))
                },
            )),
        )
        .context("failed to start the display controller")?;
        let display = gpu.status();

        let mut host = PciBridge::new("host", HOST_BRIDGE_BUS);
        let (dev, func) = XENOS_SLOT;
        host.attach(dev, func, Box::new(gpu));
        bus.add_bridge(host)?;

        let mut southbridge = PciBridge::new("southbridge", SOUTHBRIDGE_BUS);
        for kind in [UsbControllerKind::Ehci0, UsbControllerKind::Ehci1] {
            let (dev, func) = kind.slot();
            southbridge.attach(dev, func, Box::new(UsbHostController::new(kind)));
        }
        bus.add_bridge(southbridge)?;

        Ok(Self {
            bus,
            xenos: config.xenos,
            capture,
            display,
        })
    }

    /// Emits a POST code the way boot firmware does (top byte of a 64-bit store).
    pub fn post(&mut self, code: u8) {
        self.bus.write(POST_BUS_ADDR, 8, u64::from(code) << 56);
    }

    /// Probes every function on the populated buses through the configuration window.
    pub fn log_pci_inventory(&mut self) {
        for bus in [HOST_BRIDGE_BUS, SOUTHBRIDGE_BUS] {
            for device in 0..32 {
                for function in 0..8 {
                    let bdf = PciBdf::new(bus, device, function);
                    let id = self.bus.read(PciConfigAddress::encode(bdf, 0), 4);
                    if id == 0xFFFF_FFFF {
                        continue;
                    }
                    let bar0 = self
                        .bus
                        .read(PciConfigAddress::encode(bdf, u16::from(PCI_BAR0_OFFSET)), 4);
                    tracing::info!(
                        %bdf,
                        vendor = format_args!("0x{:04x}", id & 0xFFFF),
                        device = format_args!("0x{:04x}", id >> 16),
                        bar0 = format_args!("0x{bar0:08x}"),
                        "PCI function"
                    );
                }
            }
        }
    }

    /// Draws a color gradient into the framebuffer with CPU-side bus writes, in the layout the
    /// display controller expects.
    pub fn draw_test_pattern(&mut self) {
        let width = self.xenos.resolution.width as usize;
        let height = self.xenos.resolution.height as usize;
        let len = self.xenos.framebuffer_len();
        for y in 0..height {
            for x in 0..width {
                let linear = std_offset(width, x, y);
                let offset = match self.xenos.layout {
                    FramebufferLayout::Tiled => tile_offset(width, linear),
                    FramebufferLayout::Linear => linear,
                };
                if offset + 4 > len {
                    continue;
                }
                let r = (x * 255 / width.max(1)) as u32;
                let g = (y * 255 / height.max(1)) as u32;
                let b = if (x / 32 + y / 32) % 2 == 0 { 0x40 } else { 0xC0 };
                let pixel = 0xFF00_0000 | (r << 16) | (g << 8) | b;
                self.bus
                    .write(self.xenos.framebuffer_base + offset as u64, 4, u64::from(pixel));
            }
        }
        tracing::debug!(width, height, "test pattern drawn");
    }

    pub fn display_running(&self) -> bool {
        self.display.is_running()
    }

    pub fn frames_presented(&self) -> u64 {
        self.display.frames_presented()
    }

    pub fn last_frame(&self) -> Option<LinearFrame> {
        self.capture.latest()
    }
}
