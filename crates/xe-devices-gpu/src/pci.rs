use std::thread::JoinHandle;

use xe_devices::pci::{PciConfigSpace, PciDevice};
use xe_devices::BusDevice;
use xe_memory::SharedGuestRam;

use crate::present::{HeadlessPresenter, PresentError, Presenter, PresenterFactory};
use crate::regs::{OverrideTable, RegisterFile};
use crate::render::{ProductionLoop, RenderStatus};
use crate::{XenosConfig, XenosError};

/// Window claimed behind each programmed BAR.
pub const XGPU_DEVICE_SIZE: u64 = 0x10_0000;

pub const XENOS_VENDOR_ID: u16 = 0x1414;
pub const XENOS_DEVICE_ID: u16 = 0x5831;
pub const XENOS_BAR0_DEFAULT: u32 = 0xEC80_0000;
/// Device/function on the host bridge bus (configuration address `0xD001_0000`).
pub const XENOS_SLOT: (u8, u8) = (2, 0);

/// Configuration space as captured from a retail console.
const XENOS_CONFIG_DUMP: [u32; 64] = {
    let mut dump = [0u32; 64];
    dump[0x00] = ((XENOS_DEVICE_ID as u32) << 16) | XENOS_VENDOR_ID as u32;
    // Status: capabilities list. Command: memory space, bus master.
    dump[0x01] = 0x0210_0006;
    // Display controller (other), revision 2.
    dump[0x02] = 0x0380_0002;
    dump[0x04] = XENOS_BAR0_DEFAULT;
    dump[0x0B] = ((XENOS_DEVICE_ID as u32) << 16) | XENOS_VENDOR_ID as u32;
    dump[0x0D] = 0x0000_0058;
    // Interrupt pin A, line 8.
    dump[0x0F] = 0x0000_0108;
    dump[0x16] = 0x0002_0001;
    dump
};

fn headless_factory() -> PresenterFactory {
    Box::new(|_: &XenosConfig| -> Result<Box<dyn Presenter>, PresentError> {
        Ok(Box::new(HeadlessPresenter::new()))
    })
}

/// The display controller.
///
/// Bus accesses (register file and configuration space) are handled on the caller's thread with
/// no locking. The production loop runs on its own thread and only shares the guest RAM window
/// and a [`RenderStatus`] with it.
pub struct XenosGpu {
    config_space: PciConfigSpace,
    regs: RegisterFile,
    overrides: OverrideTable,
    status: RenderStatus,
    render_thread: Option<JoinHandle<()>>,
}

impl XenosGpu {
    /// Builds the controller and, if enabled, starts the production loop on the framebuffer
    /// window of `ram`. With no `factory` frames go to a [`HeadlessPresenter`].
    pub fn new(
        config: XenosConfig,
        ram: &SharedGuestRam,
        factory: Option<PresenterFactory>,
    ) -> Result<Self, XenosError> {
        config.validate()?;
        let status = RenderStatus::default();

        let render_thread = if config.render_thread_enabled {
            let view = ram
                .view(config.framebuffer_base, config.framebuffer_len())
                .map_err(XenosError::FramebufferWindow)?;
            let factory = factory.unwrap_or_else(headless_factory);
            let handle = ProductionLoop::new(config, view, status.clone())
                .spawn(factory)
                .map_err(XenosError::Spawn)?;
            Some(handle)
        } else {
            tracing::warn!("Xenos render thread disabled in config");
            None
        };

        Ok(Self {
            config_space: PciConfigSpace::from_dwords(&XENOS_CONFIG_DUMP),
            regs: RegisterFile::new(),
            overrides: OverrideTable::default(),
            status,
            render_thread,
        })
    }

    pub fn status(&self) -> RenderStatus {
        self.status.clone()
    }

    pub fn frames_presented(&self) -> u64 {
        self.status.frames_presented()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.status.shutdown_requested()
    }

    pub fn registers(&self) -> &RegisterFile {
        &self.regs
    }

    pub fn overrides_mut(&mut self) -> &mut OverrideTable {
        &mut self.overrides
    }

    /// Stops the production loop and waits for its thread. Bus accesses keep working.
    pub fn stop_production(&mut self) {
        let Some(handle) = self.render_thread.take() else {
            return;
        };
        self.status.request_stop();
        if handle.join().is_err() {
            tracing::error!("Xenos render thread panicked");
        }
    }
}

impl Drop for XenosGpu {
    fn drop(&mut self) {
        self.stop_production();
    }
}

impl core::fmt::Debug for XenosGpu {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("XenosGpu")
            .field("bar0", &format_args!("0x{:08x}", self.config_space.bar(0)))
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl BusDevice for XenosGpu {
    fn name(&self) -> &str {
        "xenos"
    }

    fn read(&mut self, paddr: u64, size: usize) -> u64 {
        let index = RegisterFile::index_of(paddr);
        let value = self.overrides.apply(index, self.regs.read(paddr, size));
        tracing::trace!(
            addr = format_args!("0x{paddr:x}"),
            reg = format_args!("0x{index:x}"),
            value = format_args!("0x{value:x}"),
            "xenos register read"
        );
        value
    }

    fn write(&mut self, paddr: u64, size: usize, value: u64) {
        let index = RegisterFile::index_of(paddr);
        tracing::trace!(
            addr = format_args!("0x{paddr:x}"),
            reg = format_args!("0x{index:x}"),
            value = format_args!("0x{value:x}"),
            "xenos register write"
        );
        self.regs.write(paddr, size, value);
    }
}

impl PciDevice for XenosGpu {
    fn config(&self) -> &PciConfigSpace {
        &self.config_space
    }

    fn config_mut(&mut self) -> &mut PciConfigSpace {
        &mut self.config_space
    }

    fn bar_size(&self) -> u64 {
        XGPU_DEVICE_SIZE
    }
}
