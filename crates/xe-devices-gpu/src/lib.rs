//! Display controller ("Xenos") device model.
//!
//! The controller answers CPU accesses on its BAR-mapped register file and its PCI configuration
//! space, and optionally runs a production loop on its own thread that samples the tiled
//! framebuffer out of guest RAM, converts it to a linear image, and hands it to a [`Presenter`].
#![forbid(unsafe_code)]

mod config;
mod convert;
mod error;
mod pci;
mod present;
mod regs;
mod render;
pub mod tiling;

pub use config::{ConfigError, ConversionPath, FramebufferLayout, Resolution, XenosConfig};
pub use convert::FrameConverter;
pub use error::XenosError;
pub use pci::{
    XenosGpu, XENOS_BAR0_DEFAULT, XENOS_DEVICE_ID, XENOS_SLOT, XENOS_VENDOR_ID, XGPU_DEVICE_SIZE,
};
pub use present::{
    period_ns_from_hz, FrameCapture, HeadlessPresenter, LinearFrame, PresentError, Presenter,
    PresenterEvent, PresenterFactory,
};
pub use regs::{
    OverrideTable, RegisterFile, RegisterOverride, REGISTER_FILE_MASK, REGISTER_FILE_SIZE,
    REG_EDRAM_CLK, REG_FSB_CLK, REG_GPU_CLK, REG_MEM_CLK,
};
pub use render::RenderStatus;

/// Guest physical base of the scanout framebuffer.
pub const XE_FB_BASE: u64 = 0x1E00_0000;
