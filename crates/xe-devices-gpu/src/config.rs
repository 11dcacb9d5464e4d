use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::XE_FB_BASE;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("display resolution {width}x{height} has a zero dimension")]
    ZeroResolution { width: u32, height: u32 },
    #[error("tiled framebuffer width {width} is not a multiple of 32")]
    UnalignedTiledWidth { width: u32 },
    #[error("framebuffer of {width}x{height} does not fit in the address space")]
    FramebufferTooLarge { width: u32, height: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// How pixels are laid out in the guest framebuffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramebufferLayout {
    /// 32x32 tiled, twiddled layout written by the console's display code.
    #[default]
    Tiled,
    /// Plain row-major layout.
    Linear,
}

/// Which implementation converts the framebuffer to a linear image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPath {
    /// Per-pixel kernel dispatched in 16x16 workgroups across worker threads.
    #[default]
    Kernel,
    /// Portable single-threaded loop.
    Cpu,
}

/// Display controller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct XenosConfig {
    /// Start the production loop. When disabled the controller still answers bus accesses.
    pub render_thread_enabled: bool,
    pub resolution: Resolution,
    pub framebuffer_base: u64,
    pub layout: FramebufferLayout,
    pub conversion: ConversionPath,
    /// Kernel worker threads; 0 uses the available parallelism.
    pub kernel_workers: usize,
    pub vsync: bool,
    pub fullscreen: bool,
    /// Raise [`crate::RenderStatus::shutdown_requested`] when the presenter reports a quit.
    pub quit_on_window_closure: bool,
}

impl Default for XenosConfig {
    fn default() -> Self {
        Self {
            render_thread_enabled: true,
            resolution: Resolution::default(),
            framebuffer_base: XE_FB_BASE,
            layout: FramebufferLayout::default(),
            conversion: ConversionPath::default(),
            kernel_workers: 0,
            vsync: true,
            fullscreen: false,
            quit_on_window_closure: true,
        }
    }
}

impl XenosConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let Resolution { width, height } = self.resolution;
        if width == 0 || height == 0 {
            return Err(ConfigError::ZeroResolution { width, height });
        }
        if self.layout == FramebufferLayout::Tiled && width % 32 != 0 {
            return Err(ConfigError::UnalignedTiledWidth { width });
        }
        height
            .checked_next_multiple_of(32)
            .and_then(|rows| (width as usize).checked_mul(rows as usize))
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or(ConfigError::FramebufferTooLarge { width, height })?;
        Ok(())
    }

    /// Size in bytes of the framebuffer window (4 bytes per pixel).
    ///
    /// A tiled framebuffer spans whole 32-row blocks, so its height is rounded up to a multiple
    /// of 32; otherwise part of the last block row would fall outside the window.
    pub fn framebuffer_len(&self) -> usize {
        let Resolution { width, height } = self.resolution;
        let rows = match self.layout {
            FramebufferLayout::Tiled => height.next_multiple_of(32),
            FramebufferLayout::Linear => height,
        };
        width as usize * rows as usize * 4
    }

    pub(crate) fn effective_workers(&self) -> usize {
        match self.kernel_workers {
            0 => std::thread::available_parallelism().map_or(1, |n| n.get()),
            n => n,
        }
    }
}
