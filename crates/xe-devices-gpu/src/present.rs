//! Presentation boundary: where converted frames leave the device model.
//!
//! The production loop only needs "show this linear buffer" and a trickle of control events from
//! whatever owns the surface. Windowing backends implement [`Presenter`]; [`HeadlessPresenter`]
//! covers runs without a display.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::XenosConfig;

#[derive(Debug, Error)]
pub enum PresentError {
    #[error("presentation surface unavailable: {0}")]
    SurfaceUnavailable(String),
    #[error("frame is {actual} pixels, surface expects {expected}")]
    FrameSizeMismatch { expected: usize, actual: usize },
}

/// Control signals raised by the presentation surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterEvent {
    ToggleVsync,
    ToggleFullscreen,
    Quit,
}

/// A linear, top-down frame.
///
/// Each pixel is the little-endian load of the source bytes B, G, R, A, i.e. `0xAARRGGBB`.
#[derive(Clone, PartialEq, Eq)]
pub struct LinearFrame {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

impl LinearFrame {
    /// Opaque black frame.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixels: vec![0xFF00_0000; width as usize * height as usize],
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<u32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    /// Repacks the frame as tightly packed RGBA8.
    pub fn to_rgba8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.pixels.len() * 4);
        for &pixel in &self.pixels {
            let [b, g, r, a] = pixel.to_le_bytes();
            out.extend_from_slice(&[r, g, b, a]);
        }
        out
    }
}

impl core::fmt::Debug for LinearFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinearFrame")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish_non_exhaustive()
    }
}

pub trait Presenter {
    /// Displays `frame`. Errors end the production loop.
    fn present(&mut self, frame: &LinearFrame) -> Result<(), PresentError>;

    /// Next pending control event, if any.
    fn poll_event(&mut self) -> Option<PresenterEvent>;

    fn set_vsync(&mut self, enabled: bool);

    fn set_fullscreen(&mut self, enabled: bool);
}

/// Builds the presenter on the production thread, so surfaces with thread affinity work.
///
/// Failing here is a production-loop initialization failure: it is logged and the controller
/// keeps answering bus accesses with no display.
pub type PresenterFactory =
    Box<dyn FnOnce(&XenosConfig) -> Result<Box<dyn Presenter>, PresentError> + Send>;

/// Convert a refresh rate (Hz) into a period in nanoseconds.
///
/// Returns `None` when pacing is disabled (`None` or `Some(0)`).
pub fn period_ns_from_hz(hz: Option<u32>) -> Option<u64> {
    hz.and_then(|hz| {
        if hz == 0 {
            return None;
        }
        // Ceil division keeps 60 Hz at 16_666_667 ns.
        Some(1_000_000_000u64.div_ceil(u64::from(hz)))
    })
}

/// Host-side handle to the most recent frame a [`HeadlessPresenter`] received.
#[derive(Debug, Clone, Default)]
pub struct FrameCapture {
    last: Arc<Mutex<Option<LinearFrame>>>,
}

impl FrameCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self) -> Option<LinearFrame> {
        match self.last.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn store(&self, frame: &LinearFrame) {
        let mut slot = match self.last.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        match slot.as_mut() {
            Some(existing) if existing.pixels.len() == frame.pixels.len() => {
                existing.width = frame.width;
                existing.height = frame.height;
                existing.pixels.copy_from_slice(&frame.pixels);
            }
            _ => *slot = Some(frame.clone()),
        }
    }
}

/// Presenter with no surface.
///
/// Paces to the refresh rate while vsync is on, optionally keeps the latest frame in a
/// [`FrameCapture`], and can raise [`PresenterEvent::Quit`] after a fixed number of frames.
#[derive(Debug)]
pub struct HeadlessPresenter {
    refresh_hz: u32,
    vsync: bool,
    fullscreen: bool,
    capture: Option<FrameCapture>,
    quit_after: Option<u64>,
    frames: u64,
    next_deadline: Option<Instant>,
}

impl Default for HeadlessPresenter {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPresenter {
    pub const DEFAULT_REFRESH_HZ: u32 = 60;

    pub fn new() -> Self {
        Self {
            refresh_hz: Self::DEFAULT_REFRESH_HZ,
            vsync: false,
            fullscreen: false,
            capture: None,
            quit_after: None,
            frames: 0,
            next_deadline: None,
        }
    }

    pub fn with_capture(mut self, capture: FrameCapture) -> Self {
        self.capture = Some(capture);
        self
    }

    pub fn with_refresh_hz(mut self, hz: u32) -> Self {
        self.refresh_hz = hz;
        self
    }

    /// Raise a quit request once `frames` frames have been presented.
    pub fn quit_after(mut self, frames: u64) -> Self {
        self.quit_after = Some(frames);
        self
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn vsync(&self) -> bool {
        self.vsync
    }

    pub fn fullscreen(&self) -> bool {
        self.fullscreen
    }

    fn pace(&mut self) {
        let Some(period) = period_ns_from_hz(Some(self.refresh_hz)).map(Duration::from_nanos)
        else {
            return;
        };
        let now = Instant::now();
        let deadline = match self.next_deadline {
            Some(deadline) if deadline > now => {
                std::thread::sleep(deadline - now);
                deadline
            }
            _ => now,
        };
        self.next_deadline = Some(deadline + period);
    }
}

impl Presenter for HeadlessPresenter {
    fn present(&mut self, frame: &LinearFrame) -> Result<(), PresentError> {
        let expected = frame.width as usize * frame.height as usize;
        if frame.pixels.len() != expected {
            return Err(PresentError::FrameSizeMismatch {
                expected,
                actual: frame.pixels.len(),
            });
        }
        if self.vsync {
            self.pace();
        }
        if let Some(capture) = &self.capture {
            capture.store(frame);
        }
        self.frames += 1;
        Ok(())
    }

    fn poll_event(&mut self) -> Option<PresenterEvent> {
        match self.quit_after {
            Some(limit) if self.frames >= limit => {
                self.quit_after = None;
                Some(PresenterEvent::Quit)
            }
            _ => None,
        }
    }

    fn set_vsync(&mut self, enabled: bool) {
        self.vsync = enabled;
        if !enabled {
            self.next_deadline = None;
        }
    }

    fn set_fullscreen(&mut self, enabled: bool) {
        self.fullscreen = enabled;
    }
}
