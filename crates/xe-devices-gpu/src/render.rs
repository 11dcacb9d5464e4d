use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use xe_memory::GuestRamView;

use crate::convert::FrameConverter;
use crate::present::{LinearFrame, Presenter, PresenterEvent, PresenterFactory};
use crate::XenosConfig;

#[derive(Debug, Default)]
struct Shared {
    frames_presented: AtomicU64,
    shutdown_requested: AtomicBool,
    stop: AtomicBool,
    running: AtomicBool,
    vsync: AtomicBool,
    fullscreen: AtomicBool,
}

/// Bus-side view of the production loop.
///
/// This is the only state that crosses between the loop and the rest of the controller; the
/// register file and configuration space stay on the bus side.
#[derive(Debug, Clone, Default)]
pub struct RenderStatus {
    shared: Arc<Shared>,
}

impl RenderStatus {
    pub fn frames_presented(&self) -> u64 {
        self.shared.frames_presented.load(Ordering::Relaxed)
    }

    /// Set when the presenter reported a quit and `quit_on_window_closure` is enabled.
    pub fn shutdown_requested(&self) -> bool {
        self.shared.shutdown_requested.load(Ordering::Acquire)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn vsync(&self) -> bool {
        self.shared.vsync.load(Ordering::Relaxed)
    }

    pub fn fullscreen(&self) -> bool {
        self.shared.fullscreen.load(Ordering::Relaxed)
    }

    pub(crate) fn request_stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
    }

    fn stop_requested(&self) -> bool {
        self.shared.stop.load(Ordering::Acquire)
    }
}

/// Samples the framebuffer window, converts it, and presents it until told to stop.
pub(crate) struct ProductionLoop {
    config: XenosConfig,
    view: GuestRamView,
    converter: FrameConverter,
    status: RenderStatus,
}

impl ProductionLoop {
    pub(crate) fn new(config: XenosConfig, view: GuestRamView, status: RenderStatus) -> Self {
        let converter = FrameConverter::from_config(&config);
        status.shared.vsync.store(config.vsync, Ordering::Relaxed);
        status
            .shared
            .fullscreen
            .store(config.fullscreen, Ordering::Relaxed);
        Self {
            config,
            view,
            converter,
            status,
        }
    }

    pub(crate) fn spawn(self, factory: PresenterFactory) -> std::io::Result<JoinHandle<()>> {
        self.status.shared.running.store(true, Ordering::Release);
        let status = self.status.clone();
        std::thread::Builder::new()
            .name("xenos-render".to_string())
            .spawn(move || self.run_with(factory))
            .inspect_err(|_| status.shared.running.store(false, Ordering::Release))
    }

    fn run_with(self, factory: PresenterFactory) {
        match factory(&self.config) {
            Ok(mut presenter) => self.run(presenter.as_mut()),
            Err(err) => {
                tracing::error!(%err, "failed to acquire presentation surface; running without display");
            }
        }
        self.status.shared.running.store(false, Ordering::Release);
    }

    pub(crate) fn run(&self, presenter: &mut dyn Presenter) {
        let width = self.config.resolution.width;
        let height = self.config.resolution.height;
        tracing::info!(
            width,
            height,
            base = format_args!("0x{:x}", self.view.base()),
            path = ?self.converter.path(),
            "production loop started"
        );

        let mut vsync = self.config.vsync;
        let mut fullscreen = self.config.fullscreen;
        presenter.set_vsync(vsync);
        presenter.set_fullscreen(fullscreen);

        let mut tiled = vec![0u8; self.view.len()];
        let mut frame = LinearFrame::new(width, height);

        while !self.status.stop_requested() {
            self.view.snapshot_into(&mut tiled);
            self.converter.convert(&tiled, &mut frame.pixels);
            if let Err(err) = presenter.present(&frame) {
                tracing::error!(%err, "present failed; stopping production loop");
                break;
            }
            self.status
                .shared
                .frames_presented
                .fetch_add(1, Ordering::Relaxed);

            if self
                .drain_events(presenter, &mut vsync, &mut fullscreen)
                .is_break()
            {
                break;
            }
        }
        tracing::info!(frames = self.status.frames_presented(), "production loop stopped");
    }

    fn drain_events(
        &self,
        presenter: &mut dyn Presenter,
        vsync: &mut bool,
        fullscreen: &mut bool,
    ) -> ControlFlow<()> {
        while let Some(event) = presenter.poll_event() {
            match event {
                PresenterEvent::ToggleVsync => {
                    *vsync = !*vsync;
                    presenter.set_vsync(*vsync);
                    self.status.shared.vsync.store(*vsync, Ordering::Relaxed);
                    tracing::info!(vsync = *vsync, "vsync toggled");
                }
                PresenterEvent::ToggleFullscreen => {
                    *fullscreen = !*fullscreen;
                    presenter.set_fullscreen(*fullscreen);
                    self.status
                        .shared
                        .fullscreen
                        .store(*fullscreen, Ordering::Relaxed);
                    tracing::info!(fullscreen = *fullscreen, "fullscreen toggled");
                }
                PresenterEvent::Quit => {
                    if self.config.quit_on_window_closure {
                        tracing::info!("presentation surface closed; requesting shutdown");
                        self.status
                            .shared
                            .shutdown_requested
                            .store(true, Ordering::Release);
                    }
                    return ControlFlow::Break(());
                }
            }
        }
        ControlFlow::Continue(())
    }
}
