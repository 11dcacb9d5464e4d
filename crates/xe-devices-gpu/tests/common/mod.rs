#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use xe_devices_gpu::{LinearFrame, PresentError, Presenter, PresenterEvent, PresenterFactory, XenosConfig};

/// Frames and toggles observed by a [`RecordingPresenter`], readable from the test thread.
#[derive(Debug, Clone, Default)]
pub struct Recording {
    inner: Arc<Mutex<RecordingState>>,
}

#[derive(Debug, Default)]
struct RecordingState {
    frames: Vec<LinearFrame>,
    vsync: Vec<bool>,
    fullscreen: Vec<bool>,
}

impl Recording {
    pub fn frames(&self) -> Vec<LinearFrame> {
        self.inner.lock().unwrap().frames.clone()
    }

    pub fn frame_count(&self) -> usize {
        self.inner.lock().unwrap().frames.len()
    }

    pub fn vsync_calls(&self) -> Vec<bool> {
        self.inner.lock().unwrap().vsync.clone()
    }

    pub fn fullscreen_calls(&self) -> Vec<bool> {
        self.inner.lock().unwrap().fullscreen.clone()
    }
}

/// Records every frame and replays a script: after frame `n` is presented, the events in
/// `script[n]` become pending.
pub struct RecordingPresenter {
    recording: Recording,
    script: VecDeque<Vec<PresenterEvent>>,
    pending: VecDeque<PresenterEvent>,
}

impl RecordingPresenter {
    pub fn factory(recording: Recording, script: Vec<Vec<PresenterEvent>>) -> PresenterFactory {
        Box::new(
            move |_: &XenosConfig| -> Result<Box<dyn Presenter>, PresentError> {
                Ok(Box::new(RecordingPresenter {
                    recording,
                    script: script.into(),
                    pending: VecDeque::new(),
                }))
            },
        )
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, frame: &LinearFrame) -> Result<(), PresentError> {
        self.recording.inner.lock().unwrap().frames.push(frame.clone());
        self.pending.extend(self.script.pop_front().unwrap_or_default());
        Ok(())
    }

    fn poll_event(&mut self) -> Option<PresenterEvent> {
        self.pending.pop_front()
    }

    fn set_vsync(&mut self, enabled: bool) {
        self.recording.inner.lock().unwrap().vsync.push(enabled);
    }

    fn set_fullscreen(&mut self, enabled: bool) {
        self.recording.inner.lock().unwrap().fullscreen.push(enabled);
    }
}

pub fn wait_until(mut cond: impl FnMut() -> bool) {
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while !cond() {
        assert!(std::time::Instant::now() < deadline, "timed out");
        std::thread::sleep(std::time::Duration::from_millis(1));
    }
}
