//! Animated spinner component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Component, ComponentHandle};
use crate::ansi;

const FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const FRAME_INTERVAL: Duration = Duration::from_millis(80);

struct SpinnerState {
    text: String,
    frame: usize,
    success: bool,
}

pub struct Spinner {
    state: Mutex<SpinnerState>,
    stopped: AtomicBool,
    handle: Mutex<Option<ComponentHandle>>,
}

impl Spinner {
    pub fn new(text: impl Into<String>) -> Arc<Spinner> {
        Arc::new(Spinner {
            state: Mutex::new(SpinnerState {
                text: text.into(),
                frame: 0,
                success: false,
            }),
            stopped: AtomicBool::new(false),
            handle: Mutex::new(None),
        })
    }

    fn view_text(&self) -> String {
        let state = self.state.lock().unwrap();
        if self.stopped.load(Ordering::Relaxed) {
            if state.success {
                return format!("{} {}", ansi::green("✔"), state.text);
            }
            return String::new();
        }
        format!("{} {}", ansi::cyan(FRAMES[state.frame]), state.text)
    }

    /// Stops the animation and clears the line (unless it succeeded).
    pub fn stop(&self) {
        if self.stopped.swap(true, Ordering::Relaxed) {
            return;
        }
        if let Some(handle) = self.handle.lock().unwrap().as_ref() {
            handle.end(self.view_text());
        }
    }

    /// Stops the animation, leaving a success line behind.
    pub fn succeed(&self, text: impl Into<String>) {
        self.state.lock().unwrap().text = text.into();
        self.state.lock().unwrap().success = true;
        self.stop();
    }
}

impl Component for Spinner {
    fn view(&self) -> String {
        self.view_text()
    }

    fn bind(self: Arc<Self>, handle: ComponentHandle) {
        *self.handle.lock().unwrap() = Some(handle.clone());

        let spinner = self.clone();
        std::thread::spawn(move || {
            while !spinner.stopped.load(Ordering::Relaxed) {
                std::thread::sleep(FRAME_INTERVAL);
                {
                    let mut state = spinner.state.lock().unwrap();
                    state.frame = (state.frame + 1) % FRAMES.len();
                }
                if !spinner.stopped.load(Ordering::Relaxed) {
                    handle.update(spinner.view_text());
                }
            }
        });
    }
}
