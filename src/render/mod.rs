//! Live terminal rendering: a stack of components redrawn in place.
//!
//! Components are mounted in order and each contributes its current text.
//! A single background task drains a coalescing update channel and redraws
//! the tail of the terminal (cursor-up plus erase-line, then each
//! component's text). A second task reads terminal input and routes chunks
//! to the top-of-stack input component. A cursor save/restore pair keeps
//! the caret on the focused input line across redraws.

mod input;
mod spinner;

pub use input::TextInput;
pub use spinner::Spinner;

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};

use crate::ansi;

pub trait Component: Send + Sync {
    fn view(&self) -> String;
    /// Called once on mount with the handle the component uses to push
    /// updates.
    fn bind(self: Arc<Self>, handle: ComponentHandle);
}

struct MountedComponent {
    text: Mutex<String>,
    input: Mutex<Option<mpsc::Sender<String>>>,
    displayed: AtomicBool,
}

/// Pushes a component's rendered text into the terminal stack.
#[derive(Clone)]
pub struct ComponentHandle {
    mc: Arc<MountedComponent>,
    term: Term,
}

impl ComponentHandle {
    /// Non-blocking update; rapid calls coalesce.
    pub fn update(&self, text: String) {
        *self.mc.text.lock().unwrap() = text;
        self.term.update();
    }

    /// Blocks until the new text has been rendered.
    pub fn update_and_wait(&self, text: String) {
        *self.mc.text.lock().unwrap() = text;
        self.term.update_and_wait();
    }

    /// Final render for a finished component.
    pub fn end(&self, text: String) {
        self.update_and_wait(text);
    }

    /// Registers this component as input-accepting and returns the channel
    /// the terminal routes input chunks to.
    pub fn input(&self) -> mpsc::Receiver<String> {
        let (tx, rx) = mpsc::channel();
        *self.mc.input.lock().unwrap() = Some(tx);
        rx
    }
}

struct TermState {
    components: Mutex<Vec<Arc<MountedComponent>>>,
    updates: Mutex<Option<mpsc::SyncSender<Option<mpsc::SyncSender<()>>>>>,
    enabled: bool,
}

#[derive(Clone)]
pub struct Term {
    state: Arc<TermState>,
}

impl Term {
    /// Interactive terminal over stdin/stdout.
    pub fn new() -> Term {
        let (tx, rx) = mpsc::sync_channel::<Option<mpsc::SyncSender<()>>>(1);
        let term = Term {
            state: Arc::new(TermState {
                components: Mutex::new(Vec::new()),
                updates: Mutex::new(Some(tx)),
                enabled: true,
            }),
        };

        let render_term = term.clone();
        std::thread::spawn(move || {
            let mut last_line_count = 0usize;
            for ack in rx {
                render_term.render(&mut last_line_count);
                if let Some(ack) = ack {
                    let _ = ack.send(());
                }
            }
        });

        let input_term = term.clone();
        std::thread::spawn(move || input_term.input_reader());

        term
    }

    /// A terminal that renders nothing; used by tests and non-interactive
    /// callers.
    pub fn silent() -> Term {
        Term {
            state: Arc::new(TermState {
                components: Mutex::new(Vec::new()),
                updates: Mutex::new(None),
                enabled: false,
            }),
        }
    }

    pub fn mount<C: Component + 'static>(&self, component: Arc<C>) {
        let mc = Arc::new(MountedComponent {
            text: Mutex::new(component.view()),
            input: Mutex::new(None),
            displayed: AtomicBool::new(false),
        });
        self.state.components.lock().unwrap().push(mc.clone());

        component.bind(ComponentHandle {
            mc,
            term: self.clone(),
        });
        self.update();
    }

    /// Prints a static line above any live components.
    pub fn println(&self, text: impl Into<String>) {
        let text = text.into();
        if !self.state.enabled {
            println!("{text}");
            return;
        }
        self.mount(Arc::new(StaticComponent { text }));
    }

    /// Requests a redraw; drops the request if one is already pending.
    pub fn update(&self) {
        if let Some(tx) = self.state.updates.lock().unwrap().as_ref() {
            let _ = tx.try_send(None);
        }
    }

    /// Requests a redraw and waits for it to hit the terminal.
    pub fn update_and_wait(&self) {
        let tx = self.state.updates.lock().unwrap().clone();
        if let Some(tx) = tx {
            let (ack_tx, ack_rx) = mpsc::sync_channel(1);
            if tx.send(Some(ack_tx)).is_ok() {
                let _ = ack_rx.recv();
            }
        }
    }

    /// Shuts the render loop down.
    pub fn stop(&self) {
        self.state.updates.lock().unwrap().take();
    }

    fn render(&self, last_line_count: &mut usize) {
        let components = self.state.components.lock().unwrap();
        let mut out = String::new();

        // Keep the caret on the focused input line across the redraw.
        let mut has_input = false;
        if let Some(last) = components.last() {
            if last.input.lock().unwrap().is_some() && last.displayed.load(Ordering::Relaxed) {
                out.push_str("\x1b7");
                has_input = true;
            }
        }

        for _ in 0..*last_line_count {
            out.push_str("\x1b[1A\r\x1b[K");
        }

        let width = terminal_width();
        let mut line_count = 0;
        for mc in components.iter() {
            let text = mc.text.lock().unwrap().clone();
            if text.is_empty() {
                continue;
            }
            line_count += ansi::count_lines(&text, width);
            out.push_str(&text);
            out.push('\n');
            mc.displayed.store(true, Ordering::Relaxed);
        }

        if has_input {
            out.push_str("\x1b8");
        }

        *last_line_count = line_count;

        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(out.as_bytes());
        let _ = stdout.flush();
    }

    fn input_reader(&self) {
        let mut stdin = std::io::stdin();
        let mut buf = [0u8; 1024];
        loop {
            let n = match stdin.read(&mut buf) {
                Ok(0) | Err(_) => return,
                Ok(n) => n,
            };

            let receiver = {
                let components = self.state.components.lock().unwrap();
                components
                    .last()
                    .and_then(|mc| mc.input.lock().unwrap().clone())
            };
            let Some(receiver) = receiver else {
                continue;
            };

            let chunk = String::from_utf8_lossy(&buf[..n]).to_string();
            // Cancel out the newline the terminal echoed for Enter.
            if chunk.ends_with('\n') {
                let mut stdout = std::io::stdout();
                let _ = stdout.write_all(b"\x1b[1A");
                let _ = stdout.flush();
            }
            if receiver.send(chunk).is_err() {
                continue;
            }
        }
    }
}

fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

struct StaticComponent {
    text: String,
}

impl Component for StaticComponent {
    fn view(&self) -> String {
        self.text.clone()
    }

    fn bind(self: Arc<Self>, _handle: ComponentHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_term_accepts_components() {
        let term = Term::silent();
        let spinner = Spinner::new("working...");
        term.mount(spinner.clone());
        spinner.succeed("done");
        term.stop();
    }
}
