//! Interactive text input component.
//!
//! Secret prompts (passwords, passphrases) switch the terminal into raw
//! mode so typed characters are not echoed; the prompt line renders without
//! them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};

use super::{Component, ComponentHandle};

pub struct TextInput {
    prompt: String,
    secret: bool,
    buf: Mutex<String>,
    complete: AtomicBool,
    result_tx: Mutex<Option<mpsc::Sender<String>>>,
    result_rx: Mutex<Option<mpsc::Receiver<String>>>,
}

impl TextInput {
    pub fn new(prompt: impl Into<String>, secret: bool) -> Arc<TextInput> {
        let (tx, rx) = mpsc::channel();
        Arc::new(TextInput {
            prompt: prompt.into(),
            secret,
            buf: Mutex::new(String::new()),
            complete: AtomicBool::new(false),
            result_tx: Mutex::new(Some(tx)),
            result_rx: Mutex::new(Some(rx)),
        })
    }

    /// Blocks until the user submits a line.
    pub fn read(&self) -> String {
        let rx = self.result_rx.lock().unwrap().take();
        match rx {
            Some(rx) => rx.recv().unwrap_or_default(),
            None => String::new(),
        }
    }

    fn view_text(&self) -> String {
        if self.complete.load(Ordering::Relaxed) {
            return String::new();
        }
        if self.secret {
            return self.prompt.clone();
        }
        format!("{}{}", self.prompt, self.buf.lock().unwrap())
    }
}

impl Component for TextInput {
    fn view(&self) -> String {
        self.view_text()
    }

    fn bind(self: Arc<Self>, handle: ComponentHandle) {
        let raw = self.secret && crossterm::terminal::enable_raw_mode().is_ok();

        let input = self.clone();
        let chunks = handle.input();
        std::thread::spawn(move || {
            for chunk in chunks {
                let submitted = chunk.ends_with('\n') || chunk.ends_with('\r');
                let text = chunk.trim_end_matches(['\n', '\r']);
                input.buf.lock().unwrap().push_str(text);

                if submitted {
                    input.complete.store(true, Ordering::Relaxed);
                    if raw {
                        let _ = crossterm::terminal::disable_raw_mode();
                    }
                    handle.end(String::new());
                    let line = input.buf.lock().unwrap().clone();
                    if let Some(tx) = input.result_tx.lock().unwrap().take() {
                        let _ = tx.send(line);
                    }
                    return;
                }

                handle.update(input.view_text());
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_hides_secret_input() {
        let input = TextInput::new("Password: ", true);
        input.buf.lock().unwrap().push_str("hunter2");
        assert_eq!(input.view_text(), "Password: ");

        let open = TextInput::new("Username: ", false);
        open.buf.lock().unwrap().push_str("me");
        assert_eq!(open.view_text(), "Username: me");
    }
}
