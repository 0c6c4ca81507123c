//! Askpass hook for git credential prompts.
//!
//! Spawns a small shell stub that forwards git's prompt over a Unix socket
//! in the temp directory. The server accepts one connection at a time,
//! reads the prompt line, asks the handler and writes the response back.
//! Prompts mentioning "password" or "passphrase" hide echo.

#[cfg(unix)]
use std::os::unix::net::UnixListener;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::PromptHandler;

pub struct AskPassServer {
    script_path: PathBuf,
    sock_path: PathBuf,
    stop: Arc<AtomicBool>,
}

impl AskPassServer {
    #[cfg(unix)]
    pub fn spawn(handler: PromptHandler) -> io::Result<AskPassServer> {
        use std::io::{BufRead, BufReader, Write};
        use std::os::unix::fs::PermissionsExt;

        let tmp = std::env::temp_dir();
        let unique = format!("kit-git-askpass-{}-{:x}", std::process::id(), nonce());
        let sock_path = tmp.join(format!("{unique}.sock"));
        let script_path = tmp.join(format!("{unique}.sh"));

        let script = format!("#!/bin/sh\necho \"$1\" | nc -U {}\n", sock_path.display());
        std::fs::write(&script_path, script)?;
        std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o700))?;

        let listener = UnixListener::bind(&sock_path)?;
        listener.set_nonblocking(true)?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();
        std::thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                let (stream, _) = match listener.accept() {
                    Ok(conn) => conn,
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                    Err(_) => return,
                };

                let mut reader = BufReader::new(stream);
                let mut prompt = String::new();
                if reader.read_line(&mut prompt).is_err() {
                    continue;
                }
                let prompt = prompt.trim_end_matches('\n');

                if let Ok(response) = handler(prompt, is_secret(prompt)) {
                    let mut stream = reader.into_inner();
                    let _ = stream.write_all(format!("{response}\n").as_bytes());
                }
            }
        });

        Ok(AskPassServer {
            script_path,
            sock_path,
            stop,
        })
    }

    #[cfg(not(unix))]
    pub fn spawn(_handler: PromptHandler) -> io::Result<AskPassServer> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "askpass is currently not supported on this platform",
        ))
    }

    /// Path of the stub script, for `GIT_ASKPASS`.
    pub fn script_path(&self) -> &std::path::Path {
        &self.script_path
    }
}

impl Drop for AskPassServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        let _ = std::fs::remove_file(&self.sock_path);
        let _ = std::fs::remove_file(&self.script_path);
    }
}

fn is_secret(prompt: &str) -> bool {
    let prompt = prompt.to_lowercase();
    prompt.contains("password") || prompt.contains("passphrase")
}

fn nonce() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64 ^ d.as_secs())
        .unwrap_or(0)
}
