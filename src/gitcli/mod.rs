//! Git transport driven through the `git` binary.
//!
//! Terminal prompting is disabled on the first attempt. When a clone or
//! pull fails in a way that looks like missing credentials and the remote
//! is http(s), the operation is retried once with the askpass hook wired to
//! the interactive prompt handler; if that also fails the original error
//! surfaces.

mod askpass;

use std::io;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::debug;

use askpass::AskPassServer;

pub type PromptHandler = Arc<dyn Fn(&str, bool) -> io::Result<String> + Send + Sync>;

pub struct Client {
    prompt: PromptHandler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    Updated,
    AlreadyUpToDate,
}

impl Client {
    pub fn new(prompt: PromptHandler) -> Client {
        Client { prompt }
    }

    pub fn clone_repo(&self, url: &str, branch: Option<&str>, dest: &Path) -> Result<()> {
        let mut args = vec![
            "clone".to_string(),
            "--single-branch".to_string(),
        ];
        if let Some(branch) = branch {
            args.push("--branch".to_string());
            args.push(short_ref(branch).to_string());
        }
        args.push(url.to_string());
        args.push(dest.to_string_lossy().to_string());

        self.run_with_auth_retry(&args, None, url).map(|_| ())
    }

    pub fn pull(&self, dir: &Path, url: &str) -> Result<PullOutcome> {
        let args = vec!["pull".to_string(), "--ff-only".to_string()];
        let stdout = self.run_with_auth_retry(&args, Some(dir), url)?;
        if stdout.contains("Already up to date") {
            return Ok(PullOutcome::AlreadyUpToDate);
        }
        Ok(PullOutcome::Updated)
    }

    fn run_with_auth_retry(
        &self,
        args: &[String],
        cwd: Option<&Path>,
        url: &str,
    ) -> Result<String> {
        match run_git(args, cwd, None) {
            Ok(stdout) => Ok(stdout),
            Err(original) => {
                if !is_auth_error(&original.to_string())
                    || !(url.starts_with("https://") || url.starts_with("http://"))
                {
                    return Err(original);
                }

                debug!("git reported missing credentials, retrying via askpass");
                let Ok(server) = AskPassServer::spawn(self.prompt.clone()) else {
                    return Err(original);
                };
                run_git(args, cwd, Some(&server)).map_err(|_| original)
            }
        }
    }
}

fn run_git(args: &[String], cwd: Option<&Path>, askpass: Option<&AskPassServer>) -> Result<String> {
    let mut cmd = Command::new("git");
    cmd.args(args).env("GIT_TERMINAL_PROMPT", "0");
    if let Some(cwd) = cwd {
        cmd.current_dir(cwd);
    }
    if let Some(askpass) = askpass {
        cmd.env("GIT_ASKPASS", askpass.script_path());
    }

    let output = cmd
        .output()
        .map_err(|e| anyhow!("failed to run git: {e}"))?;
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git {} failed: {}", args.first().map(String::as_str).unwrap_or(""), stderr.trim());
    }
    Ok(stdout)
}

fn is_auth_error(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("authentication failed")
        || message.contains("could not read username")
        || message.contains("could not read password")
        || message.contains("terminal prompts disabled")
}

/// Strips the `refs/heads/` prefix from manifest branch references so they
/// can be passed to `git clone --branch`.
fn short_ref(branch: &str) -> &str {
    branch
        .strip_prefix("refs/heads/")
        .or_else(|| branch.strip_prefix("refs/tags/"))
        .unwrap_or(branch)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_errors_are_recognised() {
        assert!(is_auth_error(
            "fatal: Authentication failed for 'https://example.com/repo.git'"
        ));
        assert!(is_auth_error(
            "fatal: could not read Username for 'https://example.com': terminal prompts disabled"
        ));
        assert!(!is_auth_error("fatal: repository not found"));
    }

    #[test]
    fn branch_refs_are_shortened() {
        assert_eq!(short_ref("refs/heads/main"), "main");
        assert_eq!(short_ref("main"), "main");
    }
}
