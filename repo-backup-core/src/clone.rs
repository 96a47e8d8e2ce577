//! Clone worker: shells out to the system `git` binary.
//!
//! The access token is handed to git as an `http.extraHeader` through the
//! `GIT_CONFIG_*` environment variables, never on the command line.

use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, instrument, warn};

use crate::contract::{CloneResult, Cloner};

/// Username sent with the token; GitHub ignores it for token auth.
pub const AUTH_USERNAME: &str = "repo-backup";

/// Number of trailing git output lines kept for error messages.
const STDERR_TAIL: usize = 5;

/// [`Cloner`] backed by `git clone`.
pub struct GitCloner {
    program: String,
}

impl GitCloner {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Uses a specific git executable instead of the one on `PATH`.
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn try_clone(
        &self,
        clone_url: &str,
        destination: &Path,
        access_token: &str,
    ) -> Result<CloneResult, String> {
        if is_populated(destination).await {
            warn!(
                path = %destination.display(),
                "Destination already populated, skipping clone"
            );
            return Ok(CloneResult::Succeeded { head: None });
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
        }

        let mut cmd = Command::new(&self.program);
        cmd.arg("clone")
            .arg("--progress")
            .arg(clone_url)
            .arg(destination);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        for (k, v) in auth_env(access_token) {
            cmd.env(k, v);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::inherit());
        cmd.stderr(Stdio::piped());

        debug!("spawning git clone");
        let mut child = cmd
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {e}", self.program))?;

        let tail = match child.stderr.take() {
            Some(stderr) => relay_progress(stderr, clone_url).await,
            None => VecDeque::new(),
        };

        let status = child
            .wait()
            .await
            .map_err(|e| format!("failed to wait for git clone: {e}"))?;

        if !status.success() {
            let detail = tail.into_iter().collect::<Vec<_>>().join(" | ");
            return Err(format!("git clone exited with {status}: {detail}"));
        }

        let head = self.resolve_head(destination).await;
        Ok(CloneResult::Succeeded { head })
    }

    /// Commit id of `HEAD`, or `None` when the clone has no commits.
    async fn resolve_head(&self, repo: &Path) -> Option<String> {
        let output = Command::new(&self.program)
            .arg("-C")
            .arg(repo)
            .arg("rev-parse")
            .arg("--verify")
            .arg("--quiet")
            .arg("HEAD")
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(out) if out.status.success() => {
                let head = String::from_utf8_lossy(&out.stdout).trim().to_string();
                (!head.is_empty()).then_some(head)
            }
            Ok(out) => {
                debug!(path = %repo.display(), status = %out.status, "HEAD does not resolve to a commit");
                None
            }
            Err(e) => {
                warn!(error = ?e, path = %repo.display(), "Failed to run git rev-parse");
                None
            }
        }
    }
}

impl Default for GitCloner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Cloner for GitCloner {
    #[instrument(skip(self, access_token), fields(%clone_url, path = %destination.display()))]
    async fn clone_repository(
        &self,
        clone_url: &str,
        destination: &Path,
        access_token: &str,
    ) -> CloneResult {
        info!("git clone {} {}", clone_url, destination.display());
        match self.try_clone(clone_url, destination, access_token).await {
            Ok(result) => {
                if let CloneResult::Succeeded { head: Some(head) } = &result {
                    info!(%head, "Cloned repository");
                }
                result
            }
            Err(message) => {
                error!(error = %message, "Clone failed");
                CloneResult::Failed(message)
            }
        }
    }
}

/// Environment that makes git send `Authorization: Basic <user:token>`.
pub fn auth_env(access_token: &str) -> Vec<(String, String)> {
    if access_token.is_empty() {
        return Vec::new();
    }
    let credentials = base64::engine::general_purpose::STANDARD
        .encode(format!("{AUTH_USERNAME}:{access_token}"));
    vec![
        ("GIT_CONFIG_COUNT".to_string(), "1".to_string()),
        ("GIT_CONFIG_KEY_0".to_string(), "http.extraHeader".to_string()),
        (
            "GIT_CONFIG_VALUE_0".to_string(),
            format!("Authorization: Basic {credentials}"),
        ),
    ]
}

async fn is_populated(path: &Path) -> bool {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(Some(_))),
        Err(_) => false,
    }
}

/// Copies git's progress output to stdout, returning the last few lines.
///
/// git rewrites progress lines with `\r`, so both `\r` and `\n` end a line.
async fn relay_progress<R>(stream: R, label: &str) -> VecDeque<String>
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL);
    let mut segments = BufReader::new(stream).split(b'\r');

    loop {
        let segment = match segments.next_segment().await {
            Ok(Some(segment)) => segment,
            Ok(None) => break,
            Err(e) => {
                debug!(error = ?e, "Stopped reading git output");
                break;
            }
        };
        for line in String::from_utf8_lossy(&segment).split('\n') {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            println!("{label}: {line}");
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    }
    tail
}
