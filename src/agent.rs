//! Decryption agent lifecycle and per-entry decryption.
//!
//! The controller holds at most one [`SessionHandle`]. It can start a fresh
//! `gpg-agent` (replacing the handle), probe whether the handle still points
//! at a live agent, stop it, and run `gpg --decrypt` against store entries
//! with `GPG_AGENT_INFO` pointing at the held agent.
//!
//! Failures that the caller cannot act on are reported as named outcomes
//! ([`StartOutcome`], [`StopOutcome`]) instead of errors.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::OnceLock;

use chrono::Utc;
use fs2::FileExt;
use futures::Stream;
use regex::Regex;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::session::SessionHandle;

/// Matches the `GPG_AGENT_INFO=<socket>:<pid>:1` line printed by `gpg-agent --daemon`.
const ANNOUNCEMENT_REGEX: &str = r"GPG_AGENT_INFO=([^:;\s]+):(\d+):1";

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read agent output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Agent did not announce GPG_AGENT_INFO")]
    NoAnnouncement,

    #[error("Failed to lock {path}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of [`AgentController::start_agent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The held handle already pointed at a live agent.
    AlreadyRunning,
    /// A new agent was started and its handle is now held.
    Started,
}

/// Result of [`AgentController::stop_agent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// No handle was held, nothing to stop.
    NoSession,
    /// `SIGTERM` was delivered.
    Terminated,
    /// The recorded process no longer exists.
    AlreadyGone,
    /// The signal could not be delivered for another reason.
    Failed(String),
}

/// Starts, probes and stops the decryption agent, and decrypts entries through it.
#[derive(Debug, Clone)]
pub struct AgentController {
    config: Config,
    handle: Option<SessionHandle>,
}

impl AgentController {
    /// Create an unopened controller: no agent is known.
    pub fn new(config: Config) -> Self {
        Self {
            config,
            handle: None,
        }
    }

    /// Adopt a caller-supplied handle. Nothing is validated here.
    pub fn open(&mut self, handle: SessionHandle) {
        self.handle = Some(handle);
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    /// True when the held pid is alive and the held socket still exists.
    pub fn is_running(&self) -> bool {
        let Some(handle) = &self.handle else {
            return false;
        };
        process_alive(handle.pid) && handle.socket.exists()
    }

    /// Start a fresh agent unless the held one is still running.
    ///
    /// The spawned `gpg-agent --daemon` forks and announces its socket and
    /// pid on stdout. Only the announcement is awaited; the launcher process
    /// is not reaped here.
    pub async fn start_agent(&mut self) -> Result<StartOutcome, AgentError> {
        if self.is_running() {
            debug!("Agent already running, not starting another");
            return Ok(StartOutcome::AlreadyRunning);
        }

        let _lock = if self.config.lock_agent_start {
            match acquire_start_lock(&self.config.lock_file) {
                Ok(file) => Some(file),
                Err(e) => {
                    warn!("{}; starting agent unlocked", e);
                    None
                }
            }
        } else {
            None
        };

        let ttl = self.config.agent_ttl.as_secs().to_string();
        let mut cmd = Command::new(&self.config.gpg_agent_path);
        cmd.args(&self.config.gpg_agent_args)
            .arg("--default-cache-ttl")
            .arg(&ttl)
            .arg("--max-cache-ttl")
            .arg(&ttl)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        info!(program = %self.config.gpg_agent_path, ttl = %ttl, "Starting decryption agent");

        let mut child = cmd.spawn().map_err(|source| AgentError::Spawn {
            program: self.config.gpg_agent_path.clone(),
            source,
        })?;
        let stdout = child.stdout.take().ok_or(AgentError::NoAnnouncement)?;

        let mut lines = BufReader::new(stdout).lines();
        let mut announced = None;
        while let Some(line) = lines.next_line().await? {
            if let Some(found) = parse_announcement(&line) {
                announced = Some(found);
                break;
            }
        }

        match child.try_wait() {
            Ok(Some(status)) if !status.success() => {
                warn!("Agent launcher exited with status: {}", status)
            }
            Ok(_) => {}
            Err(e) => debug!("Could not poll agent launcher: {}", e),
        }

        let (socket, pid) = announced.ok_or(AgentError::NoAnnouncement)?;
        let expires = Utc::now()
            + chrono::Duration::from_std(self.config.agent_ttl)
                .unwrap_or_else(|_| chrono::Duration::hours(1));

        info!(socket = %socket.display(), pid, "Decryption agent started");
        self.handle = Some(SessionHandle::new(socket, pid, expires));
        Ok(StartOutcome::Started)
    }

    /// Send `SIGTERM` to the held agent. Idempotent.
    ///
    /// A handle whose socket is gone is treated as a dead agent and its pid
    /// is not signalled.
    pub fn stop_agent(&self) -> StopOutcome {
        let Some(handle) = &self.handle else {
            return StopOutcome::NoSession;
        };
        if handle.pid <= 0 {
            return StopOutcome::Failed(format!("refusing to signal pid {}", handle.pid));
        }
        if !handle.socket.exists() {
            debug!(pid = handle.pid, socket = %handle.socket.display(), "Agent socket gone, not signalling");
            return StopOutcome::AlreadyGone;
        }

        let result = unsafe { libc::kill(handle.pid, libc::SIGTERM) };
        if result == 0 {
            info!(pid = handle.pid, "Stopped decryption agent");
            return StopOutcome::Terminated;
        }

        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            debug!(pid = handle.pid, "Agent already gone");
            StopOutcome::AlreadyGone
        } else {
            warn!(pid = handle.pid, "Failed to stop agent: {}", err);
            StopOutcome::Failed(err.to_string())
        }
    }

    /// Decrypt one entry, yielding its plaintext line by line.
    ///
    /// Each call spawns a fresh `gpg`. Dropping the stream before it ends
    /// kills the process; draining it waits for the process to exit. Spawn
    /// and read failures end the stream early. Invalid UTF-8 is replaced
    /// with U+FFFD rather than ending the entry.
    pub fn decrypt(&self, path: &Path) -> impl Stream<Item = String> + 'static {
        let mut cmd = Command::new(&self.config.gpg_path);
        cmd.args(&self.config.gpg_args)
            .arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        match &self.handle {
            Some(handle) => {
                cmd.env("GPG_AGENT_INFO", handle.agent_info());
            }
            None => {
                cmd.env_remove("GPG_AGENT_INFO");
            }
        }

        let path = path.to_path_buf();
        let program = self.config.gpg_path.clone();

        async_stream::stream! {
            let mut child = match cmd.spawn() {
                Ok(child) => child,
                Err(e) => {
                    warn!("Failed to spawn {} for {}: {}", program, path.display(), e);
                    return;
                }
            };
            let Some(stdout) = child.stdout.take() else {
                return;
            };

            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf).await {
                    Ok(0) => break,
                    Ok(_) => {
                        yield decode_line(&buf);
                    }
                    Err(e) => {
                        warn!("Failed to read decrypted output of {}: {}", path.display(), e);
                        break;
                    }
                }
            }

            match child.wait().await {
                Ok(status) if !status.success() => {
                    debug!("{} exited with status {} for {}", program, status, path.display())
                }
                Ok(_) => {}
                Err(e) => warn!("Failed to reap {}: {}", program, e),
            }
        }
    }
}

/// Strip the line terminator (`\n` or `\r\n`) and decode lossily.
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// Extract `(socket, pid)` from a `gpg-agent --daemon` announcement line.
pub fn parse_announcement(line: &str) -> Option<(PathBuf, i32)> {
    static ANNOUNCEMENT: OnceLock<Regex> = OnceLock::new();
    let re = ANNOUNCEMENT
        .get_or_init(|| Regex::new(ANNOUNCEMENT_REGEX).expect("announcement regex is valid"));
    let caps = re.captures(line)?;
    let pid = caps[2].parse().ok()?;
    Some((PathBuf::from(&caps[1]), pid))
}

/// `kill(pid, 0)` probe. Anything but "no such process" counts as alive.
fn process_alive(pid: i32) -> bool {
    if pid <= 0 {
        return false;
    }
    let result = unsafe { libc::kill(pid, 0) };
    result == 0 || std::io::Error::last_os_error().raw_os_error() != Some(libc::ESRCH)
}

/// Take an exclusive advisory lock; released when the returned file is dropped.
fn acquire_start_lock(path: &Path) -> Result<File, AgentError> {
    let lock_err = |source: std::io::Error| AgentError::Lock {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(path)
        .map_err(lock_err)?;
    file.lock_exclusive().map_err(lock_err)?;
    Ok(file)
}
