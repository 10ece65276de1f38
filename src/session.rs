//! Agent session handle.
//!
//! The handle identifies a running `gpg-agent` (socket, pid, expiry). The
//! broker never stores it: the caller receives it from `setup` and sends it
//! back with every later request.

use std::path::PathBuf;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// Coordinates of a running decryption agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionHandle {
    /// Agent socket path
    pub socket: PathBuf,
    /// Agent process id
    pub pid: i32,
    /// When the agent's passphrase cache is due to expire
    #[serde(with = "chrono::serde::ts_seconds")]
    pub expires: DateTime<Utc>,
}

impl SessionHandle {
    pub fn new(socket: impl Into<PathBuf>, pid: i32, expires: DateTime<Utc>) -> Self {
        Self {
            socket: socket.into(),
            pid,
            expires,
        }
    }

    /// Build a handle from the loose request fields.
    ///
    /// Returns `None` unless all three fields are present and in range; a
    /// partial handle is treated as no handle at all.
    pub fn from_parts(socket: Option<&str>, pid: Option<i64>, expires: Option<f64>) -> Option<Self> {
        let socket = socket.filter(|s| !s.is_empty())?;
        let pid = i32::try_from(pid?).ok()?;
        let expires = expires.filter(|e| e.is_finite())?;
        let expires = Utc.timestamp_opt(expires.trunc() as i64, 0).single()?;
        Some(Self::new(socket, pid, expires))
    }

    /// Value for the `GPG_AGENT_INFO` environment variable.
    pub fn agent_info(&self) -> String {
        format!("{}:{}:1", self.socket.display(), self.pid)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires
    }
}
