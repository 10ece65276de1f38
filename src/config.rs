//! Configuration management for pass-broker.
//!
//! The browser launches the host with no arguments it controls, so all
//! configuration is read from environment variables:
//! - `PASSWORD_STORE_DIR` - Optional. Root of the password store. Defaults to `$HOME/.password-store`.
//! - `PASS_BROKER_GPG` - Optional. Decryption command. Defaults to `gpg`.
//! - `PASS_BROKER_GPG_AGENT` - Optional. Agent binary. Defaults to `gpg-agent`.
//! - `PASS_BROKER_AGENT_TTL` - Optional. Agent cache TTL in seconds. Defaults to `3600`.
//! - `PASS_BROKER_LOCK_FILE` - Optional. Lock file guarding agent start. Defaults to `$XDG_RUNTIME_DIR/pass-broker-agent.lock`,
//!   or `.pass-broker-agent.lock` in the store root when `XDG_RUNTIME_DIR` is unset.
//! - `PASS_BROKER_AGENT_LOCK` - Optional. Set to `false` to start the agent without the lock. Defaults to `true`.
//! - `PASS_BROKER_MAX_FRAME` - Optional. Largest accepted request frame in bytes. Defaults to 64 MiB.

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::util::{env_var_bool, home_dir};

/// Default lifetime of an agent session (and of the agent's passphrase cache).
pub const DEFAULT_AGENT_TTL: Duration = Duration::from_secs(60 * 60);

/// File name of the agent start lock.
pub const LOCK_FILE_NAME: &str = "pass-broker-agent.lock";

/// Default upper bound on the size of an incoming request frame.
pub const DEFAULT_MAX_FRAME: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root of the password store
    pub store_dir: PathBuf,

    /// Decryption command, invoked once per store entry
    pub gpg_path: String,

    /// Arguments placed before the entry path
    pub gpg_args: Vec<String>,

    /// Agent binary, started by `setup`
    pub gpg_agent_path: String,

    /// Arguments placed before the cache TTL flags
    pub gpg_agent_args: Vec<String>,

    /// Cache TTL handed to the agent; also the lifetime of returned handles
    pub agent_ttl: Duration,

    /// File locked while spawning the agent; a lock that cannot be taken is skipped
    pub lock_file: PathBuf,

    /// Whether agent start takes `lock_file`
    pub lock_agent_start: bool,

    /// Largest request frame accepted from the caller
    pub max_frame_len: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a numeric variable does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let store_dir = std::env::var("PASSWORD_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(home_dir()).join(".password-store"));

        let mut config = Self::new(store_dir);

        if let Ok(gpg) = std::env::var("PASS_BROKER_GPG") {
            config.gpg_path = gpg;
        }
        if let Ok(agent) = std::env::var("PASS_BROKER_GPG_AGENT") {
            config.gpg_agent_path = agent;
        }
        if let Ok(ttl) = std::env::var("PASS_BROKER_AGENT_TTL") {
            let secs: u64 = ttl.trim().parse().map_err(|e| {
                ConfigError::InvalidValue("PASS_BROKER_AGENT_TTL".to_string(), format!("{}", e))
            })?;
            config.agent_ttl = Duration::from_secs(secs);
        }
        if let Ok(lock_file) = std::env::var("PASS_BROKER_LOCK_FILE") {
            config.lock_file = PathBuf::from(lock_file);
        }
        config.lock_agent_start = env_var_bool("PASS_BROKER_AGENT_LOCK", true);
        if let Ok(max) = std::env::var("PASS_BROKER_MAX_FRAME") {
            config.max_frame_len = max.trim().parse().map_err(|e| {
                ConfigError::InvalidValue("PASS_BROKER_MAX_FRAME".to_string(), format!("{}", e))
            })?;
        }

        Ok(config)
    }

    /// Create a config with default values for the given store (useful for testing).
    pub fn new(store_dir: PathBuf) -> Self {
        let lock_file = default_lock_file(std::env::var_os("XDG_RUNTIME_DIR").map(PathBuf::from), &store_dir);
        Self {
            store_dir,
            gpg_path: "gpg".to_string(),
            gpg_args: ["--quiet", "--batch", "--use-agent", "--decrypt"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            gpg_agent_path: "gpg-agent".to_string(),
            gpg_agent_args: vec!["--daemon".to_string(), "--no-use-standard-socket".to_string()],
            agent_ttl: DEFAULT_AGENT_TTL,
            lock_file,
            lock_agent_start: true,
            max_frame_len: DEFAULT_MAX_FRAME,
        }
    }
}

/// Per-user lock location: the runtime dir if there is one, else the store root.
fn default_lock_file(runtime_dir: Option<PathBuf>, store_dir: &Path) -> PathBuf {
    match runtime_dir.filter(|dir| dir.is_absolute()) {
        Some(dir) => dir.join(LOCK_FILE_NAME),
        None => store_dir.join(format!(".{}", LOCK_FILE_NAME)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_gpg_defaults() {
        let config = Config::new(PathBuf::from("/tmp/store"));
        assert_eq!(config.store_dir, PathBuf::from("/tmp/store"));
        assert_eq!(config.gpg_path, "gpg");
        assert_eq!(config.gpg_args.last().map(String::as_str), Some("--decrypt"));
        assert_eq!(config.gpg_agent_path, "gpg-agent");
        assert_eq!(config.gpg_agent_args, vec!["--daemon", "--no-use-standard-socket"]);
        assert_eq!(config.agent_ttl, Duration::from_secs(3600));
        assert!(config.lock_agent_start);
        assert_eq!(config.max_frame_len, DEFAULT_MAX_FRAME);
    }

    #[test]
    fn lock_file_defaults_to_a_per_user_location() {
        let store = PathBuf::from("/home/u/.password-store");
        assert_eq!(
            default_lock_file(Some(PathBuf::from("/run/user/1000")), &store),
            PathBuf::from("/run/user/1000/pass-broker-agent.lock")
        );
        assert_eq!(
            default_lock_file(None, &store),
            PathBuf::from("/home/u/.password-store/.pass-broker-agent.lock")
        );
        assert_eq!(
            default_lock_file(Some(PathBuf::from("relative")), &store),
            store.join(".pass-broker-agent.lock")
        );
    }
}
