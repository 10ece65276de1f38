//! # pass-broker
//!
//! Native-messaging host that lets a browser extension look up credentials
//! in a `pass` password store without ever holding key material.
//!
//! The browser starts the host once per request. All continuity between
//! requests lives in the agent session handle that travels in the payloads.
//!
//! ## Architecture
//!
//! ```text
//!   browser ──frame──▶ channel ──▶ protocol::Request ──▶ Dispatcher
//!                                                         │
//!                                    ┌────────────────────┴──────┐
//!                                    ▼                           ▼
//!                            AgentController ◀──decrypt── StoreScanner
//!                              │        │                        │
//!                         gpg-agent   gpg --decrypt        ~/.password-store
//! ```
//!
//! ## Request Flow
//! 1. Read one length-prefixed JSON frame from stdin
//! 2. Validate it into a closed command set
//! 3. Start/probe/stop the agent or scan the store
//! 4. Write one response frame to stdout and exit
//!
//! ## Modules
//! - `channel`: frame encoding over stdin/stdout
//! - `protocol`: request and response variants
//! - `dispatch`: command execution and the single-request loop
//! - `agent`: `gpg-agent` lifecycle and `gpg` decryption
//! - `store`: store walking, record normalization, glob matching
//! - `session`: the agent session handle

pub mod agent;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod protocol;
pub mod session;
pub mod store;
pub mod util;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use dispatch::{serve_once, Dispatcher};
pub use session::SessionHandle;
pub use store::{CredentialRecord, StoreScanner};
