//! Password store scanning and URL matching.
//!
//! ## Layout
//!
//! ```text
//! ~/.password-store/
//! ├── .git/                 # skipped, as is every dot-entry
//! ├── .gpg-id
//! ├── bank.example.gpg      # one entry per *.gpg file
//! └── work/
//!     └── intranet.gpg
//! ```
//!
//! Entries are visited depth-first with siblings in file-name order, and
//! decrypted one at a time. `find` returns the first entry in that order
//! whose pattern matches, not the most specific one.

mod glob;
mod record;

pub use glob::{glob_match, Glob};
pub use record::{host_of, CredentialRecord};

use std::ffi::OsStr;
use std::path::PathBuf;

use futures::{Stream, StreamExt};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::agent::AgentController;

/// Extension marking an encrypted store entry.
pub const ENTRY_EXTENSION: &str = "gpg";

/// Walks a store, decrypting entries through an [`AgentController`].
pub struct StoreScanner {
    agent: AgentController,
    root: PathBuf,
}

impl StoreScanner {
    pub fn new(agent: AgentController, root: impl Into<PathBuf>) -> Self {
        Self {
            agent,
            root: root.into(),
        }
    }

    pub fn agent(&self) -> &AgentController {
        &self.agent
    }

    pub fn agent_mut(&mut self) -> &mut AgentController {
        &mut self.agent
    }

    /// Paths of all entries, in walk order.
    pub fn entries(&self) -> Vec<PathBuf> {
        WalkDir::new(&self.root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !is_hidden(e))
            .filter_map(|e| match e {
                Ok(entry) => Some(entry),
                Err(err) => {
                    debug!("Skipping unreadable store path: {}", err);
                    None
                }
            })
            .filter(|e| {
                e.file_type().is_file() && e.path().extension() == Some(OsStr::new(ENTRY_EXTENSION))
            })
            .map(DirEntry::into_path)
            .collect()
    }

    /// Decrypt and parse every entry, skipping empty and invalid ones.
    pub fn iterate(&self) -> impl Stream<Item = CredentialRecord> + '_ {
        let entries = self.entries();
        debug!(root = %self.root.display(), count = entries.len(), "Scanning store");

        async_stream::stream! {
            for path in entries {
                let lines: Vec<String> = self.agent.decrypt(&path).collect().await;
                if lines.is_empty() {
                    debug!("Skipping {}: nothing decrypted", path.display());
                    continue;
                }
                match CredentialRecord::from_lines(lines) {
                    Some(record) => {
                        yield record;
                    }
                    None => debug!("Skipping {}: no url or pattern", path.display()),
                }
            }
        }
    }

    /// First record, in walk order, whose pattern matches `identifier`.
    pub async fn find(&self, identifier: &str) -> Option<CredentialRecord> {
        let records = self.iterate();
        futures::pin_mut!(records);
        while let Some(record) = records.next().await {
            if record.matches(identifier) {
                return Some(record);
            }
        }
        None
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{cat_store, write_entry};

    fn scanner(config: &crate::config::Config) -> StoreScanner {
        StoreScanner::new(AgentController::new(config.clone()), &config.store_dir)
    }

    #[test]
    fn entries_skip_hidden_and_foreign_files() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = cat_store(temp.path());
        let root = &config.store_dir;
        write_entry(root, "b.gpg", "pw");
        write_entry(root, "a/z.gpg", "pw");
        write_entry(root, "a/y.txt", "pw");
        write_entry(root, ".git/objects/x.gpg", "pw");
        write_entry(root, ".gpg-id", "ABCDEF");
        write_entry(root, ".hidden.gpg", "pw");

        let entries: Vec<PathBuf> = scanner(&config)
            .entries()
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_path_buf())
            .collect();
        assert_eq!(entries, vec![PathBuf::from("a/z.gpg"), PathBuf::from("b.gpg")]);
    }

    #[test]
    fn missing_store_has_no_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let scanner = StoreScanner::new(
            AgentController::new(crate::config::Config::new(temp.path().join("absent"))),
            temp.path().join("absent"),
        );
        assert!(scanner.entries().is_empty());
    }

    #[tokio::test]
    async fn iterate_skips_empty_and_invalid_entries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = cat_store(temp.path());
        let root = &config.store_dir;
        write_entry(root, "1-empty.gpg", "");
        write_entry(root, "2-nourl.gpg", "pw\nlogin: alice\n");
        write_entry(root, "3-good.gpg", "pw\nurl: https://good.example/\n");

        let records: Vec<CredentialRecord> = scanner(&config).iterate().collect().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].get("host"), Some("good.example"));
    }

    #[tokio::test]
    async fn find_returns_matching_record() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = cat_store(temp.path());
        write_entry(
            &config.store_dir,
            "bank.gpg",
            "secret123\nurl: https://bank.example/\nusername: alice\n",
        );
        write_entry(&config.store_dir, "mail.gpg", "hunter2\nurl: https://mail.example/\n");

        let found = scanner(&config)
            .find("https://mail.example/inbox")
            .await
            .expect("match");
        assert_eq!(found.password, "hunter2");

        assert!(scanner(&config).find("https://other.example/").await.is_none());
        assert!(scanner(&config).find("mail.example").await.is_none());
    }

    #[tokio::test]
    async fn find_prefers_walk_order_over_specificity() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = cat_store(temp.path());
        write_entry(&config.store_dir, "a/broad.gpg", "broad\npattern: *\n");
        write_entry(&config.store_dir, "b.gpg", "exact\nurl: https://exact.example/\n");

        let found = scanner(&config)
            .find("https://exact.example/login")
            .await
            .expect("match");
        assert_eq!(found.password, "broad");
    }

    #[tokio::test]
    async fn find_in_empty_store_is_none() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = cat_store(temp.path());
        assert!(scanner(&config).find("https://x.example/").await.is_none());
    }
}
