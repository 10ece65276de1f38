//! Test fixtures: fake `gpg` / `gpg-agent` scripts and store builders.
//!
//! Scripts are run as `/bin/sh <script> ...` rather than executed directly,
//! which avoids `ETXTBSY` when tests write and spawn them concurrently.

use std::path::{Path, PathBuf};

use crate::config::Config;

/// Fake decryptor: prints the file named by its last argument.
pub(crate) const CAT_LAST_ARG: &str = "for last; do :; done\ncat \"$last\"\n";

pub(crate) fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).expect("write script");
    path
}

/// A config whose lock file lives in `dir` and whose store is `dir/store`.
pub(crate) fn test_config(dir: &Path) -> Config {
    let mut config = Config::new(dir.join("store"));
    config.lock_file = dir.join("agent.lock");
    config
}

pub(crate) fn use_fake_gpg(config: &mut Config, script: &Path) {
    config.gpg_path = "/bin/sh".to_string();
    config.gpg_args = vec![script.display().to_string()];
}

pub(crate) fn use_fake_agent(config: &mut Config, script: &Path) {
    config.gpg_agent_path = "/bin/sh".to_string();
    config.gpg_agent_args = vec![script.display().to_string()];
}

/// Write a plaintext "encrypted" entry at `root/relative`.
pub(crate) fn write_entry(root: &Path, relative: &str, content: &str) -> PathBuf {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create entry dir");
    }
    std::fs::write(&path, content).expect("write entry");
    path
}

/// Config plus a store directory decrypted by `cat`.
pub(crate) fn cat_store(dir: &Path) -> Config {
    let mut config = test_config(dir);
    std::fs::create_dir_all(&config.store_dir).expect("create store");
    let script = write_script(dir, "fake-gpg.sh", CAT_LAST_ARG);
    use_fake_gpg(&mut config, &script);
    config
}

/// Pid of a process that has already exited and been reaped.
pub(crate) fn dead_pid() -> i32 {
    let mut child = std::process::Command::new("true")
        .spawn()
        .expect("spawn true");
    let pid = child.id() as i32;
    child.wait().expect("wait true");
    pid
}
