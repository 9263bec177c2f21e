// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Thin wrapper over the exact `git` subprocess invocations this crate
//! issues (spec §6). Every caller gets combined stdout+stderr on failure;
//! [`fetch`] and [`pull_mirror`] additionally run under a 30-second timeout.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;
use tokio::time::timeout;

/// A single failed (or timed-out) git invocation
#[derive(Debug, Clone, thiserror::Error)]
#[error("git {args}: {detail}")]
pub struct GitError {
    /// The argv that was run, space-joined, for diagnostics
    pub args: String,
    /// Combined stdout/stderr, or a timeout note
    pub detail: String,
}

/// Subprocess timeout applied to `fetch`/`pull --mirror` (spec §5)
pub const SUBPROCESS_TIMEOUT: Duration = Duration::from_secs(30);

fn join_args(args: &[&str]) -> String {
    args.join(" ")
}

async fn run(args: &[&str]) -> Result<String, GitError> {
    let output = Command::new("git")
        .args(args)
        .output()
        .await
        .map_err(|e| GitError { args: join_args(args), detail: e.to_string() })?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    } else {
        let mut detail = String::from_utf8_lossy(&output.stdout).into_owned();
        detail.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(GitError { args: join_args(args), detail })
    }
}

async fn run_with_timeout(args: &[&str], limit: Duration) -> Result<String, GitError> {
    match timeout(limit, run(args)).await {
        Ok(result) => result,
        Err(_) => Err(GitError { args: join_args(args), detail: "timed out".to_string() }),
    }
}

/// `git init --bare <path>`
pub async fn init_bare(path: &Path) -> Result<(), GitError> {
    run(&["init", "--bare", &path.to_string_lossy()]).await.map(drop)
}

/// `git config <key> <value>`, run with `-C <path>`
pub async fn config(path: &Path, key: &str, value: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "config", key, value]).await.map(drop)
}

/// `git -C <path> rev-parse --git-dir`
pub async fn is_git_dir(path: &Path) -> bool {
    run(&["-C", &path.to_string_lossy(), "rev-parse", "--git-dir"]).await.is_ok()
}

/// `git -C <path> show-ref --heads --tags`, parsed into `ref -> hash`
pub async fn show_ref(path: &Path) -> Result<Vec<(String, String)>, GitError> {
    let output = match run(&["-C", &path.to_string_lossy(), "show-ref", "--heads", "--tags"]).await
    {
        Ok(output) => output,
        // An empty repository exits non-zero with no output; treat as "no refs".
        Err(e) if e.detail.trim().is_empty() => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };
    Ok(output
        .lines()
        .filter_map(|line| {
            let mut parts = line.splitn(2, ' ');
            let hash = parts.next()?.to_string();
            let name = parts.next()?.to_string();
            Some((name, hash))
        })
        .collect())
}

/// `git -C <path> update-ref <ref> <hash>`
pub async fn update_ref(path: &Path, reference: &str, hash: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "update-ref", reference, hash]).await.map(drop)
}

/// `git -C <path> update-ref -d <ref>`
pub async fn delete_ref(path: &Path, reference: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "update-ref", "-d", reference]).await.map(drop)
}

/// `git -C <path> remote add <name> <url>`
pub async fn remote_add(path: &Path, name: &str, url: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "remote", "add", name, url]).await.map(drop)
}

/// `git -C <path> remote remove <name>`
pub async fn remote_remove(path: &Path, name: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "remote", "remove", name]).await.map(drop)
}

/// `git -C <path> remote get-url <name>`
pub async fn remote_get_url(path: &Path, name: &str) -> Result<String, GitError> {
    run(&["-C", &path.to_string_lossy(), "remote", "get-url", name])
        .await
        .map(|s| s.trim().to_string())
}

/// `git -C <path> fetch <remote> --tags --force`, under the 30s subprocess timeout
pub async fn fetch(path: &Path, remote: &str) -> Result<(), GitError> {
    run_with_timeout(
        &["-C", &path.to_string_lossy(), "fetch", remote, "--tags", "--force"],
        SUBPROCESS_TIMEOUT,
    )
    .await
    .map(drop)
}

/// `git -C <path> pull --mirror <remote>`, under the 30s subprocess timeout
pub async fn pull_mirror(path: &Path, remote: &str) -> Result<(), GitError> {
    run_with_timeout(
        &["-C", &path.to_string_lossy(), "pull", "--mirror", remote],
        SUBPROCESS_TIMEOUT,
    )
    .await
    .map(drop)
}

/// `git -C <path> cat-file -e <hash>`; `true` iff the object is present
pub async fn has_object(path: &Path, hash: &str) -> bool {
    run(&["-C", &path.to_string_lossy(), "cat-file", "-e", hash]).await.is_ok()
}

/// `git -C <path> symbolic-ref HEAD <ref>`
pub async fn set_symbolic_head(path: &Path, reference: &str) -> Result<(), GitError> {
    run(&["-C", &path.to_string_lossy(), "symbolic-ref", "HEAD", reference]).await.map(drop)
}

/// Best-effort `git config --global --add safe.directory <path>`; failures
/// are ignored, as hook binaries may lack permission to write global config.
pub async fn mark_safe_directory(path: &Path) {
    let _ = run(&[
        "config",
        "--global",
        "--add",
        "safe.directory",
        &path.to_string_lossy(),
    ])
    .await;
}
