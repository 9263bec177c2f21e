// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Proactive-sync scheduler (spec §4.6.5, component I): periodically walks
//! every hosted repository under `<git_root>/<npub>/<identifier>.git` and
//! reconciles it against the peer git servers named in its announcement.
//!
//! Grounded on `original_source/src/ngit-relay-proactive-sync/main.go`'s
//! `SyncRepos`/`SyncRepo` loop: a 20-second warmup sleep, then a sweep every
//! `sync_interval`, with the next sweep starting immediately if the previous
//! one overran the interval.

use std::path::Path;
use std::time::{Duration, Instant};

use crate::reconciler::{self, Reconciler};
use crate::{identity, model, resolver};

/// Warmup delay before the first sweep, giving the relay listener and git
/// HTTP backend time to come up.
const WARMUP_DELAY: Duration = Duration::from_secs(20);

/// Sleep `WARMUP_DELAY`, then run [`sweep`] every `interval`, starting the
/// next sweep immediately if the previous one took longer than `interval`.
/// Runs until the process exits; intended to be spawned as a background
/// task or driven directly by the standalone proactive-sync binary.
pub async fn run(reconciler: Reconciler, interval: Duration) -> ! {
    tracing::info!(?interval, "proactive-sync scheduler waiting for warmup");
    tokio::time::sleep(WARMUP_DELAY).await;

    loop {
        let started = Instant::now();
        tracing::info!("starting proactive-sync sweep");
        sweep(&reconciler).await;

        let elapsed = started.elapsed();
        if elapsed < interval {
            let remaining = interval - elapsed;
            tracing::info!(?elapsed, sleep = ?remaining, "sweep complete, waiting for next sweep");
            tokio::time::sleep(remaining).await;
        } else {
            tracing::info!(?elapsed, ?interval, "sweep took longer than interval, starting next sweep immediately");
        }
    }
}

/// Walk `<git_root>/*/*.git` and reconcile every hosted repository found.
/// A single repository's failure is logged and does not stop the sweep.
pub async fn sweep(reconciler: &Reconciler) {
    let mut npub_dirs = match tokio::fs::read_dir(reconciler.git_root()).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!(error = %e, root = %reconciler.git_root().display(), "failed to read git data directory");
            return;
        }
    };

    loop {
        let npub_entry = match npub_dirs.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "failed to read git data directory entry");
                break;
            }
        };

        let npub_path = npub_entry.path();
        if !is_npub_dir(&npub_path).await {
            continue;
        }

        let mut repo_dirs = match tokio::fs::read_dir(&npub_path).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, path = %npub_path.display(), "failed to read npub directory");
                continue;
            }
        };

        loop {
            let repo_entry = match repo_dirs.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read repository directory entry");
                    break;
                }
            };

            let repo_path = repo_entry.path();
            if repo_path.extension().and_then(|e| e.to_str()) != Some("git") {
                continue;
            }

            if let Err(e) = sync_repo(reconciler, &repo_path).await {
                tracing::warn!(error = %e, path = %repo_path.display(), "failed to sync repository");
            }
        }
    }
}

async fn is_npub_dir(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
        return false;
    };
    if !name.starts_with("npub") {
        return false;
    }
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}

/// Reconcile a single hosted repository at `repo_path` against the peer
/// servers named in its own maintainer set's announcements.
async fn sync_repo(reconciler: &Reconciler, repo_path: &Path) -> Result<(), reconciler::ReconcilerError> {
    let (pubkey, _npub, identifier) = identity::pubkey_and_identifier_from_repo_path(repo_path)?;

    let events = reconciler.repo_events(&identifier).await?;
    let maintainers = resolver::resolve_maintainers(&events, pubkey, &identifier);
    if maintainers.is_empty() {
        return Err(reconciler::ReconcilerError::NoMaintainers);
    }

    let state_event = resolver::authoritative_state(&events, &maintainers)
        .map_err(|_| reconciler::ReconcilerError::NoValidState)?;
    let state = model::parse_state(state_event).map_err(|_| reconciler::ReconcilerError::MissingIdentifierTag)?;
    let local_url = reconciler.local_repo_url(pubkey, &identifier);
    let peers = resolver::peer_git_servers(&events, &maintainers, &local_url);

    let _guard = reconciler.locks().acquire(repo_path).await;
    let outcome = reconciler::proactive_sync(repo_path, &state, &peers).await?;
    if !outcome.is_complete() {
        tracing::debug!(
            identifier = %identifier,
            missing = ?outcome.missing_refs,
            "proactive sync left refs missing after sweep"
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn is_npub_dir_rejects_non_npub_names_and_files() {
        let dir = TempDir::new().unwrap();
        let npub_dir = dir.path().join("npub1abc");
        tokio::fs::create_dir(&npub_dir).await.unwrap();
        assert!(is_npub_dir(&npub_dir).await);

        let other_dir = dir.path().join("scratch");
        tokio::fs::create_dir(&other_dir).await.unwrap();
        assert!(!is_npub_dir(&other_dir).await);

        let npub_file = dir.path().join("npub1file");
        tokio::fs::write(&npub_file, b"").await.unwrap();
        assert!(!is_npub_dir(&npub_file).await);
    }
}
