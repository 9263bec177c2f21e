// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::BTreeSet;
use std::path::Path;

use nostr::PublicKey;

use super::{git, Reconciler};
use crate::model::kind_repo_announcement;
use crate::{identity, model, resolver};

/// For every other announcer that lists `pubkey` as a maintainer of
/// `identifier`, mirror `repo_path` into that announcer's repository, per
/// spec §4.6.3. Returns the accumulated diagnostics of targets that failed;
/// a single failed target does not stop the others.
pub async fn mirror_to_comaintainers(
    reconciler: &Reconciler,
    pubkey: PublicKey,
    identifier: &str,
    repo_path: &Path,
) -> Vec<String> {
    let mut errors = Vec::new();

    let events = match reconciler.repo_events(identifier).await {
        Ok(events) => events,
        Err(e) => {
            errors.push(e.to_string());
            return errors;
        }
    };

    let co_announcers: BTreeSet<PublicKey> = events
        .iter()
        .filter(|e| e.kind == kind_repo_announcement() && e.pubkey != pubkey)
        .filter_map(|e| {
            let announcement = model::parse_announcement(e).ok()?;
            (announcement.id == identifier && announcement.maintainers.contains(&pubkey))
                .then_some(e.pubkey)
        })
        .collect();

    for q in co_announcers {
        let maintainers_of_q = resolver::resolve_maintainers(&events, q, identifier);
        let state_event = match resolver::authoritative_state(&events, &maintainers_of_q) {
            Ok(event) => event,
            Err(_) => continue,
        };
        // A newer state from another maintainer already landed in q's repo;
        // let that maintainer's own post-receive hook drive this mirror.
        if state_event.pubkey != pubkey {
            continue;
        }

        let q_repo_path = identity::repo_path(reconciler.git_root(), &q, identifier);
        let _guard = reconciler.locks().acquire(&q_repo_path).await;

        let remote_name = identity::npub(&pubkey);
        let remote_url = repo_path.to_string_lossy().to_string();

        if let Err(e) = ensure_remote(&q_repo_path, &remote_name, &remote_url).await {
            errors.push(e.to_string());
            continue;
        }

        if let Err(e) = git::pull_mirror(&q_repo_path, &remote_name).await {
            errors.push(e.to_string());
        }
    }

    errors
}

/// Make sure `repo_path` has a remote named `name` pointing at `url`,
/// repointing it if it already exists with a different target.
async fn ensure_remote(repo_path: &Path, name: &str, url: &str) -> Result<(), git::GitError> {
    match git::remote_get_url(repo_path, name).await {
        Ok(existing) if existing.trim() == url => Ok(()),
        Ok(_) => {
            git::remote_remove(repo_path, name).await?;
            git::remote_add(repo_path, name, url).await
        }
        Err(_) => git::remote_add(repo_path, name, url).await,
    }
}
