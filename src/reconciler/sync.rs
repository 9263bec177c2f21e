// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use super::git;
use super::ReconcilerError;
use crate::model::RepositoryState;

/// Result of a [`proactive_sync`] run
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// Refs named in the state that could not be brought up to date against
    /// any peer server
    pub missing_refs: Vec<String>,
    /// Accumulated git-command failures, informational only
    pub errors: Vec<String>,
}

impl SyncOutcome {
    /// `true` iff every ref in the state was brought to its target hash
    pub fn is_complete(&self) -> bool {
        self.missing_refs.is_empty()
    }
}

/// Align `repo_path`'s refs with `state`, fetching missing objects from
/// `peer_servers` in order and stopping as soon as every ref is satisfied.
/// Per spec §4.6.4: deletes local refs the state doesn't name, then fetches
/// only as many peers as needed to fill in the rest.
pub async fn proactive_sync(
    repo_path: &Path,
    state: &RepositoryState,
    peer_servers: &BTreeSet<String>,
) -> Result<SyncOutcome, ReconcilerError> {
    git::mark_safe_directory(repo_path).await;

    if !git::is_git_dir(repo_path).await {
        return Err(ReconcilerError::Git(git::GitError {
            args: "rev-parse --git-dir".to_string(),
            detail: format!("{} is not a git directory", repo_path.display()),
        }));
    }

    let mut errors = Vec::new();

    let local_refs: BTreeMap<String, String> =
        git::show_ref(repo_path).await.unwrap_or_default().into_iter().collect();

    let mut state_refs: BTreeMap<String, String> = BTreeMap::new();
    for (branch, hash) in &state.branches {
        state_refs.insert(format!("refs/heads/{branch}"), hash.clone());
    }
    for (tag, hash) in &state.tags {
        state_refs.insert(format!("refs/tags/{tag}"), hash.clone());
    }

    for reference in local_refs.keys() {
        if !state_refs.contains_key(reference) {
            if let Err(e) = git::delete_ref(repo_path, reference).await {
                errors.push(e.to_string());
            }
        }
    }

    let mut missing: BTreeSet<String> = state_refs
        .iter()
        .filter(|(reference, hash)| local_refs.get(*reference) != Some(*hash))
        .map(|(reference, _)| reference.clone())
        .collect();

    for server in peer_servers {
        if missing.is_empty() {
            break;
        }

        let remote_name = format!("origin_{}", nanos());
        if let Err(e) = git::remote_add(repo_path, &remote_name, server).await {
            errors.push(e.to_string());
            continue;
        }
        if let Err(e) = git::fetch(repo_path, &remote_name).await {
            errors.push(e.to_string());
            let _ = git::remote_remove(repo_path, &remote_name).await;
            continue;
        }

        let mut synced = Vec::new();
        for reference in &missing {
            let hash = &state_refs[reference];
            if git::has_object(repo_path, hash).await {
                match git::update_ref(repo_path, reference, hash).await {
                    Ok(()) => synced.push(reference.clone()),
                    Err(e) => errors.push(e.to_string()),
                }
            }
        }
        for reference in synced {
            missing.remove(&reference);
        }

        let _ = git::remote_remove(repo_path, &remote_name).await;
    }

    if let Some(head) = &state.head {
        let head_ref = format!("refs/heads/{head}");
        if state_refs.contains_key(&head_ref) {
            if let Err(e) = git::set_symbolic_head(repo_path, &head_ref).await {
                errors.push(e.to_string());
            }
        }
    }

    Ok(SyncOutcome { missing_refs: missing.into_iter().collect(), errors })
}

fn nanos() -> u128 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_outcome_is_complete_only_with_no_missing_refs() {
        let complete = SyncOutcome::default();
        assert!(complete.is_complete());

        let incomplete =
            SyncOutcome { missing_refs: vec!["refs/heads/main".to_string()], errors: vec![] };
        assert!(!incomplete.is_complete());
    }
}
