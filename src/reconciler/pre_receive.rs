// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use nostr::PublicKey;

use super::{Reconciler, ReconcilerError};
use crate::model::RepositoryState;
use crate::resolver;

/// Outcome of admitting a single `<oldRev> <newRev> <refName>` pre-receive line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushLineOutcome {
    /// The push line is consistent with the authoritative state (or is a
    /// nostr-pointer ref, which bypasses state checking entirely)
    Accept,
    /// The push line is rejected; the string is the diagnostic sent to stderr
    Reject(String),
}

/// Fetch the authoritative [`RepositoryState`] a pre-receive hook should
/// check pushed refs against, per spec §4.6.2.
pub async fn resolve_state_for_push(
    reconciler: &Reconciler,
    pubkey: PublicKey,
    identifier: &str,
) -> Result<RepositoryState, ReconcilerError> {
    let events = reconciler.repo_events(identifier).await?;
    let maintainers = resolver::resolve_maintainers(&events, pubkey, identifier);
    let state_event =
        resolver::authoritative_state(&events, &maintainers).map_err(|_| ReconcilerError::NoValidState)?;
    crate::model::parse_state(state_event).map_err(|_| ReconcilerError::MissingIdentifierTag)
}

/// Admit or reject one pre-receive line against `state`, per spec §4.6.2.
/// `old_rev` is unused by the current ruleset but accepted for symmetry with
/// the hook's stdin shape and in case future rules key off of it.
pub fn admit_push_line(
    state: &RepositoryState,
    _old_rev: &str,
    new_rev: &str,
    ref_name: &str,
) -> PushLineOutcome {
    if let Some(pointer) = ref_name.strip_prefix("refs/nostr/") {
        if is_hex32(pointer) {
            return PushLineOutcome::Accept;
        }
    }

    if ref_name.starts_with("refs/heads/pr/") {
        return PushLineOutcome::Reject("pr/* branches must be sent via the event bus".to_string());
    }

    let expected = if let Some(branch) = ref_name.strip_prefix("refs/heads/") {
        state.branches.get(branch)
    } else if let Some(tag) = ref_name.strip_prefix("refs/tags/") {
        state.tags.get(tag)
    } else {
        None
    };

    match expected {
        Some(hash) if hash == new_rev => PushLineOutcome::Accept,
        Some(hash) => PushLineOutcome::Reject(format!(
            "ref {ref_name} expected {} got {}",
            short(hash),
            short(new_rev)
        )),
        None => PushLineOutcome::Reject("ref not in state".to_string()),
    }
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(7)]
}

fn is_hex32(value: &str) -> bool {
    value.len() == 32 && value.bytes().all(|b| b.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    fn state() -> RepositoryState {
        RepositoryState {
            branches: BTreeMap::from([("main".to_string(), "b".repeat(40))]),
            tags: BTreeMap::from([("v1".to_string(), "c".repeat(40))]),
            head: Some("main".to_string()),
        }
    }

    #[test]
    fn matching_branch_push_is_accepted() {
        let outcome = admit_push_line(&state(), &"0".repeat(40), &"b".repeat(40), "refs/heads/main");
        assert_eq!(outcome, PushLineOutcome::Accept);
    }

    #[test]
    fn mismatched_branch_push_is_rejected_with_short_hashes() {
        let outcome = admit_push_line(&state(), &"0".repeat(40), &"a".repeat(40), "refs/heads/main");
        match outcome {
            PushLineOutcome::Reject(message) => {
                assert!(message.contains(&"b".repeat(7)));
                assert!(message.contains(&"a".repeat(7)));
            }
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn unknown_ref_is_rejected() {
        let outcome = admit_push_line(&state(), &"0".repeat(40), &"d".repeat(40), "refs/heads/other");
        assert_eq!(outcome, PushLineOutcome::Reject("ref not in state".to_string()));
    }

    #[test]
    fn pr_branches_are_always_rejected() {
        let outcome =
            admit_push_line(&state(), &"0".repeat(40), &"b".repeat(40), "refs/heads/pr/1");
        assert_eq!(
            outcome,
            PushLineOutcome::Reject("pr/* branches must be sent via the event bus".to_string())
        );
    }

    #[test]
    fn nostr_pointer_refs_bypass_state_checking() {
        let pointer = format!("refs/nostr/{}", "f".repeat(32));
        let outcome = admit_push_line(&state(), &"0".repeat(40), &"0".repeat(40), &pointer);
        assert_eq!(outcome, PushLineOutcome::Accept);
    }

    #[test]
    fn matching_tag_push_is_accepted() {
        let outcome = admit_push_line(&state(), &"0".repeat(40), &"c".repeat(40), "refs/tags/v1");
        assert_eq!(outcome, PushLineOutcome::Accept);
    }
}
