// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Maintainer-graph resolver: transitive closure over mutually-referencing
//! `RepoAnnouncement` events, and authoritative-state selection over the
//! resulting maintainer set.

use std::collections::{BTreeSet, HashMap};

use nostr::{Event, PublicKey};

use crate::model::{self, kind_repo_announcement, kind_repo_state};
use crate::Error;

/// Resolve the transitive maintainer set reachable from `origin` for
/// repository `identifier`, given a snapshot of candidate events (typically
/// the result of querying `kind ∈ {RepoAnnouncement, RepoState}, d=identifier`).
///
/// Worklist-based instead of the source's memoized recursion (see spec §9):
/// a maintainer is only included once it is confirmed to publish its own
/// announcement for the same identifier. A maintainer named by an
/// announcement that never itself announces is silently excluded — this
/// asymmetry is the contract, not a bug.
pub fn resolve_maintainers(
    events: &[Event],
    origin: PublicKey,
    identifier: &str,
) -> BTreeSet<PublicKey> {
    let announcements: HashMap<PublicKey, &Event> = events
        .iter()
        .filter(|e| e.kind == kind_repo_announcement())
        .filter_map(|e| {
            let parsed = model::parse_announcement(e).ok()?;
            (parsed.id == identifier).then_some((e.pubkey, e))
        })
        .collect();

    let mut visited: BTreeSet<PublicKey> = BTreeSet::new();
    let mut stack = vec![origin];

    while let Some(pubkey) = stack.pop() {
        if !visited.insert(pubkey) {
            continue;
        }
        let Some(event) = announcements.get(&pubkey) else {
            continue;
        };
        let Ok(announcement) = model::parse_announcement(event) else {
            continue;
        };
        for maintainer in announcement.maintainers {
            if !visited.contains(&maintainer) {
                stack.push(maintainer);
            }
        }
    }

    visited
}

/// Pick the `RepoState` with the greatest `created_at` whose author is in
/// `maintainers`, ties broken by event-id lexicographic order.
pub fn authoritative_state<'a>(
    events: &'a [Event],
    maintainers: &BTreeSet<PublicKey>,
) -> Result<&'a Event, Error> {
    events
        .iter()
        .filter(|e| e.kind == kind_repo_state() && maintainers.contains(&e.pubkey))
        .max_by(|a, b| (a.created_at, a.id.to_hex()).cmp(&(b.created_at, b.id.to_hex())))
        .ok_or(Error::NoValidState)
}

/// Union of the `clone` URL sets across every `RepoAnnouncement` authored by
/// a resolved maintainer, trailing `/` trimmed, duplicates removed, and
/// `exclude_url` (the locally-hosted URL) subtracted.
pub fn peer_git_servers(
    events: &[Event],
    maintainers: &BTreeSet<PublicKey>,
    exclude_url: &str,
) -> BTreeSet<String> {
    let exclude = exclude_url.trim_end_matches('/');
    events
        .iter()
        .filter(|e| e.kind == kind_repo_announcement() && maintainers.contains(&e.pubkey))
        .filter_map(|e| model::parse_announcement(e).ok())
        .flat_map(|a| a.clone)
        .map(|url| url.trim_end_matches('/').to_string())
        .filter(|url| url != exclude)
        .collect()
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Tag, TagKind};

    use super::*;

    fn announcement(keys: &Keys, id: &str, maintainers: &[PublicKey], clone: &[&str]) -> Event {
        let mut tags = vec![Tag::identifier(id)];
        if !maintainers.is_empty() {
            tags.push(Tag::custom(
                TagKind::Custom("maintainers".into()),
                maintainers.iter().map(|p| p.to_hex()).collect::<Vec<_>>(),
            ));
        }
        if !clone.is_empty() {
            tags.push(Tag::custom(
                TagKind::Custom("clone".into()),
                clone.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            ));
        }
        EventBuilder::new(kind_repo_announcement(), "")
            .tags(tags)
            .sign_with_keys(keys)
            .unwrap()
    }

    fn state(keys: &Keys, id: &str, created_at: u64, branch: &str, commit: &str) -> Event {
        EventBuilder::new(kind_repo_state(), "")
            .tags(vec![
                Tag::identifier(id),
                Tag::custom(
                    TagKind::Custom(format!("refs/heads/{branch}")),
                    vec![commit.to_string()],
                ),
            ])
            .custom_created_at(nostr::Timestamp::from(created_at))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn asymmetric_maintainer_graph() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        // Alice lists Bob as maintainer; Bob never announces.
        let a = announcement(&alice, "proj", &[bob.public_key()], &[]);
        let events = vec![a];

        let resolved = resolve_maintainers(&events, alice.public_key(), "proj");
        assert_eq!(resolved, BTreeSet::from([alice.public_key()]));

        let resolved_bob = resolve_maintainers(&events, bob.public_key(), "proj");
        assert_eq!(resolved_bob, BTreeSet::from([bob.public_key()]));
    }

    #[test]
    fn mutual_announcement_makes_maintainer_effective() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let a = announcement(&alice, "proj", &[bob.public_key()], &[]);
        let b = announcement(&bob, "proj", &[], &[]);
        let events = vec![a, b];

        let resolved = resolve_maintainers(&events, alice.public_key(), "proj");
        assert_eq!(resolved, BTreeSet::from([alice.public_key(), bob.public_key()]));
    }

    #[test]
    fn cyclic_announcements_terminate_and_agree() {
        let alice = Keys::generate();
        let bob = Keys::generate();

        let a = announcement(&alice, "proj", &[bob.public_key()], &[]);
        let b = announcement(&bob, "proj", &[alice.public_key()], &[]);
        let events = vec![a, b];

        let from_alice = resolve_maintainers(&events, alice.public_key(), "proj");
        let from_bob = resolve_maintainers(&events, bob.public_key(), "proj");
        let expected = BTreeSet::from([alice.public_key(), bob.public_key()]);
        assert_eq!(from_alice, expected);
        assert_eq!(from_bob, expected);
    }

    #[test]
    fn authoritative_state_picks_newest_among_maintainers() {
        let alice = Keys::generate();
        let bob = Keys::generate();
        let maintainers = BTreeSet::from([alice.public_key(), bob.public_key()]);

        let s1 = state(&alice, "proj", 100, "main", &"a".repeat(40));
        let s2 = state(&bob, "proj", 200, "main", &"b".repeat(40));
        let events = vec![s1, s2.clone()];

        let chosen = authoritative_state(&events, &maintainers).unwrap();
        assert_eq!(chosen.id, s2.id);
    }

    #[test]
    fn authoritative_state_ignores_non_maintainer_authors() {
        let alice = Keys::generate();
        let outsider = Keys::generate();
        let maintainers = BTreeSet::from([alice.public_key()]);

        let s_outsider = state(&outsider, "proj", 999, "main", &"c".repeat(40));
        let events = vec![s_outsider];

        assert!(authoritative_state(&events, &maintainers).is_err());
    }

    #[test]
    fn peer_git_servers_excludes_local_url_and_dedupes() {
        let alice = Keys::generate();
        let maintainers = BTreeSet::from([alice.public_key()]);
        let a = announcement(
            &alice,
            "proj",
            &[],
            &["https://r.example/alice/proj.git/", "https://peer.example/alice/proj.git"],
        );
        let events = vec![a];

        let servers = peer_git_servers(&events, &maintainers, "https://r.example/alice/proj.git");
        assert_eq!(servers, BTreeSet::from(["https://peer.example/alice/proj.git".to_string()]));
    }
}
