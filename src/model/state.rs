// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::BTreeMap;

use nostr::Event;

use crate::Error;

/// Parsed view over a RepoState event: the canonical branch/tag tips and HEAD
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RepositoryState {
    /// Branch name -> commit-id hex, keys unique
    pub branches: BTreeMap<String, String>,
    /// Tag name -> commit-id hex, keys unique. Dereferenced-tag entries
    /// (`<name>^{}`) are dropped here so the reconciler never sees them.
    pub tags: BTreeMap<String, String>,
    /// Either a branch name or a fully-qualified ref (`refs/heads/<name>`)
    pub head: Option<String>,
}

/// Parse a RepoState event. Total over well-formed events: a tag naming a ref
/// this parser doesn't recognize (anything other than `refs/heads/*`,
/// `refs/tags/*`, or `HEAD`) is ignored rather than rejected.
pub fn parse_state(event: &Event) -> Result<RepositoryState, Error> {
    let mut state = RepositoryState::default();

    for tag in event.tags.iter() {
        let raw = tag.as_vec();
        let (Some(name), Some(value)) = (raw.first(), raw.get(1)) else {
            continue;
        };

        if let Some(branch) = name.strip_prefix("refs/heads/") {
            state.branches.insert(branch.to_string(), value.clone());
        } else if let Some(tag_name) = name.strip_prefix("refs/tags/") {
            if tag_name.ends_with("^{}") {
                continue;
            }
            state.tags.insert(tag_name.to_string(), value.clone());
        } else if name == "HEAD" {
            state.head = Some(normalize_head(value));
        }
    }

    Ok(state)
}

/// `HEAD` values are carried either as a bare branch name or as `ref:
/// refs/heads/<name>`; both are normalized to the bare branch name so callers
/// can look it up directly in `branches`.
fn normalize_head(value: &str) -> String {
    value
        .strip_prefix("ref: refs/heads/")
        .or_else(|| value.strip_prefix("refs/heads/"))
        .unwrap_or(value)
        .to_string()
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag};

    use super::*;

    fn signed(tags: Vec<Tag>) -> Event {
        let keys = Keys::generate();
        EventBuilder::new(Kind::from_u16(30618), "")
            .tags(tags)
            .sign_with_keys(&keys)
            .expect("signing test event")
    }

    #[test]
    fn parses_branches_tags_and_head() {
        let event = signed(vec![
            Tag::identifier("proj"),
            Tag::custom(
                nostr::TagKind::Custom("refs/heads/main".into()),
                vec!["a".repeat(40)],
            ),
            Tag::custom(
                nostr::TagKind::Custom("refs/tags/v1".into()),
                vec!["b".repeat(40)],
            ),
            Tag::custom(
                nostr::TagKind::Custom("HEAD".into()),
                vec!["ref: refs/heads/main".to_string()],
            ),
        ]);

        let state = parse_state(&event).unwrap();
        assert_eq!(state.branches.get("main"), Some(&"a".repeat(40)));
        assert_eq!(state.tags.get("v1"), Some(&"b".repeat(40)));
        assert_eq!(state.head.as_deref(), Some("main"));
    }

    #[test]
    fn ignores_dereferenced_tag_entries() {
        let event = signed(vec![Tag::custom(
            nostr::TagKind::Custom("refs/tags/v1^{}".into()),
            vec!["c".repeat(40)],
        )]);

        let state = parse_state(&event).unwrap();
        assert!(state.tags.is_empty());
    }

    #[test]
    fn absent_fields_yield_empty_state() {
        let event = signed(vec![Tag::identifier("proj")]);
        let state = parse_state(&event).unwrap();
        assert!(state.branches.is_empty());
        assert!(state.tags.is_empty());
        assert_eq!(state.head, None);
    }
}
