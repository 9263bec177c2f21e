// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::BTreeSet;

use nostr::{Event, PublicKey};

use super::address::{all_tag_values, first_tag_value};
use crate::Error;

/// Parsed view over a RepoAnnouncement event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// The repo identifier (the event's `d` tag value)
    pub id: String,
    /// Co-maintainers named by the author; membership becomes effective only
    /// once the resolver confirms the maintainer also announces `id`
    pub maintainers: BTreeSet<PublicKey>,
    /// Peer git server URLs the author clones/pushes to
    pub clone: BTreeSet<String>,
    /// Peer relay URLs the author publishes state/patches to
    pub relays: BTreeSet<String>,
}

/// Parse a RepoAnnouncement event. Total over well-formed events: absent
/// tags yield empty sets, but a missing `d` tag is a rejection condition
/// the caller must handle (see [`crate::model::address_of`]).
pub fn parse_announcement(event: &Event) -> Result<Announcement, Error> {
    let id = first_tag_value(event, "d")
        .ok_or(Error::MissingIdentifierTag)?
        .to_string();

    let maintainers = all_tag_values(event, "maintainers")
        .into_iter()
        .filter_map(|hex| PublicKey::from_hex(hex).ok())
        .collect();

    let clone = all_tag_values(event, "clone")
        .into_iter()
        .map(str::to_string)
        .collect();

    let relays = all_tag_values(event, "relays")
        .into_iter()
        .map(str::to_string)
        .collect();

    Ok(Announcement { id, maintainers, clone, relays })
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag};

    use super::*;

    fn signed(tags: Vec<Tag>) -> Event {
        let keys = Keys::generate();
        EventBuilder::new(Kind::from_u16(30617), "")
            .tags(tags)
            .sign_with_keys(&keys)
            .expect("signing test event")
    }

    #[test]
    fn parses_clone_relays_and_maintainers() {
        let bob = Keys::generate().public_key();
        let event = signed(vec![
            Tag::identifier("proj"),
            Tag::custom(
                nostr::TagKind::Custom("clone".into()),
                vec!["https://r.example/alice/proj.git".to_string()],
            ),
            Tag::custom(
                nostr::TagKind::Custom("relays".into()),
                vec!["wss://r.example".to_string()],
            ),
            Tag::custom(
                nostr::TagKind::Custom("maintainers".into()),
                vec![bob.to_hex()],
            ),
        ]);

        let ann = parse_announcement(&event).unwrap();
        assert_eq!(ann.id, "proj");
        assert!(ann.clone.contains("https://r.example/alice/proj.git"));
        assert!(ann.relays.contains("wss://r.example"));
        assert!(ann.maintainers.contains(&bob));
    }

    #[test]
    fn missing_d_tag_is_rejected() {
        let event = signed(vec![]);
        assert!(parse_announcement(&event).is_err());
    }

    #[test]
    fn absent_fields_yield_empty_sets() {
        let event = signed(vec![Tag::identifier("proj")]);
        let ann = parse_announcement(&event).unwrap();
        assert!(ann.maintainers.is_empty());
        assert!(ann.clone.is_empty());
        assert!(ann.relays.is_empty());
    }
}
