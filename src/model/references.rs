// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use nostr::Event;

use super::address::Pointer;

/// Every reference an event carries, plus its own self-reference.
///
/// Used by the admission policy to decide whether an event relates to
/// something already in the store: an event is admissible if any of its
/// `ids` or `addresses` (excluding the self-reference) resolves to a stored
/// event, or if the event's own self-reference is targeted by some other
/// stored event's `e`/`E`/`a`/`A`/`q` tags.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct References {
    /// Event-id references: `e`, `E`, and bare (colon-free) `q` tag values,
    /// plus the event's own id if it is not address-replaceable.
    pub ids: Vec<String>,
    /// Address-pointer references: `a`, `A`, and colon-bearing `q` tag
    /// values, plus the event's own address if it is address-replaceable.
    pub addresses: Vec<Pointer>,
}

/// Extract every `e`/`E`/`a`/`A`/`q` reference from `event`'s tags, appending
/// the event's own self-reference (its address if address-replaceable, else
/// its id).
pub fn extract_references(event: &Event) -> References {
    let mut refs = References::default();

    for tag in event.tags.iter() {
        let raw = tag.as_vec();
        let (Some(key), Some(value)) = (raw.first().map(String::as_str), raw.get(1)) else {
            continue;
        };
        match key {
            "e" | "E" => refs.ids.push(value.clone()),
            "a" | "A" => {
                if let Some(ptr) = Pointer::parse_address(value) {
                    refs.addresses.push(ptr);
                }
            }
            "q" => {
                if value.contains(':') {
                    if let Some(ptr) = Pointer::parse_address(value) {
                        refs.addresses.push(ptr);
                    }
                } else {
                    refs.ids.push(value.clone());
                }
            }
            _ => {}
        }
    }

    if super::is_address_replaceable(event.kind) {
        if let Some(identifier) = super::address::first_tag_value(event, "d") {
            refs.addresses.push(Pointer::Address {
                kind: event.kind.as_u16(),
                pubkey: event.pubkey.to_hex(),
                identifier: Some(identifier.to_string()),
            });
        }
    } else {
        refs.ids.push(event.id.to_hex());
    }

    refs
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag};

    use super::*;

    #[test]
    fn extracts_tag_references_and_own_id_for_regular_kind() {
        let keys = Keys::generate();
        let referenced_id = nostr::EventId::all_zeros().to_hex();
        let event = EventBuilder::new(Kind::TextNote, "hello")
            .tags(vec![Tag::event(nostr::EventId::all_zeros())])
            .sign_with_keys(&keys)
            .unwrap();

        let refs = extract_references(&event);
        assert!(refs.ids.contains(&referenced_id));
        assert!(refs.ids.contains(&event.id.to_hex()));
        assert!(refs.addresses.is_empty());
    }

    #[test]
    fn self_references_own_address_for_addressable_kind() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::from_u16(30617), "")
            .tags(vec![Tag::identifier("proj")])
            .sign_with_keys(&keys)
            .unwrap();

        let refs = extract_references(&event);
        assert_eq!(refs.addresses.len(), 1);
        match &refs.addresses[0] {
            Pointer::Address { kind, pubkey, identifier } => {
                assert_eq!(*kind, 30617);
                assert_eq!(pubkey, &keys.public_key().to_hex());
                assert_eq!(identifier.as_deref(), Some("proj"));
            }
            Pointer::Id(_) => panic!("expected address self-reference"),
        }
    }

    #[test]
    fn colon_bearing_q_tag_parses_as_address() {
        let keys = Keys::generate();
        let pointer = format!("30617:{}:proj", "b".repeat(64));
        let event = EventBuilder::new(Kind::TextNote, "")
            .tags(vec![Tag::custom(nostr::TagKind::Custom("q".into()), vec![pointer])])
            .sign_with_keys(&keys)
            .unwrap();

        let refs = extract_references(&event);
        assert_eq!(refs.addresses.len(), 1);
    }
}
