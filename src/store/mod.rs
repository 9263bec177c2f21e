// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event store facade: save/query/count/delete over a filter, with
//! address-replaceable atomic-replace-if-newer semantics delegated to the
//! backing [`NostrEventsDatabase`].

pub mod lmdb;

use std::sync::Arc;

use nostr::{Event, Filter};
use nostr_database::{DatabaseError, NostrEventsDatabase, RejectedReason, SaveEventStatus};

/// Outcome of [`EventStore::save`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The event was persisted (and replaced a prior same-address event, if any)
    Saved,
    /// Rejected: an event with the same address already has a `created_at`
    /// greater than or equal to this one's
    Stale,
    /// Rejected: exact duplicate of an already-stored event id
    Duplicate,
    /// Rejected for a reason outside the stale/duplicate distinction this
    /// facade exposes (ephemeral kind, referenced id was deleted, ...)
    Other,
}

/// Thin facade over a [`NostrEventsDatabase`], translating its generic
/// save-status vocabulary into the store semantics this relay relies on.
#[derive(Debug, Clone)]
pub struct EventStore {
    db: Arc<dyn NostrEventsDatabase>,
}

impl EventStore {
    /// Wrap an already-constructed database handle
    pub fn new(db: Arc<dyn NostrEventsDatabase>) -> Self {
        Self { db }
    }

    /// Persist `event`. For address-replaceable kinds the backing database
    /// atomically replaces any prior event with the same `(kind, pubkey, d)`
    /// address, provided `event.created_at` is strictly greater; otherwise
    /// this returns [`SaveOutcome::Stale`] and the store is left unchanged.
    pub async fn save(&self, event: &Event) -> Result<SaveOutcome, DatabaseError> {
        match self.db.save_event(event).await? {
            SaveEventStatus::Success => Ok(SaveOutcome::Saved),
            SaveEventStatus::Rejected(RejectedReason::Replaced)
            | SaveEventStatus::Rejected(RejectedReason::Deleted) => Ok(SaveOutcome::Stale),
            SaveEventStatus::Rejected(RejectedReason::Duplicate) => Ok(SaveOutcome::Duplicate),
            SaveEventStatus::Rejected(_) => Ok(SaveOutcome::Other),
        }
    }

    /// Query the store, returning matching events newest-first
    pub async fn query(&self, filters: Vec<Filter>) -> Result<nostr_database::Events, DatabaseError> {
        self.db.query(filters).await
    }

    /// Count events matching `filters` without materializing them
    pub async fn count(&self, filters: Vec<Filter>) -> Result<usize, DatabaseError> {
        self.db.count(filters).await
    }

    /// `true` if any event matches `filter`
    pub async fn exists(&self, filter: Filter) -> Result<bool, DatabaseError> {
        Ok(self.db.count(vec![filter.limit(1)]).await? > 0)
    }

    /// Delete every event matching `filter`
    pub async fn delete(&self, filter: Filter) -> Result<(), DatabaseError> {
        self.db.delete(filter).await
    }

    /// Access the underlying database handle, e.g. to hand it to a second
    /// facade instance backed by the same storage (the blob service keeps
    /// its own companion index at a different path).
    pub fn database(&self) -> Arc<dyn NostrEventsDatabase> {
        self.db.clone()
    }
}

#[cfg(test)]
mod tests {
    use nostr::{EventBuilder, Keys, Kind, Tag};
    use tempfile::TempDir;

    use super::*;

    async fn store() -> (EventStore, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        let lmdb = self::lmdb::open(dir.path()).expect("open lmdb");
        (EventStore::new(Arc::new(lmdb)), dir)
    }

    #[tokio::test]
    async fn saves_and_queries_an_event() {
        let (store, _dir) = store().await;
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hello")
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(store.save(&event).await.unwrap(), SaveOutcome::Saved);

        let found = store
            .query(vec![Filter::new().author(keys.public_key())])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn replaces_addressable_event_only_when_newer() {
        let (store, _dir) = store().await;
        let keys = Keys::generate();

        let older = EventBuilder::new(Kind::from_u16(30617), "")
            .tags(vec![Tag::identifier("proj")])
            .custom_created_at(nostr::Timestamp::from(100))
            .sign_with_keys(&keys)
            .unwrap();
        let newer = EventBuilder::new(Kind::from_u16(30617), "")
            .tags(vec![Tag::identifier("proj")])
            .custom_created_at(nostr::Timestamp::from(200))
            .sign_with_keys(&keys)
            .unwrap();

        assert_eq!(store.save(&older).await.unwrap(), SaveOutcome::Saved);
        assert_eq!(store.save(&newer).await.unwrap(), SaveOutcome::Saved);

        let stale = EventBuilder::new(Kind::from_u16(30617), "")
            .tags(vec![Tag::identifier("proj")])
            .custom_created_at(nostr::Timestamp::from(150))
            .sign_with_keys(&keys)
            .unwrap();
        assert_eq!(store.save(&stale).await.unwrap(), SaveOutcome::Stale);

        let found = store
            .query(vec![Filter::new().author(keys.public_key()).kind(Kind::from_u16(30617))])
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found.into_iter().next().unwrap().created_at, nostr::Timestamp::from(200));
    }
}
