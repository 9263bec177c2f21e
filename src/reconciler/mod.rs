// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Repository reconciler: provisioning, pre-receive admission, post-receive
//! mirroring, and proactive sync over hosted bare git directories.

pub mod git;
pub mod lock;
mod post_receive;
mod pre_receive;
mod provision;
mod sync;

pub use self::post_receive::mirror_to_comaintainers;
pub use self::pre_receive::{admit_push_line, resolve_state_for_push, PushLineOutcome};
pub use self::provision::provision_repository;
pub use self::sync::{proactive_sync, SyncOutcome};

use std::path::PathBuf;

use nostr::{Event, Filter, PublicKey};

use crate::model::{kind_repo_announcement, kind_repo_state};
use crate::store::EventStore;

/// Reconciler error
#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// Event store I/O failure
    #[error(transparent)]
    Database(#[from] nostr_database::DatabaseError),
    /// Hosted-repository path didn't decode to `(npub, identifier)`
    #[error(transparent)]
    Identity(#[from] crate::identity::IdentityError),
    /// A `git` invocation failed or timed out
    #[error(transparent)]
    Git(#[from] git::GitError),
    /// Filesystem operation failed
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// No `RepoAnnouncement` event resolves a maintainer set for this author
    #[error("repo announcement event from pubkey not on internal relay")]
    NoMaintainers,
    /// No `RepoState` authored by a resolved maintainer exists
    #[error("no valid state")]
    NoValidState,
    /// An address-replaceable event this reconciler needed was malformed
    #[error("event missing 'd' tag")]
    MissingIdentifierTag,
}

/// Shared reconciler context: event store handle, hosted-repo root, per-repo
/// lock map, and the hook binary paths installed into freshly-provisioned
/// repositories.
#[derive(Debug, Clone)]
pub struct Reconciler {
    store: EventStore,
    git_root: PathBuf,
    locks: lock::RepoLocks,
    pre_receive_hook_path: PathBuf,
    post_receive_hook_path: PathBuf,
    domain: String,
}

impl Reconciler {
    /// Build a reconciler over `store`, hosting repositories under
    /// `git_root`. `domain` is the operator's configured hosting domain
    /// (`NGIT_DOMAIN`), used to derive this relay's own clone URL so it can
    /// be subtracted from the peer-server list (spec §4.5).
    pub fn new(
        store: EventStore,
        git_root: PathBuf,
        pre_receive_hook_path: PathBuf,
        post_receive_hook_path: PathBuf,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            store,
            git_root,
            locks: lock::RepoLocks::new(),
            pre_receive_hook_path,
            post_receive_hook_path,
            domain: domain.into(),
        }
    }

    /// The root directory hosted repositories live under
    pub fn git_root(&self) -> &std::path::Path {
        &self.git_root
    }

    /// This relay's own clone URL for `(pubkey, identifier)`, in the same
    /// `https://<domain>/<npub>/<identifier>.git` shape admitted
    /// announcements are checked against (spec §4.3), subtracted from
    /// [`crate::resolver::peer_git_servers`] so proactive sync never treats
    /// itself as a peer.
    pub fn local_repo_url(&self, pubkey: PublicKey, identifier: &str) -> String {
        format!("https://{}/{}/{identifier}.git", self.domain, crate::identity::npub(&pubkey))
    }

    /// The event store this reconciler consults for announcements/states
    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// The per-repository structural-edit lock map
    pub fn locks(&self) -> &lock::RepoLocks {
        &self.locks
    }

    /// Fetch every `RepoAnnouncement`/`RepoState` event addressed to
    /// `identifier`, across all authors — the snapshot the maintainer
    /// resolver and authoritative-state selector operate over.
    pub async fn repo_events(&self, identifier: &str) -> Result<Vec<Event>, ReconcilerError> {
        let filter = Filter::new()
            .kinds([kind_repo_announcement(), kind_repo_state()])
            .identifier(identifier);
        Ok(self.store.query(vec![filter]).await?.into_iter().collect())
    }

    /// Resolve the maintainer set for `(origin, identifier)` by first
    /// fetching the candidate event snapshot.
    pub async fn maintainers(
        &self,
        origin: PublicKey,
        identifier: &str,
    ) -> Result<std::collections::BTreeSet<PublicKey>, ReconcilerError> {
        let events = self.repo_events(identifier).await?;
        Ok(crate::resolver::resolve_maintainers(&events, origin, identifier))
    }
}
