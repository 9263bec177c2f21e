// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Saved-event hooks: background reactions to events the engine just
//! persisted, run on a fresh task after the client's `OK` is sent (spec §5).

use std::sync::Arc;
use std::time::Duration;

use nostr::Event;

use crate::model::{self, kind_repo_announcement, kind_repo_state};
use crate::reconciler::{self, Reconciler, ReconcilerError};
use crate::{identity, resolver};

/// The post-state proactive-sync hook sleeps this long before acting, giving
/// a burst of related pushes and state updates time to settle first.
const STATE_SYNC_DELAY: Duration = Duration::from_secs(60);

/// Dispatch the background reaction, if any, to a just-saved `event`.
/// `proactive_sync_git` gates the `RepoState` branch (`NGIT_PROACTIVE_SYNC_GIT`);
/// repository provisioning on a saved announcement always runs.
pub async fn dispatch_saved_event(reconciler: Arc<Reconciler>, event: Event, proactive_sync_git: bool) {
    if event.kind == kind_repo_announcement() {
        match reconciler::provision_repository(&reconciler, &event).await {
            Ok(outcome) => tracing::debug!(?outcome, "provisioned repository from saved announcement"),
            Err(e) => tracing::warn!(error = %e, "failed to provision repository from saved announcement"),
        }
    } else if event.kind == kind_repo_state() {
        if !proactive_sync_git {
            return;
        }
        tokio::time::sleep(STATE_SYNC_DELAY).await;
        if let Err(e) = sync_after_state_event(&reconciler, &event).await {
            tracing::debug!(error = %e, "post-state proactive sync did not complete");
        }
    }
}

async fn sync_after_state_event(reconciler: &Reconciler, event: &Event) -> Result<(), ReconcilerError> {
    let address = model::address_of(event).map_err(|_| ReconcilerError::MissingIdentifierTag)?;
    let path = identity::repo_path(reconciler.git_root(), &event.pubkey, &address.identifier);

    if tokio::fs::metadata(&path).await.is_err() {
        // This relay doesn't host a repository for this event's author.
        return Ok(());
    }

    let events = reconciler.repo_events(&address.identifier).await?;
    let maintainers = resolver::resolve_maintainers(&events, event.pubkey, &address.identifier);
    let state_event =
        resolver::authoritative_state(&events, &maintainers).map_err(|_| ReconcilerError::NoValidState)?;
    let state = model::parse_state(state_event).map_err(|_| ReconcilerError::MissingIdentifierTag)?;
    let local_url = reconciler.local_repo_url(event.pubkey, &address.identifier);
    let peers = resolver::peer_git_servers(&events, &maintainers, &local_url);

    let _guard = reconciler.locks().acquire(&path).await;
    let outcome = reconciler::proactive_sync(&path, &state, &peers).await?;
    if !outcome.is_complete() {
        tracing::debug!(
            identifier = %address.identifier,
            missing = ?outcome.missing_refs,
            "proactive sync left refs missing after state event"
        );
    }

    Ok(())
}
