// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Assembles the event-stream engine (component H) from [`Config`]: opens
//! the event store, builds the admission policy chain in the fixed order
//! spec §4.3 mandates (component D), and wires the reconciler (component F)
//! as the target the saved-event hook provisions and syncs against.

use std::sync::Arc;

use crate::config::Config;
use crate::policy::{
    PerIpEventRateLimiter, PolicyChain, PreventFutureTimestamps, PreventLargeTags,
    RelatesToExistingRepoOrAllowedNewRepo,
};
use crate::reconciler::Reconciler;
use crate::store::{lmdb, EventStore};
use crate::Error;

use super::connection::Relay;

/// Open the event store at `config.relay_data_dir` and build the [`Relay`]
/// engine plus the shared [`Reconciler`] handle every hook binary and the
/// proactive-sync scheduler also need.
pub async fn build_relay(config: &Config) -> Result<(Relay, Arc<Reconciler>), Error> {
    tokio::fs::create_dir_all(&config.relay_data_dir).await?;
    let db = lmdb::open(&config.relay_data_dir)?;
    let store = EventStore::new(Arc::new(db));

    let policy = PolicyChain::new()
        .push(PreventLargeTags::default())
        .push(PreventFutureTimestamps::default())
        .push(PerIpEventRateLimiter::default())
        .push(RelatesToExistingRepoOrAllowedNewRepo::new(store.clone(), config.domain.clone()));

    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        config.git_data_dir.clone(),
        config.pre_receive_hook_path.clone(),
        config.post_receive_hook_path.clone(),
        config.domain.clone(),
    ));

    let relay = Relay::new(store, policy, reconciler.clone(), config.proactive_sync_git);
    Ok((relay, reconciler))
}
