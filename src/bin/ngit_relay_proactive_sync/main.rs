// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Standalone proactive-sync binary: runs the same periodic sweep the main
//! relay process backgrounds alongside its HTTP listener (spec §6), for
//! operators who prefer to run it as a separate service or cron-driven
//! process instead.

use std::sync::Arc;

use clap::Parser;
use ngit_relay::config::{Cli, Config};
use ngit_relay::reconciler::Reconciler;
use ngit_relay::scheduler;
use ngit_relay::store::{lmdb, EventStore};
use ngit_relay::Error;

#[tokio::main]
async fn main() -> Result<(), Error> {
    ngit_relay::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env(cli)?;

    if !config.proactive_sync_git {
        tracing::warn!("NGIT_PROACTIVE_SYNC_GIT is disabled; exiting without starting a sweep loop");
        return Ok(());
    }

    let db = lmdb::open(&config.relay_data_dir)?;
    let store = EventStore::new(Arc::new(db));
    let reconciler = Reconciler::new(
        store,
        config.git_data_dir,
        config.pre_receive_hook_path,
        config.post_receive_hook_path,
        config.domain,
    );

    scheduler::run(reconciler, config.sync_interval).await;
}
