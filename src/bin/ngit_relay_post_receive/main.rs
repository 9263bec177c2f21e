// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Post-receive git hook: installed as a symlink inside every hosted
//! repository's `hooks/` directory. Mirrors an accepted push into every
//! co-maintainer's copy of the same repository (spec §4.6.3).

use std::sync::Arc;

use clap::Parser;
use ngit_relay::config::{Cli, Config};
use ngit_relay::reconciler::{self, Reconciler};
use ngit_relay::store::{lmdb, EventStore};
use ngit_relay::{identity, Error};

#[tokio::main]
async fn main() -> Result<(), Error> {
    ngit_relay::init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env(cli)?;

    let repo_path = identity::repo_dir_from_hook_invocation()?;
    let (pubkey, _npub, identifier) = identity::pubkey_and_identifier_from_repo_path(&repo_path)?;

    let db = lmdb::open(&config.relay_data_dir)?;
    let store = EventStore::new(Arc::new(db));
    let reconciler = Reconciler::new(
        store,
        config.git_data_dir,
        config.pre_receive_hook_path,
        config.post_receive_hook_path,
        config.domain,
    );

    let errors = reconciler::mirror_to_comaintainers(&reconciler, pubkey, &identifier, &repo_path).await;
    for error in errors {
        tracing::warn!(identifier = %identifier, %error, "failed to mirror push to a co-maintainer's repository");
    }

    Ok(())
}
