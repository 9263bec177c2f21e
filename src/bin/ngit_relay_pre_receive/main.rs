// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Pre-receive git hook: installed as a symlink inside every hosted
//! repository's `hooks/` directory. Reads `<oldRev> <newRev> <refName>`
//! lines from stdin and rejects any push that disagrees with the
//! authoritative repository state (spec §4.6.2).

use std::collections::BTreeSet;
use std::io::{self, BufRead};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use ngit_relay::config::{Cli, Config};
use ngit_relay::reconciler::{self, PushLineOutcome, Reconciler};
use ngit_relay::store::{lmdb, EventStore};
use ngit_relay::{identity, Error};

#[tokio::main]
async fn main() -> ExitCode {
    ngit_relay::init_tracing();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!(error = %e, "pre-receive hook aborted");
            ExitCode::FAILURE
        }
    }
}

/// Returns `Ok(true)` iff every pushed ref was accepted.
async fn run() -> Result<bool, Error> {
    let cli = Cli::parse();
    let config = Config::from_env(cli)?;

    let repo_path = identity::repo_dir_from_hook_invocation()?;
    let (pubkey, _npub, identifier) = identity::pubkey_and_identifier_from_repo_path(&repo_path)?;

    let db = lmdb::open(&config.relay_data_dir)?;
    let store = EventStore::new(Arc::new(db));
    let reconciler = Reconciler::new(
        store,
        config.git_data_dir.clone(),
        config.pre_receive_hook_path.clone(),
        config.post_receive_hook_path.clone(),
        config.domain.clone(),
    );

    let state = reconciler::resolve_state_for_push(&reconciler, pubkey, &identifier).await?;

    let mut all_accepted = true;
    for line in io::stdin().lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        let (Some(old_rev), Some(new_rev), Some(ref_name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        match reconciler::admit_push_line(&state, old_rev, new_rev, ref_name) {
            PushLineOutcome::Accept => {}
            PushLineOutcome::Reject(message) => {
                eprintln!("rejected {ref_name}: {message}");
                all_accepted = false;
            }
        }
    }

    if !all_accepted {
        return Ok(false);
    }

    let _guard = reconciler.locks().acquire(&repo_path).await;
    let outcome = reconciler::proactive_sync(&repo_path, &state, &BTreeSet::new()).await?;
    if !outcome.is_complete() {
        tracing::debug!(identifier = %identifier, missing = ?outcome.missing_refs, "local refs still missing after push");
    }

    Ok(true)
}
