// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Operator configuration: CLI flags plus `NGIT_*` environment variables

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use nostr::PublicKey;

use crate::identity;

/// Default maximum size accepted from a non-owner blob upload, in MiB
pub const DEFAULT_BLOSSOM_MAX_FILE_SIZE_MB: u64 = 100;
/// Default total blob capacity, in GiB
pub const DEFAULT_BLOSSOM_MAX_CAPACITY_GB: u64 = 50;
/// Default proactive-sync sweep interval, in minutes
pub const DEFAULT_SYNC_INTERVAL_MINUTES: u64 = 15;
/// Default HTTP listen address, shared by the event bus and blob service
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3334";

/// Command-line flags shared by every binary in this crate
#[derive(Debug, Clone, Parser)]
#[command(name = "ngit-relay")]
pub struct Cli {
    /// Directory backing the event store
    #[arg(long, env = "NGIT_RELAY_DATA_DIR", default_value = "./data/relay")]
    pub relay_data_dir: PathBuf,

    /// Directory under which bare git repositories are hosted
    #[arg(long, env = "NGIT_GIT_DATA_DIR", default_value = "./data/git")]
    pub git_data_dir: PathBuf,

    /// Directory backing blob storage and its index
    #[arg(long, env = "NGIT_BLOSSOM_DATA_DIR", default_value = "./data/blossom")]
    pub blossom_data_dir: PathBuf,

    /// Minutes between proactive-sync sweeps of every hosted repository
    #[arg(long, env = "NGIT_SYNC_INTERVAL", default_value_t = DEFAULT_SYNC_INTERVAL_MINUTES)]
    pub sync_interval: u64,

    /// Address the combined event-bus/blob-service HTTP listener binds to
    #[arg(long, env = "NGIT_LISTEN_ADDR", default_value = DEFAULT_LISTEN_ADDR)]
    pub listen_addr: String,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Event store backing directory
    pub relay_data_dir: PathBuf,
    /// Root under which `<npub>/<id>.git` directories live
    pub git_data_dir: PathBuf,
    /// Root under which `blobs/` and `db/` live
    pub blossom_data_dir: PathBuf,
    /// Proactive-sync sweep interval
    pub sync_interval: Duration,
    /// Address the combined event-bus/blob-service HTTP listener binds to
    pub listen_addr: String,
    /// Hosting domain checked against announcement `clone`/`relays` tags
    pub domain: String,
    /// Operator's own pubkey; blob uploads from this key bypass quota
    pub owner: PublicKey,
    /// Human-readable relay name, served in relay information documents
    pub relay_name: String,
    /// Human-readable relay description
    pub relay_description: String,
    /// Maximum accepted size for a non-owner blob upload, in bytes
    pub blossom_max_file_size_bytes: u64,
    /// Maximum total blob capacity, in bytes
    pub blossom_max_capacity_bytes: u64,
    /// Whether the state-event receive hook triggers proactive sync
    pub proactive_sync_git: bool,
    /// Path to the pre-receive hook binary, installed as a symlink per repo
    pub pre_receive_hook_path: PathBuf,
    /// Path to the post-receive hook binary, installed as a symlink per repo
    pub post_receive_hook_path: PathBuf,
}

/// Errors constructing [`Config`] from the environment
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable was absent
    #[error("missing required environment variable: {0}")]
    MissingEnv(&'static str),
    /// `NGIT_OWNER_NPUB` did not decode to a valid public key
    #[error("invalid NGIT_OWNER_NPUB: {0}")]
    InvalidOwnerNpub(#[from] crate::identity::IdentityError),
}

impl Config {
    /// Build a [`Config`] from parsed CLI flags and the process environment
    pub fn from_env(cli: Cli) -> Result<Self, ConfigError> {
        let domain = std::env::var("NGIT_DOMAIN")
            .map_err(|_| ConfigError::MissingEnv("NGIT_DOMAIN"))?;
        let owner_npub = std::env::var("NGIT_OWNER_NPUB")
            .map_err(|_| ConfigError::MissingEnv("NGIT_OWNER_NPUB"))?;
        let owner = identity::pubkey_from_npub(&owner_npub)?;

        let relay_name =
            std::env::var("NGIT_RELAY_NAME").unwrap_or_else(|_| "ngit-relay".to_string());
        let relay_description = std::env::var("NGIT_RELAY_DESCRIPTION").unwrap_or_default();

        let blossom_max_file_size_mb = env_u64("NGIT_BLOSSOM_MAX_FILE_SIZE_MB")
            .unwrap_or(DEFAULT_BLOSSOM_MAX_FILE_SIZE_MB);
        let blossom_max_capacity_gb =
            env_u64("NGIT_BLOSSOM_MAX_CAPACITY_GB").unwrap_or(DEFAULT_BLOSSOM_MAX_CAPACITY_GB);
        let proactive_sync_git = env_bool("NGIT_PROACTIVE_SYNC_GIT").unwrap_or(true);

        Ok(Self {
            relay_data_dir: cli.relay_data_dir,
            git_data_dir: cli.git_data_dir,
            blossom_data_dir: cli.blossom_data_dir,
            sync_interval: Duration::from_secs(cli.sync_interval * 60),
            listen_addr: cli.listen_addr,
            domain,
            owner,
            relay_name,
            relay_description,
            blossom_max_file_size_bytes: blossom_max_file_size_mb * 1024 * 1024,
            blossom_max_capacity_bytes: blossom_max_capacity_gb * 1024 * 1024 * 1024,
            proactive_sync_git,
            pre_receive_hook_path: PathBuf::from("/usr/local/bin/ngit-relay-pre-receive"),
            post_receive_hook_path: PathBuf::from("/usr/local/bin/ngit-relay-post-receive"),
        })
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_bool(key: &str) -> Option<bool> {
    std::env::var(key).ok().map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
}
