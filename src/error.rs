// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Crate-wide error type

use std::io;

use nostr_database::DatabaseError;
use thiserror::Error;

/// Top-level error for the coordination engine
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error(transparent)]
    IO(#[from] io::Error),
    /// Event store error
    #[error(transparent)]
    Database(#[from] DatabaseError),
    /// No port available for the local relay listener
    #[error("No port available")]
    NoPortAvailable,
    /// A bech32 npub failed to decode, or didn't decode to a public key
    #[error("invalid npub: {0}")]
    InvalidNpub(String),
    /// A hosted-repository path or npub failed to decode
    #[error(transparent)]
    Identity(#[from] crate::identity::IdentityError),
    /// An address-replaceable event is missing its `d` tag
    #[error("event is address-replaceable but has no 'd' tag")]
    MissingIdentifierTag,
    /// Reconciler error
    #[error(transparent)]
    Reconciler(#[from] crate::reconciler::ReconcilerError),
    /// Blob service error
    #[error(transparent)]
    Blob(#[from] crate::blob::BlobError),
    /// No authoritative state event could be found for a repository
    #[error("no valid state")]
    NoValidState,
    /// Configuration could not be resolved from the environment
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
