// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! A git hosting relay coordinated by a signed event log.
//!
//! Binds a conventional git HTTP server to a nostr event bus: pushes are
//! only accepted when they correspond to a signed repository-state
//! announcement, and any repository advertised on the bus for which this
//! instance is listed as an authorized mirror is automatically provisioned
//! and kept synchronized with peer mirrors run by other operators.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::bare_urls)]
#![warn(clippy::large_futures)]

pub mod blob;
pub mod config;
mod error;
pub mod http;
pub mod identity;
pub mod model;
pub mod policy;
pub mod reconciler;
pub mod relay;
pub mod resolver;
pub mod scheduler;
pub mod store;

pub use self::error::Error;

/// Install a [`tracing_subscriber`] writer honoring `RUST_LOG`, defaulting to
/// `info`. Shared by every binary in this crate.
pub fn init_tracing() {
    use tracing::Level;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::builder().with_default_directive(Level::INFO.into()).from_env_lossy();

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();
}
