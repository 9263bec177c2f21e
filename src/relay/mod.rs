// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Event-stream front-end (spec §4, component H): the per-connection
//! websocket engine, its saved-event hook dispatch, and the builder that
//! assembles both from [`crate::config::Config`].

mod builder;
mod connection;
mod hooks;
mod session;
pub mod util;

pub use self::builder::build_relay;
pub use self::connection::Relay;
