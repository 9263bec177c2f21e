// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::HashMap;

use nostr::{Filter, SubscriptionId};
use tokio::sync::RwLock;

/// Per-connection state: the live REQ subscriptions this client has open.
/// Event admission rate limiting lives in the write-policy chain (keyed by
/// source IP, not per-connection), so a session carries no token state of
/// its own.
#[derive(Debug, Default)]
pub(super) struct Session {
    pub subscriptions: RwLock<HashMap<SubscriptionId, Vec<Filter>>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }
}
