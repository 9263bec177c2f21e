// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::net::IpAddr;
use std::time::Duration;

use nostr::{Event, Timestamp};

use super::{BoxedFuture, PolicyResult, WritePolicy};

/// Reject events whose `created_at` is further in the future than `max_drift`
/// allows. The spec's default drift is 30 minutes.
#[derive(Debug, Clone, Copy)]
pub struct PreventFutureTimestamps {
    max_drift: Duration,
}

impl PreventFutureTimestamps {
    /// Build with an explicit drift allowance
    pub fn new(max_drift: Duration) -> Self {
        Self { max_drift }
    }
}

impl Default for PreventFutureTimestamps {
    fn default() -> Self {
        Self::new(Duration::from_secs(30 * 60))
    }
}

impl WritePolicy for PreventFutureTimestamps {
    fn admit_event<'a>(&'a self, event: &'a Event, _source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult> {
        Box::pin(async move {
            let now = Timestamp::now();
            let limit = now + self.max_drift.as_secs();
            if event.created_at > limit {
                return PolicyResult::Reject("created_at is too far in the future".to_string());
            }
            PolicyResult::Accept
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use nostr::{EventBuilder, Keys, Kind};

    use super::*;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn accepts_event_at_current_time() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi").sign_with_keys(&keys).unwrap();
        let policy = PreventFutureTimestamps::default();
        assert_eq!(policy.admit_event(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn rejects_event_far_in_the_future() {
        let keys = Keys::generate();
        let future = Timestamp::now() + 3600_u64;
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .custom_created_at(future)
            .sign_with_keys(&keys)
            .unwrap();
        let policy = PreventFutureTimestamps::default();
        assert!(matches!(
            policy.admit_event(&event, &loopback()).await,
            PolicyResult::Reject(_)
        ));
    }
}
