// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Ordered predicates applied to every inbound event before persistence

mod future_timestamp;
mod large_tags;
mod rate_limit;
mod repo_graph;

pub use self::future_timestamp::PreventFutureTimestamps;
pub use self::large_tags::PreventLargeTags;
pub use self::rate_limit::{PerIpEventRateLimiter, TokenBucket};
pub use self::repo_graph::RelatesToExistingRepoOrAllowedNewRepo;

use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;

use nostr::Event;

/// Boxed, `Send` future, matching the shape every policy predicate returns
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Outcome of a single policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyResult {
    /// The event may proceed to the next policy, or to persistence
    Accept,
    /// The event is rejected with a message returned to the client
    Reject(String),
}

impl PolicyResult {
    /// `true` if this result is [`PolicyResult::Accept`]
    pub fn is_accept(&self) -> bool {
        matches!(self, Self::Accept)
    }
}

/// A single admission predicate run against every inbound event
pub trait WritePolicy: std::fmt::Debug + Send + Sync {
    /// Decide whether `event`, submitted from `source`, may be admitted
    fn admit_event<'a>(&'a self, event: &'a Event, source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult>;
}

/// Fixed-order chain of [`WritePolicy`] predicates; the first rejection wins
#[derive(Debug, Default)]
pub struct PolicyChain {
    policies: Vec<Box<dyn WritePolicy>>,
}

impl PolicyChain {
    /// Build an empty chain
    pub fn new() -> Self {
        Self { policies: Vec::new() }
    }

    /// Append a policy; policies run in the order they were pushed
    pub fn push(mut self, policy: impl WritePolicy + 'static) -> Self {
        self.policies.push(Box::new(policy));
        self
    }

    /// Run every policy in order, stopping at the first rejection
    pub async fn admit(&self, event: &Event, source: &IpAddr) -> PolicyResult {
        for policy in &self.policies {
            match policy.admit_event(event, source).await {
                PolicyResult::Accept => continue,
                rejection => return rejection,
            }
        }
        PolicyResult::Accept
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
    async fn empty_chain_accepts_everything() {
        let chain = PolicyChain::new();
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi").sign_with_keys(&keys).unwrap();
        assert_eq!(chain.admit(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn first_rejection_short_circuits_the_chain() {
        #[derive(Debug)]
        struct AlwaysReject;
        impl WritePolicy for AlwaysReject {
            fn admit_event<'a>(&'a self, _event: &'a Event, _source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult> {
                Box::pin(async { PolicyResult::Reject("no".to_string()) })
            }
        }

        let chain = PolicyChain::new().push(AlwaysReject);
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi").sign_with_keys(&keys).unwrap();
        assert_eq!(
            chain.admit(&event, &loopback()).await,
            PolicyResult::Reject("no".to_string())
        );
    }
}
