// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use nostr::Event;

use super::{BoxedFuture, PolicyResult, WritePolicy};

/// A per-key token bucket: `capacity` tokens, refilled at `refill_rate`
/// tokens per second. Shared across callers behind a [`Mutex`]-guarded map,
/// the same shape as the per-connection `Tokens` in [`crate::relay::session`]
/// but keyed by source IP instead of by connection.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    buckets: Mutex<HashMap<IpAddr, (f64, Instant)>>,
}

impl TokenBucket {
    /// `capacity` is the bucket size (burst); `refill` tokens are added every
    /// `per` duration.
    pub fn new(capacity: u32, refill: u32, per: Duration) -> Self {
        Self {
            capacity: capacity as f64,
            refill_per_sec: refill as f64 / per.as_secs_f64(),
            buckets: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to consume one token for `key`. Returns `true` if allowed.
    pub fn try_acquire(&self, key: IpAddr) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("token bucket lock poisoned");
        let (tokens, last) = buckets.entry(key).or_insert((self.capacity, now));
        let elapsed = now.duration_since(*last).as_secs_f64();
        *tokens = (*tokens + elapsed * self.refill_per_sec).min(self.capacity);
        *last = now;

        if *tokens >= 1.0 {
            *tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

/// Token-bucket rate limiter keyed by source IP, gating inbound events.
/// Spec default: `rate=2/3min, burst=10`.
#[derive(Debug)]
pub struct PerIpEventRateLimiter {
    bucket: TokenBucket,
}

impl PerIpEventRateLimiter {
    /// Build with an explicit rate and burst capacity
    pub fn new(capacity: u32, refill: u32, per: Duration) -> Self {
        Self { bucket: TokenBucket::new(capacity, refill, per) }
    }
}

impl Default for PerIpEventRateLimiter {
    fn default() -> Self {
        Self::new(10, 2, Duration::from_secs(3 * 60))
    }
}

impl WritePolicy for PerIpEventRateLimiter {
    fn admit_event<'a>(&'a self, _event: &'a Event, source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult> {
        Box::pin(async move {
            if self.bucket.try_acquire(*source) {
                PolicyResult::Accept
            } else {
                PolicyResult::Reject("rate limited".to_string())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use nostr::{EventBuilder, Keys, Kind};

    use super::*;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn token_bucket_allows_up_to_burst_then_rejects() {
        let bucket = TokenBucket::new(3, 1, Duration::from_secs(60));
        let key = ip(1);
        assert!(bucket.try_acquire(key));
        assert!(bucket.try_acquire(key));
        assert!(bucket.try_acquire(key));
        assert!(!bucket.try_acquire(key));
    }

    #[test]
    fn token_bucket_tracks_keys_independently() {
        let bucket = TokenBucket::new(1, 1, Duration::from_secs(60));
        assert!(bucket.try_acquire(ip(1)));
        assert!(bucket.try_acquire(ip(2)));
        assert!(!bucket.try_acquire(ip(1)));
    }

    #[tokio::test]
    async fn policy_rejects_after_burst_exhausted() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi").sign_with_keys(&keys).unwrap();
        let policy = PerIpEventRateLimiter::new(1, 1, Duration::from_secs(60));
        let source = ip(9);
        assert_eq!(policy.admit_event(&event, &source).await, PolicyResult::Accept);
        assert!(matches!(
            policy.admit_event(&event, &source).await,
            PolicyResult::Reject(_)
        ));
    }
}
