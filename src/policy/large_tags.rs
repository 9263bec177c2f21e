// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::net::IpAddr;

use nostr::Event;

use super::{BoxedFuture, PolicyResult, WritePolicy};

/// Reject events carrying an oversized tag component
#[derive(Debug, Clone, Copy)]
pub struct PreventLargeTags {
    max_len: usize,
}

impl PreventLargeTags {
    /// `max_len` is the maximum number of bytes any single tag component may
    /// have; the spec's default is 120.
    pub fn new(max_len: usize) -> Self {
        Self { max_len }
    }
}

impl Default for PreventLargeTags {
    fn default() -> Self {
        Self::new(120)
    }
}

impl WritePolicy for PreventLargeTags {
    fn admit_event<'a>(&'a self, event: &'a Event, _source: &'a IpAddr) -> BoxedFuture<'a, PolicyResult> {
        Box::pin(async move {
            for tag in event.tags.iter() {
                for component in tag.as_vec() {
                    if component.len() > self.max_len {
                        return PolicyResult::Reject(format!(
                            "tag component exceeds {} bytes",
                            self.max_len
                        ));
                    }
                }
            }
            PolicyResult::Accept
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use nostr::{EventBuilder, Keys, Kind, Tag, TagKind};

    use super::*;

    fn loopback() -> IpAddr {
        IpAddr::V4(Ipv4Addr::LOCALHOST)
    }

    #[tokio::test]
    async fn accepts_event_with_short_tags() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .tags(vec![Tag::custom(TagKind::Custom("d".into()), vec!["proj".to_string()])])
            .sign_with_keys(&keys)
            .unwrap();
        let policy = PreventLargeTags::new(120);
        assert_eq!(policy.admit_event(&event, &loopback()).await, PolicyResult::Accept);
    }

    #[tokio::test]
    async fn rejects_event_with_oversized_tag_component() {
        let keys = Keys::generate();
        let event = EventBuilder::new(Kind::TextNote, "hi")
            .tags(vec![Tag::custom(TagKind::Custom("d".into()), vec!["x".repeat(200)])])
            .sign_with_keys(&keys)
            .unwrap();
        let policy = PreventLargeTags::new(120);
        assert!(matches!(
            policy.admit_event(&event, &loopback()).await,
            PolicyResult::Reject(_)
        ));
    }
}
