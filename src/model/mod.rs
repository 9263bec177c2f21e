// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Typed view over signed events for the two domain-significant kinds

mod address;
mod announcement;
mod references;
mod state;

pub use self::address::{address_of, Address, Pointer};
pub use self::announcement::{parse_announcement, Announcement};
pub use self::references::extract_references;
pub use self::state::{parse_state, RepositoryState};

use nostr::Kind;

/// NIP-34 repository announcement kind
pub fn kind_repo_announcement() -> Kind {
    Kind::from_u16(30617)
}

/// NIP-34 repository state kind
pub fn kind_repo_state() -> Kind {
    Kind::from_u16(30618)
}

/// `true` if `kind` is address-replaceable (NIP-01 "addressable": relies on
/// the event's own `d` tag, not just `(kind, pubkey)`).
#[inline]
pub fn is_address_replaceable(kind: Kind) -> bool {
    kind.is_addressable()
}
