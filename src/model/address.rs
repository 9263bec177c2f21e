// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

use std::fmt;

use nostr::{Event, PublicKey};

use crate::Error;

/// The `(kind, pubkey, d)` triple that identifies a single replaceable slot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address {
    /// Event kind
    pub kind: u16,
    /// Author
    pub pubkey: PublicKey,
    /// Value of the event's `d` tag
    pub identifier: String,
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.kind, self.pubkey, self.identifier)
    }
}

/// A reference extracted from an event's tags: either a plain event id or an
/// address pointer (`<kind>:<pubkey>[:<d>]`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pointer {
    /// `e`/`E`/bare `q` reference
    Id(String),
    /// `a`/`A`/colon-bearing `q` reference
    Address {
        /// Parsed kind number
        kind: u16,
        /// Parsed author
        pubkey: String,
        /// Parsed identifier, absent for `<kind>:<pubkey>` pointers
        identifier: Option<String>,
    },
}

impl Pointer {
    /// Parse a raw `<kind>:<pubkey>[:<d>]` address-pointer value
    pub fn parse_address(value: &str) -> Option<Self> {
        let mut parts = value.splitn(3, ':');
        let kind: u16 = parts.next()?.parse().ok()?;
        let pubkey = parts.next()?.to_string();
        let identifier = parts.next().map(str::to_string);
        Some(Self::Address { kind, pubkey, identifier })
    }
}

/// Extract the replaceable address `(kind, pubkey, d)` of `event`.
///
/// Returns [`Error::MissingIdentifierTag`] if `event`'s kind is
/// address-replaceable but it carries no `d` tag.
pub fn address_of(event: &Event) -> Result<Address, Error> {
    if !super::is_address_replaceable(event.kind) {
        return Err(Error::MissingIdentifierTag);
    }
    let identifier = first_tag_value(event, "d").ok_or(Error::MissingIdentifierTag)?;
    Ok(Address {
        kind: event.kind.as_u16(),
        pubkey: event.pubkey,
        identifier: identifier.to_string(),
    })
}

/// First value of the first tag named `name`, if any
pub fn first_tag_value<'a>(event: &'a Event, name: &str) -> Option<&'a str> {
    event.tags.iter().find_map(|tag| {
        let raw = tag.as_vec();
        if raw.first().map(String::as_str) == Some(name) {
            raw.get(1).map(String::as_str)
        } else {
            None
        }
    })
}

/// All values (index 1..) of every tag named `name`, flattened
pub fn all_tag_values<'a>(event: &'a Event, name: &str) -> Vec<&'a str> {
    event
        .tags
        .iter()
        .filter(|tag| tag.as_vec().first().map(String::as_str) == Some(name))
        .flat_map(|tag| tag.as_vec()[1..].iter().map(String::as_str))
        .collect()
}
