// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! `nostr-lmdb`-backed construction helper for [`super::EventStore`]

use std::path::Path;

use nostr_database::DatabaseError;
use nostr_lmdb::NostrLMDB;

/// Open an LMDB database at `path`, creating it if absent
pub fn open<P: AsRef<Path>>(path: P) -> Result<NostrLMDB, DatabaseError> {
    NostrLMDB::open(path)
}
