// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Content-addressed blob storage gating per-owner capacity and size limits

mod storage;

pub use self::storage::{BlobStorage, FsBlobStorage};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nostr::PublicKey;
use sha2::{Digest, Sha256};

/// Blob service error
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// Underlying storage I/O failure
    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Outcome of an upload attempt, independent of whether it was persisted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadDecision {
    /// Stored
    Accepted,
    /// Rejected: `size` exceeds the configured per-upload maximum (413)
    TooLarge,
    /// Rejected: would push `total_stored` past the configured capacity (507)
    InsufficientStorage,
}

/// Result of [`BlobService::put`]
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    /// The sha256 digest of the uploaded bytes, computed regardless of
    /// whether the upload was accepted
    pub digest: String,
    /// Whether the bytes were actually persisted
    pub decision: UploadDecision,
}

/// Content-addressed blob store with per-owner capacity accounting.
///
/// `total_stored` is a process-wide running total, seeded once at startup by
/// [`BlobService::init`] walking the blob directory; it is not authoritative
/// across restarts beyond that walk, and drift in exchange for O(1) upload
/// cost is an accepted tradeoff (see spec §4.7, §9).
#[derive(Debug)]
pub struct BlobService {
    storage: Arc<dyn BlobStorage>,
    owner: PublicKey,
    max_file_size_bytes: u64,
    max_capacity_bytes: u64,
    total_stored: AtomicU64,
}

impl BlobService {
    /// Build against `storage`, initializing the byte counter by walking it
    pub async fn init(
        storage: Arc<dyn BlobStorage>,
        owner: PublicKey,
        max_file_size_bytes: u64,
        max_capacity_bytes: u64,
    ) -> Result<Self, BlobError> {
        let total_stored = storage.total_bytes().await?;
        Ok(Self {
            storage,
            owner,
            max_file_size_bytes,
            max_capacity_bytes,
            total_stored: AtomicU64::new(total_stored),
        })
    }

    /// The current running total of stored bytes
    pub fn total_stored(&self) -> u64 {
        self.total_stored.load(Ordering::SeqCst)
    }

    /// sha256 digest of `bytes`, hex-encoded — the content address a blob is
    /// stored and retrieved under
    pub fn digest(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Decide, without mutating any state, whether an upload of `size` bytes
    /// by `uploader` may proceed. The owner pubkey always accepts.
    pub fn evaluate_upload(&self, uploader: &PublicKey, size: u64) -> UploadDecision {
        if uploader == &self.owner {
            return UploadDecision::Accepted;
        }
        if self.max_file_size_bytes > 0 && size > self.max_file_size_bytes {
            return UploadDecision::TooLarge;
        }
        if self.max_capacity_bytes > 0 && self.total_stored() + size > self.max_capacity_bytes {
            return UploadDecision::InsufficientStorage;
        }
        UploadDecision::Accepted
    }

    /// Upload `bytes` on behalf of `uploader`. The counter is incremented
    /// only when the upload is actually persisted: per spec §9 Open
    /// ambiguity 2, a rejected upload must never grow `total_stored`.
    pub async fn put(&self, uploader: &PublicKey, bytes: &[u8]) -> Result<UploadOutcome, BlobError> {
        let digest = Self::digest(bytes);
        let size = bytes.len() as u64;
        let decision = self.evaluate_upload(uploader, size);

        if decision != UploadDecision::Accepted {
            return Ok(UploadOutcome { digest, decision });
        }

        self.storage.put(&digest, bytes).await?;
        self.total_stored.fetch_add(size, Ordering::SeqCst);
        Ok(UploadOutcome { digest, decision })
    }

    /// Fetch the bytes stored under `digest`, if present
    pub async fn get(&self, digest: &str) -> Result<Option<Vec<u8>>, BlobError> {
        Ok(self.storage.get(digest).await?)
    }

    /// Remove the blob stored under `digest`, decrementing the counter by
    /// its size if it was present
    pub async fn delete(&self, digest: &str) -> Result<(), BlobError> {
        if let Some(size) = self.storage.size(digest).await? {
            self.storage.delete(digest).await?;
            self.total_stored.fetch_sub(size, Ordering::SeqCst);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use nostr::Keys;

    use super::*;
    use crate::blob::storage::FsBlobStorage;

    async fn service(max_file_mb: u64, max_capacity_gb: u64) -> (BlobService, PublicKey, tempfile::TempDir) {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();
        let owner = Keys::generate().public_key();
        let service = BlobService::init(
            Arc::new(storage),
            owner,
            max_file_mb * 1024 * 1024,
            max_capacity_gb * 1024 * 1024 * 1024,
        )
        .await
        .unwrap();
        (service, owner, dir)
    }

    #[tokio::test]
    async fn owner_uploads_are_always_accepted() {
        let (service, owner, _dir) = service(0, 0).await;
        let big = vec![0u8; 1];
        let outcome = service.put(&owner, &big).await.unwrap();
        assert_eq!(outcome.decision, UploadDecision::Accepted);
        assert_eq!(service.total_stored(), 1);
    }

    #[tokio::test]
    async fn non_owner_upload_exceeding_file_size_is_rejected() {
        let (service, _owner, _dir) = service(1, 50).await;
        let other = Keys::generate().public_key();
        let too_big = vec![0u8; 2 * 1024 * 1024];
        let outcome = service.put(&other, &too_big).await.unwrap();
        assert_eq!(outcome.decision, UploadDecision::TooLarge);
        assert_eq!(service.total_stored(), 0);
    }

    #[tokio::test]
    async fn zero_capacity_config_disables_the_capacity_check() {
        let (service, _owner, _dir) = service(100, 0).await;
        let other = Keys::generate().public_key();
        let outcome = service.put(&other, &vec![0u8; 10]).await.unwrap();
        assert_eq!(outcome.decision, UploadDecision::Accepted);
    }

    #[tokio::test]
    async fn non_owner_upload_exceeding_capacity_is_rejected_without_growing_counter() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();
        let owner = Keys::generate().public_key();
        let service = BlobService::init(Arc::new(storage), owner, 0, 0).await.unwrap();
        // Construct with a deliberately tiny capacity to exercise the 507 path.
        let service = BlobService { max_capacity_bytes: 5, ..service };

        let other = Keys::generate().public_key();
        let outcome = service.put(&other, &vec![0u8; 10]).await.unwrap();
        assert_eq!(outcome.decision, UploadDecision::InsufficientStorage);
        assert_eq!(service.total_stored(), 0);
    }

    #[tokio::test]
    async fn init_seeds_counter_from_existing_blob_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();
        storage.put("preexisting", b"0123456789").await.unwrap();

        let owner = Keys::generate().public_key();
        let service = BlobService::init(Arc::new(storage), owner, 0, 0).await.unwrap();
        assert_eq!(service.total_stored(), 10);
    }
}
