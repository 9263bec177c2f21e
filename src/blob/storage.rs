// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Filesystem abstraction blob upload/download/delete is delegated through,
//! so the capacity-accounting policy in [`super::BlobService`] can be tested
//! without touching a real disk.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::fs;

/// Boxed, `Send` future returned by every [`BlobStorage`] method
pub type BoxedFuture<'a, T> = Pin<Box<dyn Future<Output = io::Result<T>> + Send + 'a>>;

/// Content-addressed byte storage: one object per digest
pub trait BlobStorage: std::fmt::Debug + Send + Sync {
    /// Write `bytes` under `digest`, overwriting any prior content
    fn put<'a>(&'a self, digest: &'a str, bytes: &'a [u8]) -> BoxedFuture<'a, ()>;
    /// Read the full contents stored under `digest`, if present
    fn get<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, Option<Vec<u8>>>;
    /// Remove the object stored under `digest`; a no-op if absent
    fn delete<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, ()>;
    /// Size in bytes of the object stored under `digest`, if present
    fn size<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, Option<u64>>;
    /// Sum of the sizes of every currently-stored object; used once at
    /// startup to initialize the process-wide `total_stored` counter.
    fn total_bytes<'a>(&'a self) -> BoxedFuture<'a, u64>;
}

/// Plain-filesystem [`BlobStorage`]: one file per digest under `root`
#[derive(Debug, Clone)]
pub struct FsBlobStorage {
    root: PathBuf,
}

impl FsBlobStorage {
    /// `root` is created (including parents) if it doesn't already exist;
    /// use [`FsBlobStorage::open`] for the fallible async form.
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }

    /// Create `root` if absent, then wrap it
    pub async fn open(root: impl AsRef<Path>) -> io::Result<Self> {
        fs::create_dir_all(root.as_ref()).await?;
        Ok(Self::new(root))
    }

    fn path_for(&self, digest: &str) -> PathBuf {
        self.root.join(digest)
    }
}

impl BlobStorage for FsBlobStorage {
    fn put<'a>(&'a self, digest: &'a str, bytes: &'a [u8]) -> BoxedFuture<'a, ()> {
        Box::pin(async move { fs::write(self.path_for(digest), bytes).await })
    }

    fn get<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            match fs::read(self.path_for(digest)).await {
                Ok(bytes) => Ok(Some(bytes)),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn delete<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, ()> {
        Box::pin(async move {
            match fs::remove_file(self.path_for(digest)).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        })
    }

    fn size<'a>(&'a self, digest: &'a str) -> BoxedFuture<'a, Option<u64>> {
        Box::pin(async move {
            match fs::metadata(self.path_for(digest)).await {
                Ok(meta) => Ok(Some(meta.len())),
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    fn total_bytes<'a>(&'a self) -> BoxedFuture<'a, u64> {
        Box::pin(async move {
            let mut total = 0u64;
            let mut entries = match fs::read_dir(&self.root).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
                Err(e) => return Err(e),
            };
            while let Some(entry) = entries.next_entry().await? {
                if let Ok(meta) = entry.metadata().await {
                    if meta.is_file() {
                        total += meta.len();
                    }
                }
            }
            Ok(total)
        })
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn round_trips_a_blob() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();

        storage.put("abc123", b"hello").await.unwrap();
        assert_eq!(storage.get("abc123").await.unwrap(), Some(b"hello".to_vec()));
        assert_eq!(storage.size("abc123").await.unwrap(), Some(5));

        storage.delete("abc123").await.unwrap();
        assert_eq!(storage.get("abc123").await.unwrap(), None);
    }

    #[tokio::test]
    async fn total_bytes_sums_every_stored_object() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();
        storage.put("a", b"12345").await.unwrap();
        storage.put("b", b"1234567890").await.unwrap();
        assert_eq!(storage.total_bytes().await.unwrap(), 15);
    }

    #[tokio::test]
    async fn missing_blob_operations_are_quiet() {
        let dir = TempDir::new().unwrap();
        let storage = FsBlobStorage::open(dir.path()).await.unwrap();
        assert_eq!(storage.get("missing").await.unwrap(), None);
        assert_eq!(storage.size("missing").await.unwrap(), None);
        storage.delete("missing").await.unwrap();
    }
}
