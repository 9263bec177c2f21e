// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! Canonical-path-keyed lock map serializing structural edits to a hosted
//! repository (spec §5, §9: concurrent proactive sync and post-receive
//! mirror on the same target otherwise race).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// A map from repository path to an exclusive lock guarding structural
/// mutation of that repository (directory creation, symlink rewrite, ref
/// updates). Cheap to clone; the inner map is reference-counted.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    locks: Arc<Mutex<HashMap<PathBuf, Arc<AsyncMutex<()>>>>>,
}

impl RepoLocks {
    /// Build an empty lock map
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `path`, creating its entry if this is the first
    /// request for it. The returned guard releases the lock on drop.
    pub async fn acquire(&self, path: &Path) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().expect("repo lock map poisoned");
            locks.entry(path.to_path_buf()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
        };
        mutex.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;

    #[tokio::test]
    async fn same_path_serializes_concurrent_acquires() {
        let locks = RepoLocks::new();
        let path = PathBuf::from("/srv/git/npub1/proj.git");

        let order = Arc::new(Mutex::new(Vec::new()));

        let locks_a = locks.clone();
        let order_a = order.clone();
        let path_a = path.clone();
        let a = tokio::spawn(async move {
            let _guard = locks_a.acquire(&path_a).await;
            sleep(Duration::from_millis(20)).await;
            order_a.lock().unwrap().push('a');
        });

        sleep(Duration::from_millis(5)).await;

        let locks_b = locks.clone();
        let order_b = order.clone();
        let path_b = path.clone();
        let b = tokio::spawn(async move {
            let _guard = locks_b.acquire(&path_b).await;
            order_b.lock().unwrap().push('b');
        });

        a.await.unwrap();
        b.await.unwrap();

        assert_eq!(*order.lock().unwrap(), vec!['a', 'b']);
    }

    #[tokio::test]
    async fn distinct_paths_do_not_contend() {
        let locks = RepoLocks::new();
        let _a = locks.acquire(Path::new("/srv/git/npub1/proj.git")).await;
        let guard_b = tokio::time::timeout(
            Duration::from_millis(50),
            locks.acquire(Path::new("/srv/git/npub2/proj.git")),
        )
        .await;
        assert!(guard_b.is_ok());
    }
}
