// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Per-entity serialization of state-changing operations.
//!
//! Each entity identity gets its own async mutex, so at most one mutation of
//! a given aggregate or task is in flight while different entities proceed
//! in parallel.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub struct EntityLocks<K> {
    locks: Arc<DashMap<K, Arc<Mutex<()>>>>,
}

impl<K> EntityLocks<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self {
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Drop the lock entry of `key` if nobody holds or awaits it.
    ///
    /// An entry still referenced by a guard or a queued `acquire` stays in
    /// place, so a later `acquire` keeps contending on the same mutex. Call
    /// after the caller's own guard is dropped.
    pub fn forget(&self, key: &K) -> bool {
        self.locks
            .remove_if(key, |_, lock| Arc::strong_count(lock) == 1)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl<K> Default for EntityLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> Clone for EntityLocks<K> {
    fn clone(&self) -> Self {
        Self {
            locks: Arc::clone(&self.locks),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_key_is_serialized() {
        let locks: EntityLocks<String> = EntityLocks::new();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let in_flight = Arc::clone(&in_flight);
            let max_seen = Arc::clone(&max_seen);
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(&"agg-1".to_string()).await;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(2)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let locks: EntityLocks<String> = EntityLocks::new();
        let _first = locks.acquire(&"a".to_string()).await;
        let second = tokio::time::timeout(
            Duration::from_millis(100),
            locks.acquire(&"b".to_string()),
        )
        .await;
        assert!(second.is_ok());
        assert_eq!(locks.len(), 2);

        drop(second);
        assert!(locks.forget(&"b".to_string()));
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn test_forget_keeps_entry_while_held() {
        let locks: EntityLocks<String> = EntityLocks::new();
        let key = "agg-1".to_string();
        let guard = locks.acquire(&key).await;

        assert!(!locks.forget(&key));
        assert_eq!(locks.len(), 1);

        drop(guard);
        assert!(locks.forget(&key));
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_forget_does_not_split_lock_with_queued_waiter() {
        let locks: EntityLocks<String> = EntityLocks::new();
        let key = "agg-1".to_string();
        let first = locks.acquire(&key).await;

        let (acquired_tx, acquired_rx) = tokio::sync::oneshot::channel();
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();
        let waiter = {
            let locks = locks.clone();
            let key = key.clone();
            tokio::spawn(async move {
                let _guard = locks.acquire(&key).await;
                let _ = acquired_tx.send(());
                let _ = release_rx.await;
            })
        };

        // Let the waiter queue on the mutex before the first holder leaves.
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(first);
        acquired_rx.await.unwrap();

        assert!(!locks.forget(&key));
        let contender =
            tokio::time::timeout(Duration::from_millis(50), locks.acquire(&key)).await;
        assert!(contender.is_err(), "two holders of one entity lock");

        release_tx.send(()).unwrap();
        waiter.await.unwrap();
        assert!(locks.forget(&key));
        assert!(locks.is_empty());
    }
}
