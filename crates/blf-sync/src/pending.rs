//! Deduplicating work set
//!
//! Change callbacks insert ids; the worker drains the whole set at once.
//! Inserting an id that is already pending does nothing, so only the latest
//! value of each entity gets pushed.

use std::collections::BTreeSet;
use std::sync::{Mutex, PoisonError};

use tokio::sync::Notify;

/// Set of ids waiting to be pushed, with a wake-up for one consumer
#[derive(Debug)]
pub struct Pending<K> {
    items: Mutex<BTreeSet<K>>,
    ready: Notify,
}

impl<K: Ord + Copy> Pending<K> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(BTreeSet::new()),
            ready: Notify::new(),
        }
    }

    /// Mark `key` as pending and wake the consumer
    pub fn insert(&self, key: K) {
        let inserted = self.lock().insert(key);
        if inserted {
            self.ready.notify_one();
        }
    }

    /// Take every pending key, in order
    pub fn drain(&self) -> Vec<K> {
        std::mem::take(&mut *self.lock()).into_iter().collect()
    }

    /// Wait until at least one key is pending, then take them all
    pub async fn next_batch(&self) -> Vec<K> {
        loop {
            let batch = self.drain();
            if !batch.is_empty() {
                return batch;
            }
            self.ready.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeSet<K>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<K: Ord + Copy> Default for Pending<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;
    use std::time::Duration;

    proptest! {
        #[test]
        fn prop_drain_yields_each_key_once(keys in proptest::collection::vec(0u8..16, 0..64)) {
            let pending = Pending::new();
            for key in &keys {
                pending.insert(*key);
            }
            let expected: Vec<u8> = keys.iter().copied().collect::<BTreeSet<_>>().into_iter().collect();
            prop_assert_eq!(pending.drain(), expected);
            prop_assert!(pending.is_empty());
        }
    }

    #[test]
    fn test_duplicates_collapse() {
        let pending = Pending::new();
        pending.insert(3);
        pending.insert(1);
        pending.insert(3);
        assert_eq!(pending.len(), 2);
        assert_eq!(pending.drain(), vec![1, 3]);
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_next_batch_waits_for_insert() {
        let pending = Arc::new(Pending::new());
        let consumer = {
            let pending = Arc::clone(&pending);
            tokio::spawn(async move { pending.next_batch().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        pending.insert(7u8);
        let batch = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(batch, vec![7]);
    }

    #[tokio::test]
    async fn test_insert_before_wait_not_lost() {
        let pending = Pending::new();
        pending.insert(1u8);
        assert_eq!(pending.next_batch().await, vec![1]);
    }
}
