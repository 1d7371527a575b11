//! Per-key FIFO operation queue.
//!
//! Each collection (and the workspace metadata) has one async mutex. Tokio's
//! mutex hands out the lock in request order, so operations against the same
//! key run one at a time in arrival order while different keys proceed
//! concurrently.
//!
//! A workspace-wide gate sits in front of the keys. Keyed turns share it;
//! a full reload takes it exclusively and so runs with no keyed operation
//! in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{
    Mutex as AsyncMutex, OwnedMutexGuard, OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock,
};

/// Queue key for workspace metadata and environments.
pub(crate) const WORKSPACE_KEY: &str = "workspace";

pub(crate) fn collection_key(name: &str) -> String {
    format!("collection:{name}")
}

type Slots = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Debug, Default)]
pub(crate) struct OpQueue {
    gate: Arc<RwLock<()>>,
    slots: Slots,
}

#[derive(Debug)]
enum Gate {
    Shared(OwnedRwLockReadGuard<()>),
    Exclusive(OwnedRwLockWriteGuard<()>),
}

/// Held for the duration of one operation; releases its slots on drop.
#[derive(Debug)]
pub(crate) struct QueueTurn {
    guards: Vec<OwnedMutexGuard<()>>,
    keys: Vec<String>,
    slots: Slots,
    _gate: Option<Gate>,
}

impl Drop for QueueTurn {
    fn drop(&mut self) {
        self.guards.clear();
        // Forget slots nobody else holds or waits on.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        for key in &self.keys {
            if slots.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
                slots.remove(key);
            }
        }
    }
}

impl OpQueue {
    /// Wait for exclusive use of every key. Keys are taken in sorted order so
    /// two multi-key operations cannot deadlock.
    pub(crate) async fn enter<S: AsRef<str>>(&self, keys: &[S]) -> QueueTurn {
        let gate = Gate::Shared(Arc::clone(&self.gate).read_owned().await);
        self.lock_keys(keys, Some(gate)).await
    }

    /// Take further keys while already holding a turn. Every key must sort
    /// after the keys the caller holds.
    pub(crate) async fn enter_nested<S: AsRef<str>>(&self, keys: &[S]) -> QueueTurn {
        self.lock_keys(keys, None).await
    }

    /// Wait until no keyed operation is in flight and hold off new ones.
    pub(crate) async fn enter_all(&self) -> QueueTurn {
        let gate = Gate::Exclusive(Arc::clone(&self.gate).write_owned().await);
        QueueTurn {
            guards: Vec::new(),
            keys: Vec::new(),
            slots: Arc::clone(&self.slots),
            _gate: Some(gate),
        }
    }

    async fn lock_keys<S: AsRef<str>>(&self, keys: &[S], gate: Option<Gate>) -> QueueTurn {
        let mut keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort_unstable();
        keys.dedup();
        let slots: Vec<Arc<AsyncMutex<()>>> = keys.iter().map(|k| self.slot(k)).collect();
        let mut guards = Vec::with_capacity(slots.len());
        for slot in slots {
            guards.push(slot.lock_owned().await);
        }
        QueueTurn {
            guards,
            keys,
            slots: Arc::clone(&self.slots),
            _gate: gate,
        }
    }

    fn slot(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.entry(key.to_string()).or_default().clone()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_key_is_serialized_in_arrival_order() {
        let queue = Arc::new(OpQueue::default());
        let log = Arc::new(Mutex::new(Vec::new()));

        let first = queue.enter(&["c"]).await;
        let mut handles = Vec::new();
        for i in 0..3 {
            let queue = Arc::clone(&queue);
            let log = Arc::clone(&log);
            handles.push(tokio::spawn(async move {
                let _turn = queue.enter(&["c"]).await;
                log.lock().unwrap().push(i);
            }));
            // let each task reach the queue before the next one starts
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(log.lock().unwrap().is_empty());
        drop(first);
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*log.lock().unwrap(), [0, 1, 2]);
    }

    #[tokio::test]
    async fn different_keys_do_not_block_each_other() {
        let queue = OpQueue::default();
        let _a = queue.enter(&["a"]).await;
        let b = tokio::time::timeout(Duration::from_millis(100), queue.enter(&["b"])).await;
        assert!(b.is_ok());
    }

    #[tokio::test]
    async fn duplicate_keys_do_not_self_deadlock() {
        let queue = OpQueue::default();
        let turn = tokio::time::timeout(
            Duration::from_millis(100),
            queue.enter(&["x", "x", "a"]),
        )
        .await;
        assert!(turn.is_ok());
    }

    #[test]
    fn collection_keys_do_not_clash_with_workspace_key() {
        assert_ne!(collection_key(WORKSPACE_KEY), WORKSPACE_KEY);
    }

    #[tokio::test]
    async fn released_slots_are_forgotten() {
        let queue = Arc::new(OpQueue::default());
        {
            let _turn = queue.enter(&["a", "b"]).await;
            assert_eq!(queue.slot_count(), 2);
        }
        assert_eq!(queue.slot_count(), 0);

        let held = queue.enter(&["c"]).await;
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                let _turn = queue.enter(&["c"]).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        drop(held);
        // the waiter still owns the slot, so it survives the first release
        waiter.await.unwrap();
        assert_eq!(queue.slot_count(), 0);
    }

    #[tokio::test]
    async fn full_turn_waits_for_keyed_turns_and_blocks_new_ones() {
        let queue = Arc::new(OpQueue::default());
        let keyed = queue.enter(&["c"]).await;
        let all = tokio::time::timeout(Duration::from_millis(50), queue.enter_all()).await;
        assert!(all.is_err());
        drop(keyed);

        let all = queue.enter_all().await;
        let keyed = tokio::time::timeout(Duration::from_millis(50), queue.enter(&["d"])).await;
        assert!(keyed.is_err());
        drop(all);
        assert!(
            tokio::time::timeout(Duration::from_millis(50), queue.enter(&["d"]))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn nested_keys_skip_the_gate() {
        let queue = OpQueue::default();
        let _outer = queue.enter(&[collection_key("Orders")]).await;
        let inner =
            tokio::time::timeout(Duration::from_millis(50), queue.enter_nested(&[WORKSPACE_KEY]))
                .await;
        assert!(inner.is_ok());
    }
}
