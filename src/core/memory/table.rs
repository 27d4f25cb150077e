//! Row-locked tables
//!
//! A [`Table`] maps keys to slots. Each slot is an async mutex around an
//! optional row, so "row absent" is lockable too: a transaction that checks
//! for a missing key and then inserts it keeps the slot locked in between,
//! and a concurrent insert of the same key waits instead of duplicating it.
//!
//! [`RowLocks`] is the per-transaction side: the set of slots a transaction
//! has locked, each with the row image taken when it was first locked.
//!
//! Slots only exist while a row is present or someone holds or waits on the
//! slot. An empty slot is pruned as soon as its last user lets go, so lookups
//! of keys that were never created do not grow the table.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub(crate) type Slot<V> = Arc<Mutex<Option<V>>>;

pub(crate) struct Table<K, V> {
    rows: DashMap<K, Slot<V>>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Slot for `key`, created empty if the key was never seen
    ///
    /// Callers that may leave the slot empty must [`prune`](Self::prune) it
    /// once they drop their handle.
    pub(crate) fn slot(&self, key: &K) -> Slot<V> {
        if let Some(slot) = self.rows.get(key) {
            return Arc::clone(slot.value());
        }
        let slot = self
            .rows
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(None)));
        Arc::clone(slot.value())
    }

    /// Slot for `key` if one exists, without creating it
    pub(crate) fn existing(&self, key: &K) -> Option<Slot<V>> {
        self.rows.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Remove the slot for `key` if it is empty and nobody else holds it
    ///
    /// The map keeps the only reference to an unused slot, so a strong count
    /// of one means no task is holding or waiting on its lock.
    pub(crate) fn prune(&self, key: &K) {
        self.rows.remove_if(key, |_, slot| {
            Arc::strong_count(slot) == 1 && slot.try_lock().is_ok_and(|row| row.is_none())
        });
    }

    /// Keys of every slot accepted by `filter`, present or not
    pub(crate) fn keys_where(&self, filter: impl Fn(&K) -> bool) -> Vec<K> {
        self.rows
            .iter()
            .filter(|entry| filter(entry.key()))
            .map(|entry| entry.key().clone())
            .collect()
    }
}

struct Held<K, V> {
    table: Arc<Table<K, V>>,
    guard: OwnedMutexGuard<Option<V>>,
    /// Row image at the time the lock was taken
    original: Option<V>,
}

impl<K, V> Held<K, V>
where
    K: Eq + Hash + Clone,
{
    fn unlock(self, key: &K) {
        let Held { table, guard, .. } = self;
        drop(guard);
        table.prune(key);
    }
}

/// Row locks held by one transaction
pub(crate) struct RowLocks<K, V> {
    held: HashMap<K, Held<K, V>>,
}

impl<K, V> RowLocks<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn new() -> Self {
        Self {
            held: HashMap::new(),
        }
    }

    /// Lock the row for `key` (if not already held) and return it for writing
    ///
    /// The lock is kept until [`restore`](Self::restore) or
    /// [`release`](Self::release).
    pub(crate) async fn acquire(&mut self, table: &Arc<Table<K, V>>, key: &K) -> &mut Option<V> {
        match self.held.entry(key.clone()) {
            Entry::Occupied(entry) => &mut *entry.into_mut().guard,
            Entry::Vacant(entry) => {
                let guard = table.slot(key).lock_owned().await;
                let original = (*guard).clone();
                let held = Held {
                    table: Arc::clone(table),
                    guard,
                    original,
                };
                &mut *entry.insert(held).guard
            }
        }
    }

    /// Current value of a row this transaction holds
    pub(crate) fn get(&self, key: &K) -> Option<&Option<V>> {
        self.held.get(key).map(|held| &*held.guard)
    }

    /// Put back every row image and unlock
    pub(crate) fn restore(&mut self) {
        for (key, mut held) in self.held.drain() {
            *held.guard = held.original.take();
            held.unlock(&key);
        }
    }

    /// Unlock every row, keeping the written values
    pub(crate) fn release(&mut self) {
        for (key, held) in self.held.drain() {
            held.unlock(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn table() -> Arc<Table<String, u64>> {
        Arc::new(Table::new())
    }

    #[tokio::test]
    async fn test_slot_is_shared_per_key() {
        let table = table();
        let a = table.slot(&"alice".to_string());
        let b = table.slot(&"alice".to_string());
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.lock().await.is_none());
    }

    #[tokio::test]
    async fn test_restore_puts_back_original_image() {
        let table = table();
        let key = "alice".to_string();
        *table.slot(&key).lock().await = Some(10);

        let mut locks = RowLocks::new();
        *locks.acquire(&table, &key).await = Some(3);
        assert_eq!(locks.get(&key), Some(&Some(3)));

        locks.restore();
        assert_eq!(*table.slot(&key).lock().await, Some(10));
    }

    #[tokio::test]
    async fn test_release_keeps_written_value() {
        let table = table();
        let key = "alice".to_string();

        let mut locks = RowLocks::new();
        *locks.acquire(&table, &key).await = Some(5);
        locks.release();

        assert_eq!(*table.slot(&key).lock().await, Some(5));
        assert!(locks.get(&key).is_none());
    }

    #[tokio::test]
    async fn test_held_row_blocks_other_lockers_until_released() {
        let table = table();
        let key = "alice".to_string();

        let mut locks = RowLocks::new();
        locks.acquire(&table, &key).await;

        let slot = table.slot(&key);
        let blocked = tokio::time::timeout(Duration::from_millis(20), slot.lock()).await;
        assert!(blocked.is_err());

        locks.release();
        let unblocked = tokio::time::timeout(Duration::from_millis(20), slot.lock()).await;
        assert!(unblocked.is_ok());
    }

    #[tokio::test]
    async fn test_unlocking_prunes_empty_slots() {
        let table = table();
        let kept = "alice".to_string();
        let missing = "ghost".to_string();
        let undone = "carol".to_string();

        let mut locks = RowLocks::new();
        *locks.acquire(&table, &kept).await = Some(1);
        locks.acquire(&table, &missing).await;
        locks.release();

        let mut locks = RowLocks::new();
        *locks.acquire(&table, &undone).await = Some(7);
        locks.restore();

        assert_eq!(table.keys_where(|_| true), vec![kept]);
        assert!(table.existing(&missing).is_none());
        assert!(table.existing(&undone).is_none());
    }

    #[tokio::test]
    async fn test_prune_keeps_slots_in_use() {
        let table = table();
        let key = "ghost".to_string();

        let slot = table.slot(&key);
        table.prune(&key);
        assert!(table.existing(&key).is_some());

        drop(slot);
        table.prune(&key);
        assert!(table.existing(&key).is_none());
    }

    #[test]
    fn test_keys_where_filters() {
        let table: Table<(String, String), u64> = Table::new();
        table.slot(&("alice".to_string(), "cup".to_string()));
        table.slot(&("alice".to_string(), "pen".to_string()));
        table.slot(&("bob".to_string(), "cup".to_string()));

        let mut keys = table.keys_where(|(user, _)| user == "alice");
        keys.sort();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[0].1, "cup");
    }
}
