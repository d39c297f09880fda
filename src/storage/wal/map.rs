//! # Transaction Item Map
//!
//! The in-memory mirror of a log file: one [`TransactionItem`] per on-disk
//! record, keyed by [`TransactionEntryKey`]. Items record where the record
//! lives (`offset`, `size`) and its scan order, so flag patches can be
//! applied without re-reading the file.
//!
//! Items are never removed; commit and rollback only flip flags in the
//! record they point at.

use hashbrown::HashMap;

use super::entry::TransactionEntryKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionItem {
    pub key: TransactionEntryKey,
    pub is_completed: bool,
    pub offset: u64,
    pub size: u32,
    pub order: u32,
}

#[derive(Debug, Default)]
pub struct TransactionItemMap {
    items: HashMap<TransactionEntryKey, TransactionItem>,
}

impl TransactionItemMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &TransactionEntryKey) -> Option<&TransactionItem> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &TransactionEntryKey) -> bool {
        self.items.contains_key(key)
    }

    pub fn insert(&mut self, item: TransactionItem) {
        self.items.insert(item.key, item);
    }

    pub fn set_completed(&mut self, key: &TransactionEntryKey) -> bool {
        match self.items.get_mut(key) {
            Some(item) => {
                item.is_completed = true;
                true
            }
            None => false,
        }
    }

    pub fn max_order(&self) -> Option<u32> {
        self.items.values().map(|item| item.order).max()
    }

    /// Keys of entries not yet marked completed.
    pub fn open_keys(&self) -> Vec<TransactionEntryKey> {
        let mut open: Vec<_> = self
            .items
            .values()
            .filter(|item| !item.is_completed)
            .collect();
        open.sort_by_key(|item| item.order);
        open.into_iter().map(|item| item.key).collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Snapshot of all items in scan order.
    pub fn items(&self) -> Vec<TransactionItem> {
        let mut items: Vec<_> = self.items.values().copied().collect();
        items.sort_by_key(|item| item.order);
        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::wal::entry::ActionKind;
    use crate::types::BatchId;

    fn key(byte: u8, sequence: u32) -> TransactionEntryKey {
        TransactionEntryKey {
            batch_id: BatchId::from_bytes([byte; 16]),
            sequence,
            action_kind: ActionKind::InsertRow,
        }
    }

    fn item(byte: u8, sequence: u32, order: u32) -> TransactionItem {
        TransactionItem {
            key: key(byte, sequence),
            is_completed: false,
            offset: order as u64 * 100,
            size: 96,
            order,
        }
    }

    #[test]
    fn open_keys_lists_incomplete_entries_in_order() {
        let mut map = TransactionItemMap::new();
        map.insert(item(1, 1, 1));
        map.insert(item(1, 0, 0));
        map.insert(item(2, 0, 2));

        assert!(map.set_completed(&key(1, 1)));

        assert_eq!(map.open_keys(), vec![key(1, 0), key(2, 0)]);
    }

    #[test]
    fn set_completed_on_unknown_key_is_false() {
        let mut map = TransactionItemMap::new();
        assert!(!map.set_completed(&key(9, 0)));
    }

    #[test]
    fn max_order_tracks_insertions() {
        let mut map = TransactionItemMap::new();
        assert_eq!(map.max_order(), None);

        map.insert(item(1, 0, 0));
        map.insert(item(1, 1, 1));
        assert_eq!(map.max_order(), Some(1));
    }

    #[test]
    fn insert_replaces_item_with_same_key() {
        let mut map = TransactionItemMap::new();
        map.insert(item(1, 0, 0));

        let mut relogged = item(1, 0, 0);
        relogged.size = 200;
        map.insert(relogged);

        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&key(1, 0)).unwrap().size, 200);
    }
}
