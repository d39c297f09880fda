//! # Page Map
//!
//! The in-memory index from logical page identity to on-disk byte offset.
//! One `PageMap` belongs to one data file and is built lazily by a full
//! scan of that file the first time it is needed.
//!
//! Entries are never removed: a deleted page keeps its slot and is flagged
//! with `is_deleted` instead, so offsets stay stable for the lifetime of
//! the file.
//!
//! A duplicate key discovered during a raw scan is corruption, not a normal
//! case; [`PageMap::insert_scanned`] refuses it. Rewriting a page that is
//! already mapped goes through [`PageMap::upsert`] instead.

use eyre::{bail, Result};
use hashbrown::HashMap;

use super::page::{DataPageType, PageType};
use crate::types::{PageId, TableId};

/// Identity of one map entry: a page id is unique within its table and
/// page type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageMapKey {
    pub page_id: PageId,
    pub table_id: TableId,
    pub page_type: PageType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageItem {
    pub page_id: PageId,
    pub page_type: PageType,
    pub data_page_type: Option<DataPageType>,
    pub order: u32,
    pub table_id: TableId,
    pub offset: u64,
    pub is_deleted: bool,
}

impl PageItem {
    pub fn key(&self) -> PageMapKey {
        PageMapKey {
            page_id: self.page_id,
            table_id: self.table_id,
            page_type: self.page_type,
        }
    }
}

#[derive(Debug, Default)]
pub struct PageMap {
    items: HashMap<PageMapKey, PageItem>,
}

impl PageMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &PageMapKey) -> Option<&PageItem> {
        self.items.get(key)
    }

    pub fn contains(&self, key: &PageMapKey) -> bool {
        self.items.contains_key(key)
    }

    /// Registers an entry discovered by a raw file scan. Seeing the same
    /// key twice means the file holds two frames claiming the same page.
    pub fn insert_scanned(&mut self, item: PageItem) -> Result<()> {
        let key = item.key();
        if self.items.contains_key(&key) {
            bail!(
                "corrupt data file: duplicate page {} for table {} (type {:?}) found during scan",
                key.page_id,
                key.table_id,
                key.page_type
            );
        }
        self.items.insert(key, item);
        Ok(())
    }

    /// Registers or replaces an entry for a page written through the normal
    /// write path.
    pub fn upsert(&mut self, item: PageItem) {
        self.items.insert(item.key(), item);
    }

    pub fn set_deleted(&mut self, key: &PageMapKey, deleted: bool) -> bool {
        match self.items.get_mut(key) {
            Some(item) => {
                item.is_deleted = deleted;
                true
            }
            None => false,
        }
    }

    /// Highest on-disk order across all entries; `None` for an empty map.
    pub fn max_order(&self) -> Option<u32> {
        self.items.values().map(|item| item.order).max()
    }

    /// Highest page id among data pages of the given table, 0 if the table
    /// has none. Deleted pages still occupy their ids.
    pub fn max_page_id(&self, table_id: TableId) -> PageId {
        self.items
            .values()
            .filter(|item| item.table_id == table_id && item.page_type == PageType::Data)
            .map(|item| item.page_id)
            .max()
            .unwrap_or(0)
    }

    /// Total number of indexed frames, the file-header frame included.
    pub fn total_pages(&self) -> usize {
        self.items.len()
    }

    /// Number of indexed data frames belonging to the given table.
    pub fn total_pages_for(&self, table_id: TableId) -> usize {
        self.items
            .values()
            .filter(|item| item.table_id == table_id && item.page_type == PageType::Data)
            .count()
    }

    /// Ids of the live (not deleted) data pages of a table, in page-id
    /// order so callers load trees deterministically.
    pub fn live_page_ids(&self, table_id: TableId) -> Vec<PageId> {
        let mut ids: Vec<PageId> = self
            .items
            .values()
            .filter(|item| {
                item.table_id == table_id
                    && item.page_type == PageType::Data
                    && !item.is_deleted
            })
            .map(|item| item.page_id)
            .collect();
        ids.sort_unstable();
        ids
    }

    pub fn iter(&self) -> impl Iterator<Item = &PageItem> {
        self.items.values()
    }
}
