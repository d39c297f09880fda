//! Shared test doubles for the transaction protocol's collaborators: a
//! grid-shaped in-memory page cache with a fixed row capacity per page, a
//! plain in-memory entry registry, and canned participants.

#![allow(dead_code)]

use std::collections::HashMap;

use eyre::Result;
use keeldb::storage::wal::{ActionKind, TransactionEntry, TransactionEntryKey};
use keeldb::tx::{CacheAddRowResult, PageTreeCache, ParticipantLink, TransactionRegistry};
use keeldb::types::{BatchId, PageAddress, PageId, RowAddress, RowId, TreeAddress};

#[derive(Default)]
struct TreeState {
    pages: Vec<(PageAddress, Vec<u8>)>,
    rows: HashMap<RowId, (PageId, Vec<u8>)>,
    occupancy: HashMap<PageId, usize>,
}

/// In-memory page tree cache where every page holds at most
/// `rows_per_page` rows, so tests can drive every allocation signal.
pub struct GridCache {
    rows_per_page: usize,
    trees: HashMap<TreeAddress, TreeState>,
}

impl GridCache {
    pub fn new(rows_per_page: usize) -> Self {
        Self {
            rows_per_page,
            trees: HashMap::new(),
        }
    }

    pub fn resident_page_count(&self, tree: &TreeAddress) -> usize {
        self.trees.get(tree).map_or(0, |state| state.pages.len())
    }
}

impl PageTreeCache for GridCache {
    fn is_tree_resident(&self, tree: &TreeAddress) -> bool {
        self.trees.contains_key(tree)
    }

    fn try_add_row(&mut self, tree: &TreeAddress, row_id: RowId, row: &[u8]) -> CacheAddRowResult {
        let Some(state) = self.trees.get_mut(tree) else {
            return CacheAddRowResult::TreeNotInMemory;
        };
        if state.pages.is_empty() {
            return CacheAddRowResult::NoPagesOnTree;
        }

        for (address, _) in &state.pages {
            let used = state.occupancy.get(&address.page_id).copied().unwrap_or(0);
            if used < self.rows_per_page {
                state
                    .rows
                    .insert(row_id, (address.page_id, row.to_vec()));
                *state.occupancy.entry(address.page_id).or_insert(0) += 1;
                return CacheAddRowResult::Success {
                    page_id: address.page_id,
                };
            }
        }

        CacheAddRowResult::NoRoomOnTree
    }

    fn update_row(
        &mut self,
        tree: &TreeAddress,
        row_id: RowId,
        row: &[u8],
    ) -> Result<Option<PageId>> {
        let Some(state) = self.trees.get_mut(tree) else {
            return Ok(None);
        };
        match state.rows.get_mut(&row_id) {
            Some((page_id, bytes)) => {
                *bytes = row.to_vec();
                Ok(Some(*page_id))
            }
            None => Ok(None),
        }
    }

    fn delete_row(&mut self, tree: &TreeAddress, row_id: RowId) -> Result<Option<PageId>> {
        let Some(state) = self.trees.get_mut(tree) else {
            return Ok(None);
        };
        match state.rows.remove(&row_id) {
            Some((page_id, _)) => {
                if let Some(used) = state.occupancy.get_mut(&page_id) {
                    *used = used.saturating_sub(1);
                }
                Ok(Some(page_id))
            }
            None => Ok(None),
        }
    }

    fn get_row(&self, tree: &TreeAddress, row_id: RowId) -> Result<Option<Vec<u8>>> {
        Ok(self
            .trees
            .get(tree)
            .and_then(|state| state.rows.get(&row_id))
            .map(|(_, bytes)| bytes.clone()))
    }

    fn page_bytes(&self, address: &PageAddress) -> Result<Option<Vec<u8>>> {
        Ok(self.trees.get(&address.tree()).and_then(|state| {
            state
                .pages
                .iter()
                .find(|(a, _)| a == address)
                .map(|(_, bytes)| bytes.clone())
        }))
    }

    fn tree_page_addresses(&self, tree: &TreeAddress) -> Vec<PageAddress> {
        self.trees
            .get(tree)
            .map(|state| state.pages.iter().map(|(address, _)| *address).collect())
            .unwrap_or_default()
    }

    fn seed_tree(&mut self, tree: &TreeAddress, pages: Vec<(PageAddress, Vec<u8>)>) {
        let mut state = TreeState::default();
        state.pages = pages;
        self.trees.insert(*tree, state);
    }

    fn add_page(&mut self, tree: &TreeAddress, address: PageAddress, bytes: Vec<u8>) {
        let state = self.trees.entry(*tree).or_default();
        state.pages.push((address, bytes));
    }

    fn drop_tree(&mut self, tree: &TreeAddress) {
        self.trees.remove(tree);
    }
}

/// In-memory transaction registry with per-batch sequence counters.
#[derive(Default)]
pub struct MemRegistry {
    sequences: HashMap<BatchId, u32>,
    entries: Vec<TransactionEntry>,
}

impl MemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TransactionRegistry for MemRegistry {
    fn next_sequence(&mut self, batch_id: BatchId) -> u32 {
        let counter = self.sequences.entry(batch_id).or_insert(0);
        let sequence = *counter;
        *counter += 1;
        sequence
    }

    fn register(&mut self, entry: TransactionEntry) -> Result<()> {
        self.entries.push(entry);
        Ok(())
    }

    fn find_open(&self, batch_id: BatchId, kind: ActionKind) -> Option<TransactionEntry> {
        self.entries
            .iter()
            .find(|entry| {
                entry.batch_id == batch_id
                    && entry.action.kind() == kind
                    && !entry.is_completed
            })
            .cloned()
    }

    fn mark_completed(&mut self, key: &TransactionEntryKey) -> bool {
        for entry in &mut self.entries {
            if entry.key() == *key {
                entry.is_completed = true;
                return true;
            }
        }
        false
    }

    fn deregister(&mut self, key: &TransactionEntryKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key() != *key);
        self.entries.len() != before
    }
}

/// Participant that accepts every row and records what it saw.
#[derive(Default)]
pub struct AcceptingParticipant {
    pub saved: Vec<(RowAddress, Vec<u8>)>,
}

impl ParticipantLink for AcceptingParticipant {
    fn save_row_remote(&mut self, address: &RowAddress, row: &[u8]) -> Result<bool> {
        self.saved.push((*address, row.to_vec()));
        Ok(true)
    }
}

/// Participant that rejects every row.
#[derive(Default)]
pub struct RejectingParticipant {
    pub offers: usize,
}

impl ParticipantLink for RejectingParticipant {
    fn save_row_remote(&mut self, _address: &RowAddress, _row: &[u8]) -> Result<bool> {
        self.offers += 1;
        Ok(false)
    }
}
