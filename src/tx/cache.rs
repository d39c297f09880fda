//! # Page Tree Cache Interface
//!
//! The in-memory page cache is an external collaborator: this crate calls
//! it, it never implements it. The trait covers exactly what the
//! transaction protocol needs: residency, row mutation, page access, and
//! tree seeding for the allocation loop.

use eyre::Result;

use crate::types::{PageAddress, PageId, RowId, TreeAddress};

/// Outcome of attempting to place a row on a tree. The three non-success
/// signals are each recoverable by one specific action, after which the
/// attempt is retried; together they are exhaustive, so the retry loop in
/// [`protocol`](super::protocol) can only terminate by succeeding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAddRowResult {
    /// The row was placed on the given page.
    Success { page_id: PageId },
    /// The tree has no pages in memory at all; load it from disk.
    TreeNotInMemory,
    /// The tree is resident but empty; allocate its first page.
    NoPagesOnTree,
    /// Every resident page is full; bring in another page or allocate.
    NoRoomOnTree,
}

pub trait PageTreeCache {
    /// Whether the tree has been brought into memory at all. An empty but
    /// seeded tree is resident.
    fn is_tree_resident(&self, tree: &TreeAddress) -> bool;

    /// Attempts to place a row on the tree. Must report a signal from
    /// [`CacheAddRowResult`] rather than allocating storage itself.
    fn try_add_row(&mut self, tree: &TreeAddress, row_id: RowId, row: &[u8]) -> CacheAddRowResult;

    /// Replaces a row in place, returning the page it lives on, or
    /// `Ok(None)` when the row is unknown.
    fn update_row(&mut self, tree: &TreeAddress, row_id: RowId, row: &[u8])
        -> Result<Option<PageId>>;

    /// Removes a row, returning the page it lived on, or `Ok(None)` when
    /// the row is unknown.
    fn delete_row(&mut self, tree: &TreeAddress, row_id: RowId) -> Result<Option<PageId>>;

    /// Current bytes of a row, or `Ok(None)` when the row is unknown.
    fn get_row(&self, tree: &TreeAddress, row_id: RowId) -> Result<Option<Vec<u8>>>;

    /// Full frame bytes of a resident page.
    fn page_bytes(&self, address: &PageAddress) -> Result<Option<Vec<u8>>>;

    /// Addresses of every resident page of the tree.
    fn tree_page_addresses(&self, tree: &TreeAddress) -> Vec<PageAddress>;

    /// Makes the tree resident with exactly the given pages. An empty page
    /// list seeds an empty, resident tree.
    fn seed_tree(&mut self, tree: &TreeAddress, pages: Vec<(PageAddress, Vec<u8>)>);

    /// Adds one page to an already-resident tree.
    fn add_page(&mut self, tree: &TreeAddress, address: PageAddress, bytes: Vec<u8>);

    /// Removes the whole tree from memory.
    fn drop_tree(&mut self, tree: &TreeAddress);
}
