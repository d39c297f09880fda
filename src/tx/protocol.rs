//! # Table-Level Transaction Orchestration
//!
//! [`TableOps`] ties the page cache, the transaction registry, the WAL and
//! the storage manager together for row and schema mutations. Every
//! operation takes a [`TransactionMode`] choosing which phase of the
//! protocol the call performs; see the module docs of [`tx`](crate::tx)
//! for the contract of each mode.
//!
//! ## Page Allocation
//!
//! Placing a row can fail for three recoverable reasons, reported by the
//! cache as [`CacheAddRowResult`] signals. Each signal maps to one
//! recovery action, after which the placement is retried:
//!
//! ```text
//! TreeNotInMemory  -> load the tree's pages from disk (or seed it empty)
//! NoPagesOnTree    -> allocate a fresh page at max_page_id + 1
//! NoRoomOnTree     -> pull in another on-disk page, else allocate
//! ```
//!
//! The three arms are collectively exhaustive, so the loop can only leave
//! through success. Rows larger than a page's usable space are refused up
//! front; they could never be placed and would spin the loop forever.

use eyre::{bail, ensure, eyre, Result};
use tracing::{debug, warn};

use super::cache::{CacheAddRowResult, PageTreeCache};
use super::participant::{ParticipantLink, RowLocation};
use super::registry::TransactionRegistry;
use super::TransactionMode;
use crate::config::PAGE_USABLE_SIZE;
use crate::storage::page::{empty_user_frame, DataPageType, PageType};
use crate::storage::wal::{ActionKind, CapturedPage, TransactionAction, TransactionEntry};
use crate::storage::StorageManager;
use crate::types::{BatchId, PageId, RowId, TreeAddress};

/// Identity of the transaction a call acts for: which batch it belongs to
/// and who is performing it.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    pub batch_id: BatchId,
    pub user_name: String,
}

impl TransactionRequest {
    pub fn new(batch_id: BatchId, user_name: impl Into<String>) -> Self {
        Self {
            batch_id,
            user_name: user_name.into(),
        }
    }
}

pub struct TableOps<'a> {
    storage: &'a StorageManager,
    cache: &'a mut dyn PageTreeCache,
    registry: &'a mut dyn TransactionRegistry,
    participant: Option<&'a mut dyn ParticipantLink>,
}

impl<'a> TableOps<'a> {
    pub fn new(
        storage: &'a StorageManager,
        cache: &'a mut dyn PageTreeCache,
        registry: &'a mut dyn TransactionRegistry,
    ) -> Self {
        Self {
            storage,
            cache,
            registry,
            participant: None,
        }
    }

    pub fn with_participant(
        storage: &'a StorageManager,
        cache: &'a mut dyn PageTreeCache,
        registry: &'a mut dyn TransactionRegistry,
        participant: &'a mut dyn ParticipantLink,
    ) -> Self {
        Self {
            storage,
            cache,
            registry,
            participant: Some(participant),
        }
    }

    /// Inserts a row under the chosen mode. Remote rows must be accepted
    /// by the participant before any local step; a rejection aborts the
    /// operation with nothing logged.
    pub fn insert_row(
        &mut self,
        tree: &TreeAddress,
        row_id: RowId,
        row: &[u8],
        location: RowLocation,
        request: &TransactionRequest,
        mode: TransactionMode,
    ) -> Result<bool> {
        match mode {
            TransactionMode::None => {
                ensure_row_fits(row)?;
                if !self.remote_accepts(location, tree, row_id, row)? {
                    return Ok(false);
                }

                let page_id = self.place_row(tree, row_id, row)?;
                self.persist_page(tree, page_id)?;
                Ok(true)
            }
            TransactionMode::Try => {
                ensure_row_fits(row)?;
                if !self.remote_accepts(location, tree, row_id, row)? {
                    return Ok(false);
                }

                let page_id = self.place_row(tree, row_id, row)?;
                let entry = TransactionEntry::new(
                    request.batch_id,
                    self.registry.next_sequence(request.batch_id),
                    TransactionAction::InsertRow {
                        address: tree.row(page_id, row_id),
                        row: row.to_vec(),
                    },
                    request.user_name.clone(),
                );
                self.registry.register(entry.clone())?;
                self.storage.log_open_transaction(tree.database_id, &entry)?;
                Ok(true)
            }
            TransactionMode::Commit => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::InsertRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::InsertRow { address, .. } = &entry.action else {
                    bail!("registry returned a non-insert entry for an insert commit");
                };

                let key = entry.key();
                self.registry.mark_completed(&key);
                self.persist_page(tree, address.page_id)?;
                self.storage.close_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "committed insert");
                Ok(true)
            }
            TransactionMode::Rollback => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::InsertRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::InsertRow { address, .. } = &entry.action else {
                    bail!("registry returned a non-insert entry for an insert rollback");
                };

                self.cache.delete_row(tree, address.row_id)?;

                let key = entry.key();
                self.storage.remove_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "rolled back insert");
                Ok(true)
            }
        }
    }

    /// Updates a row under the chosen mode, capturing before and after
    /// images on `Try` so the change can be reversed.
    pub fn update_row(
        &mut self,
        tree: &TreeAddress,
        row_id: RowId,
        after: &[u8],
        request: &TransactionRequest,
        mode: TransactionMode,
    ) -> Result<bool> {
        match mode {
            TransactionMode::None => {
                ensure_row_fits(after)?;
                self.ensure_resident(tree)?;

                let Some(page_id) = self.cache.update_row(tree, row_id, after)? else {
                    return Ok(false);
                };
                self.persist_page(tree, page_id)?;
                Ok(true)
            }
            TransactionMode::Try => {
                ensure_row_fits(after)?;
                self.ensure_resident(tree)?;

                let Some(before) = self.cache.get_row(tree, row_id)? else {
                    return Ok(false);
                };
                let Some(page_id) = self.cache.update_row(tree, row_id, after)? else {
                    return Ok(false);
                };

                let entry = TransactionEntry::new(
                    request.batch_id,
                    self.registry.next_sequence(request.batch_id),
                    TransactionAction::UpdateRow {
                        address: tree.row(page_id, row_id),
                        before,
                        after: after.to_vec(),
                    },
                    request.user_name.clone(),
                );
                self.registry.register(entry.clone())?;
                self.storage.log_open_transaction(tree.database_id, &entry)?;
                Ok(true)
            }
            TransactionMode::Commit => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::UpdateRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::UpdateRow { address, .. } = &entry.action else {
                    bail!("registry returned a non-update entry for an update commit");
                };

                let key = entry.key();
                self.registry.mark_completed(&key);
                self.persist_page(tree, address.page_id)?;
                self.storage.close_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "committed update");
                Ok(true)
            }
            TransactionMode::Rollback => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::UpdateRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::UpdateRow {
                    address, before, ..
                } = &entry.action
                else {
                    bail!("registry returned a non-update entry for an update rollback");
                };

                let restored = self.cache.update_row(tree, address.row_id, before)?;
                if restored.is_none() {
                    warn!(
                        batch = %request.batch_id,
                        row = address.row_id,
                        "row to restore was no longer in cache"
                    );
                }

                let key = entry.key();
                self.storage.remove_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "rolled back update");
                Ok(true)
            }
        }
    }

    /// Deletes a row under the chosen mode. `Try` captures the full row so
    /// a rollback can re-insert and re-persist it.
    pub fn delete_row(
        &mut self,
        tree: &TreeAddress,
        row_id: RowId,
        request: &TransactionRequest,
        mode: TransactionMode,
    ) -> Result<bool> {
        match mode {
            TransactionMode::None => {
                self.ensure_resident(tree)?;

                let Some(page_id) = self.cache.delete_row(tree, row_id)? else {
                    return Ok(false);
                };
                self.persist_page(tree, page_id)?;
                Ok(true)
            }
            TransactionMode::Try => {
                self.ensure_resident(tree)?;

                let Some(row) = self.cache.get_row(tree, row_id)? else {
                    return Ok(false);
                };
                let Some(page_id) = self.cache.delete_row(tree, row_id)? else {
                    return Ok(false);
                };

                let entry = TransactionEntry::new(
                    request.batch_id,
                    self.registry.next_sequence(request.batch_id),
                    TransactionAction::DeleteRow {
                        address: tree.row(page_id, row_id),
                        row,
                    },
                    request.user_name.clone(),
                );
                self.registry.register(entry.clone())?;
                self.storage.log_open_transaction(tree.database_id, &entry)?;
                Ok(true)
            }
            TransactionMode::Commit => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::DeleteRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::DeleteRow { address, .. } = &entry.action else {
                    bail!("registry returned a non-delete entry for a delete commit");
                };

                let key = entry.key();
                self.registry.mark_completed(&key);
                self.persist_page(tree, address.page_id)?;
                self.storage.close_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "committed delete");
                Ok(true)
            }
            TransactionMode::Rollback => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::DeleteRow)
                else {
                    return Ok(false);
                };
                let TransactionAction::DeleteRow { address, row } = &entry.action else {
                    bail!("registry returned a non-delete entry for a delete rollback");
                };

                // the captured row goes back in and the page is re-persisted
                // as live data
                let page_id = self.place_row(tree, address.row_id, row)?;
                self.persist_page(tree, page_id)?;

                let key = entry.key();
                self.storage.remove_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, row = address.row_id, "rolled back delete");
                Ok(true)
            }
        }
    }

    /// Drops a whole table under the chosen mode. `Try` captures the
    /// schema and every existing page; a rollback re-seeds the cache and
    /// re-persists the captured pages as live.
    pub fn drop_table(
        &mut self,
        tree: &TreeAddress,
        schema: &[u8],
        request: &TransactionRequest,
        mode: TransactionMode,
    ) -> Result<bool> {
        match mode {
            TransactionMode::None => {
                self.cache.drop_tree(tree);
                for address in self.storage.tree_page_addresses(tree)? {
                    let Some(bytes) = self.storage.get_page(&address)? else {
                        continue;
                    };
                    self.storage.save_page(
                        &address,
                        &bytes,
                        PageType::Data,
                        DataPageType::User,
                        true,
                    )?;
                }
                Ok(true)
            }
            TransactionMode::Try => {
                self.ensure_resident(tree)?;

                let mut pages = Vec::new();
                for address in self.cache.tree_page_addresses(tree) {
                    let bytes = self.cache.page_bytes(&address)?.ok_or_else(|| {
                        eyre!("resident page {} vanished during capture", address.page_id)
                    })?;
                    pages.push(CapturedPage {
                        address,
                        data_page_type: DataPageType::User,
                        bytes,
                    });
                }

                self.cache.drop_tree(tree);

                let entry = TransactionEntry::new(
                    request.batch_id,
                    self.registry.next_sequence(request.batch_id),
                    TransactionAction::DropTable {
                        tree: *tree,
                        schema: schema.to_vec(),
                        pages,
                    },
                    request.user_name.clone(),
                );
                self.registry.register(entry.clone())?;
                self.storage.log_open_transaction(tree.database_id, &entry)?;
                Ok(true)
            }
            TransactionMode::Commit => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::DropTable)
                else {
                    return Ok(false);
                };
                let TransactionAction::DropTable { pages, .. } = &entry.action else {
                    bail!("registry returned a non-drop entry for a drop commit");
                };

                let key = entry.key();
                self.registry.mark_completed(&key);
                for page in pages {
                    self.storage.save_page(
                        &page.address,
                        &page.bytes,
                        PageType::Data,
                        page.data_page_type,
                        true,
                    )?;
                }
                self.storage.close_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, table = tree.table_id, "committed table drop");
                Ok(true)
            }
            TransactionMode::Rollback => {
                let Some(entry) = self
                    .registry
                    .find_open(request.batch_id, ActionKind::DropTable)
                else {
                    return Ok(false);
                };
                let TransactionAction::DropTable { pages, .. } = &entry.action else {
                    bail!("registry returned a non-drop entry for a drop rollback");
                };

                let seeded: Vec<_> = pages
                    .iter()
                    .map(|page| (page.address, page.bytes.clone()))
                    .collect();
                self.cache.seed_tree(tree, seeded);

                for page in pages {
                    self.storage.save_page(
                        &page.address,
                        &page.bytes,
                        PageType::Data,
                        page.data_page_type,
                        false,
                    )?;
                }

                let key = entry.key();
                self.storage.remove_open_transaction(tree.database_id, &key)?;
                self.registry.deregister(&key);

                debug!(batch = %request.batch_id, table = tree.table_id, "rolled back table drop");
                Ok(true)
            }
        }
    }

    /// The page-allocation retry loop. Leaves only through success; each
    /// failure signal has exactly one recovery action.
    fn place_row(&mut self, tree: &TreeAddress, row_id: RowId, row: &[u8]) -> Result<PageId> {
        loop {
            match self.cache.try_add_row(tree, row_id, row) {
                CacheAddRowResult::Success { page_id } => return Ok(page_id),
                CacheAddRowResult::TreeNotInMemory => self.load_tree(tree)?,
                CacheAddRowResult::NoPagesOnTree => self.allocate_page(tree)?,
                CacheAddRowResult::NoRoomOnTree => self.extend_tree(tree)?,
            }
        }
    }

    /// Brings a tree's on-disk pages into the cache. A table with no pages
    /// yet is seeded empty, which makes it resident.
    fn load_tree(&mut self, tree: &TreeAddress) -> Result<()> {
        let mut pages = Vec::new();
        for address in self.storage.tree_page_addresses(tree)? {
            let Some(bytes) = self.storage.get_page(&address)? else {
                continue;
            };
            pages.push((address, bytes));
        }

        debug!(table = tree.table_id, pages = pages.len(), "loaded tree into cache");
        self.cache.seed_tree(tree, pages);
        Ok(())
    }

    /// Allocates a fresh empty page one past the highest page id the tree
    /// has anywhere, on disk or cache-only.
    fn allocate_page(&mut self, tree: &TreeAddress) -> Result<()> {
        let on_disk = self.storage.max_page_id(tree)?;
        let resident = self
            .cache
            .tree_page_addresses(tree)
            .iter()
            .map(|address| address.page_id)
            .max()
            .unwrap_or(0);

        let page_id = on_disk.max(resident) + 1;
        let address = tree.page(page_id);
        let bytes = empty_user_frame(tree.database_id, tree.table_id, page_id);

        debug!(table = tree.table_id, page = page_id, "allocated fresh page");
        self.cache.add_page(tree, address, bytes);
        Ok(())
    }

    /// Brings one more on-disk page into a full tree, or allocates a new
    /// page when every on-disk page is already resident.
    fn extend_tree(&mut self, tree: &TreeAddress) -> Result<()> {
        let resident = self.cache.tree_page_addresses(tree);
        match self.storage.get_any_unloaded_user_page(tree, &resident)? {
            Some((address, bytes)) => {
                debug!(table = tree.table_id, page = address.page_id, "fetched unloaded page");
                self.cache.add_page(tree, address, bytes);
            }
            None => self.allocate_page(tree)?,
        }
        Ok(())
    }

    fn ensure_resident(&mut self, tree: &TreeAddress) -> Result<()> {
        if !self.cache.is_tree_resident(tree) {
            self.load_tree(tree)?;
        }
        Ok(())
    }

    /// Writes a cache-resident page through to disk as live user data.
    fn persist_page(&mut self, tree: &TreeAddress, page_id: PageId) -> Result<()> {
        let address = tree.page(page_id);
        let bytes = self
            .cache
            .page_bytes(&address)?
            .ok_or_else(|| eyre!("page {page_id} of table {} not in cache", tree.table_id))?;

        self.storage
            .save_page(&address, &bytes, PageType::Data, DataPageType::User, false)
    }

    /// Remote acceptance gate. Local rows pass trivially; remote rows need
    /// the participant's durable yes before anything else happens.
    fn remote_accepts(
        &mut self,
        location: RowLocation,
        tree: &TreeAddress,
        row_id: RowId,
        row: &[u8],
    ) -> Result<bool> {
        match location {
            RowLocation::Local => Ok(true),
            RowLocation::Remote => {
                let participant = self
                    .participant
                    .as_deref_mut()
                    .ok_or_else(|| eyre!("remote row insert without a participant link"))?;

                // page is not assigned yet at this point
                let address = tree.row(0, row_id);
                let accepted = participant.save_row_remote(&address, row)?;
                if !accepted {
                    warn!(table = tree.table_id, row = row_id, "participant rejected row");
                }
                Ok(accepted)
            }
        }
    }
}

fn ensure_row_fits(row: &[u8]) -> Result<()> {
    ensure!(
        row.len() <= PAGE_USABLE_SIZE,
        "row of {} bytes cannot fit a page ({} usable bytes)",
        row.len(),
        PAGE_USABLE_SIZE
    );
    Ok(())
}
