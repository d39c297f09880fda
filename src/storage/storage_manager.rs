//! # Storage Manager
//!
//! The sole boundary the rest of the system calls. Given a database id,
//! the manager resolves the owning [`FileHandler`] (system databases and
//! host databases live in separate collections) and forwards page and log
//! operations to it. It also owns database lifecycle on disk: creating the
//! file pair, deleting it, enumerating what exists, and bootstrapping
//! handles for every database found at startup.
//!
//! Every page address and every transaction entry belongs to exactly one
//! handler, selected solely by database id; an id that resolves in neither
//! collection is a fatal error, not a miss.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use eyre::{bail, ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::info;

use super::data_file::FileKind;
use super::file_handler::FileHandler;
use super::page::{DataPageType, PageType};
use super::wal::{TransactionEntry, TransactionEntryKey};
use crate::config::{HOST_DATA_EXTENSION, SYSTEM_DATA_EXTENSION};
use crate::types::{DatabaseId, PageAddress, PageId, TreeAddress};

#[derive(Debug, Clone)]
pub struct StorageConfig {
    base_dir: PathBuf,
}

impl StorageConfig {
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

pub struct StorageManager {
    config: StorageConfig,
    system: RwLock<HashMap<DatabaseId, Arc<FileHandler>>>,
    host: RwLock<HashMap<DatabaseId, Arc<FileHandler>>>,
}

impl StorageManager {
    pub fn new(config: StorageConfig) -> Result<Self> {
        fs::create_dir_all(config.base_dir()).wrap_err_with(|| {
            format!(
                "failed to create storage directory '{}'",
                config.base_dir().display()
            )
        })?;

        Ok(Self {
            config,
            system: RwLock::new(HashMap::new()),
            host: RwLock::new(HashMap::new()),
        })
    }

    pub fn base_dir(&self) -> &Path {
        self.config.base_dir()
    }

    pub fn create_host_database(&self, name: &str, database_id: DatabaseId) -> Result<()> {
        self.create_database(name, database_id, FileKind::Host)
    }

    pub fn create_system_database(&self, name: &str, database_id: DatabaseId) -> Result<()> {
        self.create_database(name, database_id, FileKind::System)
    }

    fn create_database(&self, name: &str, database_id: DatabaseId, kind: FileKind) -> Result<()> {
        validate_name(name)?;
        ensure!(
            !self.is_registered(database_id),
            "database {database_id} is already registered"
        );

        let handler = FileHandler::create(self.base_dir(), name, kind, database_id)?;
        let handler = Arc::new(handler);

        match kind {
            FileKind::System => self.system.write().insert(database_id, handler),
            FileKind::Host => self.host.write().insert(database_id, handler),
        };

        Ok(())
    }

    /// Deletes a host database: both files and the in-memory handle.
    /// System databases cannot be deleted.
    pub fn delete_host_database(&self, database_id: DatabaseId) -> Result<()> {
        let handler = match self.host.write().remove(&database_id) {
            Some(handler) => handler,
            None => bail!("no host file handler for database {database_id}"),
        };

        handler.remove_files()?;
        info!(database = %database_id, "deleted host database");
        Ok(())
    }

    /// Names of every database on disk, by data-file extension, sorted.
    pub fn database_names(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        let entries = fs::read_dir(self.base_dir()).wrap_err_with(|| {
            format!(
                "failed to read storage directory '{}'",
                self.base_dir().display()
            )
        })?;

        for entry in entries {
            let entry = entry.wrap_err("failed to read storage directory entry")?;
            let path = entry.path();
            if database_kind(&path).is_some() {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    names.push(stem.to_string());
                }
            }
        }

        names.sort_unstable();
        Ok(names)
    }

    /// Bootstrap: opens every database file pair found on disk and
    /// registers a handler for each, recovering database ids from the data
    /// file headers. Returns how many handlers were loaded.
    pub fn load_existing(&self) -> Result<usize> {
        let mut loaded = 0;

        let entries = fs::read_dir(self.base_dir()).wrap_err_with(|| {
            format!(
                "failed to read storage directory '{}'",
                self.base_dir().display()
            )
        })?;

        for entry in entries {
            let entry = entry.wrap_err("failed to read storage directory entry")?;
            let path = entry.path();
            let Some(kind) = database_kind(&path) else {
                continue;
            };
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let handler = FileHandler::open(self.base_dir(), stem, kind)?;
            let database_id = handler.database_id();
            ensure!(
                !self.is_registered(database_id),
                "duplicate database id {database_id} on disk ('{stem}')"
            );

            let handler = Arc::new(handler);
            match kind {
                FileKind::System => self.system.write().insert(database_id, handler),
                FileKind::Host => self.host.write().insert(database_id, handler),
            };
            loaded += 1;
        }

        info!(count = loaded, base = %self.base_dir().display(), "loaded existing databases");
        Ok(loaded)
    }

    /// Persists one page frame into the owning database's data file.
    pub fn save_page(
        &self,
        address: &PageAddress,
        bytes: &[u8],
        page_type: PageType,
        data_page_type: DataPageType,
        is_deleted: bool,
    ) -> Result<()> {
        self.resolve(address.database_id)?
            .data()
            .write_page(bytes, address, page_type, data_page_type, is_deleted)
    }

    /// Reads one page frame, or `Ok(None)` when it is not on disk yet.
    pub fn get_page(&self, address: &PageAddress) -> Result<Option<Vec<u8>>> {
        self.resolve(address.database_id)?.data().read_page(address)
    }

    /// Raw scan for an on-disk user page of the tree that is not in
    /// `resident`.
    pub fn get_any_unloaded_user_page(
        &self,
        tree: &TreeAddress,
        resident: &[PageAddress],
    ) -> Result<Option<(PageAddress, Vec<u8>)>> {
        self.resolve(tree.database_id)?
            .data()
            .get_any_unloaded_user_page(tree, resident)
    }

    pub fn max_page_id(&self, tree: &TreeAddress) -> Result<PageId> {
        self.resolve(tree.database_id)?.data().max_page_id(tree)
    }

    pub fn total_pages(&self, database_id: DatabaseId) -> Result<usize> {
        self.resolve(database_id)?.data().total_pages()
    }

    pub fn total_pages_for(&self, tree: &TreeAddress) -> Result<usize> {
        self.resolve(tree.database_id)?.data().total_pages_for(tree)
    }

    pub fn tree_page_addresses(&self, tree: &TreeAddress) -> Result<SmallVec<[PageAddress; 8]>> {
        self.resolve(tree.database_id)?
            .data()
            .tree_page_addresses(tree)
    }

    pub fn log_open_transaction(
        &self,
        database_id: DatabaseId,
        entry: &TransactionEntry,
    ) -> Result<()> {
        self.resolve(database_id)?.log().log_open(entry)
    }

    pub fn close_open_transaction(
        &self,
        database_id: DatabaseId,
        key: &TransactionEntryKey,
    ) -> Result<bool> {
        self.resolve(database_id)?.log().close_open(key)
    }

    pub fn remove_open_transaction(
        &self,
        database_id: DatabaseId,
        key: &TransactionEntryKey,
    ) -> Result<bool> {
        self.resolve(database_id)?.log().mark_removed(key)
    }

    pub fn has_open_transaction(
        &self,
        database_id: DatabaseId,
        key: &TransactionEntryKey,
    ) -> Result<bool> {
        self.resolve(database_id)?.log().has_open(key)
    }

    pub fn get_transaction_entry(
        &self,
        database_id: DatabaseId,
        key: &TransactionEntryKey,
    ) -> Result<Option<TransactionEntry>> {
        self.resolve(database_id)?.log().get_entry(key)
    }

    pub fn open_transactions(&self, database_id: DatabaseId) -> Result<Vec<TransactionEntryKey>> {
        self.resolve(database_id)?.log().open_transactions()
    }

    fn is_registered(&self, database_id: DatabaseId) -> bool {
        self.host.read().contains_key(&database_id)
            || self.system.read().contains_key(&database_id)
    }

    /// Resolves the one handler owning a database id. Checking both
    /// collections and finding neither is fatal: no address may float
    /// unowned.
    fn resolve(&self, database_id: DatabaseId) -> Result<Arc<FileHandler>> {
        if let Some(handler) = self.host.read().get(&database_id) {
            return Ok(handler.clone());
        }
        if let Some(handler) = self.system.read().get(&database_id) {
            return Ok(handler.clone());
        }
        bail!("no file handler for database {database_id}")
    }
}

fn database_kind(path: &Path) -> Option<FileKind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(HOST_DATA_EXTENSION) => Some(FileKind::Host),
        Some(SYSTEM_DATA_EXTENSION) => Some(FileKind::System),
        _ => None,
    }
}

fn validate_name(name: &str) -> Result<()> {
    ensure!(!name.is_empty(), "database name cannot be empty");
    ensure!(
        !name.contains('/') && !name.contains('\\'),
        "database name cannot contain path separators"
    );
    ensure!(
        !name.contains(".."),
        "database name cannot contain parent directory references"
    );
    ensure!(
        name.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '-'),
        "database name can only contain alphanumeric characters, underscores, and hyphens"
    );
    Ok(())
}
