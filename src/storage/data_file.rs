//! # Data File
//!
//! One binary page container per database: a sequence of `PAGE_SIZE` frames,
//! frame 0 being the file-header frame. The file serves and persists raw
//! page bytes; logical-to-physical translation goes through the lazily
//! built [`PageMap`].
//!
//! ## Write Model
//!
//! Writing a page that is already mapped overwrites it in place at its
//! recorded offset; writing an unmapped page appends a new frame at
//! end-of-file with `order = max_order + 1`. A page write carries no
//! atomicity with respect to any other operation; callers that need
//! durability before visibility must log intent through the WAL first.
//!
//! ## Scanning
//!
//! Two operations walk the raw file in `PAGE_SIZE` steps:
//!
//! - the map rebuild, which indexes every frame and treats a duplicate
//!   page identity as corruption, and
//! - the unloaded-page search, which skips frames that are not user data,
//!   skips addresses already resident in the caller's cache, and returns
//!   the first remaining frame of the requested table.
//!
//! Both are O(file length) and run on the calling thread. The search
//! memoizes what it finds into the map so a discovered page is never
//! rescanned for.
//!
//! ## Concurrency
//!
//! One `parking_lot::RwLock` over the file handle is the only concurrency
//! control: positioned reads run under the read lock, writes take the
//! write lock. The map lock is always acquired before the file lock.
//!
//! System and host databases use the same implementation; [`FileKind`]
//! only selects file extensions, so both kinds behave identically.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{ensure, eyre, Result, WrapErr};
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracing::debug;

use super::page::{file_header_frame, DataFileHeader, DataPageType, PageFrameHeader, PageType};
use super::page_map::{PageItem, PageMap, PageMapKey};
use crate::config::{
    DATA_FILE_HEADER_SIZE, HOST_DATA_EXTENSION, HOST_LOG_EXTENSION, PAGE_FRAME_HEADER_SIZE,
    PAGE_SIZE, SYSTEM_DATA_EXTENSION, SYSTEM_LOG_EXTENSION,
};
use crate::types::{DatabaseId, PageAddress, PageId, TreeAddress};

/// Whether a database holds internal catalog pages or user pages. Both
/// kinds run the exact same code paths; the kind only picks extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    System,
    Host,
}

impl FileKind {
    pub fn data_extension(&self) -> &'static str {
        match self {
            FileKind::System => SYSTEM_DATA_EXTENSION,
            FileKind::Host => HOST_DATA_EXTENSION,
        }
    }

    pub fn log_extension(&self) -> &'static str {
        match self {
            FileKind::System => SYSTEM_LOG_EXTENSION,
            FileKind::Host => HOST_LOG_EXTENSION,
        }
    }
}

pub struct DataFile {
    path: PathBuf,
    kind: FileKind,
    database_id: DatabaseId,
    file: RwLock<File>,
    map: RwLock<Option<PageMap>>,
}

impl DataFile {
    /// Creates a new page file with its file-header frame and syncs it.
    pub fn create(path: &Path, kind: FileKind, database_id: DatabaseId) -> Result<Self> {
        ensure!(
            !path.exists(),
            "data file '{}' already exists",
            path.display()
        );

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create data file at '{}'", path.display()))?;

        let frame = file_header_frame(database_id);
        file.write_all_at(&frame, 0)
            .wrap_err("failed to write data file header frame")?;
        file.sync_all()
            .wrap_err("failed to sync new data file")?;

        debug!(path = %path.display(), database = %database_id, "created data file");

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            database_id,
            file: RwLock::new(file),
            map: RwLock::new(None),
        })
    }

    /// Opens an existing page file, validating magic and layout version and
    /// recovering the owning database id from the header frame.
    pub fn open(path: &Path, kind: FileKind) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open data file at '{}'", path.display()))?;

        let mut header_bytes = [0u8; PAGE_FRAME_HEADER_SIZE + DATA_FILE_HEADER_SIZE];
        file.read_exact_at(&mut header_bytes, 0)
            .wrap_err_with(|| format!("failed to read header of '{}'", path.display()))?;

        let header = DataFileHeader::from_bytes(&header_bytes[PAGE_FRAME_HEADER_SIZE..])
            .wrap_err_with(|| format!("invalid data file '{}'", path.display()))?;

        ensure!(
            header.page_size() == PAGE_SIZE as u32,
            "data file '{}' was written with page size {} (expected {})",
            path.display(),
            header.page_size(),
            PAGE_SIZE
        );

        let database_id = header.database_id();

        Ok(Self {
            path: path.to_path_buf(),
            kind,
            database_id,
            file: RwLock::new(file),
            map: RwLock::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn database_id(&self) -> DatabaseId {
        self.database_id
    }

    /// Reads the frame mapped at the given address, or `Ok(None)` when the
    /// page is not on disk yet.
    pub fn read_page(&self, address: &PageAddress) -> Result<Option<Vec<u8>>> {
        self.check_owner(address.database_id)?;

        let key = PageMapKey {
            page_id: address.page_id,
            table_id: address.table_id,
            page_type: PageType::Data,
        };
        let offset = self.with_map(|map| map.get(&key).map(|item| item.offset))?;

        let Some(offset) = offset else {
            return Ok(None);
        };

        let mut frame = vec![0u8; PAGE_SIZE];
        self.file
            .read()
            .read_exact_at(&mut frame, offset)
            .wrap_err_with(|| {
                format!(
                    "failed to read page {} of table {} at offset {offset}",
                    address.page_id, address.table_id
                )
            })?;

        Ok(Some(frame))
    }

    /// Persists one page frame: in place when the address is already
    /// mapped, appended at end-of-file otherwise. The frame header is
    /// stamped from the arguments so the on-disk identity always matches
    /// the map.
    pub fn write_page(
        &self,
        bytes: &[u8],
        address: &PageAddress,
        page_type: PageType,
        data_page_type: DataPageType,
        is_deleted: bool,
    ) -> Result<()> {
        ensure!(
            bytes.len() == PAGE_SIZE,
            "page frame must be exactly {} bytes, got {}",
            PAGE_SIZE,
            bytes.len()
        );
        ensure!(
            page_type == PageType::Data,
            "only data pages can be written through a page address"
        );
        self.check_owner(address.database_id)?;
        self.ensure_map()?;

        let mut frame = bytes.to_vec();
        let header = PageFrameHeader::new(
            address.page_id,
            page_type,
            Some(data_page_type),
            address.table_id,
            address.database_id,
            is_deleted,
        );
        header.write_to(&mut frame)?;

        let key = PageMapKey {
            page_id: address.page_id,
            table_id: address.table_id,
            page_type,
        };

        let mut map_guard = self.map.write();
        let map = map_guard
            .as_mut()
            .ok_or_else(|| eyre!("page map not built"))?;
        let file = self.file.write();

        let (offset, order) = match map.get(&key) {
            Some(item) => (item.offset, item.order),
            None => {
                let offset = file
                    .metadata()
                    .wrap_err("failed to stat data file")?
                    .len();
                ensure!(
                    offset % PAGE_SIZE as u64 == 0,
                    "corrupt data file '{}': length {} is not a whole number of frames",
                    self.path.display(),
                    offset
                );
                (offset, map.max_order().map_or(0, |o| o + 1))
            }
        };

        file.write_all_at(&frame, offset).wrap_err_with(|| {
            format!(
                "failed to write page {} of table {} at offset {offset}",
                address.page_id, address.table_id
            )
        })?;
        file.sync_all().wrap_err("failed to sync data file")?;

        map.upsert(PageItem {
            page_id: address.page_id,
            page_type,
            data_page_type: Some(data_page_type),
            order,
            table_id: address.table_id,
            offset,
            is_deleted,
        });

        Ok(())
    }

    /// Raw linear scan for a user data page of the given tree that is not
    /// in `resident`. Frames that are not user data, are deleted, or belong
    /// to other tables are skipped. A hit is memoized into the page map
    /// before it is returned.
    pub fn get_any_unloaded_user_page(
        &self,
        tree: &TreeAddress,
        resident: &[PageAddress],
    ) -> Result<Option<(PageAddress, Vec<u8>)>> {
        self.check_owner(tree.database_id)?;
        self.ensure_map()?;

        let found = {
            let file = self.file.read();
            let len = file
                .metadata()
                .wrap_err("failed to stat data file")?
                .len();
            ensure!(
                len % PAGE_SIZE as u64 == 0,
                "corrupt data file '{}': length {} is not a whole number of frames",
                self.path.display(),
                len
            );

            let frames = len / PAGE_SIZE as u64;
            let mut header_bytes = [0u8; PAGE_FRAME_HEADER_SIZE];
            let mut found = None;

            for order in 0..frames {
                let offset = order * PAGE_SIZE as u64;
                file.read_exact_at(&mut header_bytes, offset)
                    .wrap_err_with(|| format!("failed to read frame header at offset {offset}"))?;

                let header = PageFrameHeader::from_bytes(&header_bytes)?;
                let page_type = header
                    .page_type()
                    .wrap_err_with(|| format!("frame at offset {offset} in '{}'", self.path.display()))?;

                if page_type != PageType::Data {
                    continue;
                }
                let data_page_type = header
                    .data_page_type()
                    .wrap_err_with(|| format!("frame at offset {offset} in '{}'", self.path.display()))?;
                if data_page_type != DataPageType::User {
                    continue;
                }
                if header.is_deleted() || header.table_id() != tree.table_id {
                    continue;
                }

                let address = tree.page(header.page_id());
                if resident.contains(&address) {
                    continue;
                }

                let mut frame = vec![0u8; PAGE_SIZE];
                file.read_exact_at(&mut frame, offset)
                    .wrap_err_with(|| format!("failed to read frame at offset {offset}"))?;

                found = Some((
                    address,
                    frame,
                    PageItem {
                        page_id: header.page_id(),
                        page_type,
                        data_page_type: Some(data_page_type),
                        order: order as u32,
                        table_id: header.table_id(),
                        offset,
                        is_deleted: false,
                    },
                ));
                break;
            }

            found
        };

        match found {
            Some((address, frame, item)) => {
                let mut map_guard = self.map.write();
                if let Some(map) = map_guard.as_mut() {
                    map.upsert(item);
                }
                Ok(Some((address, frame)))
            }
            None => Ok(None),
        }
    }

    /// Highest page id in use by the tree's table, 0 when the table has no
    /// pages yet. Used to allocate the next page id when a tree grows.
    pub fn max_page_id(&self, tree: &TreeAddress) -> Result<PageId> {
        self.check_owner(tree.database_id)?;
        self.with_map(|map| map.max_page_id(tree.table_id))
    }

    /// Total number of indexed frames in the file.
    pub fn total_pages(&self) -> Result<usize> {
        self.with_map(|map| map.total_pages())
    }

    /// Number of data frames belonging to the tree's table.
    pub fn total_pages_for(&self, tree: &TreeAddress) -> Result<usize> {
        self.check_owner(tree.database_id)?;
        self.with_map(|map| map.total_pages_for(tree.table_id))
    }

    /// Addresses of the live on-disk pages of a tree, in page-id order.
    pub fn tree_page_addresses(&self, tree: &TreeAddress) -> Result<SmallVec<[PageAddress; 8]>> {
        self.check_owner(tree.database_id)?;
        self.with_map(|map| {
            map.live_page_ids(tree.table_id)
                .into_iter()
                .map(|page_id| tree.page(page_id))
                .collect()
        })
    }

    fn check_owner(&self, database_id: DatabaseId) -> Result<()> {
        ensure!(
            database_id == self.database_id,
            "address for database {} routed to file of database {}",
            database_id,
            self.database_id
        );
        Ok(())
    }

    fn ensure_map(&self) -> Result<()> {
        if self.map.read().is_some() {
            return Ok(());
        }

        let mut guard = self.map.write();
        if guard.is_none() {
            *guard = Some(self.scan_map()?);
        }
        Ok(())
    }

    fn with_map<T>(&self, f: impl FnOnce(&PageMap) -> T) -> Result<T> {
        self.ensure_map()?;
        let guard = self.map.read();
        let map = guard
            .as_ref()
            .ok_or_else(|| eyre!("page map not built"))?;
        Ok(f(map))
    }

    /// Full-file scan indexing every frame. The only way the map is ever
    /// built; duplicates abort the scan.
    fn scan_map(&self) -> Result<PageMap> {
        let file = self.file.read();
        let len = file
            .metadata()
            .wrap_err("failed to stat data file")?
            .len();
        ensure!(
            len % PAGE_SIZE as u64 == 0,
            "corrupt data file '{}': length {} is not a whole number of frames",
            self.path.display(),
            len
        );

        let frames = len / PAGE_SIZE as u64;
        let mut map = PageMap::new();
        let mut header_bytes = [0u8; PAGE_FRAME_HEADER_SIZE];

        for order in 0..frames {
            let offset = order * PAGE_SIZE as u64;
            file.read_exact_at(&mut header_bytes, offset)
                .wrap_err_with(|| format!("failed to read frame header at offset {offset}"))?;

            let header = PageFrameHeader::from_bytes(&header_bytes)?;
            let page_type = header.page_type().wrap_err_with(|| {
                format!("frame at offset {offset} in '{}'", self.path.display())
            })?;
            let data_page_type = match page_type {
                PageType::Data => Some(header.data_page_type().wrap_err_with(|| {
                    format!("frame at offset {offset} in '{}'", self.path.display())
                })?),
                PageType::FileHeader => None,
            };

            map.insert_scanned(PageItem {
                page_id: header.page_id(),
                page_type,
                data_page_type,
                order: order as u32,
                table_id: header.table_id(),
                offset,
                is_deleted: header.is_deleted(),
            })?;
        }

        debug!(
            path = %self.path.display(),
            frames,
            "rebuilt page map from full scan"
        );

        Ok(map)
    }
}
