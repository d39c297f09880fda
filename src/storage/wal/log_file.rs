//! # Log File
//!
//! The durable, append-oriented record of in-flight and completed
//! mutations for one database. Records are written whole; after that,
//! exactly two bytes of a record are ever touched again: the
//! `is_completed` and `is_deleted` flags, patched in place at their
//! version-keyed offsets.
//!
//! ## Recovery
//!
//! The in-memory [`TransactionItemMap`] is rebuilt by a single linear scan:
//! read the 4-byte length, decode the fixed preamble, skip the variable
//! payloads, repeat until end-of-file. A malformed record terminates the
//! scan as end-of-log (a torn tail from an interrupted append is expected
//! after a crash). There is no checkpoint; the scan is the only recovery
//! mechanism.
//!
//! ## Re-logging
//!
//! Logging an entry whose key is already on disk rewrites that record's
//! slot in place rather than appending a second version. A size change is
//! only possible while the record is the last one in the file; anywhere
//! else it would corrupt record framing and is refused.
//!
//! ## Concurrency
//!
//! One `parking_lot::RwLock` over the file handle serializes raw I/O:
//! concurrent positioned readers, exclusive writer. The map lock is always
//! acquired before the file lock.

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};

use eyre::{bail, ensure, eyre, Result, WrapErr};
use parking_lot::RwLock;
use tracing::{debug, warn};

use super::entry::{v1, TransactionEntry, TransactionEntryKey, TransactionPreamble};
use super::map::{TransactionItem, TransactionItemMap};
use crate::config::{WAL_LENGTH_PREFIX_SIZE, WAL_PREAMBLE_SIZE};

pub struct LogFile {
    path: PathBuf,
    file: RwLock<File>,
    map: RwLock<Option<TransactionItemMap>>,
}

impl LogFile {
    pub fn create(path: &Path) -> Result<Self> {
        ensure!(
            !path.exists(),
            "log file '{}' already exists",
            path.display()
        );

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create log file at '{}'", path.display()))?;

        file.sync_all().wrap_err("failed to sync new log file")?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            map: RwLock::new(None),
        })
    }

    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open log file at '{}'", path.display()))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            map: RwLock::new(None),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logs an open transaction. A new key is appended at end-of-file; a
    /// key that was already logged has its slot rewritten in place.
    pub fn log_open(&self, entry: &TransactionEntry) -> Result<()> {
        self.ensure_map()?;

        let key = entry.key();
        let body = entry.encode_body();

        let mut map_guard = self.map.write();
        let map = map_guard
            .as_mut()
            .ok_or_else(|| eyre!("transaction map not built"))?;
        let file = self.file.write();

        match map.get(&key).copied() {
            Some(existing) => {
                let len = file.metadata().wrap_err("failed to stat log file")?.len();
                let is_tail =
                    existing.offset + (WAL_LENGTH_PREFIX_SIZE as u64 + existing.size as u64) == len;
                ensure!(
                    body.len() as u32 == existing.size || is_tail,
                    "re-logging entry {key:?} would change the size of a record that is not at \
                     the log tail"
                );

                write_record(&file, existing.offset, &body)?;
                if is_tail && body.len() as u32 != existing.size {
                    file.set_len(existing.offset + WAL_LENGTH_PREFIX_SIZE as u64 + body.len() as u64)
                        .wrap_err("failed to trim log after in-place re-log")?;
                }
                file.sync_all().wrap_err("failed to sync log file")?;

                map.insert(TransactionItem {
                    key,
                    is_completed: entry.is_completed,
                    offset: existing.offset,
                    size: body.len() as u32,
                    order: existing.order,
                });

                debug!(key = ?key, offset = existing.offset, "re-logged open transaction in place");
            }
            None => {
                let offset = file.metadata().wrap_err("failed to stat log file")?.len();
                write_record(&file, offset, &body)?;
                file.sync_all().wrap_err("failed to sync log file")?;

                let order = map.max_order().map_or(0, |o| o + 1);
                map.insert(TransactionItem {
                    key,
                    is_completed: entry.is_completed,
                    offset,
                    size: body.len() as u32,
                    order,
                });

                debug!(key = ?key, offset, order, "logged open transaction");
            }
        }

        Ok(())
    }

    /// Marks the record completed by patching its `is_completed` byte in
    /// place. `Ok(false)` when no record holds the key.
    pub fn close_open(&self, key: &TransactionEntryKey) -> Result<bool> {
        let Some(item) = self.find_item(key)? else {
            return Ok(false);
        };

        self.verify_key_at(item.offset, key)?;
        self.patch_flag(item.offset, v1::IS_COMPLETED_OFFSET)?;

        let mut map_guard = self.map.write();
        if let Some(map) = map_guard.as_mut() {
            map.set_completed(key);
        }

        debug!(key = ?key, offset = item.offset, "closed open transaction");
        Ok(true)
    }

    /// Marks the record deleted (rolled back) by patching its `is_deleted`
    /// byte in place. `Ok(false)` when no record holds the key.
    pub fn mark_removed(&self, key: &TransactionEntryKey) -> Result<bool> {
        let Some(item) = self.find_item(key)? else {
            return Ok(false);
        };

        self.verify_key_at(item.offset, key)?;
        self.patch_flag(item.offset, v1::IS_DELETED_OFFSET)?;

        debug!(key = ?key, offset = item.offset, "marked transaction removed");
        Ok(true)
    }

    /// Read-only check of the on-disk completion flag: true iff the record
    /// exists and is not completed.
    pub fn has_open(&self, key: &TransactionEntryKey) -> Result<bool> {
        let Some(item) = self.find_item(key)? else {
            return Ok(false);
        };

        let preamble = self.verify_key_at(item.offset, key)?;
        Ok(!preamble.is_completed())
    }

    /// Reads back the full entry for a key, or `Ok(None)` when absent.
    pub fn get_entry(&self, key: &TransactionEntryKey) -> Result<Option<TransactionEntry>> {
        let Some(item) = self.find_item(key)? else {
            return Ok(None);
        };

        let mut body = vec![0u8; item.size as usize];
        self.file
            .read()
            .read_exact_at(&mut body, item.offset + WAL_LENGTH_PREFIX_SIZE as u64)
            .wrap_err_with(|| format!("failed to read log record at offset {}", item.offset))?;

        let entry = TransactionEntry::decode_body(&body)?;
        ensure!(
            entry.key() == *key,
            "log map corruption: record at offset {} holds key {:?}, expected {:?}",
            item.offset,
            entry.key(),
            key
        );

        Ok(Some(entry))
    }

    /// Keys of entries not yet completed, in scan order.
    pub fn open_transactions(&self) -> Result<Vec<TransactionEntryKey>> {
        self.with_map(|map| map.open_keys())
    }

    /// Snapshot of the live map, in scan order.
    pub fn items(&self) -> Result<Vec<TransactionItem>> {
        self.with_map(|map| map.items())
    }

    /// Discards the in-memory map and rebuilds it with a full scan.
    pub fn rebuild_map(&self) -> Result<()> {
        let mut guard = self.map.write();
        *guard = Some(self.scan_map()?);
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

    fn with_map<T>(&self, f: impl FnOnce(&TransactionItemMap) -> T) -> Result<T> {
        self.ensure_map()?;
        let guard = self.map.read();
        let map = guard
            .as_ref()
            .ok_or_else(|| eyre!("transaction map not built"))?;
        Ok(f(map))
    }

    /// Looks the key up in the live map, rebuilding the map with a full
    /// scan once if the key is unknown.
    fn find_item(&self, key: &TransactionEntryKey) -> Result<Option<TransactionItem>> {
        self.ensure_map()?;

        if let Some(item) = self.with_map(|map| map.get(key).copied())? {
            return Ok(Some(item));
        }

        self.rebuild_map()?;
        self.with_map(|map| map.get(key).copied())
    }

    /// Decodes the preamble at a resolved offset and insists it holds the
    /// expected key. A mismatch means the map and the file disagree.
    fn verify_key_at(
        &self,
        offset: u64,
        key: &TransactionEntryKey,
    ) -> Result<TransactionPreamble> {
        let mut preamble_bytes = [0u8; WAL_PREAMBLE_SIZE];
        self.file
            .read()
            .read_exact_at(&mut preamble_bytes, offset + WAL_LENGTH_PREFIX_SIZE as u64)
            .wrap_err_with(|| format!("failed to read log preamble at offset {offset}"))?;

        let preamble = TransactionPreamble::from_bytes(&preamble_bytes)?;
        let decoded = preamble.key()?;
        if decoded != *key {
            bail!(
                "log map corruption in '{}': record at offset {offset} holds key {decoded:?}, \
                 expected {key:?}",
                self.path.display()
            );
        }

        Ok(*preamble)
    }

    fn patch_flag(&self, record_offset: u64, flag_offset: usize) -> Result<()> {
        let file = self.file.write();
        file.write_all_at(
            &[1],
            record_offset + (WAL_LENGTH_PREFIX_SIZE + flag_offset) as u64,
        )
        .wrap_err_with(|| format!("failed to patch log flag at record offset {record_offset}"))?;
        file.sync_all().wrap_err("failed to sync log file")?;
        Ok(())
    }

    /// The recovery scan: walks the whole file once, indexing each record
    /// by its preamble. Stops at the first malformed record, which can only
    /// be a torn tail.
    fn scan_map(&self) -> Result<TransactionItemMap> {
        let file = self.file.read();
        let len = file.metadata().wrap_err("failed to stat log file")?.len();

        let mut map = TransactionItemMap::new();
        let mut pos = 0u64;
        let mut order = 0u32;
        let mut length_bytes = [0u8; WAL_LENGTH_PREFIX_SIZE];
        let mut preamble_bytes = [0u8; WAL_PREAMBLE_SIZE];

        while pos + WAL_LENGTH_PREFIX_SIZE as u64 <= len {
            file.read_exact_at(&mut length_bytes, pos)
                .wrap_err_with(|| format!("failed to read log record length at offset {pos}"))?;
            let length = u32::from_le_bytes(length_bytes);

            let record_end = pos + WAL_LENGTH_PREFIX_SIZE as u64 + length as u64;
            if (length as usize) < WAL_PREAMBLE_SIZE + 2 * WAL_LENGTH_PREFIX_SIZE
                || record_end > len
            {
                warn!(
                    path = %self.path.display(),
                    offset = pos,
                    "malformed log record, treating as end of log"
                );
                break;
            }

            file.read_exact_at(&mut preamble_bytes, pos + WAL_LENGTH_PREFIX_SIZE as u64)
                .wrap_err_with(|| format!("failed to read log preamble at offset {pos}"))?;
            let preamble = TransactionPreamble::from_bytes(&preamble_bytes)?;
            let key = match preamble.key() {
                Ok(key) => key,
                Err(_) => {
                    warn!(
                        path = %self.path.display(),
                        offset = pos,
                        "undecodable log preamble, treating as end of log"
                    );
                    break;
                }
            };

            map.insert(TransactionItem {
                key,
                is_completed: preamble.is_completed(),
                offset: pos,
                size: length,
                order,
            });

            pos = record_end;
            order += 1;
        }

        debug!(
            path = %self.path.display(),
            records = order,
            "rebuilt transaction item map from full scan"
        );

        Ok(map)
    }
}

fn write_record(file: &File, offset: u64, body: &[u8]) -> Result<()> {
    let mut record = Vec::with_capacity(WAL_LENGTH_PREFIX_SIZE + body.len());
    record.extend_from_slice(&(body.len() as u32).to_le_bytes());
    record.extend_from_slice(body);
    file.write_all_at(&record, offset)
        .wrap_err_with(|| format!("failed to write log record at offset {offset}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::wal::entry::{ActionKind, TransactionAction};
    use crate::types::{BatchId, DatabaseId, RowAddress};
    use tempfile::tempdir;

    fn insert_entry(batch: u8, sequence: u32, row: Vec<u8>) -> TransactionEntry {
        TransactionEntry::new(
            BatchId::from_bytes([batch; 16]),
            sequence,
            TransactionAction::InsertRow {
                address: RowAddress {
                    database_id: DatabaseId::from_bytes([1; 16]),
                    table_id: 3,
                    page_id: 1,
                    row_id: sequence,
                },
                row,
            },
            "tester",
        )
    }

    #[test]
    fn first_record_lands_at_offset_zero() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let first = insert_entry(1, 0, vec![1; 16]);
        log.log_open(&first).unwrap();

        let items = log.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].offset, 0);
        assert_eq!(items[0].order, 0);

        let second = insert_entry(1, 1, vec![2; 16]);
        log.log_open(&second).unwrap();

        let items = log.items().unwrap();
        let first_size = items[0].size as u64;
        assert_eq!(items[1].offset, WAL_LENGTH_PREFIX_SIZE as u64 + first_size);
        assert_eq!(items[1].order, 1);
    }

    #[test]
    fn close_clears_has_open() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let entry = insert_entry(2, 0, vec![7; 8]);
        log.log_open(&entry).unwrap();
        assert!(log.has_open(&entry.key()).unwrap());

        assert!(log.close_open(&entry.key()).unwrap());
        assert!(!log.has_open(&entry.key()).unwrap());
    }

    #[test]
    fn close_is_idempotent_and_preserves_geometry() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let entry = insert_entry(3, 0, vec![5; 24]);
        log.log_open(&entry).unwrap();

        let before = log.items().unwrap()[0];
        assert!(log.close_open(&entry.key()).unwrap());
        assert!(log.close_open(&entry.key()).unwrap());
        let after = log.items().unwrap()[0];

        assert_eq!(before.offset, after.offset);
        assert_eq!(before.size, after.size);
        assert!(after.is_completed);
        assert!(!log.has_open(&entry.key()).unwrap());
    }

    #[test]
    fn close_of_unknown_key_is_a_noop() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let entry = insert_entry(4, 0, vec![1]);
        assert!(!log.close_open(&entry.key()).unwrap());
        assert!(!log.mark_removed(&entry.key()).unwrap());
        assert!(!log.has_open(&entry.key()).unwrap());
    }

    #[test]
    fn relog_rewrites_the_slot_in_place() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let entry = insert_entry(5, 0, vec![1; 16]);
        log.log_open(&entry).unwrap();
        let before = log.items().unwrap()[0];

        let relogged = insert_entry(5, 0, vec![9; 48]);
        log.log_open(&relogged).unwrap();
        let after = log.items().unwrap()[0];

        assert_eq!(after.offset, before.offset);
        assert_eq!(after.order, before.order);
        assert_ne!(after.size, before.size);

        let read_back = log.get_entry(&entry.key()).unwrap().unwrap();
        match read_back.action {
            TransactionAction::InsertRow { row, .. } => assert_eq!(row, vec![9; 48]),
            other => panic!("expected InsertRow, got {other:?}"),
        }
    }

    #[test]
    fn relog_size_change_behind_the_tail_is_refused() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        let first = insert_entry(6, 0, vec![1; 16]);
        log.log_open(&first).unwrap();
        log.log_open(&insert_entry(6, 1, vec![2; 16])).unwrap();

        // same size is fine anywhere
        log.log_open(&insert_entry(6, 0, vec![3; 16])).unwrap();

        // a size change would shift the framing of the record behind it
        let grown = insert_entry(6, 0, vec![4; 64]);
        assert!(log.log_open(&grown).is_err());
    }

    #[test]
    fn rebuilt_map_matches_live_map() {
        let dir = tempdir().unwrap();
        let log = LogFile::create(&dir.path().join("db.klog")).unwrap();

        for sequence in 0..4 {
            log.log_open(&insert_entry(7, sequence, vec![sequence as u8; 20]))
                .unwrap();
        }
        let closed = insert_entry(7, 1, vec![1; 20]);
        log.close_open(&closed.key()).unwrap();

        let live = log.items().unwrap();
        log.rebuild_map().unwrap();
        let rebuilt = log.items().unwrap();

        assert_eq!(live, rebuilt);
        assert_eq!(
            rebuilt.iter().filter(|item| item.is_completed).count(),
            1
        );
    }

    #[test]
    fn reopened_log_recovers_open_transactions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.klog");

        {
            let log = LogFile::create(&path).unwrap();
            log.log_open(&insert_entry(8, 0, vec![1; 10])).unwrap();
            log.log_open(&insert_entry(8, 1, vec![2; 10])).unwrap();
            log.close_open(&insert_entry(8, 0, vec![1; 10]).key()).unwrap();
        }

        let reopened = LogFile::open(&path).unwrap();
        let open = reopened.open_transactions().unwrap();

        assert_eq!(open.len(), 1);
        assert_eq!(open[0].sequence, 1);
        assert_eq!(open[0].action_kind, ActionKind::InsertRow);
    }

    #[test]
    fn torn_tail_ends_the_scan() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db.klog");

        {
            let log = LogFile::create(&path).unwrap();
            log.log_open(&insert_entry(9, 0, vec![1; 10])).unwrap();
        }

        // simulate a crash mid-append: a length prefix promising more bytes
        // than the file holds
        let file = OpenOptions::new().append(true).open(&path).unwrap();
        use std::io::Write;
        (&file).write_all(&500u32.to_le_bytes()).unwrap();
        (&file).write_all(&[0xAB; 10]).unwrap();
        file.sync_all().unwrap();

        let log = LogFile::open(&path).unwrap();
        let items = log.items().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].key.sequence, 0);
    }
}
