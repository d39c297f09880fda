//! # File Handler
//!
//! One database on disk is a pair of files with the same stem: the page
//! container and the write-ahead log. `FileHandler` owns both and is the
//! unit the [`StorageManager`](super::storage_manager::StorageManager)
//! resolves by database id.

use std::fs;
use std::path::{Path, PathBuf};

use eyre::{Result, WrapErr};
use tracing::info;

use super::data_file::{DataFile, FileKind};
use super::wal::LogFile;
use crate::types::DatabaseId;

pub struct FileHandler {
    kind: FileKind,
    database_name: String,
    data: DataFile,
    log: LogFile,
}

impl FileHandler {
    /// Creates both files of a new database under `base_dir`.
    pub fn create(
        base_dir: &Path,
        database_name: &str,
        kind: FileKind,
        database_id: DatabaseId,
    ) -> Result<Self> {
        let data_path = file_path(base_dir, database_name, kind.data_extension());
        let log_path = file_path(base_dir, database_name, kind.log_extension());

        let data = DataFile::create(&data_path, kind, database_id)?;
        let log = LogFile::create(&log_path)?;

        info!(
            database = %database_id,
            name = database_name,
            kind = ?kind,
            "created database files"
        );

        Ok(Self {
            kind,
            database_name: database_name.to_string(),
            data,
            log,
        })
    }

    /// Opens the file pair of an existing database. The database id comes
    /// back out of the data file header; a missing log file is recreated
    /// empty (an empty log and no log carry the same information).
    pub fn open(base_dir: &Path, database_name: &str, kind: FileKind) -> Result<Self> {
        let data_path = file_path(base_dir, database_name, kind.data_extension());
        let log_path = file_path(base_dir, database_name, kind.log_extension());

        let data = DataFile::open(&data_path, kind)?;
        let log = if log_path.exists() {
            LogFile::open(&log_path)?
        } else {
            LogFile::create(&log_path)?
        };

        Ok(Self {
            kind,
            database_name: database_name.to_string(),
            data,
            log,
        })
    }

    pub fn database_id(&self) -> DatabaseId {
        self.data.database_id()
    }

    pub fn database_name(&self) -> &str {
        &self.database_name
    }

    pub fn kind(&self) -> FileKind {
        self.kind
    }

    pub fn data(&self) -> &DataFile {
        &self.data
    }

    pub fn log(&self) -> &LogFile {
        &self.log
    }

    /// Removes both files from disk. The handler must already be out of
    /// the manager's maps.
    pub fn remove_files(&self) -> Result<()> {
        fs::remove_file(self.data.path()).wrap_err_with(|| {
            format!(
                "failed to remove data file '{}'",
                self.data.path().display()
            )
        })?;
        fs::remove_file(self.log.path()).wrap_err_with(|| {
            format!("failed to remove log file '{}'", self.log.path().display())
        })?;

        info!(
            database = %self.database_id(),
            name = %self.database_name,
            "removed database files"
        );

        Ok(())
    }
}

fn file_path(base_dir: &Path, database_name: &str, extension: &str) -> PathBuf {
    base_dir.join(format!("{database_name}.{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_makes_both_files() {
        let dir = tempdir().unwrap();
        let id = DatabaseId::from_bytes([2; 16]);

        let handler = FileHandler::create(dir.path(), "orders", FileKind::Host, id).unwrap();

        assert!(dir.path().join("orders.keel").exists());
        assert!(dir.path().join("orders.klog").exists());
        assert_eq!(handler.database_id(), id);
        assert_eq!(handler.database_name(), "orders");
    }

    #[test]
    fn open_recovers_id_and_tolerates_missing_log() {
        let dir = tempdir().unwrap();
        let id = DatabaseId::from_bytes([3; 16]);
        FileHandler::create(dir.path(), "orders", FileKind::Host, id).unwrap();

        std::fs::remove_file(dir.path().join("orders.klog")).unwrap();

        let reopened = FileHandler::open(dir.path(), "orders", FileKind::Host).unwrap();
        assert_eq!(reopened.database_id(), id);
        assert!(dir.path().join("orders.klog").exists());
    }

    #[test]
    fn remove_files_deletes_the_pair() {
        let dir = tempdir().unwrap();
        let id = DatabaseId::from_bytes([4; 16]);
        let handler = FileHandler::create(dir.path(), "tmp", FileKind::Host, id).unwrap();

        handler.remove_files().unwrap();

        assert!(!dir.path().join("tmp.keel").exists());
        assert!(!dir.path().join("tmp.klog").exists());
    }
}
