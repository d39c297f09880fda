//! # Storage Module
//!
//! The on-disk half of KeelDB: page files, write-ahead logs, the in-memory
//! maps that index them, and the manager that routes every operation to the
//! right database's files.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │                StorageManager                 │   routes by DatabaseId
//! ├──────────────────────┬────────────────────────┤
//! │  FileHandler (db A)  │   FileHandler (db B)   │   one per database
//! ├──────────┬───────────┼───────────┬────────────┤
//! │ DataFile │  LogFile  │  DataFile │  LogFile   │   one lock per file
//! ├──────────┴───────────┴───────────┴────────────┤
//! │  PageMap / TransactionItemMap (lazy, by scan) │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! Data files are containers of fixed-size page frames; log files are
//! sequences of variable-length transaction records. Both rebuild their
//! in-memory index with a full linear scan; there is no checkpoint or
//! snapshot.
//!
//! ## Concurrency
//!
//! Every file is guarded by exactly one reader/writer lock: positioned
//! reads run concurrently, writes are exclusive. That is the only
//! concurrency control in this layer; nothing serializes two callers
//! driving the transaction protocol for the same logical row, which is a
//! documented responsibility of the layers above.
//!
//! ## Module Organization
//!
//! - [`page`]: frame headers and the data file header
//! - [`page_map`]: logical page identity → byte offset
//! - [`data_file`]: the page container (system and host kinds)
//! - [`wal`]: transaction entries, item map, and the log file
//! - [`file_handler`]: the data+log pair of one database
//! - [`storage_manager`]: the public boundary

pub mod data_file;
pub mod file_handler;
pub mod page;
pub mod page_map;
pub mod storage_manager;
pub mod wal;

pub use data_file::{DataFile, FileKind};
pub use file_handler::FileHandler;
pub use page::{DataPageType, PageFrameHeader, PageType};
pub use page_map::{PageItem, PageMap, PageMapKey};
pub use storage_manager::{StorageConfig, StorageManager};
pub use wal::{LogFile, TransactionEntry, TransactionEntryKey};
