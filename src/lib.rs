//! # KeelDB Storage Core
//!
//! KeelDB is the transactional page storage engine of an embeddable
//! relational database: the on-disk page file format, the write-ahead log,
//! the in-memory maps that index both, and the four-mode
//! (`None`/`Try`/`Commit`/`Rollback`) protocol that lets every row or
//! schema mutation run either immediately or as a recoverable
//! attempt-then-commit-or-rollback sequence.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │   SQL / catalog / contract layers (extern)  │
//! ├─────────────────────────────────────────────┤
//! │     Transaction Protocol (tx::TableOps)     │──> page tree cache,
//! ├─────────────────────────────────────────────┤    entry registry,
//! │       StorageManager (public boundary)      │    participant link
//! ├──────────────────────┬──────────────────────┤    (traits, consumed)
//! │  FileHandler per db  │  FileHandler per db  │
//! ├───────────┬──────────┼───────────┬──────────┤
//! │ DataFile  │ LogFile  │ DataFile  │ LogFile  │
//! │ + PageMap │ + TxMap  │ + PageMap │ + TxMap  │
//! └───────────┴──────────┴───────────┴──────────┘
//! ```
//!
//! The storage manager is the only boundary the rest of the system calls:
//! database lifecycle, page save/get, and WAL open/close/remove all route
//! through it by database id. The page-tree cache and the transaction
//! registry are consumed through traits in [`tx`]; this crate never
//! implements them.
//!
//! ## Durability Model
//!
//! A page write is not atomic with respect to anything else. Mutations
//! that need durability before visibility go through the protocol's `Try`
//! mode, which logs intent (with before-images for undo) to the WAL before
//! any page is persisted. Recovery never replays automatically: open WAL
//! entries are rediscovered by a full linear scan and resolved by explicit
//! commit or rollback. There is no checkpoint.
//!
//! ## Concurrency
//!
//! Worker threads may call in concurrently. The only synchronization is
//! one reader/writer lock per data file and one per log file; nothing
//! serializes two callers driving the protocol for the same logical row.
//! All I/O is synchronous and blocking, and the full-file scans (page map
//! rebuild, WAL recovery, unloaded-page search) run on the calling thread.
//!
//! ## Module Overview
//!
//! - [`config`]: page sizes, layout version, file extensions
//! - [`types`]: identifiers and addresses
//! - [`storage`]: data files, WAL, file handlers, storage manager
//! - [`tx`]: the four-mode transaction protocol and collaborator traits

pub mod config;
pub mod storage;
pub mod tx;
pub mod types;

pub use storage::{StorageConfig, StorageManager};
pub use tx::{TableOps, TransactionMode, TransactionRequest};
pub use types::{BatchId, DatabaseId, PageAddress, RowAddress, TreeAddress};
