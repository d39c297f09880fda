//! # Write-Ahead Log
//!
//! Durability log for the transaction protocol. Each database owns one log
//! file holding a sequence of variable-length records:
//!
//! ```text
//! +--------+----------+--------+------+--------+----------+--------+------+
//! | length | preamble | action | user | length | preamble | action | user |
//! +--------+----------+--------+------+--------+----------+--------+------+
//! ```
//!
//! Records are append-oriented: a record is written once and afterwards
//! only its two flag bytes (`is_completed`, `is_deleted`) are patched in
//! place. Nothing is ever physically removed, so open entries survive any
//! crash and are recoverable by rescanning the file.
//!
//! - [`entry`]: the record codec (preamble, action payloads, user name)
//! - [`map`]: the in-memory index over records
//! - [`log_file`]: the file itself (logging, flag patching, recovery scan)

pub mod entry;
pub mod log_file;
pub mod map;

pub use entry::{
    ActionKind, CapturedPage, TransactionAction, TransactionEntry, TransactionEntryKey,
    TransactionPreamble,
};
pub use log_file::LogFile;
pub use map::{TransactionItem, TransactionItemMap};
