//! # Transaction Registry Interface
//!
//! The registry of in-flight transaction entries is an external
//! collaborator keyed by batch id: `Try` registers an entry, `Commit` and
//! `Rollback` find it again, and both deregister it when done. Sequence
//! numbers within a batch come from the registry so entry keys stay unique
//! across the entries of one batch.

use eyre::Result;

use crate::storage::wal::{ActionKind, TransactionEntry, TransactionEntryKey};
use crate::types::BatchId;

pub trait TransactionRegistry {
    /// Next sequence number for the batch, starting at 0.
    fn next_sequence(&mut self, batch_id: BatchId) -> u32;

    /// Registers a `Try`-phase entry under its key.
    fn register(&mut self, entry: TransactionEntry) -> Result<()>;

    /// Earliest registered entry of the batch with the given action kind
    /// that has not been completed, if any.
    fn find_open(&self, batch_id: BatchId, kind: ActionKind) -> Option<TransactionEntry>;

    /// Marks a registered entry completed. False when the key is unknown.
    fn mark_completed(&mut self, key: &TransactionEntryKey) -> bool;

    /// Removes a registered entry. False when the key is unknown.
    fn deregister(&mut self, key: &TransactionEntryKey) -> bool;
}
