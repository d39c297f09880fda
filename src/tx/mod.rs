//! # Transaction Protocol
//!
//! The four-mode contract that lets any row or schema mutation run either
//! immediately or as a recoverable attempt-then-commit-or-rollback
//! sequence.
//!
//! ## Modes
//!
//! The mode is chosen per call; it is not long-lived state.
//!
//! - **None**: mutate the in-memory page cache and persist the affected
//!   page immediately. No WAL entry is written.
//! - **Try**: mutate the cache, capture enough payload to redo or undo
//!   the change, register the entry with the transaction registry and
//!   append it to the WAL. The mutated page is *not* persisted yet.
//! - **Commit**: find the registered entry, mark it completed, persist
//!   the already-mutated page, close the WAL record, deregister.
//! - **Rollback**: find the registered entry, reverse the in-memory
//!   mutation from the captured before-image, mark the WAL record deleted,
//!   deregister.
//!
//! A commit or rollback that finds no matching open entry is a no-op and
//! reports failure without raising. `TransactionMode` is a closed enum, so
//! the unconditional failure an unrecognized mode must produce is enforced
//! at compile time: such a mode cannot be constructed.
//!
//! ## Collaborators
//!
//! This module drives three collaborators it does not implement:
//!
//! - [`PageTreeCache`](cache::PageTreeCache): the in-memory page tree
//!   cache holding rows and pages;
//! - [`TransactionRegistry`](registry::TransactionRegistry): the entry
//!   registry keyed by batch id, with sequence numbering;
//! - [`ParticipantLink`](participant::ParticipantLink): the remote party
//!   that must durably accept a participant-owned row before any local
//!   step runs.

pub mod cache;
pub mod participant;
pub mod protocol;
pub mod registry;

pub use cache::{CacheAddRowResult, PageTreeCache};
pub use participant::{ParticipantLink, RowLocation};
pub use protocol::{TableOps, TransactionRequest};
pub use registry::TransactionRegistry;

/// Which phase of the durable-mutation protocol a call performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    None,
    Try,
    Commit,
    Rollback,
}
