//! # Participant Interface
//!
//! Rows owned by a remote participant take a parallel insert path: the
//! participant must durably accept the row before any local cache or log
//! step runs, and a rejection aborts the whole operation with no local WAL
//! entry created. The network transport behind this trait is someone
//! else's concern.

use eyre::Result;

use crate::types::RowAddress;

/// Where a row's authoritative copy lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLocation {
    Local,
    Remote,
}

pub trait ParticipantLink {
    /// Offers the row to the remote participant. `Ok(false)` is a
    /// rejection; transport failures are errors.
    fn save_row_remote(&mut self, address: &RowAddress, row: &[u8]) -> Result<bool>;
}
