//! # Identifier and Address Types
//!
//! Every on-disk object in KeelDB is located by a small fixed-width address.
//! Databases carry opaque 16-byte identifiers minted by the caller (the
//! catalog layer); tables, schemas, pages and rows use 32-bit integers.
//!
//! Addresses compose from the identifiers:
//!
//! ```text
//! TreeAddress  = (database, schema, table)            one table's page set
//! PageAddress  = TreeAddress + page                   one page
//! RowAddress   = (database, table, page, row)         one row
//! ```
//!
//! All identifier types are plain data and zerocopy-compatible so they can
//! be embedded directly into frame headers and WAL preambles.

use std::fmt;

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub type TableId = u32;
pub type PageId = u32;
pub type SchemaId = u32;
pub type RowId = u32;

/// Opaque 16-byte identifier of one database. Minted by the catalog layer;
/// this crate only stores and compares it.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, FromBytes, IntoBytes, Immutable, KnownLayout,
    Unaligned,
)]
pub struct DatabaseId([u8; 16]);

impl DatabaseId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    pub const fn nil() -> Self {
        Self([0; 16])
    }

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DatabaseId({self})")
    }
}

/// Opaque 16-byte identifier of one transaction batch. Minted by the layer
/// driving the transaction protocol; one batch groups the entries of one
/// logical transaction.
#[repr(transparent)]
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, Default, FromBytes, IntoBytes, Immutable, KnownLayout,
    Unaligned,
)]
pub struct BatchId([u8; 16]);

impl BatchId {
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BatchId({self})")
    }
}

/// Identifies the set of pages ("page tree") belonging to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TreeAddress {
    pub database_id: DatabaseId,
    pub schema_id: SchemaId,
    pub table_id: TableId,
}

impl TreeAddress {
    pub fn page(&self, page_id: PageId) -> PageAddress {
        PageAddress {
            database_id: self.database_id,
            schema_id: self.schema_id,
            table_id: self.table_id,
            page_id,
        }
    }

    pub fn row(&self, page_id: PageId, row_id: RowId) -> RowAddress {
        RowAddress {
            database_id: self.database_id,
            table_id: self.table_id,
            page_id,
            row_id,
        }
    }
}

/// Uniquely identifies one page on disk and in the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageAddress {
    pub database_id: DatabaseId,
    pub schema_id: SchemaId,
    pub table_id: TableId,
    pub page_id: PageId,
}

impl PageAddress {
    pub fn tree(&self) -> TreeAddress {
        TreeAddress {
            database_id: self.database_id,
            schema_id: self.schema_id,
            table_id: self.table_id,
        }
    }
}

/// Identifies one row; carried inside WAL action payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RowAddress {
    pub database_id: DatabaseId,
    pub table_id: TableId,
    pub page_id: PageId,
    pub row_id: RowId,
}
