//! # Transaction Entry Codec
//!
//! One WAL record captures one attempted mutation with enough payload to
//! redo or undo it: the row images for inserts/updates/deletes, or the
//! schema plus every existing page for a table drop.
//!
//! ## Record Layout
//!
//! ```text
//! +-------------+------------------+---------------------+-------------------+
//! | length (4B) | preamble (32B)   | action payload      | user name payload |
//! |             |                  | (4B len + bytes)    | (4B len + bytes)  |
//! +-------------+------------------+---------------------+-------------------+
//! ```
//!
//! `length` covers everything after itself. The preamble is fixed-size so a
//! recovery scan can decode a record's identity and flags, then skip the
//! variable payloads from the length prefix alone.
//!
//! ## Preamble Layout (32 bytes, layout v1)
//!
//! ```text
//! Offset  Size  Field         Description
//! ------  ----  ------------  ----------------------------------------
//! 0       16    batch_id      Transaction batch this entry belongs to
//! 16      4     sequence      Position within the batch
//! 20      4     action_kind   InsertRow / UpdateRow / DeleteRow / DropTable
//! 24      1     is_completed  Patched in place on commit
//! 25      1     is_deleted    Patched in place on rollback
//! 26      6     reserved      Zero
//! ```
//!
//! The two flag bytes are the only fields ever rewritten inside an existing
//! record; their offsets are published in [`v1`] so the patch never has to
//! re-parse the record.

use eyre::{bail, ensure, eyre, Result, WrapErr};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::WAL_PREAMBLE_SIZE;
use crate::storage::page::DataPageType;
use crate::types::{BatchId, DatabaseId, PageAddress, RowAddress, TreeAddress};

/// Byte offsets of the preamble fields, layout version 1. Offsets are
/// relative to the start of the record body (after the length prefix).
pub mod v1 {
    pub const BATCH_ID_OFFSET: usize = 0;
    pub const SEQUENCE_OFFSET: usize = 16;
    pub const ACTION_KIND_OFFSET: usize = 20;
    pub const IS_COMPLETED_OFFSET: usize = 24;
    pub const IS_DELETED_OFFSET: usize = 25;
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    InsertRow = 1,
    UpdateRow = 2,
    DeleteRow = 3,
    DropTable = 4,
}

impl ActionKind {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(ActionKind::InsertRow),
            2 => Ok(ActionKind::UpdateRow),
            3 => Ok(ActionKind::DeleteRow),
            4 => Ok(ActionKind::DropTable),
            other => bail!("unknown transaction action kind: {other}"),
        }
    }
}

/// Unique identity of one logged mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionEntryKey {
    pub batch_id: BatchId,
    pub sequence: u32,
    pub action_kind: ActionKind,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TransactionPreamble {
    batch_id: BatchId,
    sequence: U32,
    action_kind: U32,
    is_completed: u8,
    is_deleted: u8,
    reserved: [u8; 6],
}

const _: () = assert!(std::mem::size_of::<TransactionPreamble>() == WAL_PREAMBLE_SIZE);

impl TransactionPreamble {
    pub fn new(key: TransactionEntryKey, is_completed: bool, is_deleted: bool) -> Self {
        Self {
            batch_id: key.batch_id,
            sequence: U32::new(key.sequence),
            action_kind: U32::new(key.action_kind as u32),
            is_completed: if is_completed { 1 } else { 0 },
            is_deleted: if is_deleted { 1 } else { 0 },
            reserved: [0; 6],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= WAL_PREAMBLE_SIZE,
            "buffer too small for TransactionPreamble: {} < {}",
            bytes.len(),
            WAL_PREAMBLE_SIZE
        );

        Self::ref_from_bytes(&bytes[..WAL_PREAMBLE_SIZE])
            .map_err(|e| eyre!("failed to read TransactionPreamble: {:?}", e))
    }

    pub fn key(&self) -> Result<TransactionEntryKey> {
        Ok(TransactionEntryKey {
            batch_id: self.batch_id,
            sequence: self.sequence.get(),
            action_kind: ActionKind::from_u32(self.action_kind.get())?,
        })
    }

    pub fn is_completed(&self) -> bool {
        self.is_completed != 0
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted != 0
    }
}

/// One page captured in full for a table drop, so a rollback can put the
/// tree back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPage {
    pub address: PageAddress,
    pub data_page_type: DataPageType,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionAction {
    InsertRow {
        address: RowAddress,
        row: Vec<u8>,
    },
    UpdateRow {
        address: RowAddress,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    DeleteRow {
        address: RowAddress,
        row: Vec<u8>,
    },
    DropTable {
        tree: TreeAddress,
        schema: Vec<u8>,
        pages: Vec<CapturedPage>,
    },
}

impl TransactionAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            TransactionAction::InsertRow { .. } => ActionKind::InsertRow,
            TransactionAction::UpdateRow { .. } => ActionKind::UpdateRow,
            TransactionAction::DeleteRow { .. } => ActionKind::DeleteRow,
            TransactionAction::DropTable { .. } => ActionKind::DropTable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEntry {
    pub batch_id: BatchId,
    pub sequence: u32,
    pub action: TransactionAction,
    pub user_name: String,
    pub is_completed: bool,
    pub is_deleted: bool,
}

impl TransactionEntry {
    pub fn new(
        batch_id: BatchId,
        sequence: u32,
        action: TransactionAction,
        user_name: impl Into<String>,
    ) -> Self {
        Self {
            batch_id,
            sequence,
            action,
            user_name: user_name.into(),
            is_completed: false,
            is_deleted: false,
        }
    }

    pub fn key(&self) -> TransactionEntryKey {
        TransactionEntryKey {
            batch_id: self.batch_id,
            sequence: self.sequence,
            action_kind: self.action.kind(),
        }
    }

    /// Serializes the record body: preamble, then the two length-prefixed
    /// variable payloads. The on-disk record is this body preceded by its
    /// `u32` length.
    pub fn encode_body(&self) -> Vec<u8> {
        let action = encode_action(&self.action);

        let mut body =
            Vec::with_capacity(WAL_PREAMBLE_SIZE + 8 + action.len() + self.user_name.len());
        let preamble = TransactionPreamble::new(self.key(), self.is_completed, self.is_deleted);
        body.extend_from_slice(preamble.as_bytes());
        put_blob(&mut body, &action);
        put_blob(&mut body, self.user_name.as_bytes());
        body
    }

    pub fn decode_body(bytes: &[u8]) -> Result<Self> {
        let preamble = TransactionPreamble::from_bytes(bytes)?;
        let key = preamble.key()?;

        let mut reader = ByteReader::new(&bytes[WAL_PREAMBLE_SIZE..]);
        let action_bytes = reader.read_blob().wrap_err("truncated action payload")?;
        let action = decode_action(key.action_kind, action_bytes)?;

        let user_bytes = reader.read_blob().wrap_err("truncated user name payload")?;
        let user_name = String::from_utf8(user_bytes.to_vec())
            .wrap_err("transaction entry user name is not valid UTF-8")?;

        Ok(Self {
            batch_id: key.batch_id,
            sequence: key.sequence,
            action,
            user_name,
            is_completed: preamble.is_completed(),
            is_deleted: preamble.is_deleted(),
        })
    }
}

fn encode_action(action: &TransactionAction) -> Vec<u8> {
    let mut buf = Vec::new();
    match action {
        TransactionAction::InsertRow { address, row } => {
            put_row_address(&mut buf, address);
            put_blob(&mut buf, row);
        }
        TransactionAction::UpdateRow {
            address,
            before,
            after,
        } => {
            put_row_address(&mut buf, address);
            put_blob(&mut buf, before);
            put_blob(&mut buf, after);
        }
        TransactionAction::DeleteRow { address, row } => {
            put_row_address(&mut buf, address);
            put_blob(&mut buf, row);
        }
        TransactionAction::DropTable {
            tree,
            schema,
            pages,
        } => {
            put_tree_address(&mut buf, tree);
            put_blob(&mut buf, schema);
            put_u32(&mut buf, pages.len() as u32);
            for page in pages {
                put_page_address(&mut buf, &page.address);
                put_u32(&mut buf, page.data_page_type as u32);
                put_blob(&mut buf, &page.bytes);
            }
        }
    }
    buf
}

fn decode_action(kind: ActionKind, bytes: &[u8]) -> Result<TransactionAction> {
    let mut reader = ByteReader::new(bytes);
    let action = match kind {
        ActionKind::InsertRow => TransactionAction::InsertRow {
            address: reader.read_row_address()?,
            row: reader.read_blob()?.to_vec(),
        },
        ActionKind::UpdateRow => TransactionAction::UpdateRow {
            address: reader.read_row_address()?,
            before: reader.read_blob()?.to_vec(),
            after: reader.read_blob()?.to_vec(),
        },
        ActionKind::DeleteRow => TransactionAction::DeleteRow {
            address: reader.read_row_address()?,
            row: reader.read_blob()?.to_vec(),
        },
        ActionKind::DropTable => {
            let tree = reader.read_tree_address()?;
            let schema = reader.read_blob()?.to_vec();
            let count = reader.read_u32()?;
            let mut pages = Vec::with_capacity(count as usize);
            for _ in 0..count {
                let address = reader.read_page_address()?;
                let data_page_type = DataPageType::from_u32(reader.read_u32()?)?;
                let bytes = reader.read_blob()?.to_vec();
                pages.push(CapturedPage {
                    address,
                    data_page_type,
                    bytes,
                });
            }
            TransactionAction::DropTable {
                tree,
                schema,
                pages,
            }
        }
    };

    ensure!(
        reader.is_empty(),
        "trailing bytes after {:?} action payload",
        kind
    );
    Ok(action)
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_blob(buf: &mut Vec<u8>, bytes: &[u8]) {
    put_u32(buf, bytes.len() as u32);
    buf.extend_from_slice(bytes);
}

fn put_row_address(buf: &mut Vec<u8>, address: &RowAddress) {
    buf.extend_from_slice(address.database_id.as_bytes());
    put_u32(buf, address.table_id);
    put_u32(buf, address.page_id);
    put_u32(buf, address.row_id);
}

fn put_tree_address(buf: &mut Vec<u8>, address: &TreeAddress) {
    buf.extend_from_slice(address.database_id.as_bytes());
    put_u32(buf, address.schema_id);
    put_u32(buf, address.table_id);
}

fn put_page_address(buf: &mut Vec<u8>, address: &PageAddress) {
    buf.extend_from_slice(address.database_id.as_bytes());
    put_u32(buf, address.schema_id);
    put_u32(buf, address.table_id);
    put_u32(buf, address.page_id);
}

struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos == self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        ensure!(
            self.pos + n <= self.buf.len(),
            "truncated transaction entry payload: wanted {} bytes, {} remain",
            n,
            self.buf.len() - self.pos
        );
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_blob(&mut self) -> Result<&'a [u8]> {
        let len = self.read_u32()? as usize;
        self.take(len)
    }

    fn read_database_id(&mut self) -> Result<DatabaseId> {
        let bytes = self.take(16)?;
        let mut id = [0u8; 16];
        id.copy_from_slice(bytes);
        Ok(DatabaseId::from_bytes(id))
    }

    fn read_row_address(&mut self) -> Result<RowAddress> {
        Ok(RowAddress {
            database_id: self.read_database_id()?,
            table_id: self.read_u32()?,
            page_id: self.read_u32()?,
            row_id: self.read_u32()?,
        })
    }

    fn read_tree_address(&mut self) -> Result<TreeAddress> {
        Ok(TreeAddress {
            database_id: self.read_database_id()?,
            schema_id: self.read_u32()?,
            table_id: self.read_u32()?,
        })
    }

    fn read_page_address(&mut self) -> Result<PageAddress> {
        Ok(PageAddress {
            database_id: self.read_database_id()?,
            schema_id: self.read_u32()?,
            table_id: self.read_u32()?,
            page_id: self.read_u32()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(byte: u8) -> BatchId {
        BatchId::from_bytes([byte; 16])
    }

    fn db(byte: u8) -> DatabaseId {
        DatabaseId::from_bytes([byte; 16])
    }

    #[test]
    fn preamble_size_is_32_bytes() {
        assert_eq!(std::mem::size_of::<TransactionPreamble>(), 32);
    }

    #[test]
    fn preamble_flags_sit_at_v1_offsets() {
        let key = TransactionEntryKey {
            batch_id: batch(9),
            sequence: 3,
            action_kind: ActionKind::UpdateRow,
        };
        let preamble = TransactionPreamble::new(key, true, false);
        let bytes = preamble.as_bytes();

        assert_eq!(&bytes[v1::BATCH_ID_OFFSET..v1::BATCH_ID_OFFSET + 16], batch(9).as_bytes());
        assert_eq!(
            &bytes[v1::SEQUENCE_OFFSET..v1::SEQUENCE_OFFSET + 4],
            &3u32.to_le_bytes()
        );
        assert_eq!(
            &bytes[v1::ACTION_KIND_OFFSET..v1::ACTION_KIND_OFFSET + 4],
            &2u32.to_le_bytes()
        );
        assert_eq!(bytes[v1::IS_COMPLETED_OFFSET], 1);
        assert_eq!(bytes[v1::IS_DELETED_OFFSET], 0);
    }

    #[test]
    fn insert_entry_roundtrip() {
        let address = RowAddress {
            database_id: db(1),
            table_id: 4,
            page_id: 2,
            row_id: 77,
        };
        let entry = TransactionEntry::new(
            batch(5),
            0,
            TransactionAction::InsertRow {
                address,
                row: vec![1, 2, 3, 4],
            },
            "alice",
        );

        let body = entry.encode_body();
        let decoded = TransactionEntry::decode_body(&body).unwrap();

        assert_eq!(decoded, entry);
        assert_eq!(decoded.key().action_kind, ActionKind::InsertRow);
    }

    #[test]
    fn update_entry_keeps_both_images() {
        let address = RowAddress {
            database_id: db(2),
            table_id: 1,
            page_id: 1,
            row_id: 8,
        };
        let entry = TransactionEntry::new(
            batch(1),
            2,
            TransactionAction::UpdateRow {
                address,
                before: vec![0xAA; 64],
                after: vec![0xBB; 32],
            },
            "bob",
        );

        let decoded = TransactionEntry::decode_body(&entry.encode_body()).unwrap();
        match decoded.action {
            TransactionAction::UpdateRow { before, after, .. } => {
                assert_eq!(before, vec![0xAA; 64]);
                assert_eq!(after, vec![0xBB; 32]);
            }
            other => panic!("expected UpdateRow, got {other:?}"),
        }
    }

    #[test]
    fn drop_table_entry_captures_pages() {
        let tree = TreeAddress {
            database_id: db(3),
            schema_id: 1,
            table_id: 6,
        };
        let pages = vec![
            CapturedPage {
                address: tree.page(1),
                data_page_type: DataPageType::User,
                bytes: vec![1; 128],
            },
            CapturedPage {
                address: tree.page(2),
                data_page_type: DataPageType::User,
                bytes: vec![2; 128],
            },
        ];
        let entry = TransactionEntry::new(
            batch(3),
            1,
            TransactionAction::DropTable {
                tree,
                schema: b"CREATE TABLE t (id INT)".to_vec(),
                pages,
            },
            "carol",
        );

        let decoded = TransactionEntry::decode_body(&entry.encode_body()).unwrap();
        match decoded.action {
            TransactionAction::DropTable { pages, .. } => {
                assert_eq!(pages.len(), 2);
                assert_eq!(pages[1].address, tree.page(2));
            }
            other => panic!("expected DropTable, got {other:?}"),
        }
    }

    #[test]
    fn truncated_body_is_rejected() {
        let entry = TransactionEntry::new(
            batch(4),
            0,
            TransactionAction::DeleteRow {
                address: RowAddress {
                    database_id: db(4),
                    table_id: 2,
                    page_id: 3,
                    row_id: 1,
                },
                row: vec![9; 32],
            },
            "dave",
        );

        let body = entry.encode_body();
        assert!(TransactionEntry::decode_body(&body[..body.len() - 4]).is_err());
    }

    #[test]
    fn unknown_action_kind_is_rejected() {
        assert!(ActionKind::from_u32(0).is_err());
        assert!(ActionKind::from_u32(99).is_err());
    }
}
