//! # Page Frame Headers
//!
//! Every `PAGE_SIZE` frame in a data file begins with a 40-byte header that
//! identifies the page and its owner. Frame 0 is the file-header frame: it
//! carries the same 40-byte header (with [`PageType::FileHeader`]) followed
//! by the 128-byte [`DataFileHeader`] in its body, so a raw scan can decode
//! every frame of the file uniformly.
//!
//! ## Frame Header Layout (40 bytes, layout v1)
//!
//! ```text
//! Offset  Size  Field           Description
//! ------  ----  --------------  ----------------------------------------
//! 0       4     page_id         Page number within the owning table
//! 4       4     page_type       FileHeader or Data
//! 8       4     data_page_type  User or System (Data frames only)
//! 12      4     table_id        Owning table
//! 16      16    database_id     Owning database
//! 32      1     is_deleted      Logical deletion flag
//! 33      7     reserved        Zero
//! ```
//!
//! The byte offsets are published in [`v1`] and must never change for this
//! layout version; a future layout gets a `v2` module.
//!
//! ## File Header Layout (128 bytes, frame 0 body)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       16    magic        "KeelDB Pages" + NULs
//! 16      4     version      On-disk layout version
//! 20      4     page_size    Frame size this file was written with
//! 24      16    database_id  Owning database (recovered on bootstrap)
//! 40      8     flags        Reserved
//! 48      80    reserved     Zero
//! ```

use eyre::{bail, ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{
    DATA_FILE_HEADER_SIZE, LAYOUT_VERSION, PAGE_FRAME_HEADER_SIZE, PAGE_SIZE,
};
use crate::types::{DatabaseId, PageId, TableId};

pub const DATA_FILE_MAGIC: &[u8; 16] = b"KeelDB Pages\x00\x00\x00\x00";

/// Byte offsets of the frame header fields, layout version 1.
pub mod v1 {
    pub const PAGE_ID_OFFSET: usize = 0;
    pub const PAGE_TYPE_OFFSET: usize = 4;
    pub const DATA_PAGE_TYPE_OFFSET: usize = 8;
    pub const TABLE_ID_OFFSET: usize = 12;
    pub const DATABASE_ID_OFFSET: usize = 16;
    pub const IS_DELETED_OFFSET: usize = 32;
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    FileHeader = 1,
    Data = 2,
}

impl PageType {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(PageType::FileHeader),
            2 => Ok(PageType::Data),
            other => bail!("unknown page type: {other}"),
        }
    }
}

#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataPageType {
    User = 1,
    System = 2,
}

impl DataPageType {
    pub fn from_u32(value: u32) -> Result<Self> {
        match value {
            1 => Ok(DataPageType::User),
            2 => Ok(DataPageType::System),
            other => bail!("unknown data page type: {other}"),
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct PageFrameHeader {
    page_id: U32,
    page_type: U32,
    data_page_type: U32,
    table_id: U32,
    database_id: DatabaseId,
    is_deleted: u8,
    reserved: [u8; 7],
}

const _: () = assert!(std::mem::size_of::<PageFrameHeader>() == PAGE_FRAME_HEADER_SIZE);

impl PageFrameHeader {
    pub fn new(
        page_id: PageId,
        page_type: PageType,
        data_page_type: Option<DataPageType>,
        table_id: TableId,
        database_id: DatabaseId,
        is_deleted: bool,
    ) -> Self {
        Self {
            page_id: U32::new(page_id),
            page_type: U32::new(page_type as u32),
            data_page_type: U32::new(data_page_type.map_or(0, |t| t as u32)),
            table_id: U32::new(table_id),
            database_id,
            is_deleted: if is_deleted { 1 } else { 0 },
            reserved: [0; 7],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= PAGE_FRAME_HEADER_SIZE,
            "buffer too small for PageFrameHeader: {} < {}",
            bytes.len(),
            PAGE_FRAME_HEADER_SIZE
        );

        Self::ref_from_bytes(&bytes[..PAGE_FRAME_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read PageFrameHeader: {:?}", e))
    }

    pub fn write_to(&self, bytes: &mut [u8]) -> Result<()> {
        ensure!(
            bytes.len() >= PAGE_FRAME_HEADER_SIZE,
            "buffer too small for PageFrameHeader: {} < {}",
            bytes.len(),
            PAGE_FRAME_HEADER_SIZE
        );

        bytes[..PAGE_FRAME_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn page_id(&self) -> PageId {
        self.page_id.get()
    }

    pub fn page_type(&self) -> Result<PageType> {
        PageType::from_u32(self.page_type.get())
    }

    pub fn data_page_type(&self) -> Result<DataPageType> {
        DataPageType::from_u32(self.data_page_type.get())
    }

    pub fn table_id(&self) -> TableId {
        self.table_id.get()
    }

    pub fn database_id(&self) -> DatabaseId {
        self.database_id
    }

    pub fn is_deleted(&self) -> bool {
        self.is_deleted != 0
    }

    pub fn set_is_deleted(&mut self, deleted: bool) {
        self.is_deleted = if deleted { 1 } else { 0 };
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DataFileHeader {
    magic: [u8; 16],
    version: U32,
    page_size: U32,
    database_id: DatabaseId,
    flags: U64,
    reserved: [u8; 80],
}

const _: () = assert!(std::mem::size_of::<DataFileHeader>() == DATA_FILE_HEADER_SIZE);

impl DataFileHeader {
    pub fn new(database_id: DatabaseId) -> Self {
        Self {
            magic: *DATA_FILE_MAGIC,
            version: U32::new(LAYOUT_VERSION),
            page_size: U32::new(PAGE_SIZE as u32),
            database_id,
            flags: U64::new(0),
            reserved: [0; 80],
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        ensure!(
            bytes.len() >= DATA_FILE_HEADER_SIZE,
            "buffer too small for DataFileHeader: {} < {}",
            bytes.len(),
            DATA_FILE_HEADER_SIZE
        );

        let header = Self::ref_from_bytes(&bytes[..DATA_FILE_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read DataFileHeader: {:?}", e))?;

        ensure!(
            &header.magic == DATA_FILE_MAGIC,
            "invalid magic bytes in data file"
        );

        ensure!(
            header.version.get() == LAYOUT_VERSION,
            "unsupported data file layout version: {} (expected {})",
            header.version.get(),
            LAYOUT_VERSION
        );

        Ok(header)
    }

    pub fn version(&self) -> u32 {
        self.version.get()
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.get()
    }

    pub fn database_id(&self) -> DatabaseId {
        self.database_id
    }
}

/// Builds the complete frame 0 image for a new data file.
pub fn file_header_frame(database_id: DatabaseId) -> Vec<u8> {
    let mut frame = vec![0u8; PAGE_SIZE];

    let frame_header = PageFrameHeader::new(0, PageType::FileHeader, None, 0, database_id, false);
    frame[..PAGE_FRAME_HEADER_SIZE].copy_from_slice(frame_header.as_bytes());

    let file_header = DataFileHeader::new(database_id);
    frame[PAGE_FRAME_HEADER_SIZE..PAGE_FRAME_HEADER_SIZE + DATA_FILE_HEADER_SIZE]
        .copy_from_slice(file_header.as_bytes());

    frame
}

/// Builds an empty user data frame for the given address.
pub fn empty_user_frame(
    database_id: DatabaseId,
    table_id: TableId,
    page_id: PageId,
) -> Vec<u8> {
    let mut frame = vec![0u8; PAGE_SIZE];
    let header = PageFrameHeader::new(
        page_id,
        PageType::Data,
        Some(DataPageType::User),
        table_id,
        database_id,
        false,
    );
    frame[..PAGE_FRAME_HEADER_SIZE].copy_from_slice(header.as_bytes());
    frame
}
