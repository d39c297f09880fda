//! # Storage Constants
//!
//! All sizes and names that define the on-disk formats live here. Constants
//! that depend on each other are co-located so a change to one forces a look
//! at the others.
//!
//! ```text
//! PAGE_SIZE (16384 bytes)
//!       │
//!       ├─> PAGE_FRAME_HEADER_SIZE (40 bytes, every frame)
//!       │
//!       ├─> PAGE_USABLE_SIZE (derived: PAGE_SIZE - PAGE_FRAME_HEADER_SIZE)
//!       │
//!       └─> DATA_FILE_HEADER_SIZE (128 bytes, frame 0 body)
//!             Lives at offset PAGE_FRAME_HEADER_SIZE inside frame 0, so
//!             PAGE_FRAME_HEADER_SIZE + DATA_FILE_HEADER_SIZE must fit in
//!             one frame.
//!
//! WAL_PREAMBLE_SIZE (32 bytes per record)
//!       │
//!       └─> WAL_LENGTH_PREFIX_SIZE (4 bytes)
//!             A record is [length prefix][preamble][variable payloads];
//!             the length prefix covers everything after itself, so the
//!             smallest record body is the preamble plus the two payload
//!             length fields.
//! ```
//!
//! ## Layout Versioning
//!
//! Every byte offset into a frame header or WAL preamble is published in a
//! `v1` module next to the struct that owns it (`storage::page::v1`,
//! `storage::wal::entry::v1`). `LAYOUT_VERSION` is stamped into each data
//! file header and checked on open; a future `v2` layout gets its own offset
//! module rather than editing `v1`.

/// Size of one on-disk page frame. The atomic unit of storage and caching.
pub const PAGE_SIZE: usize = 16384;

/// Size of the header at the start of every frame, including frame 0.
pub const PAGE_FRAME_HEADER_SIZE: usize = 40;

/// Bytes available to page payload after the frame header.
pub const PAGE_USABLE_SIZE: usize = PAGE_SIZE - PAGE_FRAME_HEADER_SIZE;

/// Size of the file header stored in the body of frame 0 of each data file.
pub const DATA_FILE_HEADER_SIZE: usize = 128;

/// On-disk layout version stamped into data file headers.
pub const LAYOUT_VERSION: u32 = 1;

/// Size of the fixed preamble at the start of every WAL record body.
pub const WAL_PREAMBLE_SIZE: usize = 32;

/// Size of the length prefix preceding every WAL record body.
pub const WAL_LENGTH_PREFIX_SIZE: usize = 4;

/// Data file extension for host (user) databases.
pub const HOST_DATA_EXTENSION: &str = "keel";

/// Log file extension for host (user) databases.
pub const HOST_LOG_EXTENSION: &str = "klog";

/// Data file extension for system databases.
pub const SYSTEM_DATA_EXTENSION: &str = "ksys";

/// Log file extension for system databases.
pub const SYSTEM_LOG_EXTENSION: &str = "kslg";

const _: () = assert!(PAGE_USABLE_SIZE == PAGE_SIZE - PAGE_FRAME_HEADER_SIZE);
const _: () = assert!(PAGE_FRAME_HEADER_SIZE + DATA_FILE_HEADER_SIZE <= PAGE_SIZE);
const _: () = assert!(PAGE_SIZE % 4096 == 0);
