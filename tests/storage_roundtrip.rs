//! Storage manager round-trip behavior through the public boundary:
//! write-then-read fidelity, offset stability across lookups, page id
//! allocation, and bootstrap from an existing directory.

use keeldb::config::{PAGE_FRAME_HEADER_SIZE, PAGE_SIZE};
use keeldb::storage::page::{empty_user_frame, DataPageType, PageType};
use keeldb::types::{DatabaseId, TreeAddress};
use keeldb::{StorageConfig, StorageManager};
use tempfile::tempdir;

fn id(byte: u8) -> DatabaseId {
    DatabaseId::from_bytes([byte; 16])
}

fn tree(db: DatabaseId, table: u32) -> TreeAddress {
    TreeAddress {
        database_id: db,
        schema_id: 1,
        table_id: table,
    }
}

fn frame_with_payload(db: DatabaseId, table: u32, page: u32, payload: &[u8]) -> Vec<u8> {
    let mut frame = empty_user_frame(db, table, page);
    frame[PAGE_FRAME_HEADER_SIZE..PAGE_FRAME_HEADER_SIZE + payload.len()]
        .copy_from_slice(payload);
    frame
}

#[test]
fn last_write_wins_for_every_address() {
    let dir = tempdir().unwrap();
    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    manager.create_host_database("orders", id(1)).unwrap();

    let t = tree(id(1), 5);
    let address = t.page(1);

    for fill in [0x01u8, 0x02, 0x03] {
        let frame = frame_with_payload(id(1), 5, 1, &[fill; 256]);
        manager
            .save_page(&address, &frame, PageType::Data, DataPageType::User, false)
            .unwrap();

        let read = manager.get_page(&address).unwrap().unwrap();
        assert_eq!(read, frame, "read bytes must equal the last write");
    }
}

#[test]
fn lookups_do_not_move_pages() {
    let dir = tempdir().unwrap();
    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    manager.create_host_database("orders", id(1)).unwrap();

    let t = tree(id(1), 3);
    for page_id in 1..=3u32 {
        let frame = frame_with_payload(id(1), 3, page_id, &[page_id as u8; 64]);
        manager
            .save_page(&t.page(page_id), &frame, PageType::Data, DataPageType::User, false)
            .unwrap();
    }

    let first = manager.get_page(&t.page(2)).unwrap().unwrap();
    for _ in 0..5 {
        let again = manager.get_page(&t.page(2)).unwrap().unwrap();
        assert_eq!(first, again);
    }

    // file never grew from reads
    let file_len = std::fs::metadata(dir.path().join("orders.keel")).unwrap().len();
    assert_eq!(file_len, 4 * PAGE_SIZE as u64);
}

#[test]
fn max_page_id_moves_from_zero_to_one_after_first_write() {
    let dir = tempdir().unwrap();
    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    manager.create_host_database("fresh", id(2)).unwrap();

    let t = tree(id(2), 5);
    assert_eq!(manager.max_page_id(&t).unwrap(), 0);

    let frame = empty_user_frame(id(2), 5, 1);
    manager
        .save_page(&t.page(1), &frame, PageType::Data, DataPageType::User, false)
        .unwrap();

    assert_eq!(manager.max_page_id(&t).unwrap(), 1);
}

#[test]
fn unknown_pages_read_as_absent_not_as_errors() {
    let dir = tempdir().unwrap();
    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    manager.create_host_database("orders", id(3)).unwrap();

    assert!(manager.get_page(&tree(id(3), 9).page(1)).unwrap().is_none());
}

#[test]
fn deleted_pages_stay_indexed_but_are_not_served_to_scans() {
    let dir = tempdir().unwrap();
    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    manager.create_host_database("orders", id(4)).unwrap();

    let t = tree(id(4), 2);
    let frame = empty_user_frame(id(4), 2, 1);
    manager
        .save_page(&t.page(1), &frame, PageType::Data, DataPageType::User, true)
        .unwrap();

    // still counted in the map
    assert_eq!(manager.total_pages_for(&t).unwrap(), 1);
    // but the unloaded-page search skips it
    assert!(manager
        .get_any_unloaded_user_page(&t, &[])
        .unwrap()
        .is_none());
}

#[test]
fn restart_sees_the_same_data() {
    let dir = tempdir().unwrap();
    let t = tree(id(5), 7);
    let frame = frame_with_payload(id(5), 7, 1, b"survives restart");

    {
        let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
        manager.create_host_database("durable", id(5)).unwrap();
        manager
            .save_page(&t.page(1), &frame, PageType::Data, DataPageType::User, false)
            .unwrap();
    }

    let manager = StorageManager::new(StorageConfig::new(dir.path())).unwrap();
    assert_eq!(manager.load_existing().unwrap(), 1);

    let read = manager.get_page(&t.page(1)).unwrap().unwrap();
    assert_eq!(read, frame);
    assert_eq!(manager.database_names().unwrap(), vec!["durable"]);
}
