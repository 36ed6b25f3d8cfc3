//! # Persistence Tests
//!
//! Flush-on-close durability: an index built, closed, and reopened must
//! reproduce every entry, and reopening must validate the meta page
//! against the requested relation and key.

use larchdb::{BTreeIndex, HeapFile, IndexError, KeyType, RecordId, RecordSource, ScanOp};

const RECORD_LEN: usize = 12;
const KEY_OFFSET: u32 = 8;

struct NoRecords;

impl RecordSource for NoRecords {
    fn next_record(&mut self) -> eyre::Result<Option<(RecordId, Vec<u8>)>> {
        Ok(None)
    }
}

fn record_with_key(key: i32) -> Vec<u8> {
    let mut record = vec![0u8; RECORD_LEN];
    record[KEY_OFFSET as usize..KEY_OFFSET as usize + 4].copy_from_slice(&key.to_le_bytes());
    record
}

fn full_scan(index: &mut BTreeIndex) -> Vec<RecordId> {
    index
        .start_scan(i32::MIN, ScanOp::Gte, i32::MAX, ScanOp::Lte)
        .unwrap();
    let mut rids = Vec::new();
    while let Ok(rid) = index.scan_next() {
        rids.push(rid);
    }
    index.end_scan().unwrap();
    rids
}

#[test]
fn reopen_reproduces_all_entries_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let n = 5000;

    let mut heap = HeapFile::create(dir.path().join("employees.rel"), RECORD_LEN).unwrap();
    let mut expected = Vec::new();
    for key in 0..n {
        let rid = heap.append(&record_with_key(key)).unwrap();
        expected.push(rid);
    }

    // Build, then drop: the destructor flushes.
    {
        let mut scan = heap.scan();
        BTreeIndex::open_or_build(dir.path(), "employees", KEY_OFFSET, KeyType::Int32, &mut scan)
            .unwrap();
    }

    // Reopen: the source must not be consulted.
    let mut index = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap();

    let rids = full_scan(&mut index);
    assert_eq!(rids.len(), n as usize);
    assert_eq!(rids, expected);
}

#[test]
fn inserts_after_reopen_land_in_the_same_tree() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut index = BTreeIndex::open_or_build(
            dir.path(),
            "employees",
            KEY_OFFSET,
            KeyType::Int32,
            &mut NoRecords,
        )
        .unwrap();
        index.insert_entry(1, RecordId::new(2, 0)).unwrap();
        index.insert_entry(3, RecordId::new(2, 1)).unwrap();
    }

    let mut index = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap();
    index.insert_entry(2, RecordId::new(2, 2)).unwrap();

    let rids = full_scan(&mut index);
    assert_eq!(
        rids,
        [RecordId::new(2, 0), RecordId::new(2, 2), RecordId::new(2, 1)]
    );
}

#[test]
fn grown_root_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let n = larchdb::config::LEAF_CAPACITY as i32 * 4;

    let root_before = {
        let mut index = BTreeIndex::open_or_build(
            dir.path(),
            "employees",
            KEY_OFFSET,
            KeyType::Int32,
            &mut NoRecords,
        )
        .unwrap();
        for key in 0..n {
            index.insert_entry(key, RecordId::new(2, (key % 100) as u16)).unwrap();
        }
        index.root_page()
    };

    let mut index = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap();

    assert_eq!(index.root_page(), root_before);
    assert_eq!(full_scan(&mut index).len(), n as usize);
}

#[test]
fn reopen_with_wrong_relation_name_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut index = BTreeIndex::open_or_build(
            dir.path(),
            "employees",
            KEY_OFFSET,
            KeyType::Int32,
            &mut NoRecords,
        )
        .unwrap();
        index.insert_entry(1, RecordId::new(2, 0)).unwrap();
    }

    // Same file name on disk, different recorded relation.
    std::fs::rename(
        dir.path().join("employees.8"),
        dir.path().join("departments.8"),
    )
    .unwrap();

    let err = BTreeIndex::open_or_build(
        dir.path(),
        "departments",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap_err();

    assert_eq!(
        err.downcast_ref::<IndexError>(),
        Some(&IndexError::BadIndexInfo("departments.8".into()))
    );
}

#[test]
fn reopen_with_wrong_key_offset_is_rejected() {
    let dir = tempfile::tempdir().unwrap();

    {
        BTreeIndex::open_or_build(
            dir.path(),
            "employees",
            KEY_OFFSET,
            KeyType::Int32,
            &mut NoRecords,
        )
        .unwrap();
    }

    // Present the same file as if it indexed a different byte offset.
    std::fs::rename(
        dir.path().join("employees.8"),
        dir.path().join("employees.0"),
    )
    .unwrap();

    let err =
        BTreeIndex::open_or_build(dir.path(), "employees", 0, KeyType::Int32, &mut NoRecords)
            .unwrap_err();

    assert_eq!(
        err.downcast_ref::<IndexError>(),
        Some(&IndexError::BadIndexInfo("employees.0".into()))
    );
}

#[test]
fn garbage_file_is_rejected_as_bad_index_info() {
    let dir = tempfile::tempdir().unwrap();
    let page_size = larchdb::config::PAGE_SIZE;
    std::fs::write(dir.path().join("employees.8"), vec![0x5Au8; page_size * 2]).unwrap();

    let err = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap_err();

    assert_eq!(
        err.downcast_ref::<IndexError>(),
        Some(&IndexError::BadIndexInfo("employees.8".into()))
    );
}

#[test]
fn explicit_flush_makes_state_durable() {
    let dir = tempfile::tempdir().unwrap();

    let mut index = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap();
    index.insert_entry(11, RecordId::new(3, 1)).unwrap();
    index.flush().unwrap();

    // Skip the destructor: the explicit flush alone must have made the
    // entry durable. The leaked pager is reclaimed when the test exits.
    std::mem::forget(index);

    let mut reopened = BTreeIndex::open_or_build(
        dir.path(),
        "employees",
        KEY_OFFSET,
        KeyType::Int32,
        &mut NoRecords,
    )
    .unwrap();
    assert_eq!(full_scan(&mut reopened), [RecordId::new(3, 1)]);
}
