//! Sequential record scanning.
//!
//! Bulk index construction drains a [`RecordSource`]; the trait is the
//! seam between the index and whatever produces the relation's records.
//! `Ok(None)` signals end of relation.

use eyre::Result;

use crate::storage::FIRST_PAGE;

use super::file::{record_count, DATA_PAGE_HEADER_SIZE};
use super::{HeapFile, RecordId};

/// A producer of `(record id, record bytes)` pairs in storage order.
pub trait RecordSource {
    /// Returns the next record, or `Ok(None)` once the relation is
    /// exhausted.
    fn next_record(&mut self) -> Result<Option<(RecordId, Vec<u8>)>>;
}

/// Sequential scanner over every record of a [`HeapFile`].
pub struct HeapScan<'a> {
    heap: &'a HeapFile,
    page_no: u32,
    slot: u16,
}

impl<'a> HeapScan<'a> {
    pub(crate) fn new(heap: &'a HeapFile) -> Self {
        Self {
            heap,
            page_no: FIRST_PAGE + 1,
            slot: 0,
        }
    }
}

impl RecordSource for HeapScan<'_> {
    fn next_record(&mut self) -> Result<Option<(RecordId, Vec<u8>)>> {
        loop {
            if self.page_no > self.heap.pager().page_count() {
                return Ok(None);
            }

            let page = self.heap.pager().fetch(self.page_no)?;
            let count = record_count(page.data());

            if self.slot < count {
                let record_len = self.heap.record_len();
                let offset = DATA_PAGE_HEADER_SIZE + self.slot as usize * record_len;
                let bytes = page.data()[offset..offset + record_len].to_vec();
                let rid = RecordId::new(self.page_no, self.slot);
                self.slot += 1;
                return Ok(Some((rid, bytes)));
            }

            self.page_no += 1;
            self.slot = 0;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn scan_yields_records_in_append_order() {
        let dir = tempdir().unwrap();
        let mut heap = HeapFile::create(dir.path().join("emp.rel"), 4).unwrap();

        let mut expected = Vec::new();
        for i in 0..100i32 {
            let record = i.to_le_bytes();
            let rid = heap.append(&record).unwrap();
            expected.push((rid, record.to_vec()));
        }

        let mut scan = heap.scan();
        let mut seen = Vec::new();
        while let Some(entry) = scan.next_record().unwrap() {
            seen.push(entry);
        }

        assert_eq!(seen, expected);
    }

    #[test]
    fn scan_of_empty_heap_ends_immediately() {
        let dir = tempdir().unwrap();
        let heap = HeapFile::create(dir.path().join("emp.rel"), 4).unwrap();

        let mut scan = heap.scan();
        assert!(scan.next_record().unwrap().is_none());
    }

    #[test]
    fn scan_crosses_page_boundaries() {
        let dir = tempdir().unwrap();
        let record_len = 1000;
        let mut heap = HeapFile::create(dir.path().join("emp.rel"), record_len).unwrap();
        let per_page = heap.records_per_page();

        let total = per_page * 2 + 1;
        for i in 0..total {
            heap.append(&vec![(i % 251) as u8; record_len]).unwrap();
        }

        let mut scan = heap.scan();
        let mut n = 0;
        while let Some((rid, bytes)) = scan.next_record().unwrap() {
            assert!(rid.page_no() >= 2);
            assert_eq!(bytes[0], (n % 251) as u8);
            n += 1;
        }
        assert_eq!(n, total);
    }
}
