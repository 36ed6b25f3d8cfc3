//! Fixed-length-record heap file.
//!
//! Page 1 is the header; data pages follow from page 2. A data page is a
//! `u16` record count followed by packed records. Records are never
//! deleted or moved, so a record id stays valid for the life of the file.

use std::path::Path;

use eyre::{ensure, Result};
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{DEFAULT_PAGER_CAPACITY, PAGE_SIZE};
use crate::storage::{parse_struct, parse_struct_mut, Pager, FIRST_PAGE};

use super::RecordId;

pub(crate) const HEAP_MAGIC: &[u8; 16] = b"LarchDB Heap\x00\x00\x00\x00";
pub(crate) const HEAP_VERSION: u32 = 1;

/// Bytes of data-page header: the little-endian record count.
pub(crate) const DATA_PAGE_HEADER_SIZE: usize = 2;

#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
struct HeapHeader {
    magic: [u8; 16],
    version: U32,
    record_len: U32,
    record_count: U64,
    last_page: U32,
    _reserved: [u8; 28],
}

const _: () = assert!(std::mem::size_of::<HeapHeader>() == 64);

impl HeapHeader {
    fn init(page: &mut [u8], record_len: u32) -> Result<&mut Self> {
        let header = parse_struct_mut::<Self>(page, "HeapHeader")?;
        header.magic = *HEAP_MAGIC;
        header.version = U32::new(HEAP_VERSION);
        header.record_len = U32::new(record_len);
        header.record_count = U64::new(0);
        header.last_page = U32::new(0);
        Ok(header)
    }

    fn from_page(page: &[u8]) -> Result<&Self> {
        let header = parse_struct::<Self>(page, "HeapHeader")?;
        ensure!(&header.magic == HEAP_MAGIC, "not a heap file");
        ensure!(
            header.version.get() == HEAP_VERSION,
            "unsupported heap file version {}",
            header.version.get()
        );
        Ok(header)
    }

    fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        let header = parse_struct_mut::<Self>(page, "HeapHeader")?;
        ensure!(&header.magic == HEAP_MAGIC, "not a heap file");
        Ok(header)
    }
}

pub struct HeapFile {
    pager: Pager,
    record_len: usize,
    records_per_page: usize,
}

impl HeapFile {
    pub fn create<P: AsRef<Path>>(path: P, record_len: usize) -> Result<Self> {
        ensure!(
            record_len > 0 && record_len <= PAGE_SIZE - DATA_PAGE_HEADER_SIZE,
            "record length {} must be between 1 and {}",
            record_len,
            PAGE_SIZE - DATA_PAGE_HEADER_SIZE
        );

        let pager = Pager::create(path, 1, DEFAULT_PAGER_CAPACITY)?;
        {
            let mut header_page = pager.fetch(FIRST_PAGE)?;
            HeapHeader::init(header_page.data_mut(), record_len as u32)?;
        }
        pager.flush_all()?;

        Ok(Self {
            pager,
            record_len,
            records_per_page: (PAGE_SIZE - DATA_PAGE_HEADER_SIZE) / record_len,
        })
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let pager = Pager::open(path, DEFAULT_PAGER_CAPACITY)?;
        let record_len = {
            let header_page = pager.fetch(FIRST_PAGE)?;
            HeapHeader::from_page(header_page.data())?.record_len.get() as usize
        };

        Ok(Self {
            pager,
            record_len,
            records_per_page: (PAGE_SIZE - DATA_PAGE_HEADER_SIZE) / record_len,
        })
    }

    pub fn record_len(&self) -> usize {
        self.record_len
    }

    pub fn record_count(&self) -> Result<u64> {
        let header_page = self.pager.fetch(FIRST_PAGE)?;
        Ok(HeapHeader::from_page(header_page.data())?.record_count.get())
    }

    /// Appends one record and returns its id. The id's page number is a
    /// data page, so it is always >= 2.
    pub fn append(&mut self, record: &[u8]) -> Result<RecordId> {
        ensure!(
            record.len() == self.record_len,
            "record of {} bytes does not match the file record length {}",
            record.len(),
            self.record_len
        );

        let last_page = {
            let header_page = self.pager.fetch(FIRST_PAGE)?;
            HeapHeader::from_page(header_page.data())?.last_page.get()
        };

        let rid = match self.try_append_to(last_page, record)? {
            Some(rid) => rid,
            None => {
                let (page_no, mut page) = self.pager.allocate()?;
                write_record(page.data_mut(), 0, record);
                set_record_count(page.data_mut(), 1);
                RecordId::new(page_no, 0)
            }
        };

        let mut header_page = self.pager.fetch(FIRST_PAGE)?;
        let header = HeapHeader::from_page_mut(header_page.data_mut())?;
        header.record_count = U64::new(header.record_count.get() + 1);
        header.last_page = U32::new(rid.page_no());

        Ok(rid)
    }

    fn try_append_to(&self, page_no: u32, record: &[u8]) -> Result<Option<RecordId>> {
        if page_no == 0 {
            return Ok(None);
        }
        let mut page = self.pager.fetch(page_no)?;
        let count = record_count(page.data());
        if count as usize >= self.records_per_page {
            return Ok(None);
        }
        write_record(page.data_mut(), count, record);
        set_record_count(page.data_mut(), count + 1);
        Ok(Some(RecordId::new(page_no, count)))
    }

    /// Copies one record out of the file.
    pub fn get(&self, rid: RecordId) -> Result<Vec<u8>> {
        ensure!(!rid.is_nil(), "nil record id");
        let page = self.pager.fetch(rid.page_no())?;
        let count = record_count(page.data());
        ensure!(
            rid.slot_no() < count,
            "slot {} out of bounds on page {} ({} records)",
            rid.slot_no(),
            rid.page_no(),
            count
        );
        let offset = DATA_PAGE_HEADER_SIZE + rid.slot_no() as usize * self.record_len;
        Ok(page.data()[offset..offset + self.record_len].to_vec())
    }

    pub fn scan(&self) -> super::HeapScan<'_> {
        super::HeapScan::new(self)
    }

    pub fn flush(&self) -> Result<()> {
        self.pager.flush_all()
    }

    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    pub(crate) fn records_per_page(&self) -> usize {
        self.records_per_page
    }
}

pub(crate) fn record_count(page: &[u8]) -> u16 {
    u16::from_le_bytes([page[0], page[1]])
}

fn set_record_count(page: &mut [u8], count: u16) {
    page[..DATA_PAGE_HEADER_SIZE].copy_from_slice(&count.to_le_bytes());
}

fn write_record(page: &mut [u8], slot: u16, record: &[u8]) {
    let offset = DATA_PAGE_HEADER_SIZE + slot as usize * record.len();
    page[offset..offset + record.len()].copy_from_slice(record);
}
