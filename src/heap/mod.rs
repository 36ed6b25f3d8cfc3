//! # Heap Files
//!
//! A heap file stores the fixed-length records of a relation and hands out
//! [`RecordId`]s for them. The index never interprets a record beyond
//! reading its key attribute at a byte offset; the heap's job here is to
//! feed bulk index construction through [`RecordSource`] and to guarantee
//! that every record id carries a nonzero page number (data pages start at
//! page 2), which the leaf format relies on for its free-slot sentinel.

mod file;
mod scan;

pub use file::HeapFile;
pub use scan::{HeapScan, RecordSource};

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Locates one record in a heap file: the data page holding it and the
/// slot within that page.
///
/// Stored verbatim inside index leaf nodes. A record id with page number 0
/// can never refer to a real record and doubles as the leaf free-slot
/// sentinel.
#[repr(C)]
#[derive(
    Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct RecordId {
    page_no: U32,
    slot_no: U16,
}

const _: () = assert!(std::mem::size_of::<RecordId>() == 6);

impl RecordId {
    pub fn new(page_no: u32, slot_no: u16) -> Self {
        Self {
            page_no: U32::new(page_no),
            slot_no: U16::new(slot_no),
        }
    }

    pub fn page_no(&self) -> u32 {
        self.page_no.get()
    }

    pub fn slot_no(&self) -> u16 {
        self.slot_no.get()
    }

    /// True for the zeroed value that marks a free leaf slot.
    pub fn is_nil(&self) -> bool {
        self.page_no.get() == 0
    }
}

impl PartialOrd for RecordId {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RecordId {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.page_no(), self.slot_no()).cmp(&(other.page_no(), other.slot_no()))
    }
}

impl std::fmt::Debug for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.page_no(), self.slot_no())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ids_order_by_page_then_slot() {
        let a = RecordId::new(2, 9);
        let b = RecordId::new(3, 0);
        let c = RecordId::new(3, 1);

        assert!(a < b);
        assert!(b < c);
        assert_eq!(a, RecordId::new(2, 9));
    }

    #[test]
    fn zeroed_record_id_is_nil() {
        assert!(RecordId::new(0, 0).is_nil());
        assert!(RecordId::new(0, 7).is_nil());
        assert!(!RecordId::new(2, 0).is_nil());
    }
}
