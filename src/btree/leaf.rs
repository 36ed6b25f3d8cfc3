//! # Leaf Nodes
//!
//! A leaf holds up to [`LEAF_CAPACITY`] `(key, record id)` entries in two
//! parallel arrays, sorted ascending by key, plus the right-sibling page
//! id that chains all leaves for range scans.
//!
//! Occupancy is sentinel-driven: slot `i` is free exactly when
//! `rids[i].page_no == 0`. Entries always occupy a prefix of the arrays,
//! so the count is the index past the last occupied slot, found by a
//! reverse scan. Insertion shifts the tail right one slot; equal keys land
//! after existing equals, preserving insertion order.

use eyre::{ensure, Result};
use zerocopy::little_endian::{I32, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{LEAF_CAPACITY, LEAF_HEADER_SIZE, PAGE_SIZE};
use crate::heap::RecordId;
use crate::storage::{parse_struct, parse_struct_mut};

use super::LEAF_TAG;

/// On-disk layout of one leaf page.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct LeafNode {
    kind: u8,
    _reserved: [u8; 3],
    right_sibling: U32,
    keys: [I32; LEAF_CAPACITY],
    rids: [RecordId; LEAF_CAPACITY],
}

const _: () = assert!(std::mem::size_of::<LeafNode>() == LEAF_HEADER_SIZE + LEAF_CAPACITY * 10);
const _: () = assert!(std::mem::size_of::<LeafNode>() <= PAGE_SIZE);

impl LeafNode {
    /// Formats a fresh page as an empty leaf with no right sibling.
    pub fn init(page: &mut [u8]) -> Result<&mut Self> {
        let size = std::mem::size_of::<Self>();
        ensure!(page.len() >= size, "page too small for a leaf node");
        page[..size].fill(0);
        let node = parse_struct_mut::<Self>(page, "LeafNode")?;
        node.kind = LEAF_TAG;
        Ok(node)
    }

    pub fn from_page(page: &[u8]) -> Result<&Self> {
        let node = parse_struct::<Self>(page, "LeafNode")?;
        ensure!(node.kind == LEAF_TAG, "page is not a leaf node");
        Ok(node)
    }

    pub fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        let node = parse_struct_mut::<Self>(page, "LeafNode")?;
        ensure!(node.kind == LEAF_TAG, "page is not a leaf node");
        Ok(node)
    }

    /// Page id of the next leaf in key order, 0 at the end of the chain.
    pub fn right_sibling(&self) -> u32 {
        self.right_sibling.get()
    }

    pub fn set_right_sibling(&mut self, page_no: u32) {
        self.right_sibling = U32::new(page_no);
    }

    pub fn key_at(&self, slot: usize) -> i32 {
        self.keys[slot].get()
    }

    pub fn rid_at(&self, slot: usize) -> RecordId {
        self.rids[slot]
    }

    pub fn slot_is_free(&self, slot: usize) -> bool {
        self.rids[slot].is_nil()
    }

    /// Number of occupied slots, found by reverse scan for the last
    /// non-free sentinel.
    pub fn entry_count(&self) -> usize {
        let mut i = LEAF_CAPACITY;
        while i > 0 && self.slot_is_free(i - 1) {
            i -= 1;
        }
        i
    }

    pub fn is_full(&self) -> bool {
        !self.slot_is_free(LEAF_CAPACITY - 1)
    }

    /// Sorted insertion into a non-full leaf: shift every entry with a
    /// greater key one slot right, then write the new entry. A new key
    /// equal to existing keys goes after them.
    pub fn insert(&mut self, key: i32, rid: RecordId) {
        debug_assert!(!self.is_full(), "insert into full leaf");
        debug_assert!(!rid.is_nil(), "record id 0 is the free-slot sentinel");

        if self.slot_is_free(0) {
            self.write_entry(0, key, rid);
            return;
        }

        let mut i = self.entry_count();
        while i > 0 && self.key_at(i - 1) > key {
            let (k, r) = (self.keys[i - 1], self.rids[i - 1]);
            self.keys[i] = k;
            self.rids[i] = r;
            i -= 1;
        }
        self.write_entry(i, key, rid);
    }

    pub(crate) fn write_entry(&mut self, slot: usize, key: i32, rid: RecordId) {
        self.keys[slot] = I32::new(key);
        self.rids[slot] = rid;
    }

    /// Zeroes a slot, restoring the free sentinel.
    pub(crate) fn clear_entry(&mut self, slot: usize) {
        self.keys[slot] = I32::new(0);
        self.rids[slot] = RecordId::new(0, 0);
    }
}
