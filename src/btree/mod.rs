//! # B+Tree Index
//!
//! A disk-resident B+Tree mapping one 32-bit signed integer attribute of a
//! relation to the record ids of its tuples. Every node is exactly one
//! page; all I/O goes through the pager's pin/unpin protocol.
//!
//! ## File Layout
//!
//! ```text
//! page 1        meta page: magic, relation name, key offset and type,
//!               current root page id
//! page 2        the initial root, created as an empty leaf
//! page 3...     nodes allocated by splits, in allocation order
//! ```
//!
//! ## Node Format
//!
//! Byte 0 of every node page is a kind tag (1 = leaf, 2 = interior), so a
//! loaded page classifies itself. Occupancy is sentinel-driven: a leaf
//! slot is free when its record id has page number 0, an interior child
//! slot is free when it holds page id 0. Freed slots are zeroed, which is
//! why page id 0 is never allocated.
//!
//! - **Leaf**: sorted key array, parallel record-id array, and a
//!   right-sibling page id chaining all leaves in key order (0 ends the
//!   chain). Equal keys keep insertion order, which matches record-id
//!   order for bulk loads.
//! - **Interior**: sorted separator keys and one more child pointer than
//!   keys. `keys[i]` separates children whose keys are `< keys[i]` from
//!   those `>= keys[i]`. A `level` byte of 1 marks the lowest interior
//!   level, whose children are leaves.
//!
//! ## Operations
//!
//! - **Build**: [`BTreeIndex::open_or_build`] either validates an existing
//!   index file against the requested relation and key, or creates it and
//!   bulk-loads every record from a [`RecordSource`](crate::heap::RecordSource).
//! - **Insert**: recursive descent to the target leaf; a full node splits
//!   and hands its parent a promotion, a `(separator key, new right page)`
//!   pair. Leaf splits copy the separator up, interior splits move it up.
//!   A promotion escaping the root grows the tree by one level, the only
//!   way height increases.
//! - **Scan**: two phases. [`BTreeIndex::start_scan`] descends to the leaf
//!   holding the first match of an inclusive/exclusive range and leaves it
//!   pinned; [`BTreeIndex::scan_next`] sweeps the sibling chain one entry
//!   per call, keeping exactly one leaf pinned between calls until
//!   [`BTreeIndex::end_scan`] releases it.
//!
//! One index instance is single-threaded by contract; distinct indices are
//! independent.

mod interior;
mod leaf;
mod meta;
mod scan;
mod tree;

pub use interior::InteriorNode;
pub use leaf::LeafNode;
pub use meta::{IndexMeta, KeyType, RELATION_NAME_LEN};
pub use scan::ScanOp;
pub use tree::{index_file_name, BTreeIndex};

use eyre::{bail, ensure, Result};

/// Node tag stored at byte 0 of every leaf page.
pub(crate) const LEAF_TAG: u8 = 1;
/// Node tag stored at byte 0 of every interior page.
pub(crate) const INTERIOR_TAG: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Leaf,
    Interior,
}

/// Classifies a loaded node page by its kind tag.
pub(crate) fn node_kind(page: &[u8]) -> Result<NodeKind> {
    ensure!(!page.is_empty(), "empty node page");
    match page[0] {
        LEAF_TAG => Ok(NodeKind::Leaf),
        INTERIOR_TAG => Ok(NodeKind::Interior),
        tag => bail!("unknown node tag {}", tag),
    }
}
