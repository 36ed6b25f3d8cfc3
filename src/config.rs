//! # Configuration Constants
//!
//! Every layout constant in larchdb derives from `PAGE_SIZE`. The derived
//! values are co-located here, with compile-time assertions tying them
//! together, so a change to the page size cannot leave a node capacity or a
//! header size behind.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> LEAF_CAPACITY      (PAGE_SIZE - leaf header) / leaf entry size
//!       │     One key (4B) plus one record id (6B) per entry; the leaf
//!       │     header carries the node tag and the right-sibling pointer.
//!       │
//!       └─> INTERIOR_CAPACITY  (PAGE_SIZE - interior header - extra child) / 8
//!             One key (4B) plus one child page id (4B) per separator, and
//!             one extra child slot for the leftmost subtree.
//!
//! DEFAULT_PAGER_CAPACITY (128 frames)
//!       │
//!       └─> MIN_PAGER_CAPACITY (8)
//!             A split that propagates to the root pins two nodes at the
//!             splitting level, one per ancestor level, and the meta page.
//!             Eight frames cover that footprint for any realistic height.
//! ```

/// Size of one page in bytes. A page is the unit of I/O and the unit of a
/// tree node.
pub const PAGE_SIZE: usize = 4096;

/// Bytes of leaf-node header: node tag, padding, right-sibling page id.
pub const LEAF_HEADER_SIZE: usize = 8;

/// Bytes per leaf entry: a 4-byte key and a 6-byte record id.
pub const LEAF_ENTRY_SIZE: usize = 10;

/// Number of (key, rid) entries a leaf node holds.
pub const LEAF_CAPACITY: usize = (PAGE_SIZE - LEAF_HEADER_SIZE) / LEAF_ENTRY_SIZE;

/// Bytes of interior-node header: node tag, level, padding.
pub const INTERIOR_HEADER_SIZE: usize = 4;

/// Bytes per interior separator: a 4-byte key and a 4-byte child page id.
pub const INTERIOR_ENTRY_SIZE: usize = 8;

/// Number of separator keys an interior node holds. The node carries one
/// more child pointer than keys, accounted for by the extra 4 bytes.
pub const INTERIOR_CAPACITY: usize =
    (PAGE_SIZE - INTERIOR_HEADER_SIZE - 4) / INTERIOR_ENTRY_SIZE;

/// Default number of page frames a pager keeps in memory.
pub const DEFAULT_PAGER_CAPACITY: usize = 128;

/// Smallest allowed pager capacity. Requested capacities below this are
/// clamped up.
pub const MIN_PAGER_CAPACITY: usize = 8;

const _: () = assert!(
    LEAF_HEADER_SIZE + LEAF_CAPACITY * LEAF_ENTRY_SIZE <= PAGE_SIZE,
    "leaf node layout must fit in one page"
);

const _: () = assert!(
    INTERIOR_HEADER_SIZE + INTERIOR_CAPACITY * 4 + (INTERIOR_CAPACITY + 1) * 4 <= PAGE_SIZE,
    "interior node layout must fit in one page"
);

const _: () = assert!(
    LEAF_CAPACITY >= 2 && INTERIOR_CAPACITY >= 2,
    "split arithmetic requires at least two entries per node"
);

const _: () = assert!(
    MIN_PAGER_CAPACITY >= 8,
    "a root-splitting insert pins up to eight pages at once"
);
