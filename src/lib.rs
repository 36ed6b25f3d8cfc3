//! # larchdb
//!
//! A disk-resident B+Tree secondary index over a single 32-bit integer
//! attribute of a heap-file relation. The index maps keys to record ids,
//! the `(page, slot)` locations of tuples in a separately managed heap
//! file, and supports bulk construction from a relation, single-entry
//! insertion with split propagation, and forward range scans under
//! composed comparison operators.
//!
//! ## Quick Start
//!
//! ```ignore
//! use larchdb::{BTreeIndex, HeapFile, KeyType, ScanOp};
//!
//! // A relation whose records carry an i32 at byte offset 4.
//! let mut heap = HeapFile::create(dir.join("employees.rel"), 16)?;
//! for record in records {
//!     heap.append(&record)?;
//! }
//!
//! // Build (or reopen) the index over that attribute.
//! let mut scan = heap.scan();
//! let mut index = BTreeIndex::open_or_build(&dir, "employees", 4, KeyType::Int32, &mut scan)?;
//!
//! // Every rid with 100 < key <= 500, in key order.
//! index.start_scan(100, ScanOp::Gt, 500, ScanOp::Lte)?;
//! while let Ok(rid) = index.scan_next() {
//!     println!("{:?}", rid);
//! }
//! index.end_scan()?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │        BTreeIndex (btree)          │   lifecycle, insert, scan
//! ├──────────────────┬─────────────────┤
//! │  node codecs     │  heap files     │   zerocopy page layouts
//! │  (leaf/interior) │  (records+rids) │
//! ├──────────────────┴─────────────────┤
//! │          Pager (storage)           │   pin/unpin, dirty, eviction
//! ├────────────────────────────────────┤
//! │         PageFile (storage)         │   mmap'd pages, grow, sync
//! └────────────────────────────────────┘
//! ```
//!
//! Single-threaded per index by contract; durability is flush-on-close
//! plus explicit [`BTreeIndex::flush`].

pub mod btree;
pub mod config;
pub mod error;
pub mod heap;
pub mod storage;

pub use btree::{index_file_name, BTreeIndex, IndexMeta, KeyType, ScanOp};
pub use error::IndexError;
pub use heap::{HeapFile, HeapScan, RecordId, RecordSource};
pub use storage::{PageFile, PageGuard, Pager, FIRST_PAGE};
