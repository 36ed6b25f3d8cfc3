//! # Index Façade and Insertion Engine
//!
//! `BTreeIndex` owns the index file's pager and drives every operation:
//! opening or bulk-building the file, the recursive insert with split
//! propagation, root growth, and the scan façade over the engine in
//! `scan`.
//!
//! ## Insertion
//!
//! The recursive helper pins one node per level on the way down and
//! returns an optional [`Promotion`] on the way back up: `Some` exactly
//! when the child split, carrying the separator key and the new right
//! page. A non-full parent absorbs the promotion; a full parent splits in
//! turn. A promotion that escapes the root triggers root growth, the only
//! event that increases tree height.
//!
//! Leaf splits **copy** the separator up (the key stays in the right
//! leaf); interior splits **move** it up, leaving the left node one entry
//! larger, which is why the interior split index is biased one further
//! right than the leaf's.

use std::path::Path;

use eyre::{bail, ensure, Result};

use crate::config::{DEFAULT_PAGER_CAPACITY, INTERIOR_CAPACITY, LEAF_CAPACITY};
use crate::error::IndexError;
use crate::heap::{RecordId, RecordSource};
use crate::storage::{PageGuard, Pager, FIRST_PAGE};

use super::interior::InteriorNode;
use super::leaf::LeafNode;
use super::meta::IndexMeta;
use super::scan::{self, RangePredicate, ScanState};
use super::{node_kind, KeyType, NodeKind, ScanOp};

/// File name of the index over `relation`'s attribute at `key_offset`.
pub fn index_file_name(relation: &str, key_offset: u32) -> String {
    format!("{}.{}", relation, key_offset)
}

/// A separator escaping a split, to be inserted into the parent.
#[derive(Debug, Clone, Copy)]
struct Promotion {
    key: i32,
    right_page: u32,
}

/// Disk-resident B+Tree index over one `i32` attribute of a relation.
#[derive(Debug)]
pub struct BTreeIndex {
    pager: Pager,
    file_name: String,
    root_page: u32,
    scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Opens the index for `relation`'s attribute at `key_offset`, or
    /// builds it from `source` if the file does not exist yet.
    ///
    /// The index file is named `"{relation}.{key_offset}"` inside `dir`.
    /// When the file exists, its meta page must describe exactly the
    /// requested relation, offset, and key type; any mismatch fails with
    /// [`IndexError::BadIndexInfo`] and leaves the file untouched.
    pub fn open_or_build<S>(
        dir: &Path,
        relation: &str,
        key_offset: u32,
        key_type: KeyType,
        source: &mut S,
    ) -> Result<Self>
    where
        S: RecordSource + ?Sized,
    {
        ensure!(
            key_type == KeyType::Int32,
            "only 32-bit integer keys are supported"
        );

        let file_name = index_file_name(relation, key_offset);
        let path = dir.join(&file_name);

        if path.exists() {
            Self::open_existing(&path, file_name, relation, key_offset, key_type)
        } else {
            Self::build(&path, file_name, relation, key_offset, key_type, source)
        }
    }

    fn open_existing(
        path: &Path,
        file_name: String,
        relation: &str,
        key_offset: u32,
        key_type: KeyType,
    ) -> Result<Self> {
        let pager = Pager::open(path, DEFAULT_PAGER_CAPACITY)?;

        let root_page = {
            let meta_page = pager.fetch(FIRST_PAGE)?;
            let Ok(meta) = IndexMeta::from_page(meta_page.data()) else {
                bail!(IndexError::BadIndexInfo(file_name));
            };
            if !meta.describes(relation, key_offset, key_type) {
                bail!(IndexError::BadIndexInfo(file_name));
            }
            meta.root_page()
        };

        Ok(Self {
            pager,
            file_name,
            root_page,
            scan: None,
        })
    }

    fn build<S>(
        path: &Path,
        file_name: String,
        relation: &str,
        key_offset: u32,
        key_type: KeyType,
        source: &mut S,
    ) -> Result<Self>
    where
        S: RecordSource + ?Sized,
    {
        let pager = Pager::create(path, 1, DEFAULT_PAGER_CAPACITY)?;

        let (root_page, mut root) = pager.allocate()?;
        LeafNode::init(root.data_mut())?;
        drop(root);

        {
            let mut meta_page = pager.fetch(FIRST_PAGE)?;
            IndexMeta::init(meta_page.data_mut(), relation, key_offset, key_type, root_page)?;
        }

        let mut index = Self {
            pager,
            file_name,
            root_page,
            scan: None,
        };

        let mut records = 0u64;
        while let Some((rid, record)) = source.next_record()? {
            let key = key_from_record(&record, key_offset)?;
            index.insert_entry(key, rid)?;
            records += 1;
        }
        log::debug!("built index '{}' from {} records", index.file_name, records);

        index.flush()?;
        Ok(index)
    }

    /// Name of the index file, `"{relation}.{key_offset}"`.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Page id of the current root node.
    pub fn root_page(&self) -> u32 {
        self.root_page
    }

    /// The pager this index runs on. Exposed so callers can observe pin
    /// balance and page counts.
    pub fn pager(&self) -> &Pager {
        &self.pager
    }

    /// Inserts one `(key, rid)` entry, splitting nodes as needed.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        debug_assert!(!rid.is_nil(), "record id 0 is the free-slot sentinel");

        let root_page = self.root_page;
        let root = self.pager.fetch(root_page)?;
        let root_was_leaf = node_kind(root.data())? == NodeKind::Leaf;

        if let Some(promotion) = self.insert_into(root, key, rid)? {
            self.grow_root(root_page, root_was_leaf, promotion)?;
        }
        Ok(())
    }

    /// Recursive insert into the node pinned by `page`. Returns the
    /// promotion for the caller's level when this node split. The guard
    /// is consumed, so the node is unpinned exactly once on every path.
    fn insert_into(
        &self,
        mut page: PageGuard<'_>,
        key: i32,
        rid: RecordId,
    ) -> Result<Option<Promotion>> {
        match node_kind(page.data())? {
            NodeKind::Leaf => {
                let full = LeafNode::from_page(page.data())?.is_full();
                if !full {
                    LeafNode::from_page_mut(page.data_mut())?.insert(key, rid);
                    return Ok(None);
                }
                self.split_leaf(&mut page, key, rid).map(Some)
            }
            NodeKind::Interior => {
                let child = InteriorNode::from_page(page.data())?.child_for_insert(key);
                let child_page = self.pager.fetch(child)?;

                let Some(promotion) = self.insert_into(child_page, key, rid)? else {
                    return Ok(None);
                };

                let full = InteriorNode::from_page(page.data())?.is_full();
                if !full {
                    InteriorNode::from_page_mut(page.data_mut())?
                        .insert(promotion.key, promotion.right_page);
                    return Ok(None);
                }
                self.split_interior(&mut page, promotion).map(Some)
            }
        }
    }

    /// Splits the full leaf under `page`, placing `(key, rid)` into the
    /// correct half, and returns the copy-up promotion.
    fn split_leaf(&self, page: &mut PageGuard<'_>, key: i32, rid: RecordId) -> Result<Promotion> {
        let (new_page_no, mut new_page) = self.pager.allocate()?;
        let new_leaf = LeafNode::init(new_page.data_mut())?;
        let old_leaf = LeafNode::from_page_mut(page.data_mut())?;

        // Split point, biased toward the half the incoming key lands in
        // when the capacity is even.
        let mut mid = LEAF_CAPACITY / 2 - 1;
        if LEAF_CAPACITY % 2 == 0 && key >= old_leaf.key_at(mid) {
            mid += 1;
        }

        let mut slot = 0;
        for i in mid + 1..LEAF_CAPACITY {
            new_leaf.write_entry(slot, old_leaf.key_at(i), old_leaf.rid_at(i));
            old_leaf.clear_entry(i);
            slot += 1;
        }

        if key < old_leaf.key_at(mid) {
            old_leaf.insert(key, rid);
        } else {
            new_leaf.insert(key, rid);
        }

        new_leaf.set_right_sibling(old_leaf.right_sibling());
        old_leaf.set_right_sibling(new_page_no);

        // Copy-up: the separator is the right leaf's first key and stays
        // in that leaf.
        Ok(Promotion {
            key: new_leaf.key_at(0),
            right_page: new_page_no,
        })
    }

    /// Splits the full interior node under `page` while absorbing
    /// `promotion` from its child, and returns the push-up promotion.
    fn split_interior(
        &self,
        page: &mut PageGuard<'_>,
        promotion: Promotion,
    ) -> Result<Promotion> {
        let level = InteriorNode::from_page(page.data())?.level();
        let (new_page_no, mut new_page) = self.pager.allocate()?;
        let new_node = InteriorNode::init(new_page.data_mut(), level)?;
        let old_node = InteriorNode::from_page_mut(page.data_mut())?;

        // Same bias as the leaf split, then one more: the left half keeps
        // an extra key because the separator is lifted out of it.
        let mut mid = INTERIOR_CAPACITY / 2 - 1;
        if INTERIOR_CAPACITY % 2 == 0 && promotion.key >= old_node.key_at(mid) {
            mid += 1;
        }
        mid += 1;

        // Push-up: the separator leaves the node before the incoming
        // entry is routed, so the route comparison is against it.
        let separator = old_node.key_at(mid);
        old_node.clear_key(mid);

        let mut slot = 0;
        for i in mid + 1..INTERIOR_CAPACITY {
            new_node.write_key(slot, old_node.key_at(i));
            old_node.clear_key(i);
            slot += 1;
        }
        let mut slot = 0;
        for i in mid + 1..=INTERIOR_CAPACITY {
            new_node.set_child(slot, old_node.child_at(i));
            old_node.set_child(i, 0);
            slot += 1;
        }

        if promotion.key < separator {
            old_node.insert(promotion.key, promotion.right_page);
        } else {
            new_node.insert(promotion.key, promotion.right_page);
        }

        Ok(Promotion {
            key: separator,
            right_page: new_page_no,
        })
    }

    /// Installs a new root above the old one after a promotion escaped
    /// it, and rewrites the meta page's root pointer.
    fn grow_root(
        &mut self,
        old_root: u32,
        old_root_was_leaf: bool,
        promotion: Promotion,
    ) -> Result<()> {
        let (new_root_no, mut new_root) = self.pager.allocate()?;
        let node = InteriorNode::init(
            new_root.data_mut(),
            if old_root_was_leaf { 1 } else { 0 },
        )?;
        node.set_child(0, old_root);
        node.write_key(0, promotion.key);
        node.set_child(1, promotion.right_page);

        let mut meta_page = self.pager.fetch(FIRST_PAGE)?;
        IndexMeta::from_page_mut(meta_page.data_mut())?.set_root_page(new_root_no);

        self.root_page = new_root_no;
        Ok(())
    }

    /// Begins a range scan and positions on its first entry.
    ///
    /// Validates the operators and the range before touching any scan
    /// state, then ends a running scan, descends, and leaves the first
    /// matching leaf pinned. Fails with [`IndexError::NoSuchKeyFound`]
    /// when nothing matches.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> Result<()> {
        let pred = RangePredicate::validate(low, low_op, high, high_op)?;

        if let Some(state) = self.scan.take() {
            state.finish(&self.pager);
        }

        self.scan = Some(scan::begin(&self.pager, self.root_page, pred)?);
        Ok(())
    }

    /// Returns the record id of the next entry matching the scan.
    ///
    /// Fails with [`IndexError::ScanNotInitialized`] when no scan is
    /// live, and with [`IndexError::ScanCompleted`] once every match has
    /// been returned; the current leaf stays pinned until
    /// [`BTreeIndex::end_scan`].
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let Some(state) = self.scan.as_mut() else {
            bail!(IndexError::ScanNotInitialized);
        };
        state.next(&self.pager)
    }

    /// Ends the current scan, releasing its pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        let Some(state) = self.scan.take() else {
            bail!(IndexError::ScanNotInitialized);
        };
        state.finish(&self.pager);
        Ok(())
    }

    /// Writes every dirty page back to the index file and syncs it.
    pub fn flush(&mut self) -> Result<()> {
        self.pager.flush_all()
    }
}

impl Drop for BTreeIndex {
    fn drop(&mut self) {
        if let Some(state) = self.scan.take() {
            state.finish(&self.pager);
        }
        if let Err(err) = self.pager.flush_all() {
            log::warn!("failed to flush index '{}' on close: {:#}", self.file_name, err);
        }
    }
}

/// Reads the `i32` key attribute at `key_offset` out of a heap record.
fn key_from_record(record: &[u8], key_offset: u32) -> Result<i32> {
    let start = key_offset as usize;
    let end = start + 4;
    ensure!(
        end <= record.len(),
        "record of {} bytes has no 4-byte key at offset {}",
        record.len(),
        start
    );
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&record[start..end]);
    Ok(i32::from_le_bytes(buf))
}
