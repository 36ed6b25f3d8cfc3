//! # Range Scans
//!
//! A scan runs in two phases. `begin` descends from the root to the leaf
//! holding the first entry inside the range and leaves that leaf pinned.
//! `ScanState::next` then sweeps forward one entry per call, following the
//! sibling chain, keeping exactly one leaf pinned between calls; `finish`
//! releases it. Because leaves are sorted and the sweep starts at the low
//! boundary, the first entry past the high bound ends the scan.

use eyre::{bail, Result};

use crate::config::LEAF_CAPACITY;
use crate::error::IndexError;
use crate::heap::RecordId;
use crate::storage::Pager;

use super::interior::InteriorNode;
use super::leaf::LeafNode;
use super::{node_kind, NodeKind};

/// Comparison operator for one side of a scan range. The low bound admits
/// `Gt`/`Gte`, the high bound `Lt`/`Lte`; anything else fails validation
/// with [`IndexError::BadOpcodes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// A validated four-sided range predicate.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RangePredicate {
    low: i32,
    high: i32,
    low_op: ScanOp,
    high_op: ScanOp,
}

impl RangePredicate {
    /// Checks the operator sets and the range orientation before any scan
    /// state exists.
    pub(crate) fn validate(low: i32, low_op: ScanOp, high: i32, high_op: ScanOp) -> Result<Self> {
        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte) || !matches!(high_op, ScanOp::Lt | ScanOp::Lte)
        {
            bail!(IndexError::BadOpcodes);
        }
        if low > high {
            bail!(IndexError::BadScanRange);
        }
        Ok(Self {
            low,
            high,
            low_op,
            high_op,
        })
    }

    pub(crate) fn low(&self) -> i32 {
        self.low
    }

    pub(crate) fn matches(&self, key: i32) -> bool {
        let above_low = match self.low_op {
            ScanOp::Gt => key > self.low,
            _ => key >= self.low,
        };
        let below_high = match self.high_op {
            ScanOp::Lt => key < self.high,
            _ => key <= self.high,
        };
        above_low && below_high
    }

    /// True once `key` is beyond the high bound; later keys cannot match.
    pub(crate) fn past_high(&self, key: i32) -> bool {
        match self.high_op {
            ScanOp::Lt => key >= self.high,
            _ => key > self.high,
        }
    }
}

/// Live scan position: the pinned leaf and the slot to evaluate next.
#[derive(Debug)]
pub(crate) struct ScanState {
    pred: RangePredicate,
    page_no: u32,
    next_entry: usize,
}

/// Descends to the first matching entry and pins its leaf. Fails with
/// [`IndexError::NoSuchKeyFound`] if nothing in the index satisfies the
/// predicate; every pin is released on failure.
pub(crate) fn begin(pager: &Pager, root: u32, pred: RangePredicate) -> Result<ScanState> {
    let mut page = pager.fetch(root)?;

    // Descend while the pinned page is interior. The level tag tells us
    // when the child we are about to pin is a leaf.
    if node_kind(page.data())? == NodeKind::Interior {
        loop {
            let (child, level) = {
                let node = InteriorNode::from_page(page.data())?;
                (node.child_for_scan(pred.low()), node.level())
            };
            drop(page);
            page = pager.fetch(child)?;
            if level == 1 {
                break;
            }
        }
    }
    debug_assert_eq!(node_kind(page.data())?, NodeKind::Leaf);

    // Sweep leaves left to right for the first entry in range.
    loop {
        let leaf = LeafNode::from_page(page.data())?;
        let count = leaf.entry_count();

        for slot in 0..count {
            let key = leaf.key_at(slot);
            if pred.matches(key) {
                let page_no = page.page_no();
                pager.pin(page_no);
                return Ok(ScanState {
                    pred,
                    page_no,
                    next_entry: slot,
                });
            }
            if pred.past_high(key) {
                bail!(IndexError::NoSuchKeyFound);
            }
        }

        let sibling = leaf.right_sibling();
        if sibling == 0 {
            bail!(IndexError::NoSuchKeyFound);
        }
        drop(page);
        page = pager.fetch(sibling)?;
    }
}

impl ScanState {
    /// Returns the next matching record id, advancing to the right
    /// sibling when the current leaf is exhausted. Fails with
    /// [`IndexError::ScanCompleted`] once past the high bound or out of
    /// leaves; the current leaf stays pinned for `finish`.
    pub(crate) fn next(&mut self, pager: &Pager) -> Result<RecordId> {
        let mut page = pager.fetch(self.page_no)?;

        let exhausted = {
            let leaf = LeafNode::from_page(page.data())?;
            self.next_entry == LEAF_CAPACITY || leaf.slot_is_free(self.next_entry)
        };

        if exhausted {
            // Read the sibling pointer before releasing the leaf.
            let sibling = LeafNode::from_page(page.data())?.right_sibling();
            if sibling == 0 {
                bail!(IndexError::ScanCompleted);
            }
            drop(page);
            pager.unpin(self.page_no);
            page = pager.fetch(sibling)?;
            pager.pin(sibling);
            self.page_no = sibling;
            self.next_entry = 0;
        }

        let leaf = LeafNode::from_page(page.data())?;
        let key = leaf.key_at(self.next_entry);
        if !self.pred.matches(key) {
            bail!(IndexError::ScanCompleted);
        }

        let rid = leaf.rid_at(self.next_entry);
        self.next_entry += 1;
        Ok(rid)
    }

    /// Releases the pinned leaf and ends the scan.
    pub(crate) fn finish(self, pager: &Pager) {
        pager.unpin(self.page_no);
    }
}
