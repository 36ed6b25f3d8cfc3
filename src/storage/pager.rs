//! # Pager
//!
//! The pager is the buffered page manager every index and heap file runs
//! on: a bounded table of in-memory page frames over a [`PageFile`], with
//! per-frame pin counts, dirty bits, and second-chance eviction.
//!
//! ## Pin Protocol
//!
//! [`Pager::fetch`] and [`Pager::allocate`] return a pinned [`PageGuard`].
//! A pinned frame cannot be evicted; dropping the guard releases the pin.
//! `data_mut` marks the frame dirty, so the dirty bit is set exactly when
//! the page content was mutated under a pin. Dirty frames are written back
//! before eviction and on [`Pager::flush_all`].
//!
//! A cursor that must keep a page resident across calls takes an extra
//! reference with [`Pager::pin`] and releases it with [`Pager::unpin`];
//! [`Pager::pinned_pages`] exposes the live pin footprint so tests can
//! assert that every operation returns with zero pages pinned.
//!
//! ## Eviction
//!
//! Second-chance: each frame carries a visited flag set on access; the
//! eviction hand clears the flag on first encounter and evicts on second.
//! Pinned frames are skipped. A sequential sweep therefore cannot flush
//! hot pages out of the table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use eyre::{bail, Result};
use parking_lot::RwLock;

use crate::config::{MIN_PAGER_CAPACITY, PAGE_SIZE};

use super::file::PageFile;

struct Frame {
    page_no: u32,
    visited: AtomicBool,
    dirty: AtomicBool,
    pin_count: AtomicU32,
    data: Box<[u8; PAGE_SIZE]>,
}

impl Frame {
    fn new(page_no: u32) -> Self {
        Self {
            page_no,
            visited: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
            pin_count: AtomicU32::new(0),
            data: Box::new([0u8; PAGE_SIZE]),
        }
    }

    fn is_pinned(&self) -> bool {
        self.pin_count.load(Ordering::Acquire) > 0
    }

    fn pin(&self) {
        self.pin_count.fetch_add(1, Ordering::AcqRel);
    }

    fn unpin(&self) {
        let prev = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "unpin called on unpinned frame");
    }

    fn mark_visited(&self) {
        self.visited.store(true, Ordering::Release);
    }

    fn clear_visited(&self) -> bool {
        self.visited.swap(false, Ordering::AcqRel)
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn clear_dirty(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

struct FrameTable {
    frames: Vec<Frame>,
    index: HashMap<u32, usize>,
    hand: usize,
}

impl FrameTable {
    fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            hand: 0,
        }
    }

    fn lookup(&self, page_no: u32) -> Option<usize> {
        self.index.get(&page_no).copied()
    }

    /// Picks an unpinned frame to evict, second-chance style. Returns
    /// `None` when every frame is pinned.
    fn victim(&mut self) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }

        let start = self.hand;
        let mut wrapped_once = false;

        loop {
            let frame = &self.frames[self.hand];

            if frame.is_pinned() {
                self.hand = (self.hand + 1) % self.frames.len();
                if self.hand == start {
                    if wrapped_once {
                        return None;
                    }
                    wrapped_once = true;
                }
                continue;
            }

            if frame.clear_visited() {
                self.hand = (self.hand + 1) % self.frames.len();
                continue;
            }

            return Some(self.hand);
        }
    }

    fn remove(&mut self, idx: usize) -> Frame {
        let frame = self.frames.swap_remove(idx);
        self.index.remove(&frame.page_no);

        if idx < self.frames.len() {
            let moved = self.frames[idx].page_no;
            self.index.insert(moved, idx);
        }
        if self.hand >= self.frames.len() {
            self.hand = 0;
        }

        frame
    }

    fn insert(&mut self, frame: Frame) -> usize {
        let page_no = frame.page_no;
        let idx = self.frames.len();
        self.frames.push(frame);
        self.index.insert(page_no, idx);
        idx
    }
}

/// Buffered page manager over a single [`PageFile`].
pub struct Pager {
    file: RwLock<PageFile>,
    table: RwLock<FrameTable>,
    capacity: usize,
}

impl Pager {
    /// Creates a new page file with `initial_pages` pages and a pager of
    /// `capacity` frames over it.
    pub fn create<P: AsRef<std::path::Path>>(
        path: P,
        initial_pages: u32,
        capacity: usize,
    ) -> Result<Self> {
        let file = PageFile::create(path, initial_pages)?;
        Ok(Self::over(file, capacity))
    }

    /// Opens an existing page file with a pager of `capacity` frames.
    pub fn open<P: AsRef<std::path::Path>>(path: P, capacity: usize) -> Result<Self> {
        let file = PageFile::open(path)?;
        Ok(Self::over(file, capacity))
    }

    fn over(file: PageFile, capacity: usize) -> Self {
        let capacity = capacity.max(MIN_PAGER_CAPACITY);
        Self {
            file: RwLock::new(file),
            table: RwLock::new(FrameTable::new(capacity)),
            capacity,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.file.read().page_count()
    }

    /// Pins the page and returns a guard over its frame, loading it from
    /// the file if it is not resident.
    pub fn fetch(&self, page_no: u32) -> Result<PageGuard<'_>> {
        {
            let table = self.table.read();
            if let Some(idx) = table.lookup(page_no) {
                table.frames[idx].pin();
                table.frames[idx].mark_visited();
                return Ok(PageGuard {
                    pager: self,
                    page_no,
                });
            }
        }

        let mut table = self.table.write();
        if let Some(idx) = table.lookup(page_no) {
            table.frames[idx].pin();
            table.frames[idx].mark_visited();
            return Ok(PageGuard {
                pager: self,
                page_no,
            });
        }

        self.make_room(&mut table)?;

        let mut frame = Frame::new(page_no);
        {
            let file = self.file.read();
            frame.data.copy_from_slice(file.page(page_no)?);
        }
        frame.pin();
        frame.mark_visited();
        table.insert(frame);

        Ok(PageGuard {
            pager: self,
            page_no,
        })
    }

    /// Appends a zeroed page to the file and returns its number along with
    /// a pinned guard over its (zeroed) frame.
    pub fn allocate(&self) -> Result<(u32, PageGuard<'_>)> {
        let page_no = self.file.write().allocate()?;

        let mut table = self.table.write();
        self.make_room(&mut table)?;

        let frame = Frame::new(page_no);
        frame.pin();
        frame.mark_visited();
        table.insert(frame);

        Ok((
            page_no,
            PageGuard {
                pager: self,
                page_no,
            },
        ))
    }

    fn make_room(&self, table: &mut FrameTable) -> Result<()> {
        while table.frames.len() >= self.capacity {
            let Some(idx) = table.victim() else {
                bail!("all {} pager frames are pinned", self.capacity);
            };
            let frame = table.remove(idx);
            if frame.is_dirty() {
                let mut file = self.file.write();
                file.page_mut(frame.page_no)?.copy_from_slice(&frame.data[..]);
            }
        }
        Ok(())
    }

    /// Takes an extra reference on an already-resident page so it survives
    /// its guard. Balanced by [`Pager::unpin`].
    pub fn pin(&self, page_no: u32) {
        let table = self.table.read();
        let idx = table
            .lookup(page_no)
            .expect("pin target not resident"); // INVARIANT: callers hold a guard on the page
        table.frames[idx].pin();
    }

    /// Releases one reference taken with [`Pager::pin`] or retained past a
    /// guard.
    pub fn unpin(&self, page_no: u32) {
        let table = self.table.read();
        if let Some(idx) = table.lookup(page_no) {
            table.frames[idx].unpin();
        } else {
            debug_assert!(false, "unpin of non-resident page {}", page_no);
        }
    }

    fn mark_dirty(&self, page_no: u32) {
        let table = self.table.read();
        if let Some(idx) = table.lookup(page_no) {
            table.frames[idx].mark_dirty();
        }
    }

    fn frame_ptr(&self, page_no: u32) -> *mut u8 {
        let table = self.table.read();
        let idx = table
            .lookup(page_no)
            .expect("page frame missing while guarded"); // INVARIANT: a PageGuard pins its frame
        table.frames[idx].data.as_ptr() as *mut u8
    }

    /// Number of frames with at least one live pin.
    pub fn pinned_pages(&self) -> usize {
        let table = self.table.read();
        table.frames.iter().filter(|f| f.is_pinned()).count()
    }

    /// Writes every dirty frame back to the file and syncs it.
    pub fn flush_all(&self) -> Result<()> {
        let table = self.table.read();
        let mut file = self.file.write();

        for frame in &table.frames {
            if frame.is_dirty() {
                file.page_mut(frame.page_no)?.copy_from_slice(&frame.data[..]);
                frame.clear_dirty();
            }
        }

        file.sync()
    }
}

impl std::fmt::Debug for Pager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pager")
            .field("capacity", &self.capacity)
            .field("resident", &self.table.read().frames.len())
            .finish()
    }
}

/// Pinned handle on one page frame. Dropping the guard unpins the frame.
pub struct PageGuard<'a> {
    pager: &'a Pager,
    page_no: u32,
}

impl PageGuard<'_> {
    pub fn page_no(&self) -> u32 {
        self.page_no
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: the frame is pinned for the guard's lifetime, so it is
        // neither evicted nor freed, and its Box keeps the buffer at a
        // stable address while the frame table reorganizes.
        unsafe { std::slice::from_raw_parts(self.pager.frame_ptr(self.page_no), PAGE_SIZE) }
    }

    /// Mutable view of the page. Marks the frame dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.pager.mark_dirty(self.page_no);
        // SAFETY: as in data(), the pinned frame's buffer is stable.
        // Exclusivity comes from &mut self; the engine never mutates one
        // page through two guards at a time.
        unsafe { std::slice::from_raw_parts_mut(self.pager.frame_ptr(self.page_no), PAGE_SIZE) }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pager.unpin(self.page_no);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_pager(pages: u32, capacity: usize) -> (tempfile::TempDir, Pager) {
        let dir = tempdir().unwrap();
        let pager = Pager::create(dir.path().join("test.lr"), pages, capacity).unwrap();
        (dir, pager)
    }

    #[test]
    fn fetch_pins_and_drop_unpins() {
        let (_dir, pager) = test_pager(2, 16);

        let guard = pager.fetch(1).unwrap();
        assert_eq!(pager.pinned_pages(), 1);

        drop(guard);
        assert_eq!(pager.pinned_pages(), 0);
    }

    #[test]
    fn mutation_survives_flush_and_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lr");

        {
            let pager = Pager::create(&path, 1, 16).unwrap();
            let mut guard = pager.fetch(1).unwrap();
            guard.data_mut()[10] = 0x5A;
            drop(guard);
            pager.flush_all().unwrap();
        }

        let pager = Pager::open(&path, 16).unwrap();
        let guard = pager.fetch(1).unwrap();
        assert_eq!(guard.data()[10], 0x5A);
    }

    #[test]
    fn allocate_numbers_pages_sequentially() {
        let (_dir, pager) = test_pager(1, 16);

        let (first, guard) = pager.allocate().unwrap();
        drop(guard);
        let (second, guard) = pager.allocate().unwrap();
        drop(guard);

        assert_eq!(first, 2);
        assert_eq!(second, 3);
        assert_eq!(pager.page_count(), 3);
    }

    #[test]
    fn eviction_writes_dirty_frames_back() {
        let (_dir, pager) = test_pager(1, MIN_PAGER_CAPACITY);

        let mut dirty_pages = Vec::new();
        for _ in 0..MIN_PAGER_CAPACITY * 3 {
            let (page_no, mut guard) = pager.allocate().unwrap();
            guard.data_mut()[0] = (page_no % 251) as u8;
            dirty_pages.push(page_no);
        }

        // Far more pages than frames were written, so most went through
        // eviction. Every page must still read back its byte.
        for page_no in dirty_pages {
            let guard = pager.fetch(page_no).unwrap();
            assert_eq!(guard.data()[0], (page_no % 251) as u8, "page {}", page_no);
        }
    }

    #[test]
    fn fetch_fails_when_every_frame_is_pinned() {
        let (_dir, pager) = test_pager(MIN_PAGER_CAPACITY as u32 + 4, MIN_PAGER_CAPACITY);

        let guards: Vec<_> = (1..=MIN_PAGER_CAPACITY as u32)
            .map(|page_no| pager.fetch(page_no).unwrap())
            .collect();

        assert!(pager.fetch(MIN_PAGER_CAPACITY as u32 + 1).is_err());
        drop(guards);
        assert!(pager.fetch(MIN_PAGER_CAPACITY as u32 + 1).is_ok());
    }

    #[test]
    fn explicit_pin_keeps_page_resident_past_guard() {
        let (_dir, pager) = test_pager(2, 16);

        let guard = pager.fetch(2).unwrap();
        pager.pin(2);
        drop(guard);

        assert_eq!(pager.pinned_pages(), 1);
        pager.unpin(2);
        assert_eq!(pager.pinned_pages(), 0);
    }

    #[test]
    fn flush_with_no_dirty_frames_succeeds() {
        let (_dir, pager) = test_pager(3, 16);

        let guard = pager.fetch(2).unwrap();
        drop(guard);
        // Nothing was mutated; flush must still succeed.
        pager.flush_all().unwrap();
    }

    #[test]
    fn read_only_access_does_not_mark_frames_dirty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.lr");

        {
            let pager = Pager::create(&path, 2, 16).unwrap();
            let mut guard = pager.fetch(2).unwrap();
            guard.data_mut()[0] = 9;
            drop(guard);
            pager.flush_all().unwrap();
        }

        // Reading through data() must not dirty the frame, so a flush
        // after pure reads rewrites nothing and the byte persists.
        let pager = Pager::open(&path, 16).unwrap();
        let guard = pager.fetch(2).unwrap();
        assert_eq!(guard.data()[0], 9);
        drop(guard);
        pager.flush_all().unwrap();

        let pager = Pager::open(&path, 16).unwrap();
        assert_eq!(pager.fetch(2).unwrap().data()[0], 9);
    }
}
