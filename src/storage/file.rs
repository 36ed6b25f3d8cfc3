//! # Page File
//!
//! `PageFile` is the on-disk backing of an index or heap file: a dense
//! sequence of fixed-size pages accessed through a writable memory map.
//! Growth remaps the file; durability is an explicit `sync`.
//!
//! ## Page Numbering
//!
//! Pages are numbered from **1**. Page id 0 is the nil sentinel used
//! throughout the node format (a freed slot zeroes its pointer, and a leaf
//! with no right sibling stores 0), so the file never produces it. Page `n`
//! lives at byte offset `(n - 1) * PAGE_SIZE`.
//!
//! ## Safety Model
//!
//! The map becomes invalid when the file is grown and remapped. `grow`
//! takes `&mut self`, so the borrow checker proves no page reference is
//! alive across a remap; there are no runtime guards.

use std::fs::{File, OpenOptions};
use std::path::Path;

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::PAGE_SIZE;

/// Page number of the first page in every file.
pub const FIRST_PAGE: u32 = 1;

#[derive(Debug)]
pub struct PageFile {
    file: File,
    mmap: MmapMut,
    page_count: u32,
}

impl PageFile {
    /// Creates a new page file holding `initial_page_count` zeroed pages.
    /// An existing file at `path` is truncated.
    pub fn create<P: AsRef<Path>>(path: P, initial_page_count: u32) -> Result<Self> {
        let path = path.as_ref();

        ensure!(
            initial_page_count > 0,
            "initial page count must be at least 1"
        );

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create page file '{}'", path.display()))?;

        let file_size = initial_page_count as u64 * PAGE_SIZE as u64;
        file.set_len(file_size)
            .wrap_err_with(|| format!("failed to size '{}' to {} bytes", path.display(), file_size))?;

        // SAFETY: the file was just created with exclusive read+write access
        // and sized to a multiple of PAGE_SIZE. The map lives inside this
        // PageFile, and all access is bounds-checked by page()/page_mut().
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            page_count: initial_page_count,
        })
    }

    /// Opens an existing page file. The file size must be a nonzero
    /// multiple of `PAGE_SIZE`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open page file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", path.display()))?
            .len();

        ensure!(
            file_size > 0,
            "cannot open empty page file '{}'",
            path.display()
        );
        ensure!(
            file_size % PAGE_SIZE as u64 == 0,
            "page file '{}' size {} is not a multiple of the page size {}",
            path.display(),
            file_size,
            PAGE_SIZE
        );

        let page_count = (file_size / PAGE_SIZE as u64) as u32;

        // SAFETY: the file is opened read+write and its size was verified
        // to be a multiple of PAGE_SIZE. The map lives inside this PageFile,
        // and all access is bounds-checked by page()/page_mut().
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to map '{}'", path.display()))?
        };

        Ok(Self {
            file,
            mmap,
            page_count,
        })
    }

    pub fn page(&self, page_no: u32) -> Result<&[u8]> {
        self.check_bounds(page_no)?;
        let offset = (page_no - FIRST_PAGE) as usize * PAGE_SIZE;
        Ok(&self.mmap[offset..offset + PAGE_SIZE])
    }

    pub fn page_mut(&mut self, page_no: u32) -> Result<&mut [u8]> {
        self.check_bounds(page_no)?;
        let offset = (page_no - FIRST_PAGE) as usize * PAGE_SIZE;
        Ok(&mut self.mmap[offset..offset + PAGE_SIZE])
    }

    fn check_bounds(&self, page_no: u32) -> Result<()> {
        ensure!(
            page_no >= FIRST_PAGE && page_no <= self.page_count,
            "page {} out of bounds (pages {}..={})",
            page_no,
            FIRST_PAGE,
            self.page_count
        );
        Ok(())
    }

    /// Extends the file to `new_page_count` pages. A no-op if the file is
    /// already at least that large.
    pub fn grow(&mut self, new_page_count: u32) -> Result<()> {
        if new_page_count <= self.page_count {
            return Ok(());
        }

        self.mmap
            .flush()
            .wrap_err("failed to flush map before grow")?;

        let new_size = new_page_count as u64 * PAGE_SIZE as u64;
        self.file
            .set_len(new_size)
            .wrap_err_with(|| format!("failed to extend page file to {} bytes", new_size))?;

        // SAFETY: grow() holds &mut self, so no page reference can outlive
        // the old map. The file was flushed and extended before remapping,
        // and the old map is dropped by the assignment.
        self.mmap =
            unsafe { MmapMut::map_mut(&self.file).wrap_err("failed to remap after grow")? };
        self.page_count = new_page_count;

        Ok(())
    }

    /// Appends one zeroed page and returns its page number.
    pub fn allocate(&mut self) -> Result<u32> {
        let page_no = self.page_count + 1;
        self.grow(page_no)?;
        Ok(page_no)
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap.flush().wrap_err("failed to sync page file")
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }
}
