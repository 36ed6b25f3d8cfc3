//! # Storage Layer
//!
//! Two pieces, stacked:
//!
//! - [`PageFile`]: a memory-mapped file of fixed-size pages, numbered from
//!   1 so that page id 0 stays free as the nil sentinel the node format
//!   relies on.
//! - [`Pager`]: a bounded frame table over a page file with pin counts,
//!   dirty tracking, second-chance eviction, and explicit flush. All tree
//!   and heap I/O goes through pinned [`PageGuard`] handles.
//!
//! The zerocopy parse helpers live here too; every on-disk struct in the
//! crate is cast out of a page buffer through them.

mod file;
mod pager;

pub use file::{PageFile, FIRST_PAGE};
pub use pager::{PageGuard, Pager};

use eyre::{ensure, Result};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// Casts the leading bytes of a page to a layout struct, with size
/// validation.
#[inline]
pub(crate) fn parse_struct<'a, T: FromBytes + KnownLayout + Immutable>(
    bytes: &'a [u8],
    type_name: &str,
) -> Result<&'a T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::ref_from_bytes(&bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}

/// Mutable variant of [`parse_struct`].
#[inline]
pub(crate) fn parse_struct_mut<'a, T: FromBytes + KnownLayout + IntoBytes>(
    bytes: &'a mut [u8],
    type_name: &str,
) -> Result<&'a mut T> {
    let size = std::mem::size_of::<T>();
    ensure!(
        bytes.len() >= size,
        "buffer too small for {}: {} < {}",
        type_name,
        bytes.len(),
        size
    );
    T::mut_from_bytes(&mut bytes[..size])
        .map_err(|e| eyre::eyre!("failed to parse {}: {:?}", type_name, e))
}
