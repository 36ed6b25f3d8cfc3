//! The meta page: first page of every index file.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::storage::{parse_struct, parse_struct_mut};

pub(crate) const INDEX_MAGIC: &[u8; 16] = b"LarchDB Index\x00\x00\x00";
pub(crate) const INDEX_VERSION: u32 = 1;

/// Fixed width of the zero-padded relation name field.
pub const RELATION_NAME_LEN: usize = 20;

/// Type of the attribute an index is built over. Only `Int32` keys are
/// implemented; the other tags exist so the meta page format is stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyType {
    Int32 = 0,
    Float64 = 1,
    Text = 2,
}

impl KeyType {
    pub(crate) fn tag(self) -> u8 {
        self as u8
    }
}

/// On-disk layout of the meta page.
///
/// `root_page` is rewritten every time a root split moves the root; the
/// remaining fields are written once at creation and validated on open.
#[repr(C)]
#[derive(Debug, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct IndexMeta {
    magic: [u8; 16],
    version: U32,
    relation_name: [u8; RELATION_NAME_LEN],
    key_offset: U32,
    key_type: u8,
    _reserved: [u8; 3],
    root_page: U32,
}

const _: () = assert!(std::mem::size_of::<IndexMeta>() == 52);

impl IndexMeta {
    pub(crate) fn init<'a>(
        page: &'a mut [u8],
        relation: &str,
        key_offset: u32,
        key_type: KeyType,
        root_page: u32,
    ) -> Result<&'a mut Self> {
        let name = encode_relation_name(relation)?;
        let meta = parse_struct_mut::<Self>(page, "IndexMeta")?;
        meta.magic = *INDEX_MAGIC;
        meta.version = U32::new(INDEX_VERSION);
        meta.relation_name = name;
        meta.key_offset = U32::new(key_offset);
        meta.key_type = key_type.tag();
        meta._reserved = [0; 3];
        meta.root_page = U32::new(root_page);
        Ok(meta)
    }

    pub(crate) fn from_page(page: &[u8]) -> Result<&Self> {
        let meta = parse_struct::<Self>(page, "IndexMeta")?;
        ensure!(&meta.magic == INDEX_MAGIC, "not an index file");
        ensure!(
            meta.version.get() == INDEX_VERSION,
            "unsupported index file version {}",
            meta.version.get()
        );
        Ok(meta)
    }

    pub(crate) fn from_page_mut(page: &mut [u8]) -> Result<&mut Self> {
        let meta = parse_struct_mut::<Self>(page, "IndexMeta")?;
        ensure!(&meta.magic == INDEX_MAGIC, "not an index file");
        Ok(meta)
    }

    pub fn relation_name(&self) -> &[u8; RELATION_NAME_LEN] {
        &self.relation_name
    }

    pub fn key_offset(&self) -> u32 {
        self.key_offset.get()
    }

    pub fn key_type_tag(&self) -> u8 {
        self.key_type
    }

    pub fn root_page(&self) -> u32 {
        self.root_page.get()
    }

    pub(crate) fn set_root_page(&mut self, page_no: u32) {
        self.root_page = U32::new(page_no);
    }

    /// True when the stored identity matches the requested one.
    pub(crate) fn describes(&self, relation: &str, key_offset: u32, key_type: KeyType) -> bool {
        match encode_relation_name(relation) {
            Ok(name) => {
                self.relation_name == name
                    && self.key_offset.get() == key_offset
                    && self.key_type == key_type.tag()
            }
            Err(_) => false,
        }
    }
}

/// Zero-pads a relation name into the fixed meta-page field. Names longer
/// than the field are rejected rather than truncated.
pub(crate) fn encode_relation_name(relation: &str) -> Result<[u8; RELATION_NAME_LEN]> {
    let bytes = relation.as_bytes();
    ensure!(
        bytes.len() <= RELATION_NAME_LEN,
        "relation name '{}' exceeds {} bytes",
        relation,
        RELATION_NAME_LEN
    );
    let mut name = [0u8; RELATION_NAME_LEN];
    name[..bytes.len()].copy_from_slice(bytes);
    Ok(name)
}
