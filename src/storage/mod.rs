//! # Storage Module
//!
//! The position-independent data model: every piece of persistent state lives
//! in 4096-byte pages inside the attached buffer, and every inter-page
//! reference is a 32-bit [`Offset`] measured from the base of the active
//! half. There are no host-address pointers in persistent state, so the
//! buffer can be copied to a different address, memory-mapped to a file, or
//! placed in shared memory without any fixup.
//!
//! ## Page kinds
//!
//! | Kind | Role |
//! |------|------|
//! | Root page (offset 0) | Global metadata, lock word, backup flag, free list, root inode, inline handle slots |
//! | Directory page | Name→inode links plus an embedded inode pool; doubly chained per directory |
//! | Data page | Doubly chained opaque bytes belonging to one file |
//! | Handle-overflow page | Additional handle slots past the root's inline array |
//! | User page | Doubly chained user records |
//! | Free page | Singly linked free list |
//!
//! Pages carry no type tag; a page's kind is implied by the structure that
//! references it, and pages are formatted for their kind when claimed from
//! the free list or the high-water bump.
//!
//! ## Zerocopy layout
//!
//! Every layout struct derives `FromBytes`/`IntoBytes`/`Immutable`/
//! `KnownLayout`/`Unaligned` and stores multi-byte fields as little-endian
//! wrapper types, so a struct reference is a view straight into the buffer
//! (or into a transaction's patch copy) with no deserialization step. Sizes
//! and critical field offsets are pinned by compile-time assertions.
//!
//! ## Module Organization
//!
//! - `buffer`: the attached caller buffer and aligned allocation for owners
//! - `root`: the root page layout
//! - `dir`: directory pages, links, inodes
//! - `data`: file data pages
//! - `handle`: handle slots and overflow pages
//! - `user`: user record pages

mod buffer;
mod data;
mod dir;
mod handle;
mod root;
mod user;

pub use buffer::{OwnedBuffer, SharedBuffer};
pub use data::DataPage;
pub use dir::{DirPage, Inode, Link, INODE_DIR, INODE_FILE};
pub use handle::{Handle, HandlePage};
pub use root::{RootPage, ROOT_INODE_OFFSET, STAMP};
pub use user::{UserPage, UserRecord};

use crate::config::PAGE_SIZE;
use crate::error::{FsError, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

/// Byte offset from the base of the active half. Page references are
/// page-aligned; inode references point inside a directory page.
pub type Offset = u32;

/// The "none" sentinel for offsets.
pub const NIL_OFFSET: Offset = u32::MAX;

/// Page-aligned offset of the page containing `off`.
#[inline]
pub fn page_of(off: Offset) -> Offset {
    off & !(PAGE_SIZE as u32 - 1)
}

/// Byte position of `off` within its page.
#[inline]
pub fn byte_of(off: Offset) -> usize {
    (off & (PAGE_SIZE as u32 - 1)) as usize
}

/// Parses a zerocopy struct from the front of a byte slice.
#[inline]
pub(crate) fn parse<T: FromBytes + KnownLayout + Immutable>(bytes: &[u8]) -> Result<&T> {
    let size = core::mem::size_of::<T>();
    if bytes.len() < size {
        return Err(FsError::Corrupt);
    }
    T::ref_from_bytes(&bytes[..size]).map_err(|_| FsError::Corrupt)
}

/// Parses a mutable zerocopy struct from the front of a byte slice.
#[inline]
pub(crate) fn parse_mut<T: FromBytes + KnownLayout + IntoBytes>(bytes: &mut [u8]) -> Result<&mut T> {
    let size = core::mem::size_of::<T>();
    if bytes.len() < size {
        return Err(FsError::Corrupt);
    }
    T::mut_from_bytes(&mut bytes[..size]).map_err(|_| FsError::Corrupt)
}

/// Head of a page on the free list. Only the link matters; the rest of the
/// page is garbage until the page is reformatted for its next kind.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct FreePage {
    next: U32,
}

impl FreePage {
    crate::le_accessors! {
        next: u32,
    }
}
