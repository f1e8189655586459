//! # Directory Pages, Links, and Inodes
//!
//! A directory's contents live in a doubly linked chain of directory pages.
//! Each page carries two fixed arrays:
//!
//! - **links**: (name, inode offset) pairs naming entries of the directory
//!   that owns the chain. Link slots are prefix-packed per page: iteration
//!   stops at the first unused slot, and removal back-fills holes with the
//!   chain's tail-most link.
//! - **inode pool**: storage for inodes. An inode slot with refcount 0 is
//!   free. The pool is addressed by in-buffer offset, so an inode may be
//!   referenced by links in *other* directories (hard links) and can outlive
//!   the chain that hosts it.
//!
//! ## Page Layout (4096 bytes)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  ---------------------------------------
//! 0       4     prev   (chain link, NIL at the head)
//! 4       4     next   (chain link, NIL at the tail)
//! 8       3300  links  [Link; 25], 132 bytes each
//! 3308    700   inodes [Inode; 25], 28 bytes each
//! 4008    88    reserved
//! ```
//!
//! ## Inode
//!
//! The refcounted record behind every file and directory. For a regular file
//! the head/tail offsets chain data pages and `head_start`/`tail_end`
//! delimit the live payload window (see [`crate::storage::DataPage`]); for a
//! directory they chain directory pages. Kind is a bitflag, not a subtype:
//! behavior branches on [`Inode::is_dir`].

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{DIR_SLOTS, MAX_NAME, PAGE_SIZE};

use super::{Offset, NIL_OFFSET};

/// Entity is a directory.
pub const INODE_DIR: u32 = 1 << 0;
/// Entity is a regular file.
pub const INODE_FILE: u32 = 1 << 1;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Inode {
    refs: U32,
    flags: U32,
    head: U32,
    tail: U32,
    head_start: U16,
    tail_end: U16,
    owner: U32,
    mode: U16,
    reserved: [u8; 2],
}

const _: () = assert!(core::mem::size_of::<Inode>() == 28);

impl Inode {
    crate::le_accessors! {
        refs: u32,
        flags: u32,
        head: u32,
        tail: u32,
        head_start: u16,
        tail_end: u16,
        owner: u32,
        mode: u16,
    }

    pub fn is_dir(&self) -> bool {
        self.flags() & INODE_DIR != 0
    }

    pub fn is_file(&self) -> bool {
        self.flags() & INODE_FILE != 0
    }

    /// Slot freeness: an inode with refcount 0 is free.
    pub fn is_free(&self) -> bool {
        self.refs() == 0
    }

    /// Claims this slot for a fresh entity with one reference and no content.
    pub fn init(&mut self, flags: u32, owner: u32, mode: u16) {
        self.set_refs(1);
        self.set_flags(flags);
        self.set_head(NIL_OFFSET);
        self.set_tail(NIL_OFFSET);
        self.set_head_start(0);
        self.set_tail_end(0);
        self.set_owner(owner);
        self.set_mode(mode);
        self.reserved = [0; 2];
    }
}

/// A directory entry: a fixed-capacity NUL-padded name plus the offset of
/// the inode it names. An unused slot has the nil offset as its target.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Link {
    target: U32,
    name: [u8; MAX_NAME],
}

const _: () = assert!(core::mem::size_of::<Link>() == 4 + MAX_NAME);

impl Link {
    crate::le_accessors! {
        target: u32,
    }

    pub fn is_used(&self) -> bool {
        self.target() != NIL_OFFSET
    }

    /// The stored name: bytes up to the first NUL, or the full capacity when
    /// no NUL is present (a 128-byte name is legal).
    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME);
        &self.name[..len]
    }

    /// Points this slot at `target` under `name`. The caller has validated
    /// the name length.
    pub fn fill(&mut self, name: &[u8], target: Offset) {
        debug_assert!(!name.is_empty() && name.len() <= MAX_NAME);
        self.name = [0; MAX_NAME];
        self.name[..name.len()].copy_from_slice(name);
        self.set_target(target);
    }

    pub fn clear(&mut self) {
        self.name = [0; MAX_NAME];
        self.set_target(NIL_OFFSET);
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DirPage {
    prev: U32,
    next: U32,
    links: [Link; DIR_SLOTS],
    inodes: [Inode; DIR_SLOTS],
    reserved: [u8; 88],
}

const _: () = assert!(core::mem::size_of::<DirPage>() == PAGE_SIZE);

impl DirPage {
    /// Byte position of the inode pool within the page; inode offsets are
    /// derived from it.
    pub const INODES_OFFSET: usize = core::mem::offset_of!(DirPage, inodes);

    crate::le_accessors! {
        prev: u32,
        next: u32,
    }

    pub fn links(&self) -> &[Link; DIR_SLOTS] {
        &self.links
    }

    pub fn links_mut(&mut self) -> &mut [Link; DIR_SLOTS] {
        &mut self.links
    }

    pub fn inodes(&self) -> &[Inode; DIR_SLOTS] {
        &self.inodes
    }

    /// Number of used link slots. Links are prefix-packed, so this is the
    /// index of the first unused slot.
    pub fn link_count(&self) -> usize {
        self.links
            .iter()
            .position(|l| !l.is_used())
            .unwrap_or(DIR_SLOTS)
    }

    /// Index of the link slot naming `name`, if any.
    pub fn find_link(&self, name: &[u8]) -> Option<usize> {
        self.links
            .iter()
            .take_while(|l| l.is_used())
            .position(|l| l.name_bytes() == name)
    }

    /// Index of a free slot in the inode pool, if any.
    pub fn free_inode_slot(&self) -> Option<usize> {
        self.inodes.iter().position(|i| i.is_free())
    }

    /// Whether any slot in the inode pool is still referenced.
    pub fn hosts_live_inodes(&self) -> bool {
        self.inodes.iter().any(|i| !i.is_free())
    }

    /// In-buffer offset of inode slot `idx`, given this page's offset.
    pub fn inode_offset(page_off: Offset, idx: usize) -> Offset {
        debug_assert!(idx < DIR_SLOTS);
        page_off + (Self::INODES_OFFSET + idx * core::mem::size_of::<Inode>()) as u32
    }

    /// Formats a freshly claimed page as an empty directory page.
    pub fn format(&mut self, prev: Offset) {
        self.set_prev(prev);
        self.set_next(NIL_OFFSET);
        for link in &mut self.links {
            link.clear();
        }
        for inode in &mut self.inodes {
            *inode = Inode::new_zeroed();
        }
        self.reserved = [0; 88];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_size_is_28() {
        assert_eq!(core::mem::size_of::<Inode>(), 28);
    }

    #[test]
    fn dir_page_size_is_one_page() {
        assert_eq!(core::mem::size_of::<DirPage>(), PAGE_SIZE);
    }

    #[test]
    fn inode_offsets_are_four_byte_aligned() {
        assert_eq!(DirPage::INODES_OFFSET % 4, 0);
        for idx in 0..DIR_SLOTS {
            assert_eq!(DirPage::inode_offset(8192, idx) % 4, 0);
        }
    }

    #[test]
    fn inode_init_claims_slot() {
        let mut inode = Inode::new_zeroed();
        assert!(inode.is_free());

        inode.init(INODE_FILE, 7, 0o644);

        assert!(!inode.is_free());
        assert!(inode.is_file());
        assert!(!inode.is_dir());
        assert_eq!(inode.refs(), 1);
        assert_eq!(inode.head(), NIL_OFFSET);
        assert_eq!(inode.tail(), NIL_OFFSET);
        assert_eq!(inode.owner(), 7);
        assert_eq!(inode.mode(), 0o644);
    }

    #[test]
    fn link_name_is_nul_delimited() {
        let mut link = Link::new_zeroed();
        link.fill(b"hello", 4096);

        assert!(link.is_used());
        assert_eq!(link.name_bytes(), b"hello");
        assert_eq!(link.target(), 4096);
    }

    #[test]
    fn link_name_may_fill_capacity() {
        let name = [b'x'; MAX_NAME];
        let mut link = Link::new_zeroed();
        link.fill(&name, 0);

        assert_eq!(link.name_bytes().len(), MAX_NAME);
    }

    #[test]
    fn formatted_page_has_no_links_and_free_inodes() {
        let mut page = DirPage::new_zeroed();
        page.format(NIL_OFFSET);

        assert_eq!(page.link_count(), 0);
        assert_eq!(page.free_inode_slot(), Some(0));
        assert!(!page.hosts_live_inodes());
        assert_eq!(page.prev(), NIL_OFFSET);
        assert_eq!(page.next(), NIL_OFFSET);
    }

    #[test]
    fn find_link_respects_prefix_packing() {
        let mut page = DirPage::new_zeroed();
        page.format(NIL_OFFSET);
        page.links_mut()[0].fill(b"a", 100);
        // Slot 1 unused; a name in slot 2 is unreachable by construction and
        // must not be found.
        page.links_mut()[2].fill(b"ghost", 200);

        assert_eq!(page.find_link(b"a"), Some(0));
        assert_eq!(page.find_link(b"ghost"), None);
        assert_eq!(page.link_count(), 1);
    }
}
