//! # Handle Slots and Overflow Pages
//!
//! A handle is an open-file record: the inode it references and a byte
//! cursor. A descriptor exposed to callers packs the slot's generation in
//! the upper 16 bits and the slot index in the lower 16; the generation is
//! advanced on close (skipping 0 and 0xFFFF) so a reused slot rejects stale
//! descriptors.
//!
//! The root page embeds 333 slots inline; when those are exhausted,
//! overflow pages chained from the root supply 341 more each, indexed
//! sequentially, bounded by the 16-bit index space.

use zerocopy::little_endian::{U16, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{OVERFLOW_HANDLE_SLOTS, PAGE_SIZE};

use super::{Offset, NIL_OFFSET};

/// Generation value marking a slot that was never opened. Close skips both
/// this and 0xFFFF when advancing.
pub const NEVER_USED_GEN: u16 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Handle {
    used: u8,
    reserved: u8,
    gen: U16,
    inode: U32,
    cursor: U32,
}

const _: () = assert!(core::mem::size_of::<Handle>() == 12);

impl Handle {
    crate::le_accessors! {
        gen: u16,
        inode: u32,
        cursor: u32,
    }

    pub fn is_used(&self) -> bool {
        self.used != 0
    }

    pub fn open(&mut self, inode: Offset) {
        self.used = 1;
        self.set_inode(inode);
        self.set_cursor(0);
    }

    /// Releases the slot and advances the generation, wrapping past the two
    /// reserved values.
    pub fn close(&mut self) {
        self.used = 0;
        self.set_inode(NIL_OFFSET);
        self.set_cursor(0);
        let mut gen = self.gen().wrapping_add(1);
        if gen == NEVER_USED_GEN || gen == u16::MAX {
            gen = 1;
        }
        self.set_gen(gen);
    }

    /// Resets a slot at format time: unused, generation 1.
    pub fn reset(&mut self) {
        self.used = 0;
        self.reserved = 0;
        self.set_gen(1);
        self.set_inode(NIL_OFFSET);
        self.set_cursor(0);
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct HandlePage {
    next: U32,
    handles: [Handle; OVERFLOW_HANDLE_SLOTS],
}

const _: () = assert!(core::mem::size_of::<HandlePage>() == PAGE_SIZE);

impl HandlePage {
    /// Byte position of the slot array within the page.
    pub const SLOTS_OFFSET: usize = core::mem::offset_of!(HandlePage, handles);

    crate::le_accessors! {
        next: u32,
    }

    pub fn handles(&self) -> &[Handle; OVERFLOW_HANDLE_SLOTS] {
        &self.handles
    }

    /// In-buffer offset of slot `idx`, given this page's offset.
    pub fn slot_offset(page_off: Offset, idx: usize) -> Offset {
        debug_assert!(idx < OVERFLOW_HANDLE_SLOTS);
        page_off + (Self::SLOTS_OFFSET + idx * core::mem::size_of::<Handle>()) as u32
    }

    /// Formats a freshly claimed page as an empty overflow page.
    pub fn format(&mut self) {
        self.set_next(NIL_OFFSET);
        for handle in &mut self.handles {
            handle.reset();
        }
    }
}
