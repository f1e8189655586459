//! # Root Page
//!
//! Page 0 of each half. The first 32 bytes are the **volatile prefix**: the
//! format stamp plus the three fields that coordinate attachers across
//! processes (lock word, backup flag, last-backup time). Those three are only
//! ever addressed through atomics at the buffer base (the lower half),
//! regardless of which half is active, and backup/restore copies skip the
//! prefix so they survive half flips and can never be clobbered by a
//! committed root-page patch.
//!
//! ## Layout (4096 bytes, all fields little-endian)
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -------------------------------------------
//! 0       8     stamp          format magic + version
//! 8       8     lock           0 = free, else ms-UTC expiry ticket
//! 16      4     backup         -1 = off, 0 = lower half active, 1 = upper
//! 20      4     reserved
//! 24      8     last_backup_ms
//! ------  ----  --- end of volatile prefix ----------------
//! 32      4     next_user_id   account id counter, starts at 1
//! 36      4     free_head      free-page list head
//! 40      4     user_head      user page chain head
//! 44      4     user_tail      user page chain tail
//! 48      4     handle_head    handle-overflow chain head
//! 52      4     total_pages    pages per half, fixed at format time
//! 56      4     used_pages     high-water mark of claimed pages
//! 60      4     reserved
//! 64      28    root_inode     the root directory
//! 92      3996  handles        333 inline slots, 12 bytes each
//! 4088    8     reserved
//! ```

use zerocopy::little_endian::{I32, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PAGE_SIZE, ROOT_HANDLE_SLOTS, VOLATILE_PREFIX};

use super::dir::{Inode, INODE_DIR};
use super::handle::Handle;
use super::{Offset, NIL_OFFSET};

/// Format stamp: magic plus a format generation byte.
pub const STAMP: [u8; 8] = *b"CozyFS\x01\0";

/// Byte position of the lock word within the buffer.
pub const LOCK_WORD_OFFSET: usize = 8;
/// Byte position of the backup flag within the buffer.
pub const BACKUP_FLAG_OFFSET: usize = 16;
/// Byte position of the last-backup time within the buffer.
pub const LAST_BACKUP_OFFSET: usize = 24;

/// In-buffer offset of the root directory's inode. The root inode is
/// addressed like any other: through its offset.
pub const ROOT_INODE_OFFSET: Offset = 64;

/// Backup disabled.
pub const BACKUP_OFF: i32 = -1;

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RootPage {
    stamp: [u8; 8],
    lock: U64,
    backup: I32,
    reserved0: [u8; 4],
    last_backup_ms: U64,
    next_user_id: U32,
    free_head: U32,
    user_head: U32,
    user_tail: U32,
    handle_head: U32,
    total_pages: U32,
    used_pages: U32,
    reserved1: [u8; 4],
    root_inode: Inode,
    handles: [Handle; ROOT_HANDLE_SLOTS],
    reserved2: [u8; 8],
}

const _: () = assert!(core::mem::size_of::<RootPage>() == PAGE_SIZE);
const _: () = assert!(core::mem::offset_of!(RootPage, lock) == LOCK_WORD_OFFSET);
const _: () = assert!(core::mem::offset_of!(RootPage, backup) == BACKUP_FLAG_OFFSET);
const _: () = assert!(core::mem::offset_of!(RootPage, last_backup_ms) == LAST_BACKUP_OFFSET);
const _: () = assert!(core::mem::offset_of!(RootPage, next_user_id) == VOLATILE_PREFIX);
const _: () = assert!(core::mem::offset_of!(RootPage, root_inode) == ROOT_INODE_OFFSET as usize);

impl RootPage {
    /// Byte position of the inline handle array.
    pub const HANDLES_OFFSET: usize = core::mem::offset_of!(RootPage, handles);

    crate::le_accessors! {
        next_user_id: u32,
        free_head: u32,
        user_head: u32,
        user_tail: u32,
        handle_head: u32,
        total_pages: u32,
        used_pages: u32,
    }

    pub fn stamp_valid(&self) -> bool {
        self.stamp == STAMP
    }

    pub fn root_inode(&self) -> &Inode {
        &self.root_inode
    }

    pub fn handles(&self) -> &[Handle; ROOT_HANDLE_SLOTS] {
        &self.handles
    }

    /// In-buffer offset of inline handle slot `idx`.
    pub fn handle_offset(idx: usize) -> Offset {
        debug_assert!(idx < ROOT_HANDLE_SLOTS);
        (Self::HANDLES_OFFSET + idx * core::mem::size_of::<Handle>()) as u32
    }

    /// Formats a fresh root page: empty root directory, no users, no free
    /// pages, all inline handle slots unused at generation 1. The lock is
    /// free and the backup flag selects the lower half (or marks backup off).
    pub fn format(&mut self, total_pages: u32, backup: bool) {
        self.stamp = STAMP;
        self.lock = U64::new(0);
        self.backup = I32::new(if backup { 0 } else { BACKUP_OFF });
        self.reserved0 = [0; 4];
        self.last_backup_ms = U64::new(0);
        self.set_next_user_id(1);
        self.set_free_head(NIL_OFFSET);
        self.set_user_head(NIL_OFFSET);
        self.set_user_tail(NIL_OFFSET);
        self.set_handle_head(NIL_OFFSET);
        self.set_total_pages(total_pages);
        self.set_used_pages(1);
        self.reserved1 = [0; 4];
        self.root_inode.init(INODE_DIR, 0, 0o755);
        for handle in &mut self.handles {
            handle.reset();
        }
        self.reserved2 = [0; 8];
    }

    /// Re-initializes only the volatile portion, leaving all file-system
    /// state intact: the lock is freed, the backup flag re-derived, and the
    /// backup throttle reset.
    pub fn refresh(&mut self, backup: bool) {
        self.lock = U64::new(0);
        let flag = self.backup.get();
        self.backup = I32::new(match (backup, flag) {
            (false, _) => BACKUP_OFF,
            (true, 0) | (true, 1) => flag,
            (true, _) => 0,
        });
        self.last_backup_ms = U64::new(0);
    }
}
