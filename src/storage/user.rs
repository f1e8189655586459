//! # User Record Pages
//!
//! The flat user table: a doubly linked chain of pages holding fixed 64-byte
//! records. A record with account id 0 is an empty slot. Account ids are
//! allocated from a counter in the root page and never reused.

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{PAGE_SIZE, USER_NAME_CAP, USER_SLOTS};

use super::{Offset, NIL_OFFSET};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UserRecord {
    id: U32,
    name: [u8; USER_NAME_CAP],
}

const _: () = assert!(core::mem::size_of::<UserRecord>() == 64);

impl UserRecord {
    crate::le_accessors! {
        id: u32,
    }

    pub fn is_empty(&self) -> bool {
        self.id() == 0
    }

    pub fn name_bytes(&self) -> &[u8] {
        let len = self
            .name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(USER_NAME_CAP);
        &self.name[..len]
    }

    pub fn fill(&mut self, id: u32, name: &[u8]) {
        debug_assert!(id != 0 && !name.is_empty() && name.len() <= USER_NAME_CAP);
        self.set_id(id);
        self.name = [0; USER_NAME_CAP];
        self.name[..name.len()].copy_from_slice(name);
    }

    pub fn clear(&mut self) {
        self.set_id(0);
        self.name = [0; USER_NAME_CAP];
    }
}

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct UserPage {
    prev: U32,
    next: U32,
    users: [UserRecord; USER_SLOTS],
    reserved: [u8; 56],
}

const _: () = assert!(core::mem::size_of::<UserPage>() == PAGE_SIZE);

impl UserPage {
    crate::le_accessors! {
        prev: u32,
        next: u32,
    }

    pub fn users(&self) -> &[UserRecord; USER_SLOTS] {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut [UserRecord; USER_SLOTS] {
        &mut self.users
    }

    pub fn empty_slot(&self) -> Option<usize> {
        self.users.iter().position(|u| u.is_empty())
    }

    pub fn find_name(&self, name: &[u8]) -> Option<usize> {
        self.users
            .iter()
            .position(|u| !u.is_empty() && u.name_bytes() == name)
    }

    /// Formats a freshly claimed page as an empty user page.
    pub fn format(&mut self, prev: Offset) {
        self.set_prev(prev);
        self.set_next(NIL_OFFSET);
        for user in &mut self.users {
            user.clear();
        }
        self.reserved = [0; 56];
    }
}
