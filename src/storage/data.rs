//! # File Data Pages
//!
//! A regular file's bytes live in a doubly linked chain of data pages. The
//! owning inode's `head_start` and `tail_end` delimit the live payload: the
//! head page contributes `[head_start, 4088)`, middle pages their full
//! payload, and the tail page `[0, tail_end)`. A single-page file contributes
//! `[head_start, tail_end)`. Consuming reads advance `head_start` and free
//! drained head pages; appends fill the tail page and chain new ones.

use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{DATA_PAYLOAD, PAGE_SIZE};

use super::{Offset, NIL_OFFSET};

#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct DataPage {
    prev: U32,
    next: U32,
    data: [u8; DATA_PAYLOAD],
}

const _: () = assert!(core::mem::size_of::<DataPage>() == PAGE_SIZE);

impl DataPage {
    crate::le_accessors! {
        prev: u32,
        next: u32,
    }

    pub fn is_head(&self) -> bool {
        self.prev() == NIL_OFFSET
    }

    pub fn is_tail(&self) -> bool {
        self.next() == NIL_OFFSET
    }

    pub fn data(&self) -> &[u8; DATA_PAYLOAD] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8; DATA_PAYLOAD] {
        &mut self.data
    }

    /// The live payload window of this page within a chain whose inode
    /// carries `head_start` and `tail_end`.
    pub fn window(&self, head_start: u16, tail_end: u16) -> (usize, usize) {
        let start = if self.is_head() { head_start as usize } else { 0 };
        let end = if self.is_tail() {
            tail_end as usize
        } else {
            DATA_PAYLOAD
        };
        (start, end.max(start))
    }

    /// Formats a freshly claimed page as an unchained data page.
    pub fn format(&mut self, prev: Offset) {
        self.set_prev(prev);
        self.set_next(NIL_OFFSET);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::FromZeros;

    #[test]
    fn data_page_size_is_one_page() {
        assert_eq!(core::mem::size_of::<DataPage>(), PAGE_SIZE);
    }

    #[test]
    fn single_page_window_is_head_start_to_tail_end() {
        let mut page = DataPage::new_zeroed();
        page.format(NIL_OFFSET);

        assert_eq!(page.window(10, 100), (10, 100));
    }

    #[test]
    fn middle_page_window_is_full_payload() {
        let mut page = DataPage::new_zeroed();
        page.set_prev(4096);
        page.set_next(8192);

        assert_eq!(page.window(10, 100), (0, DATA_PAYLOAD));
    }

    #[test]
    fn head_page_window_starts_at_head_start() {
        let mut page = DataPage::new_zeroed();
        page.set_prev(NIL_OFFSET);
        page.set_next(8192);

        assert_eq!(page.window(10, 100), (10, DATA_PAYLOAD));
    }

    #[test]
    fn tail_page_window_ends_at_tail_end() {
        let mut page = DataPage::new_zeroed();
        page.set_prev(4096);
        page.set_next(NIL_OFFSET);

        assert_eq!(page.window(10, 100), (0, 100));
    }

    #[test]
    fn empty_single_page_window_is_empty() {
        let mut page = DataPage::new_zeroed();
        page.format(NIL_OFFSET);

        let (start, end) = page.window(50, 50);
        assert_eq!(start, end);
    }
}
