//! File content: reads over the data-page chain with cursor, restart, and
//! consume semantics; appends at the logical tail.
//!
//! Reads walk the chain from the head, skipping to the handle's cursor and
//! copying through each page's payload window. A cursor pointing past the
//! end (another attacher consumed bytes out from under it) is clamped.
//! Consuming reads remove exactly the bytes returned from the front of the
//! file, advancing `head_start` and freeing drained head pages; they require
//! a zero cursor so the consumed bytes are the ones just read.
//!
//! Appends always go to the file's logical tail, independent of any read
//! cursor, filling the tail page and chaining fresh ones.

use crate::config::DATA_PAYLOAD;
use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::storage::{Offset, NIL_OFFSET};

use super::ops::{Fd, READ_CONSUME, READ_RESTART};
use super::Session;

impl<H: HostEnv> Session<H> {
    pub(super) fn read_locked(&mut self, fd: Fd, dst: &mut [u8], flags: u32) -> Result<usize> {
        let (slot_off, handle) = self.handle_by_fd(fd)?;
        let inode_off = handle.inode();
        let inode = self.load_inode(inode_off)?;
        if !inode.is_file() {
            return Err(FsError::Invalid);
        }

        let consume = flags & READ_CONSUME != 0;
        if consume && handle.cursor() != 0 {
            return Err(FsError::Invalid);
        }

        let wanted = if flags & READ_RESTART != 0 {
            0
        } else {
            handle.cursor() as usize
        };

        // Walk to the cursor, clamping at end of file.
        let mut page = inode.head();
        let mut skipped = 0usize;
        let mut offset_in_window = 0usize;
        while page != NIL_OFFSET {
            let (start, end, next) = {
                let dp = self.data_page(page)?;
                let (s, e) = dp.window(inode.head_start(), inode.tail_end());
                (s, e, dp.next())
            };
            let len = end - start;
            if skipped + len > wanted {
                offset_in_window = wanted - skipped;
                skipped = wanted;
                break;
            }
            skipped += len;
            page = next;
        }
        let cursor = skipped;

        let mut copied = 0usize;
        while page != NIL_OFFSET && copied < dst.len() {
            let next = {
                let dp = self.data_page(page)?;
                let (start, end) = dp.window(inode.head_start(), inode.tail_end());
                let from = start + offset_in_window;
                let n = (end - from).min(dst.len() - copied);
                dst[copied..copied + n].copy_from_slice(&dp.data()[from..from + n]);
                copied += n;
                dp.next()
            };
            offset_in_window = 0;
            page = next;
        }

        if consume {
            self.consume_front(inode_off, copied)?;
            // The cursor was and stays zero: the file's origin moved instead.
        } else {
            self.with_handle_mut(slot_off, |h| h.set_cursor((cursor + copied) as u32))?;
        }
        Ok(copied)
    }

    pub(super) fn write_locked(&mut self, fd: Fd, src: &[u8]) -> Result<usize> {
        let (_slot_off, handle) = self.handle_by_fd(fd)?;
        let inode_off = handle.inode();
        let inode = self.load_inode(inode_off)?;
        if !inode.is_file() {
            return Err(FsError::Invalid);
        }
        if src.is_empty() {
            return Ok(0);
        }

        if inode.head() == NIL_OFFSET {
            let page = self.alloc_data_page(NIL_OFFSET)?;
            self.with_inode_mut(inode_off, |i| {
                i.set_head(page);
                i.set_tail(page);
                i.set_head_start(0);
                i.set_tail_end(0);
            })?;
        }

        let mut written = 0usize;
        while written < src.len() {
            let inode = self.load_inode(inode_off)?;
            let tail = inode.tail();
            let end = inode.tail_end() as usize;
            let space = DATA_PAYLOAD - end;

            if space == 0 {
                match self.alloc_data_page(tail) {
                    Ok(page) => {
                        self.data_page_mut(tail)?.set_next(page);
                        self.with_inode_mut(inode_off, |i| {
                            i.set_tail(page);
                            i.set_tail_end(0);
                        })?;
                        continue;
                    }
                    // Out of pages with some bytes down: report the short
                    // count; the caller sees n < len.
                    Err(FsError::OutOfMemory) if written > 0 => break,
                    Err(e) => return Err(e),
                }
            }

            let n = space.min(src.len() - written);
            self.data_page_mut(tail)?.data_mut()[end..end + n]
                .copy_from_slice(&src[written..written + n]);
            self.with_inode_mut(inode_off, |i| i.set_tail_end((end + n) as u16))?;
            written += n;
        }
        Ok(written)
    }

    /// Removes `n` bytes from the front of the file, freeing fully drained
    /// head pages. `n` never exceeds the file's byte count (it is a count of
    /// bytes just read out of it).
    fn consume_front(&mut self, inode_off: Offset, mut n: usize) -> Result<()> {
        while n > 0 {
            let inode = self.load_inode(inode_off)?;
            let head = inode.head();
            debug_assert_ne!(head, NIL_OFFSET);

            let (start, end, next) = {
                let dp = self.data_page(head)?;
                let (s, e) = dp.window(inode.head_start(), inode.tail_end());
                (s, e, dp.next())
            };
            let avail = end - start;

            if n < avail {
                self.with_inode_mut(inode_off, |i| i.set_head_start((start + n) as u16))?;
                return Ok(());
            }

            n -= avail;
            if next != NIL_OFFSET {
                self.data_page_mut(next)?.set_prev(NIL_OFFSET);
                self.with_inode_mut(inode_off, |i| {
                    i.set_head(next);
                    i.set_head_start(0);
                })?;
            } else {
                // Fully drained single (or last) page: the file is empty.
                self.with_inode_mut(inode_off, |i| {
                    i.set_head(NIL_OFFSET);
                    i.set_tail(NIL_OFFSET);
                    i.set_head_start(0);
                    i.set_tail_end(0);
                })?;
            }
            self.free_page(head)?;
        }
        Ok(())
    }
}
