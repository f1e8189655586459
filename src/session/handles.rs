//! Handle table: descriptor packing, slot search across the inline array
//! and the overflow chain, open and close.

use crate::config::{HANDLE_INDEX_LIMIT, OVERFLOW_HANDLE_SLOTS, ROOT_HANDLE_SLOTS};
use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::storage::{byte_of, page_of, parse, parse_mut, Handle, HandlePage, Offset, RootPage, NIL_OFFSET};

use super::ops::Fd;
use super::Session;

impl<H: HostEnv> Session<H> {
    /// In-buffer offset of handle slot `index`, or `None` when the index is
    /// past the allocated slot supply.
    fn handle_location(&self, index: usize) -> Result<Option<Offset>> {
        if index < ROOT_HANDLE_SLOTS {
            return Ok(Some(RootPage::handle_offset(index)));
        }
        let mut rel = index - ROOT_HANDLE_SLOTS;
        let mut page = self.root()?.handle_head();
        while page != NIL_OFFSET {
            if rel < OVERFLOW_HANDLE_SLOTS {
                return Ok(Some(HandlePage::slot_offset(page, rel)));
            }
            rel -= OVERFLOW_HANDLE_SLOTS;
            page = self.handle_page(page)?.next();
        }
        Ok(None)
    }

    fn load_handle(&self, off: Offset) -> Result<Handle> {
        self.check_struct_off(off, core::mem::size_of::<Handle>())?;
        let page = self.page_bytes(page_of(off))?;
        Ok(*parse::<Handle>(&page[byte_of(off)..])?)
    }

    pub(super) fn with_handle_mut<R>(
        &mut self,
        off: Offset,
        f: impl FnOnce(&mut Handle) -> R,
    ) -> Result<R> {
        self.check_struct_off(off, core::mem::size_of::<Handle>())?;
        let byte = byte_of(off);
        let page = self.page_bytes_mut(page_of(off))?;
        let handle: &mut Handle = parse_mut(&mut page[byte..])?;
        Ok(f(handle))
    }

    /// Unpacks and validates a descriptor: in-range index, live slot,
    /// matching generation.
    pub(super) fn handle_by_fd(&self, fd: Fd) -> Result<(Offset, Handle)> {
        let gen = (fd >> 16) as u16;
        let index = (fd & 0xFFFF) as usize;
        let off = self
            .handle_location(index)?
            .ok_or(FsError::BadDescriptor)?;
        let handle = self.load_handle(off)?;
        if gen == 0 || !handle.is_used() || handle.gen() != gen {
            return Err(FsError::BadDescriptor);
        }
        Ok((off, handle))
    }

    /// First unused slot: the inline array, then the overflow chain, then a
    /// freshly allocated overflow page. Fails with
    /// [`FsError::HandleTableFull`] once the 16-bit index space is spent.
    fn claim_handle_slot(&mut self) -> Result<(usize, Offset)> {
        {
            let root = self.root()?;
            for (i, handle) in root.handles().iter().enumerate() {
                if !handle.is_used() {
                    return Ok((i, RootPage::handle_offset(i)));
                }
            }
        }

        let mut index = ROOT_HANDLE_SLOTS;
        let mut page = self.root()?.handle_head();
        let mut last_page = NIL_OFFSET;
        while page != NIL_OFFSET {
            let next = {
                let hp = self.handle_page(page)?;
                for (i, handle) in hp.handles().iter().enumerate() {
                    if !handle.is_used() {
                        if index + i >= HANDLE_INDEX_LIMIT {
                            return Err(FsError::HandleTableFull);
                        }
                        return Ok((index + i, HandlePage::slot_offset(page, i)));
                    }
                }
                hp.next()
            };
            index += OVERFLOW_HANDLE_SLOTS;
            last_page = page;
            page = next;
        }

        if index >= HANDLE_INDEX_LIMIT {
            return Err(FsError::HandleTableFull);
        }
        let new_page = self.alloc_handle_page()?;
        if last_page == NIL_OFFSET {
            self.root_mut()?.set_handle_head(new_page);
        } else {
            self.handle_page_mut(last_page)?.set_next(new_page);
        }
        Ok((index, HandlePage::slot_offset(new_page, 0)))
    }

    /// Opens a handle on an already-resolved file inode and returns the
    /// packed descriptor.
    pub(super) fn open_handle(&mut self, inode_off: Offset) -> Result<Fd> {
        let (index, slot_off) = self.claim_handle_slot()?;
        let gen = self.load_handle(slot_off)?.gen();
        self.with_handle_mut(slot_off, |h| h.open(inode_off))?;
        self.with_inode_mut(inode_off, |i| {
            let refs = i.refs();
            i.set_refs(refs + 1);
        })?;
        Ok(((gen as u32) << 16) | index as u32)
    }

    pub(super) fn open_locked(&mut self, comps: &[&[u8]]) -> Result<Fd> {
        let inode_off = self.resolve(comps)?;
        let inode = self.load_inode(inode_off)?;
        if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }
        self.open_handle(inode_off)
    }

    pub(super) fn close_locked(&mut self, fd: Fd) -> Result<()> {
        let (slot_off, handle) = self.handle_by_fd(fd)?;
        self.release_inode(handle.inode())?;
        self.with_handle_mut(slot_off, |h| h.close())?;
        Ok(())
    }
}
