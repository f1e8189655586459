//! Directory and entity management: page allocation, name lookup, entity
//! creation and removal.
//!
//! Pages come from the root's free list first, then from bumping the
//! high-water mark; freed pages push back onto the list. New inodes are
//! minted from the parent's tail directory page's pool, or a freshly chained
//! page when the tail has no room. Removal back-fills the vacated link slot
//! with the chain's tail-most link, keeping every page's links
//! prefix-packed without preserving order (link order is not observable).

use crate::config::{DIR_SLOTS, MAX_NAME, PAGE_SIZE};
use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::storage::{
    parse, parse_mut, DirPage, FreePage, Inode, Offset, INODE_DIR, NIL_OFFSET, ROOT_INODE_OFFSET,
};

use super::Session;

impl<H: HostEnv> Session<H> {
    // ------------------------------------------------------------------
    // Page allocation
    // ------------------------------------------------------------------

    pub(super) fn alloc_page(&mut self) -> Result<Offset> {
        let (free_head, used, total) = {
            let root = self.root()?;
            (root.free_head(), root.used_pages(), root.total_pages())
        };

        if free_head != NIL_OFFSET {
            let next = parse::<FreePage>(self.page_bytes(free_head)?)?.next();
            // Writability (and, in a transaction, the patch) must be secured
            // before the root records the claim, or a failure here would
            // commit a claimed-but-unreachable page.
            self.page_bytes_mut(free_head)?;
            self.root_mut()?.set_free_head(next);
            return Ok(free_head);
        }

        if used < total {
            let off = used * PAGE_SIZE as u32;
            self.page_bytes_mut(off)?;
            self.root_mut()?.set_used_pages(used + 1);
            return Ok(off);
        }

        Err(FsError::OutOfMemory)
    }

    pub(super) fn free_page(&mut self, off: Offset) -> Result<()> {
        let head = self.root()?.free_head();
        parse_mut::<FreePage>(self.page_bytes_mut(off)?)?.set_next(head);
        self.root_mut()?.set_free_head(off);
        Ok(())
    }

    pub(super) fn alloc_dir_page(&mut self, prev: Offset) -> Result<Offset> {
        let off = self.alloc_page()?;
        self.dir_page_mut(off)?.format(prev);
        Ok(off)
    }

    pub(super) fn alloc_data_page(&mut self, prev: Offset) -> Result<Offset> {
        let off = self.alloc_page()?;
        self.data_page_mut(off)?.format(prev);
        Ok(off)
    }

    pub(super) fn alloc_user_page(&mut self, prev: Offset) -> Result<Offset> {
        let off = self.alloc_page()?;
        self.user_page_mut(off)?.format(prev);
        Ok(off)
    }

    pub(super) fn alloc_handle_page(&mut self) -> Result<Offset> {
        let off = self.alloc_page()?;
        self.handle_page_mut(off)?.format();
        Ok(off)
    }

    // ------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------

    /// The inode named `name` under `parent`, walking the parent's page
    /// chain. A non-directory parent has no children.
    pub(super) fn lookup_child(&self, parent: Offset, name: &[u8]) -> Result<Option<Offset>> {
        let p = self.load_inode(parent)?;
        if !p.is_dir() {
            return Ok(None);
        }
        let mut dp_off = p.head();
        while dp_off != NIL_OFFSET {
            let dp = self.dir_page(dp_off)?;
            if let Some(idx) = dp.find_link(name) {
                return Ok(Some(dp.links()[idx].target()));
            }
            dp_off = dp.next();
        }
        Ok(None)
    }

    /// Walks `comps` from the root inode.
    pub(super) fn resolve(&self, comps: &[&[u8]]) -> Result<Offset> {
        let mut cur = ROOT_INODE_OFFSET;
        for comp in comps {
            cur = self
                .lookup_child(cur, comp)?
                .ok_or(FsError::NotFound)?;
        }
        Ok(cur)
    }

    /// Splits a non-empty component list into (resolved parent inode, final
    /// name).
    pub(super) fn resolve_parent<'a>(&self, comps: &[&'a [u8]]) -> Result<(Offset, &'a [u8])> {
        let (last, init) = comps.split_last().expect("caller checked non-empty");
        Ok((self.resolve(init)?, last))
    }

    // ------------------------------------------------------------------
    // Create / remove
    // ------------------------------------------------------------------

    /// Creates an entry `name` under `parent`. With `target`, the entry is a
    /// hard link: the target inode's refcount goes up. Without, a fresh
    /// inode of kind `flags` is minted from the tail page's pool.
    /// Returns the inode offset behind the new entry.
    pub(super) fn create_entity(
        &mut self,
        parent: Offset,
        name: &[u8],
        flags: u32,
        target: Option<Offset>,
    ) -> Result<Offset> {
        if name.is_empty() || name.len() > MAX_NAME {
            return Err(FsError::Invalid);
        }
        let p = self.load_inode(parent)?;
        if !p.is_dir() {
            return Err(FsError::NotFound);
        }
        if self.lookup_child(parent, name)?.is_some() {
            return Err(FsError::Invalid);
        }

        let mut tail_off = p.tail();
        if tail_off == NIL_OFFSET {
            let page = self.alloc_dir_page(NIL_OFFSET)?;
            self.with_inode_mut(parent, |i| {
                i.set_head(page);
                i.set_tail(page);
            })?;
            tail_off = page;
        }

        // A slot for the link, and one in the inode pool when minting.
        let need_inode = target.is_none();
        let slots = {
            let tail = self.dir_page(tail_off)?;
            let link_idx = tail.link_count();
            let inode_idx = tail.free_inode_slot();
            match (link_idx < DIR_SLOTS, inode_idx) {
                (true, Some(i)) => Some((link_idx, i)),
                (true, None) if !need_inode => Some((link_idx, 0)),
                _ => None,
            }
        };
        let (tail_off, link_idx, inode_idx) = match slots {
            Some((l, i)) => (tail_off, l, i),
            None => {
                let page = self.alloc_dir_page(tail_off)?;
                self.dir_page_mut(tail_off)?.set_next(page);
                self.with_inode_mut(parent, |i| i.set_tail(page))?;
                (page, 0, 0)
            }
        };

        let inode_off = match target {
            Some(t) => {
                self.with_inode_mut(t, |i| {
                    let refs = i.refs();
                    i.set_refs(refs + 1);
                })?;
                t
            }
            None => {
                let off = DirPage::inode_offset(tail_off, inode_idx);
                let owner = self.attach_user_id()?;
                let mode = if flags & INODE_DIR != 0 { 0o755 } else { 0o644 };
                self.with_inode_mut(off, |i| i.init(flags, owner, mode))?;
                off
            }
        };

        self.dir_page_mut(tail_off)?.links_mut()[link_idx].fill(name, inode_off);
        Ok(inode_off)
    }

    /// Removes the entry `name` under `parent`. `expect_dir` selects rmdir
    /// semantics (directory target, must be empty) over unlink semantics
    /// (file target).
    pub(super) fn remove_entity(
        &mut self,
        parent: Offset,
        name: &[u8],
        expect_dir: bool,
    ) -> Result<()> {
        let (page_off, idx) = self
            .find_link_pos(parent, name)?
            .ok_or(FsError::NotFound)?;
        let inode_off = self.dir_page(page_off)?.links()[idx].target();
        let inode = self.load_inode(inode_off)?;

        if expect_dir {
            if !inode.is_dir() {
                return Err(FsError::Invalid);
            }
            if !self.dir_is_empty(&inode)? {
                return Err(FsError::Invalid);
            }
        } else if inode.is_dir() {
            return Err(FsError::IsDirectory);
        }

        self.remove_link_at(parent, page_off, idx)?;
        self.release_inode(inode_off)?;
        self.trim_dir_tail(parent)?;
        Ok(())
    }

    /// Drops one reference; the last one frees the content pages and the
    /// inode slot.
    pub(super) fn release_inode(&mut self, off: Offset) -> Result<()> {
        let inode = self.load_inode(off)?;
        let refs = inode.refs();
        if refs > 1 {
            self.with_inode_mut(off, |i| i.set_refs(refs - 1))?;
            return Ok(());
        }

        // Free the slot first: a directory's chain may host other inodes,
        // and the walk below must see this one as already gone.
        self.with_inode_mut(off, |i| {
            i.set_refs(0);
            i.set_head(NIL_OFFSET);
            i.set_tail(NIL_OFFSET);
            i.set_head_start(0);
            i.set_tail_end(0);
        })?;

        if inode.is_file() {
            let mut page = inode.head();
            while page != NIL_OFFSET {
                let next = self.data_page(page)?.next();
                self.free_page(page)?;
                page = next;
            }
        } else {
            // The directory is empty of links, but its pool pages may still
            // host inodes hard-linked from elsewhere; those pages are
            // detached and retained.
            let mut page = inode.head();
            while page != NIL_OFFSET {
                let (next, live) = {
                    let dp = self.dir_page(page)?;
                    (dp.next(), dp.hosts_live_inodes())
                };
                if !live {
                    self.free_page(page)?;
                }
                page = next;
            }
        }
        Ok(())
    }

    pub(super) fn dir_is_empty(&self, inode: &Inode) -> Result<bool> {
        let mut dp_off = inode.head();
        while dp_off != NIL_OFFSET {
            let dp = self.dir_page(dp_off)?;
            if dp.link_count() > 0 {
                return Ok(false);
            }
            dp_off = dp.next();
        }
        Ok(true)
    }

    fn find_link_pos(&self, parent: Offset, name: &[u8]) -> Result<Option<(Offset, usize)>> {
        let p = self.load_inode(parent)?;
        if !p.is_dir() {
            return Ok(None);
        }
        let mut dp_off = p.head();
        while dp_off != NIL_OFFSET {
            let dp = self.dir_page(dp_off)?;
            if let Some(idx) = dp.find_link(name) {
                return Ok(Some((dp_off, idx)));
            }
            dp_off = dp.next();
        }
        Ok(None)
    }

    /// Swap-remove: the chain's tail-most link back-fills the vacated slot,
    /// preserving prefix-packing in both pages.
    fn remove_link_at(&mut self, parent: Offset, page_off: Offset, idx: usize) -> Result<()> {
        let (donor_off, donor_idx) = self.tail_most_link(parent)?;
        if donor_off == page_off && donor_idx == idx {
            self.dir_page_mut(page_off)?.links_mut()[idx].clear();
        } else {
            let donor = self.dir_page(donor_off)?.links()[donor_idx];
            self.dir_page_mut(page_off)?.links_mut()[idx] = donor;
            self.dir_page_mut(donor_off)?.links_mut()[donor_idx].clear();
        }
        Ok(())
    }

    /// Position of the last used link in the chain: the last page that has
    /// any links, at its highest used slot. Pages past it may be linkless
    /// but still host live inodes.
    fn tail_most_link(&self, parent: Offset) -> Result<(Offset, usize)> {
        let p = self.load_inode(parent)?;
        let mut best = None;
        let mut dp_off = p.head();
        while dp_off != NIL_OFFSET {
            let dp = self.dir_page(dp_off)?;
            let count = dp.link_count();
            if count > 0 {
                best = Some((dp_off, count - 1));
            }
            dp_off = dp.next();
        }
        best.ok_or(FsError::Corrupt)
    }

    /// Unchains and frees trailing pages that carry neither links nor live
    /// inodes. The head page stays even when empty.
    fn trim_dir_tail(&mut self, parent: Offset) -> Result<()> {
        loop {
            let p = self.load_inode(parent)?;
            let tail = p.tail();
            if tail == NIL_OFFSET || tail == p.head() {
                return Ok(());
            }
            let (prev, links, live) = {
                let dp = self.dir_page(tail)?;
                (dp.prev(), dp.link_count(), dp.hosts_live_inodes())
            };
            if links > 0 || live {
                return Ok(());
            }
            self.dir_page_mut(prev)?.set_next(NIL_OFFSET);
            self.with_inode_mut(parent, |i| i.set_tail(prev))?;
            self.free_page(tail)?;
        }
    }
}
