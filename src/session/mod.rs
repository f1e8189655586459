//! # Sessions
//!
//! A [`Session`] is one attacher's local state: the buffer it is bound to,
//! its host environment, the lock ticket it holds (if any), the transaction
//! mode, and the patch table. Sessions are cheap; a process opens one per
//! logical attacher and calls operations sequentially on it.
//!
//! ## Offset resolution
//!
//! Two primitives mediate every access to shared memory:
//!
//! - `page_bytes` resolves a page offset through the patch table (if this
//!   session's open transaction already copied the page) and otherwise into
//!   the active half of the buffer.
//! - `page_bytes_mut` is the writable-address primitive. Outside a
//!   transaction it is identity, a mutable view straight into the buffer.
//!   Inside one, it copies the page into a host-allocated patch on first
//!   touch and returns the copy.
//!
//! Resolved references are deliberately short-lived: operations treat
//! offsets as identifiers and re-resolve at every step, so patching or
//! allocating a page can never invalidate a live borrow.
//!
//! ## Critical sections
//!
//! Every public operation brackets its work between `enter` (acquire the
//! lock, or refresh it when a transaction already holds it; run crash
//! restore when the acquire stole an expired ticket) and `finish` (perform
//! the throttled backup after a successful mutation, release the lock).
//! Errors unwind to `finish`, which always releases before reporting.

mod files;
mod handles;
mod ops;
mod tree;
mod txn;
mod users;

use std::sync::atomic::Ordering;

use tracing::debug;

use crate::backup;
use crate::config::{
    BACKUP_THROTTLE_MS, DEFAULT_WAIT_TIMEOUT_MS, HOLD_TIMEOUT_MS, MAX_PATCHES, PAGE_SIZE,
    USER_NAME_CAP,
};
use crate::error::{FsError, Result};
use crate::host::{HostEnv, SystemHost};
use crate::lock;
use crate::patch::PatchTable;
use crate::storage::{
    byte_of, page_of, parse, parse_mut, DataPage, DirPage, HandlePage, Inode, Offset, RootPage,
    SharedBuffer, UserPage, NIL_OFFSET,
};

pub use ops::{Fd, READ_CONSUME, READ_RESTART};

/// Transaction mode of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TxnMode {
    Off,
    On,
    /// Terminal: the lock refresh lost the ticket mid-transaction. Every
    /// operation fails without touching shared state until the transaction
    /// is ended.
    TimedOut,
}

/// Formats a buffer as an empty file system, or (with `refresh_only`)
/// re-initializes only the volatile portion of an already-formatted buffer
/// (the lock word is freed, the backup flag re-derived, and the backup
/// throttle reset), leaving the file-system state intact.
///
/// With `enable_backup` the buffer is halved and both halves initialized
/// identically; recovery after an attacher crash then restores from the
/// snapshot half. Without it, recovery is impossible and a detected crash
/// reports [`FsError::Corrupt`].
///
/// Call exactly once per buffer lifetime (plus refresh calls), before any
/// session attaches.
pub fn init(buffer: &SharedBuffer, enable_backup: bool, refresh_only: bool) -> Result<()> {
    if refresh_only {
        let page0 = buffer.slice_mut(0, PAGE_SIZE)?;
        let root: &mut RootPage = parse_mut(page0)?;
        if !root.stamp_valid() {
            return Err(FsError::Corrupt);
        }
        root.refresh(enable_backup);
        return Ok(());
    }

    let region = if enable_backup {
        buffer.len() / 2
    } else {
        buffer.len()
    };
    let pages = region / PAGE_SIZE;
    // Offsets are 32-bit: regions past 4 GiB are out of scope.
    if pages == 0 || pages > u32::MAX as usize / PAGE_SIZE {
        return Err(FsError::Invalid);
    }
    let total_pages = pages as u32;
    let half_len = pages * PAGE_SIZE;

    let page0 = buffer.slice_mut(0, PAGE_SIZE)?;
    page0.fill(0);
    let root: &mut RootPage = parse_mut(page0)?;
    root.format(total_pages, enable_backup);

    if enable_backup {
        // The halves are disjoint ranges of the same buffer.
        let src = buffer.slice(0, half_len)?;
        buffer.slice_mut(half_len, half_len)?.copy_from_slice(src);
    }

    debug!(total_pages, enable_backup, "buffer formatted");
    Ok(())
}

#[derive(Debug)]
pub struct Session<H: HostEnv = SystemHost> {
    buffer: SharedBuffer,
    host: H,
    /// Attach user name; resolved to an account id when entities are created.
    user: Option<Vec<u8>>,
    wait_timeout_ms: u64,
    txn: TxnMode,
    ticket: u64,
    patches: PatchTable,
    /// Bytes per half; fixed at format time, cached at attach.
    half_len: usize,
}

impl<H: HostEnv> Session<H> {
    /// Binds a session to a formatted buffer. Validates the stamp and
    /// geometry but takes no lock and performs no I/O.
    pub fn attach(buffer: SharedBuffer, user: Option<&str>, host: H) -> Result<Self> {
        let root: &RootPage = parse(buffer.slice(0, PAGE_SIZE)?)?;
        if !root.stamp_valid() {
            return Err(FsError::Corrupt);
        }

        let total_pages = root.total_pages();
        let half_len = total_pages as usize * PAGE_SIZE;
        if total_pages == 0 || half_len > buffer.len() {
            return Err(FsError::Invalid);
        }
        if buffer.backup_flag().load(Ordering::Relaxed) >= 0 && half_len * 2 > buffer.len() {
            return Err(FsError::Invalid);
        }

        if let Some(name) = user {
            if name.is_empty() || name.len() > USER_NAME_CAP {
                return Err(FsError::Invalid);
            }
        }

        Ok(Self {
            buffer,
            host,
            user: user.map(|s| s.as_bytes().to_vec()),
            wait_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            txn: TxnMode::Off,
            ticket: 0,
            patches: PatchTable::new(),
            half_len,
        })
    }

    /// Bounds how long operations wait for the lock before reporting
    /// [`FsError::TimedOut`].
    pub fn set_wait_timeout(&mut self, ms: u64) {
        self.wait_timeout_ms = ms;
    }

    /// Call during long pauses: refreshes the lock when a transaction is
    /// open (a transaction idle past the hold timeout loses its ticket) and
    /// opportunistically performs a backup, skipping silently when another
    /// attacher holds the lock.
    pub fn idle(&mut self) -> Result<()> {
        match self.txn {
            TxnMode::TimedOut => Err(FsError::TimedOut),
            TxnMode::On => {
                self.refresh_or_poison()?;
                backup::perform(&self.buffer, &self.host, self.half_len, BACKUP_THROTTLE_MS)
            }
            TxnMode::Off => {
                let got =
                    match lock::acquire(self.buffer.lock_word(), &self.host, 0, HOLD_TIMEOUT_MS) {
                        Ok(got) => got,
                        Err(FsError::TimedOut) | Err(FsError::Busy) => return Ok(()),
                        Err(e) => return Err(e),
                    };
                let mut result = if got.stole_expired {
                    backup::restore(&self.buffer, &self.host, self.half_len)
                } else {
                    Ok(())
                };
                if result.is_ok() {
                    result = backup::perform(
                        &self.buffer,
                        &self.host,
                        self.half_len,
                        BACKUP_THROTTLE_MS,
                    );
                }
                let released = lock::release(self.buffer.lock_word(), &self.host, got.ticket);
                result.and(released)
            }
        }
    }

    // ------------------------------------------------------------------
    // Critical section
    // ------------------------------------------------------------------

    fn refresh_or_poison(&mut self) -> Result<()> {
        match lock::refresh(
            self.buffer.lock_word(),
            &self.host,
            self.ticket,
            HOLD_TIMEOUT_MS,
        ) {
            Ok(ticket) => {
                self.ticket = ticket;
                Ok(())
            }
            Err(FsError::TimedOut) => {
                self.txn = TxnMode::TimedOut;
                Err(FsError::TimedOut)
            }
            Err(e) => Err(e),
        }
    }

    fn enter(&mut self) -> Result<()> {
        match self.txn {
            TxnMode::TimedOut => Err(FsError::TimedOut),
            TxnMode::On => self.refresh_or_poison(),
            TxnMode::Off => self.acquire_lock(),
        }
    }

    /// Acquires the lock and, when the acquire stole an expired ticket, runs
    /// crash restore before any shared-state access.
    fn acquire_lock(&mut self) -> Result<()> {
        let got = lock::acquire(
            self.buffer.lock_word(),
            &self.host,
            self.wait_timeout_ms,
            HOLD_TIMEOUT_MS,
        )?;
        self.ticket = got.ticket;
        if got.stole_expired {
            if let Err(e) = backup::restore(&self.buffer, &self.host, self.half_len) {
                let _ = lock::release(self.buffer.lock_word(), &self.host, self.ticket);
                self.ticket = 0;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Leaves the critical section. Outside a transaction this backs up
    /// (after a successful mutation only) and releases; inside one the lock
    /// is kept. Operation errors take precedence over exit errors.
    fn finish<T>(&mut self, out: Result<T>) -> Result<T> {
        if self.txn != TxnMode::Off {
            return out;
        }

        let backed_up = if out.is_ok() {
            backup::perform(&self.buffer, &self.host, self.half_len, BACKUP_THROTTLE_MS)
        } else {
            Ok(())
        };
        let released = lock::release(self.buffer.lock_word(), &self.host, self.ticket);
        self.ticket = 0;

        let value = out?;
        backed_up?;
        released?;
        Ok(value)
    }

    // ------------------------------------------------------------------
    // Offset resolution
    // ------------------------------------------------------------------

    fn active_base(&self) -> usize {
        if self.buffer.backup_flag().load(Ordering::Relaxed) == 1 {
            self.half_len
        } else {
            0
        }
    }

    fn check_page_off(&self, page_off: Offset) -> Result<()> {
        if page_off == NIL_OFFSET
            || byte_of(page_off) != 0
            || page_off as usize + PAGE_SIZE > self.half_len
        {
            return Err(FsError::Corrupt);
        }
        Ok(())
    }

    /// Read view of the page at `page_off`, routed through this session's
    /// patch table.
    fn page_bytes(&self, page_off: Offset) -> Result<&[u8]> {
        self.check_page_off(page_off)?;
        if let Some(patch) = self.patches.lookup(page_off) {
            // SAFETY: the patch is a live page-sized allocation owned by
            // this session; it is freed only on commit/rollback/drop, which
            // take &mut self.
            return Ok(unsafe { std::slice::from_raw_parts(patch.as_ptr(), PAGE_SIZE) });
        }
        self.buffer
            .slice(self.active_base() + page_off as usize, PAGE_SIZE)
    }

    /// Writable-address: a mutable view of the page at `page_off`. Identity
    /// outside a transaction; inside one, the page is copied into a patch on
    /// first touch and the copy is returned.
    fn page_bytes_mut(&mut self, page_off: Offset) -> Result<&mut [u8]> {
        self.check_page_off(page_off)?;
        match self.txn {
            TxnMode::TimedOut => Err(FsError::TimedOut),
            TxnMode::Off => self
                .buffer
                .slice_mut(self.active_base() + page_off as usize, PAGE_SIZE),
            TxnMode::On => {
                self.ensure_patch(page_off)?;
                let patch = self.patches.lookup(page_off).expect("patch just ensured");
                // SAFETY: as in page_bytes; &mut self gives exclusivity.
                Ok(unsafe { std::slice::from_raw_parts_mut(patch.as_ptr(), PAGE_SIZE) })
            }
        }
    }

    fn ensure_patch(&mut self, page_off: Offset) -> Result<()> {
        if self.patches.lookup(page_off).is_some() {
            return Ok(());
        }
        if self.patches.len() == MAX_PATCHES {
            return Err(FsError::OutOfMemory);
        }
        let patch = self.host.alloc_page().ok_or(FsError::OutOfMemory)?;
        let src = self
            .buffer
            .slice(self.active_base() + page_off as usize, PAGE_SIZE)?;
        // SAFETY: the fresh allocation is page-sized and unaliased.
        unsafe { std::slice::from_raw_parts_mut(patch.as_ptr(), PAGE_SIZE) }.copy_from_slice(src);
        self.patches.insert(page_off, patch)
    }

    fn drop_patches(&mut self) -> Result<()> {
        let mut first_err = Ok(());
        for patch in self.patches.take() {
            if let Err(e) = self.host.free_page(patch.page) {
                if first_err.is_ok() {
                    first_err = Err(e);
                }
            }
        }
        first_err
    }

    // ------------------------------------------------------------------
    // Typed views
    // ------------------------------------------------------------------

    fn root(&self) -> Result<&RootPage> {
        parse(self.page_bytes(0)?)
    }

    fn root_mut(&mut self) -> Result<&mut RootPage> {
        parse_mut(self.page_bytes_mut(0)?)
    }

    fn dir_page(&self, page_off: Offset) -> Result<&DirPage> {
        parse(self.page_bytes(page_off)?)
    }

    fn dir_page_mut(&mut self, page_off: Offset) -> Result<&mut DirPage> {
        parse_mut(self.page_bytes_mut(page_off)?)
    }

    fn data_page(&self, page_off: Offset) -> Result<&DataPage> {
        parse(self.page_bytes(page_off)?)
    }

    fn data_page_mut(&mut self, page_off: Offset) -> Result<&mut DataPage> {
        parse_mut(self.page_bytes_mut(page_off)?)
    }

    fn user_page(&self, page_off: Offset) -> Result<&UserPage> {
        parse(self.page_bytes(page_off)?)
    }

    fn user_page_mut(&mut self, page_off: Offset) -> Result<&mut UserPage> {
        parse_mut(self.page_bytes_mut(page_off)?)
    }

    fn handle_page(&self, page_off: Offset) -> Result<&HandlePage> {
        parse(self.page_bytes(page_off)?)
    }

    fn handle_page_mut(&mut self, page_off: Offset) -> Result<&mut HandlePage> {
        parse_mut(self.page_bytes_mut(page_off)?)
    }

    fn check_struct_off(&self, off: Offset, size: usize) -> Result<()> {
        if off == NIL_OFFSET || off % 4 != 0 || byte_of(off) + size > PAGE_SIZE {
            return Err(FsError::Corrupt);
        }
        Ok(())
    }

    /// Copies out the inode at `off`. Inodes are small; operations load
    /// them, compute, and write back through `with_inode_mut` rather than
    /// holding borrows across page access.
    fn load_inode(&self, off: Offset) -> Result<Inode> {
        self.check_struct_off(off, core::mem::size_of::<Inode>())?;
        let page = self.page_bytes(page_of(off))?;
        let byte = byte_of(off);
        Ok(*parse::<Inode>(&page[byte..])?)
    }

    fn with_inode_mut<R>(&mut self, off: Offset, f: impl FnOnce(&mut Inode) -> R) -> Result<R> {
        self.check_struct_off(off, core::mem::size_of::<Inode>())?;
        let byte = byte_of(off);
        let page = self.page_bytes_mut(page_of(off))?;
        let inode: &mut Inode = parse_mut(&mut page[byte..])?;
        Ok(f(inode))
    }
}

impl<H: HostEnv> Drop for Session<H> {
    /// Dropping a session mid-transaction behaves like a rollback: patches
    /// are freed and the lock released, best-effort. Shared state is never
    /// touched.
    fn drop(&mut self) {
        if self.txn == TxnMode::On {
            let _ = lock::release(self.buffer.lock_word(), &self.host, self.ticket);
        }
        let _ = self.drop_patches();
    }
}
