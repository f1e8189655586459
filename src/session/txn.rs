//! Copy-on-write transactions.
//!
//! A transaction holds the lock for its full duration: begin acquires, every
//! operation inside refreshes, commit and rollback release. Serialization by
//! the lock is the whole conflict story: no other writer can interleave, so
//! commit needs no version checks.
//!
//! While the transaction is open, mutations land in host-allocated patch
//! pages (see [`crate::patch`]); the shared buffer is untouched until commit
//! copies the patches back, which makes rollback free and a crashed
//! transaction invisible to other attachers.

use tracing::debug;

use crate::backup;
use crate::config::{PAGE_SIZE, VOLATILE_PREFIX};
use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::lock;

use super::{Session, TxnMode};

impl<H: HostEnv> Session<H> {
    /// Opens a transaction: acquires the lock (waiting up to the session's
    /// wait timeout) and turns on copy-on-write. Fails with
    /// [`FsError::Invalid`] if a transaction is already open.
    pub fn transaction_begin(&mut self) -> Result<()> {
        if self.txn != TxnMode::Off {
            return Err(FsError::Invalid);
        }
        self.acquire_lock()?;
        self.txn = TxnMode::On;
        Ok(())
    }

    /// Publishes the transaction: every patch is copied back into the
    /// active half, a backup runs unthrottled, and the lock is released.
    /// In the terminal timeout state the patches are dropped instead and
    /// [`FsError::TimedOut`] is reported.
    pub fn transaction_commit(&mut self) -> Result<()> {
        match self.txn {
            TxnMode::Off => Err(FsError::Invalid),
            TxnMode::TimedOut => {
                let _ = self.drop_patches();
                self.txn = TxnMode::Off;
                Err(FsError::TimedOut)
            }
            TxnMode::On => {
                // One last refresh: if the ticket is already gone, nothing
                // may be copied back.
                if let Err(e) = self.refresh_or_poison() {
                    let _ = self.drop_patches();
                    self.txn = TxnMode::Off;
                    return Err(e);
                }

                let patch_count = self.patches.len();
                let base = self.active_base();
                let mut first_err = Ok(());
                for patch in self.patches.take() {
                    // SAFETY: patches are live page-sized allocations owned
                    // by this session until freed below.
                    let src =
                        unsafe { std::slice::from_raw_parts(patch.page.as_ptr(), PAGE_SIZE) };
                    let copied = self
                        .buffer
                        .slice_mut(base + patch.page_off as usize, PAGE_SIZE)
                        .map(|dst| {
                            if patch.page_off == 0 {
                                // The root patch carries stale volatile
                                // fields; never let them reach the buffer.
                                dst[VOLATILE_PREFIX..].copy_from_slice(&src[VOLATILE_PREFIX..]);
                            } else {
                                dst.copy_from_slice(src);
                            }
                        });
                    if let Err(e) = copied {
                        if first_err.is_ok() {
                            first_err = Err(e);
                        }
                    }
                    if let Err(e) = self.host.free_page(patch.page) {
                        if first_err.is_ok() {
                            first_err = Err(e);
                        }
                    }
                }
                self.txn = TxnMode::Off;

                let backed_up = backup::perform(&self.buffer, &self.host, self.half_len, 0);
                let synced = self.host.sync();
                let released = lock::release(self.buffer.lock_word(), &self.host, self.ticket);
                self.ticket = 0;

                debug!(patch_count, "transaction committed");
                first_err?;
                backed_up?;
                synced?;
                released
            }
        }
    }

    /// Abandons the transaction: patches are dropped unapplied and the lock
    /// released. Also the way out of the terminal timeout state.
    pub fn transaction_rollback(&mut self) -> Result<()> {
        match self.txn {
            TxnMode::Off => Err(FsError::Invalid),
            TxnMode::TimedOut => {
                let freed = self.drop_patches();
                self.txn = TxnMode::Off;
                freed
            }
            TxnMode::On => {
                let freed = self.drop_patches();
                // A stolen ticket means the lock is no longer ours to free;
                // the rollback itself still succeeded (nothing was applied).
                if lock::release(self.buffer.lock_word(), &self.host, self.ticket).is_err() {
                    debug!("rollback found its ticket already stolen");
                }
                self.ticket = 0;
                self.txn = TxnMode::Off;
                freed
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn patch_count(&self) -> usize {
        self.patches.len()
    }
}
