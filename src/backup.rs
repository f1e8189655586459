//! # Dual-Region Backup
//!
//! In backup mode the buffer is halved: one half is authoritative (the
//! **active** half), the other a point-in-time snapshot. A single atomic
//! flag selects which is which.
//!
//! `perform` runs while holding the lock, after a successful mutation. It
//! flips the flag first (with release ordering, so any attacher that
//! observes the new value also observes the state the flip published) and
//! only then copies the freshly-authoritative bytes over the now-stale
//! snapshot. An attacher reading under the old flag value sees the half that
//! was consistent all along; one reading the new value is a writer
//! serialized behind the lock. There is no moment at which a reader sees a
//! torn half.
//!
//! `restore` runs immediately after an acquire that stole an expired ticket:
//! the active half may be torn mid-mutation, so the snapshot half is copied
//! over it, flag unflipped. Both copies skip the volatile prefix (lock word,
//! backup flag, last-backup time), which lives at the buffer base and never
//! moves between halves.

use std::sync::atomic::Ordering;

use tracing::{debug, warn};

use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::storage::SharedBuffer;

/// Flips the halves and refreshes the snapshot, at most once per
/// `not_before_ms`. A no-op when backup mode is off. Caller holds the lock.
pub(crate) fn perform<H: HostEnv>(
    buf: &SharedBuffer,
    host: &H,
    half_len: usize,
    not_before_ms: u64,
) -> Result<()> {
    let flag = buf.backup_flag().load(Ordering::Relaxed);
    if flag < 0 {
        return Ok(());
    }

    let now = host.now_ms()?;
    if now < buf.last_backup_ms().saturating_add(not_before_ms) {
        return Ok(());
    }

    let new_flag = 1 - flag;
    buf.backup_flag().store(new_flag, Ordering::Release);

    // The half that was active until the flip holds the current state; copy
    // it into the half that just became active.
    let (src, dst) = if new_flag == 1 {
        (0, half_len)
    } else {
        (half_len, 0)
    };
    buf.copy_nonvolatile(src, dst, half_len);
    buf.set_last_backup_ms(now);
    host.sync()?;

    debug!(active_half = new_flag, "backup performed");
    Ok(())
}

/// Copies the snapshot half over the (possibly torn) active half. Caller
/// holds the lock and has just detected a crashed prior holder. Fails with
/// [`FsError::Corrupt`] when backup mode is off: there is nothing to restore
/// from.
pub(crate) fn restore<H: HostEnv>(buf: &SharedBuffer, host: &H, half_len: usize) -> Result<()> {
    let flag = buf.backup_flag().load(Ordering::Relaxed);
    if flag < 0 {
        return Err(FsError::Corrupt);
    }

    let (active, inactive) = if flag == 1 { (half_len, 0) } else { (0, half_len) };
    buf.copy_nonvolatile(inactive, active, half_len);
    host.sync()?;

    warn!(active_half = flag, "active half restored from snapshot");
    Ok(())
}
