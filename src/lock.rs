//! # Timeout Lock
//!
//! One 64-bit word in the lower half coordinates writers across processes.
//! Its value is either 0 (free) or the millisecond-UTC timestamp at which the
//! current hold expires: the holder's **ticket**. There is no owner
//! identity: holding the lock *is* knowing the ticket value, and every
//! release or refresh is a compare-exchange against it.
//!
//! ## Crash detection
//!
//! A holder that dies leaves its ticket behind. The word is considered free
//! once the ticket is in the past, so the next acquirer steals it, and the
//! non-zero prior value tells it the previous holder never released cleanly.
//! The stealer must assume the buffer is torn: the caller runs backup
//! restore before touching anything. A `SeqCst` fence stands in for the
//! release store the dead holder never issued.
//!
//! ## Orderings
//!
//! Acquire CAS uses acquire ordering, release CAS release ordering, so all
//! stores made under the lock happen-before the loads of the next holder.
//! The plain read of the word is relaxed; it only feeds the CAS.
//!
//! ## Slow-path loss
//!
//! A live holder descheduled past its expiry loses the lock the same way a
//! dead one does. It finds out at the next release or refresh, when the
//! compare-exchange misses: the operation reports [`FsError::TimedOut`] and,
//! for transactions, the session enters its terminal timeout state.

use std::sync::atomic::{fence, AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::{FsError, Result};
use crate::host::HostEnv;

/// Legacy marker for a hold without expiry. Never written by this
/// implementation, but respected when encountered.
const NO_TIMEOUT_HOLD: u64 = 1;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Acquired {
    /// The expiry timestamp we stored; needed for release and refresh.
    pub ticket: u64,
    /// The prior holder crashed (or was descheduled past expiry) while
    /// holding the lock; the buffer may be torn.
    pub stole_expired: bool,
}

/// Acquires the lock, waiting up to `wait_timeout_ms` for it to free up or
/// expire. The resulting hold expires `hold_timeout_ms` from now unless
/// refreshed or released first.
pub(crate) fn acquire<H: HostEnv>(
    word: &AtomicU64,
    host: &H,
    wait_timeout_ms: u64,
    hold_timeout_ms: u64,
) -> Result<Acquired> {
    let deadline = host.now_ms()?.saturating_add(wait_timeout_ms);

    loop {
        let now = host.now_ms()?;
        let current = word.load(Ordering::Relaxed);

        if current == NO_TIMEOUT_HOLD {
            return Err(FsError::Busy);
        }

        if current < now {
            // Free (0) or expired: try to claim it.
            let ticket = now + hold_timeout_ms;
            if word
                .compare_exchange(current, ticket, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                let stole_expired = current != 0;
                if stole_expired {
                    // The dead holder's release store never happened; order
                    // our loads after whatever it did manage to write.
                    fence(Ordering::SeqCst);
                    warn!(expired_ticket = current, "lock stolen from crashed holder");
                }
                return Ok(Acquired {
                    ticket,
                    stole_expired,
                });
            }
            // Lost the race; re-read and retry.
            continue;
        }

        if now >= deadline {
            return Err(FsError::TimedOut);
        }

        // Park until the holder releases, its ticket expires, or our own
        // deadline passes, whichever comes first.
        let until = current.min(deadline);
        host.wait(word, current, (until - now) as i64)?;
    }
}

/// Releases a hold. Fails with [`FsError::TimedOut`] if the ticket already
/// expired and was stolen; in that case the lock is not ours to touch.
pub(crate) fn release<H: HostEnv>(word: &AtomicU64, host: &H, ticket: u64) -> Result<()> {
    word.compare_exchange(ticket, 0, Ordering::Release, Ordering::Relaxed)
        .map_err(|stolen| {
            debug!(ticket, observed = stolen, "release lost: ticket was stolen");
            FsError::TimedOut
        })?;
    host.wake(word)
}

/// Extends a hold to `hold_timeout_ms` from now. Fails with
/// [`FsError::TimedOut`] if the ticket already expired; the caller's session
/// must stop touching shared state.
pub(crate) fn refresh<H: HostEnv>(
    word: &AtomicU64,
    host: &H,
    ticket: u64,
    hold_timeout_ms: u64,
) -> Result<u64> {
    let new_ticket = host.now_ms()? + hold_timeout_ms;
    word.compare_exchange(ticket, new_ticket, Ordering::AcqRel, Ordering::Relaxed)
        .map_err(|_| FsError::TimedOut)?;
    Ok(new_ticket)
}
