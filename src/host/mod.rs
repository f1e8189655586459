//! # Host Environment
//!
//! The library core never talks to the operating system directly; everything
//! environment-shaped goes through the [`HostEnv`] seam an attacher provides:
//!
//! | Operation | Purpose |
//! |-----------|---------|
//! | `alloc_page` / `free_page` | Page-aligned transaction patch storage |
//! | `wait` / `wake` | Futex-style parking on the lock word |
//! | `sync` | Flush the buffer when it backs a file mapping |
//! | `now_ms` | UTC milliseconds; drives lock tickets and backup throttling |
//!
//! The wait primitive is modeled as parking: *wait if the word still holds
//! the observed value, give up at the timeout; wake releases all waiters*.
//! Spurious wakeups are fine; the lock loop re-reads the word.
//!
//! [`SystemHost`] is the batteries-included implementation: `std::alloc` for
//! patches, the system clock for time, and a process-local parking registry
//! (keyed by word address) for wait/wake. Cross-process deployments sharing
//! a buffer over shared memory should supply a host whose wait/wake reaches
//! the other processes (e.g. futexes on the mapped word); `SystemHost` still
//! behaves correctly there, degraded to timeout-polling, since lock expiry
//! bounds every wait.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use parking_lot::{Condvar, Mutex};

use crate::config::PAGE_SIZE;
use crate::error::{FsError, Result};

pub trait HostEnv {
    /// Allocates one page-aligned, page-sized block for a transaction patch.
    /// `None` reports exhaustion.
    fn alloc_page(&self) -> Option<NonNull<u8>>;

    /// Returns a block obtained from [`HostEnv::alloc_page`].
    fn free_page(&self, page: NonNull<u8>) -> Result<()>;

    /// Parks until `word` no longer holds `observed`, the timeout elapses,
    /// or a wake arrives. `timeout_ms < 0` means no timeout.
    fn wait(&self, word: &AtomicU64, observed: u64, timeout_ms: i64) -> Result<()>;

    /// Releases all waiters parked on `word`.
    fn wake(&self, word: &AtomicU64) -> Result<()>;

    /// Flushes the buffer to its backing store, when it has one.
    fn sync(&self) -> Result<()>;

    /// UTC time in milliseconds since the epoch.
    fn now_ms(&self) -> Result<u64>;
}

struct WaitSlot {
    guard: Mutex<()>,
    cond: Condvar,
}

/// Process-wide parking registry shared by every `SystemHost`, so a wake
/// issued through one session reaches waiters parked through another.
fn registry() -> &'static Mutex<HashMap<usize, Arc<WaitSlot>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<usize, Arc<WaitSlot>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

fn slot_for(word: &AtomicU64) -> Arc<WaitSlot> {
    let key = word as *const AtomicU64 as usize;
    registry()
        .lock()
        .entry(key)
        .or_insert_with(|| {
            Arc::new(WaitSlot {
                guard: Mutex::new(()),
                cond: Condvar::new(),
            })
        })
        .clone()
}

/// Default host: std allocator, system clock, in-process parking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemHost;

impl HostEnv for SystemHost {
    fn alloc_page(&self) -> Option<NonNull<u8>> {
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).ok()?;
        // SAFETY: layout has non-zero size.
        NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })
    }

    fn free_page(&self, page: NonNull<u8>) -> Result<()> {
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE)
            .map_err(|_| FsError::HostFree)?;
        // SAFETY: pages handed to free_page were allocated by alloc_page
        // with exactly this layout.
        unsafe { std::alloc::dealloc(page.as_ptr(), layout) };
        Ok(())
    }

    fn wait(&self, word: &AtomicU64, observed: u64, timeout_ms: i64) -> Result<()> {
        let slot = slot_for(word);
        let mut guard = slot.guard.lock();
        // Re-check under the slot lock: a wake between the caller's load and
        // this point must not be lost.
        if word.load(Ordering::Relaxed) != observed {
            return Ok(());
        }
        if timeout_ms < 0 {
            slot.cond.wait(&mut guard);
        } else {
            let _ = slot
                .cond
                .wait_for(&mut guard, Duration::from_millis(timeout_ms as u64));
        }
        Ok(())
    }

    fn wake(&self, word: &AtomicU64) -> Result<()> {
        let key = word as *const AtomicU64 as usize;
        let slot = registry().lock().get(&key).cloned();
        if let Some(slot) = slot {
            // Pairing with the re-check in wait: taking the slot lock orders
            // this wake after any in-flight load-then-park.
            drop(slot.guard.lock());
            slot.cond.notify_all();
        }
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        // Plain RAM has no backing store. File-backed deployments supply a
        // host that msyncs the mapping.
        Ok(())
    }

    fn now_ms(&self) -> Result<u64> {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| FsError::HostTime)?
            .as_millis() as u64;
        if ms == 0 {
            return Err(FsError::HostTime);
        }
        Ok(ms)
    }
}

#[cfg(test)]
pub(crate) mod testing;
