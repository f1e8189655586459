//! Deterministic host for protocol tests: a manually advanced clock shared
//! between sessions, allocation accounting for patch-leak assertions, and
//! failure injection for the allocator and time source.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::PAGE_SIZE;
use crate::error::{FsError, Result};

use super::HostEnv;

#[derive(Debug, Default)]
struct ManualState {
    clock_ms: AtomicU64,
    live_pages: AtomicUsize,
    fail_alloc: AtomicBool,
    fail_time: AtomicBool,
}

/// Clones share the clock and counters, so two sessions attached through
/// clones of one `ManualHost` observe the same time.
#[derive(Debug, Clone, Default)]
pub(crate) struct ManualHost {
    state: Arc<ManualState>,
}

impl ManualHost {
    pub(crate) fn at(start_ms: u64) -> Self {
        let host = Self::default();
        host.state.clock_ms.store(start_ms, Ordering::Relaxed);
        host
    }

    pub(crate) fn advance(&self, ms: u64) {
        self.state.clock_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub(crate) fn live_pages(&self) -> usize {
        self.state.live_pages.load(Ordering::Relaxed)
    }

    pub(crate) fn fail_next_allocs(&self, fail: bool) {
        self.state.fail_alloc.store(fail, Ordering::Relaxed);
    }

    pub(crate) fn fail_time(&self, fail: bool) {
        self.state.fail_time.store(fail, Ordering::Relaxed);
    }
}

impl HostEnv for ManualHost {
    fn alloc_page(&self) -> Option<NonNull<u8>> {
        if self.state.fail_alloc.load(Ordering::Relaxed) {
            return None;
        }
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).ok()?;
        // SAFETY: layout has non-zero size.
        let page = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;
        self.state.live_pages.fetch_add(1, Ordering::Relaxed);
        Some(page)
    }

    fn free_page(&self, page: NonNull<u8>) -> Result<()> {
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE)
            .map_err(|_| FsError::HostFree)?;
        // SAFETY: only pages from alloc_page reach here.
        unsafe { std::alloc::dealloc(page.as_ptr(), layout) };
        self.state.live_pages.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait(&self, _word: &AtomicU64, _observed: u64, timeout_ms: i64) -> Result<()> {
        // Single-threaded tests: waiting *is* the passage of time. Advance
        // strictly past the target; expiry comparisons are strict.
        if timeout_ms >= 0 {
            self.advance(timeout_ms as u64 + 1);
        }
        Ok(())
    }

    fn wake(&self, _word: &AtomicU64) -> Result<()> {
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn now_ms(&self) -> Result<u64> {
        if self.state.fail_time.load(Ordering::Relaxed) {
            return Err(FsError::HostTime);
        }
        Ok(self.state.clock_ms.load(Ordering::Relaxed))
    }
}
