//! Shared test support: a deterministic host with a manually advanced clock
//! (shared between cloned instances, so several sessions observe the same
//! time) and buffer constructors.

#![allow(dead_code)]

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use cozyfs::{init, FsError, HostEnv, OwnedBuffer, Result, Session, PAGE_SIZE};

#[derive(Debug, Default)]
struct ClockState {
    clock_ms: AtomicU64,
    live_pages: AtomicUsize,
}

#[derive(Debug, Clone, Default)]
pub struct ManualHost {
    state: Arc<ClockState>,
}

impl ManualHost {
    pub fn at(start_ms: u64) -> Self {
        let host = Self::default();
        host.state.clock_ms.store(start_ms, Ordering::Relaxed);
        host
    }

    pub fn advance(&self, ms: u64) {
        self.state.clock_ms.fetch_add(ms, Ordering::Relaxed);
    }

    pub fn live_pages(&self) -> usize {
        self.state.live_pages.load(Ordering::Relaxed)
    }
}

impl HostEnv for ManualHost {
    fn alloc_page(&self) -> Option<NonNull<u8>> {
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE).ok()?;
        let page = NonNull::new(unsafe { std::alloc::alloc_zeroed(layout) })?;
        self.state.live_pages.fetch_add(1, Ordering::Relaxed);
        Some(page)
    }

    fn free_page(&self, page: NonNull<u8>) -> Result<()> {
        let layout = std::alloc::Layout::from_size_align(PAGE_SIZE, PAGE_SIZE)
            .map_err(|_| FsError::HostFree)?;
        unsafe { std::alloc::dealloc(page.as_ptr(), layout) };
        self.state.live_pages.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }

    fn wait(&self, _word: &AtomicU64, _observed: u64, timeout_ms: i64) -> Result<()> {
        // Waiting is the passage of time; land strictly past the target so
        // strict expiry comparisons resolve.
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
        Ok(self.state.clock_ms.load(Ordering::Relaxed))
    }
}

/// A freshly formatted buffer of `bytes` bytes.
pub fn fresh_buffer(bytes: usize, backup: bool) -> OwnedBuffer {
    let buffer = OwnedBuffer::new(bytes);
    init(&buffer.shared(), backup, false).unwrap();
    buffer
}

pub fn attach(buffer: &OwnedBuffer, host: &ManualHost) -> Session<ManualHost> {
    Session::attach(buffer.shared(), None, host.clone()).unwrap()
}

/// The raw lock word, for bit-pattern assertions.
pub fn lock_word_value(buffer: &OwnedBuffer) -> u64 {
    u64::from_le_bytes(buffer.as_slice()[8..16].try_into().unwrap())
}
