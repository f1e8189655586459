//! # CozyFS: a file system in a byte buffer
//!
//! CozyFS is a position-independent, in-memory hierarchical file system that
//! lives entirely inside a caller-supplied contiguous buffer. Its state
//! contains no host addresses (every reference is an offset from the buffer
//! base), so the buffer can be copied elsewhere, memory-mapped to a file
//! (durability), or placed in shared memory (cross-process sharing) and the
//! file system comes along intact. Multiple processes attach to the same
//! buffer concurrently, coordinated by a timeout lock with crash recovery
//! and copy-on-write transactions.
//!
//! ## Quick Start
//!
//! ```
//! use cozyfs::{init, OwnedBuffer, Session, SystemHost};
//!
//! let buffer = OwnedBuffer::new(64 * 1024);
//! init(&buffer.shared(), false, false)?;
//!
//! let mut fs = Session::attach(buffer.shared(), None, SystemHost)?;
//! fs.mkdir("/logs")?;
//! let fd = fs.create("/logs/today")?;
//! fs.write(fd, b"hello")?;
//!
//! let mut out = [0u8; 16];
//! let n = fs.read(fd, &mut out, cozyfs::READ_RESTART)?;
//! assert_eq!(&out[..n], b"hello");
//! # Ok::<(), cozyfs::FsError>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │        Public surface (Session ops)           │
//! │  mkdir rmdir create link unlink open close    │
//! │  read write mkusr rmusr chown chmod  txns     │
//! ├───────────────────────────────────────────────┤
//! │  Entity & directory manager │ Handle table    │
//! ├─────────────────────────────┴─────────────────┤
//! │  Copy-on-write patch table (per session)      │
//! ├───────────────────────────────────────────────┤
//! │  Timeout lock ── Dual-region backup/restore   │
//! ├───────────────────────────────────────────────┤
//! │  Page layout & offset arithmetic (zerocopy)   │
//! ├───────────────────────────────────────────────┤
//! │  Caller buffer          Host environment      │
//! │  (RAM / mmap / shm)     (alloc, wait, time)   │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Crash recovery
//!
//! With backup enabled at [`init`], the buffer is halved: one half is
//! authoritative, the other a snapshot, selected by an atomic flag. The lock
//! word doubles as the crash detector: it holds the holder's expiry
//! timestamp, so a dead attacher's lock simply expires, and the next
//! acquirer restores the snapshot before touching anything.
//!
//! ## Transactions
//!
//! [`Session::transaction_begin`] acquires the lock and turns on
//! copy-on-write: pages about to be written are copied into host-allocated
//! patches (at most 128 per transaction). Other attachers never see the
//! patches; commit copies them back and rollback just frees them.
//!
//! ## Module Overview
//!
//! - [`storage`]: page layouts, offsets, the attached buffer
//! - `lock`: the timeout lock word protocol
//! - `backup`: dual-region snapshot and restore
//! - `patch`: the per-session patch table
//! - `path`: path parsing and normalization
//! - [`session`]: attacher state and the operation surface
//! - [`host`]: the host-environment seam and the std-backed default

#[macro_use]
mod macros;

mod backup;
mod config;
mod error;
mod lock;
mod patch;
mod path;

pub mod host;
pub mod session;
pub mod storage;

pub use config::{DATA_PAYLOAD, MAX_NAME, MAX_PATCHES, MAX_PATH_COMPONENTS, PAGE_SIZE};
pub use error::{FsError, Result};
pub use host::{HostEnv, SystemHost};
pub use session::{init, Fd, Session, READ_CONSUME, READ_RESTART};
pub use storage::{OwnedBuffer, SharedBuffer};
