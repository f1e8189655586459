//! # Configuration Constants
//!
//! This module centralizes the layout and protocol constants, grouping
//! interdependent values together. Constants that depend on each other are
//! co-located to prevent mismatch bugs.
//!
//! ## Dependency Graph
//!
//! ```text
//! PAGE_SIZE (4096 bytes)
//!       │
//!       ├─> DATA_PAYLOAD (derived: PAGE_SIZE - 2 chain offsets)
//!       │
//!       ├─> ROOT_HANDLE_SLOTS (333, fills the root page after the header)
//!       │
//!       ├─> OVERFLOW_HANDLE_SLOTS (341, fills an overflow page after `next`)
//!       │
//!       └─> DIR_SLOTS (25 links + 25 inode-pool slots per directory page)
//!
//! VOLATILE_PREFIX (32 bytes)
//!       │
//!       └─> Backup and restore copies start at this offset; the lock word,
//!           backup flag, and last-backup time live inside it and are never
//!           copied between halves. Verified against the root layout by
//!           offset assertions in `storage::root`.
//!
//! HOLD_TIMEOUT_MS (5000)
//!       │
//!       └─> IDLE-driven refresh must run more often than this or a
//!           well-behaved attacher in a transaction loses its ticket.
//!
//! BACKUP_THROTTLE_MS (3000)
//!       └─> Applies to the post-operation backup; transaction commit
//!           backs up unthrottled.
//! ```
//!
//! ## Critical Invariants
//!
//! 1. Every page struct is exactly `PAGE_SIZE` bytes (asserted per struct in
//!    `storage`).
//! 2. `ROOT_HANDLE_SLOTS` and `OVERFLOW_HANDLE_SLOTS` fit their pages
//!    (asserted below).
//! 3. Handle slot indices fit the lower 16 bits of a descriptor.

/// Size of each page in bytes. The fundamental unit of allocation, patching,
/// and backup copies.
pub const PAGE_SIZE: usize = 4096;

/// Bytes of a data page available for file content (after prev/next).
pub const DATA_PAYLOAD: usize = PAGE_SIZE - 8;

/// Fixed capacity of a link name, NUL-padded. A name occupying all 128 bytes
/// carries no terminator; lengths are derived from the first NUL if any.
pub const MAX_NAME: usize = 128;

/// Link slots and inode-pool slots per directory page.
pub const DIR_SLOTS: usize = 25;

/// Handle slots embedded in the root page.
pub const ROOT_HANDLE_SLOTS: usize = 333;

/// Handle slots per overflow page.
pub const OVERFLOW_HANDLE_SLOTS: usize = 341;

/// User records per user page.
pub const USER_SLOTS: usize = 63;

/// Fixed capacity of a user name, NUL-padded.
pub const USER_NAME_CAP: usize = 60;

/// Bytes of the root page never copied between halves: the stamp plus the
/// lock word, backup flag, and last-backup time.
pub const VOLATILE_PREFIX: usize = 32;

/// How many pages one session may touch inside a transaction. A deliberate
/// cap on transaction size; the patch table lookup is linear.
pub const MAX_PATCHES: usize = 128;

/// Maximum components in a parsed path.
pub const MAX_PATH_COMPONENTS: usize = 32;

/// Descriptor slot indices occupy the lower 16 bits of a descriptor.
pub const HANDLE_INDEX_LIMIT: usize = 1 << 16;

/// How long an acquired lock ticket remains valid. A holder descheduled past
/// this expiry loses the lock to the next acquirer.
pub const HOLD_TIMEOUT_MS: u64 = 5000;

/// Default bound on how long an operation waits for the lock before giving
/// up with a timeout. Per-session configurable.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5000;

/// Minimum interval between post-operation backups.
pub const BACKUP_THROTTLE_MS: u64 = 3000;

// Root page: 92-byte header + inline handle slots + 8 reserved bytes.
const _: () = assert!(
    92 + ROOT_HANDLE_SLOTS * 12 + 8 == PAGE_SIZE,
    "root handle array must fill the root page exactly"
);

// Overflow page: 4-byte next offset + handle slots, no padding.
const _: () = assert!(
    4 + OVERFLOW_HANDLE_SLOTS * 12 == PAGE_SIZE,
    "overflow handle array must fill its page exactly"
);

// Directory page: prev/next + links + inode pool + 88 reserved bytes.
const _: () = assert!(
    8 + DIR_SLOTS * (4 + MAX_NAME) + DIR_SLOTS * 28 + 88 == PAGE_SIZE,
    "directory slots must fill their page exactly"
);

// User page: prev/next + records + 56 reserved bytes.
const _: () = assert!(
    8 + USER_SLOTS * (4 + USER_NAME_CAP) + 56 == PAGE_SIZE,
    "user records must fill their page exactly"
);

const _: () = assert!(
    ROOT_HANDLE_SLOTS < HANDLE_INDEX_LIMIT,
    "inline handle slots must be addressable by a 16-bit index"
);
