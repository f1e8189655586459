//! # Error Taxonomy
//!
//! Every fallible operation in CozyFS reports exactly one condition from a
//! flat, closed set. The conditions are the only signalling channel out of an
//! operation: nothing is retried silently, and any error unwinds to the public
//! entry point, which releases the lock (if held) before returning.
//!
//! Each condition maps to a stable negative integer via [`FsError::code`] so
//! that embedders exposing a C-shaped surface (or persisting results across
//! process boundaries) have a fixed wire value per condition.
//!
//! ## Host conditions
//!
//! The `Host*` variants surface failures of the host-callback seam (the
//! [`crate::host`] module): a failing free, sync, time source, wait or wake is
//! distinguishable from a file-system-level condition so the embedder can tell
//! its own environment apart from the shared state.

use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Malformed input: bad path, over-long name, entry already exists.
    #[error("invalid argument")]
    Invalid,

    /// Patch table exhausted, free pages exhausted, or host allocator failure.
    #[error("out of memory")]
    OutOfMemory,

    /// Path component, entry, or user not found.
    #[error("no such entry")]
    NotFound,

    /// Disallowed operation: unlink the root, link at the root, hard-link a
    /// directory, remove a non-empty directory.
    #[error("operation not permitted")]
    NotPermitted,

    /// Lock word holds the legacy no-timeout marker.
    #[error("resource busy")]
    Busy,

    /// File operation attempted on a directory.
    #[error("is a directory")]
    IsDirectory,

    /// Descriptor index space or handle slot supply exhausted.
    #[error("handle table exhausted")]
    HandleTableFull,

    /// Unknown, stale, or out-of-range descriptor.
    #[error("bad file descriptor")]
    BadDescriptor,

    /// Lock wait exceeded, lock refresh lost the ticket, or the session is in
    /// the terminal timeout state.
    #[error("timed out")]
    TimedOut,

    /// A crashed prior lock holder was detected but backup mode is disabled,
    /// or the attached buffer does not carry a CozyFS stamp.
    #[error("file system corrupted")]
    Corrupt,

    #[error("host page free failed")]
    HostFree,

    #[error("host sync failed")]
    HostSync,

    #[error("host time source failed")]
    HostTime,

    #[error("host wait failed")]
    HostWait,

    #[error("host wake failed")]
    HostWake,
}

impl FsError {
    /// Stable negative integer for this condition.
    pub const fn code(self) -> i32 {
        match self {
            FsError::Invalid => -1,
            FsError::OutOfMemory => -2,
            FsError::NotFound => -3,
            FsError::NotPermitted => -4,
            FsError::Busy => -5,
            FsError::IsDirectory => -6,
            FsError::HandleTableFull => -7,
            FsError::BadDescriptor => -8,
            FsError::TimedOut => -9,
            FsError::Corrupt => -10,
            FsError::HostFree => -11,
            FsError::HostSync => -12,
            FsError::HostTime => -13,
            FsError::HostWait => -14,
            FsError::HostWake => -15,
        }
    }
}

pub type Result<T> = core::result::Result<T, FsError>;
