//! Crash-shaped tests: attachers that die holding the lock, ticket expiry
//! and stealing, the terminal timeout state of a descheduled transaction,
//! and idle-driven refresh keeping a well-behaved holder alive.

mod common;

use common::{attach, fresh_buffer, lock_word_value, ManualHost};
use cozyfs::FsError;

const HOLD_MS: u64 = 5000;

#[test]
fn a_dead_holders_lock_expires_and_is_stolen() {
    let buffer = fresh_buffer(256 * 1024, true);
    let host = ManualHost::at(1_000_000);

    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    let held = lock_word_value(&buffer);
    assert_eq!(held, 1_000_000 + HOLD_MS);
    std::mem::forget(a);

    // Before expiry, another attacher cannot get in.
    let mut b = attach(&buffer, &host);
    b.set_wait_timeout(0);
    assert_eq!(b.mkdir("/x").unwrap_err(), FsError::TimedOut);

    // After expiry, the acquire steals the ticket and recovery runs.
    host.advance(HOLD_MS + 1);
    b.mkdir("/x").unwrap();
    assert_eq!(lock_word_value(&buffer), 0);
}

#[test]
fn descheduled_transaction_enters_terminal_timeout() {
    let buffer = fresh_buffer(256 * 1024, true);
    let host = ManualHost::at(1_000_000);

    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    a.mkdir("/t").unwrap();

    // A sleeps past its expiry; another attacher steals the lock.
    host.advance(HOLD_MS + 1);
    let mut b = attach(&buffer, &host);
    b.mkdir("/intruder").unwrap();

    // A's next operation finds its ticket gone and poisons the session.
    assert_eq!(a.mkdir("/t2").unwrap_err(), FsError::TimedOut);
    assert_eq!(a.mkdir("/t3").unwrap_err(), FsError::TimedOut);
    assert_eq!(a.idle().unwrap_err(), FsError::TimedOut);

    // Commit refuses and drops the patches; the mutation never happened.
    assert_eq!(a.transaction_commit().unwrap_err(), FsError::TimedOut);
    assert_eq!(host.live_pages(), 0);
    assert_eq!(b.rmdir("/t").unwrap_err(), FsError::NotFound);

    // The session is usable again after the transaction ended.
    a.mkdir("/after").unwrap();
    b.rmdir("/after").unwrap();
}

#[test]
fn idle_refresh_keeps_a_transaction_alive() {
    let buffer = fresh_buffer(256 * 1024, true);
    let host = ManualHost::at(1_000_000);

    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    a.mkdir("/kept").unwrap();

    // Refresh every 3 seconds for half a minute; the hold never lapses.
    for _ in 0..10 {
        host.advance(3000);
        a.idle().unwrap();
    }
    a.transaction_commit().unwrap();

    let mut b = attach(&buffer, &host);
    b.rmdir("/kept").unwrap();
}

#[test]
fn idle_performs_opportunistic_backups() {
    let buffer = fresh_buffer(256 * 1024, true);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    // Backup flag starts at the lower half; the post-mkdir backup flips it.
    fs.mkdir("/a").unwrap();
    let flag_after_op = i32::from_le_bytes(buffer.as_slice()[16..20].try_into().unwrap());
    assert_eq!(flag_after_op, 1);

    // Idle past the throttle flips it again.
    host.advance(4000);
    fs.idle().unwrap();
    let flag_after_idle = i32::from_le_bytes(buffer.as_slice()[16..20].try_into().unwrap());
    assert_eq!(flag_after_idle, 0);
}

#[test]
fn release_reports_a_steal_after_slow_plain_operation() {
    let buffer = fresh_buffer(256 * 1024, true);
    let host = ManualHost::at(1_000_000);

    // A transaction that commits after its ticket lapsed reports the loss.
    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    host.advance(HOLD_MS + 1);
    let mut b = attach(&buffer, &host);
    b.mkdir("/steal").unwrap();

    assert_eq!(a.transaction_commit().unwrap_err(), FsError::TimedOut);
    // The failed commit published nothing.
    assert_eq!(b.rmdir("/nothing").unwrap_err(), FsError::NotFound);
}
