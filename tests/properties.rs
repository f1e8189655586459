//! Invariant-level properties of the engine: position independence,
//! idempotent formatting, data round trips, refcounting behavior,
//! swap-remove name integrity, transaction isolation, lock-word bit
//! patterns, and descriptor staleness.

mod common;

use common::{attach, fresh_buffer, lock_word_value, ManualHost};
use cozyfs::{FsError, OwnedBuffer, READ_CONSUME, READ_RESTART};

/// P1: copying the buffer to a different host address changes nothing.
#[test]
fn position_independence() {
    let buffer = fresh_buffer(128 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    fs.mkdir("/a").unwrap();
    fs.mkdir("/a/b").unwrap();
    let fd = fs.create("/a/b/f").unwrap();
    fs.write(fd, b"relocatable").unwrap();
    fs.close(fd).unwrap();
    drop(fs);

    // Relocate the whole state to a fresh allocation.
    let mut moved = OwnedBuffer::new(128 * 1024);
    moved.as_mut_slice().copy_from_slice(buffer.as_slice());
    drop(buffer);

    let mut fs = attach(&moved, &host);
    let fd = fs.open("/a/b/f").unwrap();
    let mut out = [0u8; 32];
    let n = fs.read(fd, &mut out, READ_RESTART).unwrap();
    assert_eq!(&out[..n], b"relocatable");
    fs.close(fd).unwrap();
    fs.unlink("/a/b/f").unwrap();
    fs.rmdir("/a/b").unwrap();
    fs.rmdir("/a").unwrap();
}

/// P2: re-attaching changes nothing.
#[test]
fn attach_is_idempotent() {
    let buffer = fresh_buffer(64 * 1024, false);
    let host = ManualHost::at(1_000_000);

    let mut fs = attach(&buffer, &host);
    fs.mkdir("/kept").unwrap();
    drop(fs);

    let mut fs = attach(&buffer, &host);
    assert_eq!(fs.mkdir("/kept").unwrap_err(), FsError::Invalid);
    fs.rmdir("/kept").unwrap();
}

/// P3 (in-memory size): multi-page payloads survive a write/read round trip.
#[test]
fn round_trip_spans_many_pages() {
    let buffer = fresh_buffer(256 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let payload: Vec<u8> = (0..40_000u32).map(|i| (i % 251) as u8).collect();
    let fd = fs.create("/blob").unwrap();
    assert_eq!(fs.write(fd, &payload).unwrap(), payload.len());

    let mut out = vec![0u8; payload.len()];
    assert_eq!(fs.read(fd, &mut out, READ_RESTART).unwrap(), payload.len());
    assert_eq!(out, payload);

    // Cursor reads continue where the last read stopped.
    let mut head = vec![0u8; 1000];
    let mut rest = vec![0u8; payload.len()];
    let fd2 = fs.open("/blob").unwrap();
    assert_eq!(fs.read(fd2, &mut head, 0).unwrap(), 1000);
    let n = fs.read(fd2, &mut rest, 0).unwrap();
    assert_eq!(n, payload.len() - 1000);
    assert_eq!(&rest[..n], &payload[1000..]);
}

/// P4 behaviorally: content lives while any link or handle references it.
#[test]
fn refcount_keeps_content_alive() {
    let buffer = fresh_buffer(128 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let fd = fs.create("/f").unwrap();
    fs.write(fd, b"still here").unwrap();
    fs.link("/f", "/g").unwrap();

    // Drop both links; the open handle keeps the inode alive.
    fs.unlink("/f").unwrap();
    fs.unlink("/g").unwrap();
    assert_eq!(fs.open("/f").unwrap_err(), FsError::NotFound);

    let mut out = [0u8; 16];
    let n = fs.read(fd, &mut out, READ_RESTART).unwrap();
    assert_eq!(&out[..n], b"still here");

    // The final close frees everything; the name is gone for good.
    fs.close(fd).unwrap();
    assert_eq!(fs.open("/f").unwrap_err(), FsError::NotFound);
    assert_eq!(fs.open("/g").unwrap_err(), FsError::NotFound);
}

/// P5: after arbitrary create/remove interleavings (forcing chain growth
/// and swap-removes across pages), find-by-name matches a model exactly.
#[test]
fn swap_remove_never_loses_names() {
    let buffer = fresh_buffer(512 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);
    let mut model = std::collections::BTreeSet::new();

    fs.mkdir("/d").unwrap();
    // 60 entries forces several directory pages (25 links each).
    for i in 0..60 {
        let path = format!("/d/f{i}");
        let fd = fs.create(&path).unwrap();
        fs.close(fd).unwrap();
        model.insert(i);
    }
    // Remove a scattered subset, including early entries (back-filled from
    // the chain tail) and tail entries.
    for i in [0, 1, 7, 13, 24, 25, 26, 40, 55, 58, 59] {
        fs.unlink(&format!("/d/f{i}")).unwrap();
        model.remove(&i);
    }
    // Recreate a few of the removed names.
    for i in [1, 25, 59] {
        let fd = fs.create(&format!("/d/f{i}")).unwrap();
        fs.close(fd).unwrap();
        model.insert(i);
    }

    for i in 0..60 {
        let path = format!("/d/f{i}");
        let found = match fs.open(&path) {
            Ok(fd) => {
                fs.close(fd).unwrap();
                true
            }
            Err(FsError::NotFound) => false,
            Err(e) => panic!("unexpected error probing {path}: {e}"),
        };
        assert_eq!(found, model.contains(&i), "name f{i}");
    }
}

/// P6: rollback makes transactional mutations never-visible.
#[test]
fn transaction_isolation_on_rollback() {
    let buffer = fresh_buffer(128 * 1024, false);
    let host = ManualHost::at(1_000_000);

    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    a.mkdir("/t").unwrap();
    let fd = a.create("/t/file").unwrap();
    a.write(fd, b"uncommitted").unwrap();
    a.transaction_rollback().unwrap();
    drop(a);

    let mut b = attach(&buffer, &host);
    assert_eq!(b.open("/t/file").unwrap_err(), FsError::NotFound);
    assert_eq!(b.rmdir("/t").unwrap_err(), FsError::NotFound);
    assert_eq!(host.live_pages(), 0);
}

/// P6: commit makes them atomically visible.
#[test]
fn transaction_isolation_on_commit() {
    let buffer = fresh_buffer(128 * 1024, false);
    let host = ManualHost::at(1_000_000);

    let mut a = attach(&buffer, &host);
    a.transaction_begin().unwrap();
    a.mkdir("/t").unwrap();
    let fd = a.create("/t/file").unwrap();
    a.write(fd, b"committed").unwrap();
    a.close(fd).unwrap();
    a.transaction_commit().unwrap();
    drop(a);

    let mut b = attach(&buffer, &host);
    let fd = b.open("/t/file").unwrap();
    let mut out = [0u8; 16];
    let n = b.read(fd, &mut out, READ_RESTART).unwrap();
    assert_eq!(&out[..n], b"committed");
    b.close(fd).unwrap();
    assert_eq!(host.live_pages(), 0);
}

/// The patch budget bounds transaction size.
#[test]
fn transaction_page_budget_is_enforced() {
    let buffer = fresh_buffer(2 * 1024 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let fd = fs.create("/big").unwrap();
    fs.transaction_begin().unwrap();

    // Each appended data page costs a patch; 128 patches cannot absorb the
    // whole payload, so the append comes up short.
    let payload = vec![0x5Au8; 700 * 1024];
    let n = fs.write(fd, &payload).unwrap();
    assert!(n < payload.len());
    assert!(n > 0);

    fs.transaction_rollback().unwrap();
    let mut probe = [0u8; 1];
    assert_eq!(fs.read(fd, &mut probe, READ_RESTART).unwrap(), 0);
    assert_eq!(host.live_pages(), 0);
}

/// P8: the lock word is 0 after release and a future timestamp while held.
#[test]
fn lock_word_bit_patterns() {
    let buffer = fresh_buffer(64 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    assert_eq!(lock_word_value(&buffer), 0);

    fs.transaction_begin().unwrap();
    let held = lock_word_value(&buffer);
    assert!(held > 1_000_000);
    fs.transaction_rollback().unwrap();

    assert_eq!(lock_word_value(&buffer), 0);

    fs.mkdir("/z").unwrap();
    assert_eq!(lock_word_value(&buffer), 0);
}

/// P9: a closed descriptor is dead, even after the slot is reused.
#[test]
fn descriptors_go_stale_on_close() {
    let buffer = fresh_buffer(64 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let fd = fs.create("/f").unwrap();
    fs.close(fd).unwrap();

    let mut buf = [0u8; 4];
    assert_eq!(fs.read(fd, &mut buf, 0).unwrap_err(), FsError::BadDescriptor);
    assert_eq!(fs.write(fd, b"x").unwrap_err(), FsError::BadDescriptor);
    assert_eq!(fs.close(fd).unwrap_err(), FsError::BadDescriptor);

    // The slot is reused with a fresh generation; the old fd stays dead.
    let fd2 = fs.open("/f").unwrap();
    assert_ne!(fd, fd2);
    assert_eq!(fd2 & 0xFFFF, fd & 0xFFFF);
    assert_eq!(fs.read(fd, &mut buf, 0).unwrap_err(), FsError::BadDescriptor);
    fs.close(fd2).unwrap();
}

/// Consuming reads shift the file origin and free drained pages.
#[test]
fn consume_drains_the_front() {
    let buffer = fresh_buffer(256 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let payload: Vec<u8> = (0..10_000u32).map(|i| (i % 13) as u8).collect();
    let fd = fs.create("/q").unwrap();
    fs.write(fd, &payload).unwrap();

    // Partial consumption is legal: take 6000 bytes off the front.
    let mut chunk = vec![0u8; 6000];
    assert_eq!(fs.read(fd, &mut chunk, READ_CONSUME).unwrap(), 6000);
    assert_eq!(chunk, &payload[..6000]);

    // The rest begins at the new origin.
    let mut rest = vec![0u8; 10_000];
    let n = fs.read(fd, &mut rest, 0).unwrap();
    assert_eq!(n, 4000);
    assert_eq!(&rest[..n], &payload[6000..]);

    // A non-zero cursor refuses to consume.
    let fd2 = fs.open("/q").unwrap();
    let mut byte = [0u8; 1];
    fs.read(fd2, &mut byte, 0).unwrap();
    assert_eq!(
        fs.read(fd2, &mut byte, READ_CONSUME).unwrap_err(),
        FsError::Invalid
    );
}

/// Users are a flat table: unique names, recorded ownership.
#[test]
fn user_table_round_trip() {
    let buffer = fresh_buffer(128 * 1024, false);
    let host = ManualHost::at(1_000_000);
    let mut fs = attach(&buffer, &host);

    let alice = fs.mkusr("alice").unwrap();
    let bob = fs.mkusr("bob").unwrap();
    assert_ne!(alice, bob);
    assert_eq!(fs.mkusr("alice").unwrap_err(), FsError::Invalid);

    fs.mkdir("/home").unwrap();
    fs.chown("/home", "alice").unwrap();
    fs.chmod("/home", 0o700).unwrap();
    assert_eq!(fs.chown("/home", "nobody").unwrap_err(), FsError::NotFound);

    fs.rmusr("bob").unwrap();
    assert_eq!(fs.rmusr("bob").unwrap_err(), FsError::NotFound);
    // Ids are never reused.
    let carol = fs.mkusr("carol").unwrap();
    assert!(carol > bob);
}
