//! Minimal walkthrough: format a buffer, attach, build a small tree, write
//! and read a file, and demonstrate a rollback.
//!
//! Run with `cargo run --example basic`.

use cozyfs::{init, FsError, OwnedBuffer, Session, SystemHost, READ_RESTART};

fn main() -> Result<(), FsError> {
    let buffer = OwnedBuffer::new(256 * 1024);
    init(&buffer.shared(), false, false)?;

    let mut fs = Session::attach(buffer.shared(), None, SystemHost)?;

    fs.mkdir("/inbox")?;
    let fd = fs.create("/inbox/msg-1")?;
    fs.write(fd, b"hello from a byte buffer")?;

    let mut out = [0u8; 64];
    let n = fs.read(fd, &mut out, READ_RESTART)?;
    println!("read back: {}", String::from_utf8_lossy(&out[..n]));

    // A transaction that changes its mind leaves no trace.
    fs.transaction_begin()?;
    fs.mkdir("/inbox/tmp")?;
    fs.transaction_rollback()?;
    assert_eq!(fs.open("/inbox/tmp").unwrap_err(), FsError::NotFound);
    println!("rollback left /inbox/tmp unborn");

    fs.close(fd)?;
    Ok(())
}
