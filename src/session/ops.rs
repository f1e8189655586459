//! The public operation surface. Every operation parses its inputs, enters
//! the critical section (acquiring or refreshing the lock, with crash
//! restore on a stolen ticket), runs, and leaves through `finish`, which
//! backs up after successful mutations and always releases the lock held
//! for the call.

use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::path;
use crate::storage::{INODE_DIR, INODE_FILE};

use super::Session;

/// A packed file descriptor: slot generation in the upper 16 bits, slot
/// index in the lower 16.
pub type Fd = u32;

/// Read from byte zero instead of the handle's cursor.
pub const READ_RESTART: u32 = 1 << 0;
/// Remove the bytes just read from the front of the file. Requires a zero
/// cursor; partial consumption is legal.
pub const READ_CONSUME: u32 = 1 << 1;

impl<H: HostEnv> Session<H> {
    /// Creates a directory. The final component must not exist; parents
    /// must.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        let comps = path::parse(path)?;
        if comps.is_empty() {
            return Err(FsError::NotPermitted);
        }
        self.enter()?;
        let out = self.resolve_parent(&comps).and_then(|(parent, name)| {
            self.create_entity(parent, name, INODE_DIR, None).map(|_| ())
        });
        self.finish(out)
    }

    /// Removes an empty directory.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let comps = path::parse(path)?;
        if comps.is_empty() {
            return Err(FsError::NotPermitted);
        }
        self.enter()?;
        let out = self
            .resolve_parent(&comps)
            .and_then(|(parent, name)| self.remove_entity(parent, name, true));
        self.finish(out)
    }

    /// Creates an empty regular file and returns an open descriptor on it.
    pub fn create(&mut self, path: &str) -> Result<Fd> {
        let comps = path::parse(path)?;
        if comps.is_empty() {
            return Err(FsError::NotPermitted);
        }
        self.enter()?;
        let out = self.resolve_parent(&comps).and_then(|(parent, name)| {
            let inode = self.create_entity(parent, name, INODE_FILE, None)?;
            self.open_handle(inode)
        });
        self.finish(out)
    }

    /// Hard-links the file at `oldpath` under the new name. Directories
    /// cannot be hard-linked.
    pub fn link(&mut self, oldpath: &str, newpath: &str) -> Result<()> {
        let old = path::parse(oldpath)?;
        let new = path::parse(newpath)?;
        if new.is_empty() {
            return Err(FsError::NotPermitted);
        }
        self.enter()?;
        let out = (|| {
            let target = self.resolve(&old)?;
            if self.load_inode(target)?.is_dir() {
                return Err(FsError::NotPermitted);
            }
            let (parent, name) = self.resolve_parent(&new)?;
            self.create_entity(parent, name, INODE_FILE, Some(target))
                .map(|_| ())
        })();
        self.finish(out)
    }

    /// Removes a file link. The file's content is freed when the last link
    /// and the last open handle are gone.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let comps = path::parse(path)?;
        if comps.is_empty() {
            return Err(FsError::NotPermitted);
        }
        self.enter()?;
        let out = self
            .resolve_parent(&comps)
            .and_then(|(parent, name)| self.remove_entity(parent, name, false));
        self.finish(out)
    }

    /// Opens the file at `path`.
    pub fn open(&mut self, path: &str) -> Result<Fd> {
        let comps = path::parse(path)?;
        self.enter()?;
        let out = self.open_locked(&comps);
        self.finish(out)
    }

    /// Closes a descriptor. The slot's generation advances, so the
    /// descriptor is dead even if the slot is reused.
    pub fn close(&mut self, fd: Fd) -> Result<()> {
        self.enter()?;
        let out = self.close_locked(fd);
        self.finish(out)
    }

    /// Reads up to `dst.len()` bytes at the handle's cursor (or from byte
    /// zero with [`READ_RESTART`]), advancing the cursor by the count
    /// returned. With [`READ_CONSUME`] the bytes read are removed from the
    /// front of the file instead.
    pub fn read(&mut self, fd: Fd, dst: &mut [u8], flags: u32) -> Result<usize> {
        self.enter()?;
        let out = self.read_locked(fd, dst, flags);
        self.finish(out)
    }

    /// Appends `src` at the file's logical tail, independent of the read
    /// cursor. Returns the byte count appended; a short count means the
    /// buffer ran out of pages.
    pub fn write(&mut self, fd: Fd, src: &[u8]) -> Result<usize> {
        self.enter()?;
        let out = self.write_locked(fd, src);
        self.finish(out)
    }

    /// Registers an account and returns its id. Names are unique.
    pub fn mkusr(&mut self, name: &str) -> Result<u32> {
        self.enter()?;
        let out = self.mkusr_locked(name.as_bytes());
        self.finish(out)
    }

    /// Removes an account. Entities owned by it keep the stale id.
    pub fn rmusr(&mut self, name: &str) -> Result<()> {
        self.enter()?;
        let out = self.rmusr_locked(name.as_bytes());
        self.finish(out)
    }

    /// Records `user` as the owner of the entity at `path`.
    pub fn chown(&mut self, path: &str, user: &str) -> Result<()> {
        let comps = path::parse(path)?;
        self.enter()?;
        let out = self.chown_locked(&comps, user.as_bytes());
        self.finish(out)
    }

    /// Records permission bits on the entity at `path`. Recorded only; no
    /// checks are enforced.
    pub fn chmod(&mut self, path: &str, mode: u16) -> Result<()> {
        let comps = path::parse(path)?;
        self.enter()?;
        let out = self.chmod_locked(&comps, mode);
        self.finish(out)
    }
}
