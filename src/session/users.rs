//! The flat user table: account creation and removal, plus owner and mode
//! recording on inodes. No permission is enforced anywhere; owner and mode
//! are metadata for surfaces layered on top.

use crate::config::USER_NAME_CAP;
use crate::error::{FsError, Result};
use crate::host::HostEnv;
use crate::storage::{Offset, NIL_OFFSET};

use super::Session;

impl<H: HostEnv> Session<H> {
    /// The record for `name`: (page, slot, account id).
    fn find_user_record(&self, name: &[u8]) -> Result<Option<(Offset, usize, u32)>> {
        let mut page = self.root()?.user_head();
        while page != NIL_OFFSET {
            let up = self.user_page(page)?;
            if let Some(idx) = up.find_name(name) {
                return Ok(Some((page, idx, up.users()[idx].id())));
            }
            page = up.next();
        }
        Ok(None)
    }

    /// Account id of the session's attach user; 0 when the session is
    /// anonymous or the name is not registered.
    pub(super) fn attach_user_id(&self) -> Result<u32> {
        let Some(name) = self.user.as_deref() else {
            return Ok(0);
        };
        Ok(self
            .find_user_record(name)?
            .map(|(_, _, id)| id)
            .unwrap_or(0))
    }

    pub(super) fn mkusr_locked(&mut self, name: &[u8]) -> Result<u32> {
        if name.is_empty() || name.len() > USER_NAME_CAP {
            return Err(FsError::Invalid);
        }
        if self.find_user_record(name)?.is_some() {
            return Err(FsError::Invalid);
        }

        // First empty slot in the chain, else a fresh page at the tail.
        let mut slot = None;
        let mut page = self.root()?.user_head();
        while page != NIL_OFFSET {
            let up = self.user_page(page)?;
            if let Some(idx) = up.empty_slot() {
                slot = Some((page, idx));
                break;
            }
            page = up.next();
        }
        let (page, idx) = match slot {
            Some(s) => s,
            None => {
                let tail = self.root()?.user_tail();
                let new_page = self.alloc_user_page(tail)?;
                if tail == NIL_OFFSET {
                    let root = self.root_mut()?;
                    root.set_user_head(new_page);
                    root.set_user_tail(new_page);
                } else {
                    self.user_page_mut(tail)?.set_next(new_page);
                    self.root_mut()?.set_user_tail(new_page);
                }
                (new_page, 0)
            }
        };

        let id = self.root()?.next_user_id();
        self.root_mut()?.set_next_user_id(id + 1);
        self.user_page_mut(page)?.users_mut()[idx].fill(id, name);
        Ok(id)
    }

    pub(super) fn rmusr_locked(&mut self, name: &[u8]) -> Result<()> {
        let (page, idx, _) = self
            .find_user_record(name)?
            .ok_or(FsError::NotFound)?;
        self.user_page_mut(page)?.users_mut()[idx].clear();
        Ok(())
    }

    pub(super) fn chown_locked(&mut self, comps: &[&[u8]], user: &[u8]) -> Result<()> {
        let (_, _, id) = self.find_user_record(user)?.ok_or(FsError::NotFound)?;
        let inode_off = self.resolve(comps)?;
        self.with_inode_mut(inode_off, |i| i.set_owner(id))
    }

    pub(super) fn chmod_locked(&mut self, comps: &[&[u8]], mode: u16) -> Result<()> {
        let inode_off = self.resolve(comps)?;
        self.with_inode_mut(inode_off, |i| i.set_mode(mode))
    }
}
