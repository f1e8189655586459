//! # Path Parser
//!
//! Paths are UTF-8 byte strings with no normalization beyond component
//! handling. A leading `/` is optional and stripped; the rest splits on `/`.
//! `.` components are dropped, `..` pops the accumulated stack, and popping
//! past the start fails: a path may not name an ancestor of the root. A
//! trailing `/` is tolerated; an empty component (`a//b`) is not, and
//! neither is an empty relative path. `/` alone parses to zero components:
//! the root itself.

use smallvec::SmallVec;

use crate::config::MAX_PATH_COMPONENTS;
use crate::error::{FsError, Result};

pub(crate) type Components<'a> = SmallVec<[&'a [u8]; MAX_PATH_COMPONENTS]>;

pub(crate) fn parse(path: &str) -> Result<Components<'_>> {
    let mut bytes = path.as_bytes();

    if let Some(rest) = bytes.strip_prefix(b"/") {
        bytes = rest;
        if bytes.is_empty() {
            return Ok(Components::new());
        }
    }

    let mut comps = Components::new();
    let mut i = 0;

    loop {
        let start = i;
        while i < bytes.len() && bytes[i] != b'/' {
            i += 1;
        }
        let comp = &bytes[start..i];

        match comp {
            b"" => return Err(FsError::Invalid),
            b"." => {}
            b".." => {
                if comps.pop().is_none() {
                    return Err(FsError::Invalid);
                }
            }
            _ => {
                if comps.len() == MAX_PATH_COMPONENTS {
                    return Err(FsError::OutOfMemory);
                }
                comps.push(comp);
            }
        }

        if i == bytes.len() {
            break;
        }
        i += 1;
        if i == bytes.len() {
            // Trailing separator.
            break;
        }
    }

    Ok(comps)
}
