// src/kernel/fs/path.rs
//! Path walk (spec §4.7). Four resolution outcomes fall out of whether
//! the final component exists and what type it is; callers (`open`,
//! `mkdir`, `unlink`, ...) each accept a different subset.

use super::dirent::FileType;
use super::inode::{inode_read, ROOT_INODE};
use super::partition::MountedPartition;
use crate::errors::{FsError, KernelError};
use alloc::string::{String, ToString};
use alloc::vec::Vec;

pub struct Resolved {
    pub parent_inode: u32,
    pub name: String,
    pub existing: Option<(u32, FileType)>,
}

/// Walk `path` starting from `cwd_inode` (absolute paths start from the
/// root instead). Every component but the last must resolve to a
/// directory; the last component may be missing (the caller decides
/// whether that's an error).
pub fn resolve(partition: &MountedPartition, cwd_inode: u32, path: &str) -> Result<Resolved, KernelError> {
    if path.is_empty() {
        return Err(FsError::NotFound.into());
    }

    let start = if path.starts_with('/') { ROOT_INODE } else { cwd_inode };
    let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();

    if components.is_empty() {
        return Ok(Resolved { parent_inode: ROOT_INODE, name: ".".to_string(), existing: Some((ROOT_INODE, FileType::Directory)) });
    }

    let mut current = start;
    for (i, component) in components.iter().enumerate() {
        let is_last = i + 1 == components.len();
        let dir_inode = inode_read(partition.disk_layout(), current)?;
        let found = super::dir::lookup(partition, &dir_inode, component)?;

        match found {
            Some((child_id, child_type)) if is_last => {
                return Ok(Resolved { parent_inode: current, name: (*component).to_string(), existing: Some((child_id, child_type)) });
            }
            Some((child_id, FileType::Directory)) => current = child_id,
            Some(_) => return Err(FsError::NotADirectory.into()),
            None if is_last => {
                return Ok(Resolved { parent_inode: current, name: (*component).to_string(), existing: None });
            }
            None => return Err(FsError::NotFound.into()),
        }
    }
    unreachable!("components is non-empty, loop always returns on the last iteration")
}
