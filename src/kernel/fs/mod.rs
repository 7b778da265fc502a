// src/kernel/fs/mod.rs
//! The on-disk filesystem (spec §3, §4.7-§4.9): a flat superblock +
//! bitmap + inode-table layout with 12 direct and 1 indirect block per
//! inode, mounted once at boot over whichever partition
//! `kernel::block::partition` finds.
//!
//! One partition is mounted system-wide, guarded by a single lock rather
//! than `kernel::sync::ReentrantLock` — every fs operation is a single
//! syscall's worth of work that takes the lock once for its whole
//! duration and never re-enters while already holding it, so plain
//! mutual exclusion is enough; nothing here needs the same task to
//! acquire the lock twice in one call chain.

pub mod dir;
pub mod dirent;
pub mod file;
pub mod inode;
pub mod ops;
pub mod partition;
pub mod path;
pub mod superblock;

use crate::errors::{FsError, KernelError};
use crate::kernel::block::partition as blockpart;
use file::FileTable;
use partition::MountedPartition;
use spin::Mutex;

/// Bytes per sector (spec §3, matches `kernel::block::SECTOR_SIZE`).
pub const SECTOR_SIZE: usize = 512;

struct FsState {
    partition: MountedPartition,
    files: FileTable,
}

static STATE: Mutex<Option<FsState>> = Mutex::new(None);

/// Mount the default partition (spec §4.6: `sdb1` absent an override).
/// Called once during boot, after `kernel::block::init`.
pub fn init() -> Result<(), KernelError> {
    let selected = blockpart::default_partition().ok_or(FsError::NotFound)?;
    let mounted = partition::mount(selected.disk, selected.lba_start, selected.sector_count)?;
    *STATE.lock() = Some(FsState { partition: mounted, files: FileTable::new() });
    Ok(())
}

/// Run `f` with exclusive access to the mounted partition and the
/// system-wide file table. Every `kernel::syscall` file-related handler
/// goes through this once per call.
pub fn with_state<R>(f: impl FnOnce(&mut MountedPartition, &mut FileTable) -> Result<R, KernelError>) -> Result<R, KernelError> {
    let mut guard = STATE.lock();
    let state = guard.as_mut().ok_or(FsError::NotFound)?;
    f(&mut state.partition, &mut state.files)
}
