// src/kernel/fs/inode.rs
//! Inode layout and the per-partition open-inode cache (spec §3, §4.7).
//!
//! The C original allocates open inodes from a kernel slab, temporarily
//! nulling the running task's page-directory pointer so the allocator
//! picks the kernel pool instead of the caller's. That trick exists only
//! because the original shares one allocator between kernel and user
//! memory; here the kernel heap (`alloc`) and a task's user heap
//! (`Tcb::user_heap`) are already distinct, so open inodes need no
//! dedicated allocator at all — [`OpenInodes`] just tracks open-count and
//! write-lock per id, while every fs operation fetches the inode's actual
//! data fresh from disk.

use super::SECTOR_SIZE;
use crate::errors::{FsError, KernelError};
use crate::kernel::bitmap::Bitmap;
use alloc::vec::Vec;

pub const INODE_DISK_SIZE: usize = 60;
pub const DIRECT_BLOCKS: usize = 12;
pub const INDIRECT_INDEX: usize = 12;
pub const BLOCKS_PER_INODE: usize = 13;
pub const INDIRECT_ENTRIES: usize = SECTOR_SIZE / 4;
/// 12 direct + 128 single-indirect blocks (spec §3).
pub const MAX_FILE_BLOCKS: usize = DIRECT_BLOCKS + INDIRECT_ENTRIES;
/// 71 680 bytes (spec §8's exact write-boundary test).
pub const MAX_FILE_SIZE: usize = MAX_FILE_BLOCKS * SECTOR_SIZE;
pub const MAX_INODES: u32 = 4096;
pub const ROOT_INODE: u32 = 0;

/// `0` never appears as a real data block: block numbers are partition-
/// relative LBAs, and block 0 always belongs to the boot sector.
pub const NO_BLOCK: u32 = 0;

/// An inode's on-disk fields. The spec's open-count, write-lock, and
/// open-list-hook fields have no disk representation (`inode_sync` zeros
/// them before writing, per spec) — tracked instead in [`OpenInodes`],
/// keyed by id, rather than carried on every in-memory copy of an inode.
#[derive(Debug, Clone)]
pub struct Inode {
    pub id: u32,
    pub size: u32,
    pub blocks: [u32; BLOCKS_PER_INODE],
}

impl Inode {
    #[must_use]
    pub fn empty(id: u32) -> Self {
        Self { id, size: 0, blocks: [NO_BLOCK; BLOCKS_PER_INODE] }
    }

    fn read_from(id: u32, bytes: &[u8]) -> Self {
        let word = |offset: usize| u32::from_le_bytes(bytes[offset..offset + 4].try_into().unwrap());
        let mut inode = Self::empty(word(0));
        debug_assert_eq!(inode.id, id);
        inode.size = word(4);
        for (i, block) in inode.blocks.iter_mut().enumerate() {
            *block = word(8 + i * 4);
        }
        inode
    }

    fn write_to(&self, bytes: &mut [u8]) {
        bytes[0..4].copy_from_slice(&self.id.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.size.to_le_bytes());
        for (i, block) in self.blocks.iter().enumerate() {
            bytes[8 + i * 4..12 + i * 4].copy_from_slice(&block.to_le_bytes());
        }
    }

    #[must_use]
    pub fn is_directory_size_valid(&self) -> bool {
        self.size as usize % super::dirent::DIRENT_SIZE == 0
    }
}

/// The handful of fields inode I/O needs from a [`super::partition::MountedPartition`],
/// copied out as a plain value. Lets `inode_sync`/`inode_read` be called
/// while the caller still holds a mutable borrow of the partition's other
/// fields (the open-inode cache, the bitmaps) — see `kernel::fs::ops`.
#[derive(Debug, Clone, Copy)]
pub struct DiskLayout {
    pub disk: u8,
    pub lba_start: u32,
    pub inode_table_lba: u32,
}

/// Read-modify-write the one or two sectors holding inode `id`'s record
/// (spec §4.7: "may straddle a sector boundary").
pub fn inode_sync(layout: DiskLayout, inode: &Inode) -> Result<(), KernelError> {
    let byte_offset = inode.id as usize * INODE_DISK_SIZE;
    let first_sector = byte_offset / SECTOR_SIZE;
    let last_sector = (byte_offset + INODE_DISK_SIZE - 1) / SECTOR_SIZE;
    let span = last_sector - first_sector + 1;

    let mut buf = [0u8; SECTOR_SIZE * 2];
    let lba = layout.lba_start + layout.inode_table_lba + first_sector as u32;
    crate::kernel::block::ide::read(layout.disk, lba, &mut buf[..span * SECTOR_SIZE])?;

    let offset_in_buf = byte_offset - first_sector * SECTOR_SIZE;
    inode.write_to(&mut buf[offset_in_buf..offset_in_buf + INODE_DISK_SIZE]);

    crate::kernel::block::ide::write(layout.disk, lba, &buf[..span * SECTOR_SIZE])
}

/// Load inode `id` straight from disk. There is no read-through cache —
/// see the module doc: the open-inode table tracks only open-count and
/// write-lock, not a live copy of the inode's data.
pub fn inode_read(layout: DiskLayout, id: u32) -> Result<Inode, KernelError> {
    let byte_offset = id as usize * INODE_DISK_SIZE;
    let first_sector = byte_offset / SECTOR_SIZE;
    let last_sector = (byte_offset + INODE_DISK_SIZE - 1) / SECTOR_SIZE;
    let span = last_sector - first_sector + 1;

    let mut buf = [0u8; SECTOR_SIZE * 2];
    let lba = layout.lba_start + layout.inode_table_lba + first_sector as u32;
    crate::kernel::block::ide::read(layout.disk, lba, &mut buf[..span * SECTOR_SIZE])?;

    let offset_in_buf = byte_offset - first_sector * SECTOR_SIZE;
    Ok(Inode::read_from(id, &buf[offset_in_buf..offset_in_buf + INODE_DISK_SIZE]))
}

/// Allocate a free inode number from the bitmap and mark it used.
pub fn alloc_inode_number(bitmap_bytes: &mut [u8]) -> Result<u32, KernelError> {
    let mut bitmap = Bitmap::new(bitmap_bytes, MAX_INODES as usize);
    let index = bitmap.scan(1).ok_or(FsError::NoSpace)?;
    bitmap.set(index, true);
    Ok(index as u32)
}

pub fn free_inode_number(bitmap_bytes: &mut [u8], id: u32) {
    Bitmap::new(bitmap_bytes, MAX_INODES as usize).set(id as usize, false);
}

/// One open-file's worth of bookkeeping that has no disk representation
/// (spec: open-count, write lock). Deliberately holds no copy of
/// `blocks`/`size` — the disk is the single source of truth for those,
/// fetched fresh via [`inode_read`] and written back via [`inode_sync`]
/// by whichever fs operation needs them. Storing a live `Inode` here
/// instead would mean every caller needing both this table and block
/// allocation on the same partition would have to borrow one field of
/// `MountedPartition` mutably while passing the whole struct elsewhere,
/// which the borrow checker rejects.
struct OpenEntry {
    id: u32,
    open_count: u32,
    write_locked: bool,
}

/// Per-partition cache of open inodes (spec: "released only when the
/// open-count reaches zero"). Backed by a plain `Vec`: unlike the ready
/// list or the IDE waiter list, nothing needs FIFO order or handle
/// stability here, only lookup by inode id.
#[derive(Default)]
pub struct OpenInodes {
    entries: Vec<OpenEntry>,
}

impl OpenInodes {
    #[must_use]
    pub const fn new() -> Self {
        Self { entries: Vec::new() }
    }

    fn find_mut(&mut self, id: u32) -> Option<&mut OpenEntry> {
        self.entries.iter_mut().find(|entry| entry.id == id)
    }

    /// `inode_open`: bump the open-count if this id is already tracked,
    /// otherwise start tracking it at count 1.
    pub fn open(&mut self, id: u32) {
        if let Some(entry) = self.find_mut(id) {
            entry.open_count += 1;
        } else {
            self.entries.insert(0, OpenEntry { id, open_count: 1, write_locked: false });
        }
    }

    #[must_use]
    pub fn is_write_locked(&self, id: u32) -> bool {
        self.entries.iter().any(|entry| entry.id == id && entry.write_locked)
    }

    pub fn set_write_locked(&mut self, id: u32, locked: bool) {
        if let Some(entry) = self.find_mut(id) {
            entry.write_locked = locked;
        }
    }

    /// Decrement open-count; stop tracking once it reaches zero. Returns
    /// `true` once the inode has no more openers left.
    pub fn close(&mut self, id: u32) -> bool {
        let Some(pos) = self.entries.iter().position(|entry| entry.id == id) else { return true };
        self.entries[pos].open_count -= 1;
        if self.entries[pos].open_count == 0 {
            self.entries.remove(pos);
            true
        } else {
            false
        }
    }

    #[must_use]
    pub fn is_open(&self, id: u32) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}
