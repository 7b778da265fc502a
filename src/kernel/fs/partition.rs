// src/kernel/fs/partition.rs
//! A mounted partition: superblock, in-memory bitmaps, and the open-inode
//! cache (spec §3's `Partition` record plus §4.7's format/mount).

use super::inode::{self, OpenInodes, ROOT_INODE};
use super::superblock::{Superblock, MAGIC};
use super::{dirent::DirEntry, dirent::FileType, SECTOR_SIZE};
use crate::errors::{FsError, KernelError};
use crate::kernel::bitmap::Bitmap;
use crate::kernel::block::ide;
use alloc::vec;
use alloc::vec::Vec;

/// Inode bitmap always covers exactly [`inode::MAX_INODES`] bits, one
/// sector's worth (spec §4.7: "covers up to 4096 inodes -> 1 sector").
const INODE_BITMAP_SECTORS: u32 = 1;

pub struct MountedPartition {
    pub disk: u8,
    pub lba_start: u32,
    pub superblock: Superblock,
    pub block_bitmap: Vec<u8>,
    pub inode_bitmap: Vec<u8>,
    pub open_inodes: OpenInodes,
}

impl MountedPartition {
    pub fn read_sectors(&self, lba_rel: u32, buf: &mut [u8]) -> Result<(), KernelError> {
        ide::read(self.disk, self.lba_start + lba_rel, buf)
    }

    pub fn write_sectors(&self, lba_rel: u32, buf: &[u8]) -> Result<(), KernelError> {
        ide::write(self.disk, self.lba_start + lba_rel, buf)
    }

    pub fn read_sector(&self, lba_rel: u32) -> Result<[u8; SECTOR_SIZE], KernelError> {
        let mut buf = [0u8; SECTOR_SIZE];
        self.read_sectors(lba_rel, &mut buf)?;
        Ok(buf)
    }

    /// Allocate one free data block and mark it used in the in-memory
    /// block bitmap. Caller is responsible for calling
    /// [`MountedPartition::sync_block_bitmap`] afterward.
    pub fn alloc_block(&mut self) -> Result<u32, KernelError> {
        let bit_count = self.superblock.sector_count as usize;
        let mut bitmap = Bitmap::new(&mut self.block_bitmap, bit_count);
        let index = bitmap.scan(1).ok_or(FsError::NoSpace)?;
        bitmap.set(index, true);
        Ok(index as u32)
    }

    pub fn free_block(&mut self, block: u32) {
        let bit_count = self.superblock.sector_count as usize;
        Bitmap::new(&mut self.block_bitmap, bit_count).set(block as usize, false);
    }

    /// Each newly allocated block triggers a block-bitmap sync (spec §4.7).
    pub fn sync_block_bitmap(&self) -> Result<(), KernelError> {
        self.write_sectors(self.superblock.block_bitmap_lba, &self.block_bitmap)
    }

    pub fn sync_inode_bitmap(&self) -> Result<(), KernelError> {
        self.write_sectors(self.superblock.inode_bitmap_lba, &self.inode_bitmap)
    }

    pub fn alloc_inode_number(&mut self) -> Result<u32, KernelError> {
        inode::alloc_inode_number(&mut self.inode_bitmap)
    }

    pub fn free_inode_number(&mut self, id: u32) {
        inode::free_inode_number(&mut self.inode_bitmap, id);
    }

    /// The plain-value slice of fields [`inode::inode_sync`]/[`inode::inode_read`]
    /// need, so they can be called without borrowing all of `self`.
    #[must_use]
    pub fn disk_layout(&self) -> inode::DiskLayout {
        inode::DiskLayout { disk: self.disk, lba_start: self.lba_start, inode_table_lba: self.superblock.inode_table_lba }
    }
}

fn div_ceil(n: u32, d: u32) -> u32 {
    (n + d - 1) / d
}

/// Geometry layout, in LBA order from partition base (spec §4.7): boot
/// sector (1), superblock (1), block bitmap, inode bitmap, inode table,
/// data region.
fn layout(sector_count: u32) -> Superblock {
    let inode_table_sectors = div_ceil(inode::MAX_INODES * inode::INODE_DISK_SIZE as u32, SECTOR_SIZE as u32);
    let block_bitmap_lba = 2;
    // Block bitmap covers every sector in the partition, including the
    // metadata sectors that precede it (spec §8: superblock, bitmap, and
    // inode-table blocks are themselves set bits in `block_bitmap`).
    let block_bitmap_sectors = div_ceil(sector_count, 8 * SECTOR_SIZE as u32);
    let inode_bitmap_lba = block_bitmap_lba + block_bitmap_sectors;
    let inode_table_lba = inode_bitmap_lba + INODE_BITMAP_SECTORS;
    let data_region_lba = inode_table_lba + inode_table_sectors;

    Superblock {
        magic: MAGIC,
        sector_count,
        inode_count: inode::MAX_INODES,
        partition_base_lba: 0,
        block_bitmap_lba,
        block_bitmap_sectors,
        inode_bitmap_lba,
        inode_bitmap_sectors: INODE_BITMAP_SECTORS,
        inode_table_lba,
        inode_table_sectors,
        data_region_lba,
        root_inode: ROOT_INODE,
        dirent_size: super::dirent::DIRENT_SIZE as u32,
    }
}

/// Format `partition` fresh: lay out the superblock, zero both bitmaps,
/// mark every metadata block allocated, and write the root directory
/// (inode 0, `.`/`..` both pointing at itself) into its first data block.
pub fn format(disk: u8, lba_start: u32, sector_count: u32) -> Result<MountedPartition, KernelError> {
    let superblock = layout(sector_count);

    let mut block_bitmap = vec![0u8; (superblock.block_bitmap_sectors as usize) * SECTOR_SIZE];
    {
        let mut bitmap = Bitmap::new(&mut block_bitmap, sector_count as usize);
        bitmap.init();
        for block in 0..superblock.data_region_lba {
            bitmap.set(block as usize, true);
        }
    }

    let mut inode_bitmap = vec![0u8; SECTOR_SIZE];
    {
        let mut bitmap = Bitmap::new(&mut inode_bitmap, inode::MAX_INODES as usize);
        bitmap.init();
        bitmap.set(ROOT_INODE as usize, true);
    }

    let mut partition = MountedPartition { disk, lba_start, superblock, block_bitmap, inode_bitmap, open_inodes: OpenInodes::new() };

    let mut sb_sector = [0u8; SECTOR_SIZE];
    partition.superblock.write_to(&mut sb_sector);
    partition.write_sectors(1, &sb_sector)?;

    let root_block = partition.alloc_block()?;
    partition.sync_block_bitmap()?;
    partition.sync_inode_bitmap()?;

    let mut root_inode = inode::Inode::empty(ROOT_INODE);
    root_inode.blocks[0] = root_block;
    root_inode.size = 2 * super::dirent::DIRENT_SIZE as u32;
    inode::inode_sync(partition.disk_layout(), &root_inode)?;

    let mut data_sector = [0u8; SECTOR_SIZE];
    DirEntry::new(".", ROOT_INODE, FileType::Directory).write_to(&mut data_sector[0..super::dirent::DIRENT_SIZE]);
    DirEntry::new("..", ROOT_INODE, FileType::Directory)
        .write_to(&mut data_sector[super::dirent::DIRENT_SIZE..2 * super::dirent::DIRENT_SIZE]);
    partition.write_sectors(root_block, &data_sector)?;

    Ok(partition)
}

/// Read the superblock at `partition + 1`; reject if magic mismatches,
/// else reformat (spec §4.7's mount contract: unrecognized media gets a
/// fresh filesystem rather than failing to boot).
pub fn mount(disk: u8, lba_start: u32, sector_count: u32) -> Result<MountedPartition, KernelError> {
    let mut probe = [0u8; SECTOR_SIZE];
    ide::read(disk, lba_start + 1, &mut probe)?;
    let superblock = Superblock::read_from(&probe);

    if superblock.magic != MAGIC {
        return format(disk, lba_start, sector_count);
    }

    let mut block_bitmap = vec![0u8; (superblock.block_bitmap_sectors as usize) * SECTOR_SIZE];
    ide::read(disk, lba_start + superblock.block_bitmap_lba, &mut block_bitmap)?;

    let mut inode_bitmap = vec![0u8; SECTOR_SIZE];
    ide::read(disk, lba_start + superblock.inode_bitmap_lba, &mut inode_bitmap)?;

    Ok(MountedPartition { disk, lba_start, superblock, block_bitmap, inode_bitmap, open_inodes: OpenInodes::new() })
}
