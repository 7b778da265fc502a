// src/kernel/fs/superblock.rs
//! On-disk superblock (spec §6): 512 bytes, persisted at partition LBA + 1.

use super::SECTOR_SIZE;

/// Marks a partition as carrying this filesystem (spec §3, §9 glossary).
pub const MAGIC: u32 = 0x1959_0318;

#[derive(Debug, Clone, Copy)]
pub struct Superblock {
    pub magic: u32,
    pub sector_count: u32,
    pub inode_count: u32,
    pub partition_base_lba: u32,
    pub block_bitmap_lba: u32,
    pub block_bitmap_sectors: u32,
    pub inode_bitmap_lba: u32,
    pub inode_bitmap_sectors: u32,
    pub inode_table_lba: u32,
    pub inode_table_sectors: u32,
    pub data_region_lba: u32,
    pub root_inode: u32,
    pub dirent_size: u32,
}

impl Superblock {
    #[must_use]
    pub fn read_from(sector: &[u8; SECTOR_SIZE]) -> Self {
        let word = |offset: usize| u32::from_le_bytes(sector[offset..offset + 4].try_into().unwrap());
        Self {
            magic: word(0),
            sector_count: word(4),
            inode_count: word(8),
            partition_base_lba: word(12),
            block_bitmap_lba: word(16),
            block_bitmap_sectors: word(20),
            inode_bitmap_lba: word(24),
            inode_bitmap_sectors: word(28),
            inode_table_lba: word(32),
            inode_table_sectors: word(36),
            data_region_lba: word(40),
            root_inode: word(44),
            dirent_size: word(48),
        }
    }

    pub fn write_to(&self, sector: &mut [u8; SECTOR_SIZE]) {
        sector.fill(0);
        let fields = [
            self.magic,
            self.sector_count,
            self.inode_count,
            self.partition_base_lba,
            self.block_bitmap_lba,
            self.block_bitmap_sectors,
            self.inode_bitmap_lba,
            self.inode_bitmap_sectors,
            self.inode_table_lba,
            self.inode_table_sectors,
            self.data_region_lba,
            self.root_inode,
            self.dirent_size,
        ];
        for (i, field) in fields.iter().enumerate() {
            sector[i * 4..i * 4 + 4].copy_from_slice(&field.to_le_bytes());
        }
    }
}
