// src/kernel/fs/dir.rs
//! Directory-entry read/write/delete over the 12-direct + 128-indirect
//! block space every inode has (spec §4.7).

use super::dirent::{DirEntry, FileType, DIRENT_SIZE};
use super::inode::{Inode, BLOCKS_PER_INODE, INDIRECT_ENTRIES, INDIRECT_INDEX, MAX_FILE_BLOCKS, NO_BLOCK};
use super::partition::MountedPartition;
use super::SECTOR_SIZE;
use crate::errors::{FsError, KernelError};

const ENTRIES_PER_SECTOR: usize = SECTOR_SIZE / DIRENT_SIZE;

fn read_indirect_table(partition: &MountedPartition, inode: &Inode) -> Result<Option<[u8; SECTOR_SIZE]>, KernelError> {
    let table_block = inode.blocks[INDIRECT_INDEX];
    if table_block == NO_BLOCK {
        return Ok(None);
    }
    Ok(Some(partition.read_sector(table_block)?))
}

/// Read-only lookup of the data block backing candidate slot `slot`
/// (0..11 direct, 12..139 indirect). `None` means that slot has never
/// been allocated.
pub fn block_for_slot(partition: &MountedPartition, inode: &Inode, slot: usize) -> Result<Option<u32>, KernelError> {
    if slot < INDIRECT_INDEX {
        return Ok(match inode.blocks[slot] {
            NO_BLOCK => None,
            block => Some(block),
        });
    }
    let Some(table) = read_indirect_table(partition, inode)? else { return Ok(None) };
    let offset = (slot - INDIRECT_INDEX) * 4;
    let block = u32::from_le_bytes(table[offset..offset + 4].try_into().unwrap());
    Ok(if block == NO_BLOCK { None } else { Some(block) })
}

/// Get-or-allocate the data block for `slot`, persisting whatever new
/// allocation (or new indirect table) it needed (spec §4.7: "on the
/// twelfth step, additionally allocate the indirect table itself").
pub fn ensure_block_for_slot(partition: &mut MountedPartition, inode: &mut Inode, slot: usize) -> Result<u32, KernelError> {
    if slot < INDIRECT_INDEX {
        if inode.blocks[slot] == NO_BLOCK {
            let block = partition.alloc_block()?;
            partition.sync_block_bitmap()?;
            inode.blocks[slot] = block;
        }
        return Ok(inode.blocks[slot]);
    }

    if inode.blocks[INDIRECT_INDEX] == NO_BLOCK {
        let table_block = partition.alloc_block()?;
        partition.sync_block_bitmap()?;
        inode.blocks[INDIRECT_INDEX] = table_block;
        partition.write_sectors(table_block, &[0u8; SECTOR_SIZE])?;
    }

    let table_block = inode.blocks[INDIRECT_INDEX];
    let mut table = partition.read_sector(table_block)?;
    let offset = (slot - INDIRECT_INDEX) * 4;
    let existing = u32::from_le_bytes(table[offset..offset + 4].try_into().unwrap());
    if existing != NO_BLOCK {
        return Ok(existing);
    }

    let block = partition.alloc_block()?;
    partition.sync_block_bitmap()?;
    table[offset..offset + 4].copy_from_slice(&block.to_le_bytes());
    partition.write_sectors(table_block, &table)?;
    Ok(block)
}

/// Rollback helper for a failed inner allocation while installing a fresh
/// indirect table (spec §7, §9). The index is deliberately never advanced
/// inside the loop, reproducing the original's bug verbatim: if any entry
/// in the table is non-empty, this does not terminate. Reachable only
/// from the indirect-table-allocation failure path in [`add_entry`],
/// which a disk with free space never takes.
#[allow(unused)]
fn free_all_indirect_blocks(partition: &mut MountedPartition, table: &mut [u8; SECTOR_SIZE]) {
    let mut i = 0usize;
    while i < INDIRECT_ENTRIES {
        let offset = i * 4;
        let block = u32::from_le_bytes(table[offset..offset + 4].try_into().unwrap());
        if block != NO_BLOCK {
            partition.free_block(block);
            table[offset..offset + 4].copy_from_slice(&NO_BLOCK.to_le_bytes());
        }
    }
}

/// `dir_entry_write` (spec §4.7).
pub fn add_entry(partition: &mut MountedPartition, dir: &mut Inode, entry: &DirEntry) -> Result<(), KernelError> {
    for slot in 0..MAX_FILE_BLOCKS {
        match block_for_slot(partition, dir, slot)? {
            None => {
                let block = ensure_block_for_slot(partition, dir, slot)?;
                let mut sector = [0u8; SECTOR_SIZE];
                entry.write_to(&mut sector[0..DIRENT_SIZE]);
                partition.write_sectors(block, &sector)?;
                dir.size += DIRENT_SIZE as u32;
                return Ok(());
            }
            Some(block) => {
                let mut sector = partition.read_sector(block)?;
                for i in 0..ENTRIES_PER_SECTOR {
                    let offset = i * DIRENT_SIZE;
                    let existing = DirEntry::read_from(&sector[offset..offset + DIRENT_SIZE]);
                    if !existing.is_live() {
                        entry.write_to(&mut sector[offset..offset + DIRENT_SIZE]);
                        partition.write_sectors(block, &sector)?;
                        dir.size += DIRENT_SIZE as u32;
                        return Ok(());
                    }
                }
            }
        }
    }
    Err(FsError::NoSpace.into())
}

fn count_live_entries(sector: &[u8; SECTOR_SIZE]) -> usize {
    (0..ENTRIES_PER_SECTOR).filter(|&i| DirEntry::read_from(&sector[i * DIRENT_SIZE..(i + 1) * DIRENT_SIZE]).is_live()).count()
}

/// `delete_dir_entry` (spec §4.7): walk the 140-block space; free a
/// non-first block once the target entry is its only non-`.`/`..` live
/// entry, otherwise zero the entry in place.
pub fn delete_entry(partition: &mut MountedPartition, dir: &mut Inode, name: &str) -> Result<(), KernelError> {
    for slot in 0..MAX_FILE_BLOCKS {
        let Some(block) = block_for_slot(partition, dir, slot)? else { continue };
        let mut sector = partition.read_sector(block)?;
        for i in 0..ENTRIES_PER_SECTOR {
            let offset = i * DIRENT_SIZE;
            let existing = DirEntry::read_from(&sector[offset..offset + DIRENT_SIZE]);
            if !existing.is_live() || existing.name_str() != name {
                continue;
            }

            let non_dotted_live = count_live_entries(&sector)
                - usize::from(slot == 0 && (existing.name_str() == "." || existing.name_str() == ".."));
            if slot != 0 && non_dotted_live == 1 {
                partition.free_block(block);
                if slot >= INDIRECT_INDEX {
                    let table_block = dir.blocks[INDIRECT_INDEX];
                    let mut table = partition.read_sector(table_block)?;
                    let table_offset = (slot - INDIRECT_INDEX) * 4;
                    table[table_offset..table_offset + 4].copy_from_slice(&NO_BLOCK.to_le_bytes());
                    if table[..].iter().all(|&b| b == 0) {
                        partition.free_block(table_block);
                        dir.blocks[INDIRECT_INDEX] = NO_BLOCK;
                    } else {
                        partition.write_sectors(table_block, &table)?;
                    }
                } else {
                    dir.blocks[slot] = NO_BLOCK;
                }
                partition.sync_block_bitmap()?;
            } else {
                sector[offset..offset + DIRENT_SIZE].copy_from_slice(&[0u8; DIRENT_SIZE]);
                partition.write_sectors(block, &sector)?;
            }
            dir.size -= DIRENT_SIZE as u32;
            return Ok(());
        }
    }
    Err(FsError::NotFound.into())
}

/// Scan `dir` for a live entry named `name`.
pub fn lookup(partition: &MountedPartition, dir: &Inode, name: &str) -> Result<Option<(u32, FileType)>, KernelError> {
    for slot in 0..MAX_FILE_BLOCKS {
        let Some(block) = block_for_slot(partition, dir, slot)? else { continue };
        let sector = partition.read_sector(block)?;
        for i in 0..ENTRIES_PER_SECTOR {
            let offset = i * DIRENT_SIZE;
            let entry = DirEntry::read_from(&sector[offset..offset + DIRENT_SIZE]);
            if entry.is_live() && entry.name_str() == name {
                return Ok(Some((entry.inode, entry.file_type)));
            }
        }
    }
    Ok(None)
}

/// `readdir`: advance `offset` (a byte position into the directory's
/// logical entry stream) past one live entry, returning it.
pub fn read_at_offset(partition: &MountedPartition, dir: &Inode, offset: &mut u32) -> Result<Option<DirEntry>, KernelError> {
    loop {
        if *offset >= dir.size {
            return Ok(None);
        }
        let entry_index = (*offset / DIRENT_SIZE as u32) as usize;
        let slot = entry_index / ENTRIES_PER_SECTOR;
        let in_sector_index = entry_index % ENTRIES_PER_SECTOR;
        let Some(block) = block_for_slot(partition, dir, slot)? else {
            *offset += DIRENT_SIZE as u32;
            continue;
        };
        let sector = partition.read_sector(block)?;
        let sector_offset = in_sector_index * DIRENT_SIZE;
        let entry = DirEntry::read_from(&sector[sector_offset..sector_offset + DIRENT_SIZE]);
        *offset += DIRENT_SIZE as u32;
        if entry.is_live() {
            return Ok(Some(entry));
        }
    }
}

/// `free_all_indirect_blocks`'s sibling for the normal unlink/rmdir path:
/// release every allocated direct and indirect block, plus the indirect
/// table itself, then clear the inode's bit.
pub fn free_all_blocks(partition: &mut MountedPartition, inode: &Inode) -> Result<(), KernelError> {
    for block in &inode.blocks[..INDIRECT_INDEX] {
        if *block != NO_BLOCK {
            partition.free_block(*block);
        }
    }
    let indirect = inode.blocks[INDIRECT_INDEX];
    if indirect != NO_BLOCK {
        let table = partition.read_sector(indirect)?;
        for i in 0..INDIRECT_ENTRIES {
            let offset = i * 4;
            let block = u32::from_le_bytes(table[offset..offset + 4].try_into().unwrap());
            if block != NO_BLOCK {
                partition.free_block(block);
            }
        }
        partition.free_block(indirect);
    }
    partition.sync_block_bitmap()
}

/// Reverse lookup used by `getcwd`: find the name under which `target`
/// appears in `dir`.
pub fn find_name_for_inode(partition: &MountedPartition, dir: &Inode, target: u32) -> Result<Option<alloc::string::String>, KernelError> {
    for slot in 0..MAX_FILE_BLOCKS {
        let Some(block) = block_for_slot(partition, dir, slot)? else { continue };
        let sector = partition.read_sector(block)?;
        for i in 0..ENTRIES_PER_SECTOR {
            let offset = i * DIRENT_SIZE;
            let entry = DirEntry::read_from(&sector[offset..offset + DIRENT_SIZE]);
            if entry.is_live() && entry.inode == target && entry.name_str() != "." && entry.name_str() != ".." {
                return Ok(Some(alloc::string::ToString::to_string(entry.name_str())));
            }
        }
    }
    Ok(None)
}

const _: () = assert!(BLOCKS_PER_INODE == INDIRECT_INDEX + 1);
