// src/kernel/fs/ops.rs
//! File-level operations the syscall gate dispatches into (spec §4.7,
//! §4.8, §4.9): open/close/read/write/lseek, unlink/mkdir/rmdir,
//! opendir/readdir/closedir/rewinddir, stat, getcwd/chdir.

use super::dir;
use super::dirent::{DirEntry, FileType};
use super::file::{FileTable, FileTableEntry};
use super::inode::{self, inode_read, inode_sync, Inode, ROOT_INODE};
use super::partition::MountedPartition;
use super::path;
use crate::errors::{FsError, KernelError};
use crate::kernel::task::tcb::{Descriptor, Tcb, MAX_OPEN_FILES};
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};

/// `O_CREAT`: create the file if the path does not already resolve.
pub const O_CREAT: u32 = 1 << 0;

fn alloc_fd(tcb: &mut Tcb, descriptor: Descriptor) -> Result<i32, KernelError> {
    let slot = tcb.fd_table.iter().position(|d| *d == Descriptor::Free).ok_or(FsError::NoSpace)?;
    tcb.fd_table[slot] = descriptor;
    Ok(slot as i32)
}

fn descriptor_at(tcb: &Tcb, fd: i32) -> Result<Descriptor, KernelError> {
    let fd = usize::try_from(fd).map_err(|_| FsError::BadDescriptor)?;
    if fd >= MAX_OPEN_FILES {
        return Err(FsError::BadDescriptor.into());
    }
    match tcb.fd_table[fd] {
        Descriptor::Free => Err(FsError::BadDescriptor.into()),
        other => Ok(other),
    }
}

/// `open(path, flags)` (spec §4.7): resolve the path, optionally creating
/// a fresh regular file, then install a file-table slot and fd.
pub fn open(partition: &mut MountedPartition, files: &mut FileTable, tcb: &mut Tcb, path_str: &str, flags: u32) -> Result<i32, KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;

    let inode_id = match resolved.existing {
        Some((id, FileType::Directory)) => return open_directory_checked(partition, files, tcb, id, flags),
        Some((id, FileType::Regular)) => id,
        Some((_, FileType::Unknown)) => return Err(FsError::NotFound.into()),
        None if flags & O_CREAT != 0 => create_regular(partition, resolved.parent_inode, &resolved.name)?,
        None => return Err(FsError::NotFound.into()),
    };

    partition.open_inodes.open(inode_id);
    let slot = files.alloc(FileTableEntry::Regular { inode_id, position: 0, flags, open_descriptors: 1 })?;
    alloc_fd(tcb, Descriptor::File(slot)).inspect_err(|_| {
        files.free(slot);
        partition.open_inodes.close(inode_id);
    })
}

fn open_directory_checked(
    partition: &mut MountedPartition,
    files: &mut FileTable,
    tcb: &mut Tcb,
    inode_id: u32,
    flags: u32,
) -> Result<i32, KernelError> {
    partition.open_inodes.open(inode_id);
    let slot = files.alloc(FileTableEntry::Regular { inode_id, position: 0, flags, open_descriptors: 1 })?;
    alloc_fd(tcb, Descriptor::File(slot)).inspect_err(|_| {
        files.free(slot);
        partition.open_inodes.close(inode_id);
    })
}

fn create_regular(partition: &mut MountedPartition, parent: u32, name: &str) -> Result<u32, KernelError> {
    let id = partition.alloc_inode_number()?;
    partition.sync_inode_bitmap()?;
    let new_inode = Inode::empty(id);
    inode_sync(partition.disk_layout(), &new_inode)?;

    let mut parent_inode = inode_read(partition.disk_layout(), parent)?;
    if let Err(err) = dir::add_entry(partition, &mut parent_inode, &DirEntry::new(name, id, FileType::Regular)) {
        partition.free_inode_number(id);
        partition.sync_inode_bitmap()?;
        return Err(err);
    }
    inode_sync(partition.disk_layout(), &parent_inode)?;
    Ok(id)
}

/// `opendir(path)`: same fd machinery as `open`, restricted to directories.
pub fn opendir(partition: &mut MountedPartition, files: &mut FileTable, tcb: &mut Tcb, path_str: &str) -> Result<i32, KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    match resolved.existing {
        Some((id, FileType::Directory)) => open_directory_checked(partition, files, tcb, id, 0),
        Some(_) => Err(FsError::NotADirectory.into()),
        None => Err(FsError::NotFound.into()),
    }
}

/// `close`/`closedir`: drop the fd, release the file-table slot's
/// reference, and once the last reference is gone, the open-inode count.
pub fn close(partition: &mut MountedPartition, files: &mut FileTable, tcb: &mut Tcb, fd: i32) -> Result<(), KernelError> {
    let descriptor = descriptor_at(tcb, fd)?;
    let Descriptor::File(slot) = descriptor else {
        tcb.fd_table[fd as usize] = Descriptor::Free;
        return Ok(());
    };
    let inode_id = match files.entry(slot)? {
        FileTableEntry::Regular { inode_id, .. } => Some(*inode_id),
        FileTableEntry::Pipe { .. } => None,
        FileTableEntry::Free => unreachable!("entry() never returns Free"),
    };
    let closed = files.release_ref(slot);
    tcb.fd_table[fd as usize] = Descriptor::Free;
    if closed {
        if let Some(id) = inode_id {
            partition.open_inodes.close(id);
        }
    }
    Ok(())
}

/// `read(fd, buf)` (spec §4.8, §9). Stdin drains the keyboard ring
/// buffer; pipes never block; regular files read from the inode's data
/// blocks starting at the descriptor's stored position. See
/// [`read_inode_at`] for the preserved `file_read` block-count bug.
pub fn read(partition: &MountedPartition, files: &mut FileTable, tcb: &mut Tcb, fd: i32, buf: &mut [u8]) -> Result<usize, KernelError> {
    match descriptor_at(tcb, fd)? {
        Descriptor::Stdio(0) => {
            for slot in buf.iter_mut() {
                *slot = crate::kernel::driver::keyboard::read_byte_blocking();
            }
            Ok(buf.len())
        }
        Descriptor::Stdio(_) => Err(FsError::InvalidArgument.into()),
        Descriptor::File(slot) => match files.entry_mut(slot)? {
            FileTableEntry::Pipe { .. } => files.pipe_read(slot, buf),
            FileTableEntry::Regular { inode_id, position, .. } => {
                let inode_id = *inode_id;
                let start = *position;
                let inode = inode_read(partition.disk_layout(), inode_id)?;
                let n = read_inode_at(partition, &inode, start, buf)?;
                if let FileTableEntry::Regular { position, .. } = files.entry_mut(slot)? {
                    *position += n as u32;
                }
                Ok(n)
            }
            FileTableEntry::Free => unreachable!("entry_mut() never returns Free"),
        },
    }
}

fn read_inode_at(partition: &MountedPartition, inode: &Inode, start: u32, buf: &mut [u8]) -> Result<usize, KernelError> {
    if start >= inode.size {
        return Ok(0);
    }
    let remaining = (inode.size - start) as usize;
    let want = buf.len().min(remaining);

    let start_idx = (start as usize) / super::SECTOR_SIZE;
    let end_idx = (start + want as u32 - 1) as usize / super::SECTOR_SIZE;
    // Spec §9, preserved verbatim: swapped operands from the original's
    // `end_idx - start_idx`. The original only consults this to pick its
    // single-vs-multi-block path (`examples/original_source/fs/file.c:571`);
    // the copy loop itself is driven by bytes remaining
    // (`file.c:639`'s `while (bytes_read < size)`), not by this count.
    let _read_blocks = start_idx.wrapping_sub(end_idx);

    let mut done = 0usize;
    let mut slot = start_idx;
    while done < want {
        let block_offset = if slot == start_idx { start as usize % super::SECTOR_SIZE } else { 0 };
        let Some(block) = dir::block_for_slot(partition, inode, slot)? else { break };
        let sector = partition.read_sector(block)?;
        let avail = super::SECTOR_SIZE - block_offset;
        let n = (want - done).min(avail);
        buf[done..done + n].copy_from_slice(&sector[block_offset..block_offset + n]);
        done += n;
        slot += 1;
    }
    Ok(done)
}

/// `write(fd, buf)` (spec §4.7, §8: 71 680-byte capacity ceiling).
pub fn write(partition: &mut MountedPartition, files: &mut FileTable, tcb: &mut Tcb, fd: i32, buf: &[u8]) -> Result<usize, KernelError> {
    match descriptor_at(tcb, fd)? {
        Descriptor::Stdio(1) | Descriptor::Stdio(2) => {
            let text = core::str::from_utf8(buf).map_err(|_| FsError::InvalidArgument)?;
            crate::kernel::driver::write_console(format_args!("{text}"));
            Ok(buf.len())
        }
        Descriptor::Stdio(_) => Err(FsError::InvalidArgument.into()),
        Descriptor::File(slot) => match files.entry_mut(slot)? {
            FileTableEntry::Pipe { .. } => files.pipe_write(slot, buf),
            FileTableEntry::Regular { inode_id, position, .. } => {
                let inode_id = *inode_id;
                let start = *position;
                if start as usize + buf.len() > inode::MAX_FILE_SIZE {
                    return Err(FsError::TooLarge.into());
                }
                if partition.open_inodes.is_write_locked(inode_id) {
                    return Err(FsError::Busy.into());
                }
                partition.open_inodes.set_write_locked(inode_id, true);
                let result = (|| {
                    let mut inode = inode_read(partition.disk_layout(), inode_id)?;
                    write_inode_at(partition, &mut inode, start, buf)?;
                    inode_sync(partition.disk_layout(), &inode)
                })();
                partition.open_inodes.set_write_locked(inode_id, false);
                result?;
                if let FileTableEntry::Regular { position, .. } = files.entry_mut(slot)? {
                    *position += buf.len() as u32;
                }
                Ok(buf.len())
            }
            FileTableEntry::Free => unreachable!("entry_mut() never returns Free"),
        },
    }
}

fn write_inode_at(partition: &mut MountedPartition, inode: &mut Inode, start: u32, buf: &[u8]) -> Result<(), KernelError> {
    let mut done = 0usize;
    while done < buf.len() {
        let pos = start as usize + done;
        let slot = pos / super::SECTOR_SIZE;
        let block_offset = pos % super::SECTOR_SIZE;
        let block = dir::ensure_block_for_slot(partition, inode, slot)?;
        let mut sector = partition.read_sector(block)?;
        let n = (buf.len() - done).min(super::SECTOR_SIZE - block_offset);
        sector[block_offset..block_offset + n].copy_from_slice(&buf[done..done + n]);
        partition.write_sectors(block, &sector)?;
        done += n;
    }
    let end = start + buf.len() as u32;
    if end > inode.size {
        inode.size = end;
    }
    Ok(())
}

/// `lseek(fd, offset, whence)` (spec §9): the EOF clamp is off by one —
/// it permits seeking to `size - 1` but rejects seeking exactly to
/// `size` (the correct end-of-file position for a subsequent append
/// write), preserved verbatim from the original.
pub fn lseek(partition: &MountedPartition, files: &mut FileTable, tcb: &mut Tcb, fd: i32, offset: i32, whence: i32) -> Result<u32, KernelError> {
    let Descriptor::File(slot) = descriptor_at(tcb, fd)? else { return Err(FsError::InvalidArgument.into()) };
    let FileTableEntry::Regular { inode_id, position, .. } = files.entry(slot)? else {
        return Err(FsError::InvalidArgument.into());
    };
    let inode_id = *inode_id;
    let current = *position;
    let file_size = inode_read(partition.disk_layout(), inode_id)?.size;

    let base: i64 = match whence {
        0 => 0,
        1 => i64::from(current),
        2 => i64::from(file_size),
        _ => return Err(FsError::InvalidArgument.into()),
    };
    let new_pos = base + i64::from(offset);
    if new_pos < 0 || new_pos as u32 > file_size.saturating_sub(1) {
        return Err(FsError::InvalidArgument.into());
    }
    let new_pos = new_pos as u32;
    if let FileTableEntry::Regular { position, .. } = files.entry_mut(slot)? {
        *position = new_pos;
    }
    Ok(new_pos)
}

/// `unlink(path)`.
pub fn unlink(partition: &mut MountedPartition, tcb: &Tcb, path_str: &str) -> Result<(), KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    let (id, file_type) = resolved.existing.ok_or(FsError::NotFound)?;
    if file_type == FileType::Directory {
        return Err(FsError::IsADirectory.into());
    }
    if partition.open_inodes.is_open(id) {
        return Err(FsError::Busy.into());
    }

    let mut parent = inode_read(partition.disk_layout(), resolved.parent_inode)?;
    dir::delete_entry(partition, &mut parent, &resolved.name)?;
    inode_sync(partition.disk_layout(), &parent)?;

    let inode = inode_read(partition.disk_layout(), id)?;
    dir::free_all_blocks(partition, &inode)?;
    partition.free_inode_number(id);
    partition.sync_inode_bitmap()
}

/// `mkdir(path)`.
pub fn mkdir(partition: &mut MountedPartition, tcb: &Tcb, path_str: &str) -> Result<(), KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    if resolved.existing.is_some() {
        return Err(FsError::AlreadyExists.into());
    }

    let id = partition.alloc_inode_number()?;
    partition.sync_inode_bitmap()?;

    let block = partition.alloc_block().inspect_err(|_| {
        partition.free_inode_number(id);
    })?;
    partition.sync_block_bitmap()?;

    let mut new_dir = Inode::empty(id);
    new_dir.blocks[0] = block;
    new_dir.size = 2 * super::dirent::DIRENT_SIZE as u32;

    let mut sector = [0u8; super::SECTOR_SIZE];
    DirEntry::new(".", id, FileType::Directory).write_to(&mut sector[0..super::dirent::DIRENT_SIZE]);
    DirEntry::new("..", resolved.parent_inode, FileType::Directory)
        .write_to(&mut sector[super::dirent::DIRENT_SIZE..2 * super::dirent::DIRENT_SIZE]);
    partition.write_sectors(block, &sector)?;
    inode_sync(partition.disk_layout(), &new_dir)?;

    let mut parent = inode_read(partition.disk_layout(), resolved.parent_inode)?;
    dir::add_entry(partition, &mut parent, &DirEntry::new(&resolved.name, id, FileType::Directory))?;
    inode_sync(partition.disk_layout(), &parent)
}

/// `rmdir(path)`: refuses anything but an empty directory (just `.`/`..`).
pub fn rmdir(partition: &mut MountedPartition, tcb: &Tcb, path_str: &str) -> Result<(), KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    let (id, file_type) = resolved.existing.ok_or(FsError::NotFound)?;
    if file_type != FileType::Directory {
        return Err(FsError::NotADirectory.into());
    }
    if id == ROOT_INODE {
        return Err(FsError::InvalidArgument.into());
    }
    if partition.open_inodes.is_open(id) {
        return Err(FsError::Busy.into());
    }

    let inode = inode_read(partition.disk_layout(), id)?;
    if inode.size != 2 * super::dirent::DIRENT_SIZE as u32 {
        return Err(FsError::NotEmpty.into());
    }

    let mut parent = inode_read(partition.disk_layout(), resolved.parent_inode)?;
    dir::delete_entry(partition, &mut parent, &resolved.name)?;
    inode_sync(partition.disk_layout(), &parent)?;

    dir::free_all_blocks(partition, &inode)?;
    partition.free_inode_number(id);
    partition.sync_inode_bitmap()
}

/// `readdir(fd)`: advance the descriptor's stored position one live
/// entry at a time.
pub fn readdir(partition: &MountedPartition, files: &mut FileTable, tcb: &Tcb, fd: i32) -> Result<Option<DirEntry>, KernelError> {
    let Descriptor::File(slot) = descriptor_at(tcb, fd)? else { return Err(FsError::InvalidArgument.into()) };
    let FileTableEntry::Regular { inode_id, position, .. } = files.entry(slot)? else {
        return Err(FsError::InvalidArgument.into());
    };
    let inode_id = *inode_id;
    let mut offset = *position;
    let inode = inode_read(partition.disk_layout(), inode_id)?;
    let entry = dir::read_at_offset(partition, &inode, &mut offset)?;
    if let FileTableEntry::Regular { position, .. } = files.entry_mut(slot)? {
        *position = offset;
    }
    Ok(entry)
}

/// `rewinddir(fd)`: reset the stream back to the first entry.
pub fn rewinddir(files: &mut FileTable, tcb: &Tcb, fd: i32) -> Result<(), KernelError> {
    let Descriptor::File(slot) = descriptor_at(tcb, fd)? else { return Err(FsError::InvalidArgument.into()) };
    match files.entry_mut(slot)? {
        FileTableEntry::Regular { position, .. } => {
            *position = 0;
            Ok(())
        }
        _ => Err(FsError::InvalidArgument.into()),
    }
}

/// `stat(path)`: the handful of inode fields the spec's testable
/// properties care about (size and type; no timestamps are tracked).
pub struct Stat {
    pub inode: u32,
    pub size: u32,
    pub file_type: FileType,
}

pub fn stat(partition: &MountedPartition, tcb: &Tcb, path_str: &str) -> Result<Stat, KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    let (id, file_type) = resolved.existing.ok_or(FsError::NotFound)?;
    let inode = inode_read(partition.disk_layout(), id)?;
    Ok(Stat { inode: id, size: inode.size, file_type })
}

/// `chdir(path)`.
pub fn chdir(partition: &MountedPartition, tcb: &mut Tcb, path_str: &str) -> Result<(), KernelError> {
    let resolved = path::resolve(partition, tcb.cwd_inode, path_str)?;
    let (id, file_type) = resolved.existing.ok_or(FsError::NotFound)?;
    if file_type != FileType::Directory {
        return Err(FsError::NotADirectory.into());
    }
    tcb.cwd_inode = id;
    Ok(())
}

/// Counts path-building recursion steps across *every* `getcwd` call,
/// never reset between them (spec §9's `path_depth_count` bug,
/// preserved verbatim). The count itself is never read back by anything
/// today, so the only observable symptom is the value in
/// `PATH_DEPTH_LEAK` growing forever across the machine's uptime.
static PATH_DEPTH_LEAK: AtomicUsize = AtomicUsize::new(0);

fn path_depth_count() -> usize {
    PATH_DEPTH_LEAK.fetch_add(1, Ordering::Relaxed)
}

/// `getcwd(buf)`: walk `.. ` links from the current directory back to
/// the root, collecting the name each inode is known by in its parent.
pub fn getcwd(partition: &MountedPartition, tcb: &Tcb, buf: &mut [u8]) -> Result<usize, KernelError> {
    if tcb.cwd_inode == ROOT_INODE {
        if buf.is_empty() {
            return Err(FsError::InvalidArgument.into());
        }
        buf[0] = b'/';
        return Ok(1);
    }

    let mut names: Vec<String> = Vec::new();
    let mut current = tcb.cwd_inode;
    loop {
        path_depth_count();
        let dir_inode = inode_read(partition.disk_layout(), current)?;
        let (parent, _) = dir::lookup(partition, &dir_inode, "..")?.ok_or(FsError::NotFound)?;
        if parent == current {
            break;
        }
        let parent_inode = inode_read(partition.disk_layout(), parent)?;
        let name = dir::find_name_for_inode(partition, &parent_inode, current)?.ok_or(FsError::NotFound)?;
        names.push(name);
        current = parent;
        if current == ROOT_INODE {
            break;
        }
    }

    let mut out = String::from("/");
    for name in names.iter().rev() {
        out.push_str(name);
        out.push('/');
    }
    if out.len() > 1 {
        out.pop();
    }
    let bytes = out.as_bytes();
    if bytes.len() >= buf.len() {
        return Err(FsError::InvalidArgument.into());
    }
    buf[..bytes.len()].copy_from_slice(bytes);
    Ok(bytes.len())
}

/// `pipe()`: a single shared buffer slot, two descriptors referencing it.
pub fn pipe(files: &mut FileTable, tcb: &mut Tcb) -> Result<(i32, i32), KernelError> {
    let slot = files.alloc_pipe()?;
    let read_fd = alloc_fd(tcb, Descriptor::File(slot)).inspect_err(|_| files.free(slot))?;
    let write_fd = alloc_fd(tcb, Descriptor::File(slot)).inspect_err(|_| {
        tcb.fd_table[read_fd as usize] = Descriptor::Free;
        files.free(slot);
    })?;
    Ok((read_fd, write_fd))
}

/// `fd_redirect(from, to)`: point descriptor `from` at whatever `to`
/// currently refers to, bumping the target's reference count.
pub fn fd_redirect(files: &mut FileTable, tcb: &mut Tcb, from: i32, to: i32) -> Result<(), KernelError> {
    let target = descriptor_at(tcb, to)?;
    let from_idx = usize::try_from(from).map_err(|_| FsError::BadDescriptor)?;
    if from_idx >= MAX_OPEN_FILES {
        return Err(FsError::BadDescriptor.into());
    }
    if let Descriptor::File(slot) = tcb.fd_table[from_idx] {
        files.release_ref(slot);
    }
    if let Descriptor::File(slot) = target {
        files.add_ref(slot);
    }
    tcb.fd_table[from_idx] = target;
    Ok(())
}
