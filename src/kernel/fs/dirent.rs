// src/kernel/fs/dirent.rs
//! Directory entries (spec §3): 16-byte name, inode number, file type.
//! 24 bytes total, never crosses a sector boundary on disk.

pub const NAME_LEN: usize = 16;
pub const DIRENT_SIZE: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Unknown = 0,
    Regular = 1,
    Directory = 2,
}

impl FileType {
    #[must_use]
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => FileType::Regular,
            2 => FileType::Directory,
            _ => FileType::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DirEntry {
    pub name: [u8; NAME_LEN],
    pub name_len: u8,
    pub inode: u32,
    pub file_type: FileType,
}

impl DirEntry {
    #[must_use]
    pub fn unknown() -> Self {
        Self { name: [0; NAME_LEN], name_len: 0, inode: 0, file_type: FileType::Unknown }
    }

    #[must_use]
    pub fn new(name: &str, inode: u32, file_type: FileType) -> Self {
        let mut buf = [0u8; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self { name: buf, name_len: len as u8, inode, file_type }
    }

    #[must_use]
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.file_type != FileType::Unknown
    }

    pub fn read_from(bytes: &[u8]) -> Self {
        let name_bytes: [u8; NAME_LEN] = bytes[0..NAME_LEN].try_into().unwrap();
        let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(NAME_LEN) as u8;
        let inode = u32::from_le_bytes(bytes[NAME_LEN..NAME_LEN + 4].try_into().unwrap());
        let file_type = FileType::from_u32(u32::from_le_bytes(bytes[NAME_LEN + 4..NAME_LEN + 8].try_into().unwrap()));
        Self { name: name_bytes, name_len, inode, file_type }
    }

    pub fn write_to(&self, bytes: &mut [u8]) {
        bytes[0..NAME_LEN].copy_from_slice(&self.name);
        bytes[NAME_LEN..NAME_LEN + 4].copy_from_slice(&self.inode.to_le_bytes());
        bytes[NAME_LEN + 4..NAME_LEN + 8].copy_from_slice(&(self.file_type as u32).to_le_bytes());
    }
}
