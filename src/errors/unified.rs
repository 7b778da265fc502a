// src/errors/unified.rs

//! Unified error types for the kernel
//!
//! This module provides a consistent error handling approach across
//! all kernel subsystems: each subsystem owns a small `Copy` error enum,
//! and `From` impls fold it into the single top-level `KernelError` so
//! call sites can propagate with `?` across module boundaries.

use core::fmt;

/// Top-level kernel error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// VGA subsystem error
    Vga(VgaError),
    /// Serial subsystem error
    Serial(SerialError),
    /// Initialization error
    Init(InitError),
    /// Physical/virtual memory manager error
    Mem(MemError),
    /// Page-table manipulation error
    PageTable(PageTableError),
    /// Task/scheduler error
    Task(TaskError),
    /// Filesystem error
    Fs(FsError),
    /// Block device error
    Disk(DiskError),
    /// Syscall dispatch error
    Syscall(SyscallError),
}

impl fmt::Display for KernelError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            KernelError::Vga(e) => write!(f, "VGA error: {}", e),
            KernelError::Serial(e) => write!(f, "Serial error: {}", e),
            KernelError::Init(e) => write!(f, "Init error: {}", e),
            KernelError::Mem(e) => write!(f, "Memory error: {}", e),
            KernelError::PageTable(e) => write!(f, "Page table error: {}", e),
            KernelError::Task(e) => write!(f, "Task error: {}", e),
            KernelError::Fs(e) => write!(f, "Filesystem error: {}", e),
            KernelError::Disk(e) => write!(f, "Disk error: {}", e),
            KernelError::Syscall(e) => write!(f, "Syscall error: {}", e),
        }
    }
}

/// VGA subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VgaError {
    /// Buffer not accessible
    BufferNotAccessible,
    /// Invalid position
    InvalidPosition,
    /// Not initialized
    NotInitialized,
}

impl VgaError {
    pub const fn as_str(&self) -> &'static str {
        match self {
            VgaError::BufferNotAccessible => "buffer not accessible",
            VgaError::InvalidPosition => "invalid position",
            VgaError::NotInitialized => "not initialized",
        }
    }
}

impl fmt::Display for VgaError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<VgaError> for KernelError {
    fn from(err: VgaError) -> Self {
        KernelError::Vga(err)
    }
}

/// Serial subsystem errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialError {
    /// Port already initialized
    AlreadyInitialized,
    /// Timeout during operation
    Timeout,
}

impl fmt::Display for SerialError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SerialError::AlreadyInitialized => write!(f, "already initialized"),
            SerialError::Timeout => write!(f, "operation timeout"),
        }
    }
}

impl From<SerialError> for KernelError {
    fn from(err: SerialError) -> Self {
        KernelError::Serial(err)
    }
}

/// Initialization errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// A subsystem was brought up out of the required boot order
    OutOfOrder,
    /// Already initialized
    AlreadyInitialized,
    /// Prerequisites not met
    PrerequisitesNotMet,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            InitError::OutOfOrder => write!(f, "initialized out of order"),
            InitError::AlreadyInitialized => write!(f, "already initialized"),
            InitError::PrerequisitesNotMet => write!(f, "prerequisites not met"),
        }
    }
}

impl From<InitError> for KernelError {
    fn from(err: InitError) -> Self {
        KernelError::Init(err)
    }
}

/// Physical/virtual memory pool errors (§4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemError {
    /// The pool's bitmap has no run of the requested length
    OutOfFrames,
    /// The virtual pool has no run of the requested length
    OutOfVirtualSpace,
    /// Address was not frame-aligned where alignment is required
    Unaligned,
    /// A release targeted a frame the pool never granted
    NotOwned,
}

impl fmt::Display for MemError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            MemError::OutOfFrames => write!(f, "physical frame pool exhausted"),
            MemError::OutOfVirtualSpace => write!(f, "virtual address pool exhausted"),
            MemError::Unaligned => write!(f, "address is not frame-aligned"),
            MemError::NotOwned => write!(f, "frame is not owned by this pool"),
        }
    }
}

impl From<MemError> for KernelError {
    fn from(err: MemError) -> Self {
        KernelError::Mem(err)
    }
}

/// Page-table manipulation errors (§4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageTableError {
    /// Leaf entry already present; caller asked to install over a mapping.
    /// Per spec this is fatal (a bug), not a retryable condition.
    Busy,
    /// No second-level table exists and the caller asked not to allocate one
    NoTable,
}

impl fmt::Display for PageTableError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PageTableError::Busy => write!(f, "leaf already present (PT_BUSY)"),
            PageTableError::NoTable => write!(f, "second-level table not allocated"),
        }
    }
}

impl From<PageTableError> for KernelError {
    fn from(err: PageTableError) -> Self {
        KernelError::PageTable(err)
    }
}

/// Task/scheduler errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskError {
    /// No task with that pid or handle
    NotFound,
    /// PID bitmap has no free bit
    PidExhausted,
    /// Attempted an illegal status transition
    InvalidTransition,
    /// The stack sentinel at the base of a TCB page was overwritten
    StackOverflow,
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TaskError::NotFound => write!(f, "no such task"),
            TaskError::PidExhausted => write!(f, "pid bitmap exhausted"),
            TaskError::InvalidTransition => write!(f, "invalid task state transition"),
            TaskError::StackOverflow => write!(f, "kernel stack sentinel corrupted"),
        }
    }
}

impl From<TaskError> for KernelError {
    fn from(err: TaskError) -> Self {
        KernelError::Task(err)
    }
}

/// Filesystem errors (§4.7)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Superblock magic did not match `0x1959_0318`
    BadMagic,
    /// Path does not resolve to an existing entry
    NotFound,
    /// Path already exists and `CREAT` without replace semantics was used
    AlreadyExists,
    /// A path component that should be a directory is not one
    NotADirectory,
    /// Operation is not valid on a directory
    IsADirectory,
    /// `rmdir` on a directory with more than `.`/`..`
    NotEmpty,
    /// Inode or data-block bitmap has no free bit
    NoSpace,
    /// Invalid flag combination or malformed argument
    InvalidArgument,
    /// Inode write-locked by another writer
    Busy,
    /// Write would exceed 12+128 block capacity (71 680 bytes)
    TooLarge,
    /// All writers of a pipe have closed their descriptor
    BrokenPipe,
    /// Non-blocking operation could not complete immediately
    WouldBlock,
    /// Read found nothing left at or past the current offset
    Eof,
    /// Descriptor slot does not refer to an open file
    BadDescriptor,
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            FsError::BadMagic => "superblock magic mismatch",
            FsError::NotFound => "no such file or directory",
            FsError::AlreadyExists => "file exists",
            FsError::NotADirectory => "not a directory",
            FsError::IsADirectory => "is a directory",
            FsError::NotEmpty => "directory not empty",
            FsError::NoSpace => "no space left on device",
            FsError::InvalidArgument => "invalid argument",
            FsError::Busy => "resource busy",
            FsError::TooLarge => "file too large",
            FsError::BrokenPipe => "broken pipe",
            FsError::WouldBlock => "operation would block",
            FsError::Eof => "end of file",
            FsError::BadDescriptor => "bad file descriptor",
        };
        f.write_str(s)
    }
}

impl From<FsError> for KernelError {
    fn from(err: FsError) -> Self {
        KernelError::Fs(err)
    }
}

/// Block device errors (§4.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    /// The 30s busy-wait budget expired; this is fatal per spec §4.6
    Timeout,
    /// Channel has no drive attached at the requested position
    NoSuchDrive,
    /// Sector count or buffer length is not a multiple of 512
    UnalignedTransfer,
}

impl fmt::Display for DiskError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DiskError::Timeout => write!(f, "drive busy-wait timed out"),
            DiskError::NoSuchDrive => write!(f, "no drive at that channel position"),
            DiskError::UnalignedTransfer => write!(f, "unaligned sector transfer"),
        }
    }
}

impl From<DiskError> for KernelError {
    fn from(err: DiskError) -> Self {
        KernelError::Disk(err)
    }
}

/// Syscall dispatch errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyscallError {
    /// Syscall number has no entry in the 29-slot table
    NoSuchCall,
    /// An argument pointer fell outside user space
    FaultingPointer,
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyscallError::NoSuchCall => write!(f, "no such syscall"),
            SyscallError::FaultingPointer => write!(f, "argument pointer outside user space"),
        }
    }
}

impl From<SyscallError> for KernelError {
    fn from(err: SyscallError) -> Self {
        KernelError::Syscall(err)
    }
}

/// Result type alias for kernel operations
pub type Result<T> = core::result::Result<T, KernelError>;

/// Helper trait for error context
pub trait ErrorContext {
    /// Get a detailed description of the error
    fn context(&self) -> &'static str;
}

impl ErrorContext for KernelError {
    fn context(&self) -> &'static str {
        match self {
            KernelError::Vga(_) => "error occurred in VGA buffer subsystem",
            KernelError::Serial(_) => "error occurred in serial port subsystem",
            KernelError::Init(_) => "error occurred during kernel initialization",
            KernelError::Mem(_) => "error occurred in the memory manager",
            KernelError::PageTable(_) => "error occurred while editing a page table",
            KernelError::Task(_) => "error occurred in the task scheduler",
            KernelError::Fs(_) => "error occurred in the filesystem",
            KernelError::Disk(_) => "error occurred in the block device driver",
            KernelError::Syscall(_) => "error occurred dispatching a syscall",
        }
    }
}
