// src/kernel/mm/frame.rs
//! Physical frame pools (spec §3, §4.2): kernel and user pools, each a
//! [`Pool`] of 4 KiB frames, split 50/50 from whatever memory the
//! bootloader reported minus the low 1 MiB and the MiB reserved for the
//! initial page directory/tables.

use super::pool::Pool;
use super::types::PAGE_SIZE;
use crate::errors::{KernelError, MemError};
use spin::Mutex;

/// Low memory hole the BIOS/bootloader owns; never handed out as a frame.
const LOW_MEMORY_RESERVED: usize = 1024 * 1024;
/// Reserved for the kernel's initial page directory and page tables,
/// carved out of the same low region as [`LOW_MEMORY_RESERVED`].
const PAGE_STRUCTURES_RESERVED: usize = 1024 * 1024;

pub static KERNEL_POOL: Mutex<Pool> = Mutex::new(Pool::empty());
pub static USER_POOL: Mutex<Pool> = Mutex::new(Pool::empty());

/// Bring up both physical pools from the bootloader-reported total memory
/// size (spec §6: published as a 32-bit word at physical `0x900`).
pub fn init_pools(total_memory_bytes: usize) {
    let reserved = LOW_MEMORY_RESERVED + PAGE_STRUCTURES_RESERVED;
    let usable = total_memory_bytes.saturating_sub(reserved);
    let usable_frames = usable / PAGE_SIZE;
    let kernel_frames = usable_frames / 2;
    let user_frames = usable_frames - kernel_frames;

    let base = reserved;
    let kernel_base = base;
    let user_base = base + kernel_frames * PAGE_SIZE;

    KERNEL_POOL.lock().init(kernel_base, kernel_frames);
    USER_POOL.lock().init(user_base, user_frames);
}

/// Allocate `n` contiguous physical frames from `pool`.
pub fn alloc_frames(pool: &Mutex<Pool>, n: usize) -> Result<usize, KernelError> {
    pool.lock()
        .alloc_contiguous(n)
        .ok_or(KernelError::Mem(MemError::OutOfFrames))
}

pub fn free_frames(pool: &Mutex<Pool>, addr: usize, n: usize) {
    pool.lock().free_contiguous(addr, n);
}
