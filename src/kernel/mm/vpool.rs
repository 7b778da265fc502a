// src/kernel/mm/vpool.rs
//! Virtual address pools (spec §3, §4.2): one kernel-global pool starting
//! at `K_HEAP_START` (3 GiB + 1 MiB), and one per user process starting at
//! `USER_VADDR_START` (≈128 MiB) and ending just below the 3 GiB kernel
//! boundary.

use super::pool::Pool;
use super::types::PAGE_SIZE;
use spin::Mutex;

pub const K_HEAP_START: usize = 0xC000_0000 + 0x0010_0000;
pub const USER_VADDR_START: usize = 0x0800_0000;
pub const USER_VADDR_END: usize = 0xC000_0000;

/// Size of the kernel heap's virtual window. 64 MiB comfortably covers the
/// slab allocator's arena churn without approaching [`super::pool::Pool`]'s
/// tracked-unit cap.
const KERNEL_HEAP_PAGES: usize = (64 * 1024 * 1024) / PAGE_SIZE;

pub static KERNEL_VPOOL: Mutex<Pool> = Mutex::new(Pool::empty());

pub fn init_kernel_vpool() {
    KERNEL_VPOOL.lock().init(K_HEAP_START, KERNEL_HEAP_PAGES);
}

/// Construct a fresh virtual pool for a newly created user process, sized
/// to the whole user region so the same bitmap answers every future
/// `alloc_pages` call the process makes.
#[must_use]
pub fn new_user_vpool() -> Pool {
    let mut pool = Pool::empty();
    let pages = (USER_VADDR_END - USER_VADDR_START) / PAGE_SIZE;
    pool.init(USER_VADDR_START, pages);
    pool
}
