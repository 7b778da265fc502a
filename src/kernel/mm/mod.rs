// src/kernel/mm/mod.rs
//! Memory management (spec §3, §4.2): physical frame pools, virtual
//! address pools, a two-level page table manager, and a slab allocator
//! sitting behind `#[global_allocator]`.

pub mod frame;
pub mod paging;
pub mod pool;
pub mod slab;
pub mod types;
pub mod vpool;

pub use pool::Pool;
pub use slab::{FreeLists, LockedHeap};
pub use types::{LayoutSize, PhysAddr, VirtAddr, PAGE_SIZE};

use crate::errors::KernelError;
use spin::Mutex;

/// Reserve `n` virtual pages from `virt_pool` and back each with a freshly
/// allocated frame from `phys_pool` (spec §4.2's `alloc_pages` contract).
/// On any intermediate failure, every frame and virtual page already
/// reserved by this call is released before returning the error.
pub fn alloc_pages(
    phys_pool: &Mutex<Pool>,
    virt_pool: &Mutex<Pool>,
    n: usize,
    user: bool,
    writable: bool,
) -> Result<VirtAddr, KernelError> {
    let base = virt_pool
        .lock()
        .alloc_contiguous(n)
        .ok_or(KernelError::Mem(crate::errors::MemError::OutOfVirtualSpace))?;
    match back_with_frames(phys_pool, base, n, user, writable) {
        Ok(()) => Ok(VirtAddr::new(base)),
        Err(e) => {
            virt_pool.lock().free_contiguous(base, n);
            Err(e)
        }
    }
}

/// Same contract as [`alloc_pages`], but the virtual range is caller-chosen
/// (used to map a process's ELF segments at their link-time addresses).
pub fn alloc_pages_at(
    phys_pool: &Mutex<Pool>,
    virt_pool: &Mutex<Pool>,
    vaddr: VirtAddr,
    n: usize,
    user: bool,
    writable: bool,
) -> Result<(), KernelError> {
    let base = vaddr.as_usize();
    if !virt_pool.lock().reserve_at(base, n) {
        return Err(KernelError::Mem(crate::errors::MemError::OutOfVirtualSpace));
    }
    if let Err(e) = back_with_frames(phys_pool, base, n, user, writable) {
        virt_pool.lock().free_contiguous(base, n);
        return Err(e);
    }
    Ok(())
}

fn back_with_frames(
    phys_pool: &Mutex<Pool>,
    base: usize,
    n: usize,
    user: bool,
    writable: bool,
) -> Result<(), KernelError> {
    for i in 0..n {
        let page = VirtAddr::new(base + i * PAGE_SIZE);
        let frame = match frame::alloc_frames(phys_pool, 1) {
            Ok(f) => f,
            Err(e) => {
                unwind_mapped(phys_pool, base, i);
                return Err(e);
            }
        };
        if let Err(e) = paging::map_page(page, PhysAddr::new(frame), user, writable) {
            frame::free_frames(phys_pool, frame, 1);
            unwind_mapped(phys_pool, base, i);
            return Err(e);
        }
    }
    Ok(())
}

fn unwind_mapped(phys_pool: &Mutex<Pool>, base: usize, mapped: usize) {
    for j in 0..mapped {
        let page = VirtAddr::new(base + j * PAGE_SIZE);
        if let Some(f) = paging::unmap_page(page) {
            frame::free_frames(phys_pool, f.as_usize(), 1);
        }
    }
}

/// Release `n` pages previously obtained from [`alloc_pages`] or
/// [`alloc_pages_at`].
pub fn free_pages(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, vaddr: VirtAddr, n: usize) {
    unwind_mapped(phys_pool, vaddr.as_usize(), n);
    virt_pool.lock().free_contiguous(vaddr.as_usize(), n);
}

/// Map `phys` into a scratch kernel virtual page for the duration of `f`,
/// then tear the mapping down. Used to reach a physical frame that is not
/// necessarily part of the currently active address space — a child
/// process's not-yet-activated page directory during `fork`, for instance.
pub fn with_temp_mapping<R>(phys: PhysAddr, writable: bool, f: impl FnOnce(*mut u8) -> R) -> Result<R, KernelError> {
    let vaddr = vpool::KERNEL_VPOOL
        .lock()
        .alloc_contiguous(1)
        .ok_or(KernelError::Mem(crate::errors::MemError::OutOfVirtualSpace))?;
    paging::map_page(VirtAddr::new(vaddr), phys, false, writable)?;
    let result = f(vaddr as *mut u8);
    paging::unmap_page(VirtAddr::new(vaddr));
    paging::invalidate(VirtAddr::new(vaddr));
    vpool::KERNEL_VPOOL.lock().free_contiguous(vaddr, 1);
    Ok(result)
}

/// Bring up physical pools, the kernel virtual pool, and the slab heap, in
/// that order (spec §9's bootstrap ordering: memory before anything that
/// could need to allocate).
pub fn init(total_memory_bytes: usize) {
    frame::init_pools(total_memory_bytes);
    vpool::init_kernel_vpool();
}
