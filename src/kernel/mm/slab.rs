// src/kernel/mm/slab.rs
//! A fixed-size-class slab allocator (spec §4.2): seven classes, 16 B to
//! 1024 B, served from one-page arenas, plus a large-object path that goes
//! straight to `alloc_pages` for anything bigger than the largest class.
//! Parameterized over which physical/virtual pool pair backs it, so the
//! same engine drives both the kernel's `#[global_allocator]` and each
//! process's `malloc`/`free` syscalls (spec §4.9).
//!
//! Each arena is a single 4 KiB page: an [`ArenaHeader`] at the front
//! followed by as many same-size blocks as fit. A freed block is recovered
//! from a bare pointer by masking it down to its enclosing page — the
//! header is always at that address because arenas are always page-sized
//! and page-aligned (spec §9: "a block's enclosing arena is recoverable by
//! masking the block's address to its frame boundary").

use super::types::PAGE_SIZE;
use super::{Pool, VirtAddr};
use core::alloc::{GlobalAlloc, Layout};
use core::mem::size_of;
use core::ptr;
use spin::Mutex;

pub const SIZE_CLASSES: [usize; 7] = [16, 32, 64, 128, 256, 512, 1024];
pub const LARGEST_CLASS: usize = 1024;

#[repr(C)]
struct ArenaHeader {
    class_size: usize,
    remaining: usize,
    frame_count: usize,
}

const HEADER_SIZE: usize = size_of::<ArenaHeader>();

/// Intrusive free list: each free block's first 4 bytes hold the address
/// of the next free block (0 for end of list), written directly into the
/// freed memory rather than a side structure.
pub struct FreeLists {
    heads: [usize; SIZE_CLASSES.len()],
}

impl FreeLists {
    #[must_use]
    pub const fn new() -> Self {
        Self { heads: [0; SIZE_CLASSES.len()] }
    }
}

impl Default for FreeLists {
    fn default() -> Self {
        Self::new()
    }
}

fn class_index(size: usize) -> Option<usize> {
    SIZE_CLASSES.iter().position(|&c| c >= size)
}

fn blocks_per_arena(class_size: usize) -> usize {
    (PAGE_SIZE - HEADER_SIZE) / class_size
}

/// Carve a fresh one-page arena for `class_size` and push every block onto
/// the class's free list (spec §4.2: "If the free list of that class is
/// empty, allocate one page ... push all blocks onto the free list").
fn refill(
    phys_pool: &Mutex<Pool>,
    virt_pool: &Mutex<Pool>,
    lists: &mut FreeLists,
    idx: usize,
) -> Option<()> {
    let class_size = SIZE_CLASSES[idx];
    let vaddr = super::alloc_pages(phys_pool, virt_pool, 1, false, true).ok()?;
    let base = vaddr.as_usize();

    unsafe {
        let header = base as *mut ArenaHeader;
        header.write(ArenaHeader { class_size, remaining: blocks_per_arena(class_size), frame_count: 1 });
    }

    let count = blocks_per_arena(class_size);
    let mut addr = base + HEADER_SIZE;
    for _ in 0..count {
        unsafe {
            (addr as *mut usize).write(lists.heads[idx]);
        }
        lists.heads[idx] = addr;
        addr += class_size;
    }
    Some(())
}

fn alloc_small(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, lists: &Mutex<FreeLists>, idx: usize) -> *mut u8 {
    let mut lists = lists.lock();
    if lists.heads[idx] == 0 && refill(phys_pool, virt_pool, &mut lists, idx).is_none() {
        return ptr::null_mut();
    }
    let block = lists.heads[idx];
    lists.heads[idx] = unsafe { *(block as *const usize) };

    let header = (block & !(PAGE_SIZE - 1)) as *mut ArenaHeader;
    unsafe {
        (*header).remaining -= 1;
    }
    block as *mut u8
}

fn free_small(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, lists: &Mutex<FreeLists>, ptr: *mut u8) {
    let addr = ptr as usize;
    let page_base = addr & !(PAGE_SIZE - 1);
    let header = page_base as *mut ArenaHeader;
    let class_size = unsafe { (*header).class_size };
    let idx = SIZE_CLASSES.iter().position(|&c| c == class_size).expect("corrupt slab header");

    let mut lists = lists.lock();
    unsafe {
        (addr as *mut usize).write(lists.heads[idx]);
        (*header).remaining += 1;
    }
    lists.heads[idx] = addr;

    let arena_full_free = unsafe { (*header).remaining } == blocks_per_arena(class_size);
    if arena_full_free {
        reclaim_arena(phys_pool, virt_pool, &mut lists, idx, page_base);
    }
}

/// Walk the class free list, dropping every block that belongs to
/// `page_base`, then return the page to its owning pool.
fn reclaim_arena(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, lists: &mut FreeLists, idx: usize, page_base: usize) {
    let mut remaining_head = 0usize;
    let mut cursor = lists.heads[idx];
    while cursor != 0 {
        let next = unsafe { *(cursor as *const usize) };
        if cursor & !(PAGE_SIZE - 1) != page_base {
            unsafe {
                (cursor as *mut usize).write(remaining_head);
            }
            remaining_head = cursor;
        }
        cursor = next;
    }
    lists.heads[idx] = remaining_head;

    super::free_pages(phys_pool, virt_pool, VirtAddr::new(page_base), 1);
}

fn alloc_large(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, size: usize) -> *mut u8 {
    let pages = (size + HEADER_SIZE).div_ceil(PAGE_SIZE);
    let vaddr = match super::alloc_pages(phys_pool, virt_pool, pages, false, true) {
        Ok(v) => v,
        Err(_) => return ptr::null_mut(),
    };
    let base = vaddr.as_usize();
    unsafe {
        let header = base as *mut ArenaHeader;
        header.write(ArenaHeader { class_size: 0, remaining: 0, frame_count: pages });
    }
    (base + HEADER_SIZE) as *mut u8
}

fn free_large(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, ptr: *mut u8) {
    let page_base = (ptr as usize) & !(PAGE_SIZE - 1);
    let header = page_base as *mut ArenaHeader;
    let pages = unsafe { (*header).frame_count };
    super::free_pages(phys_pool, virt_pool, VirtAddr::new(page_base), pages);
}

/// Allocate `layout` from the slab rooted at `lists`, drawing fresh arenas
/// from `phys_pool`/`virt_pool` as needed.
pub fn alloc(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, lists: &Mutex<FreeLists>, layout: Layout) -> *mut u8 {
    let size = layout.size().max(layout.align()).max(1);
    if size > LARGEST_CLASS {
        alloc_large(phys_pool, virt_pool, size)
    } else {
        let idx = class_index(size).expect("size within class range");
        alloc_small(phys_pool, virt_pool, lists, idx)
    }
}

/// Free a pointer previously returned by [`alloc`] with the same `layout`
/// and pool pair.
pub fn dealloc(phys_pool: &Mutex<Pool>, virt_pool: &Mutex<Pool>, lists: &Mutex<FreeLists>, ptr: *mut u8, layout: Layout) {
    let size = layout.size().max(layout.align()).max(1);
    if size > LARGEST_CLASS {
        free_large(phys_pool, virt_pool, ptr);
    } else {
        free_small(phys_pool, virt_pool, lists, ptr);
    }
}

/// `#[global_allocator]`-compatible wrapper over the kernel pool pair,
/// mirroring the teacher's locked-allocator-behind-`GlobalAlloc` shape
/// while swapping the underlying algorithm for the fixed-size-class slab
/// above.
pub struct LockedHeap(Mutex<FreeLists>);

impl LockedHeap {
    #[must_use]
    pub const fn new() -> Self {
        Self(Mutex::new(FreeLists::new()))
    }
}

impl Default for LockedHeap {
    fn default() -> Self {
        Self::new()
    }
}

unsafe impl GlobalAlloc for LockedHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        alloc(&super::frame::KERNEL_POOL, &super::vpool::KERNEL_VPOOL, &self.0, layout)
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        dealloc(&super::frame::KERNEL_POOL, &super::vpool::KERNEL_VPOOL, &self.0, ptr, layout);
    }
}
