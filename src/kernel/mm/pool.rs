// src/kernel/mm/pool.rs
//! The bitmap-backed allocation pool shared by physical frame pools and
//! virtual address pools (spec §3, §4.2): "Each pool owns its bitmap; each
//! bitmap byte maps 32 KiB" (8 bits/byte × 4 KiB/frame).

use crate::kernel::bitmap::Bitmap;
use crate::kernel::mm::types::PAGE_SIZE;

/// Upper bound on units (frames or pages) a single pool can track: 128K
/// units × 4 KiB = 512 MiB, comfortably above anything QEMU's default
/// `-m` gives this kernel. The bitmap storage is a fixed-size array rather
/// than a heap allocation because pools are brought up before the slab
/// allocator exists (spec §9's bootstrap order: memory before anything
/// that could need to allocate).
const MAX_TRACKED_UNITS: usize = 128 * 1024;
const BITMAP_BYTES: usize = MAX_TRACKED_UNITS / 8;

/// A contiguous region of `unit_count` 4 KiB units starting at `base`,
/// each tracked by one bit: set means owned/mapped, clear means free.
#[derive(Clone)]
pub struct Pool {
    base: usize,
    unit_count: usize,
    bitmap_storage: [u8; BITMAP_BYTES],
}

impl Pool {
    #[must_use]
    pub const fn empty() -> Self {
        Self { base: 0, unit_count: 0, bitmap_storage: [0; BITMAP_BYTES] }
    }

    /// Bring the pool online over `[base, base + unit_count * PAGE_SIZE)`.
    pub fn init(&mut self, base: usize, unit_count: usize) {
        assert!(unit_count <= MAX_TRACKED_UNITS, "pool region exceeds tracked-unit capacity");
        self.base = base;
        self.unit_count = unit_count;
        self.bitmap().init();
    }

    fn bitmap(&mut self) -> Bitmap<'_> {
        Bitmap::new(&mut self.bitmap_storage, self.unit_count)
    }

    #[must_use]
    pub fn base(&self) -> usize {
        self.base
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.unit_count
    }

    /// Reserve `n` contiguous units, returning the base address of the run.
    pub fn alloc_contiguous(&mut self, n: usize) -> Option<usize> {
        let start = self.bitmap().scan_and_set(n)?;
        Some(self.base + start * PAGE_SIZE)
    }

    /// Reserve a specific address range (used by `alloc_pages_at`, spec
    /// §4.2). Fails if any unit in the range is already set.
    pub fn reserve_at(&mut self, addr: usize, n: usize) -> bool {
        let start = (addr - self.base) / PAGE_SIZE;
        for i in start..start + n {
            if self.bitmap().test(i) {
                return false;
            }
        }
        for i in start..start + n {
            self.bitmap().set(i, true);
        }
        true
    }

    pub fn free_contiguous(&mut self, addr: usize, n: usize) {
        let start = (addr - self.base) / PAGE_SIZE;
        for i in start..start + n {
            self.bitmap().set(i, false);
        }
    }

    #[must_use]
    pub fn is_owned(&mut self, addr: usize) -> bool {
        if addr < self.base {
            return false;
        }
        let index = (addr - self.base) / PAGE_SIZE;
        index < self.unit_count && self.bitmap().test(index)
    }
}
