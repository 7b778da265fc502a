// src/kernel/sync/lock.rs
//! Reentrant lock built on a binary [`Semaphore`] (spec §4.3): recursive
//! acquire by the current holder just bumps a counter, avoiding self-deadlock.

use super::Semaphore;
use crate::kernel::task::pid::Pid;
use core::cell::UnsafeCell;

pub struct ReentrantLock {
    sema: Semaphore,
    holder: UnsafeCell<Option<Pid>>,
    recursion: UnsafeCell<u32>,
}

unsafe impl Sync for ReentrantLock {}

impl ReentrantLock {
    #[must_use]
    pub const fn new() -> Self {
        Self { sema: Semaphore::new(1), holder: UnsafeCell::new(None), recursion: UnsafeCell::new(0) }
    }

    pub fn acquire(&self) {
        let current = crate::kernel::task::scheduler::current_pid();
        let already_held = crate::arch::x86::cpu::critical_section(|| unsafe {
            if *self.holder.get() == Some(current) {
                *self.recursion.get() += 1;
                true
            } else {
                false
            }
        });
        if already_held {
            return;
        }
        self.sema.down();
        unsafe {
            *self.holder.get() = Some(current);
            *self.recursion.get() = 1;
        }
    }

    pub fn release(&self) {
        crate::arch::x86::cpu::critical_section(|| unsafe {
            let recursion = &mut *self.recursion.get();
            *recursion -= 1;
            if *recursion == 0 {
                *self.holder.get() = None;
                self.sema.up();
            }
        });
    }

    #[must_use]
    pub fn is_held_by_current(&self) -> bool {
        let current = crate::kernel::task::scheduler::current_pid();
        crate::arch::x86::cpu::critical_section(|| unsafe { *self.holder.get() == Some(current) })
    }
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}
