// src/kernel/sync/semaphore.rs
//! Binary (really: counting) semaphore with a FIFO waiter list (spec §4.3).
//! Single-CPU cooperative scheduling means interrupt-disable is the whole
//! critical section; there is no separate spinlock to take.

use crate::kernel::list::List;
use crate::kernel::task::tcb::TaskStatus;
use core::cell::UnsafeCell;

pub struct Semaphore {
    value: UnsafeCell<isize>,
    waiters: UnsafeCell<List>,
}

// Safety: every access to `value`/`waiters` happens inside
// `critical_section`, which disables interrupts for its duration; on a
// single CPU with cooperative-only preemption that rules out concurrent
// access.
unsafe impl Sync for Semaphore {}

impl Semaphore {
    #[must_use]
    pub const fn new(initial: isize) -> Self {
        Self { value: UnsafeCell::new(initial), waiters: UnsafeCell::new(List::new()) }
    }

    /// Decrement if positive; otherwise enqueue the current task and block
    /// it, looping back to recheck the value once rescheduled (spec §4.3).
    pub fn down(&self) {
        loop {
            let acquired = crate::arch::x86::cpu::critical_section(|| unsafe {
                let value = &mut *self.value.get();
                if *value > 0 {
                    *value -= 1;
                    true
                } else {
                    let waiters = &mut *self.waiters.get();
                    crate::kernel::task::scheduler::block_on(waiters, TaskStatus::Blocked);
                    false
                }
            });
            if acquired {
                return;
            }
        }
    }

    /// Increment, then wake the head waiter if one is present (spec §4.3:
    /// "up dequeues head waiter ... and returns it to READY").
    pub fn up(&self) {
        crate::arch::x86::cpu::critical_section(|| unsafe {
            let value = &mut *self.value.get();
            *value += 1;
            let waiters = &mut *self.waiters.get();
            crate::kernel::task::scheduler::wake_one(waiters);
        });
    }

    #[must_use]
    pub fn value(&self) -> isize {
        crate::arch::x86::cpu::critical_section(|| unsafe { *self.value.get() })
    }
}
