// src/kernel/task/pid.rs
//! The 1024-bit PID bitmap (spec §3: "A bitmap of 1024 bits, atomic-under-
//! lock; PID 1 is reserved for the first user process (`init`)").

use crate::errors::{KernelError, TaskError};
use crate::kernel::bitmap::Bitmap;
use spin::Mutex;

pub const MAX_PID: usize = 1024;

/// PID 0 is permanently reserved by [`PidPool::ensure_init`], so the first
/// real allocation — `init_task` during boot — always lands on 1 (spec §3:
/// "PID 1 is reserved for the first user process").
pub const INIT_PID: Pid = Pid(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pid(u32);

impl Pid {
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0 as i32
    }
}

pub struct PidPool {
    storage: [u8; MAX_PID / 8],
    initialized: bool,
}

impl PidPool {
    const fn new() -> Self {
        Self { storage: [0; MAX_PID / 8], initialized: false }
    }

    fn bitmap(&mut self) -> Bitmap<'_> {
        Bitmap::new(&mut self.storage, MAX_PID)
    }

    /// Mark PID 0 permanently taken so the first real allocation — always
    /// made for `init_task` during boot — lands on PID 1, satisfying the
    /// "PID 1 is reserved for init" invariant without a special case.
    fn ensure_init(&mut self) {
        if !self.initialized {
            self.bitmap().init();
            self.bitmap().set(0, true);
            self.initialized = true;
        }
    }

    pub fn alloc(&mut self) -> Result<Pid, KernelError> {
        self.ensure_init();
        let index = self.bitmap().scan_and_set(1).ok_or(KernelError::Task(TaskError::PidExhausted))?;
        Ok(Pid(index as u32))
    }

    pub fn free(&mut self, pid: Pid) {
        self.bitmap().set(pid.as_u32() as usize, false);
    }
}

pub static PID_POOL: Mutex<PidPool> = Mutex::new(PidPool::new());
