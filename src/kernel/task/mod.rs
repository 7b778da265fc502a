// src/kernel/task/mod.rs
//! Tasks and the scheduler (spec §3, §4.4, §4.5).

pub mod pid;
pub mod scheduler;
pub mod tcb;

pub use pid::{Pid, INIT_PID};
pub use tcb::{Descriptor, TaskStatus, Tcb};
