// src/kernel/driver/mod.rs
//! Device drivers. Boot order (spec): console and keyboard come up after
//! the timer and before the TSS/syscalls/IDE are wired in — see
//! `crate::main` for the full sequence.

pub mod console;
pub mod keyboard;
pub mod pit;
pub mod serial;
pub mod vga;

pub use console::{init_console, write_console, write_debug};
