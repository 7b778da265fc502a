// src/errors/mod.rs

//! Unified error handling module
//!
//! This module provides a consistent error handling approach across
//! all kernel subsystems.
//!
//! # Usage
//!
//! Use the unified error types:
//!
//! ```no_run
//! use minios::errors::{KernelError, Result};
//!
//! fn my_function() -> Result<()> {
//!     // Your code here
//!     Ok(())
//! }
//! ```

pub mod unified;

pub use unified::{
    DiskError, ErrorContext, FsError, InitError, KernelError, MemError, PageTableError, Result,
    SerialError, SyscallError, TaskError, VgaError,
};
