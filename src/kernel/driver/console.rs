// src/kernel/driver/console.rs
//! Console abstraction: the `print!`/`console_print!` macros in `lib.rs`
//! go through this layer so they don't need to know which screen driver
//! backs them. This build only ever has VGA text mode to pick from.

use core::fmt;
use spin::{Mutex, Once};

pub static CONSOLE: Once<Mutex<ConsoleAdapter>> = Once::new();

pub enum ConsoleAdapter {
    Vga,
    Uninitialized,
}

impl fmt::Write for ConsoleAdapter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        match self {
            ConsoleAdapter::Vga => {
                if let Some(vga) = crate::kernel::driver::vga::VGA.get() {
                    vga.lock().write_str(s)
                } else {
                    Err(fmt::Error)
                }
            }
            ConsoleAdapter::Uninitialized => Err(fmt::Error),
        }
    }
}

/// Call once during boot, after [`crate::kernel::driver::vga::init_vga`].
pub fn init_console() {
    CONSOLE.call_once(|| {
        if crate::kernel::driver::vga::VGA.get().is_some() {
            Mutex::new(ConsoleAdapter::Vga)
        } else {
            Mutex::new(ConsoleAdapter::Uninitialized)
        }
    });
}

/// Backs `console_print!`. Silently drops output if the console isn't up
/// yet, matching the standard `print!` contract.
pub fn write_console(args: fmt::Arguments) {
    use fmt::Write;
    if let Some(console) = CONSOLE.get() {
        let _ = console.lock().write_fmt(args);
    }
}

/// Backs `debug_print!`. Writes straight to the serial port, bypassing
/// the console abstraction — usable from the earliest boot phase.
pub fn write_debug(args: fmt::Arguments) {
    use crate::kernel::driver::serial::SERIAL1;
    use fmt::Write;
    let _ = SERIAL1.lock().write_fmt(args);
}
