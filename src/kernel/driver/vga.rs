// src/kernel/driver/vga.rs
//! VGA text-mode console. The glyph renderer is the VGA hardware's job
//! (spec: an external collaborator); this driver only positions the
//! cursor and pokes ASCII+attribute cells into the memory-mapped buffer
//! at `0xB8000`.

use crate::errors::{Result, VgaError};
use crate::kernel::core::{CharDevice, Device};
use core::fmt;
use spin::{Mutex, Once};

const VGA_BUFFER_ADDR: usize = 0xB8000;
const VGA_WIDTH: usize = 80;
const VGA_HEIGHT: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct VgaColor(u8);

impl VgaColor {
    pub const DEFAULT: Self = Self(0x0F);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
struct VgaChar {
    ascii: u8,
    color: VgaColor,
}

impl VgaChar {
    const fn blank(color: VgaColor) -> Self {
        Self { ascii: b' ', color }
    }
}

#[repr(transparent)]
struct Buffer {
    chars: [[VgaChar; VGA_WIDTH]; VGA_HEIGHT],
}

pub struct VgaTextMode {
    col: usize,
    row: usize,
    color: VgaColor,
    buffer: &'static mut Buffer,
}

impl VgaTextMode {
    /// # Safety
    /// Must run once during boot, after paging identity-maps (or otherwise
    /// makes accessible) the VGA buffer physical page.
    #[must_use]
    unsafe fn new() -> Self {
        Self {
            col: 0,
            row: 0,
            color: VgaColor::DEFAULT,
            buffer: unsafe { &mut *(VGA_BUFFER_ADDR as *mut Buffer) },
        }
    }

    pub fn clear_screen(&mut self) {
        let blank = VgaChar::blank(self.color);
        for row in &mut self.buffer.chars {
            row.fill(blank);
        }
        self.col = 0;
        self.row = 0;
    }

    fn newline(&mut self) {
        if self.row + 1 < VGA_HEIGHT {
            self.row += 1;
        } else {
            for row in 1..VGA_HEIGHT {
                self.buffer.chars[row - 1] = self.buffer.chars[row];
            }
            self.buffer.chars[VGA_HEIGHT - 1].fill(VgaChar::blank(self.color));
        }
        self.col = 0;
    }
}

impl Device for VgaTextMode {
    fn name(&self) -> &str {
        "VGA text mode"
    }

    fn init(&mut self) -> Result<()> {
        self.clear_screen();
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.init()
    }
}

impl CharDevice for VgaTextMode {
    fn read_byte(&self) -> Result<Option<u8>> {
        Err(VgaError::NotInitialized.into())
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        match byte {
            b'\n' => self.newline(),
            byte => {
                self.buffer.chars[self.row][self.col] = VgaChar { ascii: byte, color: self.color };
                if self.col + 1 < VGA_WIDTH {
                    self.col += 1;
                } else {
                    self.newline();
                }
            }
        }
        Ok(())
    }
}

impl fmt::Write for VgaTextMode {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

pub static VGA: Once<Mutex<VgaTextMode>> = Once::new();

/// # Safety
/// See [`VgaTextMode::new`].
pub unsafe fn init_vga() {
    VGA.call_once(|| {
        let mut vga = unsafe { VgaTextMode::new() };
        vga.init().expect("VGA init cannot fail");
        Mutex::new(vga)
    });
}
