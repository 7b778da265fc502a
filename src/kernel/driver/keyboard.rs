// src/kernel/driver/keyboard.rs
//! PS/2 keyboard driver. The scancode table is an external collaborator
//! (spec) — decoding goes through the `pc-keyboard` crate rather than a
//! hand-rolled table. The IRQ handler decodes each keystroke and pushes
//! it into a fixed-size ring buffer; `read(stdin)` drains that ring,
//! blocking on a semaphore the IRQ handler signals (spec: "a keyboard IRQ
//! feeds a ring buffer that `read(stdin)` consumes").

use crate::arch::x86::port::PortReadOnly;
use crate::kernel::sync::Semaphore;
use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::{Mutex, Once};

const RING_CAPACITY: usize = 256;

struct Ring {
    buf: [u8; RING_CAPACITY],
    head: usize,
    tail: usize,
    len: usize,
}

impl Ring {
    const fn new() -> Self {
        Self { buf: [0; RING_CAPACITY], head: 0, tail: 0, len: 0 }
    }

    fn push(&mut self, byte: u8) {
        if self.len == RING_CAPACITY {
            return;
        }
        self.buf[self.tail] = byte;
        self.tail = (self.tail + 1) % RING_CAPACITY;
        self.len += 1;
    }

    fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % RING_CAPACITY;
        self.len -= 1;
        Some(byte)
    }
}

struct KeyboardState {
    data: PortReadOnly<u8>,
    status: PortReadOnly<u8>,
    decoder: Keyboard<layouts::Us104Key, ScancodeSet1>,
    ring: Ring,
}

impl KeyboardState {
    fn new() -> Self {
        Self {
            data: PortReadOnly::new(0x60),
            status: PortReadOnly::new(0x64),
            decoder: Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore),
            ring: Ring::new(),
        }
    }
}

static KEYBOARD: Once<Mutex<KeyboardState>> = Once::new();
/// Counts bytes waiting in the ring; `read(stdin)` downs it to block.
static AVAILABLE: Semaphore = Semaphore::new(0);

pub fn init() {
    KEYBOARD.call_once(|| Mutex::new(KeyboardState::new()));
}

/// Called from the keyboard IRQ handler ([`crate::arch::x86::interrupts`]
/// at vector 0x21).
pub fn on_irq() {
    let Some(keyboard) = KEYBOARD.get() else { return };
    let mut state = keyboard.lock();
    if unsafe { state.status.read() } & 0x01 == 0 {
        return;
    }
    let scancode = unsafe { state.data.read() };

    let Ok(Some(event)) = state.decoder.add_byte(scancode) else { return };
    let Some(DecodedKey::Unicode(character)) = state.decoder.process_keyevent(event) else { return };

    let mut utf8_buf = [0u8; 4];
    let bytes = character.encode_utf8(&mut utf8_buf).len();
    for &byte in &utf8_buf[..bytes] {
        state.ring.push(byte);
    }
    drop(state);
    AVAILABLE.up();
}

/// Block until a byte is available, then return it (spec's `read(stdin)`
/// consuming the ring buffer).
#[must_use]
pub fn read_byte_blocking() -> u8 {
    AVAILABLE.down();
    KEYBOARD.get().expect("keyboard not initialized").lock().ring.pop().expect("AVAILABLE count exceeded ring contents")
}
