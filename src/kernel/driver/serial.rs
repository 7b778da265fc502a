// src/kernel/driver/serial.rs
//! UART 16550 driver for COM1, used for `debug_print!`/`debug_println!`
//! and available from the earliest boot phase.

use crate::arch::x86::port::{Port, PortReadOnly};
use crate::errors::{Result, SerialError};
use crate::kernel::core::{CharDevice, Device};
use core::fmt;
use spin::Mutex;

pub struct SerialPort {
    data: Port<u8>,
    int_enable: Port<u8>,
    fifo_ctrl: Port<u8>,
    line_ctrl: Port<u8>,
    modem_ctrl: Port<u8>,
    line_status: PortReadOnly<u8>,
}

impl SerialPort {
    #[must_use]
    pub const fn com1() -> Self {
        Self {
            data: Port::new(0x3F8),
            int_enable: Port::new(0x3F8 + 1),
            fifo_ctrl: Port::new(0x3F8 + 2),
            line_ctrl: Port::new(0x3F8 + 3),
            modem_ctrl: Port::new(0x3F8 + 4),
            line_status: PortReadOnly::new(0x3F8 + 5),
        }
    }

    fn is_tx_empty(&self) -> bool {
        unsafe { self.line_status.read() & 0x20 != 0 }
    }
}

impl Device for SerialPort {
    fn name(&self) -> &str {
        "COM1"
    }

    fn init(&mut self) -> Result<()> {
        unsafe {
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x80);
            self.data.write(0x03);
            self.int_enable.write(0x00);
            self.line_ctrl.write(0x03);
            self.fifo_ctrl.write(0xC7);
            self.modem_ctrl.write(0x0B);
        }
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        self.init()
    }
}

impl CharDevice for SerialPort {
    fn read_byte(&self) -> Result<Option<u8>> {
        unsafe {
            if self.line_status.read() & 0x01 != 0 {
                Ok(Some(self.data.read()))
            } else {
                Ok(None)
            }
        }
    }

    fn write_byte(&mut self, byte: u8) -> Result<()> {
        const SPIN_BUDGET: usize = 100_000;
        for _ in 0..SPIN_BUDGET {
            if self.is_tx_empty() {
                unsafe { self.data.write(byte) };
                return Ok(());
            }
            core::hint::spin_loop();
        }
        Err(SerialError::Timeout.into())
    }
}

impl fmt::Write for SerialPort {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}

pub static SERIAL1: Mutex<SerialPort> = Mutex::new(SerialPort::com1());

pub fn init() {
    SERIAL1.lock().init().expect("COM1 init cannot fail");
}
