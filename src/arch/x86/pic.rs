// src/arch/x86/pic.rs
//! 8259A PIC programming (spec §4.9, §6): cascade through IR2, vector base
//! 0x20/0x28, post-init masks `0xF8`/`0xBF` (timer + keyboard + cascade,
//! IRQ14 for the IDE primary channel).

use crate::arch::x86::port::{Port, PortWriteOnly};
use spin::Mutex;

const ICW1_INIT: u8 = 0x11;
const ICW4_8086: u8 = 0x01;
const PIC_EOI: u8 = 0x20;

/// Mask applied to the master PIC immediately after remapping: IRQ0 (timer),
/// IRQ1 (keyboard), and IRQ2 (cascade to slave) unmasked, everything else off.
pub const MASTER_MASK_AFTER_INIT: u8 = 0xF8;
/// Mask applied to the slave PIC: IRQ14 (IDE primary) unmasked.
pub const SLAVE_MASK_AFTER_INIT: u8 = 0xBF;

struct Pic {
    offset: u8,
    command: Port<u8>,
    data: Port<u8>,
}

impl Pic {
    const fn new(command_port: u16, data_port: u16, offset: u8) -> Self {
        Self { offset, command: Port::new(command_port), data: Port::new(data_port) }
    }

    fn handles(&self, interrupt_id: u8) -> bool {
        self.offset <= interrupt_id && interrupt_id < self.offset + 8
    }

    unsafe fn end_of_interrupt(&mut self) {
        unsafe { self.command.write(PIC_EOI) };
    }
}

/// Master + slave 8259A pair, cascaded through IRQ2.
pub struct ChainedPics {
    pics: [Pic; 2],
}

impl ChainedPics {
    /// # Safety
    /// `offset1`/`offset2` must not overlap any CPU exception vector (0..32).
    pub const unsafe fn new(offset1: u8, offset2: u8) -> Self {
        Self {
            pics: [
                Pic::new(0x20, 0x21, offset1),
                Pic::new(0xA0, 0xA1, offset2),
            ],
        }
    }

    /// # Safety
    /// Must run once during boot, before interrupts are enabled.
    pub unsafe fn initialize(&mut self) {
        unsafe {
            let mut wait_port: PortWriteOnly<u8> = PortWriteOnly::new(0x80);
            let io_wait = || wait_port.write(0);

            let saved_mask1 = self.pics[0].data.read();
            let saved_mask2 = self.pics[1].data.read();

            self.pics[0].command.write(ICW1_INIT);
            io_wait();
            self.pics[1].command.write(ICW1_INIT);
            io_wait();

            self.pics[0].data.write(self.pics[0].offset);
            io_wait();
            self.pics[1].data.write(self.pics[1].offset);
            io_wait();

            self.pics[0].data.write(4); // slave attached on IR2
            io_wait();
            self.pics[1].data.write(2); // cascade identity
            io_wait();

            self.pics[0].data.write(ICW4_8086);
            io_wait();
            self.pics[1].data.write(ICW4_8086);
            io_wait();

            let _ = (saved_mask1, saved_mask2);
            self.pics[0].data.write(MASTER_MASK_AFTER_INIT);
            self.pics[1].data.write(SLAVE_MASK_AFTER_INIT);
        }
    }

    fn handles_interrupt(&self, interrupt_id: u8) -> bool {
        self.pics.iter().any(|p| p.handles(interrupt_id))
    }

    /// Send end-of-interrupt to whichever PIC(s) own `interrupt_id`.
    ///
    /// # Safety
    /// Must be called exactly once per serviced IRQ, after the handler body.
    pub unsafe fn notify_end_of_interrupt(&mut self, interrupt_id: u8) {
        if self.handles_interrupt(interrupt_id) {
            unsafe {
                if self.pics[1].handles(interrupt_id) {
                    self.pics[1].end_of_interrupt();
                }
                self.pics[0].end_of_interrupt();
            }
        }
    }
}

pub const PIC_1_OFFSET: u8 = 0x20;
pub const PIC_2_OFFSET: u8 = 0x28;

pub static PICS: Mutex<ChainedPics> =
    Mutex::new(unsafe { ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });
