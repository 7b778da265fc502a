// src/arch/x86/interrupts.rs
//! Exception handlers, hardware IRQ handlers, and syscall-gate wiring for
//! the 129-entry IDT (spec §4.9, §6).

use crate::arch::x86::gdt;
use crate::arch::x86::idt::{Idt, InterruptStackFrame, SYSCALL_VECTOR};
use crate::arch::x86::pic::PICS;
use crate::debug_println;
use lazy_static::lazy_static;

pub const TIMER_VECTOR: u8 = 0x20;
pub const KEYBOARD_VECTOR: u8 = 0x21;
pub const SPURIOUS_MASTER_VECTOR: u8 = 0x27;
pub const IDE_PRIMARY_VECTOR: u8 = 0x2E;
pub const IDE_SECONDARY_VECTOR: u8 = 0x2F;

const EXCEPTION_NAMES: [&str; 20] = [
    "divide error",
    "debug",
    "non-maskable interrupt",
    "breakpoint",
    "overflow",
    "bound range exceeded",
    "invalid opcode",
    "device not available",
    "double fault",
    "reserved (coprocessor segment overrun)",
    "invalid TSS",
    "segment not present",
    "stack-segment fault",
    "general protection fault",
    "page fault",
    "reserved",
    "x87 floating-point exception",
    "alignment check",
    "machine check",
    "SIMD floating-point exception",
];

lazy_static! {
    static ref IDT: Idt = {
        let mut idt = Idt::new();
        let code_sel = gdt::selectors().kernel_code.0;

        macro_rules! exception_handler {
            ($vector:expr, $name:ident) => {{
                extern "x86-interrupt" fn $name(frame: InterruptStackFrame) {
                    panic_on_exception($vector, &EXCEPTION_NAMES[$vector as usize], &frame, None);
                }
                idt.set_handler($vector, $name, code_sel, 0);
            }};
        }

        exception_handler!(0, handle_divide_error);
        exception_handler!(1, handle_debug);
        exception_handler!(2, handle_nmi);
        exception_handler!(3, handle_breakpoint);
        exception_handler!(4, handle_overflow);
        exception_handler!(5, handle_bound_range);
        exception_handler!(6, handle_invalid_opcode);
        exception_handler!(7, handle_device_not_available);

        extern "x86-interrupt" fn handle_double_fault(frame: InterruptStackFrame, error: u32) {
            panic_on_exception(8, EXCEPTION_NAMES[8], &frame, Some(error));
        }
        idt.set_handler_with_error(8, handle_double_fault, code_sel, 0);

        extern "x86-interrupt" fn handle_invalid_tss(frame: InterruptStackFrame, error: u32) {
            panic_on_exception(10, EXCEPTION_NAMES[10], &frame, Some(error));
        }
        idt.set_handler_with_error(10, handle_invalid_tss, code_sel, 0);

        extern "x86-interrupt" fn handle_segment_not_present(frame: InterruptStackFrame, error: u32) {
            panic_on_exception(11, EXCEPTION_NAMES[11], &frame, Some(error));
        }
        idt.set_handler_with_error(11, handle_segment_not_present, code_sel, 0);

        extern "x86-interrupt" fn handle_stack_fault(frame: InterruptStackFrame, error: u32) {
            panic_on_exception(12, EXCEPTION_NAMES[12], &frame, Some(error));
        }
        idt.set_handler_with_error(12, handle_stack_fault, code_sel, 0);

        extern "x86-interrupt" fn handle_general_protection(frame: InterruptStackFrame, error: u32) {
            panic_on_exception(13, EXCEPTION_NAMES[13], &frame, Some(error));
        }
        idt.set_handler_with_error(13, handle_general_protection, code_sel, 0);

        extern "x86-interrupt" fn handle_page_fault(frame: InterruptStackFrame, error: u32) {
            let faulting_addr = read_cr2();
            debug_println!("[PANIC] page fault at address {:#010x}, error code {:#x}", faulting_addr, error);
            panic_on_exception(14, EXCEPTION_NAMES[14], &frame, Some(error));
        }
        idt.set_handler_with_error(14, handle_page_fault, code_sel, 0);

        exception_handler!(16, handle_x87_fp);
        exception_handler!(17, handle_alignment_check);
        exception_handler!(18, handle_machine_check);
        exception_handler!(19, handle_simd_fp);

        extern "x86-interrupt" fn handle_timer(_frame: InterruptStackFrame) {
            crate::kernel::driver::pit::on_tick();
            crate::kernel::task::scheduler::on_timer_tick();
            unsafe { PICS.lock().notify_end_of_interrupt(TIMER_VECTOR) };
        }
        idt.set_handler(TIMER_VECTOR, handle_timer, code_sel, 0);

        extern "x86-interrupt" fn handle_keyboard(_frame: InterruptStackFrame) {
            crate::kernel::driver::keyboard::on_irq();
            unsafe { PICS.lock().notify_end_of_interrupt(KEYBOARD_VECTOR) };
        }
        idt.set_handler(KEYBOARD_VECTOR, handle_keyboard, code_sel, 0);

        extern "x86-interrupt" fn handle_spurious_master(_frame: InterruptStackFrame) {
            unsafe { PICS.lock().notify_end_of_interrupt(SPURIOUS_MASTER_VECTOR) };
        }
        idt.set_handler(SPURIOUS_MASTER_VECTOR, handle_spurious_master, code_sel, 0);

        extern "x86-interrupt" fn handle_ide_primary(_frame: InterruptStackFrame) {
            crate::kernel::block::ide::on_irq(0);
            unsafe { PICS.lock().notify_end_of_interrupt(IDE_PRIMARY_VECTOR) };
        }
        idt.set_handler(IDE_PRIMARY_VECTOR, handle_ide_primary, code_sel, 0);

        extern "x86-interrupt" fn handle_ide_secondary(_frame: InterruptStackFrame) {
            crate::kernel::block::ide::on_irq(1);
            unsafe { PICS.lock().notify_end_of_interrupt(IDE_SECONDARY_VECTOR) };
        }
        idt.set_handler(IDE_SECONDARY_VECTOR, handle_ide_secondary, code_sel, 0);

        idt.set_raw_handler(
            SYSCALL_VECTOR,
            crate::arch::x86::syscall::syscall_entry as u32,
            code_sel,
            3,
        );

        idt
    };
}

fn read_cr2() -> u32 {
    let value: u32;
    unsafe {
        core::arch::asm!("mov {0}, cr2", out(reg) value, options(nomem, nostack, preserves_flags));
    }
    value
}

/// Shared exception path: print file/line/function/condition-equivalent
/// diagnostics and halt, per spec §7 class 2 ("PANIC prints ... and halts").
fn panic_on_exception(vector: u8, name: &str, frame: &InterruptStackFrame, error_code: Option<u32>) {
    let eip = frame.eip;
    let cs = frame.cs;
    match error_code {
        Some(code) => debug_println!(
            "[EXCEPTION {:#04x}] {} (error code {:#x}) at eip={:#010x} cs={:#x}",
            vector, name, code, eip, cs
        ),
        None => debug_println!(
            "[EXCEPTION {:#04x}] {} at eip={:#010x} cs={:#x}",
            vector, name, eip, cs
        ),
    }
    halt_forever();
}

/// No task resumes after an unhandled exception: disable interrupts and
/// spin forever.
fn halt_forever() -> ! {
    use crate::arch::Cpu;
    crate::arch::x86::cpu::X86Cpu::disable_interrupts();
    loop {
        unsafe { core::arch::asm!("hlt", options(nomem, nostack)) };
    }
}

/// Install the IDT. Must run before [`crate::arch::x86::pic::ChainedPics::initialize`]
/// unmasks any IRQ line.
pub fn init_idt() {
    unsafe { IDT.load() };
}
