// src/arch/mod.rs

//! Architecture-specific abstractions. The kernel targets 32-bit x86
//! exclusively (spec §1); there is no other backend to select between.

pub mod x86;

pub use self::x86::cpu::X86Cpu;

/// Architecture-specific CPU implementation.
pub type ArchCpu = X86Cpu;

/// Trait for CPU-specific operations.
pub trait Cpu {
    /// Halt the CPU until the next interrupt.
    fn halt();

    /// Disable interrupts.
    fn disable_interrupts();

    /// Enable interrupts.
    fn enable_interrupts();

    /// Check if interrupts are enabled.
    fn are_interrupts_enabled() -> bool;
}

/// Read the hardware timestamp counter (`rdtsc`).
///
/// Returns a monotonically increasing tick count. The frequency is tied to
/// the CPU's clock rate, not the PIT's 100 Hz tick.
pub fn read_timestamp() -> u64 {
    x86::cpu::read_timestamp()
}

/// Bring up segmentation, interrupts, and the PIC. Must run once, early in
/// `kernel_main`, before any code enables interrupts (spec §6).
///
/// # Safety
/// Must be called exactly once, before interrupts are enabled and before
/// any other `arch::x86` subsystem (paging, scheduler) assumes the GDT/IDT
/// are live.
pub unsafe fn init() {
    unsafe {
        x86::gdt::init();
        x86::interrupts::init_idt();
        x86::pic::PICS.lock().initialize();
    }
}
