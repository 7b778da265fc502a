//! Utilities for interacting with QEMU test infrastructure.

use crate::arch::x86::port::Port;
use crate::arch::{ArchCpu, Cpu};

/// Exit codes understood by QEMU's ISA debug exit device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// Signal that the test run completed successfully.
    Success = 0x10,
    /// Signal that at least one test failed.
    Failed = 0x11,
}

/// I/O port backing QEMU's `isa-debug-exit` device, as wired up by
/// `tools/run/qemu-runner.sh` (`iobase=0xf4,iosize=0x04`).
const DEBUG_EXIT_PORT: u16 = 0xF4;

/// Write the exit code to QEMU's debug exit port and halt the CPU.
#[inline]
pub fn exit_qemu(code: QemuExitCode) -> ! {
    let mut port: Port<u32> = Port::new(DEBUG_EXIT_PORT);
    // SAFETY: Port 0xF4 is the QEMU ISA debug exit configured by the runner
    // script; writing to it is safe in the kernel context and causes QEMU
    // to exit with the provided status.
    unsafe { port.write(code as u32) };

    loop {
        ArchCpu::halt();
    }
}
