// src/kernel/driver/pit.rs
//! 8253 PIT programming. Spec treats the constants for this chip as an
//! external collaborator; the plumbing around it — arming the timer IRQ
//! and exposing the monotonic tick counter every busy-wait in this kernel
//! (`milli_sleep`, the IDE driver's disk timeout) polls — is ours.

use crate::arch::x86::port::{Port, PortWriteOnly};
use core::sync::atomic::{AtomicU64, Ordering};

const PIT_FREQUENCY: u32 = 1_193_182;
const CHANNEL0_DATA: u16 = 0x40;
const COMMAND_PORT: u16 = 0x43;

/// The scheduler's quantum and every `milli_sleep` caller assume a 10 ms
/// tick (spec §4.4's round-robin quantum is expressed in ticks of this
/// period).
pub const TIMER_HZ: u32 = 100;

static TICKS: AtomicU64 = AtomicU64::new(0);

/// Program channel 0 for square-wave mode at [`TIMER_HZ`].
///
/// # Safety
/// Must run once during boot, before the timer IRQ is unmasked.
pub unsafe fn init() {
    let divisor = (PIT_FREQUENCY / TIMER_HZ).min(0xFFFF);
    let mut command: PortWriteOnly<u8> = PortWriteOnly::new(COMMAND_PORT);
    let mut channel0: Port<u8> = Port::new(CHANNEL0_DATA);
    unsafe {
        command.write(0x36);
        channel0.write((divisor & 0xFF) as u8);
        channel0.write((divisor >> 8) as u8);
    }
}

/// Called from the timer IRQ handler once per tick.
pub fn on_tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
}

#[must_use]
pub fn ticks() -> u64 {
    TICKS.load(Ordering::Relaxed)
}

/// Busy-wait for at least `ms` milliseconds (spec's `milli_sleep`
/// suspension point), rounding up to the nearest tick. Spins rather than
/// blocks — callers already holding a lock (the IDE driver's disk
/// timeout) cannot park on the scheduler.
pub fn milli_sleep(ms: u32) {
    let ticks_to_wait = u64::from(ms.div_ceil(1000 / TIMER_HZ));
    let target = ticks() + ticks_to_wait;
    while ticks() < target {
        core::hint::spin_loop();
    }
}
