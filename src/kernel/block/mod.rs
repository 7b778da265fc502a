// src/kernel/block/mod.rs
//! Block device layer (spec §4.6): the ATA/IDE PIO driver and the MBR/EBR
//! partition scan that runs over it.

pub mod ide;
pub mod partition;

pub use partition::Partition;

/// Bytes per sector for every disk this driver talks to.
pub const SECTOR_SIZE: usize = 512;

/// Bring the two IDE channels and the partition table up. Call once during
/// boot, after interrupts are enabled (the read/write path blocks on a
/// per-channel completion semaphore that only an IRQ can signal).
pub fn init() {
    ide::init();
    partition::scan_all();
}
