// src/kernel/block/ide.rs
//! ATA/IDE PIO driver (spec §4.6): two channels, two drives each, LBA28,
//! ≤256-sector chunks. Every register access goes through
//! [`crate::arch::x86::port`], the same primitive the PIC and PIT drivers use.

use super::SECTOR_SIZE;
use crate::arch::x86::port::{Port, PortWriteOnly};
use crate::errors::{DiskError, KernelError};
use crate::kernel::sync::Semaphore;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

const CMD_READ_SECTORS: u8 = 0x20;
const CMD_WRITE_SECTORS: u8 = 0x30;

const STATUS_ERR: u8 = 0x01;
const STATUS_DF: u8 = 0x20;
const STATUS_RDY: u8 = 0x40;
const STATUS_BSY: u8 = 0x80;

/// Channel 0 (primary) covers disks `sda`/`sdb`; channel 1 (secondary)
/// covers `sdc`/`sdd`, matching the `sdXn` partition names spec §4.6 uses.
const MAX_SECTORS_PER_CHUNK: usize = 256;

struct Registers {
    data: Port<u16>,
    error_features: Port<u8>,
    sector_count: Port<u8>,
    lba_lo: Port<u8>,
    lba_mid: Port<u8>,
    lba_hi: Port<u8>,
    drive_head: Port<u8>,
    status_command: Port<u8>,
    control: PortWriteOnly<u8>,
    alt_status: Port<u8>,
}

impl Registers {
    const fn new(io_base: u16, ctrl_base: u16) -> Self {
        Self {
            data: Port::new(io_base),
            error_features: Port::new(io_base + 1),
            sector_count: Port::new(io_base + 2),
            lba_lo: Port::new(io_base + 3),
            lba_mid: Port::new(io_base + 4),
            lba_hi: Port::new(io_base + 5),
            drive_head: Port::new(io_base + 6),
            status_command: Port::new(io_base + 7),
            control: PortWriteOnly::new(ctrl_base),
            alt_status: Port::new(ctrl_base),
        }
    }
}

struct Channel {
    regs: Mutex<Registers>,
    /// Signalled by [`on_irq`] once per completed command; the read/write
    /// path downs this to learn the drive has finished (spec §4.6).
    done: Semaphore,
    /// Set just before issuing a command, cleared by the IRQ handler. Lets
    /// a spurious IRQ on the shared cable be told apart from a real one.
    expecting_irq: AtomicBool,
}

impl Channel {
    const fn new(io_base: u16, ctrl_base: u16) -> Self {
        Self { regs: Mutex::new(Registers::new(io_base, ctrl_base)), done: Semaphore::new(0), expecting_irq: AtomicBool::new(false) }
    }
}

static CHANNELS: [Channel; 2] = [Channel::new(0x1F0, 0x3F6), Channel::new(0x170, 0x376)];

/// Enable IRQ delivery (clear nIEN) on both channels. The PIC masks in
/// [`crate::arch::x86::pic`] already gate IRQ14/IRQ15 until this runs.
pub fn init() {
    for channel in &CHANNELS {
        let mut regs = channel.regs.lock();
        unsafe { regs.control.write(0) };
    }
}

/// Channel 0 = disks `sda` (master) / `sdb` (slave); channel 1 = `sdc` /
/// `sdd`. Returns `(channel_index, drive_index)`.
#[must_use]
pub fn disk_to_channel_drive(disk: u8) -> (usize, usize) {
    ((disk / 2) as usize, (disk % 2) as usize)
}

fn disk_name(disk: u8) -> [u8; 3] {
    [b's', b'd', b'a' + disk]
}

/// Read `buf.len() / 512` sectors starting at `lba` from `disk` (0 = `sda`
/// … 3 = `sdd`), chunked to the controller's 256-sector-per-command limit.
pub fn read(disk: u8, lba: u32, buf: &mut [u8]) -> Result<(), KernelError> {
    if buf.len() % SECTOR_SIZE != 0 {
        return Err(DiskError::UnalignedTransfer.into());
    }
    let (channel_index, drive) = disk_to_channel_drive(disk);
    let total = buf.len() / SECTOR_SIZE;
    let mut done = 0;
    while done < total {
        let chunk = core::cmp::min(total - done, MAX_SECTORS_PER_CHUNK);
        let chunk_lba = lba + done as u32;
        let chunk_buf = &mut buf[done * SECTOR_SIZE..(done + chunk) * SECTOR_SIZE];
        read_chunk(disk, channel_index, drive, chunk_lba, chunk, chunk_buf)?;
        done += chunk;
    }
    Ok(())
}

/// Write `buf.len() / 512` sectors starting at `lba` to `disk`.
pub fn write(disk: u8, lba: u32, buf: &[u8]) -> Result<(), KernelError> {
    if buf.len() % SECTOR_SIZE != 0 {
        return Err(DiskError::UnalignedTransfer.into());
    }
    let (channel_index, drive) = disk_to_channel_drive(disk);
    let total = buf.len() / SECTOR_SIZE;
    let mut done = 0;
    while done < total {
        let chunk = core::cmp::min(total - done, MAX_SECTORS_PER_CHUNK);
        let chunk_lba = lba + done as u32;
        let chunk_buf = &buf[done * SECTOR_SIZE..(done + chunk) * SECTOR_SIZE];
        write_chunk(disk, channel_index, drive, chunk_lba, chunk, chunk_buf)?;
        done += chunk;
    }
    Ok(())
}

fn select_drive_and_lba(regs: &mut Registers, drive: usize, lba: u32, sector_count: usize) {
    let select = 0xE0 | ((drive as u8) << 4) | (((lba >> 24) & 0x0F) as u8);
    unsafe {
        regs.drive_head.write(select);
        regs.sector_count.write(if sector_count == 256 { 0 } else { sector_count as u8 });
        regs.lba_lo.write((lba & 0xFF) as u8);
        regs.lba_mid.write(((lba >> 8) & 0xFF) as u8);
        regs.lba_hi.write(((lba >> 16) & 0xFF) as u8);
    }
}

fn read_chunk(disk: u8, channel_index: usize, drive: usize, lba: u32, sector_count: usize, buf: &mut [u8]) -> Result<(), KernelError> {
    let channel = &CHANNELS[channel_index];
    let mut regs = channel.regs.lock();

    select_drive_and_lba(&mut regs, drive, lba, sector_count);
    channel.expecting_irq.store(true, Ordering::SeqCst);
    unsafe { regs.status_command.write(CMD_READ_SECTORS) };
    drop(regs);

    channel.done.down();
    busy_wait_ready(channel, disk, lba, "read");

    let mut regs = channel.regs.lock();
    for word in buf.chunks_exact_mut(2) {
        let value = unsafe { regs.data.read() };
        word[0] = (value & 0xFF) as u8;
        word[1] = (value >> 8) as u8;
    }
    Ok(())
}

fn write_chunk(disk: u8, channel_index: usize, drive: usize, lba: u32, sector_count: usize, buf: &[u8]) -> Result<(), KernelError> {
    let channel = &CHANNELS[channel_index];
    {
        let mut regs = channel.regs.lock();
        select_drive_and_lba(&mut regs, drive, lba, sector_count);
        channel.expecting_irq.store(true, Ordering::SeqCst);
        unsafe { regs.status_command.write(CMD_WRITE_SECTORS) };
    }

    busy_wait_ready(channel, disk, lba, "write");

    let mut regs = channel.regs.lock();
    for word in buf.chunks_exact(2) {
        let value = u16::from(word[0]) | (u16::from(word[1]) << 8);
        unsafe { regs.data.write(value) };
    }
    drop(regs);

    channel.done.down();
    Ok(())
}

/// Poll the status register until BSY clears, budgeted to ~30 seconds of
/// 10 ms spins. PANICs on expiry (spec §4.6: disk timeout is fatal).
///
/// The countdown below is deliberately `time_limit -= (10 >= 0)`: the
/// original arithmetic meant to subtract 10 per 10 ms spin, but operator
/// precedence binds `-=` to the comparison, so it subtracts 1 instead.
/// Preserved verbatim (spec §9) — the loop still sleeps 10 ms per
/// iteration, so the effective timeout stays ~30 seconds either way.
fn busy_wait_ready(channel: &Channel, disk: u8, lba: u32, op: &str) {
    let mut time_limit: i32 = 3000;
    loop {
        let status = unsafe { channel.regs.lock().alt_status.read() };
        if status & (STATUS_ERR | STATUS_DF) != 0 {
            fail(disk, lba, op);
        }
        if status & STATUS_BSY == 0 && status & STATUS_RDY != 0 {
            break;
        }
        time_limit -= (10 >= 0) as i32;
        if time_limit <= 0 {
            fail(disk, lba, op);
        }
        crate::kernel::driver::pit::milli_sleep(10);
    }
}

fn fail(disk: u8, lba: u32, op: &str) -> ! {
    let name = disk_name(disk);
    let name = core::str::from_utf8(&name).unwrap_or("sd?");
    panic!("{name} {op} sector {lba} failed");
}

/// Called from the IDE IRQ handlers at vectors 0x2E/0x2F
/// ([`crate::arch::x86::interrupts`]). `channel` is 0 for primary, 1 for
/// secondary.
pub fn on_irq(channel: usize) {
    let channel = &CHANNELS[channel];
    if channel.expecting_irq.swap(false, Ordering::SeqCst) {
        let _ = unsafe { channel.regs.lock().status_command.read() };
        channel.done.up();
    }
}
