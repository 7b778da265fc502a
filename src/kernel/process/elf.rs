// src/kernel/process/elf.rs
//! Minimal ELF32 static executable loader (spec §4.5's `exec`).

use crate::errors::{FsError, KernelError};
use crate::kernel::mm::frame::USER_POOL;
use crate::kernel::mm::{self, Pool, VirtAddr, PAGE_SIZE};
use spin::Mutex;

const EI_NIDENT: usize = 16;
const ELFCLASS32: u8 = 1;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_386: u16 = 3;
const PT_LOAD: u32 = 1;
const PF_W: u32 = 0x2;

/// Program headers beyond this many are rejected outright (spec §4.5:
/// "phnum ≤ 1024").
pub const MAX_PHNUM: usize = 1024;

#[repr(C)]
struct Elf32Header {
    e_ident: [u8; EI_NIDENT],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u32,
    e_phoff: u32,
    e_shoff: u32,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct Elf32ProgramHeader {
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_paddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
    p_align: u32,
}

fn bad(_: &'static str) -> KernelError {
    KernelError::Fs(FsError::InvalidArgument)
}

/// Validate the ELF32 header against spec §4.5's exact field list, map and
/// populate every `PT_LOAD` segment into the calling task's address space,
/// and return the entry point.
pub fn load(image: &[u8], user_vpool: &Mutex<Pool>) -> Result<u32, KernelError> {
    if image.len() < core::mem::size_of::<Elf32Header>() {
        return Err(bad("image shorter than an ELF header"));
    }
    // SAFETY: length checked above; the header is read-only and POD.
    let header = unsafe { &*(image.as_ptr().cast::<Elf32Header>()) };

    if header.e_ident[0..4] != *b"\x7fELF"
        || header.e_ident[4] != ELFCLASS32
        || header.e_ident[5] != ELFDATA2LSB
        || header.e_ident[6] != EV_CURRENT
    {
        return Err(bad("bad e_ident"));
    }
    if header.e_type != ET_EXEC || header.e_machine != EM_386 || header.e_version != u32::from(EV_CURRENT) {
        return Err(bad("not an IA-32 executable"));
    }
    if header.e_phnum as usize > MAX_PHNUM
        || header.e_phentsize as usize != core::mem::size_of::<Elf32ProgramHeader>()
    {
        return Err(bad("bad program header table"));
    }

    for i in 0..header.e_phnum as usize {
        let offset = header.e_phoff as usize + i * header.e_phentsize as usize;
        if offset.checked_add(core::mem::size_of::<Elf32ProgramHeader>()).is_none_or(|end| end > image.len()) {
            return Err(bad("program header table past end of image"));
        }
        // SAFETY: range checked above.
        let ph = unsafe { &*(image[offset..].as_ptr().cast::<Elf32ProgramHeader>()) };
        if ph.p_type == PT_LOAD {
            load_segment(image, ph, user_vpool)?;
        }
    }

    Ok(header.e_entry)
}

/// Map `[vaddr, vaddr+memsz)` (reusing any page already present) and copy
/// the segment body in, zero-filling `[filesz, memsz)` explicitly — the
/// conformance improvement spec §9 names as the minimal loader's first
/// gap ("add explicit zero-fill for `[filesz, memsz)`").
fn load_segment(image: &[u8], ph: &Elf32ProgramHeader, user_vpool: &Mutex<Pool>) -> Result<(), KernelError> {
    if ph.p_filesz > ph.p_memsz {
        return Err(bad("filesz exceeds memsz"));
    }
    let seg_start = VirtAddr::new(ph.p_vaddr as usize);
    let seg_end = seg_start.checked_add(ph.p_memsz as usize).ok_or_else(|| bad("segment overflows address space"))?;
    let page_start = seg_start.align_down(PAGE_SIZE);
    let page_end = seg_end.align_up(PAGE_SIZE);
    let page_count = (page_end.as_usize() - page_start.as_usize()) / PAGE_SIZE;
    let writable = ph.p_flags & PF_W != 0;

    for i in 0..page_count {
        let page = VirtAddr::new(page_start.as_usize() + i * PAGE_SIZE);
        if crate::kernel::mm::paging::translate(page).is_none() {
            mm::alloc_pages_at(&USER_POOL, user_vpool, page, 1, true, true)?;
        }
    }

    let file_range_end = (ph.p_offset as usize).checked_add(ph.p_filesz as usize).ok_or_else(|| bad("offset overflow"))?;
    if file_range_end > image.len() {
        return Err(bad("filesz past end of image"));
    }

    // SAFETY: every page in [page_start, page_end) was just mapped user+
    // writable above, so the whole [seg_start, seg_end) range is valid to
    // write through the current address space.
    unsafe {
        let dst = seg_start.as_mut_ptr::<u8>();
        core::ptr::copy_nonoverlapping(image[ph.p_offset as usize..].as_ptr(), dst, ph.p_filesz as usize);
        let bss_len = (ph.p_memsz - ph.p_filesz) as usize;
        core::ptr::write_bytes(dst.add(ph.p_filesz as usize), 0, bss_len);
    }

    // This kernel enforces no W^X (spec Non-goals); a read-only segment is
    // left mapped writable after the copy rather than remapped down.
    let _ = writable;
    Ok(())
}
