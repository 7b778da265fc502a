// src/arch/x86/gdt.rs
//! Flat GDT plus the single TSS used for ring3 → ring0 privilege transition
//! (spec §4.9, §6): kernel/user code and data segments covering all 4 GiB,
//! and a TSS whose `esp0`/`ss0` fields are rewritten on every context switch
//! to a user-mode task (spec §4.4, §5).

use core::mem::size_of;
use lazy_static::lazy_static;
use spin::Mutex;

const ACCESS_PRESENT: u8 = 0x80;
const ACCESS_CODE_KERNEL: u8 = 0x9A;
const ACCESS_DATA_KERNEL: u8 = 0x92;
const ACCESS_CODE_USER: u8 = 0xFA;
const ACCESS_DATA_USER: u8 = 0xF2;
const ACCESS_TSS: u8 = 0x89;

const FLAGS_CODE_DATA: u8 = 0xC0; // granularity=4K, 32-bit operand size
const FLAGS_TSS: u8 = 0x00;

/// A single 8-byte GDT descriptor.
#[repr(C, packed)]
#[derive(Clone, Copy)]
struct Descriptor {
    limit_low: u16,
    base_low: u16,
    base_mid: u8,
    access: u8,
    limit_high_flags: u8,
    base_high: u8,
}

impl Descriptor {
    const fn null() -> Self {
        Self { limit_low: 0, base_low: 0, base_mid: 0, access: 0, limit_high_flags: 0, base_high: 0 }
    }

    const fn flat(access: u8, flags: u8) -> Self {
        // base=0, limit=0xFFFFF with 4K granularity -> covers 4 GiB
        Self {
            limit_low: 0xFFFF,
            base_low: 0,
            base_mid: 0,
            access,
            limit_high_flags: 0x0F | flags,
            base_high: 0,
        }
    }

    const fn tss(base: u32, limit: u32) -> Self {
        Self {
            limit_low: (limit & 0xFFFF) as u16,
            base_low: (base & 0xFFFF) as u16,
            base_mid: ((base >> 16) & 0xFF) as u8,
            access: ACCESS_PRESENT | ACCESS_TSS,
            limit_high_flags: (((limit >> 16) & 0x0F) as u8) | FLAGS_TSS,
            base_high: ((base >> 24) & 0xFF) as u8,
        }
    }
}

/// Segment selector, i.e. an index into the GDT combined with an RPL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSelector(pub u16);

impl SegmentSelector {
    const fn new(index: u16, rpl: u8) -> Self {
        Self((index << 3) | rpl as u16)
    }
}

/// The 32-bit Task State Segment. Only the fields the kernel actually reads
/// or writes are meaningful; the rest exist because hardware expects the
/// full 104-byte layout to be present.
#[repr(C, packed)]
pub struct Tss {
    link: u32,
    pub esp0: u32,
    pub ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

impl Tss {
    const fn new() -> Self {
        Self {
            link: 0,
            esp0: 0,
            ss0: 0,
            esp1: 0,
            ss1: 0,
            esp2: 0,
            ss2: 0,
            cr3: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ecx: 0,
            edx: 0,
            ebx: 0,
            esp: 0,
            ebp: 0,
            esi: 0,
            edi: 0,
            es: 0,
            cs: 0,
            ss: 0,
            ds: 0,
            fs: 0,
            gs: 0,
            ldt: 0,
            trap: 0,
            iomap_base: size_of::<Tss>() as u16,
        }
    }
}

const GDT_ENTRIES: usize = 6;

#[repr(C, align(8))]
struct Gdt([Descriptor; GDT_ENTRIES]);

#[repr(C, packed)]
struct GdtPointer {
    limit: u16,
    base: u32,
}

pub struct Selectors {
    pub kernel_code: SegmentSelector,
    pub kernel_data: SegmentSelector,
    pub user_code: SegmentSelector,
    pub user_data: SegmentSelector,
    pub tss: SegmentSelector,
}

static TSS: Mutex<Tss> = Mutex::new(Tss::new());

lazy_static! {
    static ref SELECTORS: Selectors = Selectors {
        kernel_code: SegmentSelector::new(1, 0),
        kernel_data: SegmentSelector::new(2, 0),
        user_code: SegmentSelector::new(3, 3),
        user_data: SegmentSelector::new(4, 3),
        tss: SegmentSelector::new(5, 0),
    };
}

/// Fetch the process-wide segment selectors.
#[must_use]
pub fn selectors() -> &'static Selectors {
    &SELECTORS
}

/// Install the flat GDT, load segment registers, and load the TSS.
///
/// # Safety
/// Must run exactly once, before any privilege transition, with the TSS's
/// address stable for the kernel's lifetime (it is a `'static` mutex-guarded
/// global, so this holds).
pub unsafe fn init() {
    let tss_addr = core::ptr::addr_of!(TSS) as u32;
    let tss_limit = (size_of::<Tss>() - 1) as u32;

    let gdt = Gdt([
        Descriptor::null(),
        Descriptor::flat(ACCESS_PRESENT | ACCESS_CODE_KERNEL, FLAGS_CODE_DATA),
        Descriptor::flat(ACCESS_PRESENT | ACCESS_DATA_KERNEL, FLAGS_CODE_DATA),
        Descriptor::flat(ACCESS_PRESENT | ACCESS_CODE_USER, FLAGS_CODE_DATA),
        Descriptor::flat(ACCESS_PRESENT | ACCESS_DATA_USER, FLAGS_CODE_DATA),
        Descriptor::tss(tss_addr, tss_limit),
    ]);

    // `gdt` must outlive every later use of the GDTR, so it is leaked into
    // a 'static slot the same way the IDT is.
    static mut GDT_STORAGE: Option<Gdt> = None;
    unsafe {
        GDT_STORAGE = Some(gdt);
        #[allow(static_mut_refs)]
        let gdt_ref = GDT_STORAGE.as_ref().unwrap();

        let pointer = GdtPointer {
            limit: (size_of::<Gdt>() - 1) as u16,
            base: gdt_ref as *const Gdt as u32,
        };

        core::arch::asm!("lgdt [{0}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));

        let data_sel = SELECTORS.kernel_data.0;
        let code_sel = SELECTORS.kernel_code.0 as u32;
        core::arch::asm!(
            "mov ds, {0:x}",
            "mov es, {0:x}",
            "mov fs, {0:x}",
            "mov gs, {0:x}",
            "mov ss, {0:x}",
            "push {1}",
            "lea {2}, [2f]",
            "push {2}",
            "retf",
            "2:",
            in(reg) data_sel,
            in(reg) code_sel,
            out(reg) _,
        );

        let tss_sel = SELECTORS.tss.0;
        core::arch::asm!("ltr {0:x}", in(reg) tss_sel, options(nostack, preserves_flags));
    }
}

/// Rewrite the TSS's ring-0 stack pointer. Called by the scheduler on every
/// context switch into a task that owns a user page table (spec §4.4).
pub fn set_kernel_stack(esp0: u32) {
    let mut tss = TSS.lock();
    tss.esp0 = esp0;
    tss.ss0 = SELECTORS.kernel_data.0 as u32;
}
