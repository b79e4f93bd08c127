//! # Global Descriptor Table
//!
//! Segmentation is mostly off in long mode, but selectors still carry the
//! privilege level and the TSS is still found through the GDT:
//!
//! Index | Selector | Meaning
//! ------|----------|--------
//! 0     | 0x00     | Null
//! 1     | 0x08     | Kernel code (64-bit, DPL 0)
//! 2     | 0x10     | Kernel data (DPL 0)
//! 3     | 0x1b     | User data (DPL 3, RPL 3)
//! 4     | 0x23     | User code (64-bit, DPL 3, RPL 3)
//! 5/6   | 0x28     | TSS (16-byte system descriptor)
//!
//! The selector values live in [`kernel_info::gdt`] so that the code
//! building `iretq` frames agrees with the table.

pub mod descriptors;

use crate::gdt::descriptors::{SegmentDescriptor, TssDescriptor};
use crate::tss::{self, Tss64};
use core::cell::UnsafeCell;
use kernel_info::gdt::{KERNEL_CS, KERNEL_DS, TSS_SELECTOR, USER_CS, USER_DS};

#[repr(C, align(16))]
struct Gdt {
    null: SegmentDescriptor,
    kernel_code: SegmentDescriptor,
    kernel_data: SegmentDescriptor,
    user_data: SegmentDescriptor,
    user_code: SegmentDescriptor,
    tss: TssDescriptor,
}

const _: () = {
    assert!(KERNEL_CS == 1 << 3);
    assert!(KERNEL_DS == 2 << 3);
    assert!(USER_DS == (3 << 3) | 3);
    assert!(USER_CS == (4 << 3) | 3);
    assert!(TSS_SELECTOR == 5 << 3);
    assert!(size_of::<Gdt>() == 7 * 8);
};

struct GdtCell(UnsafeCell<Gdt>);

// Written once during single-threaded boot.
unsafe impl Sync for GdtCell {}

static GDT: GdtCell = GdtCell(UnsafeCell::new(Gdt {
    null: SegmentDescriptor::NULL,
    kernel_code: SegmentDescriptor::code(0),
    kernel_data: SegmentDescriptor::data(0),
    user_data: SegmentDescriptor::data(3),
    user_code: SegmentDescriptor::code(3),
    tss: TssDescriptor::new(0, 0),
}));

/// Operand of `lgdt`.
#[repr(C, packed)]
struct DescTablePtr {
    limit: u16,
    base: u64,
}

/// Install the GDT and TSS on the boot CPU: `lgdt`, reload every segment
/// register, then `ltr`.
///
/// # Safety
/// Interrupts must be disabled. Call once.
#[allow(clippy::cast_possible_truncation)]
pub unsafe fn init() {
    let tss_base = tss::init();
    let gdt = GDT.0.get();
    let ptr = DescTablePtr {
        limit: (size_of::<Gdt>() - 1) as u16,
        base: gdt as u64,
    };

    unsafe {
        (*gdt).tss = TssDescriptor::new(tss_base, (size_of::<Tss64>() - 1) as u32);

        core::arch::asm!(
            "lgdt [{}]",
            in(reg) &raw const ptr,
            options(readonly, nostack, preserves_flags)
        );

        core::arch::asm!(
            "mov ds, {0:x}",
            "mov es, {0:x}",
            "mov ss, {0:x}",
            "mov fs, {0:x}",
            "mov gs, {0:x}",
            in(reg) KERNEL_DS,
            options(nostack, preserves_flags)
        );

        // Far return to reload CS.
        core::arch::asm!(
            "push {cs}",
            "lea {tmp}, [rip + 2f]",
            "push {tmp}",
            "retfq",
            "2:",
            cs = in(reg) u64::from(KERNEL_CS),
            tmp = lateout(reg) _,
        );

        core::arch::asm!(
            "ltr {0:x}",
            in(reg) TSS_SELECTOR,
            options(nostack, preserves_flags)
        );
    }
}
