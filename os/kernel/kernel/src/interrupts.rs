//! # x86-64 Interrupt Descriptor Table
//!
//! A 256-entry IDT with a fluent builder per gate:
//!
//! ```ignore
//! idt[0x80]
//!     .set_handler(int80_entry)
//!     .dpl(3)                 // reachable with `int 0x80` from ring 3
//!     .present(true);
//! ```
//!
//! Vector map:
//!
//! Vectors  | Source              | Handler
//! ---------|---------------------|--------
//! 0..32    | CPU exceptions      | [`exceptions`]: decoded and handed to the kernel's fault policy
//! 32..48   | PIC IRQ 0..15       | [`irq`]: timer, keyboard, NVMe; anything else is fatal
//! 0x80     | `int 0x80` syscalls | [`syscall`]
//!
//! All gates are interrupt gates (`IF` cleared on entry). The double fault
//! vector runs on its own IST stack.
//!
//! ## Entry stub stack layout
//!
//! Every stub pushes the general purpose registers in the same order, so
//! the lowest 15 words on the stack always read as the first fields of
//! [`TrapFrame`](kernel_core::TrapFrame):
//!
//! ```text
//!   ss, rsp, rflags, cs, rip     (CPU)
//!   [error code, vector]          (exception stubs only)
//!   rax, rbx, ..., r14, r15       (stub) ◄── rsp
//! ```

pub mod exceptions;
pub mod irq;
pub mod syscall;

use bitfield_struct::bitfield;
use core::ops::{Index, IndexMut};
use kernel_info::gdt::KERNEL_CS;
use kernel_sync::SyncOnceCell;

const _: () = assert!(size_of::<IdtEntry>() == 16);
const _: () = assert!(align_of::<Idt>() == 16);

/// Entry stubs are `extern "C"` functions that never follow the C ABI.
pub type EntryStub = extern "C" fn();

/// The type/attribute half-word of a gate.
#[bitfield(u16)]
pub struct IdtGateAttr {
    /// Interrupt Stack Table slot, `0` for none.
    #[bits(3)]
    pub ist: u8,
    #[bits(5)]
    __: u8,
    /// `0xE` interrupt gate, `0xF` trap gate.
    #[bits(4)]
    pub typ: u8,
    #[bits(1)]
    pub s: bool,
    /// Lowest privilege level allowed to raise the vector with `int n`.
    #[bits(2)]
    pub dpl: u8,
    #[bits(1)]
    pub present: bool,
}

#[repr(C, align(16))]
pub struct Idt {
    entries: [IdtEntry; 256],
}

impl Default for Idt {
    fn default() -> Self {
        Self::new()
    }
}

impl Idt {
    /// All gates not present.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: [IdtEntry::MISSING; 256],
        }
    }

    /// Load this table into `IDTR`.
    ///
    /// # Safety
    /// Every present gate must point at a valid entry stub.
    #[allow(clippy::cast_possible_truncation)]
    pub unsafe fn load(&'static self) {
        let idtr = Idtr {
            limit: (size_of::<Self>() - 1) as u16,
            base: core::ptr::from_ref(self) as u64,
        };
        unsafe {
            core::arch::asm!("lidt [{}]", in(reg) &raw const idtr, options(nostack, preserves_flags, readonly));
        }
    }
}

impl Index<usize> for Idt {
    type Output = IdtEntry;
    fn index(&self, i: usize) -> &Self::Output {
        &self.entries[i]
    }
}

impl IndexMut<usize> for Idt {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.entries[i]
    }
}

/// Operand of `lidt`.
#[repr(C, packed)]
struct Idtr {
    limit: u16,
    base: u64,
}

/// One 16-byte gate descriptor.
#[repr(C)]
#[derive(Copy, Clone)]
pub struct IdtEntry {
    offset_lo: u16,
    selector: u16,
    attr: IdtGateAttr,
    offset_mid: u16,
    offset_hi: u32,
    zero: u32,
}

impl IdtEntry {
    pub const MISSING: Self = Self {
        offset_lo: 0,
        selector: 0,
        attr: IdtGateAttr::new(),
        offset_mid: 0,
        offset_hi: 0,
        zero: 0,
    };

    /// Point the gate at `handler` in the kernel code segment. The gate
    /// stays non-present until [`IdtEntryBuilder::present`].
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_handler(&mut self, handler: EntryStub) -> IdtEntryBuilder<'_> {
        let addr = handler as usize as u64;
        self.offset_lo = addr as u16;
        self.offset_mid = (addr >> 16) as u16;
        self.offset_hi = (addr >> 32) as u32;
        self.selector = KERNEL_CS;
        self.attr = IdtGateAttr::new().with_typ(0xE);
        IdtEntryBuilder { entry: self }
    }
}

pub struct IdtEntryBuilder<'a> {
    entry: &'a mut IdtEntry,
}

impl IdtEntryBuilder<'_> {
    pub const fn present(self, present: bool) -> Self {
        self.entry.attr = self.entry.attr.with_present(present);
        self
    }

    pub fn dpl(self, dpl: u8) -> Self {
        debug_assert!(dpl <= 3);
        self.entry.attr = self.entry.attr.with_dpl(dpl);
        self
    }

    pub fn ist(self, slot: u8) -> Self {
        debug_assert!(slot <= 7);
        self.entry.attr = self.entry.attr.with_ist(slot);
        self
    }
}

static IDT: SyncOnceCell<Idt> = SyncOnceCell::new();

/// Build the table with every stub and load it.
///
/// # Safety
/// The GDT and TSS must be loaded; interrupts must be disabled.
pub unsafe fn init() {
    let idt = IDT.get_or_init(|| {
        let mut idt = Idt::new();
        exceptions::install(&mut idt);
        irq::install(&mut idt);
        syscall::install(&mut idt);
        idt
    });
    unsafe { idt.load() };
}
