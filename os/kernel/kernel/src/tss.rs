//! # Task State Segment
//!
//! In long mode the TSS only supplies stack pointers: `rsp0` is loaded on
//! every trap from ring 3, and the IST slots give selected vectors a known
//! good stack. The scheduler moves `rsp0` to the top of the incoming task's
//! kernel stack on every switch.

use core::cell::UnsafeCell;

/// IST slot the double-fault vector runs on.
pub const DOUBLE_FAULT_IST: u8 = 1;

const IST_STACK_SIZE: usize = 16 * 1024;

#[repr(C, packed(4))]
pub struct Tss64 {
    _reserved0: u32,
    /// Ring 0..2 stack pointers.
    pub rsp: [u64; 3],
    _reserved1: u64,
    /// IST1..IST7.
    pub ist: [u64; 7],
    _reserved2: u64,
    _reserved3: u16,
    /// Offset of the I/O permission bitmap; pointing past the end denies
    /// all ports to ring 3.
    pub iopb_offset: u16,
}

const _: () = assert!(size_of::<Tss64>() == 104);

impl Tss64 {
    #[allow(clippy::cast_possible_truncation)]
    const fn new() -> Self {
        Self {
            _reserved0: 0,
            rsp: [0; 3],
            _reserved1: 0,
            ist: [0; 7],
            _reserved2: 0,
            _reserved3: 0,
            iopb_offset: size_of::<Self>() as u16,
        }
    }
}

/// The single CPU's TSS. Written during boot and by [`set_rsp0`], read by
/// the CPU.
struct TssCell(UnsafeCell<Tss64>);

// Single core; writers run with interrupts masked.
unsafe impl Sync for TssCell {}

static TSS: TssCell = TssCell(UnsafeCell::new(Tss64::new()));

#[repr(align(16))]
struct IstStack([u8; IST_STACK_SIZE]);

static mut DOUBLE_FAULT_STACK: IstStack = IstStack([0; IST_STACK_SIZE]);

/// Fill in the IST stacks and return the TSS address for its descriptor.
pub fn init() -> u64 {
    let top = (&raw const DOUBLE_FAULT_STACK) as u64 + IST_STACK_SIZE as u64;
    let tss = TSS.0.get();
    unsafe {
        let ist = (&raw mut (*tss).ist).cast::<u64>();
        ist.add(usize::from(DOUBLE_FAULT_IST) - 1).write_unaligned(top & !0xF);
    }
    tss as u64
}

/// Stack the CPU switches to on the next trap from user mode.
pub fn set_rsp0(top: u64) {
    unsafe {
        (&raw mut (*TSS.0.get()).rsp).cast::<u64>().write_unaligned(top);
    }
}
