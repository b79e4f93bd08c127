//! # Long-mode segment descriptor encodings
//!
//! In 64-bit mode base and limit of code/data descriptors are ignored; what
//! remains meaningful is the type, the privilege level, the present bit and
//! `L` (64-bit code). The TSS still needs a real base and limit and takes
//! two GDT slots.

use bitfield_struct::bitfield;

/// An 8-byte code or data segment descriptor.
#[bitfield(u64)]
pub struct SegmentDescriptor {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    /// `0b1010` execute/read code, `0b0010` read/write data.
    #[bits(4)]
    pub typ: u8,
    /// Code/data (as opposed to system) descriptor.
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_hi: u8,
    pub avl: bool,
    /// 64-bit code segment.
    pub long_mode: bool,
    /// Must be clear when `long_mode` is set.
    pub db: bool,
    pub granularity: bool,
    pub base_hi: u8,
}

impl SegmentDescriptor {
    pub const NULL: Self = Self::new();

    /// 64-bit code segment at privilege level `dpl`.
    #[must_use]
    pub const fn code(dpl: u8) -> Self {
        Self::new()
            .with_typ(0b1010)
            .with_s(true)
            .with_dpl(dpl)
            .with_present(true)
            .with_long_mode(true)
    }

    /// Data/stack segment at privilege level `dpl`.
    #[must_use]
    pub const fn data(dpl: u8) -> Self {
        Self::new()
            .with_typ(0b0010)
            .with_s(true)
            .with_dpl(dpl)
            .with_present(true)
    }
}

/// Low half of the 16-byte "available 64-bit TSS" system descriptor.
#[bitfield(u64)]
pub struct TssDescriptorLow {
    pub limit_lo: u16,
    pub base_lo: u16,
    pub base_mid: u8,
    /// `0x9`: available 64-bit TSS.
    #[bits(4)]
    pub typ: u8,
    pub s: bool,
    #[bits(2)]
    pub dpl: u8,
    pub present: bool,
    #[bits(4)]
    pub limit_hi: u8,
    #[bits(3)]
    __: u8,
    pub granularity: bool,
    pub base_hi: u8,
}

#[repr(C)]
#[derive(Copy, Clone, Debug)]
pub struct TssDescriptor {
    pub low: TssDescriptorLow,
    /// `base[63:32]`; the upper half is reserved.
    pub high: u64,
}

impl TssDescriptor {
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn new(base: u64, limit: u32) -> Self {
        let low = TssDescriptorLow::new()
            .with_limit_lo(limit as u16)
            .with_base_lo(base as u16)
            .with_base_mid((base >> 16) as u8)
            .with_typ(0x9)
            .with_present(true)
            .with_limit_hi(((limit >> 16) & 0xF) as u8)
            .with_base_hi((base >> 24) as u8);
        Self {
            low,
            high: base >> 32,
        }
    }
}

const _: () = {
    assert!(size_of::<SegmentDescriptor>() == 8);
    assert!(size_of::<TssDescriptor>() == 16);
};

