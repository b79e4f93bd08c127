//! # Segment Selectors
//!
//! The GDT layout is fixed: null, kernel code, kernel data, user data,
//! user code, TSS (two slots). User selectors carry RPL 3.

pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_DS: u16 = 0x10;
pub const USER_DS: u16 = 0x18 | 3;
pub const USER_CS: u16 = 0x20 | 3;
pub const TSS_SELECTOR: u16 = 0x28;

/// `RFLAGS` for freshly entered user code: IF set, reserved bit 1 set.
pub const USER_RFLAGS: u64 = 0x202;

const _: () = {
    assert!(USER_DS == 0x1b);
    assert!(USER_CS == 0x23);
};
