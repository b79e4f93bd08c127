//! # x86 I/O Port Access
//!
//! Thin wrappers around `in`/`out` for the legacy devices the kernel drives
//! through the port space:
//!
//! ```text
//! 0x0020-0x0021   PIC #1 (command, data)
//! 0x0040-0x0043   PIT channel 0 and mode register
//! 0x0060          PS/2 keyboard data
//! 0x00A0-0x00A1   PIC #2
//! 0x0CF8, 0x0CFC  PCI configuration mechanism #1 (address, data)
//! ```
//!
//! # Safety
//! Every function here is `unsafe`: the caller must run at CPL0, target a
//! port that belongs to the intended device, and serialize multi-step
//! register protocols against interrupt handlers touching the same device.
//! `in`/`out` are ordered among themselves but are not memory fences.

/// Write one byte to an I/O port (`out dx, al`).
#[inline]
pub unsafe fn outb(port: u16, val: u8) {
    unsafe {
        core::arch::asm!("out dx, al", in("dx") port, in("al") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read one byte from an I/O port (`in al, dx`).
#[inline]
pub unsafe fn inb(port: u16) -> u8 {
    let v: u8;
    unsafe {
        core::arch::asm!("in al, dx", in("dx") port, out("al") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Write a double word to an I/O port (`out dx, eax`).
#[inline]
pub unsafe fn outl(port: u16, val: u32) {
    unsafe {
        core::arch::asm!("out dx, eax", in("dx") port, in("eax") val, options(nomem, nostack, preserves_flags));
    }
}

/// Read a double word from an I/O port (`in eax, dx`).
#[inline]
pub unsafe fn inl(port: u16) -> u32 {
    let v: u32;
    unsafe {
        core::arch::asm!("in eax, dx", in("dx") port, out("eax") v, options(nomem, nostack, preserves_flags));
    }
    v
}

/// Give a slow ISA device time to settle by writing to the unused POST port.
#[inline]
pub unsafe fn io_wait() {
    unsafe { outb(0x80, 0) };
}
