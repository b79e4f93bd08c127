//! # Typed `x86_64` Control Registers
//!
//! The few privileged registers the loader and the kernel touch, as
//! [`bitfield_struct`] types:
//!
//! * [`Cr0`]: write protection for supervisor code.
//! * [`Cr3`]: the active PML4.
//! * [`Cr4`]: global pages.
//! * [`Efer`]: the no-execute bit.
//!
//! Reads and writes are privileged, hence the unsafe traits.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod cr0;
mod cr3;
mod cr4;
mod efer;

pub use cr0::Cr0;
pub use cr3::Cr3;
pub use cr4::Cr4;
pub use efer::Efer;

pub trait LoadRegisterUnsafe {
    /// # Safety
    /// Ring 0 only.
    unsafe fn load_unsafe() -> Self;
}

pub trait StoreRegisterUnsafe {
    /// # Safety
    /// Ring 0 only. The caller is responsible for the effect of the new
    /// value on paging and protection.
    unsafe fn store_unsafe(self);
}
