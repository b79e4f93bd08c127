//! # Userspace Support Library
//!
//! Shared between the kernel and userspace programs:
//!
//! * `syscall-abi`: syscall numbers, open flags, error convention and the
//!   byte layouts returned by `getdents` and `gettasks`.
//! * `syscall`: `int 0x80` wrappers for every call.
//! * `stdlib`: `print!`/`println!` onto fd 1 and a panic handler.
//!
//! The kernel only enables `kernel` (the ABI); userspace programs take the
//! default `userland` set.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![cfg_attr(not(feature = "syscall"), forbid(unsafe_code))]
#![cfg_attr(feature = "syscall", allow(unsafe_code))]

#[cfg(feature = "stdlib")]
#[macro_use]
pub mod stdlib;

#[cfg(feature = "syscall")]
pub mod syscall;

#[cfg(feature = "syscall-abi")]
pub mod syscall_abi;

#[cfg(feature = "stdlib")]
pub use stdlib::*;

#[cfg(all(feature = "stdlib", not(test)))]
mod panic {
    #[panic_handler]
    fn panic(info: &core::panic::PanicInfo) -> ! {
        crate::eprintln!("panic: {}", info.message());
        crate::syscall::exit(101)
    }
}
