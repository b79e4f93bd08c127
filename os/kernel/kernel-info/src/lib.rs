//! # Kernel Configuration and Boot Interface
//!
//! Shared between the UEFI loader, the kernel binary and the kernel library
//! crates:
//!
//! * [`boot`]: the loader-to-kernel hand-off ([`KernelBootInfo`](boot::KernelBootInfo)),
//!   carrying the UEFI memory map and the location of the initial ramdisk
//!   (a ustar archive unpacked into the root filesystem).
//! * [`memory`]: the virtual address space layout (HHDM, kernel image,
//!   user stack window, device-page window) and kernel stack sizing.
//! * [`gdt`]: segment selectors, shared by the GDT and by every code path
//!   that synthesizes an `iretq` frame.
//!
//! ```text
//! 0x0000_0000_0000_0000 ┌─────────────────────────────────┐
//!                       │  User space (PML4 0..=255)      │
//! USER_STACK_BOTTOM     ├─────────────────────────────────┤ 0x0000_7fff_fff0_0000
//!                       │  User stack (1 MiB)             │
//! USER_STACK_TOP        ├─────────────────────────────────┤ 0x0000_8000_0000_0000
//!                       │  non-canonical hole             │
//! HHDM_BASE             ├─────────────────────────────────┤ 0xffff_8880_0000_0000
//!                       │  Direct map of physical memory  │
//! DEVICE_PAGE_BASE      ├─────────────────────────────────┤ 0xffff_c000_0000_0000
//!                       │  MMIO windows (dpage ids)       │
//! KERNEL_BASE           ├─────────────────────────────────┤ 0xffff_ffff_8000_0000
//!                       │  Kernel image                   │
//! 0xffff_ffff_ffff_ffff └─────────────────────────────────┘
//! ```
//!
//! ## Boot Protocol
//!
//! ```rust
//! # use kernel_info::boot::KernelBootInfo;
//! pub type KernelEntryFn = extern "sysv64" fn(*const KernelBootInfo) -> !;
//! ```
//!
//! The loader calls the kernel with the boot info pointer in `RDI` after
//! `ExitBootServices`, on an identity-mapped trampoline stack.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod gdt;
pub mod memory;
