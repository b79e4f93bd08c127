//! # Kernel Entry Point
//!
//! The bare-metal half of the kernel. Everything hardware independent
//! (tasks, syscalls, filesystems, drivers) lives in [`kernel_core`]; this
//! binary supplies what only runs on the CPU:
//!
//! * [`init`]: the entry the UEFI loader jumps to and the boot sequence,
//! * [`gdt`], [`tss`], [`interrupts`]: descriptor tables and entry stubs,
//! * [`pic`], [`pit`]: legacy interrupt controller and timer,
//! * [`platform`], [`switch`]: the [`Platform`](kernel_core::Platform)
//!   implementation with the context switch and trampolines,
//! * [`memory`], [`pci`]: RAM discovery and PCI configuration access.

#![no_std]
#![no_main]
#![allow(unsafe_code, clippy::cast_possible_truncation)]

extern crate alloc;

mod gdt;
mod init;
mod interrupts;
mod memory;
mod pci;
mod pic;
mod pit;
mod platform;
mod ports;
mod switch;
mod tss;

use kernel_core::Kernel;
use kernel_mm::KernelHeap;
use kernel_sync::SyncOnceCell;
use log::error;

#[global_allocator]
static HEAP: KernelHeap = KernelHeap::new();

/// The kernel context, set once during boot.
static KERNEL: SyncOnceCell<Kernel> = SyncOnceCell::new();

/// The kernel context, if boot got that far.
fn kernel() -> Option<&'static Kernel> {
    KERNEL.get()
}

fn halt_forever() -> ! {
    loop {
        unsafe { core::arch::asm!("cli", "hlt", options(nomem, nostack)) };
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    error!("kernel panic: {info}");
    halt_forever();
}
