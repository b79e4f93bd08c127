//! # UEFI Loader
//!
//! Brings the higher-half kernel up from the firmware:
//!
//! 1. read `\EFI\Boot\kernel.elf` and place its `PT_LOAD` segments at
//!    their physical load addresses,
//! 2. read `\EFI\Boot\initrd.tar`, the ustar archive that becomes the
//!    root file system, if present,
//! 3. build the kernel page tables (see [`vmem`]),
//! 4. exit boot services, keeping a copy of the memory map,
//! 5. switch `CR3` on an identity-mapped trampoline and jump to the ELF
//!    entry point with a pointer to [`KernelBootInfo`] in `RDI`.
//!
//! ```text
//!   UEFI firmware ──► efi_main ──► switch_to_kernel ──► _start_kernel
//!                     (identity)    (identity stack)     (higher half)
//! ```
//!
//! Everything the kernel inherits (segments, page tables, the initrd, the
//! memory map copy and the boot info) lives in `LOADER_*` memory, which the
//! kernel's page allocator never touches. The boot info pointer is handed
//! over as an HHDM address so it stays valid after the identity mappings
//! are gone.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![no_main]
#![allow(unsafe_code)]

extern crate alloc;

mod elf;
mod file_system;
mod logger;
mod memory;
mod uefi_mmap;
mod vmem;

use crate::elf::loader::load_kernel_segments;
use crate::elf::parser::ElfHeader;
use crate::file_system::load_file;
use crate::logger::UefiLogger;
use crate::memory::alloc_trampoline_stack;
use crate::uefi_mmap::exit_boot_services;
use crate::vmem::{IdentityRange, create_kernel_pagetables};
use alloc::boxed::Box;
use kernel_info::boot::{InitrdInfo, KernelBootInfo, MemoryMapInfo};
use kernel_info::memory::HHDM_BASE;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, VirtualAddress};
use kernel_registers::{Cr0, Cr4, Efer, LoadRegisterUnsafe, StoreRegisterUnsafe};
use log::{LevelFilter, debug, error, info, warn};
use uefi::cstr16;
use uefi::prelude::*;

const TRAMPOLINE_STACK_SIZE: u64 = 64 * 1024;

#[entry]
fn efi_main() -> Status {
    if uefi::helpers::init().is_err() {
        return Status::UNSUPPORTED;
    }
    if UefiLogger::new(LevelFilter::Debug).init().is_err() {
        return Status::ABORTED;
    }
    info!("UEFI loader reporting to QEMU");

    let elf_bytes = match load_file(cstr16!("\\EFI\\Boot\\kernel.elf")) {
        Ok(bytes) => bytes,
        Err(status) => {
            error!("cannot read kernel.elf: {status:?}");
            return status;
        }
    };
    let header = match ElfHeader::parse_elf64(&elf_bytes) {
        Ok(header) => header,
        Err(e) => {
            error!("kernel.elf: {e}");
            return Status::LOAD_ERROR;
        }
    };
    let segments = match load_kernel_segments(&elf_bytes, &header) {
        Ok(segments) => segments,
        Err(e) => {
            error!("kernel.elf: {e}");
            return e.into();
        }
    };
    info!(
        "kernel loaded: entry={}, {} segments",
        header.entry,
        segments.len()
    );
    drop(elf_bytes);

    let initrd = match load_file(cstr16!("\\EFI\\Boot\\initrd.tar")) {
        Ok(archive) => {
            let archive = archive.leak();
            info!("initrd loaded: {} bytes", archive.len());
            InitrdInfo {
                initrd_ptr: archive.as_ptr() as u64,
                initrd_len: archive.len() as u64,
            }
        }
        Err(status) => {
            warn!("no initrd.tar ({status:?}), booting with an empty root");
            InitrdInfo::default()
        }
    };

    let boot_info = Box::leak(Box::new(KernelBootInfo {
        mmap: MemoryMapInfo {
            mmap_ptr: 0,
            mmap_len: 0,
            mmap_desc_size: 0,
            mmap_desc_version: 0,
        },
        initrd,
    }));

    let stack = match alloc_trampoline_stack(TRAMPOLINE_STACK_SIZE) {
        Ok(stack) => stack,
        Err(e) => {
            error!("trampoline stack: {e:?}");
            return e.status();
        }
    };
    let trampoline = PhysicalAddress::new(switch_to_kernel as usize as u64);
    debug!("trampoline at {trampoline}, stack top {}", stack.top);

    let identity = [
        IdentityRange {
            start: trampoline,
            len: PAGE_SIZE,
            executable: true,
        },
        IdentityRange {
            start: stack.base,
            len: stack.len,
            executable: false,
        },
    ];
    let pml4 = match create_kernel_pagetables(&segments, &identity) {
        Ok(pml4) => pml4,
        Err(e) => {
            error!("kernel page tables: {e}");
            return Status::OUT_OF_RESOURCES;
        }
    };

    UefiLogger::exit_boot_services();
    boot_info.mmap = match exit_boot_services() {
        Ok(mmap) => mmap,
        Err(status) => return status,
    };
    info!(
        "memory map: {} bytes at {:#x}",
        boot_info.mmap.mmap_len, boot_info.mmap.mmap_ptr
    );

    let boot_info_hhdm =
        VirtualAddress::new(HHDM_BASE + core::ptr::from_ref::<KernelBootInfo>(boot_info) as u64);

    unsafe {
        enable_paging_features();
        info!("jumping to the kernel");
        switch_to_kernel(pml4, header.entry, boot_info_hhdm, stack.top)
    }
}

/// Supervisor write protection, NX and global pages. The kernel page
/// tables use the latter two.
unsafe fn enable_paging_features() {
    unsafe {
        Cr0::load_unsafe().with_wp(true).store_unsafe();
        Efer::load_unsafe().with_nxe(true).store_unsafe();
        Cr4::load_unsafe().with_pge(true).store_unsafe();
    }
}

/// Load the kernel's `CR3` and stack, then jump to `entry` with
/// `boot_info` in `RDI`. Runs from an identity-mapped page.
#[inline(never)]
unsafe fn switch_to_kernel(
    pml4: PhysicalAddress,
    entry: VirtualAddress,
    boot_info: VirtualAddress,
    stack_top: VirtualAddress,
) -> ! {
    unsafe {
        core::arch::asm!(
            "cli",
            "mov rsp, rdx",
            "mov cr3, rdi",
            "mov rdi, r8",
            "and rsp, -16",
            // rsp % 16 == 8 at entry, as after a call
            "push 0",
            "jmp rsi",
            in("rdi") pml4.as_u64(),
            in("rsi") entry.as_u64(),
            in("rdx") stack_top.as_u64(),
            in("r8") boot_info.as_u64(),
            options(noreturn)
        )
    }
}
