//! The [`Platform`] the kernel core runs on: one x86-64 CPU, the PIT and
//! the QEMU debug port.

use crate::interrupts::syscall::user_return;
use crate::switch::{kernel_task_trampoline, switch_stacks};
use crate::{pit, tss};
use alloc::boxed::Box;
use kernel_core::Platform;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_nvme::{MmioRegisters, NvmeRegisters};
use kernel_pci::PciDevice;
use kernel_qemu::qemu_fmt::dbg_write_bytes;
use kernel_registers::{Cr3, LoadRegisterUnsafe, StoreRegisterUnsafe};

pub struct X86Platform {
    kernel_root: PhysicalAddress,
}

impl X86Platform {
    /// Adopt the page tables that are active now as the kernel's.
    pub fn from_current_cr3() -> Self {
        Self {
            kernel_root: read_cr3(),
        }
    }
}

fn read_cr3() -> PhysicalAddress {
    unsafe { Cr3::load_unsafe() }.root()
}

impl Platform for X86Platform {
    unsafe fn switch(&self, save: *mut u64, load: u64) {
        unsafe { switch_stacks(save, load) };
    }

    fn halt_until_interrupt(&self) {
        unsafe {
            core::arch::asm!("sti", "hlt", "cli", options(nomem, nostack));
        }
    }

    fn ticks(&self) -> u64 {
        pit::ticks()
    }

    fn user_return_trampoline(&self) -> u64 {
        user_return as usize as u64
    }

    fn kernel_task_trampoline(&self) -> u64 {
        kernel_task_trampoline as usize as u64
    }

    fn kernel_root(&self) -> PhysicalAddress {
        self.kernel_root
    }

    fn set_kernel_stack(&self, rsp0: u64) {
        tss::set_rsp0(rsp0);
    }

    fn load_address_space(&self, root: PhysicalAddress) {
        if read_cr3() == root {
            return;
        }
        unsafe { Cr3::from_root(root).store_unsafe() };
    }

    fn flush_tlb(&self) {
        unsafe {
            let cr3 = Cr3::load_unsafe();
            cr3.store_unsafe();
        }
    }

    fn console_output(&self, _tty: usize, bytes: &[u8]) {
        dbg_write_bytes(bytes);
    }

    fn nvme_registers(&self, _pci: &PciDevice, window: VirtualAddress) -> Box<dyn NvmeRegisters> {
        Box::new(unsafe { MmioRegisters::new(window) })
    }
}
