use alloc::boxed::Box;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_nvme::NvmeRegisters;
use kernel_pci::PciDevice;

/// CPU and board services the kernel core relies on.
///
/// Implemented by the kernel binary on real hardware and by a recording
/// fake in tests.
pub trait Platform: Sync {
    /// Push the callee-saved registers, store the stack pointer to `*save`,
    /// load `load` as the new stack pointer, pop the callee-saved registers
    /// and return on the new stack.
    ///
    /// # Safety
    /// `save` must be valid for a write and `load` must point at a stack
    /// image prepared by this crate or by a previous `switch`.
    unsafe fn switch(&self, save: *mut u64, load: u64);

    /// Enable interrupts and halt until one arrives.
    fn halt_until_interrupt(&self);

    /// Timer ticks since boot (100 Hz).
    fn ticks(&self) -> u64;

    /// Address of the code that pops a [`TrapFrame`](crate::TrapFrame) and
    /// returns to user mode.
    fn user_return_trampoline(&self) -> u64;

    /// Address of the code that pops an entry point and calls it with
    /// interrupts enabled.
    fn kernel_task_trampoline(&self) -> u64;

    /// The PML4 every address space copies its kernel half from.
    fn kernel_root(&self) -> PhysicalAddress;

    /// Make `rsp0` the stack the CPU switches to on a trap from user mode.
    fn set_kernel_stack(&self, rsp0: u64);

    /// Activate the address space rooted at `root`.
    fn load_address_space(&self, root: PhysicalAddress);

    /// Drop stale translations of the active address space.
    fn flush_tlb(&self);

    /// Mirror console output (e.g. to the QEMU debug port).
    fn console_output(&self, tty: usize, bytes: &[u8]);

    /// Register access for an NVMe controller whose BAR0 the kernel mapped
    /// at `window`.
    fn nvme_registers(&self, pci: &PciDevice, window: VirtualAddress) -> Box<dyn NvmeRegisters>;
}
