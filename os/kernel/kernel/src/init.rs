//! Kernel entry and boot sequence.
//!
//! ```text
//! _start_kernel            (boot stack, interrupts off)
//!  └─ kernel_entry_on_boot_stack
//!      ├─ logger, GDT/TSS, IDT, PIC, PIT
//!      ├─ page allocator from the UEFI memory map, kernel heap
//!      ├─ Kernel: /dev nodes, initrd into the root ramfs, PCI scan
//!      ├─ spawn init (pid 1) and kt-hw-init
//!      └─ enter init; the boot stack is abandoned
//! ```

use crate::memory::{MAPPER, init_frames};
use crate::pci::PortConfigSpace;
use crate::platform::X86Platform;
use crate::{HEAP, KERNEL, gdt, halt_forever, interrupts, kernel, pic, pit};
use alloc::boxed::Box;
use kernel_core::Kernel;
use kernel_info::boot::{InitrdInfo, KernelBootInfo};
use kernel_info::memory::{BOOT_STACK_SIZE, HHDM_BASE};
use kernel_qemu::QemuLogger;
use log::{LevelFilter, debug, error, info, warn};

/// 16-byte aligned backing store for the boot stack.
#[repr(align(16))]
struct Aligned16<const N: usize>([u8; N]);

/// The stack `_start_kernel` switches to. Used until the first task runs.
#[unsafe(link_section = ".bss.boot")]
#[unsafe(no_mangle)]
static mut BOOT_STACK: Aligned16<BOOT_STACK_SIZE> = Aligned16([0; BOOT_STACK_SIZE]);

static PCI_CONFIG: PortConfigSpace = PortConfigSpace::new();

/// The kernel entry point the UEFI loader jumps to after
/// `ExitBootServices`, with the boot info pointer in `RDI` (SysV).
///
/// Naked so that no prologue touches the loader's stack before we
/// replace it.
#[unsafe(no_mangle)]
#[unsafe(naked)]
pub extern "C" fn _start_kernel(_boot_info: *const KernelBootInfo) {
    core::arch::naked_asm!(
        "cli",
        "mov r12, rdi",
        "lea rax, [rip + {stack_sym}]",
        "add rax, {stack_size}",
        "and rax, -16",
        "mov rsp, rax",
        // fake return address: rsp % 16 == 8 on entry, as after a call
        "push 0",
        "xor rbp, rbp",
        "mov rdi, r12",
        "jmp {rust_entry}",
        stack_sym = sym BOOT_STACK,
        stack_size = const BOOT_STACK_SIZE,
        rust_entry = sym kernel_entry_on_boot_stack,
    );
}

extern "C" fn kernel_entry_on_boot_stack(boot_info: *const KernelBootInfo) -> ! {
    if QemuLogger::new(LevelFilter::Debug).init().is_err() {
        halt_forever();
    }
    info!("Kernel reporting to QEMU");

    let boot_info = unsafe { &*boot_info };

    unsafe {
        gdt::init();
        interrupts::init();
        pic::remap();
        pit::init();
    }
    debug!("PIC masks {:02x?}", pic::masks());
    info!("descriptor tables and interrupt controllers ready");

    let frames = init_frames(&boot_info.mmap);
    HEAP.init(&MAPPER, frames);
    info!("kernel heap ready");

    let platform: &'static X86Platform = Box::leak(Box::new(X86Platform::from_current_cr3()));
    let kernel = KERNEL.get_or_init(|| Kernel::new(platform, &MAPPER, frames, &PCI_CONFIG));

    kernel.populate_dev();
    match initrd_bytes(&boot_info.initrd) {
        Some(archive) => {
            if let Err(e) = kernel.extract_initrd(archive) {
                error!("initrd: {e}");
            }
        }
        None => warn!("no initrd"),
    }
    kernel.probe_pci();

    let init = match kernel.spawn_init("/bin/init") {
        Ok(pid) => pid,
        Err(e) => panic!("init binary not found: {e}"),
    };
    if let Err(e) = kernel.spawn_kernel_task("kt-hw-init", hw_init_task as usize as u64) {
        error!("kt-hw-init: {e}");
    }

    info!("entering init");
    kernel.enter(init);
    halt_forever();
}

/// The initrd through the HHDM.
fn initrd_bytes(initrd: &InitrdInfo) -> Option<&'static [u8]> {
    if initrd.initrd_ptr == 0 || initrd.initrd_len == 0 {
        return None;
    }
    let ptr = (HHDM_BASE + initrd.initrd_ptr) as *const u8;
    Some(unsafe { core::slice::from_raw_parts(ptr, initrd.initrd_len as usize) })
}

/// Bring up the NVMe controllers from task context, where waiting for a
/// command yields instead of spinning, then stay out of the way.
extern "C" fn hw_init_task() -> ! {
    let Some(kernel) = kernel() else {
        halt_forever();
    };
    kernel.hw_init();
    info!("hardware initialization done");
    loop {
        kernel.yield_now();
    }
}
