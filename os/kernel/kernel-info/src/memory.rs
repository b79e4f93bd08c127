//! # Memory Layout

/// Base of the Higher Half Direct Map: physical address `pa` is visible
/// to the kernel at `HHDM_BASE + pa`.
pub const HHDM_BASE: u64 = 0xffff_8880_0000_0000;

/// Amount of physical memory the loader maps into the HHDM.
pub const HHDM_SIZE: u64 = 64 * 1024 * 1024 * 1024;

/// Where the kernel executes (VMA), matches the linker script.
///
/// # Kernel Build
/// This information is sourced in the kernel's `build.rs` to configure
/// the linker.
pub const KERNEL_BASE: u64 = 0xffff_ffff_8000_0000;

/// Where the kernel image bytes are placed in *physical* memory (LMA).
pub const PHYS_LOAD: u64 = 0x0010_0000; // 1 MiB

/// Start of the window handing out virtual addresses for MMIO mappings.
/// Never backed by RAM.
pub const DEVICE_PAGE_BASE: u64 = 0xffff_c000_0000_0000;

/// One past the highest user stack address; also the initial user `rsp`.
pub const USER_STACK_TOP: u64 = 0x0000_8000_0000_0000;

/// Lowest address of the fixed 1 MiB user stack range.
pub const USER_STACK_BOTTOM: u64 = 0x0000_7fff_fff0_0000;

/// Number of PML4 entries forming the user half of an address space.
pub const USER_PML4_ENTRIES: usize = 256;

/// Pages per task kernel stack.
pub const KERNEL_STACK_PAGES: usize = 2;

/// Bytes per task kernel stack.
pub const KERNEL_STACK_SIZE: usize = KERNEL_STACK_PAGES * 4096;

/// The size of the boot stack the kernel entry switches to.
pub const BOOT_STACK_SIZE: usize = 64 * 1024;

const _: () = {
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(BOOT_STACK_SIZE.is_multiple_of(16));
    assert!(HHDM_BASE >= USER_STACK_TOP);
    assert!(DEVICE_PAGE_BASE > HHDM_BASE + HHDM_SIZE);
    assert!(KERNEL_BASE > DEVICE_PAGE_BASE);
    assert!(USER_STACK_TOP - USER_STACK_BOTTOM == 1024 * 1024);
};
