//! # Kernel Boot Information

/// Kernel function pointer.
///
/// # ABI
/// System V: the loader passes the boot info pointer in `RDI`.
pub type KernelEntryFn = extern "sysv64" fn(*const KernelBootInfo) -> !;

/// Information the kernel needs right after `ExitBootServices`.
/// Keep this `#[repr(C)]` and prefer fixed-size integers at the ABI boundary.
#[repr(C)]
#[derive(Clone, Debug)]
pub struct KernelBootInfo {
    /// Memory map information.
    pub mmap: MemoryMapInfo,

    /// The initial ramdisk (ustar archive) loaded next to the kernel.
    pub initrd: InitrdInfo,
}

#[repr(C)]
#[derive(Clone, Debug)]
pub struct MemoryMapInfo {
    /// Physical address of the raw UEFI memory map buffer
    /// (array of `EFI_MEMORY_DESCRIPTOR` bytes).
    pub mmap_ptr: u64,

    /// Length of the memory map buffer in **bytes**.
    pub mmap_len: u64,

    /// Size of a single memory descriptor in bytes. May exceed
    /// `size_of::<MemoryDescriptor>()`; always step by this value.
    pub mmap_desc_size: u64,

    /// Descriptor version (from UEFI).
    pub mmap_desc_version: u32,
}

#[repr(C)]
#[derive(Clone, Debug, Default)]
pub struct InitrdInfo {
    /// Physical address of the archive. `0` when no ramdisk was found.
    pub initrd_ptr: u64,

    /// Archive length in bytes.
    pub initrd_len: u64,
}

/// Prefix of an `EFI_MEMORY_DESCRIPTOR` as laid out by the firmware.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MemoryDescriptor {
    pub ty: u32,
    pub _pad: u32,
    pub phys_start: u64,
    pub virt_start: u64,
    pub page_count: u64,
    pub attribute: u64,
}

/// `EfiConventionalMemory`: free RAM after `ExitBootServices`.
pub const EFI_CONVENTIONAL_MEMORY: u32 = 7;
