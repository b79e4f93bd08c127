use kernel_memory_addresses::VirtualAddress;

/// Controller register offsets.
pub mod reg {
    /// Controller capabilities (64-bit).
    pub const CAP: usize = 0x00;
    /// Version.
    pub const VS: usize = 0x08;
    /// Controller configuration.
    pub const CC: usize = 0x14;
    /// Controller status.
    pub const CSTS: usize = 0x1C;
    /// Admin queue attributes.
    pub const AQA: usize = 0x24;
    /// Admin submission queue base (64-bit).
    pub const ASQ: usize = 0x28;
    /// Admin completion queue base (64-bit).
    pub const ACQ: usize = 0x30;
    /// First doorbell register.
    pub const DOORBELL_BASE: usize = 0x1000;

    pub const CC_ENABLE: u32 = 1;
    pub const CSTS_READY: u32 = 1;

    /// Offset of the submission tail doorbell of queue `qid`.
    #[must_use]
    pub const fn sq_tail_doorbell(qid: usize, dstrd: u8) -> usize {
        DOORBELL_BASE + (2 * qid) * (4 << dstrd)
    }

    /// Offset of the completion head doorbell of queue `qid`.
    #[must_use]
    pub const fn cq_head_doorbell(qid: usize, dstrd: u8) -> usize {
        DOORBELL_BASE + (2 * qid + 1) * (4 << dstrd)
    }
}

/// Access to a controller's register file.
pub trait NvmeRegisters: Send + Sync {
    fn read32(&self, offset: usize) -> u32;
    fn write32(&self, offset: usize, value: u32);

    fn read64(&self, offset: usize) -> u64 {
        u64::from(self.read32(offset)) | (u64::from(self.read32(offset + 4)) << 32)
    }

    fn write64(&self, offset: usize, value: u64) {
        self.write32(offset, value as u32);
        self.write32(offset + 4, (value >> 32) as u32);
    }
}

/// Registers behind an uncached BAR mapping.
#[derive(Debug)]
pub struct MmioRegisters {
    base: usize,
}

impl MmioRegisters {
    /// # Safety
    /// `base` must map the controller's BAR0 uncached for as long as the
    /// value lives.
    #[must_use]
    pub const unsafe fn new(base: VirtualAddress) -> Self {
        Self {
            base: base.as_u64() as usize,
        }
    }
}

impl NvmeRegisters for MmioRegisters {
    fn read32(&self, offset: usize) -> u32 {
        unsafe { core::ptr::read_volatile((self.base + offset) as *const u32) }
    }

    fn write32(&self, offset: usize, value: u32) {
        unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) };
    }
}
