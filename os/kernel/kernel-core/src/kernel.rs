use crate::keyboard::Keyboard;
use crate::tty::Tty;
use crate::{Platform, Scheduler, TTY_COUNT};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use kernel_mm::{DevicePageAllocator, PageAllocator, PhysMapper};
use kernel_nvme::NvmeDevice;
use kernel_pci::{ConfigSpace, PciDevice};
use kernel_sync::{SpinLock, SpinLockGuard};
use kernel_vfs::Vfs;

/// Process-wide kernel state.
///
/// Lock order: `vfs`, then `sched`, then `frames`. The scheduler lock is
/// never held across a context switch, and nothing allocates heap memory
/// while holding `frames`.
pub struct Kernel {
    pub(crate) platform: &'static dyn Platform,
    pub(crate) mapper: &'static dyn PhysMapper,
    pub(crate) frames: &'static SpinLock<PageAllocator>,
    pub(crate) config: &'static (dyn ConfigSpace + Sync),
    pub(crate) sched: SpinLock<Scheduler>,
    pub(crate) vfs: SpinLock<Vfs>,
    pub(crate) ttys: [Tty; TTY_COUNT],
    pub(crate) active_tty: AtomicUsize,
    /// Only touched by the keyboard interrupt.
    pub(crate) keyboard: SpinLock<Keyboard>,
    pub(crate) pci: SpinLock<Vec<PciDevice>>,
    /// Shared with the NVMe interrupt handler.
    pub(crate) nvme: SpinLock<Vec<&'static NvmeDevice>>,
    pub(crate) device_pages: SpinLock<DevicePageAllocator>,
}

impl Kernel {
    /// A kernel with no tasks, an empty root filesystem and no devices.
    ///
    /// The kernel heap must already be usable.
    #[must_use]
    pub fn new(
        platform: &'static dyn Platform,
        mapper: &'static dyn PhysMapper,
        frames: &'static SpinLock<PageAllocator>,
        config: &'static (dyn ConfigSpace + Sync),
    ) -> Self {
        Self {
            platform,
            mapper,
            frames,
            config,
            sched: SpinLock::new(Scheduler::new()),
            vfs: SpinLock::new(Vfs::new()),
            ttys: core::array::from_fn(|_| Tty::new()),
            active_tty: AtomicUsize::new(0),
            keyboard: SpinLock::new(Keyboard::new()),
            pci: SpinLock::new(Vec::new()),
            nvme: SpinLock::new(Vec::new()),
            device_pages: SpinLock::new(DevicePageAllocator::new()),
        }
    }

    /// Lock the VFS, yielding to other tasks while someone else holds it.
    ///
    /// Filesystem operations may wait on NVMe commands with the lock held;
    /// spinning here would starve the holder.
    pub(crate) fn lock_vfs(&self) -> SpinLockGuard<'_, Vfs> {
        loop {
            if let Some(vfs) = self.vfs.try_lock() {
                return vfs;
            }
            self.yield_now();
        }
    }

    /// Run `f` on the filesystem tree.
    pub fn with_vfs<R>(&self, f: impl FnOnce(&mut Vfs) -> R) -> R {
        f(&mut self.lock_vfs())
    }

    /// Console `index` (0 for `/dev/tty1`).
    ///
    /// # Panics
    /// If `index` is not below [`TTY_COUNT`].
    #[must_use]
    pub fn tty(&self, index: usize) -> &Tty {
        &self.ttys[index]
    }

    #[must_use]
    pub fn active_tty(&self) -> usize {
        self.active_tty.load(Ordering::Relaxed)
    }

    /// Write kernel messages to `/dev/tty1`.
    pub fn printk(&self, text: &str) {
        self.tty_write(0, text.as_bytes());
    }

    pub(crate) fn tty_write(&self, index: usize, bytes: &[u8]) -> usize {
        self.platform.console_output(index, bytes);
        self.ttys[index].write(bytes)
    }

    /// Frames in use and managed, for `/sys/meminfo`.
    #[must_use]
    pub fn memory_usage(&self) -> (usize, usize) {
        let frames = self.frames.lock_irq();
        (frames.used_pages(), frames.total_pages())
    }

    #[must_use]
    pub fn pci_devices(&self) -> Vec<PciDevice> {
        self.pci.lock_irq().clone()
    }

    #[must_use]
    pub fn nvme_devices(&self) -> Vec<&'static NvmeDevice> {
        self.nvme.lock_irq().clone()
    }
}
