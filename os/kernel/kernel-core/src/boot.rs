//! Boot-time population of `/dev`, PCI enumeration, initrd extraction and
//! the deferred NVMe bring-up run by the `kt-hw-init` task.

use crate::{Kernel, TTY_COUNT};
use alloc::boxed::Box;
use alloc::format;
use alloc::vec::Vec;
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, pages_for};
use kernel_mm::paging::set_page_mapping;
use kernel_nvme::{MAX_NVME_DEVICES, NvmeDevice};
use kernel_pci::PciDevice;
use kernel_vfs::{DeviceId, ExtractError};
use log::{info, warn};

impl Kernel {
    /// Create `/dev/tty1` to `/dev/tty3` and `/dev/zero`.
    pub fn populate_dev(&self) {
        let mut vfs = self.lock_vfs();
        let dev = vfs.dev_dir();
        for n in 0..TTY_COUNT {
            let name = format!("tty{}", n + 1);
            if let Err(e) = vfs.mknod(dev, &name, DeviceId::Tty(n as u8)) {
                warn!("/dev/{name}: {e}");
            }
        }
        if let Err(e) = vfs.mknod(dev, "zero", DeviceId::Zero) {
            warn!("/dev/zero: {e}");
        }
    }

    /// Unpack the boot archive into the root filesystem.
    ///
    /// # Errors
    /// A malformed archive or a member that cannot be placed.
    pub fn extract_initrd(&self, archive: &[u8]) -> Result<usize, ExtractError> {
        let count = self.lock_vfs().extract_tar(archive, self)?;
        info!("initrd: {count} entries");
        Ok(count)
    }

    /// Enumerate the PCI bus, map the register window of every NVMe
    /// controller and register it as `/dev/nvme{N}`.
    ///
    /// Controllers are only reset and identified later, from task context,
    /// by [`hw_init`](Self::hw_init).
    pub fn probe_pci(&self) {
        let mut devices = kernel_pci::scan(self.config);
        info!("pci: {} functions", devices.len());

        let mut controllers = Vec::new();
        for pci in devices.iter_mut().filter(|d| d.is_nvme()) {
            if controllers.len() == MAX_NVME_DEVICES {
                warn!("nvme: ignoring {} and later controllers", pci.address);
                break;
            }
            let index = controllers.len() as u16;
            controllers.push(self.probe_nvme(index, pci));
        }

        *self.pci.lock_irq() = devices;
        self.nvme.lock_irq().extend(controllers.iter().copied());

        let mut vfs = self.lock_vfs();
        let dev = vfs.dev_dir();
        for controller in controllers {
            let index = controller.index();
            if let Err(e) = vfs.mknod(dev, &format!("nvme{index}"), DeviceId::Nvme(index)) {
                warn!("/dev/nvme{index}: {e}");
            }
        }
    }

    /// First bring-up phase: map BAR0 uncached into the kernel half and
    /// record the window in `pci`.
    fn probe_nvme(&self, index: u16, pci: &mut PciDevice) -> &'static NvmeDevice {
        let pages = pages_for(u64::from(pci.mmio_size)).max(1) as usize;
        let window = self.device_pages.lock_irq().alloc(pages);
        {
            let mut frames = self.frames.lock_irq();
            for page in 0..pages as u64 {
                set_page_mapping(
                    self.mapper,
                    &mut frames,
                    self.platform.kernel_root(),
                    window + page * PAGE_SIZE,
                    PhysicalAddress::new(pci.mmio_phys_base.as_u64() + page * PAGE_SIZE),
                    true,
                );
            }
        }
        self.platform.flush_tlb();

        pci.mmio_virt_base = window.as_u64();
        info!("nvme{index}: {} registers at {window:?}", pci.address);
        let regs = self.platform.nvme_registers(pci, window);
        Box::leak(Box::new(NvmeDevice::new(index, pci.clone(), regs)))
    }

    /// Second bring-up phase for every controller, then one
    /// `/dev/nvme{N}p{M}` node per partition. Task context only.
    pub fn hw_init(&self) {
        for controller in self.nvme_devices() {
            let index = controller.index();
            if let Err(e) = controller.probe_2(self.config, self, &mut || self.yield_now()) {
                warn!("nvme{index}: bring-up failed: {e}");
                continue;
            }
            let partitions = controller.partitions();
            info!("nvme{index}: {} partitions", partitions.len());

            let mut vfs = self.lock_vfs();
            let dev = vfs.dev_dir();
            for (position, part) in partitions.iter().enumerate() {
                let name = part.node_name(index);
                let id = DeviceId::NvmePartition {
                    device: index,
                    partition: position as u16,
                };
                if let Err(e) = vfs.mknod(dev, &name, id) {
                    warn!("/dev/{name}: {e}");
                }
            }
        }
    }
}
