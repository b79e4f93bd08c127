//! Device dispatch, DMA memory for the NVMe driver, sysfs rendering and
//! the keyboard and NVMe interrupt paths.

use crate::keyboard::KeyAction;
use crate::{Kernel, TTY_COUNT};
use alloc::string::String;
use core::fmt::Write;
use core::sync::atomic::Ordering;
use kernel_nvme::{DmaPage, NvmeDevice, NvmeError, NvmeHost};
use kernel_vfs::{DeviceError, DeviceId, DeviceOps, SysfsNode, SysfsSource, read_zero, write_zero};
use log::{info, warn};

fn io_error(e: NvmeError) -> DeviceError {
    warn!("nvme: {e}");
    DeviceError::Io
}

impl Kernel {
    fn nvme_device(&self, index: u16) -> Result<&'static NvmeDevice, DeviceError> {
        self.nvme
            .lock_irq()
            .get(usize::from(index))
            .copied()
            .ok_or(DeviceError::NoSuchDevice)
    }

    /// Block until `buf` is full of keyboard input for console `index`.
    pub(crate) fn tty_read(&self, index: usize, buf: &mut [u8]) -> usize {
        let tty = &self.ttys[index];
        let mut filled = 0;
        loop {
            filled += tty.drain_input(&mut buf[filled..]);
            if filled == buf.len() {
                return filled;
            }
            self.yield_now();
        }
    }

    /// Keyboard interrupt: decode `code` and feed the active console.
    pub fn handle_scancode(&self, code: u8) {
        let action = self.keyboard.lock().scancode(code);
        match action {
            Some(KeyAction::Key(event)) => self.ttys[self.active_tty()].push_key(event),
            Some(KeyAction::SwitchTty(index)) if index < TTY_COUNT => {
                self.active_tty.store(index, Ordering::Relaxed);
                info!("switched to tty{}", index + 1);
            }
            _ => {}
        }
    }

    /// NVMe interrupt on IRQ `line`: harvest completions of every
    /// controller wired to it.
    pub fn handle_nvme_interrupt(&self, line: u8) {
        for device in self.nvme.lock().iter() {
            if device.pci().interrupt_line == line {
                device.handle_interrupt();
            }
        }
    }
}

impl DeviceOps for Kernel {
    fn read(&self, device: DeviceId, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match device {
            DeviceId::Tty(n) if usize::from(n) < TTY_COUNT => Ok(self.tty_read(usize::from(n), buf)),
            DeviceId::Tty(_) => Err(DeviceError::NoSuchDevice),
            DeviceId::Zero => Ok(read_zero(buf)),
            DeviceId::Nvme(n) => self
                .nvme_device(n)?
                .read(self, offset, buf, &mut || self.yield_now())
                .map_err(io_error),
            DeviceId::NvmePartition { device, partition } => self
                .nvme_device(device)?
                .partition_read(self, usize::from(partition), offset, buf, &mut || self.yield_now())
                .map_err(io_error),
        }
    }

    fn write(&self, device: DeviceId, offset: u64, buf: &[u8]) -> Result<usize, DeviceError> {
        match device {
            DeviceId::Tty(n) if usize::from(n) < TTY_COUNT => Ok(self.tty_write(usize::from(n), buf)),
            DeviceId::Tty(_) => Err(DeviceError::NoSuchDevice),
            DeviceId::Zero => Ok(write_zero(buf)),
            DeviceId::Nvme(n) => self
                .nvme_device(n)?
                .write(self, offset, buf, &mut || self.yield_now())
                .map_err(io_error),
            DeviceId::NvmePartition { device, partition } => self
                .nvme_device(device)?
                .partition_write(self, usize::from(partition), offset, buf, &mut || self.yield_now())
                .map_err(io_error),
        }
    }
}

impl NvmeHost for Kernel {
    fn alloc_dma_page(&self) -> Option<DmaPage> {
        let pa = self.frames.lock_irq().try_alloc(1).ok()?;
        self.mapper.zero_page(pa);
        Some(DmaPage::new(pa, self.mapper.phys_to_ptr(pa)))
    }

    fn free_dma_page(&self, page: DmaPage) {
        self.frames.lock_irq().free(page.phys, 1);
    }
}

impl SysfsSource for Kernel {
    fn render(&self, node: SysfsNode, out: &mut String) {
        match node {
            SysfsNode::PciInfo => {
                for device in self.pci.lock_irq().iter() {
                    let _ = writeln!(out, "{device}");
                }
            }
            SysfsNode::Nvme => {
                for device in self.nvme_devices() {
                    let _ = writeln!(out, "{}", device.status());
                }
            }
            SysfsNode::MemInfo => {
                let (used, total) = self.memory_usage();
                let _ = write!(
                    out,
                    "total_memory_kib = {}\nused_memory_kib = {}\n",
                    total * 4,
                    used * 4
                );
            }
        }
    }
}
