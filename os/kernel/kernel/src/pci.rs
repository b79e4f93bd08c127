//! PCI configuration mechanism #1.

use crate::ports::{inl, outl};
use kernel_pci::{ConfigSpace, PciAddress, config_address};
use kernel_sync::SpinLock;

const CONFIG_ADDRESS: u16 = 0xCF8;
const CONFIG_DATA: u16 = 0xCFC;

/// Configuration space through the `0xCF8`/`0xCFC` port pair. The pair is
/// a two-step protocol, hence the lock.
pub struct PortConfigSpace {
    lock: SpinLock<()>,
}

impl PortConfigSpace {
    pub const fn new() -> Self {
        Self {
            lock: SpinLock::new(()),
        }
    }
}

impl ConfigSpace for PortConfigSpace {
    fn read_u32(&self, addr: PciAddress, offset: u8) -> u32 {
        let _guard = self.lock.lock_irq();
        unsafe {
            outl(CONFIG_ADDRESS, config_address(addr, offset));
            inl(CONFIG_DATA)
        }
    }

    fn write_u32(&self, addr: PciAddress, offset: u8, value: u32) {
        let _guard = self.lock.lock_irq();
        unsafe {
            outl(CONFIG_ADDRESS, config_address(addr, offset));
            outl(CONFIG_DATA, value);
        }
    }
}
