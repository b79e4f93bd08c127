//! # PCI Enumeration
//!
//! Brute-force scan of PCI configuration space through a [`ConfigSpace`]
//! accessor. The kernel implements the accessor with configuration
//! mechanism #1 (ports `0xCF8`/`0xCFC`); tests supply a table of fake
//! functions.
//!
//! For every present function the scan records identity, class triple,
//! BAR0 base and size, and the legacy interrupt line.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::cast_possible_truncation)]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt;
use kernel_memory_addresses::PhysicalAddress;
use log::{debug, warn};

/// Upper bound on recorded devices.
pub const MAX_PCI_DEVICES: usize = 1024;

/// Mass storage controller.
pub const CLASS_MASS_STORAGE: u8 = 0x01;
/// Non-volatile memory controller (NVMe) within [`CLASS_MASS_STORAGE`].
pub const SUBCLASS_NVM: u8 = 0x08;

const REG_ID: u8 = 0x00;
const REG_COMMAND: u8 = 0x04;
const REG_CLASS: u8 = 0x08;
const REG_BAR0: u8 = 0x10;
const REG_BAR1: u8 = 0x14;
const REG_INTERRUPT: u8 = 0x3C;

const COMMAND_MEMORY_SPACE: u32 = 1 << 1;
const COMMAND_BUS_MASTER: u32 = 1 << 2;
const COMMAND_INTERRUPT_DISABLE: u32 = 1 << 10;

/// Bus/slot/function triple.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PciAddress {
    pub bus: u8,
    pub slot: u8,
    pub function: u8,
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{:02x}", self.bus, self.slot, self.function)
    }
}

/// Dword access to configuration space. `offset` is a multiple of 4.
pub trait ConfigSpace {
    fn read_u32(&self, addr: PciAddress, offset: u8) -> u32;
    fn write_u32(&self, addr: PciAddress, offset: u8, value: u32);
}

/// The mechanism #1 address dword selecting `offset` of `addr`.
#[must_use]
pub const fn config_address(addr: PciAddress, offset: u8) -> u32 {
    0x8000_0000
        | (addr.bus as u32) << 16
        | (addr.slot as u32) << 11
        | (addr.function as u32) << 8
        | (offset & 0xFC) as u32
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PciDevice {
    pub address: PciAddress,
    pub vendor_id: u16,
    pub device_id: u16,
    pub class_code: u8,
    pub subclass: u8,
    pub prog_if: u8,
    /// BAR0 memory base.
    pub mmio_phys_base: PhysicalAddress,
    /// BAR0 size in bytes, 0 if BAR0 is unused.
    pub mmio_size: u32,
    /// Where a driver mapped BAR0, 0 until then.
    pub mmio_virt_base: u64,
    pub interrupt_line: u8,
}

impl PciDevice {
    #[must_use]
    pub const fn is_nvme(&self) -> bool {
        self.class_code == CLASS_MASS_STORAGE && self.subclass == SUBCLASS_NVM
    }
}

/// The `/sys/pciinfo` line for this device, without the newline.
impl fmt::Display for PciDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pci({} d={:04x}:{:04x} c={:02x}:{:02x}:{:02x} mb={:016x} ms={:08x} bb={:016x} il={:02x})",
            self.address,
            self.vendor_id,
            self.device_id,
            self.class_code,
            self.subclass,
            self.prog_if,
            self.mmio_phys_base.as_u64(),
            self.mmio_size,
            self.mmio_virt_base,
            self.interrupt_line
        )
    }
}

/// Enumerate buses 0..255, slots 0..32, functions 0..8.
///
/// Functions whose BAR0 is neither a 32- nor a 64-bit memory BAR are skipped.
/// Probing the BAR size writes all ones to BAR0 and restores it afterwards.
pub fn scan(config: &dyn ConfigSpace) -> Vec<PciDevice> {
    let mut devices = Vec::new();
    for bus in 0..255u8 {
        for slot in 0..32u8 {
            for function in 0..8u8 {
                let address = PciAddress {
                    bus,
                    slot,
                    function,
                };
                if let Some(device) = probe_function(config, address) {
                    debug!("pci: {device}");
                    devices.push(device);
                    if devices.len() == MAX_PCI_DEVICES {
                        return devices;
                    }
                }
            }
        }
    }
    devices
}

fn probe_function(config: &dyn ConfigSpace, address: PciAddress) -> Option<PciDevice> {
    let id = config.read_u32(address, REG_ID);
    let vendor_id = id as u16;
    if vendor_id == 0xFFFF {
        return None;
    }
    let class = config.read_u32(address, REG_CLASS);
    let bar0 = config.read_u32(address, REG_BAR0);
    let bar1 = config.read_u32(address, REG_BAR1);

    let mmio_phys_base = match (bar0 & 0x7) >> 1 {
        0 => u64::from(bar0 & 0xFFFF_FFF0),
        2 => (u64::from(bar1) << 32) + u64::from(bar0 & 0xFFFF_FFF0),
        _ => {
            warn!("pci {address}: unsupported BAR type");
            return None;
        }
    };

    let mut mmio_size = 0;
    if mmio_phys_base != 0 {
        config.write_u32(address, REG_BAR0, 0xFFFF_FFFF);
        let mask = config.read_u32(address, REG_BAR0) & 0xFFFF_F000;
        config.write_u32(address, REG_BAR0, bar0);
        mmio_size = (!mask).wrapping_add(1);
    }

    Some(PciDevice {
        address,
        vendor_id,
        device_id: (id >> 16) as u16,
        class_code: (class >> 24) as u8,
        subclass: (class >> 16) as u8,
        prog_if: (class >> 8) as u8,
        mmio_phys_base: PhysicalAddress::new(mmio_phys_base),
        mmio_size,
        mmio_virt_base: 0,
        interrupt_line: config.read_u32(address, REG_INTERRUPT) as u8,
    })
}

/// Enable memory decoding and bus mastering and unmask legacy interrupts.
pub fn enable_bus_master(config: &dyn ConfigSpace, address: PciAddress) {
    let mut command = config.read_u32(address, REG_COMMAND);
    command |= COMMAND_MEMORY_SPACE | COMMAND_BUS_MASTER;
    command &= !COMMAND_INTERRUPT_DISABLE;
    config.write_u32(address, REG_COMMAND, command);
}
