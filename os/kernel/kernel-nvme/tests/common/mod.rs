//! A tiny in-memory NVMe controller.
//!
//! Doorbell writes are serviced synchronously: commands are executed against
//! a byte vector and their completions posted before `write32` returns. The
//! driver still only observes them once `handle_interrupt` runs, which the
//! tests do from the `yield_now` hook.

#![allow(dead_code)]

use kernel_memory_addresses::PhysicalAddress;
use kernel_mm::test_util::TestPhysMemory;
use kernel_mm::{PageAllocator, PhysMapper};
use kernel_nvme::{
    CompletionEntry, DmaPage, NvmeDevice, NvmeError, NvmeHost, NvmeRegisters, QUEUE_SIZE,
    SubmissionEntry, reg,
};
use kernel_pci::{ConfigSpace, PciAddress, PciDevice};
use std::sync::Mutex;

pub const BLOCK_SIZE: usize = 512;

#[derive(Default)]
struct Queue {
    base: u64,
    head: usize,
}

#[derive(Default)]
struct CompletionQueue {
    base: u64,
    tail: usize,
    phase: bool,
}

#[derive(Default)]
struct State {
    cc: u32,
    csts: u32,
    asq: Queue,
    acq: CompletionQueue,
    iosq: Queue,
    iocq: CompletionQueue,
    /// Every command the controller executed, in order.
    log: Vec<SubmissionEntry>,
}

pub struct FakeController {
    mem: &'static TestPhysMemory,
    disk: Mutex<Vec<u8>>,
    state: Mutex<State>,
    /// Block size exponent reported by identify namespace.
    lbads: u8,
}

impl FakeController {
    pub fn new(mem: &'static TestPhysMemory, disk: Vec<u8>) -> Self {
        assert_eq!(disk.len() % BLOCK_SIZE, 0);
        Self {
            mem,
            disk: Mutex::new(disk),
            state: Mutex::new(State::default()),
            lbads: 9,
        }
    }

    pub fn with_lbads(mut self, lbads: u8) -> Self {
        self.lbads = lbads;
        self
    }

    pub fn disk(&self) -> Vec<u8> {
        self.disk.lock().unwrap().clone()
    }

    pub fn opcodes(&self, io: bool) -> Vec<u8> {
        let state = self.state.lock().unwrap();
        state
            .log
            .iter()
            .filter(|e| (e.nsid == 1 && e.cdw0 & 0xFF != 6) == io)
            .map(SubmissionEntry::opcode)
            .collect()
    }

    fn page(&self, pa: u64) -> &'static mut [u8] {
        unsafe { self.mem.page_bytes(PhysicalAddress::new(pa)) }
    }

    fn ring(&self, state: &mut State, io: bool, tail: usize) {
        loop {
            let sq = if io { &mut state.iosq } else { &mut state.asq };
            if sq.head == tail {
                break;
            }
            let entry = unsafe {
                (self.mem.phys_to_ptr(PhysicalAddress::new(sq.base)) as *const SubmissionEntry)
                    .add(sq.head)
                    .read()
            };
            sq.head = (sq.head + 1) % QUEUE_SIZE;
            let sq_head = sq.head as u16;

            let status = if io {
                self.io_command(&entry)
            } else {
                self.admin_command(state, &entry)
            };
            state.log.push(entry);

            let cq = if io { &mut state.iocq } else { &mut state.acq };
            let completion = CompletionEntry {
                sq_head,
                sq_id: u16::from(io),
                command_id: entry.command_id(),
                status: (status << 1) | u16::from(!cq.phase),
                ..CompletionEntry::default()
            };
            unsafe {
                (self.mem.phys_to_ptr(PhysicalAddress::new(cq.base)) as *mut CompletionEntry)
                    .add(cq.tail)
                    .write(completion);
            }
            cq.tail += 1;
            if cq.tail == QUEUE_SIZE {
                cq.tail = 0;
                cq.phase = !cq.phase;
            }
        }
    }

    fn admin_command(&self, state: &mut State, entry: &SubmissionEntry) -> u16 {
        match entry.opcode() {
            // identify
            0x06 => {
                let page = self.page(entry.prp1);
                page.fill(0);
                if entry.cdw10 == 1 {
                    page[111] = 1;
                    page[512] = 0x66;
                    page[513] = 0x44;
                } else {
                    let blocks = (self.disk.lock().unwrap().len() / BLOCK_SIZE) as u64;
                    page[0..8].copy_from_slice(&blocks.to_le_bytes());
                    page[26] = 0;
                    page[128..132].copy_from_slice(&(u32::from(self.lbads) << 16).to_le_bytes());
                }
                0
            }
            0x05 => {
                state.iocq.base = entry.prp1;
                0
            }
            0x01 => {
                state.iosq.base = entry.prp1;
                0
            }
            // invalid opcode
            _ => 1,
        }
    }

    fn io_command(&self, entry: &SubmissionEntry) -> u16 {
        let lba = u64::from(entry.cdw10) | (u64::from(entry.cdw11) << 32);
        let start = lba as usize * BLOCK_SIZE;
        let len = (entry.cdw12 as usize + 1) * BLOCK_SIZE;
        let mut disk = self.disk.lock().unwrap();
        if start + len > disk.len() {
            // LBA out of range
            return 0x80;
        }
        let page = self.page(entry.prp1);
        match entry.opcode() {
            0x02 => page[..len].copy_from_slice(&disk[start..start + len]),
            0x01 => disk[start..start + len].copy_from_slice(&page[..len]),
            _ => return 1,
        }
        0
    }
}

impl NvmeRegisters for FakeController {
    fn read32(&self, offset: usize) -> u32 {
        let state = self.state.lock().unwrap();
        match offset {
            // MQES = 63
            reg::CAP => 63,
            reg::VS => 0x0001_0400,
            reg::CC => state.cc,
            reg::CSTS => state.csts,
            _ => 0,
        }
    }

    fn write32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock().unwrap();
        match offset {
            reg::CC => {
                state.cc = value;
                state.csts = value & reg::CC_ENABLE;
                if value & reg::CC_ENABLE == 0 {
                    state.asq.head = 0;
                    state.acq.tail = 0;
                }
            }
            reg::ASQ => state.asq.base = (state.asq.base & !0xFFFF_FFFF) | u64::from(value),
            o if o == reg::ASQ + 4 => {
                state.asq.base = (state.asq.base & 0xFFFF_FFFF) | (u64::from(value) << 32);
            }
            reg::ACQ => state.acq.base = (state.acq.base & !0xFFFF_FFFF) | u64::from(value),
            o if o == reg::ACQ + 4 => {
                state.acq.base = (state.acq.base & 0xFFFF_FFFF) | (u64::from(value) << 32);
            }
            o if o == reg::sq_tail_doorbell(0, 0) => self.ring(&mut state, false, value as usize),
            o if o == reg::sq_tail_doorbell(1, 0) => self.ring(&mut state, true, value as usize),
            _ => {}
        }
    }
}

/// Hands out DMA pages from fake RAM through the real page allocator.
pub struct TestHost {
    mem: &'static TestPhysMemory,
    frames: Mutex<PageAllocator>,
}

impl TestHost {
    pub fn new(mem: &'static TestPhysMemory) -> Self {
        let frames = unsafe { PageAllocator::new_in_region(mem, mem.phys_base(), mem.len()) };
        Self {
            mem,
            frames: Mutex::new(frames),
        }
    }

    pub fn used_pages(&self) -> usize {
        self.frames.lock().unwrap().used_pages()
    }
}

impl NvmeHost for TestHost {
    fn alloc_dma_page(&self) -> Option<DmaPage> {
        let pa = self.frames.lock().unwrap().try_alloc(1).ok()?;
        self.mem.zero_page(pa);
        Some(DmaPage::new(pa, self.mem.phys_to_ptr(pa)))
    }

    fn free_dma_page(&self, page: DmaPage) {
        self.frames.lock().unwrap().free(page.phys, 1);
    }
}

pub struct NoConfig;

impl ConfigSpace for NoConfig {
    fn read_u32(&self, _addr: PciAddress, _offset: u8) -> u32 {
        0
    }
    fn write_u32(&self, _addr: PciAddress, _offset: u8, _value: u32) {}
}

pub fn pci_function() -> PciDevice {
    PciDevice {
        address: PciAddress {
            bus: 0,
            slot: 4,
            function: 0,
        },
        vendor_id: 0x1B36,
        device_id: 0x0010,
        class_code: 1,
        subclass: 8,
        prog_if: 2,
        mmio_phys_base: PhysicalAddress::new(0xFEBD_0000),
        mmio_size: 0x4000,
        mmio_virt_base: 0,
        interrupt_line: 11,
    }
}

/// A probed device over `disk`. The controller is shared with the device.
pub fn probed(disk: Vec<u8>) -> (&'static NvmeDevice, &'static FakeController, TestHost) {
    let (dev, controller, host, result) = probe_with(|mem| FakeController::new(mem, disk));
    result.expect("probe");
    (dev, controller, host)
}

/// Run the second probe phase against the controller built by `make`.
pub fn probe_with(
    make: impl FnOnce(&'static TestPhysMemory) -> FakeController,
) -> (
    &'static NvmeDevice,
    &'static FakeController,
    TestHost,
    Result<(), NvmeError>,
) {
    let mem = TestPhysMemory::leak(64);
    let controller: &'static FakeController = Box::leak(Box::new(make(mem)));
    let host = TestHost::new(mem);
    let dev: &'static NvmeDevice =
        Box::leak(Box::new(NvmeDevice::new(0, pci_function(), Box::new(SharedRegs(controller)))));
    let result = dev.probe_2(&NoConfig, &host, &mut || dev.handle_interrupt());
    (dev, controller, host, result)
}

struct SharedRegs(&'static FakeController);

impl NvmeRegisters for SharedRegs {
    fn read32(&self, offset: usize) -> u32 {
        self.0.read32(offset)
    }
    fn write32(&self, offset: usize, value: u32) {
        self.0.write32(offset, value);
    }
}

/// A zeroed disk of `bytes` with a GPT describing `(first, last, name)`
/// partitions in entry positions 0, 1, ...
pub fn gpt_disk(bytes: usize, partitions: &[(u64, u64, &str)]) -> Vec<u8> {
    let mut disk = vec![0u8; bytes];
    disk[0x200..0x208].copy_from_slice(b"EFI PART");
    disk[0x250..0x254].copy_from_slice(&128u32.to_le_bytes());
    disk[0x254..0x258].copy_from_slice(&128u32.to_le_bytes());
    for (i, (first, last, name)) in partitions.iter().enumerate() {
        let e = 0x400 + i * 128;
        disk[e..e + 4].copy_from_slice(&0x0FC6_3DAFu32.to_le_bytes());
        disk[e + 0x20..e + 0x28].copy_from_slice(&first.to_le_bytes());
        disk[e + 0x28..e + 0x30].copy_from_slice(&last.to_le_bytes());
        for (j, c) in name.bytes().enumerate() {
            disk[e + 0x38 + 2 * j] = c;
        }
    }
    disk
}
