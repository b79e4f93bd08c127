//! A kernel on fake hardware.
//!
//! `switch` only records the stack pointer it was asked to load, so after a
//! `yield` the scheduler believes the other task runs while the test keeps
//! executing. Tests drive the kernel as whichever task is current by
//! building trap frames by hand.

#![allow(dead_code)]

use kernel_core::{Kernel, Pid, Platform, TrapFrame};
use kernel_info::memory::{USER_STACK_BOTTOM, USER_STACK_TOP};
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};
use kernel_mm::test_util::TestPhysMemory;
use kernel_mm::{PageAllocator, PhysMapper};
use kernel_nvme::NvmeRegisters;
use kernel_pci::{ConfigSpace, PciAddress, PciDevice};
use kernel_sync::SpinLock;
use packer_abi::ArchiveBuilder;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use stdlib::syscall_abi::Sysno;

pub const USER_RETURN: u64 = 0xffff_ffff_8000_1000;
pub const KERNEL_TASK: u64 = 0xffff_ffff_8000_2000;
pub const IDLE_ENTRY: u64 = 0xffff_ffff_8000_3000;

/// User memory the tests use for strings and buffers: the bottom of the
/// user stack, far below anything `exec` places at the top.
pub const SCRATCH: u64 = USER_STACK_BOTTOM;

const RAM_PAGES: usize = 4096;

/// Halting this often without a runnable task means the test deadlocked.
const MAX_HALTS: usize = 10_000;

pub struct FakePlatform {
    kernel_root: PhysicalAddress,
    ticks: AtomicU64,
    halts: AtomicUsize,
    flushes: AtomicUsize,
    switches: Mutex<Vec<u64>>,
    consoles: Mutex<[Vec<u8>; 3]>,
    roots: Mutex<Vec<PhysicalAddress>>,
}

impl FakePlatform {
    fn new(kernel_root: PhysicalAddress) -> Self {
        Self {
            kernel_root,
            ticks: AtomicU64::new(0),
            halts: AtomicUsize::new(0),
            flushes: AtomicUsize::new(0),
            switches: Mutex::new(Vec::new()),
            consoles: Mutex::new([Vec::new(), Vec::new(), Vec::new()]),
            roots: Mutex::new(Vec::new()),
        }
    }

    /// Everything written to console `tty`.
    pub fn console(&self, tty: usize) -> String {
        String::from_utf8_lossy(&self.consoles.lock().unwrap()[tty]).into_owned()
    }

    pub fn halts(&self) -> usize {
        self.halts.load(Ordering::Relaxed)
    }

    pub fn switches(&self) -> Vec<u64> {
        self.switches.lock().unwrap().clone()
    }

    pub fn last_root(&self) -> Option<PhysicalAddress> {
        self.roots.lock().unwrap().last().copied()
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::Relaxed)
    }
}

impl Platform for FakePlatform {
    unsafe fn switch(&self, _save: *mut u64, load: u64) {
        self.switches.lock().unwrap().push(load);
    }

    fn halt_until_interrupt(&self) {
        let halts = self.halts.fetch_add(1, Ordering::Relaxed);
        assert!(halts < MAX_HALTS, "no task ever became runnable");
    }

    fn ticks(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed)
    }

    fn user_return_trampoline(&self) -> u64 {
        USER_RETURN
    }

    fn kernel_task_trampoline(&self) -> u64 {
        KERNEL_TASK
    }

    fn kernel_root(&self) -> PhysicalAddress {
        self.kernel_root
    }

    fn set_kernel_stack(&self, _rsp0: u64) {}

    fn load_address_space(&self, root: PhysicalAddress) {
        self.roots.lock().unwrap().push(root);
    }

    fn flush_tlb(&self) {
        self.flushes.fetch_add(1, Ordering::Relaxed);
    }

    fn console_output(&self, tty: usize, bytes: &[u8]) {
        self.consoles.lock().unwrap()[tty].extend_from_slice(bytes);
    }

    fn nvme_registers(&self, _pci: &PciDevice, _window: VirtualAddress) -> Box<dyn NvmeRegisters> {
        Box::new(DeadController)
    }
}

/// A controller that never becomes ready.
struct DeadController;

impl NvmeRegisters for DeadController {
    fn read32(&self, _offset: usize) -> u32 {
        0
    }

    fn write32(&self, _offset: usize, _value: u32) {}
}

/// Configuration space with a table of functions. BAR0 reads return the
/// size mask after all ones were written.
#[derive(Default)]
pub struct FakeConfig {
    regs: Mutex<BTreeMap<(PciAddress, u8), u32>>,
    bar_sizes: Mutex<BTreeMap<PciAddress, u32>>,
}

impl FakeConfig {
    pub fn with_nvme(self, address: PciAddress, bar0: u32, size: u32, irq: u8) -> Self {
        {
            let mut regs = self.regs.lock().unwrap();
            regs.insert((address, 0x00), 0x0010_1b36);
            regs.insert((address, 0x08), 0x0108_0200);
            regs.insert((address, 0x10), bar0);
            regs.insert((address, 0x14), 0);
            regs.insert((address, 0x3C), u32::from(irq));
        }
        self.bar_sizes.lock().unwrap().insert(address, size);
        self
    }
}

impl ConfigSpace for FakeConfig {
    fn read_u32(&self, addr: PciAddress, offset: u8) -> u32 {
        let regs = self.regs.lock().unwrap();
        match regs.get(&(addr, offset)) {
            Some(&value) => value,
            None if offset == 0 => 0xFFFF_FFFF,
            None => 0,
        }
    }

    fn write_u32(&self, addr: PciAddress, offset: u8, value: u32) {
        let mut value = value;
        if offset == 0x10 && value == 0xFFFF_FFFF {
            let size = self.bar_sizes.lock().unwrap().get(&addr).copied().unwrap_or(0);
            value = !(size.wrapping_sub(1));
        }
        self.regs.lock().unwrap().insert((addr, offset), value);
    }
}

/// One `PT_LOAD` segment at `0x40_0000` holding `data`, entered at its
/// first byte.
pub fn executable(data: &[u8], bss: u64) -> Vec<u8> {
    const PH: usize = 56;
    let mut f = vec![0u8; 64 + PH];
    f[0..4].copy_from_slice(b"\x7FELF");
    f[4] = 2;
    f[5] = 1;
    f[6] = 1;
    f[16..18].copy_from_slice(&2u16.to_le_bytes());
    f[18..20].copy_from_slice(&0x3Eu16.to_le_bytes());
    f[20..24].copy_from_slice(&1u32.to_le_bytes());
    f[24..32].copy_from_slice(&0x40_0000u64.to_le_bytes());
    f[32..40].copy_from_slice(&64u64.to_le_bytes());
    f[52..54].copy_from_slice(&64u16.to_le_bytes());
    f[54..56].copy_from_slice(&(PH as u16).to_le_bytes());
    f[56..58].copy_from_slice(&1u16.to_le_bytes());

    let ph = &mut f[64..];
    ph[0..4].copy_from_slice(&1u32.to_le_bytes());
    ph[4..8].copy_from_slice(&5u32.to_le_bytes());
    ph[8..16].copy_from_slice(&((64 + PH) as u64).to_le_bytes());
    ph[16..24].copy_from_slice(&0x40_0000u64.to_le_bytes());
    ph[32..40].copy_from_slice(&(data.len() as u64).to_le_bytes());
    ph[40..48].copy_from_slice(&(data.len() as u64 + bss).to_le_bytes());
    f.extend_from_slice(data);
    f
}

pub struct Machine {
    pub kernel: &'static Kernel,
    pub platform: &'static FakePlatform,
    pub mem: &'static TestPhysMemory,
    pub frames: &'static SpinLock<PageAllocator>,
}

/// Boot with `/bin/init` and `/bin/echo` in the initrd and no PCI devices.
pub fn boot() -> Machine {
    boot_with(FakeConfig::default())
}

pub fn boot_with(config: FakeConfig) -> Machine {
    let mem = TestPhysMemory::leak(RAM_PAGES);
    let frames: &'static SpinLock<PageAllocator> = Box::leak(Box::new(SpinLock::new(unsafe {
        PageAllocator::new_in_region(mem, mem.phys_base(), mem.len())
    })));
    let kernel_root = frames.lock().try_alloc(1).unwrap();
    mem.zero_page(kernel_root);

    let platform: &'static FakePlatform = Box::leak(Box::new(FakePlatform::new(kernel_root)));
    let config: &'static FakeConfig = Box::leak(Box::new(config));
    let kernel: &'static Kernel = Box::leak(Box::new(Kernel::new(platform, mem, frames, config)));

    let mut tar = ArchiveBuilder::new();
    tar.add_directory("bin").unwrap();
    tar.add_file("bin/init", &executable(b"\xEB\xFE", 0x1000)).unwrap();
    tar.add_file("bin/echo", &executable(b"echo-text", 0)).unwrap();
    tar.add_directory("etc").unwrap();
    tar.add_file("etc/motd", b"welcome\n").unwrap();

    kernel.populate_dev();
    kernel.extract_initrd(&tar.finish()).unwrap();
    Machine {
        kernel,
        platform,
        mem,
        frames,
    }
}

impl Machine {
    /// Spawn init and an idle kernel task and switch to init. The idle task
    /// stays runnable so that exiting or killing never runs out of tasks.
    pub fn start(&self) -> (Pid, Pid) {
        let init = self.kernel.spawn_init("/bin/init").unwrap();
        let idle = self.kernel.spawn_kernel_task("idle", IDLE_ENTRY).unwrap();
        self.kernel.enter(init);
        (init, idle)
    }

    pub fn used_pages(&self) -> usize {
        self.frames.lock().used_pages()
    }

    /// Trap into the kernel as the current task.
    pub fn syscall(&self, sysno: Sysno, a1: u64, a2: u64, a3: u64) -> u64 {
        let mut frame = user_frame();
        frame.rax = sysno as u64;
        frame.rdi = a1;
        frame.rsi = a2;
        frame.rdx = a3;
        self.kernel.syscall(&mut frame);
        frame.rax
    }

    pub fn current(&self) -> Pid {
        self.kernel.current_pid().unwrap()
    }

    /// Store `bytes` at `SCRATCH + offset` of the current task.
    pub fn put(&self, offset: u64, bytes: &[u8]) -> u64 {
        let va = SCRATCH + offset;
        self.kernel.write_user(self.current(), va, bytes).unwrap();
        va
    }

    /// Store a NUL-terminated string at `SCRATCH + offset`.
    pub fn put_str(&self, offset: u64, s: &str) -> u64 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        self.put(offset, &bytes)
    }

    pub fn get(&self, pid: Pid, va: u64, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        self.kernel.read_user(pid, va, &mut buf).unwrap();
        buf
    }

    /// `open(path, flags)` as the current task.
    pub fn open(&self, path: &str, flags: u64) -> u64 {
        let at = self.put_str(0x8000, path);
        self.syscall(Sysno::Open, at, flags, 0)
    }
}

/// A frame as trapped from user mode at the image entry.
pub fn user_frame() -> TrapFrame {
    TrapFrame::user(0x40_0000, USER_STACK_TOP - 0x100)
}
