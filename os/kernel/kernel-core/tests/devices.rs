mod common;

use common::*;
use kernel_pci::PciAddress;
use stdlib::syscall_abi::Sysno;

const NVME: PciAddress = PciAddress {
    bus: 0,
    slot: 4,
    function: 0,
};

fn read_all(m: &Machine, path: &str) -> String {
    let fd = m.open(path, 0);
    let buf = m.put(0x4000, &[0; 1024]);
    let n = m.syscall(Sysno::Read, fd, buf, 1024);
    String::from_utf8(m.get(m.current(), buf, n as usize)).unwrap()
}

#[test]
fn keystrokes_reach_the_active_console() {
    let m = boot();
    let (init, _) = m.start();
    // h, shift+i
    for code in [0x23, 0x2A, 0x17, 0xAA] {
        m.kernel.handle_scancode(code);
    }
    let buf = m.put(0, &[0; 2]);
    assert_eq!(m.syscall(Sysno::Read, 0, buf, 2), 2);
    assert_eq!(m.get(init, buf, 2), b"hI");
}

#[test]
fn ctrl_digit_switches_consoles() {
    let m = boot();
    m.start();
    for code in [0x1D, 0x03, 0x9D, 0x23] {
        m.kernel.handle_scancode(code);
    }
    assert_eq!(m.kernel.active_tty(), 1);

    let mut buf = [0u8; 4];
    assert_eq!(m.kernel.tty(0).drain_input(&mut buf), 0);
    assert_eq!(m.kernel.tty(1).drain_input(&mut buf), 1);
    assert_eq!(buf[0], b'h');
}

#[test]
fn arrows_arrive_as_escape_sequences() {
    let m = boot();
    m.start();
    m.kernel.handle_scancode(0x48);
    let mut buf = [0u8; 4];
    assert_eq!(m.kernel.tty(0).drain_input(&mut buf), 3);
    assert_eq!(&buf[..3], b"\x1b[A");
}

#[test]
fn each_tty_node_writes_to_its_console() {
    let m = boot();
    m.start();
    let fd = m.open("/dev/tty2", 0);
    let text = m.put(0, b"second");
    assert_eq!(m.syscall(Sysno::Write, fd, text, 6), 6);
    assert_eq!(m.platform.console(1), "second");
    assert_eq!(m.platform.console(0), "");
    m.kernel.tty(1).with_screen(|screen| assert_eq!(screen.cursor(), (0, 6)));
}

#[test]
fn dev_zero_reads_zeros_and_swallows_writes() {
    let m = boot();
    let (init, _) = m.start();
    let fd = m.open("/dev/zero", 0);
    let buf = m.put(0, &[0xFF; 8]);
    assert_eq!(m.syscall(Sysno::Read, fd, buf, 8), 8);
    assert_eq!(m.get(init, buf, 8), [0u8; 8]);
    assert_eq!(m.syscall(Sysno::Write, fd, buf, 8), 8);
}

#[test]
fn meminfo_reports_frames_in_kib() {
    let m = boot();
    m.start();
    let text = read_all(&m, "/sys/meminfo");
    let used = m.used_pages() * 4;
    assert_eq!(text, format!("total_memory_kib = 16384\nused_memory_kib = {used}\n"));
}

#[test]
fn nvme_controllers_are_mapped_and_listed() {
    let m = boot_with(FakeConfig::default().with_nvme(NVME, 0xFEBD_0000, 0x4000, 11));
    m.kernel.probe_pci();
    m.start();

    let pci = m.kernel.pci_devices();
    assert_eq!(pci.len(), 1);
    assert_eq!(pci[0].mmio_size, 0x4000);
    assert_eq!(pci[0].mmio_virt_base, 0xffff_c000_0000_0000);
    assert_eq!(m.kernel.nvme_devices().len(), 1);

    assert_eq!(
        read_all(&m, "/sys/pciinfo"),
        "Pci(00:04.00 d=1b36:0010 c=01:08:02 mb=00000000febd0000 ms=00004000 \
         bb=ffffc00000000000 il=0b)\n"
    );
    assert!(read_all(&m, "/sys/nvme").starts_with("Nvme(00:04.00 addr=febd0000 "));
    assert!(m.open("/dev/nvme0", 0) < 100);

    // a dead controller has nothing to complete
    m.kernel.handle_nvme_interrupt(11);
}

#[test]
fn missing_pci_devices_leave_sysfs_empty() {
    let m = boot();
    m.kernel.probe_pci();
    m.start();
    assert_eq!(read_all(&m, "/sys/pciinfo"), "");
    assert_eq!(read_all(&m, "/sys/nvme"), "");
}
