mod common;

use common::{BLOCK_SIZE, gpt_disk, probed};
use kernel_nvme::NvmeError;

#[test]
fn write_then_read_across_a_page_boundary() {
    let mut disk = gpt_disk(256 * 1024, &[]);
    disk[0x8000..0xA000].fill(0xEE);
    let (dev, controller, host) = probed(disk);
    let mut yield_now = || dev.handle_interrupt();

    let written = dev.write(&host, 0x8FFA, b"hello, world", &mut yield_now).unwrap();
    assert_eq!(written, 12);

    let disk = controller.disk();
    assert_eq!(&disk[0x8FFA..0x9006], b"hello, world");
    // the rest of both touched pages survives
    assert!(disk[0x8000..0x8FFA].iter().all(|&b| b == 0xEE));
    assert!(disk[0x9006..0xA000].iter().all(|&b| b == 0xEE));

    let mut buf = [0u8; 16];
    let read = dev.read(&host, 0x8FF8, &mut buf, &mut yield_now).unwrap();
    assert_eq!(read, 16);
    assert_eq!(&buf, b"\xEE\xEEhello, world\xEE\xEE");
}

#[test]
fn whole_page_writes_skip_the_read() {
    let (dev, controller, host) = probed(gpt_disk(64 * 1024, &[]));
    let before = controller.opcodes(true).len();
    let page = vec![0x5A; 8192];
    let written = dev.write(&host, 0x4000, &page, &mut || dev.handle_interrupt()).unwrap();
    assert_eq!(written, 8192);
    assert_eq!(controller.opcodes(true)[before..], [0x01, 0x01]);
}

#[test]
fn transfers_are_clamped_to_the_namespace() {
    let (dev, _controller, host) = probed(gpt_disk(64 * 1024, &[]));
    let mut yield_now = || dev.handle_interrupt();
    let mut buf = [0u8; 100];

    assert_eq!(dev.read(&host, 64 * 1024 - 10, &mut buf, &mut yield_now), Ok(10));
    assert_eq!(dev.read(&host, 64 * 1024, &mut buf, &mut yield_now), Ok(0));
    assert_eq!(dev.write(&host, 1 << 30, &buf, &mut yield_now), Ok(0));
}

#[test]
fn partition_io_stays_inside_the_partition() {
    let disk = gpt_disk(1 << 20, &[(64, 127, "boot"), (128, 2047, "data")]);
    let (dev, controller, host) = probed(disk);
    let mut yield_now = || dev.handle_interrupt();
    let boot_end = 64 * BLOCK_SIZE as u64;

    let written = dev
        .partition_write(&host, 0, boot_end - 4, &[0xAB; 8], &mut yield_now)
        .unwrap();
    assert_eq!(written, 4);

    let disk = controller.disk();
    let data_start = 128 * BLOCK_SIZE;
    assert_eq!(disk[data_start - 4..data_start], [0xAB; 4]);
    assert_eq!(disk[data_start], 0);

    dev.partition_write(&host, 1, 0, b"data", &mut yield_now).unwrap();
    let mut buf = [0u8; 4];
    dev.read(&host, data_start as u64, &mut buf, &mut yield_now).unwrap();
    assert_eq!(&buf, b"data");

    assert_eq!(
        dev.partition_read(&host, 5, 0, &mut buf, &mut yield_now),
        Err(NvmeError::NoSuchPartition)
    );
}

#[test]
fn scratch_pages_are_returned() {
    let (dev, _controller, host) = probed(gpt_disk(64 * 1024, &[]));
    let used = host.used_pages();
    let mut buf = vec![0u8; 3 * 4096];
    dev.read(&host, 100, &mut buf, &mut || dev.handle_interrupt()).unwrap();
    dev.write(&host, 100, &buf, &mut || dev.handle_interrupt()).unwrap();
    assert_eq!(host.used_pages(), used);
}
