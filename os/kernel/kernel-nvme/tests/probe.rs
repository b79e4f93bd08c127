mod common;

use common::{BLOCK_SIZE, FakeController, gpt_disk, probe_with, probed};
use kernel_nvme::NvmeError;

#[test]
fn probe_reads_geometry_and_partition_table() {
    let disk = gpt_disk(1 << 20, &[(64, 127, "boot"), (128, 2047, "data")]);
    let (dev, controller, _host) = probed(disk);

    assert_eq!(dev.lba_count(), 2048);
    assert_eq!(dev.lbads_exponent(), 9);
    assert_eq!(dev.capacity(), 1 << 20);

    let parts = dev.partitions();
    assert_eq!(parts.len(), 2);
    assert_eq!((parts[0].first_lba, parts[0].last_lba), (64, 127));
    assert_eq!(parts[0].name, "boot");
    assert_eq!(parts[1].name, "data");

    // identify x2, create CQ, create SQ
    assert_eq!(controller.opcodes(false), [0x06, 0x06, 0x05, 0x01]);
    // the partition scan reads five pages
    assert_eq!(controller.opcodes(true), [0x02; 5]);
}

#[test]
fn status_reflects_queue_positions() {
    let (dev, _controller, _host) = probed(gpt_disk(64 * 1024, &[]));
    let status = dev.status();
    assert_eq!((status.major_version, status.minor_version), (1, 4));
    assert_eq!((status.asq_tail, status.asq_head, status.acq_head), (4, 4, 4));
    assert_eq!((status.iosq_tail, status.iosq_head, status.iocq_head), (5, 5, 5));
    assert_eq!(
        status.to_string(),
        "Nvme(00:04.00 addr=febd0000 ver=01.04 asq_tail=04 asq_head=04 acq_head=04 \
         iosq_tail=05 iosq_head=05 iocq_head=05 lba_count=0000000000000080 lbads_exp=09)"
    );
}

#[test]
fn disk_without_partition_table_still_probes() {
    let (dev, _controller, _host) = probed(vec![0; 32 * BLOCK_SIZE * 8]);
    assert!(dev.partitions().is_empty());
    assert_eq!(dev.lba_count(), 256);
}

#[test]
fn sparse_partition_table_keeps_slot_numbers() {
    let mut disk = gpt_disk(1 << 20, &[(0, 0, ""), (0, 0, ""), (128, 2047, "data")]);
    disk[0x400..0x400 + 256].fill(0);
    disk[128 * BLOCK_SIZE..128 * BLOCK_SIZE + 4].copy_from_slice(b"data");
    let (dev, _controller, host) = probed(disk);

    let parts = dev.partitions();
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].node_name(dev.index()), "nvme0p3");

    // the lookup key stays the vector position
    let mut buf = [0u8; 4];
    let read = dev.partition_read(&host, 0, 0, &mut buf, &mut || dev.handle_interrupt());
    assert_eq!(read, Ok(4));
    assert_eq!(&buf, b"data");
}

#[test]
fn blocks_larger_than_a_page_fail_bring_up() {
    let (dev, controller, _host, result) =
        probe_with(|mem| FakeController::new(mem, vec![0; 64 * 1024]).with_lbads(13));
    assert_eq!(result, Err(NvmeError::UnsupportedBlockSize(13)));
    assert_eq!(dev.lba_count(), 0);
    assert!(dev.partitions().is_empty());
    // identify controller and namespace, no I/O queue
    assert_eq!(controller.opcodes(false), [0x06, 0x06]);
    assert!(controller.opcodes(true).is_empty());
}
