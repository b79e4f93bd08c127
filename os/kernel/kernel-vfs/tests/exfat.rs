mod common;

use common::*;
use kernel_vfs::{Dentry, DeviceError, MountError, OpenFile, Resolved, VfsError};

fn mounted() -> (kernel_vfs::Vfs, Devices) {
    mounted_from(exfat_image())
}

fn mounted_from(image: Vec<u8>) -> (kernel_vfs::Vfs, Devices) {
    let (mut vfs, mnt) = mountable();
    let devices = Devices::new(image);
    let (partition, _) = exists(&mut vfs, "/dev/nvme0p1", &devices);
    vfs.mount_exfat(partition, mnt, &devices).unwrap();
    (vfs, devices)
}

#[test]
fn root_directory_follows_the_fat_chain() {
    let (mut vfs, devices) = mounted();
    let (root, _) = exists(&mut vfs, "/mnt", &devices);
    let names: Vec<_> = vfs.children(root).map(Dentry::name).collect();
    assert_eq!(names, ["hello.txt", "notes", "big.bin"]);

    // listing again does not duplicate entries
    exists(&mut vfs, "/mnt/", &devices);
    assert_eq!(vfs.children(root).count(), 3);
}

#[test]
fn contiguous_file_reads_to_its_length() {
    let (mut vfs, devices) = mounted();
    let (hello, _) = exists(&mut vfs, "/mnt/hello.txt", &devices);
    assert_eq!(vfs.inode(hello).unwrap().len(), Some(HELLO.len() as u64));
    assert_eq!(read_all(&mut vfs, hello, &devices), HELLO);
}

#[test]
fn chained_file_reads_across_clusters() {
    let (mut vfs, devices) = mounted();
    let (big, _) = exists(&mut vfs, "/mnt/big.bin", &devices);
    assert_eq!(read_all(&mut vfs, big, &devices), big_file());

    let mut file = OpenFile { inode: big, offset: 4090 };
    let mut buf = [0u8; 20];
    assert_eq!(vfs.read(&mut file, &mut buf, &devices, &FixedSysfs), Ok(20));
    assert_eq!(buf, big_file()[4090..4110]);
    assert_eq!(file.offset, 4110);
}

#[test]
fn subdirectories_load_on_traversal() {
    let (mut vfs, devices) = mounted();
    let (notes, _) = exists(&mut vfs, "/mnt/notes", &devices);
    assert!(vfs.inode(notes).unwrap().is_dir());
    let (inner, _) = exists(&mut vfs, "/mnt/notes/inner.txt", &devices);
    assert_eq!(read_all(&mut vfs, inner, &devices), INNER);
    assert_eq!(
        vfs.resolve("/mnt/notes/inner.txt/x", &devices),
        Err(kernel_vfs::ResolveError::NotADir)
    );
}

#[test]
fn writes_stay_inside_the_file() {
    let (mut vfs, devices) = mounted();
    let (hello, _) = exists(&mut vfs, "/mnt/hello.txt", &devices);
    let mut file = OpenFile::new(hello);
    let n = vfs.write(&mut file, b"HELLO FROM EXFAT!!!!-overflow", &devices).unwrap();
    assert_eq!(n, HELLO.len());

    let at = cluster_offset(3);
    let image = devices.image();
    assert_eq!(&image[at..at + n], b"HELLO FROM EXFAT!!!!");
    assert!(image[at + n..at + n + 9].iter().all(|&b| b == 0));
}

#[test]
fn exfat_does_not_allocate() {
    let (mut vfs, devices) = mounted();
    let (root, _) = exists(&mut vfs, "/mnt", &devices);
    assert_eq!(vfs.create(root, "new.txt"), Err(VfsError::NotSupported));
    assert_eq!(vfs.mkdir(root, "new"), Err(VfsError::NotSupported));

    let (hello, _) = exists(&mut vfs, "/mnt/hello.txt", &devices);
    assert_eq!(vfs.truncate(hello, 0), Err(VfsError::NotSupported));

    let Ok(Resolved::DoesntExist { parent, name }) = vfs.resolve("/mnt/new.txt", &devices) else {
        panic!("expected a missing leaf");
    };
    assert_eq!((parent, name), (root, "new.txt"));
}

#[test]
fn mount_rejects_foreign_volumes() {
    let (mut vfs, mnt) = mountable();
    let devices = Devices::new(vec![0; 64 * 1024]);
    let (partition, _) = exists(&mut vfs, "/dev/nvme0p1", &devices);
    assert_eq!(vfs.mount_exfat(partition, mnt, &devices), Err(MountError::BadSignature));

    let mut image = exfat_image();
    image[0x6C] = 7;
    let devices = Devices::new(image);
    assert_eq!(vfs.mount_exfat(partition, mnt, &devices), Err(MountError::BadGeometry));
}

#[test]
fn mount_point_must_be_a_directory() {
    let (mut vfs, _) = mountable();
    let devices = Devices::new(exfat_image());
    let root = vfs.root();
    vfs.create(root, "plain").unwrap();
    let (partition, _) = exists(&mut vfs, "/dev/nvme0p1", &devices);
    let (_, plain) = exists(&mut vfs, "/plain", &devices);
    assert_eq!(
        vfs.mount_exfat(partition, plain.unwrap(), &devices),
        Err(MountError::NotADirectory)
    );
}

/// Device offset of the first cluster field of `hello.txt`'s stream entry.
fn hello_first_cluster() -> usize {
    // label, bitmap, file entry, then the stream extension
    cluster_offset(2) + 3 * 32 + 0x14
}

fn read_first(vfs: &mut kernel_vfs::Vfs, path: &str, devices: &Devices) -> Result<usize, VfsError> {
    let (inode, _) = exists(vfs, path, devices);
    let mut buf = [0u8; 16];
    vfs.read(&mut OpenFile::new(inode), &mut buf, devices, &FixedSysfs)
}

#[test]
fn reserved_first_cluster_is_corrupt() {
    for first in [0u32, 1] {
        let mut image = exfat_image();
        let at = hello_first_cluster();
        image[at..at + 4].copy_from_slice(&first.to_le_bytes());
        let (mut vfs, devices) = mounted_from(image);
        assert_eq!(
            read_first(&mut vfs, "/mnt/hello.txt", &devices),
            Err(VfsError::Device(DeviceError::Corrupt))
        );
    }
}

#[test]
fn contiguous_run_past_the_heap_is_corrupt() {
    let mut image = exfat_image();
    let at = hello_first_cluster();
    image[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
    let (mut vfs, devices) = mounted_from(image);
    assert_eq!(
        read_first(&mut vfs, "/mnt/hello.txt", &devices),
        Err(VfsError::Device(DeviceError::Corrupt))
    );
}

#[test]
fn fat_link_outside_the_heap_is_corrupt() {
    let mut image = exfat_image();
    // big.bin: cluster 7 links past the last heap cluster
    let at = 8 * 512 + 4 * 7;
    image[at..at + 4].copy_from_slice(&(CLUSTER_COUNT + 2).to_le_bytes());
    let (mut vfs, devices) = mounted_from(image);
    assert_eq!(
        read_first(&mut vfs, "/mnt/big.bin", &devices),
        Err(VfsError::Device(DeviceError::Corrupt))
    );
}
