#![allow(dead_code)]

use kernel_vfs::{
    DentryId, DeviceError, DeviceId, DeviceOps, InodeId, OpenFile, Resolved, SysfsNode, SysfsSource, Vfs,
    read_zero, write_zero,
};
use std::sync::Mutex;

pub const PARTITION: DeviceId = DeviceId::NvmePartition { device: 0, partition: 0 };

pub const CLUSTER: usize = 4096;
pub const HEAP_OFFSET: usize = 16 * 512;
pub const CLUSTER_COUNT: u32 = 16;

/// Device bus with one partition, `/dev/zero` and a recording tty.
pub struct Devices {
    pub partition: Mutex<Vec<u8>>,
    pub tty: Mutex<Vec<u8>>,
}

impl Devices {
    pub fn new(image: Vec<u8>) -> Self {
        Self {
            partition: Mutex::new(image),
            tty: Mutex::new(Vec::new()),
        }
    }

    pub fn image(&self) -> Vec<u8> {
        self.partition.lock().unwrap().clone()
    }
}

impl DeviceOps for Devices {
    fn read(&self, device: DeviceId, offset: u64, buf: &mut [u8]) -> Result<usize, DeviceError> {
        match device {
            PARTITION => {
                let image = self.partition.lock().unwrap();
                let start = (offset as usize).min(image.len());
                let len = buf.len().min(image.len() - start);
                buf[..len].copy_from_slice(&image[start..start + len]);
                Ok(len)
            }
            DeviceId::Zero => Ok(read_zero(buf)),
            _ => Err(DeviceError::NoSuchDevice),
        }
    }

    fn write(&self, device: DeviceId, offset: u64, buf: &[u8]) -> Result<usize, DeviceError> {
        match device {
            PARTITION => {
                let mut image = self.partition.lock().unwrap();
                let start = (offset as usize).min(image.len());
                let len = buf.len().min(image.len() - start);
                image[start..start + len].copy_from_slice(&buf[..len]);
                Ok(len)
            }
            DeviceId::Zero => Ok(write_zero(buf)),
            DeviceId::Tty(0) => {
                self.tty.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            _ => Err(DeviceError::NoSuchDevice),
        }
    }
}

pub struct FixedSysfs;

impl SysfsSource for FixedSysfs {
    fn render(&self, node: SysfsNode, out: &mut String) {
        match node {
            SysfsNode::MemInfo => {
                out.push_str("total_memory_kib = 1024\nused_memory_kib = 64\n");
            }
            SysfsNode::PciInfo | SysfsNode::Nvme => {}
        }
    }
}

pub fn exists(vfs: &mut Vfs, path: &str, devices: &dyn DeviceOps) -> (InodeId, Option<DentryId>) {
    match vfs.resolve(path, devices) {
        Ok(Resolved::Exists { inode, dentry, .. }) => (inode, dentry),
        other => panic!("{path}: {other:?}"),
    }
}

pub fn read_all(vfs: &mut Vfs, inode: InodeId, devices: &dyn DeviceOps) -> Vec<u8> {
    let mut file = OpenFile::new(inode);
    let mut out = Vec::new();
    let mut buf = [0u8; 700];
    loop {
        let n = vfs.read(&mut file, &mut buf, devices, &FixedSysfs).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Contents of the chained file `/big.bin`.
pub fn big_file() -> Vec<u8> {
    (0..5000u32).map(|i| (i % 251) as u8).collect()
}

pub const HELLO: &[u8] = b"hello from exfat!!\r\n";
pub const INNER: &[u8] = b"abc";

/// A small exFAT volume:
///
/// * root directory in clusters 2 and 6 (FAT chained)
/// * `hello.txt` contiguous in cluster 3
/// * `notes/` contiguous in cluster 4, holding `inner.txt` in cluster 5
/// * `big.bin` FAT chained over clusters 7 and 9
pub fn exfat_image() -> Vec<u8> {
    let mut image = vec![0u8; HEAP_OFFSET + CLUSTER_COUNT as usize * CLUSTER];

    let boot = &mut image[..512];
    boot[0..3].copy_from_slice(&[0xEB, 0x76, 0x90]);
    boot[3..11].copy_from_slice(b"EXFAT   ");
    boot[0x50..0x54].copy_from_slice(&8u32.to_le_bytes());
    boot[0x54..0x58].copy_from_slice(&8u32.to_le_bytes());
    boot[0x58..0x5C].copy_from_slice(&16u32.to_le_bytes());
    boot[0x5C..0x60].copy_from_slice(&CLUSTER_COUNT.to_le_bytes());
    boot[0x60..0x64].copy_from_slice(&2u32.to_le_bytes());
    boot[0x6C] = 9;
    boot[0x6D] = 3;
    boot[510] = 0x55;
    boot[511] = 0xAA;

    let mut fat = |cluster: u32, next: u32| {
        let at = 8 * 512 + 4 * cluster as usize;
        image[at..at + 4].copy_from_slice(&next.to_le_bytes());
    };
    fat(0, 0xFFFF_FFF8);
    fat(1, 0xFFFF_FFFF);
    fat(2, 6);
    fat(6, 0xFFFF_FFFF);
    fat(7, 9);
    fat(9, 0xFFFF_FFFF);

    // cluster 2: label, bitmap, two entry sets, then deleted entries
    let mut root = Vec::new();
    let mut label = [0u8; 32];
    label[0] = 0x83;
    root.push(label);
    let mut bitmap = [0u8; 32];
    bitmap[0] = 0x81;
    root.push(bitmap);
    root.extend(entry_set("hello.txt", false, 3, HELLO.len() as u64, true));
    root.extend(entry_set("notes", true, 4, CLUSTER as u64, true));
    while root.len() < CLUSTER / 32 {
        let mut deleted = [0u8; 32];
        deleted[0] = 0x05;
        root.push(deleted);
    }
    put_entries(&mut image, 2, &root);

    // cluster 6: the rest of the root directory
    put_entries(&mut image, 6, &entry_set("big.bin", false, 7, 5000, false));

    put_entries(&mut image, 4, &entry_set("inner.txt", false, 5, INNER.len() as u64, true));

    put_data(&mut image, 3, HELLO);
    put_data(&mut image, 5, INNER);
    let big = big_file();
    put_data(&mut image, 7, &big[..CLUSTER]);
    put_data(&mut image, 9, &big[CLUSTER..]);
    image
}

pub fn cluster_offset(cluster: u32) -> usize {
    HEAP_OFFSET + (cluster as usize - 2) * CLUSTER
}

fn put_entries(image: &mut [u8], cluster: u32, entries: &[[u8; 32]]) {
    let at = cluster_offset(cluster);
    for (i, entry) in entries.iter().enumerate() {
        image[at + 32 * i..at + 32 * (i + 1)].copy_from_slice(entry);
    }
}

fn put_data(image: &mut [u8], cluster: u32, data: &[u8]) {
    let at = cluster_offset(cluster);
    image[at..at + data.len()].copy_from_slice(data);
}

/// File, stream extension and name entries for one directory member.
pub fn entry_set(name: &str, dir: bool, first_cluster: u32, length: u64, contiguous: bool) -> Vec<[u8; 32]> {
    let names: Vec<&[u8]> = name.as_bytes().chunks(15).collect();

    let mut file = [0u8; 32];
    file[0] = 0x85;
    file[1] = 1 + names.len() as u8;
    file[4..6].copy_from_slice(&(if dir { 0x10u16 } else { 0x20 }).to_le_bytes());

    let mut stream = [0u8; 32];
    stream[0] = 0xC0;
    stream[1] = 0x01 | if contiguous { 0x02 } else { 0 };
    stream[3] = name.len() as u8;
    stream[8..16].copy_from_slice(&length.to_le_bytes());
    stream[0x14..0x18].copy_from_slice(&first_cluster.to_le_bytes());
    stream[0x18..0x20].copy_from_slice(&length.to_le_bytes());

    let mut set = vec![file, stream];
    for chunk in names {
        let mut entry = [0u8; 32];
        entry[0] = 0xC1;
        for (i, &b) in chunk.iter().enumerate() {
            entry[2 + 2 * i] = b;
        }
        set.push(entry);
    }
    set
}

/// A tree with `/mnt` and `/dev/nvme0p1` ready for mounting.
pub fn mountable() -> (Vfs, DentryId) {
    let mut vfs = Vfs::new();
    let root = vfs.root();
    let dev = vfs.dev_dir();
    vfs.mkdir(root, "mnt").unwrap();
    vfs.mknod(dev, "nvme0p1", PARTITION).unwrap();
    let devices = Devices::new(Vec::new());
    let (_, dentry) = exists(&mut vfs, "/mnt", &devices);
    (vfs, dentry.unwrap())
}
