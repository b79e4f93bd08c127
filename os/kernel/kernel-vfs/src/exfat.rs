//! exFAT, read-mostly.
//!
//! Directories are parsed into dentries on first traversal; regular files
//! get a cluster offset table on first touch. Writes go straight to the
//! device but never allocate: they stop at the current file length.

use crate::{DeviceError, DeviceId, DeviceOps, MAX_NAME_LEN, MountError};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use log::warn;

const ENTRY_SIZE: usize = 32;

const ENTRY_END: u8 = 0x00;
const ENTRY_FILE: u8 = 0x85;
const ENTRY_STREAM: u8 = 0xC0;
const ENTRY_NAME: u8 = 0xC1;

const ATTR_DIRECTORY: u16 = 1 << 4;
const FLAG_NO_FAT_CHAIN: u8 = 1 << 1;

const FAT_BAD: u32 = 0xFFFF_FFF7;
const FAT_END: u32 = 0xFFFF_FFFF;

/// Geometry of a mounted volume, from its boot sector.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct ExfatVolume {
    pub device: DeviceId,
    /// In sectors.
    pub fat_offset: u32,
    pub fat_length: u32,
    /// In sectors.
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub root_cluster: u32,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
}

impl ExfatVolume {
    /// Parse the boot sector read from `device`.
    pub(crate) fn from_boot_sector(device: DeviceId, sector: &[u8]) -> Result<Self, MountError> {
        if sector.len() < 512 || &sector[3..8] != b"EXFAT" {
            return Err(MountError::BadSignature);
        }
        let volume = Self {
            device,
            fat_offset: le_u32(sector, 0x50),
            fat_length: le_u32(sector, 0x54),
            cluster_heap_offset: le_u32(sector, 0x58),
            cluster_count: le_u32(sector, 0x5C),
            root_cluster: le_u32(sector, 0x60),
            bytes_per_sector_shift: sector[0x6C],
            sectors_per_cluster_shift: sector[0x6D],
        };
        let shift = u32::from(volume.bytes_per_sector_shift) + u32::from(volume.sectors_per_cluster_shift);
        if !(9..=12).contains(&volume.bytes_per_sector_shift) || shift > 25 || volume.root_cluster < 2 {
            return Err(MountError::BadGeometry);
        }
        Ok(volume)
    }

    #[must_use]
    pub const fn cluster_bytes(&self) -> u64 {
        1 << (self.bytes_per_sector_shift + self.sectors_per_cluster_shift)
    }

    /// Device byte offset of cluster `cluster` (numbering starts at 2).
    #[must_use]
    pub fn cluster_offset(&self, cluster: u32) -> u64 {
        (u64::from(self.cluster_heap_offset) << self.bytes_per_sector_shift)
            + (u64::from(cluster) - 2) * self.cluster_bytes()
    }

    /// `cluster` if it lies inside the cluster heap.
    fn heap_cluster(&self, cluster: u64) -> Result<u32, DeviceError> {
        if (2..u64::from(self.cluster_count) + 2).contains(&cluster) {
            Ok(cluster as u32)
        } else {
            warn!("exfat: cluster {cluster} outside the heap");
            Err(DeviceError::Corrupt)
        }
    }

    fn fat_entry(&self, devices: &dyn DeviceOps, cluster: u32) -> Result<u32, DeviceError> {
        let offset = (u64::from(self.fat_offset) << self.bytes_per_sector_shift) + 4 * u64::from(cluster);
        let mut raw = [0u8; 4];
        devices.read(self.device, offset, &mut raw)?;
        Ok(u32::from_le_bytes(raw))
    }

    /// The clusters of a chain starting at `first`. Contiguous chains (no
    /// FAT chain) need their `length`; FAT chains end at the end marker, a
    /// bad or free entry, or after `limit` clusters. Clusters outside the
    /// heap are [`DeviceError::Corrupt`].
    fn chain(
        &self,
        devices: &dyn DeviceOps,
        first: u32,
        contiguous: bool,
        length: u64,
    ) -> Result<Vec<u32>, DeviceError> {
        let wanted = length.div_ceil(self.cluster_bytes());
        if contiguous {
            return (0..wanted)
                .map(|i| self.heap_cluster(u64::from(first) + i))
                .collect();
        }

        let limit = if length == 0 { u64::from(self.cluster_count) } else { wanted };
        let mut clusters = Vec::new();
        let mut cluster = self.heap_cluster(u64::from(first))?;
        loop {
            clusters.push(cluster);
            if clusters.len() as u64 >= limit {
                break;
            }
            match self.fat_entry(devices, cluster)? {
                FAT_END => break,
                FAT_BAD => {
                    warn!("exfat: bad cluster after {cluster}");
                    break;
                }
                next @ (0 | 1) => {
                    warn!("exfat: unexpected FAT entry {next} after cluster {cluster}");
                    break;
                }
                next => cluster = self.heap_cluster(u64::from(next))?,
            }
        }
        Ok(clusters)
    }
}

fn le_u16(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn le_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

/// Per-inode exFAT state.
#[derive(Debug)]
pub(crate) struct ExfatNode {
    pub first_cluster: u32,
    pub contiguous: bool,
    /// Data length from the stream extension; 0 for the root directory.
    pub size: u64,
    pub loaded: bool,
    /// Device byte offset of every cluster of a regular file.
    pub clusters: Vec<u64>,
}

impl ExfatNode {
    pub const fn root(first_cluster: u32) -> Self {
        Self {
            first_cluster,
            contiguous: false,
            size: 0,
            loaded: false,
            clusters: Vec::new(),
        }
    }
}

/// A directory member found on disk.
#[derive(Debug)]
pub(crate) struct DirEntry {
    pub name: String,
    pub is_dir: bool,
    pub node: ExfatNode,
}

/// Parse every file entry set of the directory described by `node`.
pub(crate) fn read_dir(
    volume: &ExfatVolume,
    devices: &dyn DeviceOps,
    node: &ExfatNode,
) -> Result<Vec<DirEntry>, DeviceError> {
    let clusters = volume.chain(devices, node.first_cluster, node.contiguous, node.size)?;
    let mut buf = vec![0u8; volume.cluster_bytes() as usize];
    let mut entries = Vec::new();
    let mut pending: Option<DirEntry> = None;

    'clusters: for cluster in clusters {
        devices.read(volume.device, volume.cluster_offset(cluster), &mut buf)?;
        for raw in buf.chunks_exact(ENTRY_SIZE) {
            match raw[0] {
                ENTRY_END => break 'clusters,
                ENTRY_FILE => {
                    entries.extend(pending.take());
                    let attributes = le_u16(raw, 4);
                    pending = Some(DirEntry {
                        name: String::new(),
                        is_dir: attributes & ATTR_DIRECTORY != 0,
                        node: ExfatNode::root(0),
                    });
                }
                ENTRY_STREAM => {
                    if let Some(entry) = pending.as_mut() {
                        entry.node.contiguous = raw[1] & FLAG_NO_FAT_CHAIN != 0;
                        entry.node.first_cluster = le_u32(raw, 0x14);
                        entry.node.size = le_u64(raw, 0x18);
                    }
                }
                ENTRY_NAME => {
                    if let Some(entry) = pending.as_mut() {
                        let units = raw[2..].chunks_exact(2).map(|unit| unit[0]);
                        for b in units.take_while(|&b| b != 0) {
                            if entry.name.len() < MAX_NAME_LEN {
                                entry.name.push(char::from(b));
                            }
                        }
                    }
                }
                // volume label, bitmap, up-case table, deleted entries
                _ => {}
            }
        }
    }
    entries.extend(pending);
    Ok(entries)
}

/// Build the cluster offset table of a regular file.
pub(crate) fn load_file(
    volume: &ExfatVolume,
    devices: &dyn DeviceOps,
    node: &mut ExfatNode,
) -> Result<(), DeviceError> {
    if node.size == 0 {
        node.clusters.clear();
    } else {
        let chain = volume.chain(devices, node.first_cluster, node.contiguous, node.size)?;
        node.clusters = chain.into_iter().map(|c| volume.cluster_offset(c)).collect();
    }
    node.loaded = true;
    Ok(())
}

/// Walk the clusters covering `[offset, offset + len)` of a file of
/// `length` bytes, calling `f(device_offset, buf_range)` per chunk.
fn for_each_chunk(
    volume: &ExfatVolume,
    node: &ExfatNode,
    length: u64,
    offset: u64,
    len: usize,
    mut f: impl FnMut(u64, core::ops::Range<usize>) -> Result<usize, DeviceError>,
) -> Result<usize, DeviceError> {
    let cluster_bytes = volume.cluster_bytes();
    let end = (offset + len as u64).min(length);
    let mut pos = offset;
    while pos < end {
        let Some(&base) = node.clusters.get((pos / cluster_bytes) as usize) else {
            break;
        };
        let within = pos % cluster_bytes;
        let chunk = (cluster_bytes - within).min(end - pos) as usize;
        let at = (pos - offset) as usize;
        let done = f(base + within, at..at + chunk)?;
        pos += done as u64;
        if done < chunk {
            break;
        }
    }
    Ok(pos.saturating_sub(offset) as usize)
}

pub(crate) fn read(
    volume: &ExfatVolume,
    devices: &dyn DeviceOps,
    node: &ExfatNode,
    length: u64,
    offset: u64,
    buf: &mut [u8],
) -> Result<usize, DeviceError> {
    for_each_chunk(volume, node, length, offset, buf.len(), |device_offset, range| {
        devices.read(volume.device, device_offset, &mut buf[range])
    })
}

pub(crate) fn write(
    volume: &ExfatVolume,
    devices: &dyn DeviceOps,
    node: &ExfatNode,
    length: u64,
    offset: u64,
    buf: &[u8],
) -> Result<usize, DeviceError> {
    for_each_chunk(volume, node, length, offset, buf.len(), |device_offset, range| {
        devices.write(volume.device, device_offset, &buf[range])
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_sector() -> Vec<u8> {
        let mut sector = vec![0u8; 512];
        sector[3..11].copy_from_slice(b"EXFAT   ");
        sector[0x50..0x54].copy_from_slice(&8u32.to_le_bytes());
        sector[0x54..0x58].copy_from_slice(&8u32.to_le_bytes());
        sector[0x58..0x5C].copy_from_slice(&16u32.to_le_bytes());
        sector[0x5C..0x60].copy_from_slice(&32u32.to_le_bytes());
        sector[0x60..0x64].copy_from_slice(&4u32.to_le_bytes());
        sector[0x6C] = 9;
        sector[0x6D] = 3;
        sector
    }

    const PART: DeviceId = DeviceId::NvmePartition { device: 0, partition: 0 };

    #[test]
    fn boot_sector_geometry() {
        let volume = ExfatVolume::from_boot_sector(PART, &boot_sector()).unwrap();
        assert_eq!(volume.cluster_bytes(), 4096);
        assert_eq!(volume.root_cluster, 4);
        // heap at sector 16, cluster 4 is the third cluster
        assert_eq!(volume.cluster_offset(4), 16 * 512 + 2 * 4096);
    }

    #[test]
    fn rejects_foreign_boot_sectors() {
        let mut sector = boot_sector();
        sector[3..8].copy_from_slice(b"NTFS ");
        assert_eq!(ExfatVolume::from_boot_sector(PART, &sector), Err(MountError::BadSignature));

        let mut sector = boot_sector();
        sector[0x6C] = 13;
        assert_eq!(ExfatVolume::from_boot_sector(PART, &sector), Err(MountError::BadGeometry));
    }
}
