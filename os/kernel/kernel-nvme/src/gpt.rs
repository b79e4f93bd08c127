//! GUID partition table parsing.

use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use log::warn;

/// Upper bound on partitions registered per device.
pub const MAX_PARTITIONS: usize = 64;

/// Bytes read from the start of the disk for the scan: protective MBR, GPT
/// header and the first partition entries (512-byte sectors assumed).
pub const GPT_SCAN_BYTES: usize = 5 * 4096;

const HEADER_OFFSET: usize = 0x200;
const ENTRIES_OFFSET: usize = 0x400;
const SIGNATURE: &[u8; 8] = b"EFI PART";

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum GptError {
    #[error("no GPT signature")]
    NoSignature,
    #[error("disk too small for a GPT")]
    Truncated,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GptPartition {
    /// Position in the partition entry array; the device node is numbered
    /// `index + 1`.
    pub index: u32,
    pub type_guid: [u32; 4],
    pub guid: [u32; 4],
    pub first_lba: u64,
    /// Inclusive.
    pub last_lba: u64,
    /// Partition name, UTF-16 code units truncated to their low byte.
    pub name: String,
}

impl GptPartition {
    /// `/dev` node name on controller `device`, numbered by entry slot.
    #[must_use]
    pub fn node_name(&self, device: u16) -> String {
        format!("nvme{device}p{}", self.index + 1)
    }
}

fn le_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

fn guid(bytes: &[u8], at: usize) -> [u32; 4] {
    [
        le_u32(bytes, at),
        le_u32(bytes, at + 4),
        le_u32(bytes, at + 8),
        le_u32(bytes, at + 12),
    ]
}

/// Parse the partition table from the first [`GPT_SCAN_BYTES`] of a disk.
///
/// Unused entries (zero type GUID) are skipped. Partitions starting or
/// ending beyond LBA `2^32 - 1` are not supported and skipped with a
/// warning. Entries that would extend past `disk_start` end the scan.
///
/// # Errors
/// [`GptError::NoSignature`] if the header is missing.
pub fn parse_gpt(disk_start: &[u8]) -> Result<Vec<GptPartition>, GptError> {
    if disk_start.len() < ENTRIES_OFFSET {
        return Err(GptError::Truncated);
    }
    if &disk_start[HEADER_OFFSET..HEADER_OFFSET + 8] != SIGNATURE {
        return Err(GptError::NoSignature);
    }

    let entry_count = le_u32(disk_start, HEADER_OFFSET + 0x50) as usize;
    let entry_size = le_u32(disk_start, HEADER_OFFSET + 0x54) as usize;
    let mut partitions = Vec::new();
    if entry_size < 128 {
        warn!("gpt: bad partition entry size {entry_size}");
        return Ok(partitions);
    }

    for index in 0..entry_count {
        let offset = ENTRIES_OFFSET + index * entry_size;
        if offset + entry_size > disk_start.len() {
            warn!("gpt: partition entries extend past the scanned area");
            break;
        }
        let entry = &disk_start[offset..offset + entry_size];
        let type_guid = guid(entry, 0);
        if type_guid == [0; 4] {
            continue;
        }
        if le_u32(entry, 0x24) != 0 || le_u32(entry, 0x2C) != 0 {
            warn!("gpt: partition {} exceeds 2 TiB, skipped", index + 1);
            continue;
        }
        if partitions.len() == MAX_PARTITIONS {
            warn!("gpt: more than {MAX_PARTITIONS} partitions");
            break;
        }

        let name = entry[0x38..0x38 + 72]
            .chunks_exact(2)
            .map(|unit| unit[0])
            .take_while(|&b| b != 0)
            .map(char::from)
            .collect();

        partitions.push(GptPartition {
            index: index as u32,
            type_guid,
            guid: guid(entry, 0x10),
            first_lba: u64::from(le_u32(entry, 0x20)),
            last_lba: u64::from(le_u32(entry, 0x28)),
            name,
        });
    }
    Ok(partitions)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A 5-page disk prefix with the given `(first, last, name)` partitions
    /// at entry positions 0, 1, ...
    pub fn gpt_image(partitions: &[(u64, u64, &str)]) -> Vec<u8> {
        let mut disk = vec![0u8; GPT_SCAN_BYTES];
        disk[0x1FE] = 0x55;
        disk[0x1FF] = 0xAA;
        disk[0x200..0x208].copy_from_slice(SIGNATURE);
        disk[0x250..0x254].copy_from_slice(&128u32.to_le_bytes());
        disk[0x254..0x258].copy_from_slice(&128u32.to_le_bytes());
        for (i, (first, last, name)) in partitions.iter().enumerate() {
            let e = 0x400 + i * 128;
            disk[e..e + 4].copy_from_slice(&0xEBD0_A0A2u32.to_le_bytes());
            disk[e + 0x10..e + 0x14].copy_from_slice(&(i as u32 + 1).to_le_bytes());
            disk[e + 0x20..e + 0x28].copy_from_slice(&first.to_le_bytes());
            disk[e + 0x28..e + 0x30].copy_from_slice(&last.to_le_bytes());
            for (j, c) in name.bytes().enumerate() {
                disk[e + 0x38 + 2 * j] = c;
            }
        }
        disk
    }

    #[test]
    fn parses_used_entries() {
        let disk = gpt_image(&[(2048, 4095, "EFI system"), (4096, 8191, "data")]);
        let parts = parse_gpt(&disk).unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].first_lba, 2048);
        assert_eq!(parts[0].last_lba, 4095);
        assert_eq!(parts[0].name, "EFI system");
        assert_eq!(parts[0].type_guid[0], 0xEBD0_A0A2);
        assert_eq!(parts[1].index, 1);
        assert_eq!(parts[1].guid, [2, 0, 0, 0]);
        assert_eq!(parts[1].name, "data");
    }

    #[test]
    fn empty_entries_are_skipped() {
        let mut disk = gpt_image(&[(2048, 4095, "a"), (0, 0, ""), (8192, 9000, "c")]);
        disk[0x400 + 128..0x400 + 132].fill(0);
        let parts = parse_gpt(&disk).unwrap();
        assert_eq!(parts.iter().map(|p| p.index).collect::<Vec<_>>(), [0, 2]);
    }

    #[test]
    fn node_names_follow_the_entry_slot() {
        let mut disk = gpt_image(&[(0, 0, ""), (0, 0, ""), (2048, 4095, "data")]);
        disk[0x400..0x400 + 256].fill(0);
        let parts = parse_gpt(&disk).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].index, 2);
        assert_eq!(parts[0].node_name(0), "nvme0p3");
        assert_eq!(parts[0].node_name(1), "nvme1p3");
    }

    #[test]
    fn partitions_beyond_32_bit_lbas_are_skipped() {
        let disk = gpt_image(&[(1 << 32, (1 << 32) + 100, "huge"), (34, 2047, "small")]);
        let parts = parse_gpt(&disk).unwrap();
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].name, "small");
    }

    #[test]
    fn missing_signature() {
        let disk = vec![0u8; GPT_SCAN_BYTES];
        assert_eq!(parse_gpt(&disk), Err(GptError::NoSignature));
    }

    #[test]
    fn entry_array_is_bounded_by_the_scan_window() {
        let mut disk = gpt_image(&[(2048, 4095, "a")]);
        // claim far more entries than fit into five pages
        disk[0x250..0x254].copy_from_slice(&1000u32.to_le_bytes());
        let parts = parse_gpt(&disk).unwrap();
        assert_eq!(parts.len(), 1);
    }
}
