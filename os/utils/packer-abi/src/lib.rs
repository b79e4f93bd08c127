//! # ustar archive format
//!
//! The initial ramdisk is a plain POSIX (ustar) tar archive: a sequence of
//! 512-byte header blocks, each followed by the entry's data padded to a
//! block boundary, terminated by zero blocks.
//!
//! ```text
//!   ┌────────────┬──────────────────────┬────────────┬─────┬────────────┐
//!   │ header (0) │ data (0), 512-padded │ header (1) │ ... │ zero block │
//!   └────────────┴──────────────────────┴────────────┴─────┴────────────┘
//! ```
//!
//! Only the fields the kernel needs are interpreted: name (with the ustar
//! `prefix` extension), size, checksum and type flag.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::cast_possible_truncation)]

#[cfg(feature = "write")]
extern crate alloc;

#[cfg(feature = "read")]
mod archive;
#[cfg(feature = "write")]
mod builder;

#[cfg(feature = "read")]
pub use archive::{Archive, Entries, Entry};
#[cfg(feature = "write")]
pub use builder::ArchiveBuilder;

/// Size of a header and the unit of data padding.
pub const BLOCK_SIZE: usize = 512;

/// `magic` field of a ustar header, including the terminating NUL.
pub const USTAR_MAGIC: &[u8; 6] = b"ustar\0";

/// Byte ranges of the header fields.
pub mod field {
    use core::ops::Range;

    pub const NAME: Range<usize> = 0..100;
    pub const MODE: Range<usize> = 100..108;
    pub const UID: Range<usize> = 108..116;
    pub const GID: Range<usize> = 116..124;
    pub const SIZE: Range<usize> = 124..136;
    pub const MTIME: Range<usize> = 136..148;
    pub const CHECKSUM: Range<usize> = 148..156;
    pub const TYPEFLAG: usize = 156;
    pub const MAGIC: Range<usize> = 257..263;
    pub const VERSION: Range<usize> = 263..265;
    pub const PREFIX: Range<usize> = 345..500;
}

/// Type of an archive member.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum EntryKind {
    /// `'0'` or the historic NUL.
    File,
    /// `'5'`.
    Directory,
    /// Links, devices, FIFOs and vendor extensions.
    Other(u8),
}

impl EntryKind {
    #[must_use]
    pub const fn from_typeflag(flag: u8) -> Self {
        match flag {
            b'0' | 0 => Self::File,
            b'5' => Self::Directory,
            other => Self::Other(other),
        }
    }

    #[must_use]
    pub const fn typeflag(self) -> u8 {
        match self {
            Self::File => b'0',
            Self::Directory => b'5',
            Self::Other(flag) => flag,
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TarError {
    #[error("archive ends inside a header or data block")]
    Truncated,
    #[error("header checksum mismatch")]
    BadChecksum,
    #[error("malformed octal number in header")]
    BadNumber,
    #[error("entry name is not valid UTF-8")]
    Utf8,
    #[error("entry name does not fit into a ustar header")]
    NameTooLong,
}

/// Parse a NUL- or space-terminated octal field.
///
/// # Errors
/// [`TarError::BadNumber`] on any non-octal digit or overflow.
pub fn parse_octal(field: &[u8]) -> Result<u64, TarError> {
    let mut value: u64 = 0;
    for &b in field.iter().skip_while(|&&b| b == b' ') {
        match b {
            b'0'..=b'7' => {
                value = value
                    .checked_mul(8)
                    .and_then(|v| v.checked_add(u64::from(b - b'0')))
                    .ok_or(TarError::BadNumber)?;
            }
            0 | b' ' => break,
            _ => return Err(TarError::BadNumber),
        }
    }
    Ok(value)
}

/// Header checksum: the byte sum of the block with the checksum field
/// counted as spaces.
#[must_use]
pub fn header_checksum(block: &[u8; BLOCK_SIZE]) -> u32 {
    block
        .iter()
        .enumerate()
        .map(|(i, &b)| {
            if field::CHECKSUM.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(b)
            }
        })
        .sum()
}

/// Number of blocks occupied by `len` bytes of data.
#[must_use]
pub const fn data_blocks(len: u64) -> u64 {
    len.div_ceil(BLOCK_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn octal_fields() {
        assert_eq!(parse_octal(b"00000001750\0"), Ok(1000));
        assert_eq!(parse_octal(b"   644 \0"), Ok(0o644));
        assert_eq!(parse_octal(b"\0\0\0\0"), Ok(0));
        assert_eq!(parse_octal(b"0009\0"), Err(TarError::BadNumber));
    }

    #[test]
    fn typeflags() {
        assert_eq!(EntryKind::from_typeflag(0), EntryKind::File);
        assert_eq!(EntryKind::from_typeflag(b'5'), EntryKind::Directory);
        assert_eq!(EntryKind::from_typeflag(b'2'), EntryKind::Other(b'2'));
        assert_eq!(EntryKind::Directory.typeflag(), b'5');
    }

    #[test]
    fn block_count_rounds_up() {
        assert_eq!(data_blocks(0), 0);
        assert_eq!(data_blocks(1), 1);
        assert_eq!(data_blocks(512), 1);
        assert_eq!(data_blocks(513), 2);
    }
}
