//! ELF64 executables.
//!
//! Parsing works on a borrowed byte slice without allocating; loading maps
//! every `PT_LOAD` segment at its link address in a user address space,
//! followed by a one-page heap and the fixed user stack.

use crate::task::{MemoryRange, RangeKind};
use crate::{Kernel, TaskError};
use alloc::vec::Vec;
use bitfield_struct::bitfield;
use kernel_info::memory::{USER_STACK_BOTTOM, USER_STACK_TOP};
use kernel_memory_addresses::{PAGE_SIZE, PhysicalAddress, Size4K, VirtualAddress};

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfError {
    #[error("file shorter than an ELF header")]
    TooShort,
    #[error("bad ELF magic")]
    BadMagic,
    #[error("not a 64-bit ELF file")]
    BadClass,
    #[error("not an x86-64 ELF file")]
    BadMachine,
    #[error("malformed ELF header")]
    BadHeader,
    #[error("program header or segment outside of the file")]
    OutOfBounds,
    #[error("segment outside of user space")]
    BadSegment,
}

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Eh64 {
    pub e_type: u16,
    pub e_machine: u16,
    pub e_version: u32,
    pub e_entry: VirtualAddress,
    pub e_phoff: u64,
    pub e_phentsize: u16,
    pub e_phnum: u16,
}

#[derive(Copy, Clone, Debug)]
#[allow(clippy::struct_field_names)]
pub struct Ph64 {
    pub p_type: u32,
    pub p_flags: PFlags,
    pub p_offset: u64,
    pub p_vaddr: VirtualAddress,
    pub p_filesz: u64,
    pub p_memsz: u64,
}

/// `Elf64_Phdr.p_flags` (SVr4): bit0=X, bit1=W, bit2=R.
#[bitfield(u32)]
pub struct PFlags {
    #[bits(1)]
    pub execute: bool,
    #[bits(1)]
    pub write: bool,
    #[bits(1)]
    pub read: bool,
    #[bits(29)]
    __: u32,
}

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;
const PH_SIZE: usize = 56;

#[inline]
fn le16(x: &[u8]) -> u16 {
    u16::from_le_bytes([x[0], x[1]])
}

#[inline]
fn le32(x: &[u8]) -> u32 {
    u32::from_le_bytes([x[0], x[1], x[2], x[3]])
}

#[inline]
fn le64(x: &[u8]) -> u64 {
    u64::from_le_bytes([x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7]])
}

pub struct ElfView<'a> {
    bytes: &'a [u8],
    pub eh: Eh64,
}

/// Validate the ELF header of `bytes`.
///
/// # Errors
/// See [`ElfError`]; program headers must lie inside the file.
pub fn elf64_view(bytes: &[u8]) -> Result<ElfView<'_>, ElfError> {
    use ElfError::{BadClass, BadHeader, BadMachine, BadMagic, OutOfBounds, TooShort};
    if bytes.len() < 64 {
        return Err(TooShort);
    }
    if &bytes[0..4] != b"\x7FELF" {
        return Err(BadMagic);
    }
    // ELFCLASS64
    if bytes[4] != 2 {
        return Err(BadClass);
    }
    // little-endian
    if bytes[5] != 1 {
        return Err(BadHeader);
    }

    let eh = Eh64 {
        e_type: le16(&bytes[16..18]),
        e_machine: le16(&bytes[18..20]),
        e_version: le32(&bytes[20..24]),
        e_entry: VirtualAddress::new(le64(&bytes[24..32])),
        e_phoff: le64(&bytes[32..40]),
        e_phentsize: le16(&bytes[54..56]),
        e_phnum: le16(&bytes[56..58]),
    };

    if !(eh.e_type == ET_EXEC || eh.e_type == ET_DYN) || eh.e_version != 1 {
        return Err(BadHeader);
    }
    if eh.e_machine != EM_X86_64 {
        return Err(BadMachine);
    }
    if usize::from(eh.e_phentsize) != PH_SIZE {
        return Err(BadHeader);
    }

    let phoff = usize::try_from(eh.e_phoff).map_err(|_| OutOfBounds)?;
    let need = phoff
        .checked_add(usize::from(eh.e_phnum) * PH_SIZE)
        .ok_or(OutOfBounds)?;
    if need > bytes.len() {
        return Err(OutOfBounds);
    }
    Ok(ElfView { bytes, eh })
}

impl<'a> ElfView<'a> {
    /// Iterate all program headers.
    pub fn iter_ph(&self) -> impl Iterator<Item = Ph64> + '_ {
        let off = self.eh.e_phoff as usize;
        (0..usize::from(self.eh.e_phnum)).map(move |i| {
            let s = &self.bytes[off + i * PH_SIZE..off + (i + 1) * PH_SIZE];
            Ph64 {
                p_type: le32(&s[0..4]),
                p_flags: PFlags::from_bits(le32(&s[4..8])),
                p_offset: le64(&s[8..16]),
                p_vaddr: VirtualAddress::new(le64(&s[16..24])),
                p_filesz: le64(&s[32..40]),
                p_memsz: le64(&s[40..48]),
            }
        })
    }

    /// `PT_LOAD` headers that occupy memory.
    pub fn iter_pt_load(&self) -> impl Iterator<Item = Ph64> + '_ {
        self.iter_ph()
            .filter(|ph| ph.p_type == PT_LOAD && (ph.p_vaddr.as_u64() != 0 || ph.p_memsz != 0))
    }

    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.eh.e_entry
    }

    /// The file bytes backing a segment (`p_filesz` may be below `p_memsz`).
    ///
    /// # Errors
    /// [`ElfError::OutOfBounds`] if the bytes are not in the file.
    pub fn segment_file_bytes(&self, ph: &Ph64) -> Result<&'a [u8], ElfError> {
        let off = usize::try_from(ph.p_offset).map_err(|_| ElfError::OutOfBounds)?;
        let sz = usize::try_from(ph.p_filesz).map_err(|_| ElfError::OutOfBounds)?;
        let end = off.checked_add(sz).ok_or(ElfError::OutOfBounds)?;
        self.bytes.get(off..end).ok_or(ElfError::OutOfBounds)
    }
}

/// A loadable segment after validation.
#[derive(Debug, Copy, Clone)]
struct Segment<'a> {
    vaddr: VirtualAddress,
    memsz: u64,
    data: &'a [u8],
}

/// A validated executable, ready to be mapped.
pub struct ElfImage<'a> {
    entry: VirtualAddress,
    segments: Vec<Segment<'a>>,
}

impl ElfImage<'_> {
    #[must_use]
    pub const fn entry(&self) -> VirtualAddress {
        self.entry
    }

    /// Page-aligned ranges the segments occupy.
    fn ranges(&self) -> impl Iterator<Item = MemoryRange> + '_ {
        self.segments.iter().map(|s| {
            MemoryRange::new(
                s.vaddr.align_down::<Size4K>(),
                (s.vaddr + s.memsz).align_up::<Size4K>(),
                RangeKind::Normal,
            )
        })
    }
}

/// Check every loadable segment of `bytes` before anything is mapped.
///
/// # Errors
/// A malformed header, a segment outside of the file or a segment that
/// reaches into the stack or kernel half.
pub fn parse(bytes: &[u8]) -> Result<ElfImage<'_>, ElfError> {
    let view = elf64_view(bytes)?;
    let mut segments = Vec::new();
    for ph in view.iter_pt_load() {
        let end = ph
            .p_vaddr
            .as_u64()
            .checked_add(ph.p_memsz)
            .ok_or(ElfError::BadSegment)?;
        if end > USER_STACK_BOTTOM || ph.p_filesz > ph.p_memsz {
            return Err(ElfError::BadSegment);
        }
        segments.push(Segment {
            vaddr: ph.p_vaddr,
            memsz: ph.p_memsz,
            data: view.segment_file_bytes(&ph)?,
        });
    }
    Ok(ElfImage {
        entry: view.entry(),
        segments,
    })
}

/// Where a freshly loaded program starts.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LoadedImage {
    pub entry: VirtualAddress,
    pub stack_top: u64,
}

impl Kernel {
    /// Map `image` into the empty user half of `root`: segments, one heap
    /// page after the highest segment, and the user stack. Every page is
    /// zeroed before the segment bytes are copied in.
    ///
    /// # Errors
    /// When frames run out; whatever was mapped stays owned by `root`.
    pub(crate) fn load_image(
        &self,
        root: PhysicalAddress,
        image: &ElfImage<'_>,
        ranges: &mut Vec<MemoryRange>,
    ) -> Result<LoadedImage, TaskError> {
        let mut top = VirtualAddress::zero();
        for range in image.ranges() {
            self.map_user_range(root, &range)?;
            top = top.max(range.end);
            ranges.push(range);
        }
        for segment in &image.segments {
            self.copy_to_user(root, segment.vaddr.as_u64(), segment.data)
                .map_err(|_| TaskError::OutOfMemory)?;
        }

        let heap = MemoryRange::new(top, top + PAGE_SIZE, RangeKind::Heap);
        self.map_user_range(root, &heap)?;
        ranges.push(heap);

        let stack = MemoryRange::new(
            VirtualAddress::new(USER_STACK_BOTTOM),
            VirtualAddress::new(USER_STACK_TOP),
            RangeKind::Stack,
        );
        self.map_user_range(root, &stack)?;
        ranges.push(stack);

        Ok(LoadedImage {
            entry: image.entry(),
            stack_top: USER_STACK_TOP,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A minimal executable: one segment at `0x40_0000` holding `data`,
    /// entry at its start, and `bss` extra zero bytes.
    pub fn tiny_elf(data: &[u8], bss: u64) -> Vec<u8> {
        let mut f = alloc::vec![0u8; 64 + PH_SIZE];
        f[0..4].copy_from_slice(b"\x7FELF");
        f[4] = 2;
        f[5] = 1;
        f[6] = 1;
        f[16..18].copy_from_slice(&ET_EXEC.to_le_bytes());
        f[18..20].copy_from_slice(&EM_X86_64.to_le_bytes());
        f[20..24].copy_from_slice(&1u32.to_le_bytes());
        f[24..32].copy_from_slice(&0x40_0000u64.to_le_bytes());
        f[32..40].copy_from_slice(&64u64.to_le_bytes());
        f[52..54].copy_from_slice(&64u16.to_le_bytes());
        f[54..56].copy_from_slice(&(PH_SIZE as u16).to_le_bytes());
        f[56..58].copy_from_slice(&1u16.to_le_bytes());

        let ph = &mut f[64..];
        ph[0..4].copy_from_slice(&PT_LOAD.to_le_bytes());
        ph[4..8].copy_from_slice(&5u32.to_le_bytes());
        ph[8..16].copy_from_slice(&((64 + PH_SIZE) as u64).to_le_bytes());
        ph[16..24].copy_from_slice(&0x40_0000u64.to_le_bytes());
        ph[32..40].copy_from_slice(&(data.len() as u64).to_le_bytes());
        ph[40..48].copy_from_slice(&(data.len() as u64 + bss).to_le_bytes());
        f.extend_from_slice(data);
        f
    }

    #[test]
    fn parses_a_single_segment() {
        let bytes = tiny_elf(b"hello", 0x2000);
        let image = parse(&bytes).unwrap();
        assert_eq!(image.entry().as_u64(), 0x40_0000);
        let ranges: Vec<_> = image.ranges().collect();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].start.as_u64(), 0x40_0000);
        assert_eq!(ranges[0].end.as_u64(), 0x40_3000);
        assert_eq!(image.segments[0].data, b"hello");
    }

    #[test]
    fn flags_decode() {
        let bytes = tiny_elf(b"x", 0);
        let view = elf64_view(&bytes).unwrap();
        let ph = view.iter_pt_load().next().unwrap();
        assert!(ph.p_flags.execute());
        assert!(ph.p_flags.read());
        assert!(!ph.p_flags.write());
    }

    #[test]
    fn rejects_bad_headers() {
        assert_eq!(parse(b"short").err(), Some(ElfError::TooShort));

        let mut bytes = tiny_elf(b"x", 0);
        bytes[0] = 0;
        assert_eq!(parse(&bytes).err(), Some(ElfError::BadMagic));

        let mut bytes = tiny_elf(b"x", 0);
        bytes[4] = 1;
        assert_eq!(parse(&bytes).err(), Some(ElfError::BadClass));

        let mut bytes = tiny_elf(b"x", 0);
        bytes[18] = 3;
        assert_eq!(parse(&bytes).err(), Some(ElfError::BadMachine));
    }

    #[test]
    fn rejects_truncated_segments() {
        let mut bytes = tiny_elf(b"hello", 0);
        bytes.truncate(bytes.len() - 2);
        assert_eq!(parse(&bytes).err(), Some(ElfError::OutOfBounds));
    }

    #[test]
    fn rejects_segments_reaching_the_stack() {
        let mut bytes = tiny_elf(b"x", 0);
        bytes[64 + 16..64 + 24].copy_from_slice(&(USER_STACK_BOTTOM - 1).to_le_bytes());
        bytes[64 + 40..64 + 48].copy_from_slice(&2u64.to_le_bytes());
        assert_eq!(parse(&bytes).err(), Some(ElfError::BadSegment));
    }
}
