//! # ELF Header Parsing

use alloc::vec::Vec;
use core::mem::size_of;
use core::ptr::read_unaligned;
use kernel_memory_addresses::VirtualAddress;

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names, dead_code)]
struct Elf64Ehdr {
    e_ident: [u8; 16],
    e_type: u16,
    e_machine: u16,
    e_version: u32,
    e_entry: u64,
    e_phoff: u64,
    e_shoff: u64,
    e_flags: u32,
    e_ehsize: u16,
    e_phentsize: u16,
    e_phnum: u16,
    e_shentsize: u16,
    e_shnum: u16,
    e_shstrndx: u16,
}

#[repr(C)]
#[derive(Clone, Copy)]
#[allow(clippy::struct_field_names, dead_code)]
struct Elf64Phdr {
    p_type: u32,
    p_flags: PFlags,
    p_offset: u64,
    p_vaddr: u64,
    p_paddr: u64,
    p_filesz: u64,
    p_memsz: u64,
    p_align: u64,
}

const EI_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ET_EXEC: u16 = 2;
const EM_X86_64: u16 = 62;
const PT_LOAD: u32 = 1;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ElfParseError {
    #[error("file is shorter than its headers claim")]
    Truncated,
    #[error("not a little-endian ELF64 file")]
    NotElf64,
    #[error("not an x86-64 executable")]
    WrongTarget,
    #[error("unexpected program header size {0}")]
    PhentSize(u16),
}

/// One `PT_LOAD` program header.
#[derive(Debug, Clone, Copy)]
pub struct LoadSegment {
    pub vaddr: VirtualAddress,
    pub offset: u64,
    pub filesz: u64,
    pub memsz: u64,
    pub flags: PFlags,
}

#[derive(Debug)]
pub struct ElfHeader {
    pub entry: VirtualAddress,
    pub segments: Vec<LoadSegment>,
}

impl ElfHeader {
    /// Parse a little-endian x86-64 ELF64 executable and collect its
    /// `PT_LOAD` segments.
    ///
    /// # Errors
    /// Any header that fails validation or points outside `bytes`.
    pub fn parse_elf64(bytes: &[u8]) -> Result<Self, ElfParseError> {
        if bytes.len() < size_of::<Elf64Ehdr>() {
            return Err(ElfParseError::Truncated);
        }
        let ehdr = unsafe { read_unaligned(bytes.as_ptr().cast::<Elf64Ehdr>()) };

        if ehdr.e_ident[..4] != EI_MAGIC
            || ehdr.e_ident[4] != ELFCLASS64
            || ehdr.e_ident[5] != ELFDATA2LSB
        {
            return Err(ElfParseError::NotElf64);
        }
        if ehdr.e_machine != EM_X86_64 || ehdr.e_type != ET_EXEC {
            return Err(ElfParseError::WrongTarget);
        }
        if usize::from(ehdr.e_phentsize) != size_of::<Elf64Phdr>() {
            return Err(ElfParseError::PhentSize(ehdr.e_phentsize));
        }

        let phoff = usize::try_from(ehdr.e_phoff).map_err(|_| ElfParseError::Truncated)?;
        let phentsize = usize::from(ehdr.e_phentsize);
        let end = usize::from(ehdr.e_phnum)
            .checked_mul(phentsize)
            .and_then(|table| table.checked_add(phoff))
            .ok_or(ElfParseError::Truncated)?;
        if end > bytes.len() {
            return Err(ElfParseError::Truncated);
        }

        let segments = (0..usize::from(ehdr.e_phnum))
            .map(|i| unsafe {
                read_unaligned(bytes.as_ptr().add(phoff + i * phentsize).cast::<Elf64Phdr>())
            })
            .filter(|ph| ph.p_type == PT_LOAD)
            .map(|ph| LoadSegment {
                vaddr: VirtualAddress::new(ph.p_vaddr),
                offset: ph.p_offset,
                filesz: ph.p_filesz,
                memsz: ph.p_memsz,
                flags: ph.p_flags,
            })
            .collect();

        Ok(Self {
            entry: VirtualAddress::new(ehdr.e_entry),
            segments,
        })
    }
}

/// `Elf64_Phdr.p_flags`.
#[bitfield_struct::bitfield(u32)]
pub struct PFlags {
    pub execute: bool,
    pub write: bool,
    pub read: bool,
    #[bits(29)]
    __: u32,
}

