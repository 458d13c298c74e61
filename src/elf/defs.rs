//! ELF64 record definitions.
//!
//! The records are the `elf` crate's `Elf64_*` structures wrapped in small
//! newtypes. They are decoded from and encoded into little-endian byte slices
//! rather than cast in place, since a patched image is a growable buffer with
//! no alignment guarantees.

use byteorder::{ByteOrder, LittleEndian};
use core::ops::{Deref, DerefMut};
use elf::abi::{PT_NOTE, SHT_NULL};

pub(crate) type Ehdr = elf::file::Elf64_Ehdr;
pub(crate) type Phdr = elf::segment::Elf64_Phdr;
pub(crate) type Shdr = elf::section::Elf64_Shdr;
pub(crate) type Sym = elf::symbol::Elf64_Sym;

/// Size of the ELF64 file header.
pub const EHDR_SIZE: usize = 64;
/// Size of one ELF64 program header entry.
pub const PHDR_SIZE: usize = 56;
/// Size of one ELF64 section header entry.
pub const SHDR_SIZE: usize = 64;
/// Size of one ELF64 symbol table entry.
pub const SYM_SIZE: usize = 24;

/// ELF program header.
///
/// Program headers describe the segments of the image. The injector reads
/// every entry to find where real content begins, relocates their offsets when
/// it has to shift the file, and encodes one new `PT_NOTE` entry.
#[derive(Debug)]
#[repr(transparent)]
pub struct ElfPhdr {
    phdr: Phdr,
}

impl ElfPhdr {
    /// Creates a program header describing a note segment of `size` bytes at
    /// file offset `offset`. Notes are never loaded, so both addresses are zero.
    pub(crate) fn note(flags: u32, offset: usize, size: usize, align: usize) -> Self {
        Self {
            phdr: Phdr {
                p_type: PT_NOTE,
                p_flags: flags,
                p_offset: offset as u64,
                p_vaddr: 0,
                p_paddr: 0,
                p_filesz: size as u64,
                p_memsz: size as u64,
                p_align: align as u64,
            },
        }
    }

    /// Decodes an entry from the first [`PHDR_SIZE`] bytes of `data`.
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            phdr: Phdr {
                p_type: LittleEndian::read_u32(&data[0..4]),
                p_flags: LittleEndian::read_u32(&data[4..8]),
                p_offset: LittleEndian::read_u64(&data[8..16]),
                p_vaddr: LittleEndian::read_u64(&data[16..24]),
                p_paddr: LittleEndian::read_u64(&data[24..32]),
                p_filesz: LittleEndian::read_u64(&data[32..40]),
                p_memsz: LittleEndian::read_u64(&data[40..48]),
                p_align: LittleEndian::read_u64(&data[48..56]),
            },
        }
    }

    /// Encodes the entry into its on-disk form.
    pub fn to_bytes(&self) -> [u8; PHDR_SIZE] {
        let mut buf = [0u8; PHDR_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.p_type);
        LittleEndian::write_u32(&mut buf[4..8], self.p_flags);
        LittleEndian::write_u64(&mut buf[8..16], self.p_offset);
        LittleEndian::write_u64(&mut buf[16..24], self.p_vaddr);
        LittleEndian::write_u64(&mut buf[24..32], self.p_paddr);
        LittleEndian::write_u64(&mut buf[32..40], self.p_filesz);
        LittleEndian::write_u64(&mut buf[40..48], self.p_memsz);
        LittleEndian::write_u64(&mut buf[48..56], self.p_align);
        buf
    }

    #[inline]
    pub fn p_offset(&self) -> usize {
        self.phdr.p_offset as usize
    }

    #[inline]
    pub fn p_filesz(&self) -> usize {
        self.phdr.p_filesz as usize
    }
}

impl Deref for ElfPhdr {
    type Target = Phdr;

    fn deref(&self) -> &Self::Target {
        &self.phdr
    }
}

impl DerefMut for ElfPhdr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.phdr
    }
}

/// ELF section header.
///
/// Only the fields the patcher needs are interpreted (type, offset, size,
/// link and entry size), but every field is decoded so an entry can be written
/// back unchanged apart from a relocated `sh_offset`.
#[derive(Debug)]
#[repr(transparent)]
pub struct ElfShdr {
    shdr: Shdr,
}

impl ElfShdr {
    /// Decodes an entry from the first [`SHDR_SIZE`] bytes of `data`.
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            shdr: Shdr {
                sh_name: LittleEndian::read_u32(&data[0..4]),
                sh_type: LittleEndian::read_u32(&data[4..8]),
                sh_flags: LittleEndian::read_u64(&data[8..16]),
                sh_addr: LittleEndian::read_u64(&data[16..24]),
                sh_offset: LittleEndian::read_u64(&data[24..32]),
                sh_size: LittleEndian::read_u64(&data[32..40]),
                sh_link: LittleEndian::read_u32(&data[40..44]),
                sh_info: LittleEndian::read_u32(&data[44..48]),
                sh_addralign: LittleEndian::read_u64(&data[48..56]),
                sh_entsize: LittleEndian::read_u64(&data[56..64]),
            },
        }
    }

    /// Encodes the entry into its on-disk form.
    pub fn to_bytes(&self) -> [u8; SHDR_SIZE] {
        let mut buf = [0u8; SHDR_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.sh_name);
        LittleEndian::write_u32(&mut buf[4..8], self.sh_type);
        LittleEndian::write_u64(&mut buf[8..16], self.sh_flags);
        LittleEndian::write_u64(&mut buf[16..24], self.sh_addr);
        LittleEndian::write_u64(&mut buf[24..32], self.sh_offset);
        LittleEndian::write_u64(&mut buf[32..40], self.sh_size);
        LittleEndian::write_u32(&mut buf[40..44], self.sh_link);
        LittleEndian::write_u32(&mut buf[44..48], self.sh_info);
        LittleEndian::write_u64(&mut buf[48..56], self.sh_addralign);
        LittleEndian::write_u64(&mut buf[56..64], self.sh_entsize);
        buf
    }

    /// Returns true for the reserved null entry, which describes no content.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.sh_type == SHT_NULL
    }

    #[inline]
    pub fn sh_offset(&self) -> usize {
        self.shdr.sh_offset as usize
    }

    #[inline]
    pub fn sh_size(&self) -> usize {
        self.shdr.sh_size as usize
    }

    /// Returns the byte range `[sh_offset, sh_offset + sh_size)` of the section.
    #[inline]
    pub fn range(&self) -> (usize, usize) {
        let start = self.sh_offset();
        (start, start.saturating_add(self.sh_size()))
    }
}

impl Deref for ElfShdr {
    type Target = Shdr;

    fn deref(&self) -> &Self::Target {
        &self.shdr
    }
}

impl DerefMut for ElfShdr {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.shdr
    }
}

/// ELF symbol table entry.
#[repr(transparent)]
pub struct ElfSymbol {
    sym: Sym,
}

impl ElfSymbol {
    /// Decodes an entry from the first [`SYM_SIZE`] bytes of `data`.
    pub(crate) fn parse(data: &[u8]) -> Self {
        Self {
            sym: Sym {
                st_name: LittleEndian::read_u32(&data[0..4]),
                st_info: data[4],
                st_other: data[5],
                st_shndx: LittleEndian::read_u16(&data[6..8]),
                st_value: LittleEndian::read_u64(&data[8..16]),
                st_size: LittleEndian::read_u64(&data[16..24]),
            },
        }
    }

    /// Returns the offset of the symbol name in the linked string table.
    #[inline]
    pub fn st_name(&self) -> usize {
        self.sym.st_name as usize
    }

    /// Returns the symbol value.
    #[inline]
    pub fn st_value(&self) -> u64 {
        self.sym.st_value
    }
}
