//! ELF header parsing and validation
//!
//! This module decodes the ELF64 file header and checks that the image is one
//! the patcher understands: correct magic, 64-bit class, little-endian data.
//! Those three checks run before anything else is read from the file.

use crate::{
    Result,
    elf::{EHDR_SIZE, Ehdr, PHDR_SIZE, SHDR_SIZE},
    format_error,
};
use byteorder::{ByteOrder, LittleEndian};
use core::ops::Deref;
use elf::abi::{EI_CLASS, EI_DATA, EI_NIDENT, ELFCLASS64, ELFDATA2LSB, ELFMAGIC};

/// A wrapper around the ELF header structure
///
/// The header is decoded from the image on demand, so a value of this type is
/// a snapshot. Mutations go through [`ElfHeader::write_to`] on the image bytes.
#[repr(transparent)]
pub struct ElfHeader {
    /// The underlying ELF header structure
    ehdr: Ehdr,
}

impl Clone for ElfHeader {
    fn clone(&self) -> Self {
        Self {
            ehdr: Ehdr {
                e_ident: self.e_ident,
                e_type: self.e_type,
                e_machine: self.e_machine,
                e_version: self.e_version,
                e_entry: self.e_entry,
                e_phoff: self.e_phoff,
                e_shoff: self.e_shoff,
                e_flags: self.e_flags,
                e_ehsize: self.e_ehsize,
                e_phentsize: self.e_phentsize,
                e_phnum: self.e_phnum,
                e_shentsize: self.e_shentsize,
                e_shnum: self.e_shnum,
                e_shstrndx: self.e_shstrndx,
            },
        }
    }
}

impl Deref for ElfHeader {
    type Target = Ehdr;

    fn deref(&self) -> &Self::Target {
        &self.ehdr
    }
}

impl ElfHeader {
    /// Parses and validates an ELF header from the start of `data`.
    ///
    /// # Returns
    /// * `Ok(ElfHeader)` - The decoded header
    /// * `Err(Error::Format)` - If the identification bytes are wrong or the
    ///   data is too short to hold a header
    pub(crate) fn parse(data: &[u8]) -> Result<Self> {
        Self::validate_ident(data)?;
        if data.len() < EHDR_SIZE {
            return Err(format_error(format!(
                "truncated ELF header: {} bytes, expected {}",
                data.len(),
                EHDR_SIZE
            )));
        }

        let mut e_ident = [0u8; EI_NIDENT];
        e_ident.copy_from_slice(&data[..EI_NIDENT]);
        Ok(Self {
            ehdr: Ehdr {
                e_ident,
                e_type: LittleEndian::read_u16(&data[16..18]),
                e_machine: LittleEndian::read_u16(&data[18..20]),
                e_version: LittleEndian::read_u32(&data[20..24]),
                e_entry: LittleEndian::read_u64(&data[24..32]),
                e_phoff: LittleEndian::read_u64(&data[32..40]),
                e_shoff: LittleEndian::read_u64(&data[40..48]),
                e_flags: LittleEndian::read_u32(&data[48..52]),
                e_ehsize: LittleEndian::read_u16(&data[52..54]),
                e_phentsize: LittleEndian::read_u16(&data[54..56]),
                e_phnum: LittleEndian::read_u16(&data[56..58]),
                e_shentsize: LittleEndian::read_u16(&data[58..60]),
                e_shnum: LittleEndian::read_u16(&data[60..62]),
                e_shstrndx: LittleEndian::read_u16(&data[62..64]),
            },
        })
    }

    /// Checks the identification bytes
    ///
    /// 1. Checks the ELF magic bytes
    /// 2. Verifies the file class is 64-bit
    /// 3. Verifies the data encoding is little-endian
    fn validate_ident(data: &[u8]) -> Result<()> {
        if data.len() < 4 || data[0..4] != ELFMAGIC {
            return Err(format_error("invalid ELF magic"));
        }
        match data.get(EI_CLASS) {
            Some(&ELFCLASS64) => {}
            Some(class) => {
                return Err(format_error(format!(
                    "unsupported ELF class {class}, only ELF64 is supported"
                )));
            }
            None => return Err(format_error("truncated ELF identification")),
        }
        match data.get(EI_DATA) {
            Some(&ELFDATA2LSB) => Ok(()),
            Some(encoding) => Err(format_error(format!(
                "unsupported data encoding {encoding}, only little-endian is supported"
            ))),
            None => Err(format_error("truncated ELF identification")),
        }
    }

    /// Checks that both header tables have the expected entry sizes and lie
    /// within an image of `len` bytes.
    pub(crate) fn validate_tables(&self, len: usize) -> Result<()> {
        if self.e_phnum() == 0 || self.e_phoff() < EHDR_SIZE {
            return Err(format_error("image has no program header table"));
        }
        if self.e_phentsize() != PHDR_SIZE {
            return Err(format_error(format!(
                "unexpected program header entry size {}",
                self.e_phentsize()
            )));
        }
        let (_, phdr_end) = self.phdr_range();
        if phdr_end > len {
            return Err(format_error(format!(
                "program header table ends at {phdr_end:#x}, past the end of the file ({len:#x})"
            )));
        }

        if self.e_shnum() == 0 && self.e_shoff() != 0 {
            // Extended numbering keeps the real count in section header 0.
            return Err(format_error(
                "extended section numbering (e_shnum = 0, e_shoff != 0) is not supported",
            ));
        }
        if self.e_shnum() != 0 {
            if self.e_shentsize() != SHDR_SIZE {
                return Err(format_error(format!(
                    "unexpected section header entry size {}",
                    self.e_shentsize()
                )));
            }
            let (_, shdr_end) = self.shdr_range();
            if shdr_end > len {
                return Err(format_error(format!(
                    "section header table ends at {shdr_end:#x}, past the end of the file ({len:#x})"
                )));
            }
        }
        Ok(())
    }

    /// Encodes the mutable fields (`e_phnum` and `e_shoff`) back into `data`.
    pub(crate) fn write_to(&self, data: &mut [u8]) {
        LittleEndian::write_u64(&mut data[40..48], self.ehdr.e_shoff);
        LittleEndian::write_u16(&mut data[56..58], self.ehdr.e_phnum);
    }

    pub(crate) fn set_e_phnum(&mut self, phnum: u16) {
        self.ehdr.e_phnum = phnum;
    }

    pub(crate) fn set_e_shoff(&mut self, shoff: usize) {
        self.ehdr.e_shoff = shoff as u64;
    }

    /// Gets the number of program headers
    #[inline]
    pub fn e_phnum(&self) -> usize {
        self.ehdr.e_phnum as usize
    }

    /// Gets the size of each program header entry
    #[inline]
    pub fn e_phentsize(&self) -> usize {
        self.ehdr.e_phentsize as usize
    }

    /// Gets the file offset of the program header table
    #[inline]
    pub fn e_phoff(&self) -> usize {
        self.ehdr.e_phoff as usize
    }

    /// Gets the file offset of the section header table
    #[inline]
    pub fn e_shoff(&self) -> usize {
        self.ehdr.e_shoff as usize
    }

    /// Gets the size of each section header entry
    #[inline]
    pub fn e_shentsize(&self) -> usize {
        self.ehdr.e_shentsize as usize
    }

    /// Gets the number of section headers
    #[inline]
    pub fn e_shnum(&self) -> usize {
        self.ehdr.e_shnum as usize
    }

    /// Calculates the byte range of the program header table
    ///
    /// # Returns
    /// A tuple containing:
    /// 1. The start offset of the program header table
    /// 2. The end offset of the program header table
    #[inline]
    pub fn phdr_range(&self) -> (usize, usize) {
        let phdrs_size = self.e_phentsize() * self.e_phnum();
        let phdr_start = self.e_phoff();
        let phdr_end = phdr_start.saturating_add(phdrs_size);
        (phdr_start, phdr_end)
    }

    /// Calculates the byte range of the section header table
    ///
    /// # Returns
    /// A tuple containing:
    /// 1. The start offset of the section header table
    /// 2. The end offset of the section header table
    #[inline]
    pub fn shdr_range(&self) -> (usize, usize) {
        let shdrs_size = self.e_shentsize() * self.e_shnum();
        let shdr_start = self.e_shoff();
        let shdr_end = shdr_start.saturating_add(shdrs_size);
        (shdr_start, shdr_end)
    }
}
