//! In-memory ELF image
//!
//! [`ElfImage`] owns the complete file contents as a growable byte buffer and
//! exposes typed views over the ELF header and both header tables. All
//! structural edits (inserting bytes, overwriting a range, appending aligned
//! data) go through this type so that bounds are checked in one place.

use crate::{
    Result,
    elf::{ElfHeader, ElfPhdr, ElfShdr},
    format_error,
};

/// A mutable ELF64 little-endian image.
pub struct ElfImage {
    data: Vec<u8>,
    ehdr: ElfHeader,
}

impl ElfImage {
    /// Takes ownership of `data` and validates it as an ELF64 little-endian
    /// image whose program header table (and section header table, if any)
    /// lies inside the buffer.
    ///
    /// The identification bytes are checked before any other field is read.
    pub fn load(data: Vec<u8>) -> Result<Self> {
        let ehdr = ElfHeader::parse(&data)?;
        ehdr.validate_tables(data.len())?;
        #[cfg(feature = "log")]
        log::debug!(
            "[Load] type: {}, phoff: {:#x}, phnum: {}, phentsize: {}, shoff: {:#x}, shnum: {}, shentsize: {}",
            ehdr.e_type,
            ehdr.e_phoff(),
            ehdr.e_phnum(),
            ehdr.e_phentsize(),
            ehdr.e_shoff(),
            ehdr.e_shnum(),
            ehdr.e_shentsize(),
        );
        Ok(Self { data, ehdr })
    }

    /// Returns the ELF header.
    #[inline]
    pub fn header(&self) -> &ElfHeader {
        &self.ehdr
    }

    /// Returns the program header table in file order.
    pub fn program_headers(&self) -> Vec<ElfPhdr> {
        let ehdr = self.header();
        let (start, end) = ehdr.phdr_range();
        self.data[start..end]
            .chunks_exact(ehdr.e_phentsize())
            .map(ElfPhdr::parse)
            .collect()
    }

    /// Returns the section header table in file order, or an empty table if
    /// the image carries no section headers.
    pub fn section_headers(&self) -> Vec<ElfShdr> {
        let ehdr = self.header();
        if ehdr.e_shnum() == 0 {
            return Vec::new();
        }
        let (start, end) = ehdr.shdr_range();
        self.data[start..end]
            .chunks_exact(ehdr.e_shentsize())
            .map(ElfShdr::parse)
            .collect()
    }

    /// Returns the raw image bytes.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the image and returns its bytes.
    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Returns the current size of the image in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `len` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                format_error(format!(
                    "range {offset:#x}+{len:#x} lies outside the image ({:#x} bytes)",
                    self.data.len()
                ))
            })?;
        Ok(&self.data[offset..end])
    }

    /// Returns true if all `len` bytes at `offset` exist and are zero.
    pub fn is_zeroed(&self, offset: usize, len: usize) -> bool {
        self.slice(offset, len)
            .is_ok_and(|bytes| bytes.iter().all(|&b| b == 0))
    }

    /// Inserts `bytes` at `offset`, shifting everything from `offset` onward.
    ///
    /// Offsets stored inside the image are not touched; callers relocate them.
    pub fn insert_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        if offset > self.data.len() {
            return Err(format_error(format!(
                "insertion point {offset:#x} lies past the end of the image ({:#x} bytes)",
                self.data.len()
            )));
        }
        self.data.splice(offset..offset, bytes.iter().copied());
        Ok(())
    }

    /// Replaces the bytes at `offset` with `bytes` without changing the size.
    pub fn overwrite_at(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        self.slice(offset, bytes.len())?;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }

    /// Pads the image with zeros up to a multiple of `align`, appends `bytes`
    /// and returns the offset they were placed at.
    pub fn append_aligned(&mut self, bytes: &[u8], align: usize) -> usize {
        debug_assert!(align.is_power_of_two());
        let offset = self.data.len().next_multiple_of(align);
        self.data.resize(offset, 0);
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Replaces the header, writing its mutable fields back into the image.
    pub(crate) fn write_header(&mut self, ehdr: ElfHeader) {
        ehdr.write_to(&mut self.data);
        self.ehdr = ehdr;
    }

    /// Rewrites program header `index` in place.
    pub(crate) fn write_program_header(&mut self, index: usize, phdr: &ElfPhdr) -> Result<()> {
        let offset = self.ehdr.e_phoff() + index * self.ehdr.e_phentsize();
        self.overwrite_at(offset, &phdr.to_bytes())
    }

    /// Rewrites section header `index` in place.
    pub(crate) fn write_section_header(&mut self, index: usize, shdr: &ElfShdr) -> Result<()> {
        let offset = self.ehdr.e_shoff() + index * self.ehdr.e_shentsize();
        self.overwrite_at(offset, &shdr.to_bytes())
    }
}
