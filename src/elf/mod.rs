//! ELF64 data structures: the file header and the program header, section
//! header and symbol records the patcher reads and rewrites.

mod defs;
mod ehdr;

pub(crate) use defs::Ehdr;

/// Decoded header-table records and their on-disk sizes.
pub use defs::{EHDR_SIZE, ElfPhdr, ElfShdr, ElfSymbol, PHDR_SIZE, SHDR_SIZE, SYM_SIZE};
pub use ehdr::ElfHeader;
/// ELF ABI constants and definitions from the elf crate.
pub use elf::abi::*;
