//! `gen-kernel` generates minimal ELF64 little-endian kernel images for testing
//! the PVH note patcher.
//!
//! The generated file layout is:
//!
//! ```text
//! ELF header | program headers | padding | .text | .data | .symtab | .strtab | .shstrtab | section headers
//! ```
//!
//! The padding after the program header table is configurable in size and fill
//! byte, which is what decides how the patcher can make room for a new entry.
//!
//! # Example
//!
//! ```
//! use gen_kernel::{KernelConfig, KernelWriter, SymbolDesc};
//!
//! let config = KernelConfig::default()
//!     .with_padding(64, 0)
//!     .with_symbol(SymbolDesc::func("pvh_start", 0x102000));
//! let kernel = KernelWriter::new(config).write().unwrap();
//! assert_eq!(kernel.phnum, 2);
//! ```

use anyhow::Result;
use byteorder::{LittleEndian, WriteBytesExt};
use object::elf::*;
use std::path::Path;

const EHDR_SIZE: u64 = 64;
const PHDR_SIZE: u64 = 56;
const SHDR_SIZE: u64 = 64;
const SYM_SIZE: u64 = 24;
const SECTION_ALIGN: u64 = 8;

/// Description of a symbol placed in `.symtab`.
#[derive(Clone, Debug)]
pub struct SymbolDesc {
    /// Name of the symbol.
    pub name: String,
    /// Value (virtual address) of the symbol.
    pub value: u64,
}

impl SymbolDesc {
    /// Create a global function symbol defined in `.text`.
    pub fn func(name: impl Into<String>, value: u64) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

/// Configuration of a generated kernel image.
#[derive(Clone, Debug)]
pub struct KernelConfig {
    /// Load address of `.text` (default: 0x100000)
    pub base_addr: u64,
    /// Bytes between the end of the program header table and `.text` (default: 64)
    pub padding: usize,
    /// Fill byte of that padding (default: 0)
    pub padding_fill: u8,
    /// Contents of `.text` (default: 16 `nop`s)
    pub text: Vec<u8>,
    /// Contents of `.data` (default: 16 bytes of 0xAA)
    pub data: Vec<u8>,
    /// Symbols of `.symtab`
    pub symbols: Vec<SymbolDesc>,
    /// Whether to emit `.symtab` and `.strtab` at all (default: true)
    pub symtab: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            base_addr: 0x100000,
            padding: 64,
            padding_fill: 0,
            text: vec![0x90; 16],
            data: vec![0xaa; 16],
            symbols: Vec::new(),
            symtab: true,
        }
    }
}

impl KernelConfig {
    /// Set the padding size and fill byte after the program header table
    pub fn with_padding(mut self, padding: usize, fill: u8) -> Self {
        self.padding = padding;
        self.padding_fill = fill;
        self
    }

    /// Set the contents of `.text`
    pub fn with_text(mut self, text: &[u8]) -> Self {
        self.text = text.to_vec();
        self
    }

    /// Add a symbol to `.symtab`
    pub fn with_symbol(mut self, symbol: SymbolDesc) -> Self {
        self.symbols.push(symbol);
        self
    }

    /// Leave out `.symtab` and `.strtab`
    pub fn without_symtab(mut self) -> Self {
        self.symtab = false;
        self
    }
}

/// A generated image and the layout facts tests assert against.
#[derive(Clone, Debug)]
pub struct KernelImage {
    /// Raw ELF file bytes.
    pub data: Vec<u8>,
    /// Number of program headers.
    pub phnum: u16,
    /// Number of section headers.
    pub shnum: u16,
    /// End offset of the program header table.
    pub phdr_end: u64,
    /// File offset of `.text`.
    pub text_offset: u64,
    /// File offset of the section header table.
    pub shoff: u64,
}

struct StringTable {
    data: Vec<u8>,
}

impl StringTable {
    fn new() -> Self {
        Self { data: vec![0u8] }
    }

    fn add(&mut self, s: &str) -> u32 {
        let idx = self.data.len() as u32;
        self.data.extend_from_slice(s.as_bytes());
        self.data.push(0);
        idx
    }
}

struct Phdr {
    flags: u32,
    offset: u64,
    vaddr: u64,
    size: u64,
}

impl Phdr {
    fn write(&self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        buf.write_u32::<LittleEndian>(PT_LOAD)?;
        buf.write_u32::<LittleEndian>(self.flags)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        buf.write_u64::<LittleEndian>(self.vaddr)?;
        buf.write_u64::<LittleEndian>(self.vaddr)?;
        buf.write_u64::<LittleEndian>(self.size)?;
        buf.write_u64::<LittleEndian>(self.size)?;
        buf.write_u64::<LittleEndian>(0x10)?;
        Ok(())
    }
}

#[derive(Default)]
struct Shdr {
    name: u32,
    type_: u32,
    flags: u64,
    addr: u64,
    offset: u64,
    size: u64,
    link: u32,
    info: u32,
    align: u64,
    entsize: u64,
}

impl Shdr {
    fn write(&self, buf: &mut Vec<u8>) -> std::io::Result<()> {
        buf.write_u32::<LittleEndian>(self.name)?;
        buf.write_u32::<LittleEndian>(self.type_)?;
        buf.write_u64::<LittleEndian>(self.flags)?;
        buf.write_u64::<LittleEndian>(self.addr)?;
        buf.write_u64::<LittleEndian>(self.offset)?;
        buf.write_u64::<LittleEndian>(self.size)?;
        buf.write_u32::<LittleEndian>(self.link)?;
        buf.write_u32::<LittleEndian>(self.info)?;
        buf.write_u64::<LittleEndian>(self.align)?;
        buf.write_u64::<LittleEndian>(self.entsize)?;
        Ok(())
    }
}

fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

fn pad_to(buf: &mut Vec<u8>, offset: u64) {
    buf.resize(offset as usize, 0);
}

/// Writes kernel images according to a [`KernelConfig`].
pub struct KernelWriter {
    config: KernelConfig,
}

impl KernelWriter {
    pub fn new(config: KernelConfig) -> Self {
        Self { config }
    }

    /// Generate the image in memory.
    pub fn write(&self) -> Result<KernelImage> {
        let config = &self.config;
        let phnum: u16 = 2;
        let phdr_end = EHDR_SIZE + PHDR_SIZE * u64::from(phnum);

        // Body: padding, then sections laid out back to back.
        let mut body = Vec::new();
        body.resize(config.padding, config.padding_fill);
        let text_offset = phdr_end + body.len() as u64;
        body.extend_from_slice(&config.text);

        let data_offset = align_up(phdr_end + body.len() as u64, SECTION_ALIGN);
        pad_to(&mut body, data_offset - phdr_end);
        body.extend_from_slice(&config.data);
        let data_vaddr = config.base_addr + align_up(config.text.len() as u64, 0x1000);

        let mut shstrtab = StringTable::new();
        let mut shdrs = vec![Shdr::default()];
        shdrs.push(Shdr {
            name: shstrtab.add(".text"),
            type_: SHT_PROGBITS,
            flags: u64::from(SHF_ALLOC | SHF_EXECINSTR),
            addr: config.base_addr,
            offset: text_offset,
            size: config.text.len() as u64,
            align: 16,
            ..Default::default()
        });
        shdrs.push(Shdr {
            name: shstrtab.add(".data"),
            type_: SHT_PROGBITS,
            flags: u64::from(SHF_ALLOC | SHF_WRITE),
            addr: data_vaddr,
            offset: data_offset,
            size: config.data.len() as u64,
            align: SECTION_ALIGN,
            ..Default::default()
        });

        if config.symtab {
            let mut strtab = StringTable::new();
            let mut symtab = Vec::new();
            // null symbol
            symtab.resize(SYM_SIZE as usize, 0);
            for symbol in &config.symbols {
                symtab.write_u32::<LittleEndian>(strtab.add(&symbol.name))?;
                symtab.write_u8((STB_GLOBAL << 4) | STT_FUNC)?;
                symtab.write_u8(0)?;
                symtab.write_u16::<LittleEndian>(1)?;
                symtab.write_u64::<LittleEndian>(symbol.value)?;
                symtab.write_u64::<LittleEndian>(0)?;
            }

            let symtab_offset = align_up(phdr_end + body.len() as u64, SECTION_ALIGN);
            pad_to(&mut body, symtab_offset - phdr_end);
            body.extend_from_slice(&symtab);
            let strtab_index = shdrs.len() as u32 + 1;
            shdrs.push(Shdr {
                name: shstrtab.add(".symtab"),
                type_: SHT_SYMTAB,
                offset: symtab_offset,
                size: symtab.len() as u64,
                link: strtab_index,
                info: 1,
                align: SECTION_ALIGN,
                entsize: SYM_SIZE,
                ..Default::default()
            });

            let strtab_offset = phdr_end + body.len() as u64;
            body.extend_from_slice(&strtab.data);
            shdrs.push(Shdr {
                name: shstrtab.add(".strtab"),
                type_: SHT_STRTAB,
                offset: strtab_offset,
                size: strtab.data.len() as u64,
                align: 1,
                ..Default::default()
            });
        }

        let shstrndx = shdrs.len() as u16;
        let shstrtab_name = shstrtab.add(".shstrtab");
        let shstrtab_offset = phdr_end + body.len() as u64;
        body.extend_from_slice(&shstrtab.data);
        shdrs.push(Shdr {
            name: shstrtab_name,
            type_: SHT_STRTAB,
            offset: shstrtab_offset,
            size: shstrtab.data.len() as u64,
            align: 1,
            ..Default::default()
        });

        let shoff = align_up(phdr_end + body.len() as u64, SECTION_ALIGN);
        pad_to(&mut body, shoff - phdr_end);
        let shnum = shdrs.len() as u16;

        let mut data = Vec::new();
        // e_ident
        data.extend_from_slice(&ELFMAG);
        data.write_u8(ELFCLASS64)?;
        data.write_u8(ELFDATA2LSB)?;
        data.write_u8(EV_CURRENT)?;
        data.write_u8(ELFOSABI_NONE)?;
        data.resize(16, 0);
        data.write_u16::<LittleEndian>(ET_EXEC)?;
        data.write_u16::<LittleEndian>(EM_X86_64)?;
        data.write_u32::<LittleEndian>(u32::from(EV_CURRENT))?;
        data.write_u64::<LittleEndian>(config.base_addr)?;
        data.write_u64::<LittleEndian>(EHDR_SIZE)?;
        data.write_u64::<LittleEndian>(shoff)?;
        data.write_u32::<LittleEndian>(0)?;
        data.write_u16::<LittleEndian>(EHDR_SIZE as u16)?;
        data.write_u16::<LittleEndian>(PHDR_SIZE as u16)?;
        data.write_u16::<LittleEndian>(phnum)?;
        data.write_u16::<LittleEndian>(SHDR_SIZE as u16)?;
        data.write_u16::<LittleEndian>(shnum)?;
        data.write_u16::<LittleEndian>(shstrndx)?;

        Phdr {
            flags: PF_R | PF_X,
            offset: text_offset,
            vaddr: config.base_addr,
            size: config.text.len() as u64,
        }
        .write(&mut data)?;
        Phdr {
            flags: PF_R | PF_W,
            offset: data_offset,
            vaddr: data_vaddr,
            size: config.data.len() as u64,
        }
        .write(&mut data)?;

        data.extend_from_slice(&body);
        for shdr in &shdrs {
            shdr.write(&mut data)?;
        }

        Ok(KernelImage {
            data,
            phnum,
            shnum,
            phdr_end,
            text_offset,
            shoff,
        })
    }

    /// Generate the image and write it to `path`.
    pub fn write_file(&self, path: &Path) -> Result<KernelImage> {
        let image = self.write()?;
        std::fs::write(path, &image.data)?;
        Ok(image)
    }
}
