//! Entry symbol resolution
//!
//! The entry address is taken, in order of precedence, from an explicit value
//! supplied by the caller, from the image's own `.symtab`, or from an external
//! [`SymbolSource`]. The external source exists for images whose symbol table
//! is stripped or unusable but that a tool such as `objdump` can still read.

use crate::{
    Result,
    elf::{ElfShdr, ElfSymbol, SHT_STRTAB, SHT_SYMTAB, SYM_SIZE},
    image::ElfImage,
    symbol_not_found,
};
use core::ffi::CStr;
use std::{
    path::{Path, PathBuf},
    process::Command,
};

/// Symbol looked up when no other name is configured.
pub const DEFAULT_ENTRY_SYMBOL: &str = "pvh_start";

/// ELF string table wrapper
///
/// Gives bounds-checked access to the null-terminated strings of a `SHT_STRTAB`
/// section.
pub(crate) struct ElfStringTable<'data> {
    data: &'data [u8],
}

impl<'data> ElfStringTable<'data> {
    pub(crate) const fn new(data: &'data [u8]) -> Self {
        ElfStringTable { data }
    }

    /// Get a C-style string from the string table at the specified offset
    ///
    /// Returns `None` if the offset lies outside the table or the string is
    /// not terminated inside it.
    #[inline]
    pub(crate) fn get_cstr(&self, offset: usize) -> Option<&'data CStr> {
        CStr::from_bytes_until_nul(self.data.get(offset..)?).ok()
    }
}

/// An external provider of symbol addresses, consulted when the image's own
/// symbol table cannot resolve the entry symbol.
pub trait SymbolSource {
    /// Looks up `name` in the file at `path`.
    fn lookup(&self, path: &Path, name: &str) -> Option<u64>;
}

impl<F> SymbolSource for F
where
    F: Fn(&Path, &str) -> Option<u64>,
{
    fn lookup(&self, path: &Path, name: &str) -> Option<u64> {
        self(path, name)
    }
}

/// A symbol source that never finds anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSymbolSource;

impl SymbolSource for NoSymbolSource {
    fn lookup(&self, _path: &Path, _name: &str) -> Option<u64> {
        None
    }
}

/// Resolves symbols by running `objdump -t` on the file.
#[derive(Debug, Clone)]
pub struct Objdump {
    program: PathBuf,
}

impl Default for Objdump {
    fn default() -> Self {
        Self::new("objdump")
    }
}

impl Objdump {
    /// Uses `program` as the objdump executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SymbolSource for Objdump {
    fn lookup(&self, path: &Path, name: &str) -> Option<u64> {
        let output = match Command::new(&self.program).arg("-t").arg(path).output() {
            Ok(output) => output,
            Err(_err) => {
                #[cfg(feature = "log")]
                log::debug!("failed to run {}: {_err}", self.program.display());
                return None;
            }
        };
        parse_objdump_symbols(&String::from_utf8_lossy(&output.stdout), name)
    }
}

/// Finds `name` in `objdump -t` output.
///
/// A line matches when one of its whitespace-separated fields equals `name`;
/// its first field is the symbol value in hexadecimal.
pub fn parse_objdump_symbols(output: &str, name: &str) -> Option<u64> {
    output.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let value = fields.next()?;
        if !fields.any(|field| field == name) {
            return None;
        }
        u64::from_str_radix(value, 16).ok()
    })
}

/// Looks `name` up in the image's embedded symbol table.
///
/// Returns `None` if the image has no `SHT_SYMTAB` section, the table has no
/// valid linked `SHT_STRTAB`, or no symbol carries that exact name.
pub fn find_symbol(image: &ElfImage, name: &str) -> Option<u64> {
    let shdrs = image.section_headers();
    let symtab = shdrs.iter().find(|shdr| shdr.sh_type == SHT_SYMTAB)?;
    let strtab = shdrs
        .get(symtab.sh_link as usize)
        .filter(|shdr| shdr.sh_type == SHT_STRTAB)?;
    let strtab = ElfStringTable::new(section_data(image, strtab)?);

    let entsize = match symtab.sh_entsize as usize {
        0 => SYM_SIZE,
        size if size < SYM_SIZE => return None,
        size => size,
    };
    section_data(image, symtab)?
        .chunks_exact(entsize)
        .map(ElfSymbol::parse)
        .filter(|sym| sym.st_name() != 0)
        .find(|sym| {
            strtab
                .get_cstr(sym.st_name())
                .is_some_and(|sym_name| sym_name.to_bytes() == name.as_bytes())
        })
        .map(|sym| sym.st_value())
}

fn section_data<'a>(image: &'a ElfImage, shdr: &ElfShdr) -> Option<&'a [u8]> {
    image.slice(shdr.sh_offset(), shdr.sh_size()).ok()
}

/// Resolves the entry symbol of an image.
pub struct SymbolResolver<S> {
    name: String,
    source: Option<S>,
}

impl SymbolResolver<NoSymbolSource> {
    /// Creates a resolver that only consults the embedded symbol table.
    pub fn embedded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: None,
        }
    }
}

impl<S: SymbolSource> SymbolResolver<S> {
    /// Creates a resolver that falls back to `source` when the embedded symbol
    /// table does not resolve the name.
    pub fn with_source(name: impl Into<String>, source: S) -> Self {
        Self {
            name: name.into(),
            source: Some(source),
        }
    }

    /// Returns the symbol this resolver looks up.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resolves the entry address of `image`, which was read from `path`.
    ///
    /// An explicit address wins outright. Otherwise the embedded symbol table
    /// is searched, then the external source.
    pub fn resolve(&self, image: &ElfImage, path: &Path, explicit: Option<u64>) -> Result<u64> {
        if let Some(address) = explicit {
            return Ok(address);
        }
        if let Some(address) = find_symbol(image, &self.name) {
            #[cfg(feature = "log")]
            log::debug!("found {} at {address:#x} in the symbol table", self.name);
            return Ok(address);
        }
        let address = self
            .source
            .as_ref()
            .and_then(|source| source.lookup(path, &self.name))
            .ok_or_else(|| symbol_not_found(&self.name))?;
        #[cfg(feature = "log")]
        log::debug!("found {} at {address:#x} via external lookup", self.name);
        Ok(address)
    }
}

/// Resolves the entry address from the embedded symbol table only.
pub fn resolve(image: &ElfImage, name: &str) -> Result<u64> {
    find_symbol(image, name).ok_or_else(|| symbol_not_found(name))
}
