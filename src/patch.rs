//! Patch orchestration
//!
//! [`Patcher`] runs the whole transformation for one file: read, validate,
//! resolve the entry address, inject the note and write the result. The output
//! is produced through a temporary file in the destination directory that is
//! renamed over the destination only once it is complete, so a failed run never
//! leaves a partial image behind.

use crate::{
    Result, format_error,
    image::ElfImage,
    inject::{Injection, inject},
    io_error,
    note::{PvhNote, find_pvh_notes},
    symbol::{DEFAULT_ENTRY_SYMBOL, NoSymbolSource, Objdump, SymbolResolver, SymbolSource},
};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

/// Configuration for a patch run.
///
/// # Example
///
/// ```
/// use pvh_note::PatchOptions;
///
/// let options = PatchOptions::default()
///     .with_symbol("_start32")
///     .with_fallback(false);
/// assert_eq!(options.symbol(), "_start32");
/// ```
#[derive(Debug, Clone)]
pub struct PatchOptions {
    /// Symbol naming the PVH entry point (default: `pvh_start`)
    symbol: String,
    /// Entry address that overrides any symbol lookup (default: none)
    address: Option<u64>,
    /// Whether the external symbol source may be consulted (default: true)
    fallback: bool,
}

impl Default for PatchOptions {
    fn default() -> Self {
        Self {
            symbol: DEFAULT_ENTRY_SYMBOL.to_owned(),
            address: None,
            fallback: true,
        }
    }
}

impl PatchOptions {
    /// Set the entry symbol name
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = symbol.into();
        self
    }

    /// Set an explicit entry address
    pub fn with_address(mut self, address: Option<u64>) -> Self {
        self.address = address;
        self
    }

    /// Enable or disable the external symbol source
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    #[inline]
    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    #[inline]
    pub fn address(&self) -> Option<u64> {
        self.address
    }
}

/// Summary of a successful patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PatchReport {
    /// The entry address written into the note.
    pub entry: u32,
    /// Where the program header and note were placed.
    pub injection: Injection,
    /// PVH notes the image already carried before this run.
    pub existing_notes: usize,
    /// Size of the patched image in bytes.
    pub size: usize,
}

/// Patches ELF images with a PVH entry note.
pub struct Patcher<S = Objdump> {
    options: PatchOptions,
    source: S,
}

impl Patcher<Objdump> {
    /// Creates a patcher that falls back to `objdump` for symbol lookup.
    pub fn new(options: PatchOptions) -> Self {
        Self::with_source(options, Objdump::default())
    }
}

impl Patcher<NoSymbolSource> {
    /// Creates a patcher that only uses explicit addresses and the embedded
    /// symbol table.
    pub fn embedded(options: PatchOptions) -> Self {
        Self::with_source(options, NoSymbolSource)
    }
}

impl<S: SymbolSource> Patcher<S> {
    /// Creates a patcher with a custom external symbol source.
    pub fn with_source(options: PatchOptions, source: S) -> Self {
        Self { options, source }
    }

    #[inline]
    pub fn options(&self) -> &PatchOptions {
        &self.options
    }

    /// Patches `input` and writes the result to `output`.
    ///
    /// `address` overrides both the configured address and any symbol lookup.
    /// `output` may equal `input` to patch in place. Nothing is written unless
    /// every step succeeds.
    pub fn patch(
        &self,
        input: impl AsRef<Path>,
        output: impl AsRef<Path>,
        address: Option<u64>,
    ) -> Result<PatchReport> {
        let (input, output) = (input.as_ref(), output.as_ref());
        #[cfg(feature = "log")]
        log::info!("Reading {}", input.display());
        let data = fs::read(input)
            .map_err(|err| io_error(format!("failed to read {}: {err}", input.display())))?;

        let (data, report) = self.patch_bytes(input, data, address)?;
        write_atomic(input, output, &data)?;

        #[cfg(feature = "log")]
        log::info!("Wrote {} bytes to {}", data.len(), output.display());
        Ok(report)
    }

    /// Patches `path` in place.
    pub fn patch_in_place(
        &self,
        path: impl AsRef<Path>,
        address: Option<u64>,
    ) -> Result<PatchReport> {
        let path = path.as_ref();
        self.patch(path, path, address)
    }

    /// Patches an image held in memory. `path` is only handed to the external
    /// symbol source.
    pub fn patch_bytes(
        &self,
        path: &Path,
        data: Vec<u8>,
        address: Option<u64>,
    ) -> Result<(Vec<u8>, PatchReport)> {
        let mut image = ElfImage::load(data)?;

        let address = address.or(self.options.address);
        let fallback = |path: &Path, name: &str| {
            if self.options.fallback {
                self.source.lookup(path, name)
            } else {
                None
            }
        };
        let entry = SymbolResolver::with_source(self.options.symbol.as_str(), fallback)
            .resolve(&image, path, address)?;
        let note = PvhNote::new(entry);
        #[cfg(feature = "log")]
        log::info!("PVH entry address: {:#x}", note.entry());

        let existing_notes = find_pvh_notes(&image).len();
        #[cfg(feature = "log")]
        if existing_notes != 0 {
            log::warn!(
                "{} already carries {existing_notes} PVH note(s), adding another",
                path.display()
            );
        }

        let injection = inject(&mut image, &note)?;
        let data = image.into_bytes();
        let report = PatchReport {
            entry: note.entry(),
            injection,
            existing_notes,
            size: data.len(),
        };
        Ok((data, report))
    }
}

/// Parses a hexadecimal address with an optional `0x` prefix.
pub fn parse_address(text: &str) -> Result<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16)
        .map_err(|err| format_error(format!("invalid address {text:?}: {err}")))
}

/// Writes `data` to `output` through a temporary sibling file and a rename.
///
/// The output takes the permission bits of `input`.
fn write_atomic(input: &Path, output: &Path, data: &[u8]) -> Result<()> {
    let tmp = temp_path(output);
    let result = write_file(&tmp, data).and_then(|()| {
        if let Ok(metadata) = fs::metadata(input) {
            fs::set_permissions(&tmp, metadata.permissions()).map_err(|err| {
                io_error(format!(
                    "failed to set permissions on {}: {err}",
                    tmp.display()
                ))
            })?;
        }
        fs::rename(&tmp, output).map_err(|err| {
            io_error(format!(
                "failed to move {} to {}: {err}",
                tmp.display(),
                output.display()
            ))
        })
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)
        .map_err(|err| io_error(format!("failed to create {}: {err}", path.display())))?;
    file.write_all(data)
        .and_then(|()| file.sync_all())
        .map_err(|err| io_error(format!("failed to write {}: {err}", path.display())))
}

fn temp_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    output.with_file_name(format!(".{name}.pvh-{}.tmp", std::process::id()))
}
