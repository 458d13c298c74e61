//! # pvh_note
//! Patch ELF64 kernel images so that hypervisors implementing the PVH boot
//! protocol can boot them directly, without a bootloader.
//!
//! The protocol expects a `PT_NOTE` segment carrying a Xen
//! `XEN_ELFNOTE_PHYS32_ENTRY` note with the kernel's 32-bit physical entry
//! point. Linkers running with aggressive section garbage collection drop a
//! `.note` section nothing references, so the note is re-added after linking
//! as a program header of its own.
//!
//! ## Example
//! ```no_run
//! use pvh_note::{PatchOptions, Patcher};
//!
//! let patcher = Patcher::new(PatchOptions::default());
//! // copy and patch, looking up `pvh_start` in the symbol table
//! patcher.patch("target/kernel", "target/kernel.pvh", None).unwrap();
//! // patch in place with an explicit entry address
//! patcher.patch_in_place("target/kernel", Some(0x100000)).unwrap();
//! ```

pub mod elf;
mod error;
pub mod image;
pub mod inject;
pub mod note;
mod patch;
pub mod symbol;

pub use error::Error;
pub(crate) use error::{format_error, io_error, space_error, symbol_not_found};
pub use image::ElfImage;
pub use inject::{InjectStrategy, Injection, NOTE_ALIGN};
pub use note::PvhNote;
pub use patch::{PatchOptions, PatchReport, Patcher, parse_address};
pub use symbol::{NoSymbolSource, Objdump, SymbolResolver, SymbolSource};

/// A type alias for `Result`s returned by `pvh_note` functions.
///
/// This is a convenience alias that eliminates the need to repeatedly specify
/// the `Error` type in function signatures.
pub type Result<T> = core::result::Result<T, Error>;
