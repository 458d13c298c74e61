use std::borrow::Cow;
use std::fmt::Display;

/// Error types used throughout the `pvh_note` library.
/// Every variant is terminal for the invocation that produced it: the patcher
/// never writes an output file once one of these has been returned.
#[derive(Debug)]
pub enum Error {
    /// An error occurred while reading or writing a file.
    ///
    /// This error typically indicates issues such as:
    /// * File not found
    /// * Permission denied
    /// * Failure while writing or renaming the temporary output
    Io {
        /// A descriptive message about the I/O error, including the path.
        msg: Cow<'static, str>,
    },

    /// The input is not an ELF64 little-endian image this tool can patch.
    ///
    /// This error typically indicates issues with the ELF header such as:
    /// * Invalid magic bytes
    /// * Unsupported ELF class or data encoding
    /// * Header tables that lie outside the file
    Format {
        /// A descriptive message about the format error.
        msg: Cow<'static, str>,
    },

    /// No entry address was supplied and the symbol could not be found in the
    /// embedded symbol table nor in the external symbol source.
    SymbolNotFound {
        /// The symbol that was looked up.
        name: String,
    },

    /// There is no room for one more program header entry.
    Space {
        /// Bytes needed for the new entry.
        required: usize,
        /// Bytes of free space found after the program header table.
        available: usize,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io { msg } => write!(f, "I/O error: {msg}"),
            Error::Format { msg } => write!(f, "ELF format error: {msg}"),
            Error::SymbolNotFound { name } => write!(f, "symbol not found: {name}"),
            Error::Space {
                required,
                available,
            } => write!(
                f,
                "no space for an extra program header: need {required} bytes, have {available}"
            ),
        }
    }
}

impl std::error::Error for Error {}

/// Creates an I/O error with the specified message.
#[cold]
#[inline(never)]
pub(crate) fn io_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Io { msg: msg.into() }
}

/// Creates a format error with the specified message.
///
/// This is a convenience function for creating `Error::Format` variants.
#[cold]
#[inline(never)]
pub(crate) fn format_error(msg: impl Into<Cow<'static, str>>) -> Error {
    Error::Format { msg: msg.into() }
}

/// Creates a symbol lookup error for `name`.
#[cold]
#[inline(never)]
pub(crate) fn symbol_not_found(name: &str) -> Error {
    Error::SymbolNotFound {
        name: name.to_owned(),
    }
}

/// Creates a space error reporting the required and available byte counts.
#[cold]
#[inline(never)]
pub(crate) fn space_error(required: usize, available: usize) -> Error {
    Error::Space {
        required,
        available,
    }
}
