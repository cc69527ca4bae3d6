use crate::cc;
use std::io;

/// Structural failures raised while opening and indexing an archive.
///
/// Every variant except [`UnsupportedVersion`](FormatError::UnsupportedVersion)
/// aborts the open; that one is advisory and callers may re-open with
/// [`OpenOptions::proceed_on_unsupported_version`](crate::OpenOptions::proceed_on_unsupported_version).
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("unknown archive magic: {}", cc::display_four(*.0))]
    UnknownMagic(u32),

    #[error("unknown archive type tag: {}", cc::display_four(*.0))]
    UnknownType(u32),

    #[error("unsupported archive version: {0}")]
    UnsupportedVersion(u32),

    #[error("archive ended before a record could be read in full")]
    Truncated,

    #[error("entry uses a record variant this reader does not understand")]
    UnsupportedVariant,

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for FormatError {
    fn from(value: io::Error) -> Self {
        // A short read while walking fixed-size records means the entry count
        // or an offset pointed past the end of the file.
        if value.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated
        } else {
            Self::Io(value)
        }
    }
}

/// Per-entry failures raised while materializing or extracting a payload.
///
/// These are scoped to a single entry and never invalidate the archive or
/// abort a caller's extraction batch.
#[non_exhaustive]
#[derive(thiserror::Error, Debug)]
pub enum ExtractError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("payload decompressed to {actual} bytes, but the record declared {expected}")]
    DecompressionMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Lz4(#[from] lzzzz::lz4f::Error),

    #[error("entry format cannot be materialized by this reader")]
    UnsupportedFormat,

    #[error("the archive handle has been closed")]
    Closed,
}

impl From<lzzzz::Error> for ExtractError {
    fn from(value: lzzzz::Error) -> Self {
        Self::Lz4(value.into())
    }
}

pub type FormatResult<T> = core::result::Result<T, FormatError>;
pub type ExtractResult<T> = core::result::Result<T, ExtractError>;
