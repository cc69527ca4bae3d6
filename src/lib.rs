//! Read-only engine for the BSA and BA2 game archive containers.
//!
//! [`open`] parses headers and index tables without touching payload data;
//! the returned [`Archive`] lists [`Entry`] values that materialize, stream,
//! or extract their payloads on demand. Chunked DX10 textures come back as
//! well-formed DDS files, GNMF console textures as GNF files.

#![warn(
    clippy::pedantic,
    clippy::single_char_lifetime_names,
    clippy::std_instead_of_core
)]
#![allow(
    unknown_lints,
    clippy::enum_glob_use,
    clippy::missing_errors_doc,
    clippy::struct_field_names
)]

pub mod ba2;
pub mod bsa;
mod cc;
mod compression;
mod context;
mod entry;
mod error;
mod io;
mod sort;
#[cfg(test)]
mod testutil;

mod archive;

pub use archive::{Archive, ArchiveKind, OpenOptions};
pub use compression::Codec;
pub use context::ExtractContext;
pub use entry::{Entry, EntryKind, StreamOptions, StreamOptionsBuilder};
pub use error::{ExtractError, ExtractResult, FormatError, FormatResult};
pub use sort::{SortConfig, SortOrder};

pub use bstr::{BStr, BString, ByteSlice, ByteVec};

use std::path::Path;

/// Text encoding applied when stored path bytes are turned into strings.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Encoding {
    /// UTF-8, with invalid sequences replaced.
    #[default]
    Utf8,
    /// Windows-1252 / Latin-1 single byte mapping, as older archives use.
    Latin1,
}

impl Encoding {
    pub(crate) fn decode(self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Latin1 => bytes.iter().map(|&byte| char::from(byte)).collect(),
        }
    }
}

/// Opens and indexes the archive at `path` with default options.
///
/// Shorthand for [`Archive::open`]; see [`OpenOptions`] for the knobs.
pub fn open<P: AsRef<Path>>(path: P) -> FormatResult<Archive> {
    Archive::open(path)
}
