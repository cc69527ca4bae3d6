//! The TES4-family BSA container (`BSA\0` magic), versions 103/104/105.

pub(crate) mod archive;

pub use archive::{Flags, Types};

/// BSA layout revision, taken from the header's version field.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Version {
    /// Oblivion (103).
    Tes4,
    /// Fallout 3 / New Vegas / Skyrim LE (104).
    #[default]
    Fo3,
    /// Skyrim SE (105); payloads are LZ4 frames.
    Sse,
}
