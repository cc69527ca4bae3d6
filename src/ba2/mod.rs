//! The BA2 container family (`BTDX` magic): general files, DX10 textures,
//! and GNMF console textures.

pub(crate) mod archive;
pub(crate) mod dx10;
pub(crate) mod gnmf;

pub use self::{
    dx10::{Dx10Tex, TexChunk},
    gnmf::GnfTex,
};

/// BA2 sub-format, selected by the header's four-byte type tag.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Format {
    #[default]
    Gnrl,
    Dx10,
    Gnmf,
}

pub(crate) mod constants {
    use crate::cc;

    pub const MAGIC: u32 = cc::make_four(b"BTDX");

    pub const GNRL: u32 = cc::make_four(b"GNRL");
    pub const DX10: u32 = cc::make_four(b"DX10");
    pub const GNMF: u32 = cc::make_four(b"GNMF");

    /// Per-chunk record length this reader understands.
    pub const TEX_CHUNK_SIZE: u16 = 0x18;
    pub const CHUNK_SENTINEL: u32 = 0xBAAD_F00D;

    /// Value of the version >= 3 compression flag selecting LZ4 blocks.
    pub const COMPRESSION_LZ4: u32 = 3;
}
