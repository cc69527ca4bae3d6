//! GNMF texture entries (console-native tiling).
//!
//! The record mirrors the DX10 layout but replaces the DX10 header fields
//! with an opaque 32-byte GNF descriptor. Materialization emits the
//! descriptor verbatim ahead of the inflated chunks, so the output is a
//! standalone GNF container; the descriptor's format and tiling fields are
//! never interpreted here.

use crate::{
    ba2::dx10::{self, TexChunk},
    compression::Codec,
    entry::StreamOptions,
    error::ExtractResult,
    io::Source,
};
use std::io::{Read, Seek};

pub(crate) const GNF_DESCRIPTOR_LEN: usize = 32;

#[derive(Clone, Debug)]
pub struct GnfTex {
    pub descriptor: [u8; GNF_DESCRIPTOR_LEN],
    pub(crate) chunks: Vec<TexChunk>,
}

impl GnfTex {
    #[must_use]
    pub fn chunks(&self) -> &[TexChunk] {
        &self.chunks
    }
}

pub(crate) fn materialize<R>(
    tex: &GnfTex,
    source: &mut Source<R>,
    scratch: &mut Vec<u8>,
    codec: Codec,
    _options: &StreamOptions,
) -> ExtractResult<Vec<u8>>
where
    R: Read + Seek,
{
    let mut out = Vec::with_capacity(GNF_DESCRIPTOR_LEN);
    out.extend_from_slice(&tex.descriptor);
    dx10::read_chunks(&tex.chunks, source, scratch, codec, &mut out)?;
    Ok(out)
}
