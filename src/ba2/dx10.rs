//! DX10 texture entries.
//!
//! Texture payloads are stored headerless as a run of per-mip chunks. To hand
//! downstream tools a standalone `.dds` file we synthesize the container
//! header from the record's dimensions, mip count, and pixel format.

use crate::{
    compression::{self, Codec},
    entry::StreamOptions,
    error::{ExtractError, ExtractResult},
    io::Source,
};
use directxtex::DXGI_FORMAT;
use std::io::{Read, Seek};

/// One mip-level run within a texture entry.
#[derive(Clone, Copy, Debug)]
pub struct TexChunk {
    pub offset: u64,
    pub packed_size: u32,
    pub full_size: u32,
    pub mip_first: u16,
    pub mip_last: u16,
}

impl TexChunk {
    /// The number of bytes the chunk occupies on disk.
    #[must_use]
    pub fn stored_size(&self) -> u32 {
        if self.packed_size == 0 {
            self.full_size
        } else {
            self.packed_size
        }
    }
}

/// The fixed portion of a DX10 texture record.
#[derive(Clone, Debug)]
pub struct Dx10Tex {
    pub height: u16,
    pub width: u16,
    pub mip_count: u8,
    pub format: u8,
    pub flags: u8,
    pub tile_mode: u8,
    pub(crate) chunks: Vec<TexChunk>,
}

impl Dx10Tex {
    #[must_use]
    pub fn is_cubemap(&self) -> bool {
        self.flags & 1 != 0
    }

    #[must_use]
    pub fn chunks(&self) -> &[TexChunk] {
        &self.chunks
    }

    /// Whether the declared pixel format can be expressed as a DDS file.
    #[must_use]
    pub fn format_supported(&self) -> bool {
        pixel_format(self.format, false).is_some()
    }
}

mod dds {
    pub const MAGIC: u32 = 0x2053_4444; // "DDS "
    pub const HEADER_SIZE: u32 = 124;
    pub const PIXEL_FORMAT_SIZE: u32 = 32;

    pub const DDSD_CAPS: u32 = 0x1;
    pub const DDSD_HEIGHT: u32 = 0x2;
    pub const DDSD_WIDTH: u32 = 0x4;
    pub const DDSD_PIXELFORMAT: u32 = 0x1000;
    pub const DDSD_MIPMAPCOUNT: u32 = 0x2_0000;
    pub const DDSD_LINEARSIZE: u32 = 0x8_0000;

    pub const DDPF_ALPHAPIXELS: u32 = 0x1;
    pub const DDPF_FOURCC: u32 = 0x4;
    pub const DDPF_RGB: u32 = 0x40;
    pub const DDPF_LUMINANCE: u32 = 0x2_0000;

    pub const DDSCAPS_COMPLEX: u32 = 0x8;
    pub const DDSCAPS_TEXTURE: u32 = 0x1000;
    pub const DDSCAPS_MIPMAP: u32 = 0x40_0000;
    pub const DDSCAPS2_CUBEMAP_ALL_FACES: u32 = 0xFE00;

    pub const DX10_RESOURCE_DIMENSION_TEXTURE2D: u32 = 3;
    pub const DX10_MISC_TEXTURECUBE: u32 = 0x4;
}

/// How the top-level mip is laid out, which drives both the legacy pixel
/// format block and the linear-size field.
enum Layout {
    /// Block-compressed with the given bytes per 4x4 block.
    Block(u32),
    /// Uncompressed with the given bits per pixel.
    Packed(u32),
}

struct PixelFormat {
    flags: u32,
    four_cc: u32,
    rgb_bit_count: u32,
    r_mask: u32,
    g_mask: u32,
    b_mask: u32,
    a_mask: u32,
    layout: Layout,
    /// Set when the format only exists in the extended DX10 header.
    dx10_extension: bool,
}

fn four_cc_format(four_cc: &[u8; 4], block_size: u32) -> PixelFormat {
    PixelFormat {
        flags: dds::DDPF_FOURCC,
        four_cc: u32::from_le_bytes(*four_cc),
        rgb_bit_count: 0,
        r_mask: 0,
        g_mask: 0,
        b_mask: 0,
        a_mask: 0,
        layout: Layout::Block(block_size),
        dx10_extension: four_cc == b"DX10",
    }
}

/// The allow-list of pixel formats this reader can wrap into a DDS file,
/// keyed by the record's one-byte format code (a truncated
/// [`DXGI_FORMAT`]). Returns `None` for everything else.
fn pixel_format(format: u8, ati_four_cc: bool) -> Option<PixelFormat> {
    let matches_dxgi = |dxgi: DXGI_FORMAT| dxgi.bits() as u8 == format;

    let result = if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC1_UNORM)
        || matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC1_UNORM_SRGB)
    {
        four_cc_format(b"DXT1", 8)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC2_UNORM) {
        four_cc_format(b"DXT3", 16)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC3_UNORM) {
        four_cc_format(b"DXT5", 16)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC4_UNORM) {
        four_cc_format(if ati_four_cc { b"ATI1" } else { b"BC4U" }, 8)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC5_UNORM) {
        four_cc_format(if ati_four_cc { b"ATI2" } else { b"BC5U" }, 16)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC6H_UF16) {
        four_cc_format(b"DX10", 16)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC7_UNORM)
        || matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_BC7_UNORM_SRGB)
    {
        four_cc_format(b"DX10", 16)
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_R8G8B8A8_UNORM)
        || matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_R8G8B8A8_UNORM_SRGB)
    {
        PixelFormat {
            flags: dds::DDPF_RGB | dds::DDPF_ALPHAPIXELS,
            four_cc: 0,
            rgb_bit_count: 32,
            r_mask: 0x0000_00FF,
            g_mask: 0x0000_FF00,
            b_mask: 0x00FF_0000,
            a_mask: 0xFF00_0000,
            layout: Layout::Packed(32),
            dx10_extension: false,
        }
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_B8G8R8A8_UNORM) {
        PixelFormat {
            flags: dds::DDPF_RGB | dds::DDPF_ALPHAPIXELS,
            four_cc: 0,
            rgb_bit_count: 32,
            r_mask: 0x00FF_0000,
            g_mask: 0x0000_FF00,
            b_mask: 0x0000_00FF,
            a_mask: 0xFF00_0000,
            layout: Layout::Packed(32),
            dx10_extension: false,
        }
    } else if matches_dxgi(DXGI_FORMAT::DXGI_FORMAT_R8_UNORM) {
        PixelFormat {
            flags: dds::DDPF_LUMINANCE,
            four_cc: 0,
            rgb_bit_count: 8,
            r_mask: 0xFF,
            g_mask: 0,
            b_mask: 0,
            a_mask: 0,
            layout: Layout::Packed(8),
            dx10_extension: false,
        }
    } else {
        return None;
    };

    Some(result)
}

fn put(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Synthesizes the DDS container header ahead of the payload. Returns false
/// when the format is off the allow-list and nothing was written.
pub(crate) fn write_dds_header(out: &mut Vec<u8>, tex: &Dx10Tex, ati_four_cc: bool) -> bool {
    let Some(pf) = pixel_format(tex.format, ati_four_cc) else {
        return false;
    };

    let width = u32::from(tex.width);
    let height = u32::from(tex.height);
    let pitch_or_linear_size = match pf.layout {
        Layout::Block(block_size) => width.div_ceil(4) * height.div_ceil(4) * block_size,
        Layout::Packed(bits) => width * height * bits / 8,
    };

    let mut header_flags = dds::DDSD_CAPS
        | dds::DDSD_HEIGHT
        | dds::DDSD_WIDTH
        | dds::DDSD_PIXELFORMAT
        | dds::DDSD_LINEARSIZE;
    let mut caps = dds::DDSCAPS_TEXTURE;
    if tex.mip_count > 1 {
        header_flags |= dds::DDSD_MIPMAPCOUNT;
        caps |= dds::DDSCAPS_COMPLEX | dds::DDSCAPS_MIPMAP;
    }
    let caps2 = if tex.is_cubemap() {
        caps |= dds::DDSCAPS_COMPLEX;
        dds::DDSCAPS2_CUBEMAP_ALL_FACES
    } else {
        0
    };

    put(out, dds::MAGIC);
    put(out, dds::HEADER_SIZE);
    put(out, header_flags);
    put(out, height);
    put(out, width);
    put(out, pitch_or_linear_size);
    put(out, 0); // depth
    put(out, u32::from(tex.mip_count));
    for _ in 0..11 {
        put(out, 0); // reserved
    }
    put(out, dds::PIXEL_FORMAT_SIZE);
    put(out, pf.flags);
    put(out, pf.four_cc);
    put(out, pf.rgb_bit_count);
    put(out, pf.r_mask);
    put(out, pf.g_mask);
    put(out, pf.b_mask);
    put(out, pf.a_mask);
    put(out, caps);
    put(out, caps2);
    put(out, 0);
    put(out, 0);
    put(out, 0); // reserved

    if pf.dx10_extension {
        put(out, u32::from(tex.format));
        put(out, dds::DX10_RESOURCE_DIMENSION_TEXTURE2D);
        put(
            out,
            if tex.is_cubemap() {
                dds::DX10_MISC_TEXTURECUBE
            } else {
                0
            },
        );
        put(out, 1); // array size
        put(out, 0); // misc flags 2
    }

    true
}

/// Reads every chunk at its own offset and appends it, inflated, to `out`.
/// Chunks are stored in descending-resolution mip order already.
pub(crate) fn read_chunks<R>(
    chunks: &[TexChunk],
    source: &mut Source<R>,
    scratch: &mut Vec<u8>,
    codec: Codec,
    out: &mut Vec<u8>,
) -> ExtractResult<()>
where
    R: Read + Seek,
{
    let mut inflated = Vec::new();
    for chunk in chunks {
        source.seek_absolute(chunk.offset)?;
        if chunk.packed_size == 0 {
            let start = out.len();
            out.resize(start + chunk.full_size as usize, 0);
            source.read_bytes(&mut out[start..])?;
        } else {
            scratch.resize(chunk.packed_size as usize, 0);
            source.read_bytes(scratch)?;
            compression::decompress_into(codec, scratch, &mut inflated, chunk.full_size as usize)?;
            out.extend_from_slice(&inflated);
        }
    }
    Ok(())
}

pub(crate) fn materialize<R>(
    tex: &Dx10Tex,
    source: &mut Source<R>,
    scratch: &mut Vec<u8>,
    codec: Codec,
    options: &StreamOptions,
) -> ExtractResult<Vec<u8>>
where
    R: Read + Seek,
{
    let mut out = Vec::new();
    if !write_dds_header(&mut out, tex, options.ati_four_cc()) && !options.headerless_passthrough()
    {
        return Err(ExtractError::UnsupportedFormat);
    }
    read_chunks(&tex.chunks, source, scratch, codec, &mut out)?;
    Ok(out)
}
