use crate::{
    archive::{ArchiveKind, Parsed},
    ba2::{
        constants,
        dx10::{Dx10Tex, TexChunk},
        gnmf::{GnfTex, GNF_DESCRIPTOR_LEN},
        Format,
    },
    compression::Codec,
    entry::{EntryKind, EntryRecord},
    error::{FormatError, FormatResult},
    io::{Endian, Source},
};
use bstr::BString;
use std::io::{Read, Seek};
use tracing::{debug, warn};

pub(crate) fn read<R>(source: &mut Source<R>) -> FormatResult<Parsed>
where
    R: Read + Seek,
{
    let (magic, version, type_tag, file_count, name_table_offset): (u32, u32, u32, u32, u64) =
        source.read(Endian::Little)?;

    if magic != constants::MAGIC {
        return Err(FormatError::UnknownMagic(magic));
    }

    let format = match type_tag {
        constants::GNRL => Format::Gnrl,
        constants::DX10 => Format::Dx10,
        constants::GNMF => Format::Gnmf,
        _ => return Err(FormatError::UnknownType(type_tag)),
    };

    // Version-gated trailing header fields. The reserved pair is opaque; the
    // compression flag selects the codec for every compressed payload.
    if version >= 2 {
        let _reserved: (u32, u32) = source.read(Endian::Little)?;
    }
    let codec = if version >= 3 {
        let flag: u32 = source.read(Endian::Little)?;
        if flag == constants::COMPRESSION_LZ4 {
            Codec::Lz4
        } else {
            Codec::Zlib
        }
    } else {
        Codec::Zlib
    };

    debug!(
        version,
        file_count,
        name_table_offset,
        ?format,
        ?codec,
        "decoded BA2 header"
    );

    let mut records = Vec::with_capacity(file_count as usize);
    for index in 0..file_count as usize {
        let record = match format {
            Format::Gnrl => read_gnrl(source, index)?,
            Format::Dx10 => read_dx10(source, index)?,
            Format::Gnmf => read_gnmf(source, index)?,
        };
        records.push(record);
    }

    resolve_names(source, name_table_offset, &mut records)?;

    let kind = match format {
        Format::Gnrl => ArchiveKind::Ba2Gnrl,
        Format::Dx10 => ArchiveKind::Ba2Dx10,
        Format::Gnmf => ArchiveKind::Ba2Gnmf,
    };
    Ok(Parsed {
        kind,
        has_name_table: name_table_offset > 0,
        codec,
        records,
    })
}

/// Assigns full paths, either positionally from the name table or from the
/// hex-rendered name hash.
///
/// The table is positional, not keyed: the i-th length-prefixed string
/// belongs to the i-th record in original on-disk order, which is why this
/// runs before any caller can re-sort the entries.
fn resolve_names<R>(
    source: &mut Source<R>,
    name_table_offset: u64,
    records: &mut [EntryRecord],
) -> FormatResult<()>
where
    R: Read + Seek,
{
    if name_table_offset > 0 {
        source.seek_absolute(name_table_offset)?;
        for record in records.iter_mut() {
            let len: u16 = source.read(Endian::Little)?;
            record.full_path = source.read_vec(len.into())?.into();
            record.had_hash_translated = true;
        }
    } else {
        for record in records.iter_mut() {
            record.full_path = format!("{:x}", record.name_hash).into();
            record.had_hash_translated = false;
        }
    }
    Ok(())
}

fn read_hash_prefix<R>(source: &mut Source<R>) -> FormatResult<(u32, BString, u32)>
where
    R: Read + Seek,
{
    let name_hash: u32 = source.read(Endian::Little)?;
    let mut extension = [0u8; 4];
    source.read_bytes(&mut extension)?;
    let dir_hash: u32 = source.read(Endian::Little)?;

    let extension: BString = extension
        .iter()
        .take_while(|x| **x != 0)
        .copied()
        .collect::<Vec<_>>()
        .into();
    Ok((name_hash, extension, dir_hash))
}

fn read_gnrl<R>(source: &mut Source<R>, index: usize) -> FormatResult<EntryRecord>
where
    R: Read + Seek,
{
    let (name_hash, extension, dir_hash) = read_hash_prefix(source)?;
    let (flags, offset, size, real_size, align): (u32, u64, u32, u32, u32) =
        source.read(Endian::Little)?;

    Ok(EntryRecord {
        index,
        name_hash: name_hash.into(),
        dir_hash: dir_hash.into(),
        extension,
        offset,
        size,
        real_size,
        full_path: BString::default(),
        had_hash_translated: false,
        supported: true,
        kind: EntryKind::File { flags, align },
    })
}

/// Reads one fixed-size chunk descriptor. Returns false when the trailing
/// sentinel does not match; the stream stays aligned either way.
fn read_tex_chunk<R>(source: &mut Source<R>) -> FormatResult<(TexChunk, bool)>
where
    R: Read + Seek,
{
    let (offset, packed_size, full_size, mip_first, mip_last, sentinel): (
        u64,
        u32,
        u32,
        u16,
        u16,
        u32,
    ) = source.read(Endian::Little)?;
    Ok((
        TexChunk {
            offset,
            packed_size,
            full_size,
            mip_first,
            mip_last,
        },
        sentinel == constants::CHUNK_SENTINEL,
    ))
}

/// Reads the chunk run shared by DX10 and GNMF records.
///
/// An unrecognized chunk record length is an unsupported variant: the chunk
/// bytes are skipped so the next record parses, and the entry is kept with
/// materialization disabled.
fn read_chunk_run<R>(
    source: &mut Source<R>,
    index: usize,
    chunk_count: u8,
    chunk_header_size: u16,
) -> FormatResult<(Vec<TexChunk>, bool)>
where
    R: Read + Seek,
{
    if chunk_header_size != constants::TEX_CHUNK_SIZE {
        warn!(
            index,
            chunk_header_size, "unrecognized chunk record length; entry disabled"
        );
        source.seek_relative(i64::from(chunk_count) * i64::from(chunk_header_size))?;
        return Ok((Vec::new(), false));
    }

    let mut supported = true;
    let mut chunks = Vec::with_capacity(chunk_count.into());
    for _ in 0..chunk_count {
        let (chunk, sentinel_ok) = read_tex_chunk(source)?;
        if !sentinel_ok {
            supported = false;
        }
        chunks.push(chunk);
    }
    if !supported {
        warn!(index, "chunk sentinel mismatch; entry disabled");
    }
    Ok((chunks, supported))
}

/// Derives the shared size fields from a chunk run: `size` is what the
/// chunks occupy on disk, `real_size` the inflated total (zero when every
/// chunk is stored raw).
fn chunk_sizes(chunks: &[TexChunk]) -> (u64, u32, u32) {
    let offset = chunks.first().map_or(0, |chunk| chunk.offset);
    let size = chunks.iter().map(TexChunk::stored_size).sum();
    let real_size = if chunks.iter().any(|chunk| chunk.packed_size != 0) {
        chunks.iter().map(|chunk| chunk.full_size).sum()
    } else {
        0
    };
    (offset, size, real_size)
}

fn read_dx10<R>(source: &mut Source<R>, index: usize) -> FormatResult<EntryRecord>
where
    R: Read + Seek,
{
    let (name_hash, extension, dir_hash) = read_hash_prefix(source)?;
    let (_unknown, chunk_count, chunk_header_size): (u8, u8, u16) = source.read(Endian::Little)?;
    let (height, width, mip_count, format, flags, tile_mode): (u16, u16, u8, u8, u8, u8) =
        source.read(Endian::Little)?;

    let (chunks, supported) = read_chunk_run(source, index, chunk_count, chunk_header_size)?;
    let (offset, size, real_size) = chunk_sizes(&chunks);

    Ok(EntryRecord {
        index,
        name_hash: name_hash.into(),
        dir_hash: dir_hash.into(),
        extension,
        offset,
        size,
        real_size,
        full_path: BString::default(),
        had_hash_translated: false,
        supported,
        kind: EntryKind::Dx10(Dx10Tex {
            height,
            width,
            mip_count,
            format,
            flags,
            tile_mode,
            chunks,
        }),
    })
}

fn read_gnmf<R>(source: &mut Source<R>, index: usize) -> FormatResult<EntryRecord>
where
    R: Read + Seek,
{
    let (name_hash, extension, dir_hash) = read_hash_prefix(source)?;
    let (_unknown, chunk_count, chunk_header_size): (u8, u8, u16) = source.read(Endian::Little)?;
    let mut descriptor = [0u8; GNF_DESCRIPTOR_LEN];
    source.read_bytes(&mut descriptor)?;

    let (chunks, supported) = read_chunk_run(source, index, chunk_count, chunk_header_size)?;
    let (offset, size, real_size) = chunk_sizes(&chunks);

    Ok(EntryRecord {
        index,
        name_hash: name_hash.into(),
        dir_hash: dir_hash.into(),
        extension,
        offset,
        size,
        real_size,
        full_path: BString::default(),
        had_hash_translated: false,
        supported,
        kind: EntryKind::Gnf(GnfTex { descriptor, chunks }),
    })
}
