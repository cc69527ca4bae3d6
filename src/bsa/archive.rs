use crate::{
    archive::{ArchiveKind, Parsed},
    bsa::Version,
    compression::Codec,
    entry::{EntryKind, EntryRecord},
    error::{FormatError, FormatResult},
    io::{Endian, Source},
};
use bstr::{BString, ByteSlice};
use std::io::{Read, Seek};
use tracing::{debug, warn};

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Eq, PartialEq)]
    pub struct Flags: u32 {
        const DIRECTORY_STRINGS = 1 << 0;
        const FILE_STRINGS = 1 << 1;
        const COMPRESSED = 1 << 2;
        const RETAIN_DIRECTORY_NAMES = 1 << 3;
        const RETAIN_FILE_NAMES = 1 << 4;
        const RETAIN_FILE_NAME_OFFSETS = 1 << 5;
        const XBOX_ARCHIVE = 1 << 6;
        const RETAIN_STRINGS_DURING_STARTUP = 1 << 7;
        const EMBEDDED_FILE_NAMES = 1 << 8;
        const XBOX_COMPRESSED = 1 << 9;
    }
}

impl Flags {
    #[must_use]
    pub fn directory_strings(&self) -> bool {
        self.contains(Self::DIRECTORY_STRINGS)
    }

    #[must_use]
    pub fn file_strings(&self) -> bool {
        self.contains(Self::FILE_STRINGS)
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        self.contains(Self::COMPRESSED)
    }

    #[must_use]
    pub fn xbox_archive(&self) -> bool {
        self.contains(Self::XBOX_ARCHIVE)
    }

    #[must_use]
    pub fn embedded_file_names(&self) -> bool {
        self.contains(Self::EMBEDDED_FILE_NAMES)
    }
}

bitflags::bitflags! {
    #[repr(transparent)]
    #[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
    pub struct Types: u16 {
        const MESHES = 1 << 0;
        const TEXTURES = 1 << 1;
        const MENUS = 1 << 2;
        const SOUNDS = 1 << 3;
        const VOICES = 1 << 4;
        const SHADERS = 1 << 5;
        const TREES = 1 << 6;
        const FONTS = 1 << 7;
        const MISC = 1 << 8;
    }
}

pub(crate) mod constants {
    use crate::cc;

    pub const MAGIC: u32 = cc::make_four(b"BSA");

    pub const HEADER_SIZE: u64 = 0x24;
    pub const DIRECTORY_ENTRY_SIZE_X86: u64 = 0x10;
    pub const DIRECTORY_ENTRY_SIZE_X64: u64 = 0x18;
    pub const FILE_ENTRY_SIZE: u64 = 0x10;

    pub const FILE_FLAG_COMPRESSION: u32 = 1 << 30;
    pub const FILE_FLAG_CHECKED: u32 = 1 << 31;
    pub const FILE_FLAG_SECONDARY_ARCHIVE: u32 = 1 << 31;
}

pub(crate) fn read<R>(source: &mut Source<R>, proceed_on_unsupported: bool) -> FormatResult<Parsed>
where
    R: Read + Seek,
{
    let (
        magic,
        version_raw,
        _header_size,
        flags_raw,
        directory_count,
        file_count,
        directory_names_len,
        _file_names_len,
        types_raw,
        _padding,
    ): (u32, u32, u32, u32, u32, u32, u32, u32, u16, u16) = source.read(Endian::Little)?;

    if magic != constants::MAGIC {
        return Err(FormatError::UnknownMagic(magic));
    }

    let version = match version_raw {
        103 => Version::Tes4,
        104 => Version::Fo3,
        105 => Version::Sse,
        other if proceed_on_unsupported => {
            // Best effort: assume the nearest known layout and let per-entry
            // parsing catch whatever actually changed.
            let assumed = if other > 105 {
                Version::Sse
            } else {
                Version::Fo3
            };
            warn!(version = other, ?assumed, "unsupported BSA version");
            assumed
        }
        other => return Err(FormatError::UnsupportedVersion(other)),
    };

    let flags = Flags::from_bits_truncate(flags_raw);
    let types = Types::from_bits_truncate(types_raw);
    let hash_endian = if flags.xbox_archive() {
        Endian::Big
    } else {
        Endian::Little
    };
    let codec = match version {
        Version::Sse => Codec::Lz4Frame,
        Version::Tes4 | Version::Fo3 => Codec::Zlib,
    };

    debug!(
        version = version_raw,
        ?flags,
        ?types,
        directory_count,
        file_count,
        ?codec,
        "decoded BSA header"
    );

    let directory_entry_size = match version {
        Version::Sse => constants::DIRECTORY_ENTRY_SIZE_X64,
        Version::Tes4 | Version::Fo3 => constants::DIRECTORY_ENTRY_SIZE_X86,
    };
    let mut file_entries_offset =
        constants::HEADER_SIZE + directory_entry_size * u64::from(directory_count);
    // The header's directory names length excludes the per-name length
    // prefix byte.
    let mut file_names_offset = file_entries_offset
        + if flags.directory_strings() {
            u64::from(directory_names_len) + u64::from(directory_count)
        } else {
            0
        }
        + constants::FILE_ENTRY_SIZE * u64::from(file_count);

    let mut records = Vec::with_capacity(file_count as usize);
    for _ in 0..directory_count {
        let directory_hash: u64 = source.read(hash_endian)?;
        let directory_file_count: u32 = source.read(Endian::Little)?;
        match version {
            Version::Tes4 | Version::Fo3 => source.seek_relative(4)?,
            Version::Sse => source.seek_relative(12)?,
        }

        source.save_restore_position(|source| -> FormatResult<()> {
            source.seek_absolute(file_entries_offset)?;
            let directory_name = if flags.directory_strings() {
                Some(read_bzstring(source)?)
            } else {
                None
            };
            for _ in 0..directory_file_count {
                let index = records.len();
                let record = read_file_record(
                    source,
                    version,
                    flags,
                    hash_endian,
                    directory_hash,
                    directory_name.as_ref(),
                    &mut file_names_offset,
                    index,
                )?;
                records.push(record);
            }
            file_entries_offset = source.stream_position()?;
            Ok(())
        })??;
    }

    Ok(Parsed {
        kind: ArchiveKind::Bsa,
        has_name_table: flags.file_strings(),
        codec,
        records,
    })
}

#[allow(clippy::too_many_arguments)]
fn read_file_record<R>(
    source: &mut Source<R>,
    version: Version,
    flags: Flags,
    hash_endian: Endian,
    directory_hash: u64,
    directory_name: Option<&BString>,
    file_names_offset: &mut u64,
    index: usize,
) -> FormatResult<EntryRecord>
where
    R: Read + Seek,
{
    let name_hash: u64 = source.read(hash_endian)?;
    let (size_with_flags, offset_with_flags): (u32, u32) = source.read(Endian::Little)?;
    let compression_flipped = size_with_flags & constants::FILE_FLAG_COMPRESSION != 0;
    let block_size =
        size_with_flags & !(constants::FILE_FLAG_COMPRESSION | constants::FILE_FLAG_CHECKED);
    let block_offset = u64::from(offset_with_flags & !constants::FILE_FLAG_SECONDARY_ARCHIVE);
    let compressed = flags.compressed() != compression_flipped;

    let file_name = if flags.file_strings() {
        source.save_restore_position(|source| -> FormatResult<BString> {
            source.seek_absolute(*file_names_offset)?;
            let name = read_zstring(source)?;
            *file_names_offset = source.stream_position()?;
            Ok(name)
        })??
    } else {
        BString::default()
    };

    // The data block may lead with an embedded full path and, when the
    // payload is compressed, its uncompressed length. The entry's offset
    // points past both, at the payload proper.
    let (offset, size, real_size, embedded_path) =
        source.save_restore_position(|source| -> FormatResult<(u64, u32, u32, BString)> {
            source.seek_absolute(block_offset)?;
            let mut remaining = block_size;

            let embedded_path = if flags.embedded_file_names() && version != Version::Tes4 {
                let len: u8 = source.read(Endian::Little)?;
                let path: BString = source.read_vec(len.into())?.into();
                remaining = remaining
                    .checked_sub(u32::from(len) + 1)
                    .ok_or(FormatError::Truncated)?;
                path
            } else {
                BString::default()
            };

            let real_size = if compressed {
                let declared: u32 = source.read(Endian::Little)?;
                remaining = remaining.checked_sub(4).ok_or(FormatError::Truncated)?;
                declared
            } else {
                0
            };

            Ok((source.stream_position()?, remaining, real_size, embedded_path))
        })??;

    let (full_path, had_hash_translated) = if !file_name.is_empty() {
        let mut path = directory_name.cloned().unwrap_or_default();
        if !path.is_empty() {
            path.push(b'\\');
        }
        path.extend_from_slice(&file_name);
        (path, true)
    } else if !embedded_path.is_empty() {
        (embedded_path, true)
    } else {
        (format!("{name_hash:x}").into(), false)
    };

    let extension = match full_path.rfind_byte(b'.') {
        Some(pos) => full_path[pos + 1..].into(),
        None => BString::default(),
    };

    Ok(EntryRecord {
        index,
        name_hash,
        dir_hash: directory_hash,
        extension,
        offset,
        size,
        real_size,
        full_path,
        had_hash_translated,
        supported: true,
        kind: EntryKind::Bsa { compressed },
    })
}

/// Length-prefixed, nul-terminated string; the prefix counts the terminator.
fn read_bzstring<R>(source: &mut Source<R>) -> FormatResult<BString>
where
    R: Read + Seek,
{
    let len: u8 = source.read(Endian::Little)?;
    if len == 0 {
        return Ok(BString::default());
    }
    let mut bytes = source.read_vec(len.into())?;
    if bytes.pop() != Some(0) {
        return Err(FormatError::Truncated);
    }
    Ok(bytes.into())
}

fn read_zstring<R>(source: &mut Source<R>) -> FormatResult<BString>
where
    R: Read + Seek,
{
    let mut bytes = Vec::new();
    loop {
        let byte: u8 = source.read(Endian::Little)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    Ok(bytes.into())
}
