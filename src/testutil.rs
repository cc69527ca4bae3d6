//! Byte-level archive builders for the test suite.
//!
//! These assemble minimal but structurally honest archives: real headers,
//! real record tables, real name tables, and payloads compressed with the
//! same codecs the reader inflates with.

use crate::{
    archive::Archive,
    bsa::Flags,
    compression::{self, Codec},
};

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn extension_of(name: &str) -> [u8; 4] {
    let mut ext = [0u8; 4];
    if let Some(pos) = name.rfind('.') {
        for (slot, byte) in ext.iter_mut().zip(name[pos + 1..].bytes()) {
            *slot = byte;
        }
    }
    ext
}

/// Writes the archive to a fresh temp dir and opens it.
pub fn open_temp(bytes: &[u8], extension: &str) -> anyhow::Result<(tempfile::TempDir, Archive)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join(format!("test.{extension}"));
    std::fs::write(&path, bytes)?;
    let archive = crate::open(&path)?;
    Ok((dir, archive))
}

/// One general-format BA2 file plus how it should be encoded.
pub struct GnrlFile {
    name_hash: u32,
    stored: Vec<u8>,
    size: u32,
    real_size: u32,
}

impl GnrlFile {
    pub fn raw(data: &[u8]) -> Self {
        Self {
            name_hash: 0,
            stored: data.to_vec(),
            size: data.len() as u32,
            real_size: 0,
        }
    }

    pub fn compressed(data: &[u8]) -> Self {
        let stored = compression::compress(Codec::Zlib, data);
        Self {
            name_hash: 0,
            size: stored.len() as u32,
            real_size: data.len() as u32,
            stored,
        }
    }

    pub fn lz4(data: &[u8]) -> Self {
        let stored = compression::compress(Codec::Lz4, data);
        Self {
            name_hash: 0,
            size: stored.len() as u32,
            real_size: data.len() as u32,
            stored,
        }
    }

    pub fn with_name_hash(mut self, hash: u32) -> Self {
        self.name_hash = hash;
        self
    }

    /// Encode with `size == 0` and the raw length in `real_size`.
    pub fn with_zero_size_encoding(mut self) -> Self {
        self.real_size = self.size;
        self.size = 0;
        self
    }

    /// Lie about the uncompressed length.
    pub fn with_real_size(mut self, real_size: u32) -> Self {
        self.real_size = real_size;
        self
    }
}

pub fn build_gnrl(version: u32, names: Option<&[&str]>, files: &[GnrlFile]) -> Vec<u8> {
    build_gnrl_with(version, false, names, files)
}

pub fn build_gnrl_with(
    version: u32,
    lz4: bool,
    names: Option<&[&str]>,
    files: &[GnrlFile],
) -> Vec<u8> {
    let header_len = 24 + if version >= 2 { 8 } else { 0 } + if version >= 3 { 4 } else { 0 };
    let records_len = 36 * files.len();
    let payloads_len: usize = files.iter().map(|f| f.stored.len()).sum();
    let name_table_offset = if names.is_some() {
        (header_len + records_len + payloads_len) as u64
    } else {
        0
    };

    let mut out = Vec::new();
    out.extend_from_slice(b"BTDX");
    push_u32(&mut out, version);
    out.extend_from_slice(b"GNRL");
    push_u32(&mut out, files.len() as u32);
    push_u64(&mut out, name_table_offset);
    if version >= 2 {
        push_u32(&mut out, 0);
        push_u32(&mut out, 0);
    }
    if version >= 3 {
        push_u32(&mut out, if lz4 { 3 } else { 0 });
    }

    let mut offset = (header_len + records_len) as u64;
    for (index, file) in files.iter().enumerate() {
        push_u32(&mut out, file.name_hash);
        let ext = names
            .and_then(|names| names.get(index))
            .map_or([0u8; 4], |name| extension_of(name));
        out.extend_from_slice(&ext);
        push_u32(&mut out, 0); // directory hash
        push_u32(&mut out, 0); // flags
        push_u64(&mut out, offset);
        push_u32(&mut out, file.size);
        push_u32(&mut out, file.real_size);
        push_u32(&mut out, 0); // alignment
        offset += file.stored.len() as u64;
    }

    for file in files {
        out.extend_from_slice(&file.stored);
    }

    if let Some(names) = names {
        for name in names {
            push_u16(&mut out, name.len() as u16);
            out.extend_from_slice(name.as_bytes());
        }
    }
    out
}

/// One DX10 texture carrying a single uncompressed mip chunk.
#[derive(Clone)]
pub struct Dx10File {
    height: u16,
    width: u16,
    mip_count: u8,
    format: u8,
    data: Vec<u8>,
    bad_sentinel: bool,
}

impl Dx10File {
    pub fn new(height: u16, width: u16, mip_count: u8, format: u8, data: &[u8]) -> Self {
        Self {
            height,
            width,
            mip_count,
            format,
            data: data.to_vec(),
            bad_sentinel: false,
        }
    }

    pub fn with_bad_sentinel(mut self) -> Self {
        self.bad_sentinel = true;
        self
    }
}

pub fn build_dx10(names: Option<&[&str]>, files: &[Dx10File]) -> Vec<u8> {
    const RECORD_LEN: usize = 24 + 24; // fixed part + one chunk
    let header_len = 24;
    let payloads_len: usize = files.iter().map(|f| f.data.len()).sum();
    let name_table_offset = if names.is_some() {
        (header_len + RECORD_LEN * files.len() + payloads_len) as u64
    } else {
        0
    };

    let mut out = Vec::new();
    out.extend_from_slice(b"BTDX");
    push_u32(&mut out, 1);
    out.extend_from_slice(b"DX10");
    push_u32(&mut out, files.len() as u32);
    push_u64(&mut out, name_table_offset);

    let mut offset = (header_len + RECORD_LEN * files.len()) as u64;
    for (index, file) in files.iter().enumerate() {
        push_u32(&mut out, 0); // name hash
        let ext = names
            .and_then(|names| names.get(index))
            .map_or(*b"dds\0", |name| extension_of(name));
        out.extend_from_slice(&ext);
        push_u32(&mut out, 0); // directory hash
        out.push(0); // unknown
        out.push(1); // chunk count
        push_u16(&mut out, 0x18);
        push_u16(&mut out, file.height);
        push_u16(&mut out, file.width);
        out.push(file.mip_count);
        out.push(file.format);
        out.push(0); // flags
        out.push(0); // tile mode

        push_u64(&mut out, offset);
        push_u32(&mut out, 0); // packed size: stored raw
        push_u32(&mut out, file.data.len() as u32);
        push_u16(&mut out, 0);
        push_u16(&mut out, u16::from(file.mip_count.saturating_sub(1)));
        push_u32(&mut out, if file.bad_sentinel { 0 } else { 0xBAAD_F00D });
        offset += file.data.len() as u64;
    }

    for file in files {
        out.extend_from_slice(&file.data);
    }

    if let Some(names) = names {
        for name in names {
            push_u16(&mut out, name.len() as u16);
            out.extend_from_slice(name.as_bytes());
        }
    }
    out
}

/// One GNMF texture carrying a single uncompressed chunk.
pub struct GnmfFile {
    descriptor: [u8; 32],
    data: Vec<u8>,
}

impl GnmfFile {
    pub fn new(descriptor: [u8; 32], data: &[u8]) -> Self {
        Self {
            descriptor,
            data: data.to_vec(),
        }
    }
}

pub fn build_gnmf(names: Option<&[&str]>, files: &[GnmfFile]) -> Vec<u8> {
    const RECORD_LEN: usize = 16 + 32 + 24; // fixed part + descriptor + one chunk
    let header_len = 24;
    let payloads_len: usize = files.iter().map(|f| f.data.len()).sum();
    let name_table_offset = if names.is_some() {
        (header_len + RECORD_LEN * files.len() + payloads_len) as u64
    } else {
        0
    };

    let mut out = Vec::new();
    out.extend_from_slice(b"BTDX");
    push_u32(&mut out, 1);
    out.extend_from_slice(b"GNMF");
    push_u32(&mut out, files.len() as u32);
    push_u64(&mut out, name_table_offset);

    let mut offset = (header_len + RECORD_LEN * files.len()) as u64;
    for (index, file) in files.iter().enumerate() {
        push_u32(&mut out, 0); // name hash
        let ext = names
            .and_then(|names| names.get(index))
            .map_or(*b"gnf\0", |name| extension_of(name));
        out.extend_from_slice(&ext);
        push_u32(&mut out, 0); // directory hash
        out.push(0); // unknown
        out.push(1); // chunk count
        push_u16(&mut out, 0x18);
        out.extend_from_slice(&file.descriptor);

        push_u64(&mut out, offset);
        push_u32(&mut out, 0); // packed size: stored raw
        push_u32(&mut out, file.data.len() as u32);
        push_u16(&mut out, 0);
        push_u16(&mut out, 0);
        push_u32(&mut out, 0xBAAD_F00D);
        offset += file.data.len() as u64;
    }

    for file in files {
        out.extend_from_slice(&file.data);
    }

    if let Some(names) = names {
        for name in names {
            push_u16(&mut out, name.len() as u16);
            out.extend_from_slice(name.as_bytes());
        }
    }
    out
}

/// Archive-wide switches for the BSA builder.
pub struct BsaConfig {
    pub version: u32,
    compressed: bool,
    names: bool,
    embedded: bool,
}

impl BsaConfig {
    pub fn v104() -> Self {
        Self {
            version: 104,
            compressed: false,
            names: true,
            embedded: false,
        }
    }

    pub fn v105() -> Self {
        Self {
            version: 105,
            ..Self::v104()
        }
    }

    pub fn compressed(mut self) -> Self {
        self.compressed = true;
        self
    }

    pub fn without_names(mut self) -> Self {
        self.names = false;
        self
    }

    pub fn embedded_names(mut self) -> Self {
        self.embedded = true;
        self
    }
}

pub struct BsaFile {
    pub directory: String,
    pub name: String,
    pub data: Vec<u8>,
    flip: bool,
    name_hash: u64,
}

impl BsaFile {
    pub fn new(directory: &str, name: &str, data: &[u8]) -> Self {
        Self {
            directory: directory.to_owned(),
            name: name.to_owned(),
            data: data.to_vec(),
            flip: false,
            name_hash: 0,
        }
    }

    /// Set the per-file bit inverting the archive's compression default.
    pub fn compression_flipped(mut self) -> Self {
        self.flip = true;
        self
    }

    pub fn name_hash(mut self, hash: u64) -> Self {
        self.name_hash = hash;
        self
    }
}

/// Assembles a BSA in on-disk layout. Input files must already be grouped
/// by directory; entries come back in the same order.
pub fn build_bsa(config: &BsaConfig, files: &[BsaFile]) -> Vec<u8> {
    // Versions past 105 follow the SSE layout, matching what the reader
    // assumes for unknown future versions.
    let sse = config.version >= 105;
    let codec = if sse { Codec::Lz4Frame } else { Codec::Zlib };

    let mut directories: Vec<(&str, Vec<&BsaFile>)> = Vec::new();
    for file in files {
        match directories
            .iter_mut()
            .find(|(name, _)| *name == file.directory)
        {
            Some((_, group)) => group.push(file),
            None => directories.push((&file.directory, vec![file])),
        }
    }

    let mut flags = Flags::empty();
    if config.names {
        flags |= Flags::DIRECTORY_STRINGS | Flags::FILE_STRINGS;
    }
    if config.compressed {
        flags |= Flags::COMPRESSED;
    }
    if config.embedded {
        flags |= Flags::EMBEDDED_FILE_NAMES;
    }

    let directory_names_len: u32 = if config.names {
        directories
            .iter()
            .map(|(name, _)| name.len() as u32 + 1)
            .sum()
    } else {
        0
    };
    let file_names_len: u32 = if config.names {
        files.iter().map(|f| f.name.len() as u32 + 1).sum()
    } else {
        0
    };

    let directory_entry_size = if sse { 24 } else { 16 };
    let file_entries_start = 36 + directory_entry_size * directories.len();
    let file_entries_len: usize = directories
        .iter()
        .map(|(name, group)| {
            let name_len = if config.names { name.len() + 2 } else { 0 };
            name_len + 16 * group.len()
        })
        .sum();
    let data_start = file_entries_start + file_entries_len + file_names_len as usize;

    // Data blocks first, so the entry tables can point into them.
    let mut data = Vec::new();
    let mut blocks: Vec<(u32, u32)> = Vec::new(); // (offset, size) per file, in dir order
    for (directory, group) in &directories {
        for file in group {
            let offset = (data_start + data.len()) as u32;
            let mut block = Vec::new();
            if config.embedded {
                let path = format!("{directory}\\{}", file.name);
                block.push(path.len() as u8);
                block.extend_from_slice(path.as_bytes());
            }
            if config.compressed != file.flip {
                let packed = compression::compress(codec, &file.data);
                push_u32(&mut block, file.data.len() as u32);
                block.extend_from_slice(&packed);
            } else {
                block.extend_from_slice(&file.data);
            }
            blocks.push((offset, block.len() as u32));
            data.extend_from_slice(&block);
        }
    }

    let mut out = Vec::new();
    out.extend_from_slice(b"BSA\0");
    push_u32(&mut out, config.version);
    push_u32(&mut out, 36);
    push_u32(&mut out, flags.bits());
    push_u32(&mut out, directories.len() as u32);
    push_u32(&mut out, files.len() as u32);
    push_u32(&mut out, directory_names_len);
    push_u32(&mut out, file_names_len);
    push_u16(&mut out, 0); // content types
    push_u16(&mut out, 0); // padding

    for (index, (_, group)) in directories.iter().enumerate() {
        push_u64(&mut out, 0x100 + index as u64); // directory hash
        push_u32(&mut out, group.len() as u32);
        if sse {
            push_u32(&mut out, 0);
            push_u64(&mut out, 0);
        } else {
            push_u32(&mut out, 0);
        }
    }

    let mut next_block = blocks.iter();
    for (directory, group) in &directories {
        if config.names {
            out.push(directory.len() as u8 + 1);
            out.extend_from_slice(directory.as_bytes());
            out.push(0);
        }
        for file in group {
            let (offset, size) = next_block
                .next()
                .copied()
                .unwrap_or_default();
            push_u64(&mut out, file.name_hash);
            let size_flags = if file.flip { 1 << 30 } else { 0 };
            push_u32(&mut out, size | size_flags);
            push_u32(&mut out, offset);
        }
    }

    if config.names {
        for file in files {
            out.extend_from_slice(file.name.as_bytes());
            out.push(0);
        }
    }

    debug_assert_eq!(out.len(), data_start);
    out.extend_from_slice(&data);
    out
}
