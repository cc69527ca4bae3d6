use crate::{
    archive::ArchiveShared,
    ba2::{
        dx10::{self, Dx10Tex},
        gnmf::{self, GnfTex},
    },
    compression,
    context::ExtractContext,
    error::{ExtractError, ExtractResult},
    io::Source,
};
use bstr::{BStr, BString, ByteSlice};
use std::{
    fs,
    io::{Cursor, Read, Seek, Write},
    path::{Path, PathBuf},
    sync::{atomic::Ordering, Arc},
};

/// See also [`StreamOptions`].
#[derive(Clone, Copy, Debug, Default)]
#[repr(transparent)]
pub struct StreamOptionsBuilder(StreamOptions);

impl StreamOptionsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn build(self) -> StreamOptions {
        self.0
    }

    /// Emit unsupported texture formats as raw chunk data instead of
    /// failing, skipping the synthesized container header.
    #[must_use]
    pub fn headerless_passthrough(mut self, headerless_passthrough: bool) -> Self {
        self.0.headerless_passthrough = headerless_passthrough;
        self
    }

    /// Use the ATI fourCC spellings (`ATI1`/`ATI2`) for BC4/BC5 textures.
    #[must_use]
    pub fn ati_four_cc(mut self, ati_four_cc: bool) -> Self {
        self.0.ati_four_cc = ati_four_cc;
        self
    }

    /// Rewrite the reported extension of GNMF entries to `gnf` when
    /// extracting, so the output name reflects the true contained format.
    #[must_use]
    pub fn rewrite_gnf_extension(mut self, rewrite_gnf_extension: bool) -> Self {
        self.0.rewrite_gnf_extension = rewrite_gnf_extension;
        self
    }
}

/// Per-call materialization toggles.
///
/// These are deliberately parameters of each stream/extract call rather than
/// archive state: the same entry may be materialized both ways by different
/// callers.
#[derive(Clone, Copy, Debug, Default)]
pub struct StreamOptions {
    headerless_passthrough: bool,
    ati_four_cc: bool,
    rewrite_gnf_extension: bool,
}

impl StreamOptions {
    #[must_use]
    pub fn builder() -> StreamOptionsBuilder {
        StreamOptionsBuilder::new()
    }

    #[must_use]
    pub fn headerless_passthrough(&self) -> bool {
        self.headerless_passthrough
    }

    #[must_use]
    pub fn ati_four_cc(&self) -> bool {
        self.ati_four_cc
    }

    #[must_use]
    pub fn rewrite_gnf_extension(&self) -> bool {
        self.rewrite_gnf_extension
    }
}

/// The per-variant half of an entry record.
#[derive(Clone, Debug)]
pub enum EntryKind {
    /// BA2 GNRL general file record.
    File { flags: u32, align: u32 },
    /// BA2 DX10 chunked texture record.
    Dx10(Dx10Tex),
    /// BA2 GNMF console texture record.
    Gnf(GnfTex),
    /// BSA file record.
    Bsa { compressed: bool },
}

/// Everything a parser knows about one entry before it is bound to an
/// archive handle.
#[derive(Clone, Debug)]
pub(crate) struct EntryRecord {
    pub index: usize,
    pub name_hash: u64,
    pub dir_hash: u64,
    pub extension: BString,
    pub offset: u64,
    pub size: u32,
    pub real_size: u32,
    pub full_path: BString,
    pub had_hash_translated: bool,
    pub supported: bool,
    pub kind: EntryKind,
}

/// One packed file within an archive.
///
/// Entries are cheap to clone; callers running concurrent extraction batches
/// should clone the slice returned by
/// [`Archive::entries`](crate::Archive::entries) (or use
/// [`Archive::entries_snapshot`](crate::Archive::entries_snapshot)) before
/// any concurrent re-sort.
#[derive(Clone)]
pub struct Entry {
    pub(crate) shared: Arc<ArchiveShared>,
    pub(crate) rec: EntryRecord,
}

impl Entry {
    /// Position within the archive's original on-disk entry table. Fixed for
    /// the lifetime of the entry; sorting never changes it.
    #[must_use]
    pub fn index(&self) -> usize {
        self.rec.index
    }

    #[must_use]
    pub fn name_hash(&self) -> u64 {
        self.rec.name_hash
    }

    #[must_use]
    pub fn dir_hash(&self) -> u64 {
        self.rec.dir_hash
    }

    #[must_use]
    pub fn extension(&self) -> &BStr {
        self.rec.extension.as_bstr()
    }

    /// Absolute byte offset of the payload within the archive file.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.rec.offset
    }

    /// On-disk (possibly compressed) payload size.
    #[must_use]
    pub fn size(&self) -> u32 {
        self.rec.size
    }

    /// Declared uncompressed size; zero when the entry is stored raw.
    #[must_use]
    pub fn real_size(&self) -> u32 {
        self.rec.real_size
    }

    #[must_use]
    pub fn compressed(&self) -> bool {
        match &self.rec.kind {
            EntryKind::Bsa { compressed } => *compressed,
            _ => self.rec.real_size != 0,
        }
    }

    /// The size an end user perceives: the uncompressed size when the entry
    /// is compressed, the stored size otherwise.
    #[must_use]
    pub fn display_size(&self) -> u32 {
        if self.compressed() {
            self.rec.real_size
        } else {
            self.rec.size
        }
    }

    /// Whether this entry's path came from the archive's name table rather
    /// than the hash fallback.
    #[must_use]
    pub fn had_hash_translated(&self) -> bool {
        self.rec.had_hash_translated
    }

    /// False when the record used a variant this reader could not parse;
    /// such entries can be listed but not materialized.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.rec.supported
    }

    #[must_use]
    pub fn kind(&self) -> &EntryKind {
        &self.rec.kind
    }

    /// Full archive-relative path, raw bytes as stored.
    #[must_use]
    pub fn full_path(&self) -> &BStr {
        self.rec.full_path.as_bstr()
    }

    /// Full path decoded with the archive's text encoding.
    #[must_use]
    pub fn full_path_string(&self) -> String {
        self.shared.encoding.decode(&self.rec.full_path)
    }

    #[must_use]
    pub fn folder(&self) -> &BStr {
        self.split_path().0
    }

    #[must_use]
    pub fn file_name(&self) -> &BStr {
        self.split_path().1
    }

    fn split_path(&self) -> (&BStr, &BStr) {
        let path = self.rec.full_path.as_bstr();
        match path.rfind_byteset(b"\\/") {
            Some(pos) => (path[..pos].as_bstr(), path[pos + 1..].as_bstr()),
            None => (b"".as_bstr(), path),
        }
    }

    /// Materializes the payload: raw bytes, or inflated to exactly
    /// [`real_size`](Self::real_size) bytes.
    pub fn bytes(&self) -> ExtractResult<Vec<u8>> {
        self.bytes_with(&StreamOptions::default())
    }

    pub fn bytes_with(&self, options: &StreamOptions) -> ExtractResult<Vec<u8>> {
        self.shared.reader.with(|file| {
            let mut source = Source::new(&mut *file);
            let mut scratch = Vec::new();
            self.materialize(&mut source, &mut scratch, options)
        })
    }

    /// Materializes the payload through a caller-owned extraction context
    /// instead of the archive's shared handle.
    pub fn bytes_with_context(
        &self,
        context: &mut ExtractContext,
        options: &StreamOptions,
    ) -> ExtractResult<Vec<u8>> {
        let ExtractContext { file, scratch } = context;
        let file = file.as_mut().ok_or(ExtractError::Closed)?;
        let mut source = Source::new(&mut *file);
        self.materialize(&mut source, scratch, options)
    }

    /// The payload as a readable, seekable stream.
    pub fn open_stream(&self) -> ExtractResult<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.bytes()?))
    }

    pub fn open_stream_with(&self, options: &StreamOptions) -> ExtractResult<Cursor<Vec<u8>>> {
        Ok(Cursor::new(self.bytes_with(options)?))
    }

    /// Extracts the payload under `destination`, either mirroring the
    /// archive's folder structure or flattening to the bare file name.
    pub fn extract(&self, destination: &Path, preserve_folder_structure: bool) -> ExtractResult<()> {
        self.extract_with_options(destination, preserve_folder_structure, &StreamOptions::default())
    }

    pub fn extract_with_options(
        &self,
        destination: &Path,
        preserve_folder_structure: bool,
        options: &StreamOptions,
    ) -> ExtractResult<()> {
        let data = self.bytes_with(options)?;
        self.write_output(&data, destination, preserve_folder_structure, options)
    }

    /// Extracts through a caller-owned context; the intended entry point for
    /// batched, multi-threaded extraction.
    pub fn extract_with_context(
        &self,
        context: &mut ExtractContext,
        destination: &Path,
        preserve_folder_structure: bool,
    ) -> ExtractResult<()> {
        self.extract_with_context_options(
            context,
            destination,
            preserve_folder_structure,
            &StreamOptions::default(),
        )
    }

    pub fn extract_with_context_options(
        &self,
        context: &mut ExtractContext,
        destination: &Path,
        preserve_folder_structure: bool,
        options: &StreamOptions,
    ) -> ExtractResult<()> {
        let data = self.bytes_with_context(context, options)?;
        self.write_output(&data, destination, preserve_folder_structure, options)
    }

    pub(crate) fn materialize<R>(
        &self,
        source: &mut Source<R>,
        scratch: &mut Vec<u8>,
        options: &StreamOptions,
    ) -> ExtractResult<Vec<u8>>
    where
        R: Read + Seek,
    {
        if !self.rec.supported {
            return Err(ExtractError::UnsupportedFormat);
        }

        let codec = self.shared.codec;
        match &self.rec.kind {
            EntryKind::File { .. } => {
                source.seek_absolute(self.rec.offset)?;
                if self.rec.size == 0 {
                    // size == 0 encodes "payload stored raw at real_size
                    // length, no length prefix" -- not an empty file.
                    Ok(source.read_vec(self.rec.real_size as usize)?)
                } else if self.rec.real_size == 0 {
                    Ok(source.read_vec(self.rec.size as usize)?)
                } else {
                    scratch.resize(self.rec.size as usize, 0);
                    source.read_bytes(scratch)?;
                    let mut out = Vec::new();
                    compression::decompress_into(
                        codec,
                        scratch,
                        &mut out,
                        self.rec.real_size as usize,
                    )?;
                    Ok(out)
                }
            }
            EntryKind::Bsa { compressed } => {
                source.seek_absolute(self.rec.offset)?;
                if *compressed {
                    scratch.resize(self.rec.size as usize, 0);
                    source.read_bytes(scratch)?;
                    let mut out = Vec::new();
                    compression::decompress_into(
                        codec,
                        scratch,
                        &mut out,
                        self.rec.real_size as usize,
                    )?;
                    Ok(out)
                } else {
                    Ok(source.read_vec(self.rec.size as usize)?)
                }
            }
            EntryKind::Dx10(tex) => dx10::materialize(tex, source, scratch, codec, options),
            EntryKind::Gnf(tex) => gnmf::materialize(tex, source, scratch, codec, options),
        }
    }

    fn write_output(
        &self,
        data: &[u8],
        destination: &Path,
        preserve_folder_structure: bool,
        options: &StreamOptions,
    ) -> ExtractResult<()> {
        let target = destination.join(self.relative_output_path(preserve_folder_structure, options));
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = fs::File::create(&target)?;
        file.write_all(data)?;

        if self.shared.match_last_write_time.load(Ordering::Relaxed) {
            if let Some(modified) = self.shared.modified {
                file.set_modified(modified)?;
            }
        }
        Ok(())
    }

    /// Destination-relative output path: separators normalized, traversal
    /// components dropped, optionally flattened to the file name.
    fn relative_output_path(
        &self,
        preserve_folder_structure: bool,
        options: &StreamOptions,
    ) -> PathBuf {
        let raw = if preserve_folder_structure {
            self.rec.full_path.clone()
        } else {
            self.file_name().to_owned()
        };
        let mut decoded = self.shared.encoding.decode(&raw);

        if options.rewrite_gnf_extension && matches!(self.rec.kind, EntryKind::Gnf(_)) {
            if let Some(dot) = decoded.rfind('.') {
                decoded.truncate(dot);
            }
            decoded.push_str(".gnf");
        }

        decoded
            .split(['\\', '/'])
            .filter(|part| !part.is_empty() && *part != "." && *part != "..")
            .collect()
    }
}
