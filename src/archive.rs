use crate::{
    ba2, bsa,
    compression::Codec,
    context::ExtractContext,
    entry::Entry,
    error::{ExtractResult, FormatError, FormatResult},
    io::{Endian, SharedReader, Source},
    sort::SortConfig,
    Encoding,
};
use std::{
    cmp::Ordering,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicBool, Ordering as AtomicOrdering},
        Arc,
    },
    time::SystemTime,
};
use tracing::debug;

/// Which container family and sub-format an archive turned out to be.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ArchiveKind {
    /// TES4-family BSA (versions 103/104/105).
    Bsa,
    /// BA2 holding general files.
    Ba2Gnrl,
    /// BA2 holding chunked DX10 textures.
    Ba2Dx10,
    /// BA2 holding GNMF console textures.
    Ba2Gnmf,
}

/// What a container parser hands back: the flat entry table in on-disk
/// order plus the archive-wide facts the entries need to materialize.
pub(crate) struct Parsed {
    pub kind: ArchiveKind,
    pub has_name_table: bool,
    pub codec: Codec,
    pub records: Vec<crate::entry::EntryRecord>,
}

/// State shared between an archive and every entry cloned out of it.
pub(crate) struct ArchiveShared {
    pub reader: SharedReader,
    pub codec: Codec,
    pub encoding: Encoding,
    pub modified: Option<SystemTime>,
    pub match_last_write_time: AtomicBool,
}

/// See also [`Archive::open`] and [`crate::open`].
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenOptions {
    encoding: Encoding,
    proceed_on_unsupported_version: bool,
}

impl OpenOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Text encoding used to decode stored paths for display and output
    /// path construction.
    #[must_use]
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Parse archives whose version field is unknown by assuming the
    /// nearest known layout, instead of failing with
    /// [`FormatError::UnsupportedVersion`].
    #[must_use]
    pub fn proceed_on_unsupported_version(mut self, proceed: bool) -> Self {
        self.proceed_on_unsupported_version = proceed;
        self
    }

    pub fn open<P: AsRef<Path>>(self, path: P) -> FormatResult<Archive> {
        Archive::open_with(path.as_ref(), self)
    }
}

/// A parsed archive: its indexed entry table and the shared handle entries
/// stream through.
///
/// Opening reads headers and index tables only; no payload is touched until
/// an [`Entry`] is materialized.
pub struct Archive {
    kind: ArchiveKind,
    file_size: u64,
    has_name_table: bool,
    entries: Vec<Entry>,
    shared: Arc<ArchiveShared>,
}

impl Archive {
    /// Opens and indexes the archive at `path` with default options.
    pub fn open<P: AsRef<Path>>(path: P) -> FormatResult<Self> {
        OpenOptions::new().open(path)
    }

    fn open_with(path: &Path, options: OpenOptions) -> FormatResult<Self> {
        let mut file = fs::File::open(path)?;
        let metadata = file.metadata()?;
        let file_size = metadata.len();
        let modified = metadata.modified().ok();

        // Dispatch on the magic, not the extension: loose `.dat` archives
        // and misnamed files are common in the wild.
        let parsed = {
            let mut source = Source::new(&mut file);
            let magic = source.save_restore_position(|source| source.read::<u32>(Endian::Little))??;
            if magic == ba2::constants::MAGIC {
                ba2::archive::read(&mut source)?
            } else if magic == bsa::archive::constants::MAGIC {
                bsa::archive::read(&mut source, options.proceed_on_unsupported_version)?
            } else {
                return Err(FormatError::UnknownMagic(magic));
            }
        };

        debug!(
            path = %path.display(),
            kind = ?parsed.kind,
            entries = parsed.records.len(),
            "opened archive"
        );

        let shared = Arc::new(ArchiveShared {
            reader: SharedReader::new(path.to_owned(), file),
            codec: parsed.codec,
            encoding: options.encoding,
            modified,
            match_last_write_time: AtomicBool::new(false),
        });
        let entries = parsed
            .records
            .into_iter()
            .map(|rec| Entry {
                shared: Arc::clone(&shared),
                rec,
            })
            .collect();

        Ok(Self {
            kind: parsed.kind,
            file_size,
            has_name_table: parsed.has_name_table,
            entries,
            shared,
        })
    }

    #[must_use]
    pub fn kind(&self) -> ArchiveKind {
        self.kind
    }

    /// Total size of the archive file on disk.
    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Whether entry paths came from a name table rather than the hex hash
    /// fallback.
    #[must_use]
    pub fn has_name_table(&self) -> bool {
        self.has_name_table
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.shared.reader.path()
    }

    #[must_use]
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// An owned copy of the current listing. Snapshots stay valid and
    /// extractable while the archive is subsequently re-sorted.
    #[must_use]
    pub fn entries_snapshot(&self) -> Vec<Entry> {
        self.entries.clone()
    }

    /// Re-orders the listing. Entry indices are untouched; they always
    /// refer to original on-disk positions.
    pub fn sort(&mut self, config: SortConfig) {
        self.entries.sort_by(|a, b| config.compare(a, b));
    }

    pub fn sort_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&Entry, &Entry) -> Ordering,
    {
        self.entries.sort_by(|a, b| compare(a, b));
    }

    /// Duplicates the archive handle into a context for one extraction
    /// batch. Contexts are independent; one per worker thread.
    pub fn create_context(&self) -> ExtractResult<ExtractContext> {
        Ok(ExtractContext::new(self.shared.reader.duplicate()?))
    }

    /// Stamp extracted files with the archive's own modification time.
    pub fn set_match_last_write_time(&self, enabled: bool) {
        self.shared
            .match_last_write_time
            .store(enabled, AtomicOrdering::Relaxed);
    }

    #[must_use]
    pub fn match_last_write_time(&self) -> bool {
        self.shared.match_last_write_time.load(AtomicOrdering::Relaxed)
    }

    /// Releases the shared handle. Idempotent; entry metadata stays
    /// readable, but streaming fails with
    /// [`ExtractError`](crate::ExtractError)`::Closed`. Contexts duplicated
    /// earlier keep their own handles.
    pub fn close(&self) {
        self.shared.reader.close();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.reader.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        testutil::{build_gnrl, open_temp, GnrlFile},
        ArchiveKind, SortConfig, SortOrder, StreamOptions,
    };

    #[test]
    fn dispatch_follows_the_magic_not_the_extension() -> anyhow::Result<()> {
        let bytes = build_gnrl(1, Some(&["a.txt"]), &[GnrlFile::raw(b"hi")]);
        let (_dir, archive) = open_temp(&bytes, "dat")?;
        assert_eq!(archive.kind(), ArchiveKind::Ba2Gnrl);
        assert_eq!(archive.file_size(), bytes.len() as u64);
        Ok(())
    }

    #[test]
    fn snapshot_survives_a_re_sort() -> anyhow::Result<()> {
        let names = ["b.txt", "a.txt"];
        let files = [GnrlFile::raw(b"b"), GnrlFile::raw(b"a")];
        let bytes = build_gnrl(1, Some(&names), &files);
        let (_dir, mut archive) = open_temp(&bytes, "ba2")?;

        let snapshot = archive.entries_snapshot();
        archive.sort(SortConfig::new(SortOrder::FilePath));

        assert_eq!(snapshot[0].full_path(), "b.txt");
        assert_eq!(archive.entries()[0].full_path(), "a.txt");
        assert_eq!(snapshot[0].bytes()?, b"b");
        Ok(())
    }

    #[test]
    fn context_creation_fails_after_close() -> anyhow::Result<()> {
        let bytes = build_gnrl(1, Some(&["a.txt"]), &[GnrlFile::raw(b"hi")]);
        let (_dir, archive) = open_temp(&bytes, "ba2")?;

        assert!(!archive.is_closed());
        archive.close();
        assert!(archive.is_closed());
        assert!(matches!(
            archive.create_context(),
            Err(crate::ExtractError::Closed)
        ));
        Ok(())
    }

    #[test]
    fn contexts_outlive_archive_close() -> anyhow::Result<()> {
        let payload = b"still reachable";
        let bytes = build_gnrl(1, Some(&["a.txt"]), &[GnrlFile::raw(payload)]);
        let (_dir, archive) = open_temp(&bytes, "ba2")?;

        let mut context = archive.create_context()?;
        let entry = archive.entries()[0].clone();
        archive.close();

        let options = StreamOptions::default();
        assert_eq!(entry.bytes_with_context(&mut context, &options)?, payload);

        context.close();
        context.close(); // idempotent
        assert!(matches!(
            entry.bytes_with_context(&mut context, &options),
            Err(crate::ExtractError::Closed)
        ));
        Ok(())
    }

    #[test]
    fn extracted_tree_mirrors_archive_layout() -> anyhow::Result<()> {
        let names = ["meshes\\a.nif", "meshes\\sub\\b.nif", "textures\\c.dds"];
        let files = [
            GnrlFile::raw(b"a"),
            GnrlFile::raw(b"b"),
            GnrlFile::raw(b"c"),
        ];
        let bytes = build_gnrl(1, Some(&names), &files);
        let (_dir, archive) = open_temp(&bytes, "ba2")?;
        let out = tempfile::tempdir()?;

        for entry in archive.entries() {
            entry.extract(out.path(), true)?;
        }

        let mut found: Vec<String> = walkdir::WalkDir::new(out.path())
            .into_iter()
            .filter_map(Result::ok)
            .filter(|dirent| dirent.file_type().is_file())
            .map(|dirent| {
                dirent
                    .path()
                    .strip_prefix(out.path())
                    .unwrap()
                    .components()
                    .map(|part| part.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("\\")
            })
            .collect();
        found.sort();
        assert_eq!(found, names);
        Ok(())
    }

    #[test]
    fn concurrent_contexts_extract_disjoint_batches() -> anyhow::Result<()> {
        let names: Vec<String> = (0..8).map(|i| format!("blob{i}.bin")).collect();
        let name_refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let payloads: Vec<Vec<u8>> = (0..8u8).map(|i| vec![i; 2048]).collect();
        let files: Vec<GnrlFile> = payloads.iter().map(|p| GnrlFile::compressed(p)).collect();
        let bytes = build_gnrl(1, Some(&name_refs), &files);
        let (_dir, archive) = open_temp(&bytes, "ba2")?;

        let entries = archive.entries_snapshot();
        let (left, right) = entries.split_at(4);
        let mut context_a = archive.create_context()?;
        let mut context_b = archive.create_context()?;
        let options = StreamOptions::default();

        let (out_a, out_b) = std::thread::scope(|scope| {
            let a = scope.spawn(move || -> anyhow::Result<Vec<Vec<u8>>> {
                left.iter()
                    .map(|entry| Ok(entry.bytes_with_context(&mut context_a, &options)?))
                    .collect()
            });
            let b = scope.spawn(move || -> anyhow::Result<Vec<Vec<u8>>> {
                right
                    .iter()
                    .map(|entry| Ok(entry.bytes_with_context(&mut context_b, &options)?))
                    .collect()
            });
            (a.join().unwrap(), b.join().unwrap())
        });

        let mut extracted = out_a?;
        extracted.extend(out_b?);
        assert_eq!(extracted, payloads);
        Ok(())
    }
}
