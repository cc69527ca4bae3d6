use crate::error::{ExtractError, ExtractResult};
use parking_lot::Mutex;
use std::{
    fs,
    io::{self, Read, Seek, SeekFrom},
    mem,
    path::{Path, PathBuf},
};

/// Hashes in xbox-flagged BSA archives are stored big-endian; everything else
/// in both container families is little-endian.
#[derive(Clone, Copy)]
pub(crate) enum Endian {
    Little,
    Big,
}

pub(crate) trait BinaryStreamable {
    type Item;

    fn from_be_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn from_le_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item>;
    fn from_stream<R: Read>(stream: &mut R, endian: Endian) -> io::Result<Self::Item> {
        match endian {
            Endian::Big => Self::from_be_stream(stream),
            Endian::Little => Self::from_le_stream(stream),
        }
    }
}

macro_rules! make_binary_streamable {
    ($t:ty) => {
        impl BinaryStreamable for $t {
            type Item = $t;

            fn from_be_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_be_bytes(bytes))
            }

            fn from_le_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                let mut bytes = [0u8; mem::size_of::<Self::Item>()];
                stream.read_exact(&mut bytes)?;
                Ok(Self::from_le_bytes(bytes))
            }
        }
    };
}

make_binary_streamable!(u8);
make_binary_streamable!(u16);
make_binary_streamable!(u32);
make_binary_streamable!(u64);

macro_rules! make_binary_streamable_tuple {
    ($($t:ident),+) => {
        impl<$($t,)+> BinaryStreamable for ($($t,)+)
        where
            $($t: BinaryStreamable,)+
        {
            type Item = ($($t::Item,)+);

            fn from_be_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                Ok(($(
                    $t::from_be_stream(stream)?,
                )+))
            }

            fn from_le_stream<R: Read>(stream: &mut R) -> io::Result<Self::Item> {
                Ok(($(
                    $t::from_le_stream(stream)?,
                )+))
            }
        }
    };
}

make_binary_streamable_tuple!(T0, T1);
make_binary_streamable_tuple!(T0, T1, T2);
make_binary_streamable_tuple!(T0, T1, T2, T3);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4, T5);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4, T5, T6);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4, T5, T6, T7);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4, T5, T6, T7, T8);
make_binary_streamable_tuple!(T0, T1, T2, T3, T4, T5, T6, T7, T8, T9);

/// Positioned binary cursor over one seekable stream.
pub(crate) struct Source<R>
where
    R: Read + Seek,
{
    stream: R,
}

impl<R> Source<R>
where
    R: Read + Seek,
{
    pub fn new(stream: R) -> Self {
        Self { stream }
    }

    pub fn read<T>(&mut self, endian: Endian) -> io::Result<T>
    where
        T: BinaryStreamable<Item = T>,
    {
        T::from_stream(&mut self.stream, endian)
    }

    pub fn read_bytes(&mut self, bytes: &mut [u8]) -> io::Result<()> {
        self.stream.read_exact(bytes)
    }

    pub fn read_vec(&mut self, len: usize) -> io::Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.stream.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    pub fn seek_absolute(&mut self, pos: u64) -> io::Result<()> {
        self.stream.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    pub fn seek_relative(&mut self, offset: i64) -> io::Result<()> {
        self.stream.seek(SeekFrom::Current(offset)).map(|_| ())
    }

    pub fn stream_position(&mut self) -> io::Result<u64> {
        self.stream.stream_position()
    }

    pub fn save_restore_position<F, T>(&mut self, f: F) -> io::Result<T>
    where
        F: FnOnce(&mut Self) -> T,
    {
        let position = self.stream.stream_position()?;
        let result = f(self);
        self.stream.seek(SeekFrom::Start(position))?;
        Ok(result)
    }
}

/// The file handle an archive and all of its entries share.
///
/// The cursor position is only meaningful while the lock is held, so every
/// read locks, seeks, and reads under one critical section. Extraction
/// contexts duplicate the handle instead of contending on it.
pub(crate) struct SharedReader {
    path: PathBuf,
    file: Mutex<Option<fs::File>>,
}

impl SharedReader {
    pub fn new(path: PathBuf, file: fs::File) -> Self {
        Self {
            path,
            file: Mutex::new(Some(file)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn with<F, T>(&self, op: F) -> ExtractResult<T>
    where
        F: FnOnce(&mut fs::File) -> ExtractResult<T>,
    {
        let mut guard = self.file.lock();
        match guard.as_mut() {
            Some(file) => op(file),
            None => Err(ExtractError::Closed),
        }
    }

    /// Duplicates the underlying handle for use by one extraction context.
    pub fn duplicate(&self) -> ExtractResult<fs::File> {
        self.with(|file| file.try_clone().map_err(ExtractError::Io))
    }

    /// Releases the handle. Safe to call any number of times.
    pub fn close(&self) {
        self.file.lock().take();
    }

    pub fn is_closed(&self) -> bool {
        self.file.lock().is_none()
    }
}
