//! Byte sources, byte sinks and chunk file storage.

use std::fs;
use std::io::{self, prelude::*, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{Result, SortError};

/// Seekable byte source the sort phase reads chunks from.
pub trait ByteSource {
    /// Source size in bytes.
    fn len(&self) -> u64;

    /// Reads bytes starting at `offset` into `buf`. May read less than `buf.len()`,
    /// returns 0 at the end of the source.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Reads until `buf` is full or the source ends. Returns the number of bytes read.
pub fn read_full_at<S: ByteSource + ?Sized>(source: &mut S, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read_at(offset + filled as u64, &mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    return Ok(filled);
}

/// Local file byte source.
#[derive(Debug)]
pub struct LocalFileSource {
    file: fs::File,
    len: u64,
}

impl LocalFileSource {
    /// Opens a regular file.
    pub fn open(path: &Path) -> Result<Self> {
        match fs::metadata(path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Err(SortError::SourceNotFound(path.into())),
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(SortError::SourceNotFound(path.into())),
            Err(err) => return Err(SortError::SourceUnreadable(path.into(), err)),
        }

        let file = fs::File::open(path).map_err(|err| SortError::SourceUnreadable(path.into(), err))?;
        let len = file
            .metadata()
            .map_err(|err| SortError::SourceUnreadable(path.into(), err))?
            .len();

        return Ok(LocalFileSource {
            file,
            len,
        });
    }
}

impl ByteSource for LocalFileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read(buf)
    }
}

/// In-memory source, mostly useful for tests and small inputs.
impl<T: AsRef<[u8]>> ByteSource for io::Cursor<T> {
    fn len(&self) -> u64 {
        self.get_ref().as_ref().len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let data = self.get_ref().as_ref();
        let start = usize::try_from(offset).unwrap_or(usize::MAX).min(data.len());
        let n = buf.len().min(data.len() - start);
        buf[..n].copy_from_slice(&data[start..start + n]);
        Ok(n)
    }
}

/// Writable byte sink. `sync` makes written data durable.
pub trait ByteSink: Write {
    fn sync(&mut self) -> io::Result<()>;
}

impl ByteSink for fs::File {
    fn sync(&mut self) -> io::Result<()> {
        self.sync_all()
    }
}

impl ByteSink for Vec<u8> {
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: ByteSink + ?Sized> ByteSink for &mut S {
    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}

/// Creates a destination file. Fails with [`SortError::DestinationAlreadyExists`] if the file exists
/// and `overwrite` is not set.
pub fn create_destination(path: &Path, overwrite: bool) -> Result<fs::File> {
    let mut options = fs::OpenOptions::new();
    options.write(true);
    if overwrite {
        options.create(true).truncate(true);
    } else {
        options.create_new(true);
    }

    options.open(path).map_err(|err| match err.kind() {
        io::ErrorKind::AlreadyExists => SortError::DestinationAlreadyExists(path.into()),
        _ => SortError::IO(err),
    })
}

/// Directory of sorted chunk files named `{chunk_id}.{extension}`.
#[derive(Debug, Clone)]
pub struct ChunkStore {
    dir: PathBuf,
    extension: String,
}

impl ChunkStore {
    pub fn new(dir: &Path, extension: &str) -> Self {
        ChunkStore {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the sorted chunk file for `chunk_id`.
    pub fn path_for(&self, chunk_id: usize) -> PathBuf {
        self.dir.join(format!("{}.{}", chunk_id, self.extension))
    }

    /// Creates the chunk file for writing.
    pub fn create(&self, chunk_id: usize, overwrite: bool) -> Result<fs::File> {
        create_destination(&self.path_for(chunk_id), overwrite)
    }

    /// Opens the chunk file for the merge phase.
    pub fn open(&self, chunk_id: usize) -> Result<fs::File> {
        let path = self.path_for(chunk_id);
        fs::File::open(&path).map_err(|err| SortError::MergeInputUnavailable(path, err))
    }

    /// Removes the chunk file for `chunk_id` if it exists.
    pub fn remove(&self, chunk_id: usize) -> Result<()> {
        match fs::remove_file(self.path_for(chunk_id)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(SortError::IO(err)),
        }
    }

    /// Removes chunk files `1..=num_chunks`. Missing files are skipped.
    pub fn remove_all(&self, num_chunks: usize) -> Result<()> {
        for chunk_id in 1..=num_chunks {
            self.remove(chunk_id)?;
        }

        return Ok(());
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::{self, Write};

    use rstest::*;

    use super::{create_destination, read_full_at, ByteSource, ChunkStore, LocalFileSource};
    use crate::error::SortError;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    /// Source returning at most 2 bytes per read to exercise short reads.
    struct Trickle(Vec<u8>);

    impl ByteSource for Trickle {
        fn len(&self) -> u64 {
            self.0.len() as u64
        }

        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
            let start = (offset as usize).min(self.0.len());
            let n = buf.len().min(2).min(self.0.len() - start);
            buf[..n].copy_from_slice(&self.0[start..start + n]);
            Ok(n)
        }
    }

    #[test]
    fn test_read_full_at_handles_short_reads() {
        let mut source = Trickle(b"hello world".to_vec());
        let mut buf = [0u8; 8];

        assert_eq!(read_full_at(&mut source, 3, &mut buf).unwrap(), 8);
        assert_eq!(&buf, b"lo world");
        assert_eq!(read_full_at(&mut source, 9, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ld");
    }

    #[test]
    fn test_cursor_source() {
        let mut source = io::Cursor::new(&b"abcdef"[..]);
        let mut buf = [0u8; 4];

        assert_eq!(source.len(), 6);
        assert_eq!(source.read_at(4, &mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
        assert_eq!(source.read_at(10, &mut buf).unwrap(), 0);
    }

    #[rstest]
    fn test_local_file_source(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("input.txt");
        fs::write(&path, b"banana\napple\n").unwrap();

        let mut source = LocalFileSource::open(&path).unwrap();
        let mut buf = [0u8; 5];
        assert_eq!(source.len(), 13);
        assert_eq!(read_full_at(&mut source, 7, &mut buf).unwrap(), 5);
        assert_eq!(&buf, b"apple");
    }

    #[rstest]
    fn test_local_file_source_not_found(tmp_dir: tempfile::TempDir) {
        let err = LocalFileSource::open(&tmp_dir.path().join("missing.txt")).unwrap_err();
        assert!(matches!(err, SortError::SourceNotFound(_)));

        let err = LocalFileSource::open(tmp_dir.path()).unwrap_err();
        assert!(matches!(err, SortError::SourceNotFound(_)));
    }

    #[rstest]
    fn test_create_destination(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("out.txt");
        create_destination(&path, false).unwrap().write_all(b"first").unwrap();

        let err = create_destination(&path, false).unwrap_err();
        assert!(matches!(err, SortError::DestinationAlreadyExists(_)));

        create_destination(&path, true).unwrap().write_all(b"2nd").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"2nd");
    }

    #[rstest]
    fn test_chunk_store(tmp_dir: tempfile::TempDir) {
        let store = ChunkStore::new(tmp_dir.path(), "chunk");
        assert_eq!(store.path_for(7), tmp_dir.path().join("7.chunk"));

        store.create(1, false).unwrap().write_all(b"a\n").unwrap();
        assert!(store.open(1).is_ok());
        assert!(matches!(store.open(2).unwrap_err(), SortError::MergeInputUnavailable(..)));

        store.remove(2).unwrap();
        store.remove_all(3).unwrap();
        assert!(!store.path_for(1).exists());
    }
}
