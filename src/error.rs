//! Sorting errors.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

/// Sort or merge phase error.
#[derive(Debug)]
pub enum SortError {
    /// Chunk id and chunks number do not describe a chunk.
    InvalidChunkSpec { chunk_id: usize, num_chunks: usize },
    /// Source file does not exist or is not a regular file.
    SourceNotFound(PathBuf),
    /// Source file exists but can't be opened or read.
    SourceUnreadable(PathBuf, io::Error),
    /// A line doesn't fit into the chunk buffer (nominal size + overhead).
    ChunkTooSmall { chunk_id: usize, limit: usize },
    /// Destination file already exists and overwriting is disabled.
    DestinationAlreadyExists(PathBuf),
    /// Common I/O error.
    IO(io::Error),
    /// Sorted chunk file is missing or unreadable during merge.
    MergeInputUnavailable(PathBuf, io::Error),
    /// Temporary directory creation error.
    TempDir(io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, SortError>;

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::SourceUnreadable(_, err) => Some(err),
            SortError::IO(err) => Some(err),
            SortError::MergeInputUnavailable(_, err) => Some(err),
            SortError::TempDir(err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            _ => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::InvalidChunkSpec { chunk_id, num_chunks } => {
                write!(f, "invalid chunk {} of {}", chunk_id, num_chunks)
            }
            SortError::SourceNotFound(path) => write!(f, "no such file '{}'", path.display()),
            SortError::SourceUnreadable(path, err) => write!(f, "cannot read file '{}': {}", path.display(), err),
            SortError::ChunkTooSmall { chunk_id, limit } => write!(
                f,
                "chunk {} size too small to store even one line ({} bytes)",
                chunk_id, limit
            ),
            SortError::DestinationAlreadyExists(path) => write!(f, "file '{}' already exists", path.display()),
            SortError::IO(err) => write!(f, "I/O operation failed: {}", err),
            SortError::MergeInputUnavailable(path, err) => {
                write!(f, "chunk file '{}' unavailable: {}", path.display(), err)
            }
            SortError::TempDir(err) => write!(f, "temporary directory not created: {}", err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
        }
    }
}

impl From<io::Error> for SortError {
    fn from(err: io::Error) -> Self {
        SortError::IO(err)
    }
}
