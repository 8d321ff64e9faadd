//! Chunk boundary locator and chunk reader.
//!
//! A source of `L` bytes split into `N` chunks has nominal chunk size `ceil(L / N)`. The real start of
//! chunk `k > 1` is the first line start at or after its nominal start, where line starts are the
//! positions right after each terminator of the source read from the beginning. Chunk `k` holds every
//! line starting in `[start(k), nominal_start(k + 1))`, so its last line ends exactly where chunk `k + 1`
//! begins and the chunks partition the source.

use crate::chunk::{Chunk, ChunkSpec, Marker};
use crate::error::{Result, SortError};
use crate::lines::{scan_line, LineScan, Terminator};
use crate::storage::{read_full_at, ByteSource};

/// Default room for the line that crosses the nominal chunk end.
pub const DEFAULT_CHUNK_OVERHEAD: usize = 1024 * 1024;

const SCAN_WINDOW_SIZE: usize = 64 * 1024;

/// Windowed random access over a byte source used by the boundary scan.
struct Scanner<'a, S: ByteSource + ?Sized> {
    source: &'a mut S,
    window: Vec<u8>,
    window_start: u64,
    filled: usize,
}

impl<'a, S: ByteSource + ?Sized> Scanner<'a, S> {
    fn new(source: &'a mut S, window_size: usize) -> Self {
        Scanner {
            source,
            window: vec![0; window_size],
            window_start: 0,
            filled: 0,
        }
    }

    fn byte_at(&mut self, pos: u64) -> std::io::Result<Option<u8>> {
        let window_end = self.window_start + self.filled as u64;
        if pos < self.window_start || pos >= window_end {
            // scanning backwards loads the window that ends at `pos`
            let start = if pos < self.window_start {
                (pos + 1).saturating_sub(self.window.len() as u64)
            } else {
                pos
            };
            self.filled = read_full_at(self.source, start, &mut self.window)?;
            self.window_start = start;
            if pos >= start + self.filled as u64 {
                return Ok(None);
            }
        }

        Ok(Some(self.window[(pos - self.window_start) as usize]))
    }

    fn find_terminator(&mut self, from: u64, terminator: Terminator) -> std::io::Result<Option<u64>> {
        let mut pos = from;
        loop {
            if self.byte_at(pos)?.is_none() {
                return Ok(None);
            }
            let rel = (pos - self.window_start) as usize;
            if let Some(idx) = terminator.find(&self.window[rel..self.filled]) {
                return Ok(Some(pos + idx as u64));
            }
            pos = self.window_start + self.filled as u64;
        }
    }

    /// First position of the terminator run containing `pos`.
    fn run_start(&mut self, pos: u64, terminator: Terminator) -> std::io::Result<u64> {
        let mut start = pos;
        while start > 0 {
            match self.byte_at(start - 1)? {
                Some(byte) if terminator.is_terminator(byte) => start -= 1,
                _ => break,
            }
        }
        Ok(start)
    }
}

/// Finds the line-aligned start of a chunk.
///
/// Returns [`None`] if the nominal start is past the end of the source (more chunks than data).
/// The first chunk always starts at 0.
pub fn locate_chunk_start<S: ByteSource + ?Sized>(
    spec: &ChunkSpec,
    source: &mut S,
    terminator: Terminator,
) -> Result<Option<u64>> {
    if spec.is_empty() {
        return Ok(None);
    }
    let nominal_start = spec.nominal_start();
    if spec.chunk_id() == 1 || nominal_start == 0 {
        return Ok(Some(0));
    }

    let source_length = spec.source_length();
    let mut scanner = Scanner::new(source, SCAN_WINDOW_SIZE);

    // Terminator pairing depends on what precedes the nominal start, so a terminator right before it is
    // re-tokenized from the beginning of its run. Otherwise the first terminator at or after the nominal
    // start follows line content and starts a fresh token.
    let mut pos = match scanner.byte_at(nominal_start - 1)? {
        Some(byte) if terminator.is_terminator(byte) => scanner.run_start(nominal_start - 1, terminator)?,
        _ => match scanner.find_terminator(nominal_start, terminator)? {
            Some(pos) => pos,
            None => return Ok(Some(source_length)),
        },
    };

    loop {
        let first = match scanner.byte_at(pos)? {
            Some(byte) => byte,
            None => return Ok(Some(source_length)),
        };
        let next = scanner.byte_at(pos + 1)?;
        pos += terminator.token_len(first, next) as u64;
        if pos >= nominal_start {
            break;
        }
    }

    log::trace!(
        "chunk {} nominal start {} aligned to {}",
        spec.chunk_id(),
        nominal_start,
        pos
    );

    return Ok(Some(pos));
}

/// Reads one chunk of a source into memory and splits it into lines.
#[derive(Debug, Clone, Copy)]
pub struct ChunkReader {
    overhead: usize,
    terminator: Terminator,
}

impl Default for ChunkReader {
    fn default() -> Self {
        ChunkReader::new(DEFAULT_CHUNK_OVERHEAD, Terminator::default())
    }
}

impl ChunkReader {
    /// Creates a chunk reader.
    ///
    /// # Arguments
    /// * `overhead` - Extra buffer room for the last line of a chunk that crosses the nominal chunk end
    /// * `terminator` - Line terminator mode
    pub fn new(overhead: usize, terminator: Terminator) -> Self {
        ChunkReader { overhead, terminator }
    }

    /// Locates the chunk start and reads the chunk.
    pub fn read_chunk<S: ByteSource + ?Sized>(&self, spec: &ChunkSpec, source: &mut S) -> Result<Chunk> {
        let start = locate_chunk_start(spec, source, self.terminator)?;
        self.read_from(spec, start, source)
    }

    /// Reads the chunk starting at the already located `start`.
    ///
    /// Fails with [`SortError::ChunkTooSmall`] if a line of the chunk doesn't fit in
    /// nominal size + overhead bytes counted from the chunk start.
    pub fn read_from<S: ByteSource + ?Sized>(
        &self,
        spec: &ChunkSpec,
        start: Option<u64>,
        source: &mut S,
    ) -> Result<Chunk> {
        let start = match start {
            Some(start) if start < spec.nominal_end() => start,
            _ => {
                log::debug!("chunk {} is empty", spec.chunk_id());
                return Ok(Chunk::new());
            }
        };

        let invalid = || SortError::InvalidChunkSpec {
            chunk_id: spec.chunk_id(),
            num_chunks: spec.num_chunks(),
        };
        let limit = usize::try_from(spec.nominal_size())
            .map_err(|_| invalid())?
            .saturating_add(self.overhead);
        // two extra bytes: one to see past the limit, one to match a terminator pair
        let capacity = (limit as u64)
            .saturating_add(2)
            .min(spec.source_length() - start);
        let capacity = usize::try_from(capacity).map_err(|_| invalid())?;

        let mut buffer = vec![0u8; capacity];
        let filled = read_full_at(source, start, &mut buffer)?;
        buffer.truncate(filled);
        let eof = filled < capacity || start + filled as u64 >= spec.source_length();

        let lines_end = (spec.nominal_end() - start) as usize;
        let mut markers = Vec::new();
        let mut pos = 0;
        while pos < lines_end && pos < buffer.len() {
            match scan_line(&buffer, pos, eof, self.terminator) {
                LineScan::Line { end, next } if end <= limit => {
                    markers.push(Marker::new(pos, end - pos));
                    pos = next;
                }
                _ => {
                    return Err(SortError::ChunkTooSmall {
                        chunk_id: spec.chunk_id(),
                        limit,
                    })
                }
            }
        }
        buffer.truncate(pos);

        log::debug!(
            "chunk {} read: {} lines, {} bytes from offset {}",
            spec.chunk_id(),
            markers.len(),
            pos,
            start
        );

        return Ok(Chunk::from_parts(buffer, markers));
    }
}
