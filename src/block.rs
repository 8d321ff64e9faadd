//! Sequential block reader.
//!
//! Streams a sorted chunk file in blocks of complete lines using a fixed size buffer. The unterminated
//! tail of each read is moved to the front of the buffer and completed by the next read, so a line is
//! never split between blocks. A line longer than the whole buffer grows the buffer.

use std::io::{self, Read};
use std::mem;

use crate::chunk::{Chunk, Marker};
use crate::lines::{scan_line, LineScan, Terminator};

/// Default block buffer capacity.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

pub struct SequentialBlockReader<R: Read> {
    reader: R,
    buffer: Vec<u8>,
    filled: usize,
    eof: bool,
    spare: Option<Vec<u8>>,
    terminator: Terminator,
}

impl<R: Read> SequentialBlockReader<R> {
    /// Creates a block reader.
    ///
    /// # Arguments
    /// * `reader` - Sorted lines stream
    /// * `block_size` - Buffer capacity in bytes
    /// * `terminator` - Line terminator mode
    pub fn new(reader: R, block_size: usize, terminator: Terminator) -> Self {
        SequentialBlockReader {
            reader,
            buffer: vec![0; block_size.max(1)],
            filled: 0,
            eof: false,
            spare: None,
            terminator,
        }
    }

    /// Current buffer capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the next block of complete lines or [`None`] once the stream is exhausted.
    pub fn next_block(&mut self) -> io::Result<Option<Chunk>> {
        loop {
            self.fill()?;
            if self.filled == 0 {
                return Ok(None);
            }

            let data = &self.buffer[..self.filled];
            let mut markers = Vec::new();
            let mut pos = 0;
            while pos < data.len() {
                match scan_line(data, pos, self.eof, self.terminator) {
                    LineScan::Line { end, next } => {
                        markers.push(Marker::new(pos, end - pos));
                        pos = next;
                    }
                    LineScan::Incomplete => break,
                }
            }

            if !markers.is_empty() {
                return Ok(Some(self.take_block(markers, pos)));
            }

            let grown = self.buffer.len() * 2;
            log::debug!("line exceeds block buffer, growing it to {} bytes", grown);
            self.buffer.resize(grown, 0);
        }
    }

    /// Gives a consumed block buffer back for reuse.
    pub fn recycle(&mut self, block: Chunk) {
        self.spare = Some(block.into_buffer());
    }

    fn fill(&mut self) -> io::Result<()> {
        while self.filled < self.buffer.len() && !self.eof {
            match self.reader.read(&mut self.buffer[self.filled..]) {
                Ok(0) => self.eof = true,
                Ok(n) => self.filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }

        return Ok(());
    }

    /// Hands the first `end` bytes out as a block and moves the remainder to a fresh buffer.
    fn take_block(&mut self, markers: Vec<Marker>, end: usize) -> Chunk {
        let mut next = self.spare.take().unwrap_or_default();
        next.clear();
        next.resize(self.buffer.len(), 0);

        let carry = self.filled - end;
        next[..carry].copy_from_slice(&self.buffer[end..self.filled]);
        self.filled = carry;

        let mut data = mem::replace(&mut self.buffer, next);
        data.truncate(end);

        log::trace!("block read: {} lines, {} bytes, {} carried", markers.len(), end, carry);

        return Chunk::from_parts(data, markers);
    }
}
