//! Bounded output buffer for sorted lines.

use std::io;

use crate::chunk::{Chunk, Marker};
use crate::lines::LINE_FEED;
use crate::storage::ByteSink;

/// Default output buffer capacity.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Writes lines, each followed by `LF`, through a fixed capacity buffer.
///
/// The buffer is flushed when the next line doesn't fit. Buffered data is also flushed when the writer
/// is dropped, so it reaches the sink on error paths too; use [`BufferedChunkWriter::finish`] to observe
/// flush errors.
pub struct BufferedChunkWriter<W: ByteSink> {
    inner: Option<W>,
    buffer: Vec<u8>,
    capacity: usize,
    lines: u64,
    bytes: u64,
}

impl<W: ByteSink> BufferedChunkWriter<W> {
    /// Creates a writer with the given buffer capacity (at least one byte).
    pub fn with_capacity(capacity: usize, inner: W) -> Self {
        let capacity = capacity.max(1);
        BufferedChunkWriter {
            inner: Some(inner),
            buffer: Vec::with_capacity(capacity),
            capacity,
            lines: 0,
            bytes: 0,
        }
    }

    /// Writes the line referenced by `marker` inside `data`.
    pub fn write(&mut self, data: &[u8], marker: &Marker) -> io::Result<()> {
        self.write_line(marker.slice(data))
    }

    /// Writes all lines of a chunk in marker order.
    pub fn write_chunk(&mut self, chunk: &Chunk) -> io::Result<()> {
        for marker in chunk.markers() {
            self.write(chunk.data(), marker)?;
        }

        return Ok(());
    }

    /// Writes one line followed by the terminator.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        let needed = line.len() + 1;
        if self.buffer.len() + needed > self.capacity {
            self.flush_buffer()?;
        }

        if needed > self.capacity {
            // doesn't fit even into an empty buffer
            let inner = self.inner_mut()?;
            inner.write_all(line)?;
            inner.write_all(&[LINE_FEED])?;
        } else {
            self.buffer.extend_from_slice(line);
            self.buffer.push(LINE_FEED);
        }

        self.lines += 1;
        self.bytes += needed as u64;

        return Ok(());
    }

    /// Writes buffered bytes to the sink and empties the buffer.
    pub fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner_mut()?.flush()
    }

    /// Flushes, syncs and returns the sink.
    pub fn finish(mut self) -> io::Result<W> {
        self.flush()?;
        self.inner_mut()?.sync()?;
        self.inner.take().ok_or_else(finished_error)
    }

    /// Lines written so far, buffered ones included.
    pub fn lines_written(&self) -> u64 {
        self.lines
    }

    /// Bytes written so far (terminators included), buffered ones included.
    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let inner = self.inner.as_mut().ok_or_else(finished_error)?;
        // a failed write may have consumed part of the buffer, so it is never written again
        let result = inner.write_all(&self.buffer);
        self.buffer.clear();

        return result;
    }

    fn inner_mut(&mut self) -> io::Result<&mut W> {
        self.inner.as_mut().ok_or_else(finished_error)
    }
}

fn finished_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "chunk writer already finished")
}

impl<W: ByteSink> Drop for BufferedChunkWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_some() {
            if let Err(err) = self.flush() {
                log::error!("chunk writer flush on drop failed: {}", err);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{self, Write};

    use rstest::*;

    use super::BufferedChunkWriter;
    use crate::chunk::{Chunk, Marker};
    use crate::storage::ByteSink;

    /// Sink recording the size of every write call.
    #[derive(Default)]
    struct RecordingSink {
        data: Vec<u8>,
        writes: Vec<usize>,
        synced: bool,
    }

    impl Write for RecordingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.extend_from_slice(buf);
            self.writes.push(buf.len());
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteSink for RecordingSink {
        fn sync(&mut self) -> io::Result<()> {
            self.synced = true;
            Ok(())
        }
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteSink for FailingSink {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Sink accepting `fail_after` bytes, failing once, then accepting everything.
    struct FlakySink {
        data: Vec<u8>,
        fail_after: Option<usize>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = match self.fail_after {
                Some(limit) if self.data.len() >= limit => {
                    self.fail_after = None;
                    return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
                }
                Some(limit) => buf.len().min(limit - self.data.len()),
                None => buf.len(),
            };
            self.data.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl ByteSink for FlakySink {
        fn sync(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_chunk_in_marker_order() {
        let chunk = Chunk::from_parts(
            b"banana\napple\ncherry".to_vec(),
            vec![Marker::new(7, 5), Marker::new(0, 6), Marker::new(13, 6)],
        );

        let mut writer = BufferedChunkWriter::with_capacity(1024, Vec::new());
        writer.write_chunk(&chunk).unwrap();
        assert_eq!(writer.lines_written(), 3);
        assert_eq!(writer.bytes_written(), 20);

        let out = writer.finish().unwrap();
        assert_eq!(out, b"apple\nbanana\ncherry\n");
    }

    #[rstest]
    #[case(8, vec![b"abc", b"def", b"ghi"], vec![8, 4])]
    #[case(4, vec![b"abc", b"def", b"ghi"], vec![4, 4, 4])]
    #[case(3, vec![b"abc", b"def"], vec![3, 1, 3, 1])]
    fn test_flush_when_full(
        #[case] capacity: usize,
        #[case] lines: Vec<&[u8; 3]>,
        #[case] expected_writes: Vec<usize>,
    ) {
        let mut writer = BufferedChunkWriter::with_capacity(capacity, RecordingSink::default());
        for line in &lines {
            writer.write_line(&line[..]).unwrap();
        }
        let sink = writer.finish().unwrap();

        assert_eq!(sink.writes, expected_writes);
        assert!(sink.synced);
        let expected: Vec<u8> = lines.iter().flat_map(|l| l.iter().copied().chain([b'\n'])).collect();
        assert_eq!(sink.data, expected);
    }

    #[test]
    fn test_flush_on_drop() {
        let mut out = Vec::new();
        {
            let mut writer = BufferedChunkWriter::with_capacity(64, &mut out);
            writer.write_line(b"").unwrap();
            writer.write_line(b"x").unwrap();
        }
        assert_eq!(out, b"\nx\n");
    }

    #[test]
    fn test_flush_error_is_reported() {
        let mut writer = BufferedChunkWriter::with_capacity(4, FailingSink);
        writer.write_line(b"ab").unwrap();
        assert!(writer.write_line(b"cd").is_err());
        // the failed flush discarded the buffer, nothing is left to write
        assert!(writer.finish().is_ok());
    }

    #[test]
    fn test_failed_finish_does_not_rewrite_on_drop() {
        let mut sink = FlakySink {
            data: Vec::new(),
            fail_after: Some(5),
        };
        let mut writer = BufferedChunkWriter::with_capacity(64, &mut sink);
        writer.write_line(b"abc").unwrap();
        writer.write_line(b"def").unwrap();

        assert!(writer.finish().is_err());
        assert_eq!(sink.data, b"abc\nd");
    }
}
