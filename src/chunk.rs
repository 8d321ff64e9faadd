//! Chunk of lines held in memory.

use std::cmp::Ordering;

use crate::error::{Result, SortError};

/// Position of one line inside a chunk buffer. The terminator is not included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Marker {
    pub offset: usize,
    pub length: usize,
}

impl Marker {
    pub fn new(offset: usize, length: usize) -> Self {
        Marker { offset, length }
    }

    /// Returns the marked line bytes.
    ///
    /// # Panics
    /// Panics if the marker points outside of `data`, which means it is used with a buffer it was not built for.
    #[inline]
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.offset..self.offset + self.length]
    }
}

/// Compares two lines byte by byte as unsigned values. A strict prefix sorts first.
#[inline]
pub fn compare_lines(a: &[u8], b: &[u8]) -> Ordering {
    a.cmp(b)
}

/// Byte buffer plus the ordered markers of the lines it contains.
///
/// Sorting reorders the markers only, buffer bytes never change once the chunk is built.
#[derive(Debug, Default)]
pub struct Chunk {
    data: Vec<u8>,
    markers: Vec<Marker>,
}

impl Chunk {
    /// Creates an empty chunk.
    pub fn new() -> Self {
        Chunk::default()
    }

    /// Creates a chunk from a buffer and markers into it.
    ///
    /// # Panics
    /// Panics if any marker exceeds the buffer.
    pub fn from_parts(data: Vec<u8>, markers: Vec<Marker>) -> Self {
        assert!(
            markers.iter().all(|m| m.offset + m.length <= data.len()),
            "marker exceeds chunk buffer"
        );
        Chunk { data, markers }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Buffer and markers at once, so markers can be ordered by the bytes they reference.
    pub fn parts_mut(&mut self) -> (&[u8], &mut [Marker]) {
        (&self.data, &mut self.markers)
    }

    /// Number of lines.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Returns the line at `idx` in the current marker order.
    #[inline]
    pub fn line(&self, idx: usize) -> &[u8] {
        self.markers[idx].slice(&self.data)
    }

    /// Iterates over lines in the current marker order.
    pub fn lines(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.markers.iter().map(move |m| m.slice(&self.data))
    }

    /// Total size of the lines without terminators.
    pub fn content_size(&self) -> usize {
        self.markers.iter().map(|m| m.length).sum()
    }

    /// Releases the buffer so that it can be reused. All markers are dropped with the chunk.
    pub fn into_buffer(self) -> Vec<u8> {
        self.data
    }
}

/// Describes which slice of a source a chunk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpec {
    chunk_id: usize,
    num_chunks: usize,
    source_length: u64,
}

impl ChunkSpec {
    /// Creates a chunk spec.
    ///
    /// # Arguments
    /// * `chunk_id` - 1-based chunk number
    /// * `num_chunks` - Total number of chunks the source is split into
    /// * `source_length` - Source size in bytes
    pub fn new(chunk_id: usize, num_chunks: usize, source_length: u64) -> Result<Self> {
        if num_chunks == 0 || chunk_id == 0 || chunk_id > num_chunks {
            return Err(SortError::InvalidChunkSpec { chunk_id, num_chunks });
        }

        return Ok(ChunkSpec {
            chunk_id,
            num_chunks,
            source_length,
        });
    }

    pub fn chunk_id(&self) -> usize {
        self.chunk_id
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    pub fn source_length(&self) -> u64 {
        self.source_length
    }

    /// Target chunk size: `ceil(source_length / num_chunks)`.
    pub fn nominal_size(&self) -> u64 {
        let num_chunks = self.num_chunks as u64;
        (self.source_length + num_chunks - 1) / num_chunks
    }

    /// Chunk start before line alignment.
    pub fn nominal_start(&self) -> u64 {
        (self.chunk_id as u64 - 1).saturating_mul(self.nominal_size())
    }

    /// Nominal start of the next chunk, capped by the source length.
    /// Only lines starting before this position belong to the chunk.
    pub fn nominal_end(&self) -> u64 {
        (self.chunk_id as u64)
            .saturating_mul(self.nominal_size())
            .min(self.source_length)
    }

    /// Whether the nominal start is beyond the source, i.e. there are more chunks than data.
    pub fn is_empty(&self) -> bool {
        self.nominal_start() >= self.source_length
    }
}

#[cfg(test)]
mod test {
    use std::cmp::Ordering;

    use rstest::*;

    use super::{compare_lines, Chunk, ChunkSpec, Marker};
    use crate::error::SortError;

    #[rstest]
    #[case(b"apple", b"banana", Ordering::Less)]
    #[case(b"apple", b"apple", Ordering::Equal)]
    #[case(b"app", b"apple", Ordering::Less)]
    #[case(b"", b"a", Ordering::Less)]
    #[case(b"\xff", b"a", Ordering::Greater)]
    #[case(b"Zebra", b"apple", Ordering::Less)]
    fn test_compare_lines(#[case] a: &[u8], #[case] b: &[u8], #[case] expected: Ordering) {
        assert_eq!(compare_lines(a, b), expected);
    }

    #[test]
    fn test_chunk_lines() {
        let chunk = Chunk::from_parts(
            b"banana\napple\n\n".to_vec(),
            vec![Marker::new(0, 6), Marker::new(7, 5), Marker::new(13, 0)],
        );

        assert_eq!(chunk.len(), 3);
        assert_eq!(chunk.line(1), b"apple");
        assert_eq!(Vec::from_iter(chunk.lines()), vec![&b"banana"[..], &b"apple"[..], &b""[..]]);
        assert_eq!(chunk.content_size(), 11);
    }

    #[test]
    #[should_panic(expected = "marker exceeds chunk buffer")]
    fn test_chunk_rejects_out_of_bounds_marker() {
        Chunk::from_parts(b"abc".to_vec(), vec![Marker::new(2, 2)]);
    }

    #[rstest]
    #[case(1, 1, 20, 20, 0, 20)]
    #[case(1, 3, 20, 7, 0, 7)]
    #[case(2, 3, 20, 7, 7, 14)]
    #[case(3, 3, 20, 7, 14, 20)]
    #[case(4, 4, 3, 1, 3, 3)]
    #[case(1, 2, 0, 0, 0, 0)]
    fn test_chunk_spec_nominal_range(
        #[case] chunk_id: usize,
        #[case] num_chunks: usize,
        #[case] source_length: u64,
        #[case] nominal_size: u64,
        #[case] nominal_start: u64,
        #[case] nominal_end: u64,
    ) {
        let spec = ChunkSpec::new(chunk_id, num_chunks, source_length).unwrap();
        assert_eq!(spec.nominal_size(), nominal_size);
        assert_eq!(spec.nominal_start(), nominal_start);
        assert_eq!(spec.nominal_end(), nominal_end);
    }

    #[rstest]
    #[case(1, 1, 0, true)]
    #[case(1, 1, 1, false)]
    #[case(3, 5, 2, true)]
    #[case(2, 5, 2, false)]
    fn test_chunk_spec_is_empty(
        #[case] chunk_id: usize,
        #[case] num_chunks: usize,
        #[case] source_length: u64,
        #[case] expected: bool,
    ) {
        let spec = ChunkSpec::new(chunk_id, num_chunks, source_length).unwrap();
        assert_eq!(spec.is_empty(), expected);
    }

    #[rstest]
    #[case(0, 1)]
    #[case(1, 0)]
    #[case(3, 2)]
    fn test_chunk_spec_invalid(#[case] chunk_id: usize, #[case] num_chunks: usize) {
        let err = ChunkSpec::new(chunk_id, num_chunks, 10).unwrap_err();
        assert!(matches!(err, SortError::InvalidChunkSpec { .. }));
    }
}
