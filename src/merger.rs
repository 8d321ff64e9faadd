//! K-way merger: the merge phase of the external sort.

use std::cmp::Ordering;
use std::collections::binary_heap::PeekMut;
use std::collections::BinaryHeap;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::block::SequentialBlockReader;
use crate::buffer::BufferedChunkWriter;
use crate::chunk::{compare_lines, Chunk};
use crate::error::{Result, SortError};
use crate::observer::{NoopObserver, Observer, Phase};
use crate::options::SortOptions;
use crate::storage::{create_destination, ByteSink, ChunkStore};

/// Merge position inside the current block of one input.
struct MergeCursor {
    chunk_index: usize,
    block: Chunk,
    marker_pos: usize,
}

impl MergeCursor {
    fn line(&self) -> &[u8] {
        self.block.line(self.marker_pos)
    }
}

// binary heap is max-heap so the comparison is reversed to get the smallest line on top
impl Ord for MergeCursor {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_lines(other.line(), self.line()).then_with(|| other.chunk_index.cmp(&self.chunk_index))
    }
}

impl PartialOrd for MergeCursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for MergeCursor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for MergeCursor {}

/// Binary heap merger of sorted line streams.
///
/// Every input is read in blocks through a [`SequentialBlockReader`], so memory is bounded by one block
/// per input whatever the input sizes are. Time complexity is *m* \* log(*n*) where *m* is the number
/// of lines and *n* the number of inputs.
pub struct KWayMerger<R: Read> {
    readers: Vec<SequentialBlockReader<R>>,
    cursors: BinaryHeap<MergeCursor>,
    initiated: bool,
    observer: Arc<dyn Observer>,
}

impl<R: Read> KWayMerger<R> {
    /// Creates a merger over block readers. Every input must be sorted in ascending order,
    /// otherwise the result is undefined.
    pub fn new<I>(readers: I) -> Self
    where
        I: IntoIterator<Item = SequentialBlockReader<R>>,
    {
        let readers = Vec::from_iter(readers);
        let cursors = BinaryHeap::with_capacity(readers.len());

        return KWayMerger {
            readers,
            cursors,
            initiated: false,
            observer: Arc::new(NoopObserver),
        };
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        return self;
    }

    /// Calls `f` with every line of all inputs in ascending order.
    pub fn for_each_line<F>(&mut self, mut f: F) -> io::Result<()>
    where
        F: FnMut(&[u8]) -> io::Result<()>,
    {
        if !self.initiated {
            for chunk_index in 0..self.readers.len() {
                self.advance(chunk_index)?;
            }
            self.initiated = true;
        }

        loop {
            let mut top = match self.cursors.peek_mut() {
                Some(top) => top,
                None => break,
            };
            f(top.line())?;

            top.marker_pos += 1;
            if top.marker_pos < top.block.len() {
                // dropping `top` restores the heap order
                continue;
            }

            let exhausted = PeekMut::pop(top);
            let chunk_index = exhausted.chunk_index;
            self.readers[chunk_index].recycle(exhausted.block);
            self.advance(chunk_index)?;
        }

        return Ok(());
    }

    /// Writes all lines to `writer` in ascending order.
    pub fn merge_into<W: ByteSink>(&mut self, writer: &mut BufferedChunkWriter<W>) -> io::Result<()> {
        self.for_each_line(|line| writer.write_line(line))
    }

    /// Pulls the next block of input `chunk_index`. An exhausted input is dropped from the merge.
    fn advance(&mut self, chunk_index: usize) -> io::Result<()> {
        if let Some(block) = self.readers[chunk_index].next_block()? {
            self.observer.block_read(chunk_index, block.len(), block.data().len());
            self.cursors.push(MergeCursor {
                chunk_index,
                block,
                marker_pos: 0,
            });
        }

        return Ok(());
    }
}

/// Result of a merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeReport {
    /// Lines written to the output.
    pub lines: u64,
    /// Bytes written to the output.
    pub bytes: u64,
}

/// Merge phase: merges sorted chunk files `1..=num_chunks` into one sorted output.
pub struct ChunkMerging {
    options: SortOptions,
    observer: Arc<dyn Observer>,
}

impl ChunkMerging {
    pub fn new(options: SortOptions) -> Self {
        ChunkMerging {
            options,
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> ChunkMerging {
        self.observer = observer;
        return self;
    }

    /// Merges the sorted chunk files of `store` into `output`.
    ///
    /// # Arguments
    /// * `num_chunks` - Number of chunk files to merge
    /// * `store` - Directory holding `{1..=num_chunks}.{ext}`
    /// * `output` - Result file, must not exist unless overwriting is enabled
    pub fn apply(&self, num_chunks: usize, store: &ChunkStore, output: &Path) -> Result<MergeReport> {
        if num_chunks == 0 {
            return Err(SortError::InvalidChunkSpec {
                chunk_id: 0,
                num_chunks,
            });
        }

        let inputs = (1..=num_chunks)
            .map(|chunk_id| store.open(chunk_id))
            .collect::<Result<Vec<_>>>()?;
        let sink = create_destination(output, self.options.overwrite)?;

        log::info!(
            "merging {} chunks from {} into {}",
            num_chunks,
            store.dir().display(),
            output.display()
        );

        self.merge(inputs, sink)
    }

    /// Merges sorted line streams into any sink.
    pub fn merge<R, I, W>(&self, inputs: I, sink: W) -> Result<MergeReport>
    where
        R: Read,
        I: IntoIterator<Item = R>,
        W: ByteSink,
    {
        let block_size = self.options.merge_block_size;
        let terminator = self.options.terminator;
        let mut merger = KWayMerger::new(
            inputs
                .into_iter()
                .map(|input| SequentialBlockReader::new(input, block_size, terminator)),
        )
        .with_observer(self.observer.clone());

        self.observer.phase_started(Phase::Merge);
        let started = Instant::now();
        let result = Self::run(&mut merger, BufferedChunkWriter::with_capacity(self.options.write_buf_size, sink));
        self.observer.phase_finished(Phase::Merge, started.elapsed());

        let report = result?;
        self.observer.lines_written(report.lines, report.bytes);
        log::debug!("merged {} lines, {} bytes", report.lines, report.bytes);

        return Ok(report);
    }

    fn run<R: Read, W: ByteSink>(
        merger: &mut KWayMerger<R>,
        mut writer: BufferedChunkWriter<W>,
    ) -> Result<MergeReport> {
        merger.merge_into(&mut writer)?;
        let report = MergeReport {
            lines: writer.lines_written(),
            bytes: writer.bytes_written(),
        };
        writer.finish()?;

        return Ok(report);
    }
}
