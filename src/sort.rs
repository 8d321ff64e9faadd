//! Chunk sorting: the sort phase of the external sort.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use rayon::slice::ParallelSliceMut;

use crate::buffer::BufferedChunkWriter;
use crate::chunk::{compare_lines, Chunk, ChunkSpec, Marker};
use crate::error::Result;
use crate::observer::{NoopObserver, Observer, Phase};
use crate::options::SortOptions;
use crate::reader::ChunkReader;
use crate::storage::{ByteSink, ByteSource, ChunkStore, LocalFileSource};

/// Sorts chunk markers by the bytes they reference. Only marker order changes.
pub trait ChunkSorter: Send + Sync {
    fn sort(&self, chunk: &mut Chunk);
}

/// Single threaded pattern-defeating quicksort. O(n log n) worst case, handles runs of equal lines
/// and already sorted input in linear time.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnstableSorter;

impl ChunkSorter for UnstableSorter {
    fn sort(&self, chunk: &mut Chunk) {
        let (data, markers) = chunk.parts_mut();
        sort_markers(data, markers);
    }
}

/// Parallel sort on the current rayon thread pool.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParallelSorter;

impl ChunkSorter for ParallelSorter {
    fn sort(&self, chunk: &mut Chunk) {
        let (data, markers) = chunk.parts_mut();
        markers.par_sort_unstable_by(|a, b| compare_lines(a.slice(data), b.slice(data)));
    }
}

/// Orders markers by unsigned byte comparison of the referenced lines.
pub fn sort_markers(data: &[u8], markers: &mut [Marker]) {
    markers.sort_unstable_by(|a, b| compare_lines(a.slice(data), b.slice(data)));
}

/// Result of sorting one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkReport {
    pub chunk_id: usize,
    /// Lines written to the sorted chunk file.
    pub lines: u64,
    /// Bytes written to the sorted chunk file.
    pub bytes: u64,
}

/// Sort phase: reads one chunk of the source, sorts its lines and writes them to a sorted chunk file.
///
/// Chunks are independent, so different chunk ids can be sorted concurrently by separate instances or
/// threads sharing one instance.
pub struct ChunkSorting {
    options: SortOptions,
    sorter: Arc<dyn ChunkSorter>,
    observer: Arc<dyn Observer>,
}

impl ChunkSorting {
    pub fn new(options: SortOptions) -> Self {
        ChunkSorting {
            options,
            sorter: Arc::new(UnstableSorter),
            observer: Arc::new(NoopObserver),
        }
    }

    /// Sets the progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> ChunkSorting {
        self.observer = observer;
        return self;
    }

    /// Sets the in-memory sort algorithm.
    pub fn with_sorter(mut self, sorter: Arc<dyn ChunkSorter>) -> ChunkSorting {
        self.sorter = sorter;
        return self;
    }

    /// Sorts chunk `chunk_id` of `num_chunks` of the source file into `store`.
    ///
    /// The chunk file is created only once the chunk is read and sorted, and removed again if writing
    /// fails, so a failed call leaves nothing behind and can be retried.
    ///
    /// # Arguments
    /// * `chunk_id` - 1-based chunk number
    /// * `num_chunks` - Total number of chunks
    /// * `source_path` - File to be sorted
    /// * `store` - Directory receiving `{chunk_id}.{ext}`
    pub fn apply(
        &self,
        chunk_id: usize,
        num_chunks: usize,
        source_path: &Path,
        store: &ChunkStore,
    ) -> Result<ChunkReport> {
        let mut source = LocalFileSource::open(source_path)?;
        let spec = ChunkSpec::new(chunk_id, num_chunks, source.len())?;

        log::debug!(
            "sorting chunk {} of {} of {} into {}",
            chunk_id,
            num_chunks,
            source_path.display(),
            store.path_for(chunk_id).display()
        );

        let chunk = self.read_sorted(&spec, &mut source)?;
        let file = store.create(chunk_id, self.options.overwrite)?;

        match self.write_sorted(chunk_id, &chunk, file) {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Err(remove_err) = store.remove(chunk_id) {
                    log::warn!("partial chunk file {} not removed: {}", chunk_id, remove_err);
                }
                Err(err)
            }
        }
    }

    /// Sorts the chunk described by `spec` from any byte source into any sink.
    pub fn sort_chunk<S, W>(&self, spec: &ChunkSpec, source: &mut S, sink: W) -> Result<ChunkReport>
    where
        S: ByteSource + ?Sized,
        W: ByteSink,
    {
        let chunk = self.read_sorted(spec, source)?;
        self.write_sorted(spec.chunk_id(), &chunk, sink)
    }

    /// Reads the chunk and sorts its markers.
    fn read_sorted<S: ByteSource + ?Sized>(&self, spec: &ChunkSpec, source: &mut S) -> Result<Chunk> {
        let chunk_id = spec.chunk_id();
        let reader = ChunkReader::new(self.options.chunk_overhead, self.options.terminator);

        let mut chunk = self.timed(Phase::ReadChunk(chunk_id), || reader.read_chunk(spec, source))?;
        self.observer.chunk_read(chunk_id, chunk.len(), chunk.data().len());

        self.timed(Phase::SortChunk(chunk_id), || {
            self.sorter.sort(&mut chunk);
            Ok(())
        })?;

        return Ok(chunk);
    }

    fn write_sorted<W: ByteSink>(&self, chunk_id: usize, chunk: &Chunk, sink: W) -> Result<ChunkReport> {
        let (lines, bytes) = self.timed(Phase::WriteChunk(chunk_id), || {
            let mut writer = BufferedChunkWriter::with_capacity(self.options.write_buf_size, sink);
            writer.write_chunk(chunk)?;
            let written = (writer.lines_written(), writer.bytes_written());
            writer.finish()?;
            Ok(written)
        })?;
        self.observer.lines_written(lines, bytes);

        return Ok(ChunkReport {
            chunk_id,
            lines,
            bytes,
        });
    }

    fn timed<T>(&self, phase: Phase, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.observer.phase_started(phase);
        let started = Instant::now();
        let result = f();
        self.observer.phase_finished(phase, started.elapsed());
        result
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::io::Cursor;
    use std::sync::Arc;

    use rand::seq::SliceRandom;
    use rand::{Rng, SeedableRng};
    use rstest::*;

    use super::{ChunkSorter, ChunkSorting, ParallelSorter, UnstableSorter};
    use crate::chunk::{Chunk, ChunkSpec, Marker};
    use crate::error::SortError;
    use crate::merger::ChunkMerging;
    use crate::observer::test::RecordingObserver;
    use crate::options::SortOptions;
    use crate::storage::ChunkStore;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir().unwrap()
    }

    fn chunk_of(lines: &[Vec<u8>]) -> Chunk {
        let mut data = Vec::new();
        let mut markers = Vec::new();
        for line in lines {
            markers.push(Marker::new(data.len(), line.len()));
            data.extend_from_slice(line);
        }
        Chunk::from_parts(data, markers)
    }

    #[rstest]
    #[case(Arc::new(UnstableSorter))]
    #[case(Arc::new(ParallelSorter))]
    fn test_sorters(#[case] sorter: Arc<dyn ChunkSorter>) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let mut lines: Vec<Vec<u8>> = (0..500)
            .map(|_| {
                let len = rng.gen_range(0..6);
                (0..len).map(|_| rng.gen_range(b'a'..=b'c')).collect()
            })
            .collect();
        lines.shuffle(&mut rng);

        let mut chunk = chunk_of(&lines);
        let data_before = chunk.data().to_vec();
        sorter.sort(&mut chunk);

        lines.sort();
        assert_eq!(Vec::from_iter(chunk.lines().map(|l| l.to_vec())), lines);
        assert_eq!(chunk.data(), &data_before[..]);
    }

    #[rstest]
    #[case(vec![b"b".to_vec(); 1000])]
    #[case((0..1000u32).map(|i| i.to_be_bytes().to_vec()).collect())]
    #[case((0..1000u32).rev().map(|i| i.to_be_bytes().to_vec()).collect())]
    fn test_sort_adversarial_inputs(#[case] lines: Vec<Vec<u8>>) {
        let mut chunk = chunk_of(&lines);
        UnstableSorter.sort(&mut chunk);

        let sorted = Vec::from_iter(chunk.lines());
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(sorted.len(), lines.len());
    }

    #[test]
    fn test_sort_chunk() {
        let data = b"banana\napple\ncherry\n";
        let spec = ChunkSpec::new(1, 1, data.len() as u64).unwrap();
        let mut out = Vec::new();

        let report = ChunkSorting::new(SortOptions::default())
            .sort_chunk(&spec, &mut Cursor::new(&data[..]), &mut out)
            .unwrap();

        assert_eq!(out, b"apple\nbanana\ncherry\n");
        assert_eq!(report.lines, 3);
        assert_eq!(report.bytes, 20);
    }

    #[test]
    fn test_sort_chunk_normalizes_terminators() {
        let data = b"line2\r\nline1\rline0";
        let spec = ChunkSpec::new(1, 1, data.len() as u64).unwrap();
        let mut out = Vec::new();

        ChunkSorting::new(SortOptions::default())
            .sort_chunk(&spec, &mut Cursor::new(&data[..]), &mut out)
            .unwrap();

        assert_eq!(out, b"line0\nline1\nline2\n");
    }

    #[test]
    fn test_sort_chunk_reports_to_observer() {
        let data = b"b\na\n";
        let spec = ChunkSpec::new(1, 1, data.len() as u64).unwrap();
        let observer = Arc::new(RecordingObserver::default());

        ChunkSorting::new(SortOptions::default())
            .with_observer(observer.clone())
            .sort_chunk(&spec, &mut Cursor::new(&data[..]), Vec::new())
            .unwrap();

        assert_eq!(
            observer.events(),
            vec![
                "start read chunk 1",
                "finish read chunk 1",
                "chunk 1 2 4",
                "start sort chunk 1",
                "finish sort chunk 1",
                "start write chunk 1",
                "finish write chunk 1",
                "written 2 4",
            ]
        );
    }

    #[rstest]
    fn test_apply_writes_chunk_files(tmp_dir: tempfile::TempDir) {
        let input = tmp_dir.path().join("input.txt");
        fs::write(&input, b"d\nc\nb\na\n").unwrap();
        let store = ChunkStore::new(tmp_dir.path(), "chunk");
        let sorting = ChunkSorting::new(SortOptions::default());

        for chunk_id in 1..=2 {
            let report = sorting.apply(chunk_id, 2, &input, &store).unwrap();
            assert_eq!(report.chunk_id, chunk_id);
        }

        assert_eq!(fs::read(store.path_for(1)).unwrap(), b"c\nd\n");
        assert_eq!(fs::read(store.path_for(2)).unwrap(), b"a\nb\n");

        let err = sorting.apply(1, 2, &input, &store).unwrap_err();
        assert!(matches!(err, SortError::DestinationAlreadyExists(_)));
    }

    #[rstest]
    fn test_apply_errors(tmp_dir: tempfile::TempDir) {
        let store = ChunkStore::new(tmp_dir.path(), "chunk");
        let sorting = ChunkSorting::new(SortOptions::default());

        let err = sorting.apply(1, 1, &tmp_dir.path().join("missing"), &store).unwrap_err();
        assert!(matches!(err, SortError::SourceNotFound(_)));

        let input = tmp_dir.path().join("input.txt");
        fs::write(&input, b"a\n").unwrap();
        let err = sorting.apply(3, 2, &input, &store).unwrap_err();
        assert!(matches!(err, SortError::InvalidChunkSpec { chunk_id: 3, num_chunks: 2 }));
        assert!(!store.path_for(3).exists());
    }

    #[rstest]
    fn test_apply_chunk_too_small(tmp_dir: tempfile::TempDir) {
        let input = tmp_dir.path().join("input.txt");
        fs::write(&input, format!("a\n{}\n", "x".repeat(64))).unwrap();
        let store = ChunkStore::new(tmp_dir.path(), "chunk");
        let sorting = ChunkSorting::new(SortOptions::default().with_chunk_overhead(2));

        let err = sorting.apply(1, 8, &input, &store).unwrap_err();
        assert!(matches!(err, SortError::ChunkTooSmall { chunk_id: 1, .. }));
    }

    #[rstest]
    fn test_failed_chunk_leaves_no_file_and_can_be_retried(tmp_dir: tempfile::TempDir) {
        let long = "x".repeat(64);
        let input = tmp_dir.path().join("input.txt");
        fs::write(&input, format!("{}\na\n", long)).unwrap();
        let store = ChunkStore::new(tmp_dir.path(), "chunk");

        let err = ChunkSorting::new(SortOptions::default().with_chunk_overhead(2))
            .apply(1, 8, &input, &store)
            .unwrap_err();
        assert!(matches!(err, SortError::ChunkTooSmall { chunk_id: 1, .. }));
        assert!(!store.path_for(1).exists());

        let sorting = ChunkSorting::new(SortOptions::default());
        for chunk_id in 1..=8 {
            sorting.apply(chunk_id, 8, &input, &store).unwrap();
        }
        assert_eq!(fs::read_to_string(store.path_for(1)).unwrap(), format!("{}\n", long));

        let output = tmp_dir.path().join("output.txt");
        let report = ChunkMerging::new(SortOptions::default())
            .apply(8, &store, &output)
            .unwrap();
        assert_eq!(report.lines, 2);
        assert_eq!(fs::read_to_string(&output).unwrap(), format!("a\n{}\n", long));
    }
}
