//! External sorter running both phases on one machine.

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;

use crate::error::{Result, SortError};
use crate::merger::{ChunkMerging, MergeReport};
use crate::observer::{NoopObserver, Observer};
use crate::options::SortOptions;
use crate::sort::{ChunkReport, ChunkSorting};
use crate::storage::ChunkStore;

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder {
    /// Number of threads to be used to sort chunks in parallel.
    threads_number: Option<usize>,
    /// Directory to be used to store sorted chunk files.
    tmp_dir: Option<Box<Path>>,
    /// Sort and merge phase options.
    options: SortOptions,
    /// Progress observer shared by all phases.
    observer: Arc<dyn Observer>,
}

impl ExternalSorterBuilder {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }

    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter> {
        ExternalSorter::new(self.threads_number, self.tmp_dir.as_deref(), self.options, self.observer)
    }

    /// Sets number of threads to be used to sort chunks in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets directory to be used to store sorted chunk files.
    pub fn with_tmp_dir(mut self, path: &Path) -> ExternalSorterBuilder {
        self.tmp_dir = Some(path.into());
        return self;
    }

    /// Sets sort and merge phase options.
    pub fn with_options(mut self, options: SortOptions) -> ExternalSorterBuilder {
        self.options = options;
        return self;
    }

    /// Sets progress observer.
    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> ExternalSorterBuilder {
        self.observer = observer;
        return self;
    }
}

impl Default for ExternalSorterBuilder {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            tmp_dir: None,
            options: SortOptions::default(),
            observer: Arc::new(NoopObserver),
        }
    }
}

/// External sorter.
///
/// Sorts every chunk of the input on a worker thread pool, each worker owning its chunk buffer, then merges
/// the sorted chunk files into the output. Chunk files live in a temporary directory removed on drop.
pub struct ExternalSorter {
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Directory to be used to store sorted chunk files.
    tmp_dir: tempfile::TempDir,
    /// Sort and merge phase options.
    options: SortOptions,
    /// Progress observer shared by all phases.
    observer: Arc<dyn Observer>,
}

impl ExternalSorter {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `threads_number` - Number of threads to be used to sort chunks in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `tmp_path` - Directory to be used to store sorted chunk files. If parameter is [`None`] default OS temporary
    ///   directory will be used.
    /// * `options` - Sort and merge phase options.
    /// * `observer` - Progress observer.
    pub fn new(
        threads_number: Option<usize>,
        tmp_path: Option<&Path>,
        options: SortOptions,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        return Ok(ExternalSorter {
            options,
            observer,
            thread_pool: Self::init_thread_pool(threads_number)?,
            tmp_dir: Self::init_tmp_directory(tmp_path)?,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    fn init_tmp_directory(tmp_path: Option<&Path>) -> Result<tempfile::TempDir> {
        let tmp_dir = if let Some(tmp_path) = tmp_path {
            tempfile::tempdir_in(tmp_path)
        } else {
            tempfile::tempdir()
        }
        .map_err(|err| SortError::TempDir(err))?;

        log::info!("using {} as a temporary directory", tmp_dir.path().display());

        return Ok(tmp_dir);
    }

    /// Directory holding the sorted chunk files.
    pub fn tmp_dir(&self) -> &Path {
        self.tmp_dir.path()
    }

    /// Sorts the lines of `input` into `output`.
    ///
    /// # Arguments
    /// * `input` - File to be sorted
    /// * `output` - Result file
    /// * `num_chunks` - Number of chunks the input is split into, each must fit into memory
    pub fn sort_file(&self, input: &Path, output: &Path, num_chunks: usize) -> Result<MergeReport> {
        let store = ChunkStore::new(self.tmp_dir.path(), &self.options.chunk_extension);
        let result = self.sort_with_store(input, output, num_chunks, &store);

        if let Err(err) = store.remove_all(num_chunks) {
            log::warn!("sorted chunk files not removed: {}", err);
        }

        return result;
    }

    fn sort_with_store(&self, input: &Path, output: &Path, num_chunks: usize, store: &ChunkStore) -> Result<MergeReport> {
        log::info!("sorting {} in {} chunks", input.display(), num_chunks);
        let reports = self.sort_chunks(input, num_chunks, store)?;
        let lines: u64 = reports.iter().map(|report| report.lines).sum();
        log::info!("{} chunks sorted ({} lines)", reports.len(), lines);

        let report = ChunkMerging::new(self.options.clone())
            .with_observer(self.observer.clone())
            .apply(num_chunks, store, output)?;
        log::info!("sorted {} lines into {}", report.lines, output.display());

        return Ok(report);
    }

    fn sort_chunks(&self, input: &Path, num_chunks: usize, store: &ChunkStore) -> Result<Vec<ChunkReport>> {
        let sorting = ChunkSorting::new(self.options.clone()).with_observer(self.observer.clone());

        self.thread_pool.install(|| {
            (1..=num_chunks)
                .into_par_iter()
                .map(|chunk_id| sorting.apply(chunk_id, num_chunks, input, store))
                .collect()
        })
    }
}
