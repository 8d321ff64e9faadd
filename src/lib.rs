//! `chunk-sort` is a rust chunked external sort implementation for line oriented files.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `chunk-sort` supports the following features:
//!
//! * **Independent chunks:**
//!   the input is split into `N` line aligned chunks by byte offsets only, so every chunk can be sorted
//!   by a separate thread, process or machine given just `(chunk_id, N, input)`.
//! * **Byte order:**
//!   lines are compared as raw unsigned bytes, no encoding or locale is involved.
//! * **Mixed line terminators:**
//!   `LF`, `CR`, `CRLF` and `LFCR` are all recognized, sorted output always uses `LF`.
//! * **Bounded merge memory:**
//!   sorted chunk files are merged through one fixed size block buffer per chunk.
//! * **Multithreading support:**
//!   [`ExternalSorter`] runs both phases on one machine sorting chunks on a thread pool.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use chunk_sort::{ExternalSorterBuilder, LogObserver, SortOptions};
//!
//! fn main() {
//!     let sorter = ExternalSorterBuilder::new()
//!         .with_tmp_dir(Path::new("./"))
//!         .with_options(SortOptions::default().with_merge_block_size(8 * 1024 * 1024))
//!         .with_observer(Arc::new(LogObserver))
//!         .build()
//!         .unwrap();
//!
//!     sorter
//!         .sort_file(Path::new("input.txt"), Path::new("output.txt"), 16)
//!         .unwrap();
//! }
//! ```
//!
//! The phases can also be driven separately:
//!
//! ```no_run
//! use std::path::Path;
//!
//! use chunk_sort::{ChunkMerging, ChunkSorting, ChunkStore, SortOptions};
//!
//! let store = ChunkStore::new(Path::new("/tmp/chunks"), "chunk");
//! let sorting = ChunkSorting::new(SortOptions::default());
//! for chunk_id in 1..=4 {
//!     sorting.apply(chunk_id, 4, Path::new("input.txt"), &store).unwrap();
//! }
//!
//! ChunkMerging::new(SortOptions::default())
//!     .apply(4, &store, Path::new("output.txt"))
//!     .unwrap();
//! ```

pub mod block;
pub mod buffer;
pub mod chunk;
pub mod error;
pub mod external;
pub mod lines;
pub mod merger;
pub mod observer;
pub mod options;
pub mod reader;
pub mod sort;
pub mod storage;

pub use block::SequentialBlockReader;
pub use buffer::BufferedChunkWriter;
pub use chunk::{Chunk, ChunkSpec, Marker};
pub use error::{Result, SortError};
pub use external::{ExternalSorter, ExternalSorterBuilder};
pub use lines::Terminator;
pub use merger::{ChunkMerging, KWayMerger, MergeReport};
pub use observer::{LogObserver, NoopObserver, Observer, Phase};
pub use options::SortOptions;
pub use reader::ChunkReader;
pub use sort::{ChunkReport, ChunkSorter, ChunkSorting, ParallelSorter, UnstableSorter};
pub use storage::{ByteSink, ByteSource, ChunkStore, LocalFileSource};
