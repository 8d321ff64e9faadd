//! Sort and merge phase configuration.

use crate::block::DEFAULT_BLOCK_SIZE;
use crate::buffer::DEFAULT_WRITE_BUFFER_SIZE;
use crate::lines::Terminator;
use crate::reader::DEFAULT_CHUNK_OVERHEAD;

/// Default sorted chunk file extension.
pub const DEFAULT_CHUNK_EXTENSION: &str = "chunk";

/// Options shared by the sort and merge phases. Both phases of one run must use the same terminator mode.
#[derive(Debug, Clone)]
pub struct SortOptions {
    /// Extra room for the line crossing the nominal chunk end.
    pub chunk_overhead: usize,
    /// Output buffer capacity of chunk and merge writers.
    pub write_buf_size: usize,
    /// Per chunk file read block capacity during merge.
    pub merge_block_size: usize,
    /// Line terminator mode.
    pub terminator: Terminator,
    /// Sorted chunk file extension.
    pub chunk_extension: String,
    /// Replace existing destination files instead of failing.
    pub overwrite: bool,
}

impl Default for SortOptions {
    fn default() -> Self {
        SortOptions {
            chunk_overhead: DEFAULT_CHUNK_OVERHEAD,
            write_buf_size: DEFAULT_WRITE_BUFFER_SIZE,
            merge_block_size: DEFAULT_BLOCK_SIZE,
            terminator: Terminator::default(),
            chunk_extension: DEFAULT_CHUNK_EXTENSION.into(),
            overwrite: false,
        }
    }
}

impl SortOptions {
    /// Sets chunk overhead allowance.
    pub fn with_chunk_overhead(mut self, overhead: usize) -> SortOptions {
        self.chunk_overhead = overhead;
        return self;
    }

    /// Sets writer buffer capacity.
    pub fn with_write_buf_size(mut self, buf_size: usize) -> SortOptions {
        self.write_buf_size = buf_size;
        return self;
    }

    /// Sets merge block capacity.
    pub fn with_merge_block_size(mut self, block_size: usize) -> SortOptions {
        self.merge_block_size = block_size;
        return self;
    }

    /// Sets line terminator mode.
    pub fn with_terminator(mut self, terminator: Terminator) -> SortOptions {
        self.terminator = terminator;
        return self;
    }

    /// Sets sorted chunk file extension.
    pub fn with_chunk_extension(mut self, extension: &str) -> SortOptions {
        self.chunk_extension = extension.into();
        return self;
    }

    /// Allows overwriting existing destination files.
    pub fn with_overwrite(mut self, overwrite: bool) -> SortOptions {
        self.overwrite = overwrite;
        return self;
    }
}
