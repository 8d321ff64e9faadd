//! Sorting progress observers.

use std::fmt;
use std::time::Duration;

/// Sort or merge step being timed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading of chunk `id` (boundary lookup included).
    ReadChunk(usize),
    /// In-memory sort of chunk `id`.
    SortChunk(usize),
    /// Writing of sorted chunk `id`.
    WriteChunk(usize),
    /// K-way merge of all chunks.
    Merge,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::ReadChunk(id) => write!(f, "read chunk {}", id),
            Phase::SortChunk(id) => write!(f, "sort chunk {}", id),
            Phase::WriteChunk(id) => write!(f, "write chunk {}", id),
            Phase::Merge => write!(f, "merge"),
        }
    }
}

/// Receives progress events of one sort or merge invocation. All methods default to no-op.
pub trait Observer: Send + Sync {
    fn phase_started(&self, _phase: Phase) {}

    fn phase_finished(&self, _phase: Phase, _elapsed: Duration) {}

    /// A chunk was read from the source.
    fn chunk_read(&self, _chunk_id: usize, _lines: usize, _bytes: usize) {}

    /// The merge pulled a new block of a chunk file.
    fn block_read(&self, _chunk_index: usize, _lines: usize, _bytes: usize) {}

    /// Lines were written to a chunk file or the merge output.
    fn lines_written(&self, _lines: u64, _bytes: u64) {}
}

/// Observer that ignores all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {}

/// Observer that forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn phase_started(&self, phase: Phase) {
        log::debug!(">>> {}", phase);
    }

    fn phase_finished(&self, phase: Phase, elapsed: Duration) {
        log::debug!("<<< {} done in {:.3} s", phase, elapsed.as_secs_f64());
    }

    fn chunk_read(&self, chunk_id: usize, lines: usize, bytes: usize) {
        log::debug!("chunk {}: {} lines, {} bytes", chunk_id, lines, bytes);
    }

    fn block_read(&self, chunk_index: usize, lines: usize, bytes: usize) {
        log::trace!("chunk file #{} block: {} lines, {} bytes", chunk_index, lines, bytes);
    }

    fn lines_written(&self, lines: u64, bytes: u64) {
        log::debug!("written {} lines, {} bytes", lines, bytes);
    }
}
