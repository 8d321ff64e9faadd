//! Line terminator policy and line splitting.
//!
//! Both the chunk reader and the block reader split bytes into lines with [`scan_line`], so the
//! sort and merge phases always agree on where lines end.
//!
//! In [`Terminator::Canonical`] mode `LF`, `CR`, `CRLF` and `LFCR` each count as exactly one line
//! break. Pairs are matched greedily from left to right: `"a\n\r\nb"` is `"a"`, `""`, `"b"`.
//! A terminator at the very end of the data doesn't open an empty trailing line.

use memchr::{memchr, memchr2};

/// Canonical terminator emitted by writers.
pub const LINE_FEED: u8 = b'\n';
const CARRIAGE_RETURN: u8 = b'\r';

/// Line terminator recognition mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `LF`, `CR`, `CRLF` and `LFCR`.
    Canonical,
    /// `LF` only, `CR` is an ordinary byte.
    LfOnly,
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator::Canonical
    }
}

impl Terminator {
    /// Checks whether the byte starts a line terminator.
    #[inline]
    pub fn is_terminator(self, byte: u8) -> bool {
        match self {
            Terminator::Canonical => byte == LINE_FEED || byte == CARRIAGE_RETURN,
            Terminator::LfOnly => byte == LINE_FEED,
        }
    }

    /// Finds the first terminator byte in `data`.
    #[inline]
    pub fn find(self, data: &[u8]) -> Option<usize> {
        match self {
            Terminator::Canonical => memchr2(LINE_FEED, CARRIAGE_RETURN, data),
            Terminator::LfOnly => memchr(LINE_FEED, data),
        }
    }

    /// Whether the length of a terminator starting with `first` depends on the byte after it.
    #[inline]
    pub fn needs_lookahead(self) -> bool {
        self == Terminator::Canonical
    }

    /// Length of the terminator starting with `first` and followed by `next` (if any).
    #[inline]
    pub fn token_len(self, first: u8, next: Option<u8>) -> usize {
        match (self, next) {
            (Terminator::Canonical, Some(next)) if is_pair(first, next) => 2,
            _ => 1,
        }
    }
}

#[inline]
fn is_pair(first: u8, second: u8) -> bool {
    (first == CARRIAGE_RETURN && second == LINE_FEED) || (first == LINE_FEED && second == CARRIAGE_RETURN)
}

/// Outcome of scanning one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineScan {
    /// Line content is `pos..end`, the next line starts at `next`.
    Line { end: usize, next: usize },
    /// The line (or its terminator) continues past the available data.
    Incomplete,
}

/// Scans the line starting at `pos`.
///
/// # Arguments
/// * `data` - Available bytes
/// * `pos` - Line start, must be less than `data.len()`
/// * `eof` - Whether `data` is the end of the stream. At the end of the stream an unterminated
///   line is complete and a trailing `CR`/`LF` is a complete terminator.
/// * `terminator` - Terminator mode
pub fn scan_line(data: &[u8], pos: usize, eof: bool, terminator: Terminator) -> LineScan {
    debug_assert!(pos < data.len());

    match terminator.find(&data[pos..]) {
        Some(rel) => {
            let end = pos + rel;
            let next = data.get(end + 1).copied();
            if next.is_none() && !eof && terminator.needs_lookahead() {
                return LineScan::Incomplete;
            }
            LineScan::Line {
                end,
                next: end + terminator.token_len(data[end], next),
            }
        }
        None if eof => LineScan::Line {
            end: data.len(),
            next: data.len(),
        },
        None => LineScan::Incomplete,
    }
}
