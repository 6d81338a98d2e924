//! Diff-text producers.
//!
//! The engine never runs `git` itself; it asks a [`DiffSource`] for the
//! lines of one log query. [`GitLogSource`](crate::git::GitLogSource) runs
//! `git log`, [`FileSource`] replays a saved log, and [`MemorySource`] serves
//! lines held in memory.

use std::fs::File;
use std::io::{self, BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::git::GitError;
use crate::range::DateRange;

/// Errors from producing diff text.
#[derive(Error, Debug)]
pub enum SourceError {
    /// Running or reading from `git` failed.
    #[error(transparent)]
    Git(#[from] GitError),

    /// A saved log could not be read.
    #[error("failed to read log file '{path}': {source}")]
    Read {
        /// The log file.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        source: io::Error,
    },
}

/// Result alias for diff sources.
pub type SourceResult<T> = Result<T, SourceError>;

/// How changed lines are counted.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum StatsMode {
    /// Classify patch lines and drop comments, blanks, and other noise.
    #[default]
    Effective,
    /// Count every line `git --numstat` reports.
    Raw,
}

impl StatsMode {
    /// Lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Effective => "effective",
            Self::Raw => "raw",
        }
    }
}

impl std::fmt::Display for StatsMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One statistics query: a branch, a date range, and a counting mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    /// Branch or revision to walk.
    pub branch: String,
    /// Days to include.
    pub range: DateRange,
    /// Counting mode; decides the log format.
    pub mode: StatsMode,
}

/// Something that yields the diff-text lines for a [`LogQuery`].
///
/// The sequence must be finite. Dropping it early abandons the producer.
pub trait DiffSource {
    /// Line iterator for one query.
    type Lines: Iterator<Item = SourceResult<String>>;

    /// Start producing lines for `query`.
    ///
    /// # Errors
    ///
    /// Returns an error if the producer cannot be started.
    fn open(&self, query: &LogQuery) -> SourceResult<Self::Lines>;
}

/// Lines from a byte stream, decoded lossily and stripped of line endings.
///
/// Invalid UTF-8 never stops the stream.
#[derive(Debug)]
pub struct ByteLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> ByteLines<R> {
    /// Wrap a buffered reader.
    pub const fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }
}

impl<R: BufRead> Iterator for ByteLines<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
                    self.buf.pop();
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// Replays a log previously captured to a file.
///
/// The file is expected to hold output in the format the query's mode asks
/// git for; branch and range are not re-applied.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: Utf8PathBuf,
}

impl FileSource {
    /// Source backed by the file at `path`.
    pub fn new(path: impl AsRef<Utf8Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Line iterator for [`FileSource`].
#[derive(Debug)]
pub struct FileLines {
    path: Utf8PathBuf,
    lines: ByteLines<BufReader<File>>,
}

impl Iterator for FileLines {
    type Item = SourceResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.lines.next().map(|line| {
            line.map_err(|source| SourceError::Read {
                path: self.path.clone(),
                source,
            })
        })
    }
}

impl DiffSource for FileSource {
    type Lines = FileLines;

    fn open(&self, _query: &LogQuery) -> SourceResult<FileLines> {
        let file = File::open(&self.path).map_err(|source| SourceError::Read {
            path: self.path.clone(),
            source,
        })?;
        Ok(FileLines {
            path: self.path.clone(),
            lines: ByteLines::new(BufReader::new(file)),
        })
    }
}

/// Serves lines held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    lines: Vec<String>,
}

impl MemorySource {
    /// Source over the given lines.
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            lines: lines.into_iter().map(Into::into).collect(),
        }
    }
}

impl DiffSource for MemorySource {
    type Lines = std::iter::Map<std::vec::IntoIter<String>, fn(String) -> SourceResult<String>>;

    fn open(&self, _query: &LogQuery) -> SourceResult<Self::Lines> {
        Ok(self.lines.clone().into_iter().map(Ok as fn(_) -> _))
    }
}
