//! Diff line classification.
//!
//! [`Classifier`] walks the text of a `git log --patch` stream one physical
//! line at a time and turns it into [`DiffEvent`]s: a commit boundary, or an
//! added/removed line tagged with whether it counts as effective code.
//!
//! The only state carried between lines is the [`ScanState`] (open block or
//! markup comment) and the position inside the current file diff. Both reset
//! at every commit boundary; a decision about a line is never revisited once
//! a later line closes a comment.

use serde::Serialize;
use tracing::trace;

use crate::policy::{BlockKind, NoisePolicy};

/// Prefix of the commit-boundary line; the author name follows verbatim.
///
/// Matches the `--pretty=format:COMMIT:%an` argument passed to `git log`.
pub const COMMIT_MARKER: &str = "COMMIT:";

/// Which side of the diff a changed line is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Line starts with `+`.
    Added,
    /// Line starts with `-`.
    Removed,
}

/// A record produced from the diff-text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffEvent {
    /// A new commit by `author` begins.
    CommitStarted {
        /// Author display name, exactly as reported by git.
        author: String,
    },
    /// One added or removed line.
    LineChange {
        /// Added or removed.
        direction: Direction,
        /// Whether the line counts as code.
        effective: bool,
    },
    /// Per-file totals from `--numstat` output.
    FileTotals {
        /// Lines added in the file.
        additions: u64,
        /// Lines removed from the file.
        deletions: u64,
    },
}

/// Turns raw log lines into events.
///
/// Implemented by [`Classifier`] for patch output and by
/// [`NumstatScanner`](crate::numstat::NumstatScanner) for `--numstat` output.
pub trait LineScanner {
    /// Consume one line. Lines that carry no information yield `None`.
    fn scan(&mut self, line: &str) -> Option<DiffEvent>;
}

/// Extract the author from a commit-boundary line.
pub fn parse_commit_marker(line: &str) -> Option<&str> {
    line.strip_prefix(COMMIT_MARKER)
}

/// Open-comment state for the commit being scanned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanState {
    /// Inside an unterminated `/* ... */` comment.
    pub in_block_comment: bool,
    /// Inside an unterminated `<!-- ... -->` comment.
    pub in_markup_comment: bool,
}

impl ScanState {
    /// Clear both flags.
    pub const fn reset(&mut self) {
        *self = Self {
            in_block_comment: false,
            in_markup_comment: false,
        };
    }

    /// Whether the given comment kind is open.
    pub const fn is_open(&self, kind: BlockKind) -> bool {
        match kind {
            BlockKind::Block => self.in_block_comment,
            BlockKind::Markup => self.in_markup_comment,
        }
    }

    /// Whether any comment is open.
    pub const fn any_open(&self) -> bool {
        self.in_block_comment || self.in_markup_comment
    }

    const fn set(&mut self, kind: BlockKind, open: bool) {
        match kind {
            BlockKind::Block => self.in_block_comment = open,
            BlockKind::Markup => self.in_markup_comment = open,
        }
    }

    /// Feed a line that sits inside an open comment; closes whichever open
    /// comment the line terminates.
    fn continue_comment(&mut self, content: &str) {
        for kind in BlockKind::ALL {
            if self.is_open(kind) && content.contains(kind.closer()) {
                self.set(kind, false);
            }
        }
    }

    /// Record any comment that `content` opens without closing.
    fn open_comments(&mut self, content: &str) {
        for kind in BlockKind::ALL {
            if kind.leaves_open(content) {
                self.set(kind, true);
            }
        }
    }
}

/// Where the scanner is within one file's diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    /// After a commit marker, before any `diff --git` line.
    Preamble,
    /// Between `diff --git` and the first `@@` hunk header.
    FileHeader,
    /// Inside hunk content.
    Hunk,
}

/// Stateful scanner over patch output.
#[derive(Debug, Clone)]
pub struct Classifier<'p> {
    policy: &'p NoisePolicy,
    state: ScanState,
    section: Section,
}

impl<'p> Classifier<'p> {
    /// Create a classifier using `policy` for noise decisions.
    pub const fn new(policy: &'p NoisePolicy) -> Self {
        Self {
            policy,
            state: ScanState {
                in_block_comment: false,
                in_markup_comment: false,
            },
            section: Section::Preamble,
        }
    }

    /// Current comment state.
    pub const fn state(&self) -> ScanState {
        self.state
    }

    /// Classify the content of one changed line (marker stripped) and
    /// update the comment state.
    pub fn is_effective(&mut self, content: &str) -> bool {
        if self.state.any_open() {
            self.state.continue_comment(content);
            trace!(content, "inside comment");
            return false;
        }

        self.state.open_comments(content);

        if let Some(rule) = self.policy.matching_rule(content) {
            trace!(content, rule, "noise");
            return false;
        }
        true
    }

    fn is_file_header(&self, line: &str) -> bool {
        self.section != Section::Hunk && (line.starts_with("+++") || line.starts_with("---"))
    }
}

impl LineScanner for Classifier<'_> {
    fn scan(&mut self, line: &str) -> Option<DiffEvent> {
        if let Some(author) = parse_commit_marker(line) {
            self.state.reset();
            self.section = Section::Preamble;
            return Some(DiffEvent::CommitStarted {
                author: author.to_string(),
            });
        }

        if line.starts_with("diff --git ") {
            self.section = Section::FileHeader;
            return None;
        }
        if line.starts_with("@@") {
            self.section = Section::Hunk;
            return None;
        }
        if self.is_file_header(line) {
            return None;
        }

        let (direction, content) = if let Some(content) = line.strip_prefix('+') {
            (Direction::Added, content)
        } else if let Some(content) = line.strip_prefix('-') {
            (Direction::Removed, content)
        } else {
            return None;
        };

        let effective = self.is_effective(content);
        Some(DiffEvent::LineChange {
            direction,
            effective,
        })
    }
}

/// Classify a finite sequence of patch lines.
pub fn classify_lines<'a, I, S>(
    lines: I,
    policy: &'a NoisePolicy,
) -> impl Iterator<Item = DiffEvent> + 'a
where
    I: IntoIterator<Item = S>,
    I::IntoIter: 'a,
    S: AsRef<str>,
{
    let mut classifier = Classifier::new(policy);
    lines
        .into_iter()
        .filter_map(move |line| classifier.scan(line.as_ref()))
}
