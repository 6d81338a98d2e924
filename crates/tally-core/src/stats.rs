//! Per-author statistics aggregation.
//!
//! [`Aggregator`] folds a stream of [`DiffEvent`]s into one
//! [`AuthorStatistic`] per author name and hands them back ranked by total
//! changed lines.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::classify::{Direction, DiffEvent, classify_lines};
use crate::policy::NoisePolicy;

/// Contribution totals for one author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthorStatistic {
    /// Author name exactly as git reported it.
    pub author: String,
    /// Number of commits attributed to the author.
    pub commit_count: u64,
    /// Effective lines added.
    pub additions: u64,
    /// Effective lines removed.
    pub deletions: u64,
}

impl AuthorStatistic {
    /// A zeroed record for `author`.
    pub fn new(author: impl Into<String>) -> Self {
        Self {
            author: author.into(),
            ..Self::default()
        }
    }

    /// `additions + deletions`, saturating at `u64::MAX`.
    pub const fn total_changes(&self) -> u64 {
        self.additions.saturating_add(self.deletions)
    }
}

/// Order by total changes, largest first.
///
/// The sort is stable: authors with equal totals keep their relative order.
pub fn rank(stats: &mut [AuthorStatistic]) {
    stats.sort_by(|a, b| b.total_changes().cmp(&a.total_changes()));
}

/// Running per-author totals for one computation.
#[derive(Debug, Default)]
pub struct Aggregator {
    authors: Vec<AuthorStatistic>,
    index: HashMap<String, usize>,
    current: Option<usize>,
    noise_lines: u64,
    orphan_events: u64,
}

impl Aggregator {
    /// Empty aggregator.
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, author: String) -> usize {
        if let Some(&i) = self.index.get(&author) {
            return i;
        }
        let i = self.authors.len();
        self.authors.push(AuthorStatistic::new(author.clone()));
        self.index.insert(author, i);
        i
    }

    /// Apply one event.
    pub fn apply(&mut self, event: DiffEvent) {
        match event {
            DiffEvent::CommitStarted { author } => {
                let i = self.entry(author);
                self.authors[i].commit_count += 1;
                self.current = Some(i);
            }
            DiffEvent::LineChange {
                effective: false, ..
            } => self.noise_lines += 1,
            DiffEvent::LineChange {
                direction,
                effective: true,
            } => {
                let Some(i) = self.current else {
                    self.orphan_events += 1;
                    trace!("line change before any commit, ignored");
                    return;
                };
                match direction {
                    Direction::Added => self.authors[i].additions += 1,
                    Direction::Removed => self.authors[i].deletions += 1,
                }
            }
            DiffEvent::FileTotals {
                additions,
                deletions,
            } => {
                let Some(i) = self.current else {
                    self.orphan_events += 1;
                    trace!("file totals before any commit, ignored");
                    return;
                };
                // numstat counts are unbounded.
                let author = &mut self.authors[i];
                author.additions = author.additions.saturating_add(additions);
                author.deletions = author.deletions.saturating_add(deletions);
            }
        }
    }

    /// Number of changed lines classified as noise so far.
    pub const fn noise_lines(&self) -> u64 {
        self.noise_lines
    }

    /// Number of distinct authors seen so far.
    pub fn author_count(&self) -> usize {
        self.authors.len()
    }

    /// Ranked statistics, consuming the aggregator.
    pub fn finish(self) -> Vec<AuthorStatistic> {
        debug!(
            authors = self.authors.len(),
            noise_lines = self.noise_lines,
            orphan_events = self.orphan_events,
            "aggregation finished"
        );
        let mut authors = self.authors;
        rank(&mut authors);
        authors
    }
}

impl Extend<DiffEvent> for Aggregator {
    fn extend<T: IntoIterator<Item = DiffEvent>>(&mut self, iter: T) {
        for event in iter {
            self.apply(event);
        }
    }
}

/// Classify patch lines and aggregate them in one pass.
pub fn tally_lines<I, S>(lines: I, policy: &NoisePolicy) -> Vec<AuthorStatistic>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut aggregator = Aggregator::new();
    aggregator.extend(classify_lines(lines, policy));
    aggregator.finish()
}
