//! One statistics run: source lines in, ranked authors out.
//!
//! The run is all-or-nothing. It ends [`RunOutcome::Completed`] with the
//! complete ranked list, [`RunOutcome::Cancelled`] with nothing, or with the
//! producer's error. A partial map is never returned.

use tracing::{debug, info, instrument};

use crate::cancel::CancellationToken;
use crate::classify::{Classifier, LineScanner};
use crate::numstat::NumstatScanner;
use crate::policy::NoisePolicy;
use crate::source::{DiffSource, LogQuery, SourceResult, StatsMode};
use crate::stats::{Aggregator, AuthorStatistic};

/// Progress is reported after every this many input lines.
pub const PROGRESS_INTERVAL: usize = 100;

/// Snapshot handed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// Input lines consumed so far.
    pub lines: usize,
    /// Distinct authors seen so far.
    pub authors: usize,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every input line was consumed.
    Completed(Vec<AuthorStatistic>),
    /// The token was cancelled before the input was exhausted.
    Cancelled,
}

impl RunOutcome {
    /// Whether the run was cancelled.
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Ranked statistics; empty for a cancelled run.
    pub fn into_stats(self) -> Vec<AuthorStatistic> {
        match self {
            Self::Completed(stats) => stats,
            Self::Cancelled => Vec::new(),
        }
    }
}

/// Compute ranked per-author statistics for `query`.
///
/// `on_progress` is called every [`PROGRESS_INTERVAL`] lines. `cancel` is
/// checked before each line; once set, the source is dropped and the run
/// ends [`RunOutcome::Cancelled`].
///
/// # Errors
///
/// Returns the source's error if it cannot start or fails mid-stream.
#[instrument(skip_all, fields(branch = %query.branch, range = %query.range, mode = %query.mode))]
pub fn collect_statistics<S, F>(
    source: &S,
    query: &LogQuery,
    policy: &NoisePolicy,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> SourceResult<RunOutcome>
where
    S: DiffSource,
    F: FnMut(Progress),
{
    if cancel.is_cancelled() {
        info!("cancelled before start");
        return Ok(RunOutcome::Cancelled);
    }

    let mut classifier;
    let mut numstat;
    let scanner: &mut dyn LineScanner = match query.mode {
        StatsMode::Effective => {
            classifier = Classifier::new(policy);
            &mut classifier
        }
        StatsMode::Raw => {
            numstat = NumstatScanner::new();
            &mut numstat
        }
    };

    let mut aggregator = Aggregator::new();
    let mut lines = 0usize;

    for line in source.open(query)? {
        if cancel.is_cancelled() {
            info!(lines, "cancelled, discarding partial statistics");
            return Ok(RunOutcome::Cancelled);
        }
        let line = line?;
        if let Some(event) = scanner.scan(&line) {
            aggregator.apply(event);
        }

        lines += 1;
        if lines % PROGRESS_INTERVAL == 0 {
            on_progress(Progress {
                lines,
                authors: aggregator.author_count(),
            });
        }
    }

    debug!(lines, noise_lines = aggregator.noise_lines(), "input consumed");
    let stats = aggregator.finish();
    info!(authors = stats.len(), lines, "statistics computed");
    Ok(RunOutcome::Completed(stats))
}
