//! Stats command: rank authors by effective lines changed.

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use camino::{Utf8Path, Utf8PathBuf};
use chrono::{Local, NaiveDate};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Text;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use tally_core::config::Config;
use tally_core::git::{self, GitLogSource};
use tally_core::range::{self, DATE_FORMAT, DateRange};
use tally_core::{
    AuthorStatistic, CancellationToken, DiffSource, FileSource, LogQuery, NoisePolicy, Progress,
    RunOutcome, StatsMode, collect_statistics,
};

/// Arguments for the `stats` subcommand.
#[derive(Args, Debug, Default)]
pub struct StatsArgs {
    /// First day to count (YYYY-MM-DD, default: today)
    #[arg(long, value_name = "DATE", conflicts_with_all = ["today", "interactive"])]
    pub since: Option<String>,

    /// Last day to count (YYYY-MM-DD, default: today)
    #[arg(long, value_name = "DATE", conflicts_with_all = ["today", "interactive"])]
    pub until: Option<String>,

    /// Count today only
    #[arg(long, conflicts_with = "interactive")]
    pub today: bool,

    /// Prompt for the date range
    #[arg(short, long)]
    pub interactive: bool,

    /// Counting mode (overrides config)
    #[arg(long, value_enum)]
    pub mode: Option<StatsMode>,

    /// Branch to walk (default: current branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Remote to fetch from (default: origin)
    #[arg(long)]
    pub remote: Option<String>,

    /// Use local history without fetching first
    #[arg(long)]
    pub no_fetch: bool,

    /// Give up after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Show only the first N authors
    #[arg(long, value_name = "N")]
    pub top: Option<usize>,

    /// Read a saved `git log` from PATH instead of running git
    #[arg(long, value_name = "PATH")]
    pub from_file: Option<PathBuf>,
}

#[derive(Serialize)]
struct AuthorRow<'a> {
    rank: usize,
    #[serde(flatten)]
    stat: &'a AuthorStatistic,
    total: u64,
}

#[derive(Serialize)]
struct StatsReport<'a> {
    branch: &'a str,
    since: NaiveDate,
    until: NaiveDate,
    mode: StatsMode,
    cancelled: bool,
    authors: Vec<AuthorRow<'a>>,
}

impl<'a> StatsReport<'a> {
    fn new(query: &'a LogQuery, stats: &'a [AuthorStatistic], cancelled: bool) -> Self {
        Self {
            branch: &query.branch,
            since: query.range.start,
            until: query.range.end,
            mode: query.mode,
            cancelled,
            authors: stats
                .iter()
                .enumerate()
                .map(|(i, stat)| AuthorRow {
                    rank: i + 1,
                    stat,
                    total: stat.total_changes(),
                })
                .collect(),
        }
    }
}

/// Compute and print per-author statistics.
///
/// # Arguments
/// * `global_json` - Global `--json` flag from CLI
/// * `config` - Loaded configuration; flags win over its `[stats]` section
/// * `cwd` - Directory git runs in
#[instrument(name = "cmd_stats", skip_all, fields(json_output = global_json))]
pub fn cmd_stats(
    args: StatsArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    let defaults = config.stats();
    let policy = defaults
        .noise_policy()
        .context("invalid stats.extra_noise_patterns")?;
    let range = if args.interactive {
        prompt_range()?
    } else {
        resolve_range(&args, Local::now().date_naive())?
    };
    let mode = args.mode.unwrap_or_else(|| defaults.mode());
    debug!(%range, %mode, noise_rules = policy.len(), "stats options resolved");

    let cancel = CancellationToken::new();
    if let Some(secs) = args.timeout {
        cancel.cancel_after(Duration::from_secs(secs));
    }

    let spinner = spinner();
    let requested_branch = args.branch.as_deref().or(defaults.branch.as_deref());

    let (query, outcome) = if let Some(ref path) = args.from_file {
        let path = Utf8PathBuf::try_from(path.clone()).map_err(|e| {
            anyhow::anyhow!("log path is not valid UTF-8: {}", e.into_path_buf().display())
        })?;
        let query = LogQuery {
            branch: requested_branch.unwrap_or("HEAD").to_string(),
            range,
            mode,
        };
        spinner.set_message(format!("Reading {path}..."));
        let outcome = run(&FileSource::new(&path), &query, &policy, &cancel, &spinner)
            .with_context(|| format!("failed to read statistics from {path}"))?;
        (query, outcome)
    } else {
        if !git::git_available() {
            bail!("git is not installed or not on PATH");
        }
        if !git::is_inside_repo().context("failed to inspect repository")? {
            bail!("{cwd} is not inside a git repository");
        }
        let branch = git::resolve_branch(requested_branch).context("failed to resolve branch")?;
        let fetch = !args.no_fetch && defaults.fetch() && branch != "HEAD";
        if fetch {
            let remote = args.remote.as_deref().unwrap_or_else(|| defaults.remote());
            spinner.set_message(format!("Fetching {remote}/{branch}..."));
            match git::fetch(remote, &branch, &cancel) {
                Ok(()) => {}
                Err(git::GitError::Cancelled) => debug!("fetch cancelled"),
                Err(err) => {
                    warn!(error = %err, remote, %branch, "fetch failed, using local history");
                }
            }
        }
        let query = LogQuery {
            branch,
            range,
            mode,
        };
        spinner.set_message("Reading history...");
        let source = GitLogSource::new().in_dir(cwd).with_cancel(cancel.clone());
        let outcome = run(&source, &query, &policy, &cancel, &spinner)
            .context("failed to read git history")?;
        (query, outcome)
    };
    spinner.finish_and_clear();

    let cancelled = outcome.is_cancelled();
    let mut stats = outcome.into_stats();
    if let Some(top) = args.top {
        stats.truncate(top);
    }
    info!(authors = stats.len(), cancelled, "stats finished");

    if global_json {
        let report = StatsReport::new(&query, &stats, cancelled);
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if cancelled {
        println!(
            "{} {}",
            "Cancelled:".yellow().bold(),
            "the time limit ran out before the history was read; nothing to report.".dimmed()
        );
    } else if stats.is_empty() {
        print_empty_hint(&query);
    } else {
        print!("{}", render_table(&stats));
        println!();
        println!(
            "{} {} {} {}",
            query.branch.cyan(),
            query.range.to_string().dimmed(),
            format!("({mode})").dimmed(),
            format!("{} authors", stats.len()).dimmed(),
        );
    }

    Ok(())
}

fn run<S: DiffSource>(
    source: &S,
    query: &LogQuery,
    policy: &NoisePolicy,
    cancel: &CancellationToken,
    spinner: &ProgressBar,
) -> tally_core::source::SourceResult<RunOutcome> {
    collect_statistics(source, query, policy, cancel, |p: Progress| {
        spinner.set_message(format!(
            "Processed {} lines, {} authors so far...",
            p.lines, p.authors
        ));
    })
}

fn spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

/// Range from `--since`/`--until`/`--today`.
///
/// A lone `--since` runs through `today`; a lone `--until` counts that day.
fn resolve_range(args: &StatsArgs, today: NaiveDate) -> anyhow::Result<DateRange> {
    if args.today {
        return Ok(DateRange::day(today));
    }
    let range = match (args.since.as_deref(), args.until.as_deref()) {
        (None, None) => DateRange::day(today),
        (Some(since), None) => DateRange::new(range::parse_date(since)?, today)?,
        (None, Some(until)) => DateRange::day(range::parse_date(until)?),
        (Some(since), Some(until)) => DateRange::parse(since, until)?,
    };
    Ok(range)
}

fn prompt_range() -> anyhow::Result<DateRange> {
    if !std::io::stdin().is_terminal() {
        bail!("--interactive needs a terminal; use --since/--until instead");
    }
    let today = Local::now().date_naive().format(DATE_FORMAT).to_string();
    let start = Text::new("Start date:")
        .with_default(&today)
        .with_help_message("YYYY-MM-DD")
        .prompt()
        .context("date prompt cancelled")?;
    let end = Text::new("End date:")
        .with_default(&today)
        .with_help_message("YYYY-MM-DD")
        .prompt()
        .context("date prompt cancelled")?;
    Ok(DateRange::parse(&start, &end)?)
}

fn print_empty_hint(query: &LogQuery) {
    println!(
        "{} {} in {}",
        "No changes found on".yellow(),
        query.branch.cyan(),
        query.range.to_string().cyan()
    );
    println!("{}", "Possible causes:".dimmed());
    for cause in [
        "no commits in the selected date range",
        "every changed line was a comment, blank, or other noise",
        "the branch has not been fetched from its remote",
    ] {
        println!("  {} {}", "○".dimmed(), cause);
    }
}

fn render_table(stats: &[AuthorStatistic]) -> String {
    use std::fmt::Write;

    let name_width = stats
        .iter()
        .map(|s| s.author.chars().count())
        .chain(std::iter::once("Author".len()))
        .max()
        .unwrap_or_default();
    let rank_width = stats.len().to_string().len().max(1);

    let mut out = String::new();
    let header = format!(
        "{:>rank_width$}  {:<name_width$}  {:>7}  {:>7}  {:>7}  {:>7}",
        "#", "Author", "Commits", "Added", "Deleted", "Total"
    );
    let _ = writeln!(out, "{}", header.bold());
    for (i, stat) in stats.iter().enumerate() {
        let rank = format!("{:>rank_width$}", i + 1);
        let author = format!("{:<name_width$}", stat.author);
        let _ = writeln!(
            out,
            "{}  {}  {:>7}  {}  {}  {}",
            rank.dimmed(),
            author,
            stat.commit_count,
            format!("{:>7}", format!("+{}", stat.additions)).green(),
            format!("{:>7}", format!("-{}", stat.deletions)).red(),
            format!("{:>7}", stat.total_changes()).bold(),
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(s: &str) -> NaiveDate {
        range::parse_date(s).unwrap()
    }

    fn stat(author: &str, commits: u64, added: u64, deleted: u64) -> AuthorStatistic {
        AuthorStatistic {
            author: author.into(),
            commit_count: commits,
            additions: added,
            deletions: deleted,
        }
    }

    #[test]
    fn range_defaults_to_today() {
        let today = day("2024-06-10");
        let range = resolve_range(&StatsArgs::default(), today).unwrap();
        assert_eq!(range, DateRange::day(today));
    }

    #[test]
    fn lone_since_runs_through_today() {
        let args = StatsArgs {
            since: Some("2024-06-01".into()),
            ..StatsArgs::default()
        };
        let range = resolve_range(&args, day("2024-06-10")).unwrap();
        assert_eq!((range.start, range.end), (day("2024-06-01"), day("2024-06-10")));
    }

    #[test]
    fn lone_until_is_one_day() {
        let args = StatsArgs {
            until: Some("2024-05-05".into()),
            ..StatsArgs::default()
        };
        let range = resolve_range(&args, day("2024-06-10")).unwrap();
        assert_eq!(range, DateRange::day(day("2024-05-05")));
    }

    #[test]
    fn inverted_range_is_an_error() {
        let args = StatsArgs {
            since: Some("2024-06-02".into()),
            until: Some("2024-06-01".into()),
            ..StatsArgs::default()
        };
        assert!(resolve_range(&args, day("2024-06-10")).is_err());
    }

    #[test]
    fn bad_date_is_an_error() {
        let args = StatsArgs {
            since: Some("last week".into()),
            ..StatsArgs::default()
        };
        let err = resolve_range(&args, day("2024-06-10")).unwrap_err();
        assert!(err.to_string().contains("last week"));
    }

    #[test]
    fn table_lists_authors_in_order() {
        owo_colors::set_override(false);
        let table = render_table(&[stat("bob", 1, 10, 2), stat("alice", 3, 4, 0)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("Author"));
        assert!(lines[1].contains("bob") && lines[1].contains("+10") && lines[1].contains("12"));
        assert!(lines[2].contains("alice") && lines[2].contains("-0"));
    }

    #[test]
    fn report_json_has_ranks_and_totals() {
        let query = LogQuery {
            branch: "main".into(),
            range: DateRange::parse("2024-01-01", "2024-01-31").unwrap(),
            mode: StatsMode::Effective,
        };
        let stats = [stat("bob", 1, 10, 2), stat("alice", 3, 4, 0)];
        let value = serde_json::to_value(StatsReport::new(&query, &stats, false)).unwrap();
        assert_eq!(value["branch"], "main");
        assert_eq!(value["since"], "2024-01-01");
        assert_eq!(value["mode"], "effective");
        assert_eq!(value["authors"][0]["rank"], 1);
        assert_eq!(value["authors"][0]["author"], "bob");
        assert_eq!(value["authors"][0]["total"], 12);
        assert_eq!(value["authors"][1]["commit_count"], 3);
    }
}
