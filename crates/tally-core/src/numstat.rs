//! Raw `--numstat` scanning.
//!
//! Counts every changed line git reports, with no noise filtering. Each row
//! is `<added>\t<deleted>\t<path>`; binary files report `-` for both counts
//! and contribute zero. Rows that do not parse are skipped.

use tracing::trace;

use crate::classify::{DiffEvent, LineScanner, parse_commit_marker};

/// Scanner for `git log --numstat` output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NumstatScanner;

impl NumstatScanner {
    /// Create a scanner.
    pub const fn new() -> Self {
        Self
    }
}

fn parse_count(field: &str) -> Option<u64> {
    if field == "-" {
        return Some(0);
    }
    field.parse().ok()
}

/// Parse a single numstat row into `(additions, deletions)`.
pub fn parse_row(line: &str) -> Option<(u64, u64)> {
    let mut fields = line.split_whitespace();
    let additions = parse_count(fields.next()?)?;
    let deletions = parse_count(fields.next()?)?;
    Some((additions, deletions))
}

impl LineScanner for NumstatScanner {
    fn scan(&mut self, line: &str) -> Option<DiffEvent> {
        if let Some(author) = parse_commit_marker(line) {
            return Some(DiffEvent::CommitStarted {
                author: author.to_string(),
            });
        }
        if line.trim().is_empty() {
            return None;
        }
        match parse_row(line) {
            Some((additions, deletions)) => Some(DiffEvent::FileTotals {
                additions,
                deletions,
            }),
            None => {
                trace!(line, "skipping unparsable numstat row");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_file_row() {
        assert_eq!(parse_row("12\t3\tsrc/main.rs"), Some((12, 3)));
    }

    #[test]
    fn binary_row_counts_zero() {
        assert_eq!(parse_row("-\t-\tassets/logo.png"), Some((0, 0)));
    }

    #[test]
    fn garbage_row_is_skipped() {
        let mut scanner = NumstatScanner::new();
        assert_eq!(scanner.scan("not a numstat row"), None);
        assert_eq!(scanner.scan("5"), None);
        assert_eq!(scanner.scan(""), None);
    }

    #[test]
    fn max_width_counts_parse() {
        assert_eq!(
            parse_row("18446744073709551615\t1\tx"),
            Some((u64::MAX, 1))
        );
        assert_eq!(parse_row("18446744073709551616\t1\tx"), None);
    }

    #[test]
    fn emits_commit_and_totals() {
        let mut scanner = NumstatScanner::new();
        assert_eq!(
            scanner.scan("COMMIT:carol"),
            Some(DiffEvent::CommitStarted {
                author: "carol".into()
            })
        );
        assert_eq!(
            scanner.scan("4\t0\tREADME.md"),
            Some(DiffEvent::FileTotals {
                additions: 4,
                deletions: 0
            })
        );
    }
}
