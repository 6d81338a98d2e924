//! Library interface for the `tally` CLI.
//!
//! This crate exposes the CLI's argument parser and command structure as a library,
//! primarily for documentation generation and testing. The actual entry point is
//! in `main.rs`.
//!
//! # Structure
//!
//! - [`Cli`] - The root argument parser (clap derive)
//! - [`Commands`] - Available subcommands
//! - [`commands`] - Command implementations
//!
//! # Documentation Generation
//!
//! The [`command()`] function returns the clap `Command` for generating man pages
//! and shell completions via `xtask`.

pub mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;

/// Color output preference.
#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
pub enum ColorChoice {
    /// Detect terminal capabilities automatically.
    #[default]
    Auto,
    /// Always emit colors.
    Always,
    /// Never emit colors.
    Never,
}

impl ColorChoice {
    /// Set the global owo-colors override. Call once at startup.
    pub fn apply(self) {
        match self {
            Self::Auto => {}
            Self::Always => owo_colors::set_override(true),
            Self::Never => owo_colors::set_override(false),
        }
    }
}

const ENV_HELP: &str = "\
ENVIRONMENT VARIABLES:
    RUST_LOG           Log filter (e.g., debug, tally_core=trace)
    TALLY_LOG_PATH     Explicit log file path
    TALLY_LOG_DIR      Log directory
";

/// Command-line interface definition for tally.
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Who changed how much code, without counting comments and blank lines", long_about = None)]
#[command(version)]
#[command(after_long_help = ENV_HELP)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run as if started in DIR
    #[arg(short = 'C', long, global = true)]
    pub chdir: Option<PathBuf>,

    /// Only print errors (suppresses warnings/info)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// More detail (repeatable; e.g. -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Colorize output
    #[arg(long, global = true, value_enum, default_value_t)]
    pub color: ColorChoice,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,
}

/// Available subcommands for the CLI.
#[derive(Subcommand)]
pub enum Commands {
    /// Rank authors by effective lines changed
    Stats(commands::stats::StatsArgs),

    /// Diagnose configuration and environment
    Doctor(commands::doctor::DoctorArgs),

    /// Show package, configuration, and repository information
    Info(commands::info::InfoArgs),
}

/// Returns the clap command for documentation generation
pub fn command() -> clap::Command {
    Cli::command()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        command().debug_assert();
    }

    #[test]
    fn stats_flags_parse() {
        let cli = Cli::try_parse_from([
            "tally", "--json", "stats", "--since", "2024-01-01", "--until", "2024-01-31",
            "--mode", "raw", "--no-fetch", "--top", "5",
        ])
        .unwrap();
        assert!(cli.json);
        let Commands::Stats(args) = cli.command else {
            panic!("expected stats");
        };
        assert_eq!(args.since.as_deref(), Some("2024-01-01"));
        assert_eq!(args.top, Some(5));
        assert!(args.no_fetch);
    }

    #[test]
    fn today_conflicts_with_since() {
        let result = Cli::try_parse_from(["tally", "stats", "--today", "--since", "2024-01-01"]);
        assert!(result.is_err());
    }
}
