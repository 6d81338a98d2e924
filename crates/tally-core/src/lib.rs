//! Core library for tally.
//!
//! Turns `git log` output into per-author change statistics, counting only
//! lines that carry code. Comments, blank lines, bracket-only lines, imports
//! and similar noise are dropped by a [`NoisePolicy`].
//!
//! # Modules
//!
//! - [`cancel`] - Cooperative cancellation token
//! - [`classify`] - Diff line classifier and comment state machine
//! - [`config`] - Configuration loading and management
//! - [`engine`] - One statistics run over a diff source
//! - [`error`] - Error types and result aliases
//! - [`git`] - Git operations and the `git log` source
//! - [`numstat`] - Raw `--numstat` row scanner
//! - [`policy`] - Noise rules
//! - [`range`] - Inclusive date ranges
//! - [`source`] - Diff-text producers
//! - [`stats`] - Per-author aggregation and ranking
//!
//! # Quick Start
//!
//! ```
//! use tally_core::{CancellationToken, LogQuery, MemorySource, NoisePolicy, StatsMode};
//! use tally_core::range::DateRange;
//!
//! let source = MemorySource::new(["COMMIT:alice", "+let x = 1;", "+// note"]);
//! let query = LogQuery {
//!     branch: "HEAD".into(),
//!     range: DateRange::today(),
//!     mode: StatsMode::Effective,
//! };
//! let stats = tally_core::collect_statistics(
//!     &source,
//!     &query,
//!     &NoisePolicy::new(),
//!     &CancellationToken::new(),
//!     |_| {},
//! )
//! .unwrap()
//! .into_stats();
//! assert_eq!(stats[0].additions, 1);
//! ```
#![deny(unsafe_code)]

pub mod cancel;

pub mod classify;

pub mod config;

pub mod engine;

pub mod error;

pub mod git;

pub mod numstat;

pub mod policy;

pub mod range;

pub mod source;

pub mod stats;

pub use cancel::CancellationToken;
pub use config::{Config, ConfigLoader, LogLevel, StatsConfig};
pub use engine::{Progress, RunOutcome, collect_statistics};
pub use error::{ConfigError, ConfigResult};
pub use policy::NoisePolicy;
pub use source::{DiffSource, FileSource, LogQuery, MemorySource, StatsMode};
pub use stats::AuthorStatistic;
