//! xtask subcommands.

pub mod completions;

pub mod man;
