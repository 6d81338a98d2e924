//! Info command: show package, configuration, and repository information.

use camino::Utf8Path;
use clap::Args;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use tally_core::config::{self, Config};
use tally_core::{NoisePolicy, StatsMode, git};

/// Arguments for the `info` subcommand.
#[derive(Args, Debug, Default)]
pub struct InfoArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct PackageInfo {
    name: &'static str,
    version: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    description: &'static str,
    #[serde(skip_serializing_if = "str::is_empty")]
    license: &'static str,
}

impl PackageInfo {
    const fn new() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME"),
            version: env!("CARGO_PKG_VERSION"),
            description: env!("CARGO_PKG_DESCRIPTION"),
            license: env!("CARGO_PKG_LICENSE"),
        }
    }
}

#[derive(Serialize)]
struct ConfigInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    config_file: Option<String>,
    log_level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_dir: Option<String>,
    mode: StatsMode,
    remote: String,
    fetch: bool,
    /// Built-in plus configured noise rules; `None` if a configured pattern is invalid.
    noise_rules: Option<usize>,
}

impl ConfigInfo {
    fn from_config(config: &Config, cwd: &Utf8Path) -> Self {
        let stats = config.stats();
        Self {
            config_file: config::find_project_config(cwd).map(|p| p.to_string()),
            log_level: config.log_level.as_str().to_string(),
            log_dir: config.log_dir.as_ref().map(|p| p.to_string()),
            mode: stats.mode(),
            remote: stats.remote().to_string(),
            fetch: stats.fetch(),
            noise_rules: stats.noise_policy().as_ref().map(NoisePolicy::len).ok(),
        }
    }
}

#[derive(Serialize)]
struct RepoInfo {
    inside_repo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<String>,
}

impl RepoInfo {
    fn gather() -> Self {
        let inside_repo = git::git_available() && git::is_inside_repo().unwrap_or(false);
        Self {
            inside_repo,
            branch: inside_repo
                .then(|| git::current_branch().ok().flatten())
                .flatten(),
        }
    }
}

#[derive(Serialize)]
struct FullInfo {
    #[serde(flatten)]
    package: PackageInfo,
    config: ConfigInfo,
    repository: RepoInfo,
}

/// Print package, configuration, and repository information.
#[instrument(name = "cmd_info", skip_all, fields(json_output = global_json))]
pub fn cmd_info(
    _args: InfoArgs,
    global_json: bool,
    config: &Config,
    cwd: &Utf8Path,
) -> anyhow::Result<()> {
    debug!("executing info command");

    let info = FullInfo {
        package: PackageInfo::new(),
        config: ConfigInfo::from_config(config, cwd),
        repository: RepoInfo::gather(),
    };

    if global_json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("{} {}", info.package.name.bold(), info.package.version.green());
    if !info.package.description.is_empty() {
        println!("{}", info.package.description);
    }
    if !info.package.license.is_empty() {
        println!("{}: {}", "License".dimmed(), info.package.license);
    }

    println!();
    println!("{}", "Configuration".bold().underline());
    match info.config.config_file {
        Some(ref path) => println!("{}: {}", "Config file".dimmed(), path.cyan()),
        None => println!("{}: {}", "Config file".dimmed(), "none loaded".yellow()),
    }
    println!("{}: {}", "Log level".dimmed(), info.config.log_level);
    if let Some(ref dir) = info.config.log_dir {
        println!("{}: {}", "Log directory".dimmed(), dir);
    }
    println!("{}: {}", "Mode".dimmed(), info.config.mode.cyan());
    println!(
        "{}: {}",
        "Fetch".dimmed(),
        if info.config.fetch {
            format!("yes, from {}", info.config.remote)
        } else {
            "no".to_string()
        }
    );
    match info.config.noise_rules {
        Some(count) => println!("{}: {count}", "Noise rules".dimmed()),
        None => println!("{}: {}", "Noise rules".dimmed(), "invalid pattern in config".red()),
    }

    println!();
    println!("{}", "Repository".bold().underline());
    if info.repository.inside_repo {
        let branch = info.repository.branch.as_deref().unwrap_or("(detached HEAD)");
        println!("{}: {}", "Branch".dimmed(), branch.cyan());
    } else {
        println!("  {} {}", "○".yellow(), "Not inside a git repository".yellow());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cwd() -> camino::Utf8PathBuf {
        camino::Utf8PathBuf::from("/tmp")
    }

    #[test]
    fn test_cmd_info_text_succeeds() {
        assert!(cmd_info(InfoArgs::default(), false, &Config::default(), &test_cwd()).is_ok());
    }

    #[test]
    fn test_cmd_info_json_via_global() {
        assert!(cmd_info(InfoArgs::default(), true, &Config::default(), &test_cwd()).is_ok());
    }

    #[test]
    fn test_config_info_defaults() {
        let cwd = camino::Utf8PathBuf::from("/nonexistent");
        let info = ConfigInfo::from_config(&Config::default(), &cwd);
        assert!(info.config_file.is_none());
        assert_eq!(info.log_level, "info");
        assert_eq!(info.mode, StatsMode::Effective);
        assert_eq!(info.remote, "origin");
        assert_eq!(info.noise_rules, Some(NoisePolicy::new().len()));
    }

    #[test]
    fn test_config_info_flags_bad_pattern() {
        let config = Config {
            stats: Some(tally_core::StatsConfig {
                extra_noise_patterns: Some(vec!["(".into()]),
                ..Default::default()
            }),
            ..Config::default()
        };
        let info = ConfigInfo::from_config(&config, &test_cwd());
        assert!(info.noise_rules.is_none());
    }
}
