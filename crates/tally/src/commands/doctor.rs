//! Doctor command: diagnose git, configuration, and environment.

use std::io::IsTerminal;

use camino::Utf8Path;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use inquire::Confirm;
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::{debug, instrument};

use tally_core::config::{self, Config, StatsConfig};
use tally_core::git;

/// Arguments for the `doctor` subcommand.
#[derive(Args, Debug, Default)]
pub struct DoctorArgs {
    // No subcommand-specific arguments; uses global --json flag
}

#[derive(Serialize)]
struct DoctorReport {
    git: GitStatus,
    config: ConfigStatus,
    directories: DirectoryPaths,
    environment: Vec<EnvVar>,
}

#[derive(Serialize)]
struct GitStatus {
    /// Path to the `git` executable, if found on PATH
    executable: Option<String>,
    inside_repo: bool,
    /// `None` outside a repository or on a detached HEAD
    branch: Option<String>,
}

#[derive(Serialize)]
struct ConfigStatus {
    file: Option<String>,
    found: bool,
}

#[derive(Serialize)]
struct DirectoryPaths {
    config: Option<String>,
    cache: Option<String>,
    logs: Option<String>,
}

#[derive(Serialize)]
struct EnvVar {
    name: &'static str,
    value: Option<String>,
}

const ENV_VARS: &[&str] = &[
    "TALLY_LOG_PATH",
    "TALLY_LOG_DIR",
    "RUST_LOG",
    "XDG_CONFIG_HOME",
    "XDG_CACHE_HOME",
];

impl GitStatus {
    fn gather() -> Self {
        let executable = which::which("git")
            .ok()
            .map(|path| path.display().to_string());
        let inside_repo = executable.is_some() && git::is_inside_repo().unwrap_or(false);
        let branch = if inside_repo {
            git::current_branch().ok().flatten()
        } else {
            None
        };
        Self {
            executable,
            inside_repo,
            branch,
        }
    }
}

impl DoctorReport {
    fn gather(cwd: &Utf8Path) -> Self {
        let config_file = config::find_project_config(cwd);
        Self {
            git: GitStatus::gather(),
            config: ConfigStatus {
                found: config_file.is_some(),
                file: config_file.map(|p| p.to_string()),
            },
            directories: DirectoryPaths {
                config: config::user_config_dir().map(|p| p.to_string()),
                cache: config::user_cache_dir().map(|p| p.to_string()),
                logs: config::user_data_local_dir().map(|p| p.join("logs").to_string()),
            },
            environment: ENV_VARS
                .iter()
                .map(|&name| EnvVar {
                    name,
                    value: std::env::var(name).ok(),
                })
                .collect(),
        }
    }
}

/// Run diagnostics and report what `tally stats` would work with.
#[instrument(name = "cmd_doctor", skip_all, fields(json_output = global_json))]
pub fn cmd_doctor(_args: DoctorArgs, global_json: bool, cwd: &Utf8Path) -> anyhow::Result<()> {
    debug!("executing doctor command");

    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message("Gathering diagnostics...");
    spinner.enable_steady_tick(std::time::Duration::from_millis(80));
    let report = DoctorReport::gather(cwd);
    spinner.finish_and_clear();

    if global_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("{}", "Git".bold().underline());
    match report.git.executable {
        Some(ref path) => println!("  {} git: {}", "✓".green(), path.cyan()),
        None => println!("  {} git not found on PATH", "✗".red()),
    }
    if report.git.inside_repo {
        let branch = report.git.branch.as_deref().unwrap_or("(detached HEAD)");
        println!("  {} Repository, branch {}", "✓".green(), branch.cyan());
    } else {
        println!("  {} {} is not inside a git repository", "○".yellow(), cwd.cyan());
    }
    println!();

    println!("{}", "Configuration".bold().underline());
    if let Some(ref file) = report.config.file {
        println!("  {} Config file: {}", "✓".green(), file.cyan());
    } else {
        println!("  {} No config file found", "○".yellow());
        offer_config_creation()?;
    }
    println!();

    println!("{}", "Directories".bold().underline());
    print_dir("  Config", report.directories.config.as_deref());
    print_dir("  Cache", report.directories.cache.as_deref());
    print_dir("  Logs", report.directories.logs.as_deref());
    println!();

    println!("{}", "Environment".bold().underline());
    println!("  {}: {}", "Working directory".dimmed(), cwd.cyan());
    let set: Vec<_> = report
        .environment
        .iter()
        .filter_map(|var| var.value.as_deref().map(|value| (var.name, value)))
        .collect();
    if set.is_empty() {
        println!("  {} No logging or XDG overrides set", "○".dimmed());
    }
    for (name, value) in set {
        println!("  {}: {}", name.dimmed(), value.cyan());
    }

    Ok(())
}

fn print_dir(label: &str, path: Option<&str>) {
    print!("{}: ", label.dimmed());
    match path {
        Some(p) => println!("{}", p.cyan()),
        None => println!("{}", "(unavailable)".yellow()),
    }
}

/// Config written by `doctor`: defaults with an explicit `[stats]` section.
fn starter_config() -> Config {
    Config {
        stats: Some(StatsConfig {
            mode: Some(Default::default()),
            remote: Some(config::DEFAULT_REMOTE.to_string()),
            fetch: Some(true),
            extra_noise_patterns: Some(Vec::new()),
            ..StatsConfig::default()
        }),
        ..Config::default()
    }
}

/// Offer to create a user config file when none exists.
fn offer_config_creation() -> anyhow::Result<()> {
    let Some(config_dir) = config::user_config_dir() else {
        return Ok(());
    };
    if !std::io::stdin().is_terminal() {
        return Ok(());
    }

    let config_path = config_dir.join("config.yaml");
    let create = Confirm::new("Create a default config file?")
        .with_default(false)
        .with_help_message(&format!("Will create {config_path}"))
        .prompt();

    // Declined or interrupted: nothing to do.
    if let Ok(true) = create {
        std::fs::create_dir_all(&config_dir)?;
        let yaml = serde_saphyr::to_string(&starter_config())?;
        std::fs::write(&config_path, yaml)?;
        println!("  {} Created {}", "✓".green(), config_path.cyan());
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
    fn test_cmd_doctor_text_succeeds() {
        assert!(cmd_doctor(DoctorArgs::default(), false, &test_cwd()).is_ok());
    }

    #[test]
    fn test_cmd_doctor_json_succeeds() {
        assert!(cmd_doctor(DoctorArgs::default(), true, &test_cwd()).is_ok());
    }

    #[test]
    fn test_doctor_report_lists_env_vars() {
        let report = DoctorReport::gather(&test_cwd());
        let names: Vec<_> = report.environment.iter().map(|v| v.name).collect();
        assert!(names.contains(&"TALLY_LOG_DIR"));
        assert!(report.directories.config.is_some() || report.directories.cache.is_some());
    }

    #[test]
    fn test_git_status_branch_requires_repo() {
        let status = GitStatus::gather();
        if !status.inside_repo {
            assert!(status.branch.is_none());
        }
    }

    #[test]
    fn test_starter_config_round_trips() {
        let yaml = serde_saphyr::to_string(&starter_config()).unwrap();
        assert!(yaml.contains("stats"));
        assert!(yaml.contains("effective"));
    }
}
