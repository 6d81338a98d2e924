//! Git operations.
//!
//! Shells out to `git` for everything. This ensures we inherit the user's
//! credentials, configuration, and any repository quirks git already knows
//! how to handle.

use std::io::{BufReader, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::cancel::CancellationToken;
use crate::classify::COMMIT_MARKER;
use crate::source::{ByteLines, DiffSource, LogQuery, SourceResult, StatsMode};

/// Errors from git operations.
#[derive(Error, Debug)]
pub enum GitError {
    /// Failed to execute the `git` command.
    #[error("failed to run git: {0}")]
    Exec(#[from] std::io::Error),

    /// `git` returned a non-zero exit code.
    #[error("git {command} failed: {stderr}")]
    Command {
        /// The git subcommand that failed (e.g., "log").
        command: String,
        /// Captured stderr.
        stderr: String,
    },

    /// Not inside a git repository.
    #[error("not a git repository (or any parent up to mount point)")]
    NotARepo,

    /// The process was killed because the run was cancelled.
    #[error("git was cancelled")]
    Cancelled,
}

/// Result alias for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// How often a running git process is checked against its cancellation token.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Check that a `git` executable is on `PATH`.
pub fn git_available() -> bool {
    which::which("git").is_ok()
}

/// Check if we're inside a git repository.
#[instrument]
pub fn is_inside_repo() -> GitResult<bool> {
    let result = git(&["rev-parse", "--is-inside-work-tree"]);
    match result {
        Ok(output) => Ok(output.trim() == "true"),
        Err(GitError::Command { .. } | GitError::NotARepo) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Get the current branch name.
///
/// Returns `None` if in a detached HEAD state.
#[instrument]
pub fn current_branch() -> GitResult<Option<String>> {
    let output = git(&["rev-parse", "--abbrev-ref", "HEAD"])?;
    let branch = output.trim().to_string();
    if branch == "HEAD" {
        debug!("detached HEAD");
        Ok(None)
    } else {
        debug!(%branch, "current branch");
        Ok(Some(branch))
    }
}

/// Resolve the branch to walk: the requested one, else the current branch,
/// else `HEAD` when detached.
///
/// # Errors
///
/// Propagates failures from [`current_branch`], including
/// [`GitError::NotARepo`].
pub fn resolve_branch(requested: Option<&str>) -> GitResult<String> {
    if let Some(branch) = requested {
        return Ok(branch.to_string());
    }
    Ok(current_branch()?.unwrap_or_else(|| "HEAD".to_string()))
}

/// Fetch `branch` from `remote` so the log includes commits pushed by others.
///
/// The fetch is killed as soon as `cancel` is set.
///
/// # Errors
///
/// [`GitError::Cancelled`] if the token fired first, otherwise the failure
/// reported by `git fetch`.
#[instrument(skip(cancel))]
pub fn fetch(remote: &str, branch: &str, cancel: &CancellationToken) -> GitResult<()> {
    let mut child = Command::new("git")
        .args(["fetch", "--quiet", remote, branch])
        .env("GIT_TERMINAL_PROMPT", "0")
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;
    let stderr = drain_stderr(child.stderr.take());

    loop {
        if cancel.is_cancelled() {
            let _ = child.kill();
            let _ = child.wait();
            debug!("fetch cancelled");
            return Err(GitError::Cancelled);
        }
        if let Some(status) = child.try_wait()? {
            let stderr = join_stderr(stderr);
            if status.success() {
                debug!("fetch finished");
                return Ok(());
            }
            return Err(command_error("fetch", stderr.trim().to_string()));
        }
        thread::sleep(CANCEL_POLL);
    }
}

/// Arguments for `git log` answering `query`.
pub fn log_args(query: &LogQuery) -> Vec<String> {
    let mut args = vec![
        "log".to_string(),
        query.branch.clone(),
        format!("--since={}", query.range.since_arg()),
        format!("--until={}", query.range.until_arg()),
        "--no-merges".to_string(),
        "--no-color".to_string(),
        format!("--pretty=format:{COMMIT_MARKER}%an"),
    ];
    match query.mode {
        StatsMode::Effective => args.extend(
            [
                "--patch",
                "--unified=0",
                "--no-ext-diff",
                "--no-textconv",
                "--src-prefix=a/",
                "--dst-prefix=b/",
            ]
            .map(String::from),
        ),
        StatsMode::Raw => args.push("--numstat".to_string()),
    }
    args.push("--".to_string());
    args
}

/// Streams `git log` output for a query.
#[derive(Debug, Clone, Default)]
pub struct GitLogSource {
    dir: Option<Utf8PathBuf>,
    cancel: Option<CancellationToken>,
}

impl GitLogSource {
    /// Run git in the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run git in `dir` instead of the current directory.
    pub fn in_dir(mut self, dir: impl AsRef<Utf8Path>) -> Self {
        self.dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Kill the running `git log` once `cancel` is set, even while it is
    /// not producing output.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

impl DiffSource for GitLogSource {
    type Lines = GitLogLines;

    #[instrument(skip(self), fields(dir = ?self.dir))]
    fn open(&self, query: &LogQuery) -> SourceResult<GitLogLines> {
        let args = log_args(query);
        debug!(?args, "spawning git log");

        let mut command = Command::new("git");
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref dir) = self.dir {
            command.current_dir(dir.as_std_path());
        }

        let mut child = command.spawn().map_err(GitError::Exec)?;
        let stdout = child.stdout.take().ok_or_else(|| {
            GitError::Exec(std::io::Error::other("git stdout was not captured"))
        })?;
        let stderr = drain_stderr(child.stderr.take());

        let child = Arc::new(Mutex::new(child));
        if let Some(ref cancel) = self.cancel {
            kill_on_cancel(cancel.clone(), Arc::downgrade(&child));
        }

        Ok(GitLogLines {
            child,
            lines: ByteLines::new(BufReader::new(stdout)),
            stderr,
            cancel: self.cancel.clone(),
            done: false,
        })
    }
}

/// Line iterator over a running `git log`.
///
/// A non-zero exit is reported as a final `Err` item after stdout closes.
/// Dropping the iterator before the end kills the process.
#[derive(Debug)]
pub struct GitLogLines {
    child: Arc<Mutex<Child>>,
    lines: ByteLines<BufReader<ChildStdout>>,
    stderr: Option<JoinHandle<String>>,
    cancel: Option<CancellationToken>,
    done: bool,
}

impl GitLogLines {
    fn finish(&mut self) -> GitResult<()> {
        let status = self
            .child
            .lock()
            .map_err(|_| GitError::Exec(std::io::Error::other("git log handle poisoned")))?
            .wait()?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() && self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            debug!("git log killed by cancellation");
            return Err(GitError::Cancelled);
        }
        if status.success() {
            debug!("git log finished");
            Ok(())
        } else {
            Err(command_error("log", stderr.trim().to_string()))
        }
    }
}

impl Iterator for GitLogLines {
    type Item = SourceResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(line)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(GitError::Exec(e).into()))
            }
            None => {
                self.done = true;
                self.finish().err().map(|e| Err(e.into()))
            }
        }
    }
}

impl Drop for GitLogLines {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock()
            && matches!(child.try_wait(), Ok(None))
        {
            warn!("abandoning git log before it finished");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Watch `token` and kill `child` when it fires.
///
/// The watcher exits once the child handle is dropped.
fn kill_on_cancel(token: CancellationToken, child: Weak<Mutex<Child>>) {
    thread::spawn(move || {
        while let Some(handle) = child.upgrade() {
            if token.is_cancelled() {
                if let Ok(mut child) = handle.lock()
                    && matches!(child.try_wait(), Ok(None))
                {
                    debug!("cancelled, killing git");
                    let _ = child.kill();
                }
                return;
            }
            drop(handle);
            thread::sleep(CANCEL_POLL);
        }
    });
}

fn drain_stderr(pipe: Option<ChildStderr>) -> Option<JoinHandle<String>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    })
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

fn command_error(command: &str, stderr: String) -> GitError {
    if stderr.contains("not a git repository") {
        return GitError::NotARepo;
    }
    GitError::Command {
        command: command.to_string(),
        stderr,
    }
}

/// Run a git command and return its stdout.
fn git(args: &[&str]) -> GitResult<String> {
    let output = Command::new("git").args(args).output()?;

    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(command_error(args.first().unwrap_or(&""), stderr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::range::DateRange;

    fn query(mode: StatsMode) -> LogQuery {
        LogQuery {
            branch: "main".into(),
            range: DateRange::parse("2024-01-01", "2024-01-31").unwrap(),
            mode,
        }
    }

    fn run(dir: &std::path::Path, args: &[&str], date: &str) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .env("GIT_AUTHOR_DATE", date)
            .env("GIT_COMMITTER_DATE", date)
            .env("GIT_CONFIG_GLOBAL", "/dev/null")
            .env("GIT_CONFIG_NOSYSTEM", "1")
            .status()
            .unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn log_args_effective_mode() {
        let args = log_args(&query(StatsMode::Effective));
        assert_eq!(args[0], "log");
        assert_eq!(args[1], "main");
        assert!(args.contains(&"--since=2024-01-01 00:00:00".to_string()));
        assert!(args.contains(&"--until=2024-01-31 23:59:59".to_string()));
        assert!(args.contains(&"--no-merges".to_string()));
        assert!(args.contains(&"--pretty=format:COMMIT:%an".to_string()));
        assert!(args.contains(&"--patch".to_string()));
        assert!(!args.contains(&"--numstat".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("--"));
    }

    #[test]
    fn log_args_raw_mode() {
        let args = log_args(&query(StatsMode::Raw));
        assert!(args.contains(&"--numstat".to_string()));
        assert!(!args.contains(&"--patch".to_string()));
    }

    #[test]
    fn command_error_detects_missing_repo() {
        let err = command_error("log", "fatal: not a git repository".into());
        assert!(matches!(err, GitError::NotARepo));
        let err = command_error("log", "fatal: bad revision".into());
        assert!(matches!(err, GitError::Command { .. }));
    }

    #[test]
    fn is_inside_repo_returns_bool() {
        // Should not error regardless of whether we're in a repo
        let result = is_inside_repo();
        assert!(result.is_ok());
    }

    #[test]
    fn resolve_branch_prefers_request() {
        assert_eq!(resolve_branch(Some("release")).unwrap(), "release");
    }

    #[test]
    fn git_error_on_bad_command() {
        let result = git(&["not-a-real-subcommand"]);
        assert!(result.is_err());
    }

    #[test]
    fn git_log_source_streams_a_real_repo() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path();
        let date = "2024-01-15T12:00:00+00:00";
        run(dir, &["init", "--quiet", "--initial-branch=main"], date);
        std::fs::write(dir.join("lib.c"), "/* header */\nint x = 1;\n\n").unwrap();
        run(dir, &["add", "."], date);
        run(
            dir,
            &["-c", "user.name=Ada", "-c", "user.email=ada@example.com", "commit", "--quiet", "-m", "init"],
            date,
        );

        let utf8 = Utf8PathBuf::try_from(dir.to_path_buf()).unwrap();
        let lines: Vec<String> = GitLogSource::new()
            .in_dir(&utf8)
            .open(&query(StatsMode::Effective))
            .unwrap()
            .collect::<SourceResult<_>>()
            .unwrap();

        assert_eq!(lines.first().map(String::as_str), Some("COMMIT:Ada"));
        assert!(lines.iter().any(|l| l == "+int x = 1;"));
    }

    #[test]
    fn fetch_stops_when_cancelled() {
        if !git_available() {
            return;
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = fetch("no-such-remote", "main", &cancel);
        assert!(matches!(result, Err(GitError::Cancelled)));
    }

    #[test]
    fn cancelled_token_kills_a_silent_child() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        run(tmp.path(), &["init", "--quiet"], "2024-01-15T12:00:00+00:00");

        // Waits on stdin forever without printing anything.
        let mut child = Command::new("git")
            .args(["cat-file", "--batch"])
            .current_dir(tmp.path())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let stdin = child.stdin.take();
        let child = Arc::new(Mutex::new(child));

        let token = CancellationToken::new();
        kill_on_cancel(token.clone(), Arc::downgrade(&child));
        token.cancel();

        let start = std::time::Instant::now();
        while child.lock().unwrap().try_wait().unwrap().is_none() {
            assert!(start.elapsed() < Duration::from_secs(5), "child was not killed");
            thread::sleep(Duration::from_millis(10));
        }
        drop(stdin);
    }

    #[test]
    fn git_log_source_reports_bad_revision() {
        if !git_available() {
            return;
        }
        let tmp = tempfile::tempdir().unwrap();
        let date = "2024-01-15T12:00:00+00:00";
        run(tmp.path(), &["init", "--quiet"], date);

        let utf8 = Utf8PathBuf::try_from(tmp.path().to_path_buf()).unwrap();
        let mut q = query(StatsMode::Effective);
        q.branch = "no-such-branch".into();
        let result: SourceResult<Vec<String>> = GitLogSource::new()
            .in_dir(&utf8)
            .open(&q)
            .unwrap()
            .collect();
        assert!(result.is_err());
    }
}
