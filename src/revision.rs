//! Revision lookups against the workspace's git history.
//!
//! The hover resolver only sees the [`RevisionLookup`] trait. Two backends
//! implement it: [`GitCli`] runs `git show` under a tokio timeout, and
//! [`GixLookup`] reads the object database in-process.

use std::fmt::Display;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::io::AsyncReadExt;
use tokio::process::Command;

use crate::config::{LookupBackend, ReflensConfig};
use crate::errors::{ReflensError, Result};
use crate::types::RevisionInfo;

/// How long to wait for a killed `git` child to be reaped.
const REAP_TIMEOUT: Duration = Duration::from_secs(2);

/// Read-only queries about a single revision.
///
/// Both methods fail when `rev` does not name a commit in the repository at
/// `repo`, or when the underlying tool cannot answer.
pub trait RevisionLookup: Send + Sync {
    /// Subject, blank line, body; trimmed.
    fn message(&self, repo: &Path, rev: &str) -> Result<String>;

    /// Commit age relative to now, e.g. `5 minutes ago`.
    fn relative_time(&self, repo: &Path, rev: &str) -> Result<String>;

    /// Runs both queries. Fails if either does.
    fn lookup(&self, repo: &Path, rev: &str) -> Result<RevisionInfo> {
        let message = self.message(repo, rev)?;
        let relative_time = self.relative_time(repo, rev)?;
        Ok(RevisionInfo {
            message,
            relative_time,
        })
    }
}

/// Builds the lookup backend selected by the configuration.
pub fn lookup_for(config: &ReflensConfig) -> Box<dyn RevisionLookup> {
    match config.backend {
        LookupBackend::Cli => Box::new(GitCli::new(config.git_timeout())),
        LookupBackend::Gix => Box::new(GixLookup),
    }
}

fn revision_error(rev: &str, message: impl Display) -> ReflensError {
    ReflensError::Revision {
        message: message.to_string(),
        rev: rev.to_string(),
    }
}

// ---------------------------------------------------------------------------
// git CLI
// ---------------------------------------------------------------------------

/// Lookup that runs the `git` binary, killing it if it outlives `timeout`.
///
/// Each call drives the child on its own short-lived tokio runtime and blocks
/// the calling thread until it finishes. Async callers go through
/// `tokio::task::spawn_blocking`.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    timeout: Duration,
}

impl GitCli {
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "git".to_string(),
            timeout,
        }
    }

    /// Uses a different executable in place of `git`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn show(&self, repo: &Path, rev: &str, format: &str) -> Result<String> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| revision_error(rev, format!("failed to start runtime: {}", e)))?;
        runtime.block_on(self.show_async(repo, rev, format))
    }

    async fn show_async(&self, repo: &Path, rev: &str, format: &str) -> Result<String> {
        // `^{commit}` makes git reject blobs and trees instead of printing them.
        let mut child = Command::new(&self.program)
            .arg("-C")
            .arg(repo)
            .args(["--no-pager", "show", "--no-patch", "--no-color"])
            .arg(format!("--format={}", format))
            .arg(format!("{}^{{commit}}", rev))
            .arg("--")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| revision_error(rev, format!("failed to spawn {}: {}", self.program, e)))?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| revision_error(rev, "git stdout unavailable"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| revision_error(rev, "git stderr unavailable"))?;

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf).await;
            buf
        });
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                stdout_task.abort();
                stderr_task.abort();
                return Err(revision_error(rev, format!("{} show: {}", self.program, e)));
            }
            Err(_elapsed) => {
                let _ = child.start_kill();
                let _ = tokio::time::timeout(REAP_TIMEOUT, child.wait()).await;
                stdout_task.abort();
                stderr_task.abort();
                return Err(revision_error(
                    rev,
                    format!(
                        "{} show timed out after {}ms",
                        self.program,
                        self.timeout.as_millis()
                    ),
                ));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(revision_error(
                rev,
                format!(
                    "{} show failed: {}",
                    self.program,
                    String::from_utf8_lossy(&stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8(stdout)
            .map_err(|_| revision_error(rev, "git output is not valid UTF-8"))?;
        Ok(stdout.trim().to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new(ReflensConfig::default().git_timeout())
    }
}

impl RevisionLookup for GitCli {
    fn message(&self, repo: &Path, rev: &str) -> Result<String> {
        self.show(repo, rev, "%s%n%n%b")
    }

    fn relative_time(&self, repo: &Path, rev: &str) -> Result<String> {
        self.show(repo, rev, "%ar")
    }
}

// ---------------------------------------------------------------------------
// gix
// ---------------------------------------------------------------------------

/// In-process lookup using gix. Never spawns a subprocess.
#[derive(Debug, Clone, Copy, Default)]
pub struct GixLookup;

impl GixLookup {
    fn with_commit<T>(
        &self,
        repo: &Path,
        rev: &str,
        f: impl FnOnce(&gix::Commit<'_>) -> Result<T>,
    ) -> Result<T> {
        let repository = gix::discover(repo).map_err(|e| revision_error(rev, e))?;
        let id = repository
            .rev_parse_single(rev)
            .map_err(|e| revision_error(rev, e))?;
        let commit = id
            .object()
            .map_err(|e| revision_error(rev, e))?
            .try_into_commit()
            .map_err(|e| revision_error(rev, e))?;
        f(&commit)
    }
}

impl RevisionLookup for GixLookup {
    fn message(&self, repo: &Path, rev: &str) -> Result<String> {
        self.with_commit(repo, rev, |commit| {
            let raw = commit.message_raw().map_err(|e| revision_error(rev, e))?;
            Ok(String::from_utf8_lossy(raw).trim().to_string())
        })
    }

    fn relative_time(&self, repo: &Path, rev: &str) -> Result<String> {
        self.with_commit(repo, rev, |commit| {
            let time = commit.time().map_err(|e| revision_error(rev, e))?;
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_secs() as i64;
            Ok(format_relative_time(now - time.seconds))
        })
    }
}

// ---------------------------------------------------------------------------
// Relative dates
// ---------------------------------------------------------------------------

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{} {}", n, unit)
    } else {
        format!("{} {}s", n, unit)
    }
}

/// Formats an age in seconds the way `git log --format=%ar` does.
pub fn format_relative_time(seconds_ago: i64) -> String {
    if seconds_ago < 0 {
        return "in the future".to_string();
    }
    let mut diff = seconds_ago;
    if diff < 90 {
        return format!("{} ago", plural(diff, "second"));
    }
    diff = (diff + 30) / 60;
    if diff < 90 {
        return format!("{} ago", plural(diff, "minute"));
    }
    diff = (diff + 30) / 60;
    if diff < 36 {
        return format!("{} ago", plural(diff, "hour"));
    }
    // From here on `diff` counts days.
    diff = (diff + 12) / 24;
    if diff < 14 {
        return format!("{} ago", plural(diff, "day"));
    }
    if diff < 70 {
        return format!("{} ago", plural((diff + 3) / 7, "week"));
    }
    if diff < 365 {
        return format!("{} ago", plural((diff + 15) / 30, "month"));
    }
    if diff < 1825 {
        let total_months = (diff * 12 * 2 + 365) / (365 * 2);
        let years = total_months / 12;
        let months = total_months % 12;
        if months > 0 {
            return format!(
                "{}, {} ago",
                plural(years, "year"),
                plural(months, "month")
            );
        }
        return format!("{} ago", plural(years, "year"));
    }
    format!("{} ago", plural((diff + 183) / 365, "year"))
}
