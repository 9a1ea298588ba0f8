//! Read-only access to a file's commit history through the `git` binary.

use std::path::Path;
use std::process::{Command, Output};

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::models::CommitInfo;

const FIELD_SEP: char = '\u{1f}';
const LOG_FORMAT: &str = "--format=%H%x1f%aI%x1f%an%x1f%ae";

/// Source of per-file commit history.
pub trait VersionControl {
    /// Commits touching `path`, newest first, following renames. Fails with
    /// [`Error::NotTracked`] when there are none.
    fn log(&self, path: &Path) -> Result<Vec<CommitInfo>>;

    /// Content of the file as of `commit`, read from `commit.path` when set
    /// and from `path` otherwise. `None` if it did not exist there.
    fn show(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>>;
}

impl<T: VersionControl + ?Sized> VersionControl for &T {
    fn log(&self, path: &Path) -> Result<Vec<CommitInfo>> {
        (**self).log(path)
    }

    fn show(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>> {
        (**self).show(commit, path)
    }
}

/// [`VersionControl`] backed by the `git` command line.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl Default for GitCli {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
        }
    }
}

impl GitCli {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn run(&self, path: &Path, args: &[&str]) -> std::io::Result<Output> {
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        tracing::trace!("git -C {} {}", dir.display(), args.join(" "));
        Command::new(&self.program)
            .arg("-C")
            .arg(dir)
            .args(args)
            .output()
    }
}

fn file_name(path: &Path) -> Result<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::InvalidPath(path.display().to_string()))
}

impl VersionControl for GitCli {
    fn log(&self, path: &Path) -> Result<Vec<CommitInfo>> {
        let name = file_name(path)?;
        let not_tracked = |reason: String| Error::NotTracked {
            path: path.to_path_buf(),
            reason,
        };

        let output = self
            .run(path, &["log", "--follow", "--name-only", LOG_FORMAT, "--", &name])
            .map_err(|e| not_tracked(format!("git execution failed: {}", e)))?;
        if !output.status.success() {
            return Err(not_tracked(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let commits = parse_log(&String::from_utf8_lossy(&output.stdout));
        if commits.is_empty() {
            return Err(not_tracked("no commits touch this file".to_string()));
        }
        Ok(commits)
    }

    fn show(&self, commit: &CommitInfo, path: &Path) -> Result<Option<String>> {
        // Paths from `log --name-only` are relative to the repository root.
        let spec = match &commit.path {
            Some(at_commit) => format!("{}:{}", commit.sha, at_commit),
            None => format!("{}:./{}", commit.sha, file_name(path)?),
        };
        let output = self.run(path, &["show", &spec]).map_err(|e| Error::NotTracked {
            path: path.to_path_buf(),
            reason: format!("git execution failed: {}", e),
        })?;
        if !output.status.success() {
            tracing::debug!("{} not present at {}", path.display(), commit.sha);
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

/// Parse `git log --name-only` output in [`LOG_FORMAT`].
///
/// Each commit line is followed by the path the file had in that commit.
/// Malformed commit lines are skipped along with their paths.
pub(crate) fn parse_log(stdout: &str) -> Vec<CommitInfo> {
    let mut commits = Vec::new();
    let mut accepting_path = false;
    for line in stdout.lines() {
        if line.contains(FIELD_SEP) {
            let commit = parse_commit_line(line);
            accepting_path = commit.is_some();
            commits.extend(commit);
        } else if accepting_path && !line.trim().is_empty() {
            if let Some(last) = commits.last_mut() {
                last.path = Some(line.trim().to_string());
            }
            accepting_path = false;
        }
    }
    commits
}

fn parse_commit_line(line: &str) -> Option<CommitInfo> {
    let mut parts = line.split(FIELD_SEP);
    let sha = parts.next()?.trim();
    let at = DateTime::parse_from_rfc3339(parts.next()?.trim()).ok()?;
    let author_name = parts.next()?.to_string();
    let author_email = parts.next().unwrap_or_default().to_string();
    if sha.is_empty() {
        return None;
    }
    Some(CommitInfo {
        sha: sha.to_string(),
        at: at.with_timezone(&Utc),
        author_name,
        author_email,
        path: None,
    })
}
