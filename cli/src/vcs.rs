//! Version-control capability and its Git adapter.
//!
//! [`publish`] drives the commit phase in a fixed order: verify the
//! repository, verify the branch, stage, commit if dirty, push.

use std::path::{Path, PathBuf};
use std::process::{Command as ProcessCommand, Output};

use thiserror::Error;
use tracing::{Span, debug, info};

use crate::commit_message::repo_relative;

/// Failure of a version-control step.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VcsError {
    #[error("not a git repository: {0}")]
    NotARepository(String),

    #[error("current branch is '{current}', expected '{expected}'")]
    WrongBranch { current: String, expected: String },

    #[error("git {command} failed: {message}")]
    CommandFailed { command: String, message: String },
}

/// Result of a commit attempt.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CommitOutcome {
    pub committed: bool,
    pub commit_sha: Option<String>,
}

/// Result of the whole version-control phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    pub committed: bool,
    pub commit_sha: Option<String>,
    pub pushed: bool,
}

/// Capability the pipeline commits through.
pub trait VersionControl {
    /// Fails unless the working directory is inside a repository.
    fn ensure_repo(&mut self) -> Result<(), VcsError>;

    fn current_branch(&mut self) -> Result<String, VcsError>;

    /// Stages additions, modifications, and removals of `paths`.
    fn stage(&mut self, paths: &[PathBuf]) -> Result<(), VcsError>;

    /// Commits the index if it differs from HEAD.
    fn commit_if_dirty(&mut self, message: &str) -> Result<CommitOutcome, VcsError>;

    fn push(&mut self, remote: &str, branch: &str) -> Result<bool, VcsError>;
}

/// Where and how to publish a run's changes.
#[derive(Debug, Clone)]
pub struct PublishRequest<'a> {
    pub paths: &'a [PathBuf],
    pub message: &'a str,
    pub expected_branch: Option<&'a str>,
    pub remote: &'a str,
    pub auto_push: bool,
}

/// Stages, commits, and optionally pushes.
///
/// # Errors
///
/// Returns the first failing step's [`VcsError`]; later steps are skipped.
pub fn publish<V: VersionControl>(
    vcs: &mut V,
    request: &PublishRequest<'_>,
) -> Result<PublishOutcome, VcsError> {
    vcs.ensure_repo()?;
    let current = vcs.current_branch()?;
    if let Some(expected) = request.expected_branch {
        if current != expected {
            return Err(VcsError::WrongBranch {
                current,
                expected: expected.to_string(),
            });
        }
    }

    vcs.stage(request.paths)?;
    let commit = vcs.commit_if_dirty(request.message)?;
    let pushed = if commit.committed && request.auto_push {
        vcs.push(request.remote, &current)?
    } else {
        false
    };

    Ok(PublishOutcome {
        committed: commit.committed,
        commit_sha: commit.commit_sha,
        pushed,
    })
}

// ---------------------------------------------------------------------------
// Git adapter
// ---------------------------------------------------------------------------

/// Shells out to `git -C <repo>`.
#[derive(Debug, Clone)]
pub struct GitRepository {
    repo: PathBuf,
    span: Span,
}

impl GitRepository {
    pub fn new(repo: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            repo: repo.into(),
            span,
        }
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    fn run(&self, args: &[&str]) -> Result<Output, VcsError> {
        debug!(args = ?args, "Running git");
        ProcessCommand::new("git")
            .arg("-C")
            .arg(&self.repo)
            .args(args)
            .output()
            .map_err(|err| VcsError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: err.to_string(),
            })
    }

    fn run_checked(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.run(args)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(VcsError::CommandFailed {
                command: args.first().copied().unwrap_or_default().to_string(),
                message: failure_text(&output),
            })
        }
    }
}

fn failure_text(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if stderr.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        stderr
    }
}

impl VersionControl for GitRepository {
    fn ensure_repo(&mut self) -> Result<(), VcsError> {
        let _guard = self.span.enter();
        let output = self.run(&["rev-parse", "--is-inside-work-tree"])?;
        let inside = output.status.success()
            && String::from_utf8_lossy(&output.stdout)
                .trim()
                .eq_ignore_ascii_case("true");
        if inside {
            Ok(())
        } else {
            Err(VcsError::NotARepository(self.repo.display().to_string()))
        }
    }

    fn current_branch(&mut self) -> Result<String, VcsError> {
        let _guard = self.span.enter();
        let primary = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        let branch = String::from_utf8_lossy(&primary.stdout).trim().to_string();
        if primary.status.success() && !branch.is_empty() {
            return Ok(branch);
        }

        // Unborn HEAD: rev-parse fails before the first commit.
        let fallback = self.run(&["symbolic-ref", "--short", "HEAD"])?;
        let branch = String::from_utf8_lossy(&fallback.stdout).trim().to_string();
        if fallback.status.success() && !branch.is_empty() {
            return Ok(branch);
        }

        let message = [failure_text(&primary), failure_text(&fallback)]
            .into_iter()
            .find(|m| !m.is_empty())
            .unwrap_or_else(|| "unable to detect current branch".to_string());
        Err(VcsError::CommandFailed {
            command: "rev-parse".to_string(),
            message,
        })
    }

    fn stage(&mut self, paths: &[PathBuf]) -> Result<(), VcsError> {
        let _guard = self.span.enter();
        let (present, vanished): (Vec<&PathBuf>, Vec<&PathBuf>) =
            paths.iter().partition(|path| path.exists());

        let present: Vec<String> = present.iter().map(|p| repo_relative(p, &self.repo)).collect();
        if !present.is_empty() {
            let mut args = vec!["add", "--"];
            args.extend(present.iter().map(String::as_str));
            self.run_checked(&args)?;
        }

        let vanished: Vec<String> = vanished.iter().map(|p| repo_relative(p, &self.repo)).collect();
        if !vanished.is_empty() {
            let mut args = vec!["rm", "--cached", "--ignore-unmatch", "-q", "--"];
            args.extend(vanished.iter().map(String::as_str));
            self.run_checked(&args)?;
        }
        debug!(added = present.len(), removed = vanished.len(), "Staged paths");
        Ok(())
    }

    fn commit_if_dirty(&mut self, message: &str) -> Result<CommitOutcome, VcsError> {
        let _guard = self.span.enter();
        let diff = self.run(&["diff", "--cached", "--quiet"])?;
        match diff.status.code() {
            Some(0) => {
                info!("No staged changes; skipping commit");
                return Ok(CommitOutcome::default());
            }
            Some(1) => {}
            _ => {
                return Err(VcsError::CommandFailed {
                    command: "diff".to_string(),
                    message: failure_text(&diff),
                });
            }
        }

        self.run_checked(&["commit", "-m", message])?;
        let sha = self.run_checked(&["rev-parse", "HEAD"])?;
        info!(sha = %sha, "Committed snapshot changes");
        Ok(CommitOutcome {
            committed: true,
            commit_sha: Some(sha),
        })
    }

    fn push(&mut self, remote: &str, branch: &str) -> Result<bool, VcsError> {
        let _guard = self.span.enter();
        self.run_checked(&["push", remote, branch])?;
        info!(remote = %remote, branch = %branch, "Pushed snapshot commit");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// In-memory adapter
// ---------------------------------------------------------------------------

/// Records every call instead of touching a repository.
#[cfg(test)]
#[derive(Debug, Clone, Default)]
pub struct RecordingVcs {
    pub branch: String,
    pub not_a_repo: bool,
    pub fail_push: bool,
    /// Pretend the index is clean even after staging.
    pub clean: bool,
    pub staged: Vec<PathBuf>,
    pub commits: Vec<String>,
    pub pushes: Vec<(String, String)>,
}

#[cfg(test)]
impl RecordingVcs {
    pub fn on_branch(branch: &str) -> Self {
        Self {
            branch: branch.to_string(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
impl VersionControl for RecordingVcs {
    fn ensure_repo(&mut self) -> Result<(), VcsError> {
        if self.not_a_repo {
            Err(VcsError::NotARepository("/fake".to_string()))
        } else {
            Ok(())
        }
    }

    fn current_branch(&mut self) -> Result<String, VcsError> {
        Ok(self.branch.clone())
    }

    fn stage(&mut self, paths: &[PathBuf]) -> Result<(), VcsError> {
        self.staged.extend(paths.iter().cloned());
        Ok(())
    }

    fn commit_if_dirty(&mut self, message: &str) -> Result<CommitOutcome, VcsError> {
        if self.clean || self.staged.is_empty() {
            return Ok(CommitOutcome::default());
        }
        self.commits.push(message.to_string());
        Ok(CommitOutcome {
            committed: true,
            commit_sha: Some(format!("{:040x}", self.commits.len())),
        })
    }

    fn push(&mut self, remote: &str, branch: &str) -> Result<bool, VcsError> {
        if self.fail_push {
            return Err(VcsError::CommandFailed {
                command: "push".to_string(),
                message: "remote rejected".to_string(),
            });
        }
        self.pushes.push((remote.to_string(), branch.to_string()));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request<'a>(paths: &'a [PathBuf], branch: Option<&'a str>, auto_push: bool) -> PublishRequest<'a> {
        PublishRequest {
            paths,
            message: "snapshot: now",
            expected_branch: branch,
            remote: "origin",
            auto_push,
        }
    }

    #[test]
    fn test_publish_commits_and_pushes() {
        let mut vcs = RecordingVcs::on_branch("main");
        let paths = vec![PathBuf::from("/repo/snapshots/HR/VIEW/V1.sql")];
        let outcome = publish(&mut vcs, &request(&paths, Some("main"), true)).unwrap();
        assert!(outcome.committed && outcome.pushed);
        assert!(outcome.commit_sha.is_some());
        assert_eq!(vcs.pushes, vec![("origin".to_string(), "main".to_string())]);
    }

    #[test]
    fn test_publish_rejects_wrong_branch_before_staging() {
        let mut vcs = RecordingVcs::on_branch("feature");
        let paths = vec![PathBuf::from("/repo/a.sql")];
        let err = publish(&mut vcs, &request(&paths, Some("main"), true)).unwrap_err();
        assert_eq!(err.to_string(), "current branch is 'feature', expected 'main'");
        assert!(vcs.staged.is_empty());
    }

    #[test]
    fn test_publish_clean_index_does_not_push() {
        let mut vcs = RecordingVcs::on_branch("main");
        vcs.clean = true;
        let outcome = publish(&mut vcs, &request(&[], None, true)).unwrap();
        assert_eq!(outcome, PublishOutcome::default());
        assert!(vcs.pushes.is_empty());
    }

    #[test]
    fn test_publish_without_auto_push() {
        let mut vcs = RecordingVcs::on_branch("main");
        let paths = vec![PathBuf::from("/repo/a.sql")];
        let outcome = publish(&mut vcs, &request(&paths, None, false)).unwrap();
        assert!(outcome.committed);
        assert!(!outcome.pushed);
    }

    #[test]
    fn test_publish_not_a_repository() {
        let mut vcs = RecordingVcs::on_branch("main");
        vcs.not_a_repo = true;
        let err = publish(&mut vcs, &request(&[], None, true)).unwrap_err();
        assert!(matches!(err, VcsError::NotARepository(_)));
    }

    #[test]
    fn test_git_repository_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        let mut git = GitRepository::new(dir.path(), Span::none());
        // Fails whether git is missing or the directory is not a work tree.
        assert!(git.ensure_repo().is_err());
    }
}
