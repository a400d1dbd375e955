//! Run summary printed at the end of every completed run.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

/// Counts and outcomes for one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub extracted: usize,
    /// Objects that could not be extracted.
    pub failed: usize,
    pub written: usize,
    pub deleted: usize,
    pub unchanged: usize,
    pub audit_exported: usize,
    pub committed: bool,
    pub commit_sha: Option<String>,
    pub pushed: bool,
    /// Object failures, then `audit:` and `vcs:` phase failures.
    pub failures: Vec<String>,
    pub log_file: Option<PathBuf>,
    /// Set when the version-control phase failed; drives the exit status.
    #[serde(skip)]
    pub vcs_failed: bool,
}

impl RunSummary {
    /// `key=value` lines followed by an optional failure list.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "extracted={}", self.extracted);
        let _ = writeln!(out, "failed={}", self.failed);
        let _ = writeln!(out, "written={}", self.written);
        let _ = writeln!(out, "deleted={}", self.deleted);
        let _ = writeln!(out, "unchanged={}", self.unchanged);
        let _ = writeln!(out, "audit_exported={}", self.audit_exported);
        let _ = writeln!(out, "committed={}", self.committed);
        let _ = writeln!(out, "pushed={}", self.pushed);
        if let Some(log_file) = &self.log_file {
            let _ = writeln!(out, "log_file={}", log_file.display());
        }
        if let Some(sha) = &self.commit_sha {
            let _ = writeln!(out, "commit_sha={sha}");
        }
        if !self.failures.is_empty() {
            out.push_str("failures:\n");
            for failure in &self.failures {
                let _ = writeln!(out, "  - {failure}");
            }
        }
        out
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
