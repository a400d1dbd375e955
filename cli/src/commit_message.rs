//! Commit message construction.

use std::path::{Component, Path, PathBuf};

use catalog_snapshot_store::{AuditExportReport, DEFAULT_COMMIT_TEMPLATE, WriteReport};
use chrono::{Local, SecondsFormat};

/// Changed files listed in the message body before collapsing into a count.
pub const MAX_COMMIT_MESSAGE_FILES: usize = 30;

/// Files a run added, modified, or deleted, across snapshot and audit trees.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl ChangeSet {
    pub fn record_snapshot(&mut self, report: &WriteReport) {
        self.added.extend(report.added.iter().cloned());
        self.modified.extend(report.modified.iter().cloned());
        self.deleted.extend(report.deleted.iter().cloned());
    }

    pub fn record_audit(&mut self, report: &AuditExportReport) {
        self.added.extend(report.added.iter().cloned());
        self.modified.extend(report.modified.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.added.len() + self.modified.len() + self.deleted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every changed path, in A, M, D order.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.deleted)
            .cloned()
            .collect()
    }
}

/// Local time as ISO-8601 to the second with UTC offset.
pub fn local_timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// `path` relative to `repo`, with `/` separators; absolute if outside it.
pub fn repo_relative(path: &Path, repo: &Path) -> String {
    let relative = path.strip_prefix(repo).unwrap_or(path);
    let mut out = String::new();
    for component in relative.components() {
        if component == Component::RootDir {
            out.push('/');
            continue;
        }
        if !out.is_empty() && !out.ends_with('/') {
            out.push('/');
        }
        out.push_str(&component.as_os_str().to_string_lossy());
    }
    out
}

/// Builds the commit message for `changes`.
///
/// The subject is the rendered template, suffixed with the file count when
/// anything changed. The body lists up to [`MAX_COMMIT_MESSAGE_FILES`]
/// paths as `- A|M|D <path>`.
pub fn build_commit_message(
    template: &str,
    timestamp: &str,
    repo: &Path,
    changes: &ChangeSet,
) -> String {
    let base = render_template(template, timestamp)
        .or_else(|| render_template(DEFAULT_COMMIT_TEMPLATE, timestamp))
        .unwrap_or_else(|| format!("snapshot: {timestamp}"));

    let lines: Vec<String> = [
        ('A', &changes.added),
        ('M', &changes.modified),
        ('D', &changes.deleted),
    ]
    .into_iter()
    .flat_map(|(flag, paths)| {
        paths
            .iter()
            .map(move |path| format!("{flag} {}", repo_relative(path, repo)))
    })
    .collect();

    if lines.is_empty() {
        return base;
    }

    let mut message = format!("{base} ({} files)\n\nChanged files:", lines.len());
    for line in lines.iter().take(MAX_COMMIT_MESSAGE_FILES) {
        message.push_str("\n- ");
        message.push_str(line);
    }
    if lines.len() > MAX_COMMIT_MESSAGE_FILES {
        message.push_str(&format!(
            "\n- ... (+{} more)",
            lines.len() - MAX_COMMIT_MESSAGE_FILES
        ));
    }
    message
}

/// Substitutes `{timestamp}` and unescapes `{{`/`}}`. Any other
/// placeholder or an unbalanced brace yields `None`.
fn render_template(template: &str, timestamp: &str) -> Option<String> {
    let mut out = String::with_capacity(template.len() + timestamp.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return None,
                    }
                }
                if name != "timestamp" {
                    return None;
                }
                out.push_str(timestamp);
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2024-05-01T12:00:00+02:00";

    fn repo() -> PathBuf {
        PathBuf::from("/work/repo")
    }

    #[test]
    fn test_no_changes_is_bare_subject() {
        let message = build_commit_message("snapshot: {timestamp}", TS, &repo(), &ChangeSet::default());
        assert_eq!(message, "snapshot: 2024-05-01T12:00:00+02:00");
    }

    #[test]
    fn test_lists_changes_in_order() {
        let changes = ChangeSet {
            added: vec![repo().join("snapshots/HR/TABLE/T2.sql")],
            modified: vec![repo().join("snapshots/HR/TABLE/T1.sql")],
            deleted: vec![repo().join("snapshots/HR/VIEW/V1.sql")],
        };
        let message = build_commit_message("snap {timestamp}", TS, &repo(), &changes);
        assert_eq!(
            message,
            "snap 2024-05-01T12:00:00+02:00 (3 files)\n\nChanged files:\n\
             - A snapshots/HR/TABLE/T2.sql\n\
             - M snapshots/HR/TABLE/T1.sql\n\
             - D snapshots/HR/VIEW/V1.sql"
        );
    }

    #[test]
    fn test_overflow_collapses() {
        let changes = ChangeSet {
            added: (0..35)
                .map(|i| repo().join(format!("snapshots/HR/VIEW/V{i}.sql")))
                .collect(),
            ..ChangeSet::default()
        };
        let message = build_commit_message("s", TS, &repo(), &changes);
        assert!(message.starts_with("s (35 files)\n"));
        assert_eq!(message.lines().filter(|l| l.starts_with("- A ")).count(), 30);
        assert!(message.ends_with("\n- ... (+5 more)"));
    }

    #[test]
    fn test_unknown_placeholder_falls_back() {
        let message = build_commit_message("run {branch} at {timestamp}", TS, &repo(), &ChangeSet::default());
        assert_eq!(message, format!("snapshot: {TS}"));
        let message = build_commit_message("broken {timestamp", TS, &repo(), &ChangeSet::default());
        assert_eq!(message, format!("snapshot: {TS}"));
    }

    #[test]
    fn test_escaped_braces() {
        let message = build_commit_message("{{ddl}} {timestamp}", TS, &repo(), &ChangeSet::default());
        assert_eq!(message, format!("{{ddl}} {TS}"));
    }

    #[test]
    fn test_path_outside_repo_stays_absolute() {
        assert_eq!(repo_relative(Path::new("/elsewhere/a.sql"), &repo()), "/elsewhere/a.sql");
        assert_eq!(repo_relative(&repo().join("a/b.sql"), &repo()), "a/b.sql");
    }

    #[test]
    fn test_timestamp_has_offset() {
        let ts = local_timestamp();
        assert_eq!(ts.len(), 25);
        assert_eq!(&ts[10..11], "T");
    }
}
