//! Snapshot tree writer.
//!
//! Diffs the desired entry set against the files under the snapshot root,
//! writes added and modified files atomically, and deletes every `.sql` file
//! that no longer corresponds to a desired entry. In dry-run mode the same
//! classification is reported without touching the filesystem.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use catalog_snapshot_core::{NormalizedEntry, SNAPSHOT_EXTENSION, snapshot_relative_path};
use serde::Serialize;
use tracing::{Span, debug, info, warn};

use crate::atomic::write_atomic;
use crate::error::Result;

/// Classification of one snapshot path for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Added,
    Modified,
    Unchanged,
    Deleted,
}

/// Paths touched (or that would be touched) by one write.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct WriteReport {
    pub added: Vec<PathBuf>,
    pub modified: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub deleted: Vec<PathBuf>,
}

impl WriteReport {
    /// Number of files written (added plus modified).
    pub fn written_count(&self) -> usize {
        self.added.len() + self.modified.len()
    }

    /// Returns `true` if the run changed any file.
    pub fn has_changes(&self) -> bool {
        self.written_count() + self.deleted.len() > 0
    }

    /// Looks up the classification of `path`.
    pub fn state_of(&self, path: &Path) -> Option<FileState> {
        [
            (&self.added, FileState::Added),
            (&self.modified, FileState::Modified),
            (&self.unchanged, FileState::Unchanged),
            (&self.deleted, FileState::Deleted),
        ]
        .into_iter()
        .find(|(paths, _)| paths.iter().any(|p| p == path))
        .map(|(_, state)| state)
    }
}

/// Writes normalized entries into `<root>/<owner>/<type>/<name>.sql`.
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    root: PathBuf,
    dry_run: bool,
    span: Span,
}

impl SnapshotWriter {
    pub fn new(root: impl Into<PathBuf>, dry_run: bool, span: Span) -> Self {
        Self {
            root: root.into(),
            dry_run,
            span,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute target path for an entry.
    pub fn path_for(&self, entry: &NormalizedEntry) -> PathBuf {
        self.root.join(snapshot_relative_path(&entry.object))
    }

    /// Makes the snapshot tree mirror `entries`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::StoreError::IoError) if a file cannot be
    /// read, written, or deleted. Files already processed stay written.
    pub fn write(&self, entries: &[NormalizedEntry]) -> Result<WriteReport> {
        let _guard = self.span.enter();
        let mut desired: BTreeMap<PathBuf, String> = BTreeMap::new();
        for entry in entries {
            let path = self.path_for(entry);
            if desired.contains_key(&path) {
                warn!(object = %entry.object, path = %path.display(), "Snapshot path collision; later object wins");
            }
            desired.insert(path, with_trailing_newline(&entry.text));
        }

        let mut report = WriteReport::default();
        for (path, content) in &desired {
            match fs::read(path) {
                Ok(existing) => {
                    if with_trailing_newline_bytes(existing) == content.as_bytes() {
                        report.unchanged.push(path.clone());
                        continue;
                    }
                    debug!(path = %path.display(), "Snapshot modified");
                    report.modified.push(path.clone());
                }
                Err(err) if err.kind() == ErrorKind::NotFound => {
                    debug!(path = %path.display(), "Snapshot added");
                    report.added.push(path.clone());
                }
                Err(err) => return Err(err.into()),
            }
            if !self.dry_run {
                write_atomic(path, content.as_bytes())?;
            }
        }

        let keep: BTreeSet<&PathBuf> = desired.keys().collect();
        for path in existing_snapshot_files(&self.root)? {
            if keep.contains(&path) {
                continue;
            }
            if !self.dry_run {
                fs::remove_file(&path)?;
            }
            debug!(path = %path.display(), "Snapshot deleted");
            report.deleted.push(path);
        }

        info!(
            dry_run = self.dry_run,
            added = report.added.len(),
            modified = report.modified.len(),
            unchanged = report.unchanged.len(),
            deleted = report.deleted.len(),
            "Snapshot tree written"
        );
        Ok(report)
    }
}

fn with_trailing_newline(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{text}\n")
    }
}

fn with_trailing_newline_bytes(mut bytes: Vec<u8>) -> Vec<u8> {
    if bytes.last() != Some(&b'\n') {
        bytes.push(b'\n');
    }
    bytes
}

/// Every `.sql` file under `root`, recursively, sorted. A missing root has
/// none.
fn existing_snapshot_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => return Err(err.into()),
        };
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                if entry.file_name() != ".git" {
                    pending.push(path);
                }
            } else if file_type.is_file()
                && path.extension().is_some_and(|ext| ext == SNAPSHOT_EXTENSION)
            {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}
