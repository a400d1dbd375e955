//! Incremental audit export into per-object JSON-Lines files.
//!
//! Each run fetches audit rows above the stored watermark for its
//! `(service, principal)` key, appends them to
//! `<root>/<service>/<owner>/<type>/<name>.jsonl`, and only then advances the
//! watermark. A file counts as added if it did not exist before this run,
//! even when several rows land in it.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

use catalog_snapshot_core::{AuditLog, AuditRecord, CatalogError, audit_relative_path};
use serde::Serialize;
use tracing::{Span, debug, info, warn};

use crate::error::Result;
use crate::watermark::{WatermarkStore, watermark_key};

/// Where and for whom audit rows are exported.
#[derive(Debug, Clone)]
pub struct AuditTarget {
    /// Audit tree root.
    pub root: PathBuf,
    /// Database service name; first path segment and half of the state key.
    pub service: String,
    /// Connecting principal; the other half of the state key.
    pub principal: String,
    /// Audit source table.
    pub table: String,
}

/// Outcome of one export.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct AuditExportReport {
    /// Rows fetched above the previous watermark.
    pub exported_count: usize,
    /// Files created by this run.
    pub added: Vec<PathBuf>,
    /// Pre-existing files appended to by this run.
    pub modified: Vec<PathBuf>,
    pub previous_watermark: i64,
    /// Watermark after the run (unchanged on dry-run or no rows).
    pub watermark: i64,
}

/// Exports audit rows since the last watermark.
#[derive(Debug, Clone)]
pub struct AuditExporter {
    target: AuditTarget,
    state: WatermarkStore,
    dry_run: bool,
    span: Span,
}

impl AuditExporter {
    pub fn new(target: AuditTarget, state: WatermarkStore, dry_run: bool, span: Span) -> Self {
        Self {
            target,
            state,
            dry_run,
            span,
        }
    }

    /// State key for this exporter's service and principal.
    pub fn key(&self) -> String {
        watermark_key(&self.target.service, &self.target.principal)
    }

    /// Runs one incremental export against `log`.
    ///
    /// A missing audit source, or any other non-connection query failure, is
    /// logged and yields an empty report.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`](crate::StoreError::CatalogError) for a
    /// connection failure and [`IoError`](crate::StoreError::IoError) if an
    /// append or the state save fails. The watermark is not advanced in
    /// either case.
    pub fn export<A: AuditLog>(&self, log: &mut A) -> Result<AuditExportReport> {
        let _guard = self.span.enter();
        let mut state = self.state.load();
        let key = self.key();
        let last = state.get(&key).copied().unwrap_or(0);
        let mut report = AuditExportReport {
            previous_watermark: last,
            watermark: last,
            ..AuditExportReport::default()
        };

        let mut rows = match log.fetch_audit_after(&self.target.table, last) {
            Ok(rows) => rows,
            Err(CatalogError::MissingSource(reason)) => {
                warn!(table = %self.target.table, reason = %reason, "Audit source not found; nothing to export");
                return Ok(report);
            }
            Err(err) if err.is_connection() => return Err(err.into()),
            Err(err) => {
                warn!(table = %self.target.table, error = %err, "Audit fetch failed; nothing exported");
                return Ok(report);
            }
        };
        rows.retain(|row| row.audit_id > last);
        rows.sort_by_key(|row| row.audit_id);
        report.exported_count = rows.len();

        let mut files: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
        for row in &rows {
            let path = self
                .target
                .root
                .join(audit_relative_path(&self.target.service, row));
            files.entry(path).or_default().push(serialize_row(row)?);
        }

        for (path, lines) in &files {
            if path.exists() {
                report.modified.push(path.clone());
            } else {
                report.added.push(path.clone());
            }
            if self.dry_run {
                continue;
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut buf = lines.join("\n");
            buf.push('\n');
            file.write_all(buf.as_bytes())?;
            file.sync_all()?;
            debug!(path = %path.display(), rows = lines.len(), "Appended audit rows");
        }

        if let Some(max_id) = rows.iter().map(|row| row.audit_id).max() {
            if !self.dry_run {
                let next = max_id.max(last);
                state.insert(key, next);
                self.state.save(&state)?;
                report.watermark = next;
            }
        }

        info!(
            dry_run = self.dry_run,
            exported = report.exported_count,
            added = report.added.len(),
            modified = report.modified.len(),
            watermark = report.watermark,
            "Audit export finished"
        );
        Ok(report)
    }
}

fn serialize_row(row: &AuditRecord) -> Result<String> {
    Ok(serde_json::to_string(row)?)
}
