//! End-to-end snapshot run.
//!
//! Phases run strictly in sequence: extract (one connection), normalize,
//! write the snapshot tree, export audit rows (a second connection), then
//! publish through version control. Only an extraction connection failure
//! or a snapshot write failure aborts the run; audit and VCS problems are
//! recorded in the summary.

use catalog_snapshot_core::{CatalogConnector, CatalogError, NormalizedEntry};
use catalog_snapshot_discovery::extract::{ExtractionOutcome, Extractor};
use catalog_snapshot_discovery::normalize::DdlNormalizer;
use catalog_snapshot_store::{
    AppConfig, AuditExportReport, AuditExporter, AuditTarget, SnapshotWriter, StoreError,
    WatermarkStore,
};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{Span, info, warn};

use crate::commit_message::{ChangeSet, build_commit_message, local_timestamp};
use crate::summary::RunSummary;
use crate::vcs::{PublishOutcome, PublishRequest, VcsError, VersionControl, publish};

/// Failure that ends a run without a summary.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(#[source] CatalogError),

    #[error("snapshot write failed: {0}")]
    Write(#[source] StoreError),
}

/// One configured snapshot run.
pub struct SnapshotPipeline<'a, C, V> {
    config: &'a AppConfig,
    connector: C,
    vcs: V,
    span: Span,
    log_file: Option<PathBuf>,
}

impl<'a, C, V> SnapshotPipeline<'a, C, V>
where
    C: CatalogConnector,
    V: VersionControl,
{
    pub fn new(config: &'a AppConfig, connector: C, vcs: V, span: Span) -> Self {
        Self {
            config,
            connector,
            vcs,
            span,
            log_file: None,
        }
    }

    /// Reports `log_file` in the summary.
    pub fn with_log_file(mut self, log_file: PathBuf) -> Self {
        self.log_file = Some(log_file);
        self
    }

    #[cfg(test)]
    pub fn vcs(&self) -> &V {
        &self.vcs
    }

    /// Runs every phase and summarizes the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Extraction`] if the catalog connection fails
    /// during extraction (nothing is written in that case) and
    /// [`PipelineError::Write`] if the snapshot tree cannot be updated.
    pub fn run(&mut self, dry_run: bool) -> Result<RunSummary, PipelineError> {
        let span = self.span.clone();
        let _guard = span.enter();
        let config = self.config;
        info!(dry_run, "Snapshot run started");

        let extraction = self.extract().map_err(PipelineError::Extraction)?;
        let normalizer = DdlNormalizer::new(config.output.line_ending);
        let entries: Vec<NormalizedEntry> = extraction
            .items
            .iter()
            .map(|item| NormalizedEntry {
                object: item.object.clone(),
                text: normalizer.normalize(&item.ddl),
            })
            .collect();

        let writer = SnapshotWriter::new(&config.output.snapshot_root, dry_run, self.span.clone());
        let written = writer.write(&entries).map_err(PipelineError::Write)?;

        let mut summary = RunSummary {
            extracted: extraction.items.len(),
            failed: extraction.failures.len(),
            written: written.written_count(),
            deleted: written.deleted.len(),
            unchanged: written.unchanged.len(),
            failures: extraction.failure_messages(),
            log_file: self.log_file.clone(),
            ..RunSummary::default()
        };
        let mut changes = ChangeSet::default();
        changes.record_snapshot(&written);

        if config.audit.enabled {
            match self.export_audit(dry_run) {
                Ok(report) => {
                    summary.audit_exported = report.exported_count;
                    changes.record_audit(&report);
                }
                Err(err) => {
                    warn!(error = %err, "Audit export failed");
                    summary.failures.push(format!("audit: {}", audit_reason(&err)));
                }
            }
        }

        if !dry_run && config.git.enabled {
            match self.publish_changes(&changes) {
                Ok(outcome) => {
                    summary.committed = outcome.committed;
                    summary.commit_sha = outcome.commit_sha;
                    summary.pushed = outcome.pushed;
                }
                Err(err) => {
                    warn!(error = %err, "Version control phase failed");
                    summary.failures.push(format!("vcs: {err}"));
                    summary.vcs_failed = true;
                }
            }
        }

        info!(
            extracted = summary.extracted,
            failed = summary.failed,
            written = summary.written,
            deleted = summary.deleted,
            unchanged = summary.unchanged,
            audit_exported = summary.audit_exported,
            committed = summary.committed,
            pushed = summary.pushed,
            "Snapshot run finished"
        );
        Ok(summary)
    }

    fn extract(&self) -> Result<ExtractionOutcome, CatalogError> {
        let scope = self.config.object_scope();
        let mut session = self.connector.connect()?;
        Extractor::new(self.span.clone()).extract(&mut session, &scope)
    }

    fn export_audit(&self, dry_run: bool) -> Result<AuditExportReport, StoreError> {
        let config = self.config;
        let mut session = self.connector.connect()?;
        let exporter = AuditExporter::new(
            AuditTarget {
                root: config.audit_root(),
                service: config.oracle.service_name.clone(),
                principal: config.oracle.username.clone(),
                table: config.audit.table.clone(),
            },
            WatermarkStore::new(&config.audit.state_file, self.span.clone()),
            dry_run,
            self.span.clone(),
        );
        exporter.export(&mut session)
    }

    fn publish_changes(&mut self, changes: &ChangeSet) -> Result<PublishOutcome, VcsError> {
        let git = &self.config.git;
        let message = build_commit_message(
            &git.commit_message_template,
            &local_timestamp(),
            &git.repo_path,
            changes,
        );
        let paths = changes.paths();
        info!(changed = changes.len(), "Publishing snapshot changes");
        publish(
            &mut self.vcs,
            &PublishRequest {
                paths: &paths,
                message: &message,
                expected_branch: git.branch.as_deref(),
                remote: &git.remote,
                auto_push: git.auto_push,
            },
        )
    }
}

/// Audit failure text without the store error's wrapper prefix.
fn audit_reason(err: &StoreError) -> String {
    match err {
        StoreError::CatalogError(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::RecordingVcs;
    use catalog_snapshot_core::{AuditRecord, DbObjectRef, MemoryCatalog, MemoryConnector};
    use std::cell::Cell;
    use std::fs;
    use std::path::Path;

    const T1_DDL: &str = "CREATE TABLE \"HR\".\"T1\" (\"ID\" NUMBER)\n  STORAGE(INITIAL 65536 NEXT 1048576 BUFFER_POOL DEFAULT)\n  TABLESPACE \"X\";";
    const T1_DDL_WIDER: &str = "CREATE TABLE \"HR\".\"T1\" (\"ID\" NUMBER, \"NAME\" VARCHAR2(30))\n  STORAGE(INITIAL 65536 NEXT 1048576 BUFFER_POOL DEFAULT)\n  TABLESPACE \"X\";";

    fn load_config(dir: &Path, extra: &str) -> AppConfig {
        let path = dir.join("snapshot.yml");
        let yaml = format!(
            "oracle: {{ host: db, service_name: ORCLPDB1, username: snap, password: pw }}\n\
             scope: {{ include_schemas: [HR], object_types: [TABLE, VIEW] }}\n\
             output: {{ snapshot_root: repo/snapshots }}\n\
             {extra}"
        );
        fs::write(&path, yaml).unwrap();
        AppConfig::load(&path).unwrap()
    }

    fn git_section(branch: &str) -> String {
        format!("git: {{ repo_path: repo, branch: {branch}, auto_push: true }}\n")
    }

    fn t1() -> DbObjectRef {
        DbObjectRef::new("HR", "TABLE", "T1")
    }

    fn run(config: &AppConfig, catalog: &MemoryCatalog, dry_run: bool) -> (RunSummary, RecordingVcs) {
        let mut pipeline = SnapshotPipeline::new(
            config,
            MemoryConnector::new(catalog.clone()),
            RecordingVcs::on_branch("main"),
            Span::none(),
        );
        let summary = pipeline.run(dry_run).unwrap();
        (summary, pipeline.vcs().clone())
    }

    /// Connector whose first `healthy` connections succeed.
    struct FlakyConnector {
        catalog: MemoryCatalog,
        healthy: Cell<usize>,
    }

    impl CatalogConnector for FlakyConnector {
        type Session = MemoryCatalog;

        fn connect(&self) -> Result<MemoryCatalog, CatalogError> {
            match self.healthy.get() {
                0 => Err(CatalogError::Connection("ORA-12541: TNS:no listener".to_string())),
                n => {
                    self.healthy.set(n - 1);
                    Ok(self.catalog.clone())
                }
            }
        }
    }

    #[test]
    fn test_add_modify_delete_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), &git_section("main"));
        let t1_path = config.output.snapshot_root.join("HR").join("TABLE").join("T1.sql");

        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);
        catalog.insert(DbObjectRef::new("HR", "VIEW", "V1"), "CREATE VIEW V1 AS SELECT 1 FROM DUAL;");

        let (first, vcs) = run(&config, &catalog, false);
        assert_eq!((first.extracted, first.written), (2, 2));
        let text = fs::read_to_string(&t1_path).unwrap();
        assert!(!text.contains("STORAGE"));
        assert!(!text.contains("TABLESPACE"));
        assert!(first.committed && first.pushed);
        assert!(vcs.commits[0].contains("- A snapshots/HR/TABLE/T1.sql"));

        let (second, _) = run(&config, &catalog, false);
        assert_eq!((second.written, second.unchanged, second.deleted), (0, 2, 0));

        catalog.insert(t1(), T1_DDL_WIDER);
        let (third, vcs) = run(&config, &catalog, false);
        assert_eq!((third.written, third.unchanged), (1, 1));
        assert!(vcs.commits[0].contains("- M snapshots/HR/TABLE/T1.sql"));

        catalog.remove(&t1());
        let (fourth, vcs) = run(&config, &catalog, false);
        assert_eq!(fourth.deleted, 1);
        assert!(!t1_path.exists());
        assert!(vcs.commits[0].contains("- D snapshots/HR/TABLE/T1.sql"));
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), "audit: { enabled: true }\n");
        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);
        catalog.push_audit(AuditRecord::new(1).with_object("HR", "TABLE", "T1"));

        let (summary, vcs) = run(&config, &catalog, true);
        assert_eq!(summary.written, 1);
        assert_eq!(summary.audit_exported, 1);
        assert!(!summary.committed);
        assert!(!config.output.snapshot_root.exists());
        assert!(!config.audit.state_file.exists());
        assert!(vcs.staged.is_empty() && vcs.commits.is_empty());
    }

    #[test]
    fn test_object_failures_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), "git: { enabled: false }\n");
        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);
        let view = DbObjectRef::new("HR", "VIEW", "BROKEN");
        catalog.insert(view.clone(), "CREATE VIEW BROKEN");
        catalog.fail_object(view, "ORA-01031: insufficient privileges");

        let (summary, vcs) = run(&config, &catalog, false);
        assert_eq!((summary.extracted, summary.failed), (1, 1));
        assert_eq!(
            summary.failures,
            vec!["HR.VIEW.BROKEN: ORA-01031: insufficient privileges".to_string()]
        );
        assert!(vcs.commits.is_empty());
    }

    #[test]
    fn test_extraction_connection_failure_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), "");
        let mut connector = MemoryConnector::default();
        connector.refuse_connections = true;

        let mut pipeline = SnapshotPipeline::new(&config, connector, RecordingVcs::on_branch("main"), Span::none());
        let err = pipeline.run(false).unwrap_err();
        assert!(matches!(err, PipelineError::Extraction(CatalogError::Connection(_))));
        assert!(!config.output.snapshot_root.exists());
        assert!(pipeline.vcs().commits.is_empty());
    }

    #[test]
    fn test_audit_files_are_committed_with_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), &format!("{}audit: {{ enabled: true }}\n", git_section("main")));
        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);
        for id in [5, 7, 9] {
            catalog.push_audit(AuditRecord::new(id).with_object("HR", "TABLE", "T1"));
        }

        let (summary, vcs) = run(&config, &catalog, false);
        assert_eq!(summary.audit_exported, 3);
        let audit_file = config.audit_root().join("ORCLPDB1").join("HR").join("TABLE").join("T1.jsonl");
        assert!(vcs.staged.contains(&audit_file));
        assert!(vcs.commits[0].contains("- A _audit/ORCLPDB1/HR/TABLE/T1.jsonl"));

        let (again, _) = run(&config, &catalog, false);
        assert_eq!(again.audit_exported, 0);
        assert_eq!(fs::read_to_string(&audit_file).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_audit_connection_failure_is_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), "git: { enabled: false }\naudit: { enabled: true }\n");
        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);
        let connector = FlakyConnector {
            catalog,
            healthy: Cell::new(1),
        };

        let mut pipeline = SnapshotPipeline::new(&config, connector, RecordingVcs::on_branch("main"), Span::none());
        let summary = pipeline.run(false).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(
            summary.failures,
            vec!["audit: connection failure: ORA-12541: TNS:no listener".to_string()]
        );
        assert!(!summary.vcs_failed);
    }

    #[test]
    fn test_wrong_branch_keeps_files_and_flags_failure() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(dir.path(), &git_section("release"));
        let mut catalog = MemoryCatalog::new();
        catalog.insert(t1(), T1_DDL);

        let (summary, vcs) = run(&config, &catalog, false);
        assert!(summary.vcs_failed);
        assert!(!summary.committed);
        assert_eq!(
            summary.failures,
            vec!["vcs: current branch is 'main', expected 'release'".to_string()]
        );
        assert!(config.output.snapshot_root.join("HR").join("TABLE").join("T1.sql").exists());
        assert!(vcs.staged.is_empty());
    }
}
