//! Configuration, snapshot tree writing, and incremental audit export.
//!
//! This crate owns everything that touches the local filesystem: loading the
//! YAML run configuration, mirroring normalized DDL into a snapshot tree, and
//! appending audit rows to per-object JSON-Lines files behind a persisted
//! watermark.
//!
//! # Quick start
//!
//! ```no_run
//! use catalog_snapshot_core::{DbObjectRef, NormalizedEntry};
//! use catalog_snapshot_store::{AppConfig, SnapshotWriter};
//! use tracing::Span;
//!
//! let config = AppConfig::load("config/snapshot.yml").unwrap();
//! let writer = SnapshotWriter::new(&config.output.snapshot_root, false, Span::none());
//! let report = writer
//!     .write(&[NormalizedEntry {
//!         object: DbObjectRef::new("HR", "VIEW", "EMP_V"),
//!         text: "CREATE VIEW EMP_V AS SELECT 1 FROM DUAL;\n".into(),
//!     }])
//!     .unwrap();
//! println!("{} written, {} deleted", report.written_count(), report.deleted.len());
//! ```

mod atomic;
mod audit;
mod config;
mod error;
mod watermark;
mod writer;

pub use atomic::write_atomic;
pub use audit::{AuditExportReport, AuditExporter, AuditTarget};
pub use config::{
    AppConfig, AuditConfig, DEFAULT_AUDIT_TABLE, DEFAULT_COMMIT_TEMPLATE, GitConfig, LogsConfig,
    OracleConfig, OutputConfig, ScopeConfig, project_root,
};
pub use error::{Result, StoreError};
pub use watermark::{WatermarkMap, WatermarkStore, watermark_key};
pub use writer::{FileState, SnapshotWriter, WriteReport};
