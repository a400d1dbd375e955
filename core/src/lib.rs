//! Core types and capability traits for catalog DDL snapshots.
//!
//! This crate defines the shared vocabulary of a snapshot run:
//!
//! - [`DbObjectRef`]: the case-normalized `(owner, type, name)` identity of
//!   one catalog object.
//! - [`ExtractedDdl`] / [`NormalizedEntry`]: DDL before and after
//!   normalization.
//! - [`AuditRecord`]: one owned row of the change-audit trail.
//! - [`ObjectScope`] / [`SchemaFilter`]: which owners and object types are
//!   snapshotted, including the include-over-exclude precedence rule.
//! - [`MetadataCatalog`], [`AuditLog`], [`CatalogConnector`]: the
//!   capabilities the pipeline consumes instead of a concrete driver.
//!
//! Path derivation ([`snapshot_relative_path`], [`audit_relative_path`])
//! lives here too, so that every crate maps an object to the same file.
//!
//! # Example
//!
//! ```
//! use catalog_snapshot_core::*;
//!
//! let mut catalog = MemoryCatalog::new();
//! catalog.insert(DbObjectRef::new("hr", "table", "EMPLOYEES"), "CREATE TABLE EMPLOYEES (ID NUMBER)");
//!
//! let scope = ObjectScope::new(&["TABLE".into()], &["HR".into()], &[]);
//! let found = catalog.discover(&scope.discovery_types(), scope.filter()).unwrap();
//! assert_eq!(found.len(), 1);
//! assert_eq!(
//!     snapshot_relative_path(&found[0]),
//!     std::path::PathBuf::from("HR").join("TABLE").join("EMPLOYEES.sql")
//! );
//! ```

mod catalog;
mod memory;
mod naming;
mod scope;
mod types;

pub use catalog::{AuditLog, CatalogConnector, CatalogError, MetadataCatalog};
pub use memory::{MemoryCatalog, MemoryConnector};
pub use naming::{
    AUDIT_EXTENSION, AUDIT_PLACEHOLDER, SNAPSHOT_EXTENSION, SNAPSHOT_PLACEHOLDER,
    audit_relative_path, is_valid_audit_table, safe_segment, snapshot_relative_path,
    type_segment,
};
pub use scope::{DEFAULT_OBJECT_TYPES, ObjectScope, SchemaFilter};
pub use types::*;
