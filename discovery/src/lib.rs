//! Catalog discovery and DDL extraction.
//!
//! This crate turns an [`ObjectScope`] into normalized-ready DDL text:
//!
//! - [`discover::Discoverer`] lists in-scope objects in a stable order.
//! - [`fetch::BulkFetcher`] fetches DDL in chunks per `(owner, type)`;
//!   [`fetch::FallbackFetcher`] picks up whatever the bulk path missed.
//! - [`bundle::TableBundler`] folds comments and owned indexes into each
//!   table's artifact.
//! - [`extract::Extractor`] drives the three above against one session.
//! - [`normalize::DdlNormalizer`] strips environment-specific clauses and
//!   canonicalizes whitespace.
//!
//! Everything is written against the [`MetadataCatalog`] capability, so the
//! whole pipeline runs unchanged over [`MemoryCatalog`] in tests.
//!
//! # Example
//!
//! ```
//! use catalog_snapshot_core::{DbObjectRef, LineEnding, MemoryCatalog, ObjectScope};
//! use catalog_snapshot_discovery::{extract::Extractor, normalize::DdlNormalizer};
//!
//! let mut catalog = MemoryCatalog::new();
//! catalog.insert(
//!     DbObjectRef::new("HR", "TABLE", "T1"),
//!     "CREATE TABLE T1 (ID NUMBER) TABLESPACE USERS;",
//! );
//!
//! let scope = ObjectScope::new(&["TABLE".into()], &[], &[]);
//! let outcome = Extractor::new(tracing::Span::none())
//!     .extract(&mut catalog, &scope)
//!     .unwrap();
//! let text = DdlNormalizer::new(LineEnding::Lf).normalize(&outcome.items[0].ddl);
//! assert_eq!(text, "CREATE TABLE T1 (ID NUMBER);\n");
//! ```
//!
//! # Feature flags
//!
//! - **`oracle`** (default): the [`oracle`](mod@oracle) module with the
//!   production adapter over `ALL_*` views and `DBMS_METADATA`.
//!
//! [`ObjectScope`]: catalog_snapshot_core::ObjectScope
//! [`MetadataCatalog`]: catalog_snapshot_core::MetadataCatalog
//! [`MemoryCatalog`]: catalog_snapshot_core::MemoryCatalog

pub mod bundle;
pub mod discover;
pub mod extract;
pub mod fetch;
pub mod normalize;
#[cfg(feature = "oracle")]
pub mod oracle;
