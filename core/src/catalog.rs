//! Capability traits over the database catalog.
//!
//! Components never talk to a driver directly. They receive a session that
//! implements [`MetadataCatalog`] (DDL extraction) and [`AuditLog`] (audit
//! rows), obtained from a [`CatalogConnector`] once per phase. Dropping the
//! session releases the connection, so a phase releases it on every exit
//! path, including `?` propagation.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::scope::SchemaFilter;
use crate::types::{AuditRecord, DbObjectRef, TableComments};

/// Errors raised by catalog sessions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    /// The connection itself failed. Fatal to the current phase.
    #[error("connection failure: {0}")]
    Connection(String),

    /// A single statement failed. Callers degrade this per chunk or object.
    #[error("{0}")]
    Query(String),

    /// The queried catalog object (e.g. the audit table) does not exist.
    #[error("source not found: {0}")]
    MissingSource(String),
}

impl CatalogError {
    /// Returns `true` for failures that must abort the current phase.
    pub fn is_connection(&self) -> bool {
        matches!(self, CatalogError::Connection(_))
    }
}

/// Read access to object metadata and DDL.
pub trait MetadataCatalog {
    /// Lists objects of the given types whose owner passes `filter`,
    /// excluding system-generated objects.
    fn discover(
        &mut self,
        object_types: &[String],
        filter: &SchemaFilter,
    ) -> Result<Vec<DbObjectRef>, CatalogError>;

    /// Fetches DDL for exactly one object.
    fn fetch_ddl(&mut self, object: &DbObjectRef) -> Result<String, CatalogError>;

    /// Fetches DDL for a chunk of same-owner, same-type objects in one
    /// round-trip.
    ///
    /// The map holds one entry per row returned; a `None` value is a row whose
    /// DDL came back NULL. Names with no row are absent.
    fn fetch_ddl_bulk(
        &mut self,
        owner: &str,
        object_type: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, CatalogError>;

    /// Fetches column comments (in column order) and the table comment.
    fn fetch_comments(&mut self, owner: &str, table: &str)
    -> Result<TableComments, CatalogError>;

    /// Lists indexes owned by a table, ordered by index owner and name.
    fn fetch_indexes(&mut self, owner: &str, table: &str)
    -> Result<Vec<DbObjectRef>, CatalogError>;
}

/// Read access to the change-audit trail.
pub trait AuditLog {
    /// Returns rows of `table` with `audit_id > after_id`, ascending.
    ///
    /// Every returned value is fully owned, including large text columns.
    fn fetch_audit_after(
        &mut self,
        table: &str,
        after_id: i64,
    ) -> Result<Vec<AuditRecord>, CatalogError>;
}

/// Opens catalog sessions, one per pipeline phase.
pub trait CatalogConnector {
    type Session: MetadataCatalog + AuditLog;

    fn connect(&self) -> Result<Self::Session, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_connection_errors_are_fatal() {
        assert!(CatalogError::Connection("ORA-03113".into()).is_connection());
        assert!(!CatalogError::Query("ORA-31603".into()).is_connection());
        assert!(!CatalogError::MissingSource("DDL_AUDIT_LOG".into()).is_connection());
    }

    #[test]
    fn test_error_display() {
        let err = CatalogError::Connection("ORA-12541: no listener".into());
        assert_eq!(err.to_string(), "connection failure: ORA-12541: no listener");
    }
}
