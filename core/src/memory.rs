//! In-memory catalog backend.
//!
//! [`MemoryCatalog`] implements both capability traits over plain maps and
//! supports injecting failures at every level the pipeline degrades at:
//! whole bulk chunks, individual objects, NULL bulk rows, connections, and a
//! missing audit source. [`MemoryConnector`] hands out a fresh copy of the
//! catalog per session, so tests can mutate it between runs.

use std::collections::{BTreeMap, BTreeSet};

use crate::catalog::{AuditLog, CatalogConnector, CatalogError, MetadataCatalog};
use crate::scope::SchemaFilter;
use crate::types::{AuditRecord, ColumnComment, DbObjectRef, TableComments};

/// Catalog contents and injected faults.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    objects: BTreeMap<DbObjectRef, String>,
    comments: BTreeMap<(String, String), TableComments>,
    indexes: BTreeMap<(String, String), Vec<DbObjectRef>>,
    audit_rows: Vec<AuditRecord>,
    failing_chunks: BTreeSet<(String, String)>,
    null_in_bulk: BTreeSet<DbObjectRef>,
    failing_objects: BTreeMap<DbObjectRef, String>,
    connection_lost: bool,
    audit_source_missing: bool,
    bulk_calls: usize,
    single_calls: usize,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an object and its DDL.
    pub fn insert(&mut self, object: DbObjectRef, ddl: impl Into<String>) {
        self.objects.insert(object, ddl.into());
    }

    pub fn remove(&mut self, object: &DbObjectRef) {
        self.objects.remove(object);
    }

    pub fn set_comments(&mut self, owner: &str, table: &str, comments: TableComments) {
        self.comments.insert(table_key(owner, table), comments);
    }

    /// Appends a column comment to a table.
    pub fn add_column_comment(&mut self, owner: &str, table: &str, column: &str, comment: &str) {
        self.comments
            .entry(table_key(owner, table))
            .or_default()
            .columns
            .push(ColumnComment {
                column_name: column.to_string(),
                comment: comment.to_string(),
            });
    }

    /// Registers an index as owned by a table and stores its DDL.
    pub fn add_index(&mut self, owner: &str, table: &str, index: DbObjectRef, ddl: &str) {
        self.objects.insert(index.clone(), ddl.to_string());
        let list = self.indexes.entry(table_key(owner, table)).or_default();
        list.push(index);
        list.sort();
    }

    pub fn push_audit(&mut self, record: AuditRecord) {
        self.audit_rows.push(record);
    }

    /// Makes every bulk fetch for `(owner, object_type)` fail.
    pub fn fail_bulk_chunks(&mut self, owner: &str, object_type: &str) {
        self.failing_chunks.insert(chunk_key(owner, object_type));
    }

    /// Makes the bulk fetch return a NULL row for `object`.
    pub fn null_in_bulk(&mut self, object: DbObjectRef) {
        self.null_in_bulk.insert(object);
    }

    /// Makes both bulk and single fetches fail for `object`.
    pub fn fail_object(&mut self, object: DbObjectRef, reason: &str) {
        self.failing_objects.insert(object, reason.to_string());
    }

    /// Makes every call fail with a connection error.
    pub fn lose_connection(&mut self) {
        self.connection_lost = true;
    }

    pub fn drop_audit_source(&mut self) {
        self.audit_source_missing = true;
    }

    /// Number of bulk round-trips served by this session.
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls
    }

    /// Number of single-object fetches served by this session.
    pub fn single_calls(&self) -> usize {
        self.single_calls
    }

    fn check_connection(&self) -> Result<(), CatalogError> {
        if self.connection_lost {
            Err(CatalogError::Connection(
                "ORA-03113: end-of-file on communication channel".to_string(),
            ))
        } else {
            Ok(())
        }
    }
}

fn table_key(owner: &str, table: &str) -> (String, String) {
    (owner.trim().to_uppercase(), table.to_string())
}

fn chunk_key(owner: &str, object_type: &str) -> (String, String) {
    (owner.trim().to_uppercase(), object_type.trim().to_uppercase())
}

impl MetadataCatalog for MemoryCatalog {
    fn discover(
        &mut self,
        object_types: &[String],
        filter: &SchemaFilter,
    ) -> Result<Vec<DbObjectRef>, CatalogError> {
        self.check_connection()?;
        Ok(self
            .objects
            .keys()
            .filter(|obj| object_types.iter().any(|t| t == obj.object_type()))
            .filter(|obj| filter.admits(obj.owner()))
            .cloned()
            .collect())
    }

    fn fetch_ddl(&mut self, object: &DbObjectRef) -> Result<String, CatalogError> {
        self.check_connection()?;
        self.single_calls += 1;
        if let Some(reason) = self.failing_objects.get(object) {
            return Err(CatalogError::Query(reason.clone()));
        }
        self.objects.get(object).cloned().ok_or_else(|| {
            CatalogError::Query(format!(
                "ORA-31603: object \"{}\" of type {} not found in schema \"{}\"",
                object.object_name(),
                object.object_type(),
                object.owner()
            ))
        })
    }

    fn fetch_ddl_bulk(
        &mut self,
        owner: &str,
        object_type: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, CatalogError> {
        self.check_connection()?;
        self.bulk_calls += 1;
        if self.failing_chunks.contains(&chunk_key(owner, object_type)) {
            return Err(CatalogError::Query(
                "ORA-31600: invalid input value for chunk".to_string(),
            ));
        }
        let mut rows = BTreeMap::new();
        for name in names {
            let object = DbObjectRef::new(owner, object_type, name);
            if self.failing_objects.contains_key(&object) {
                continue;
            }
            if self.null_in_bulk.contains(&object) {
                rows.insert(object.object_name().to_string(), None);
            } else if let Some(ddl) = self.objects.get(&object) {
                rows.insert(object.object_name().to_string(), Some(ddl.clone()));
            }
        }
        Ok(rows)
    }

    fn fetch_comments(&mut self, owner: &str, table: &str) -> Result<TableComments, CatalogError> {
        self.check_connection()?;
        Ok(self.comments.get(&table_key(owner, table)).cloned().unwrap_or_default())
    }

    fn fetch_indexes(&mut self, owner: &str, table: &str) -> Result<Vec<DbObjectRef>, CatalogError> {
        self.check_connection()?;
        Ok(self.indexes.get(&table_key(owner, table)).cloned().unwrap_or_default())
    }
}

impl AuditLog for MemoryCatalog {
    fn fetch_audit_after(
        &mut self,
        table: &str,
        after_id: i64,
    ) -> Result<Vec<AuditRecord>, CatalogError> {
        self.check_connection()?;
        if self.audit_source_missing {
            return Err(CatalogError::MissingSource(format!(
                "ORA-00942: table or view \"{table}\" does not exist"
            )));
        }
        let mut rows: Vec<AuditRecord> = self
            .audit_rows
            .iter()
            .filter(|r| r.audit_id > after_id)
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.audit_id);
        Ok(rows)
    }
}

/// Connector handing out copies of a [`MemoryCatalog`].
#[derive(Debug, Clone, Default)]
pub struct MemoryConnector {
    pub catalog: MemoryCatalog,
    /// When set, `connect` itself fails.
    pub refuse_connections: bool,
}

impl MemoryConnector {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            refuse_connections: false,
        }
    }
}

impl CatalogConnector for MemoryConnector {
    type Session = MemoryCatalog;

    fn connect(&self) -> Result<Self::Session, CatalogError> {
        if self.refuse_connections {
            return Err(CatalogError::Connection(
                "ORA-12541: TNS:no listener".to_string(),
            ));
        }
        Ok(self.catalog.clone())
    }
}
