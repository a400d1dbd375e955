//! Bulk DDL fetching with per-object fallback.
//!
//! Objects are grouped by `(owner, type)` and fetched in fixed-size chunks.
//! A chunk that fails as a whole, and any row that is missing or NULL, sends
//! the affected objects to the fallback path, which fetches them one at a
//! time. Only connection failures escape either path.

use std::collections::BTreeMap;

use catalog_snapshot_core::{
    CatalogError, DbObjectRef, DdlSource, MetadataCatalog, ObjectFailure,
};
use tracing::{Span, debug, warn};

/// Maximum number of object names per bulk round-trip.
pub const BULK_CHUNK_SIZE: usize = 500;

/// Result of a bulk pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BulkOutcome {
    /// DDL resolved by the bulk path.
    pub resolved: BTreeMap<DbObjectRef, String>,
    /// Objects the bulk path could not resolve, in input order.
    pub needs_fallback: Vec<DbObjectRef>,
}

/// Chunked bulk fetcher.
#[derive(Debug, Clone)]
pub struct BulkFetcher {
    span: Span,
    chunk_size: usize,
}

impl BulkFetcher {
    pub fn new(span: Span) -> Self {
        Self {
            span,
            chunk_size: BULK_CHUNK_SIZE,
        }
    }

    /// Overrides the chunk size (minimum 1).
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Fetches DDL for `objects`, one round-trip per chunk.
    ///
    /// Never fails for chunk- or row-level problems; those objects are listed
    /// in [`BulkOutcome::needs_fallback`]. Returns `Err` only for a connection
    /// failure.
    pub fn fetch<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        objects: &[DbObjectRef],
    ) -> Result<BulkOutcome, CatalogError> {
        let _guard = self.span.enter();
        let mut outcome = BulkOutcome::default();

        let mut groups: BTreeMap<(&str, &str), Vec<&DbObjectRef>> = BTreeMap::new();
        for object in objects {
            groups
                .entry((object.owner(), object.object_type()))
                .or_default()
                .push(object);
        }

        for ((owner, object_type), members) in groups {
            for chunk in members.chunks(self.chunk_size) {
                let names: Vec<String> = chunk
                    .iter()
                    .map(|o| o.object_name().to_string())
                    .collect();
                match catalog.fetch_ddl_bulk(owner, object_type, &names) {
                    Ok(rows) => {
                        for object in chunk {
                            match rows.get(object.object_name()) {
                                Some(Some(ddl)) => {
                                    outcome.resolved.insert((*object).clone(), ddl.clone());
                                }
                                _ => {
                                    debug!(object = %object, "Bulk fetch returned no DDL; deferring to fallback");
                                    outcome.needs_fallback.push((*object).clone());
                                }
                            }
                        }
                    }
                    Err(err) if err.is_connection() => return Err(err),
                    Err(err) => {
                        warn!(
                            owner,
                            object_type,
                            chunk_len = chunk.len(),
                            error = %err,
                            "Bulk DDL chunk failed; falling back per object"
                        );
                        outcome
                            .needs_fallback
                            .extend(chunk.iter().map(|o| (*o).clone()));
                    }
                }
            }
        }
        Ok(outcome)
    }
}

/// Single-object fetcher used for whatever the bulk path left unresolved.
#[derive(Debug, Clone)]
pub struct FallbackFetcher {
    span: Span,
}

impl FallbackFetcher {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Fetches DDL for exactly one object.
    pub fn fetch<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        object: &DbObjectRef,
    ) -> Result<String, CatalogError> {
        let _guard = self.span.enter();
        debug!(object = %object, "Fallback DDL fetch");
        catalog.fetch_ddl(object)
    }
}

/// Outcome of a combined bulk and fallback pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Resolved DDL with the path that produced it.
    pub resolved: BTreeMap<DbObjectRef, (String, DdlSource)>,
    /// Objects neither path could resolve.
    pub failures: Vec<ObjectFailure>,
}

/// Bulk fetch followed by fallback for the leftovers.
#[derive(Debug, Clone)]
pub struct DdlFetcher {
    bulk: BulkFetcher,
    fallback: FallbackFetcher,
}

impl DdlFetcher {
    pub fn new(span: Span) -> Self {
        Self {
            bulk: BulkFetcher::new(span.clone()),
            fallback: FallbackFetcher::new(span),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.bulk = self.bulk.with_chunk_size(chunk_size);
        self
    }

    /// Resolves every object through exactly one of bulk, fallback, or the
    /// failure list.
    pub fn fetch<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        objects: &[DbObjectRef],
    ) -> Result<FetchOutcome, CatalogError> {
        let bulk = self.bulk.fetch(catalog, objects)?;
        let mut outcome = FetchOutcome {
            resolved: bulk
                .resolved
                .into_iter()
                .map(|(object, ddl)| (object, (ddl, DdlSource::Bulk)))
                .collect(),
            failures: Vec::new(),
        };

        for object in bulk.needs_fallback {
            if outcome.resolved.contains_key(&object) {
                continue;
            }
            match self.fallback.fetch(catalog, &object) {
                Ok(ddl) => {
                    outcome.resolved.insert(object, (ddl, DdlSource::Fallback));
                }
                Err(err) if err.is_connection() => return Err(err),
                Err(err) => outcome.failures.push(ObjectFailure {
                    object,
                    reason: err.to_string(),
                }),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_snapshot_core::MemoryCatalog;

    fn views(n: usize) -> (MemoryCatalog, Vec<DbObjectRef>) {
        let mut catalog = MemoryCatalog::new();
        let mut objects = Vec::new();
        for i in 0..n {
            let object = DbObjectRef::new("HR", "VIEW", format!("V{i:04}"));
            catalog.insert(object.clone(), format!("CREATE VIEW V{i:04} AS SELECT 1 FROM DUAL"));
            objects.push(object);
        }
        (catalog, objects)
    }

    #[test]
    fn test_chunks_bound_round_trips() {
        let (mut catalog, objects) = views(1001);
        let outcome = BulkFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert_eq!(catalog.bulk_calls(), 3);
        assert_eq!(outcome.resolved.len(), 1001);
        assert!(outcome.needs_fallback.is_empty());
    }

    #[test]
    fn test_groups_by_owner_and_type() {
        let mut catalog = MemoryCatalog::new();
        let objects = vec![
            DbObjectRef::new("HR", "VIEW", "V1"),
            DbObjectRef::new("HR", "SEQUENCE", "S1"),
            DbObjectRef::new("APP", "VIEW", "V1"),
        ];
        for object in &objects {
            catalog.insert(object.clone(), "x");
        }
        BulkFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert_eq!(catalog.bulk_calls(), 3);
    }

    #[test]
    fn test_failed_chunk_marks_every_member() {
        let (mut catalog, objects) = views(4);
        catalog.fail_bulk_chunks("HR", "VIEW");
        let outcome = BulkFetcher::new(Span::none())
            .with_chunk_size(2)
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert!(outcome.resolved.is_empty());
        assert_eq!(outcome.needs_fallback, objects);
    }

    #[test]
    fn test_null_and_missing_rows_marked_individually() {
        let (mut catalog, objects) = views(3);
        catalog.null_in_bulk(objects[0].clone());
        catalog.fail_object(objects[2].clone(), "ORA-01031: insufficient privileges");
        let outcome = BulkFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert_eq!(outcome.resolved.len(), 1);
        assert!(outcome.resolved.contains_key(&objects[1]));
        assert_eq!(outcome.needs_fallback, vec![objects[0].clone(), objects[2].clone()]);
    }

    #[test]
    fn test_fallback_resolves_and_reports() {
        let (mut catalog, objects) = views(3);
        catalog.fail_bulk_chunks("HR", "VIEW");
        catalog.fail_object(objects[1].clone(), "ORA-31603: object not found");
        let outcome = DdlFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert_eq!(outcome.resolved.len(), 2);
        assert!(outcome.resolved.values().all(|(_, s)| *s == DdlSource::Fallback));
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(
            outcome.failures[0].to_string(),
            "HR.VIEW.V0001: ORA-31603: object not found"
        );
    }

    #[test]
    fn test_names_bind_with_catalog_case() {
        let mut catalog = MemoryCatalog::new();
        let objects = vec![
            DbObjectRef::new("HR", "VIEW", "Dept"),
            DbObjectRef::new("HR", "VIEW", "EMP"),
            DbObjectRef::new("HR", "VIEW", "Emp"),
        ];
        for object in &objects {
            catalog.insert(object.clone(), format!("CREATE VIEW \"{}\"", object.object_name()));
        }
        let outcome = DdlFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap();
        assert!(outcome.failures.is_empty());
        assert_eq!(catalog.single_calls(), 0);
        assert_eq!(outcome.resolved[&objects[0]].0, "CREATE VIEW \"Dept\"");
        assert_eq!(outcome.resolved[&objects[1]].0, "CREATE VIEW \"EMP\"");
        assert_eq!(outcome.resolved[&objects[2]].0, "CREATE VIEW \"Emp\"");
    }

    #[test]
    fn test_connection_failure_aborts() {
        let (mut catalog, objects) = views(2);
        catalog.lose_connection();
        let err = DdlFetcher::new(Span::none())
            .fetch(&mut catalog, &objects)
            .unwrap_err();
        assert!(err.is_connection());
    }
}
