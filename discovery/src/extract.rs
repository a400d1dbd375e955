//! Extraction driver: discovery, bulk and fallback fetch, table bundling.

use catalog_snapshot_core::{
    CatalogError, DbObjectRef, ExtractedDdl, MetadataCatalog, ObjectFailure, ObjectScope,
};
use tracing::{Span, info, warn};

use crate::bundle::TableBundler;
use crate::discover::Discoverer;
use crate::fetch::DdlFetcher;

/// Objects between progress log lines.
pub const PROGRESS_INTERVAL: usize = 50;

/// Everything one extraction phase produced.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractionOutcome {
    /// Successfully extracted objects, in discovery order.
    pub items: Vec<ExtractedDdl>,
    /// Objects that could not be extracted.
    pub failures: Vec<ObjectFailure>,
}

impl ExtractionOutcome {
    /// Failure messages in `owner.type.name: reason` form.
    pub fn failure_messages(&self) -> Vec<String> {
        self.failures.iter().map(ToString::to_string).collect()
    }
}

/// Runs the extraction phase against one catalog session.
///
/// Objects and table indexes go through the same fetcher, so the chunk size
/// applies to both.
#[derive(Debug, Clone)]
pub struct Extractor {
    span: Span,
    discoverer: Discoverer,
    fetcher: DdlFetcher,
}

impl Extractor {
    pub fn new(span: Span) -> Self {
        Self {
            discoverer: Discoverer::new(span.clone()),
            fetcher: DdlFetcher::new(span.clone()),
            span,
        }
    }

    /// Overrides the bulk chunk size for objects and table indexes.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.fetcher = self.fetcher.with_chunk_size(chunk_size);
        self
    }

    /// Discovers and extracts every object in `scope`.
    ///
    /// Per-object problems, including snapshot path collisions found by
    /// discovery, become entries in [`ExtractionOutcome::failures`]; only a
    /// connection failure is returned as `Err`. Indexes are folded into table
    /// bundles when `scope` lists INDEX.
    pub fn extract<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        scope: &ObjectScope,
    ) -> Result<ExtractionOutcome, CatalogError> {
        let discovery = self.discoverer.discover(catalog, scope)?;
        let objects = discovery.objects;
        let fetched = self.fetcher.fetch(catalog, &objects)?;
        let bundler = TableBundler::new(
            self.span.clone(),
            self.fetcher.clone(),
            scope.bundles_indexes(),
        );
        let _guard = self.span.enter();

        let mut outcome = ExtractionOutcome {
            items: Vec::with_capacity(objects.len()),
            failures: discovery.collisions,
        };
        outcome.failures.extend(fetched.failures);
        let total = objects.len();

        for (index, object) in objects.iter().enumerate() {
            if let Some((ddl, source)) = fetched.resolved.get(object) {
                match finish(&bundler, catalog, object, ddl) {
                    Ok(ddl) => outcome.items.push(ExtractedDdl {
                        object: object.clone(),
                        ddl,
                        source: *source,
                    }),
                    Err(err) if err.is_connection() => return Err(err),
                    Err(err) => {
                        warn!(object = %object, error = %err, "Table bundle failed");
                        outcome.failures.push(ObjectFailure {
                            object: object.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }

            let done = index + 1;
            if done % PROGRESS_INTERVAL == 0 || done == total {
                info!("Extraction progress: {done}/{total}");
            }
        }

        outcome.failures.sort_by(|a, b| a.object.cmp(&b.object));
        for failure in &outcome.failures {
            warn!(failure = %failure, "Object extraction failed");
        }
        info!(
            extracted = outcome.items.len(),
            failed = outcome.failures.len(),
            "Extraction finished"
        );
        Ok(outcome)
    }
}

fn finish<C: MetadataCatalog>(
    bundler: &TableBundler,
    catalog: &mut C,
    object: &DbObjectRef,
    ddl: &str,
) -> Result<String, CatalogError> {
    if object.is_table() {
        bundler.bundle(catalog, object, ddl)
    } else {
        Ok(ddl.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_snapshot_core::{DdlSource, MemoryCatalog};

    fn scope(types: &[&str]) -> ObjectScope {
        let types: Vec<String> = types.iter().map(|s| s.to_string()).collect();
        ObjectScope::new(&types, &[], &[])
    }

    #[test]
    fn test_extracts_and_bundles_tables() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(DbObjectRef::new("HR", "TABLE", "T1"), "CREATE TABLE T1 (ID NUMBER);");
        catalog.insert(DbObjectRef::new("HR", "VIEW", "V1"), "CREATE VIEW V1 AS SELECT 1 FROM DUAL;");
        catalog.add_index(
            "HR",
            "T1",
            DbObjectRef::new("HR", "INDEX", "T1_IX"),
            "CREATE INDEX T1_IX ON T1 (ID);",
        );

        let scope = scope(&["TABLE", "VIEW", "INDEX"]);
        let outcome = Extractor::new(Span::none())
            .extract(&mut catalog, &scope)
            .unwrap();

        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.items.len(), 2);
        let table = &outcome.items[0];
        assert_eq!(table.object, DbObjectRef::new("HR", "TABLE", "T1"));
        assert_eq!(table.source, DdlSource::Bulk);
        assert_eq!(
            table.ddl,
            "CREATE TABLE T1 (ID NUMBER);\n\nCREATE INDEX T1_IX ON T1 (ID);\n"
        );
        assert_eq!(outcome.items[1].ddl, "CREATE VIEW V1 AS SELECT 1 FROM DUAL;");
    }

    #[test]
    fn test_failures_do_not_stop_the_batch() {
        let mut catalog = MemoryCatalog::new();
        for name in ["P1", "P2", "P3"] {
            catalog.insert(DbObjectRef::new("HR", "PROCEDURE", name), format!("CREATE PROCEDURE {name}"));
        }
        catalog.fail_object(DbObjectRef::new("HR", "PROCEDURE", "P2"), "ORA-01031: insufficient privileges");

        let scope = scope(&["PROCEDURE"]);
        let outcome = Extractor::new(Span::none())
            .extract(&mut catalog, &scope)
            .unwrap();

        assert_eq!(outcome.items.len(), 2);
        assert_eq!(
            outcome.failure_messages(),
            vec!["HR.PROCEDURE.P2: ORA-01031: insufficient privileges".to_string()]
        );
    }

    #[test]
    fn test_names_keep_catalog_case() {
        let mut catalog = MemoryCatalog::new();
        for name in ["EMP", "Emp", "Dept"] {
            catalog.insert(DbObjectRef::new("HR", "VIEW", name), format!("CREATE VIEW \"{name}\""));
        }
        catalog.insert(DbObjectRef::new("HR", "TABLE", "Orders"), "CREATE TABLE \"Orders\" (ID NUMBER);");
        catalog.add_column_comment("HR", "Orders", "ID", "Order key");

        let scope = scope(&["TABLE", "VIEW"]);
        let outcome = Extractor::new(Span::none())
            .extract(&mut catalog, &scope)
            .unwrap();

        assert!(outcome.failures.is_empty(), "{:?}", outcome.failure_messages());
        let labels: Vec<String> = outcome.items.iter().map(|i| i.object.to_string()).collect();
        assert_eq!(
            labels,
            vec!["HR.TABLE.Orders", "HR.VIEW.Dept", "HR.VIEW.EMP", "HR.VIEW.Emp"]
        );
        assert!(outcome.items[0]
            .ddl
            .contains("COMMENT ON COLUMN \"HR\".\"Orders\".\"ID\" IS 'Order key';"));
        assert_eq!(outcome.items[3].ddl, "CREATE VIEW \"Emp\"");
    }

    #[test]
    fn test_path_collisions_are_failures() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(DbObjectRef::new("HR", "VIEW", "A B"), "CREATE VIEW \"A B\"");
        catalog.insert(DbObjectRef::new("HR", "VIEW", "A_B"), "CREATE VIEW A_B");

        let scope = scope(&["VIEW"]);
        let outcome = Extractor::new(Span::none())
            .extract(&mut catalog, &scope)
            .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].object, DbObjectRef::new("HR", "VIEW", "A_B"));
    }

    #[test]
    fn test_chunk_size_applies_to_index_fetch() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(DbObjectRef::new("HR", "TABLE", "T1"), "CREATE TABLE T1 (ID NUMBER);");
        for name in ["T1_A", "T1_B", "T1_C"] {
            catalog.add_index("HR", "T1", DbObjectRef::new("HR", "INDEX", name), &format!("CREATE INDEX {name};"));
        }

        let scope = scope(&["TABLE", "INDEX"]);
        let outcome = Extractor::new(Span::none())
            .with_chunk_size(1)
            .extract(&mut catalog, &scope)
            .unwrap();

        assert_eq!(outcome.items.len(), 1);
        assert!(outcome.items[0].ddl.contains("CREATE INDEX T1_C;"));
        assert_eq!(catalog.bulk_calls(), 4);
    }

    #[test]
    fn test_connection_loss_aborts_phase() {
        let mut catalog = MemoryCatalog::new();
        catalog.insert(DbObjectRef::new("HR", "VIEW", "V1"), "x");
        catalog.lose_connection();
        let scope = scope(&["VIEW"]);
        let err = Extractor::new(Span::none())
            .extract(&mut catalog, &scope)
            .unwrap_err();
        assert!(err.is_connection());
    }
}
