//! Table bundles: base DDL, comments, and owned index DDL in one artifact.

use catalog_snapshot_core::{CatalogError, DbObjectRef, MetadataCatalog, TableComments};
use tracing::{Span, warn};

use crate::fetch::DdlFetcher;

/// Quotes an identifier for use in a COMMENT statement.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_discovery::bundle::quote_identifier;
///
/// assert_eq!(quote_identifier("EMP"), "\"EMP\"");
/// assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
/// ```
pub fn quote_identifier(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Quotes a string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders table comments as COMMENT statements.
///
/// Column comments come first in column order, then the table comment.
pub fn comment_statements(owner: &str, table: &str, comments: &TableComments) -> Vec<String> {
    let owner_q = quote_identifier(owner);
    let table_q = quote_identifier(table);
    let mut out: Vec<String> = comments
        .columns
        .iter()
        .map(|c| {
            format!(
                "COMMENT ON COLUMN {owner_q}.{table_q}.{} IS {};",
                quote_identifier(&c.column_name),
                quote_literal(&c.comment)
            )
        })
        .collect();
    if let Some(comment) = &comments.table {
        out.push(format!(
            "COMMENT ON TABLE {owner_q}.{table_q} IS {};",
            quote_literal(comment)
        ));
    }
    out
}

/// Composes table bundles.
#[derive(Debug, Clone)]
pub struct TableBundler {
    span: Span,
    fetcher: DdlFetcher,
    include_indexes: bool,
}

impl TableBundler {
    /// Creates a bundler; `include_indexes` folds owned index DDL into each
    /// bundle.
    pub fn new(span: Span, fetcher: DdlFetcher, include_indexes: bool) -> Self {
        Self {
            span,
            fetcher,
            include_indexes,
        }
    }

    /// Builds the bundle for `table` from its already-fetched `base_ddl`.
    ///
    /// Sections are the trimmed base DDL, the comment statements, and the
    /// index DDL, separated by blank lines; empty sections are omitted. The
    /// result ends with exactly one newline. Unresolvable indexes are skipped
    /// with a warning. Errors reading comments or the index list propagate.
    pub fn bundle<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        table: &DbObjectRef,
        base_ddl: &str,
    ) -> Result<String, CatalogError> {
        let mut sections: Vec<String> = vec![base_ddl.trim().to_string()];

        let comments = catalog.fetch_comments(table.owner(), table.object_name())?;
        let statements = comment_statements(table.owner(), table.object_name(), &comments);
        if !statements.is_empty() {
            sections.push(statements.join("\n"));
        }

        if self.include_indexes {
            let index_ddl = self.index_sections(catalog, table)?;
            if !index_ddl.is_empty() {
                sections.push(index_ddl.join("\n\n"));
            }
        }

        let body = sections
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        Ok(format!("{}\n", body.trim()))
    }

    fn index_sections<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        table: &DbObjectRef,
    ) -> Result<Vec<String>, CatalogError> {
        let indexes = catalog.fetch_indexes(table.owner(), table.object_name())?;
        if indexes.is_empty() {
            return Ok(Vec::new());
        }

        let outcome = self.fetcher.fetch(catalog, &indexes)?;
        let _guard = self.span.enter();
        for failure in &outcome.failures {
            warn!(table = %table, index = %failure.object, reason = %failure.reason, "Skipping index that could not be resolved");
        }

        Ok(indexes
            .iter()
            .filter_map(|index| outcome.resolved.get(index))
            .map(|(ddl, _)| ddl.trim().to_string())
            .filter(|ddl| !ddl.is_empty())
            .collect())
    }
}
