//! Oracle catalog adapter over `ALL_*` dictionary views and `DBMS_METADATA`.
//!
//! [`OracleConnector`] opens one [`OracleCatalog`] session per phase. The
//! session implements both capability traits and closes its connection when
//! dropped. Large text columns (DDL and audit `SQL_TEXT` CLOBs) are read into
//! owned `String`s while the row is current, so nothing returned by a session
//! refers back to the connection.

use std::collections::BTreeMap;
use std::fmt;

use catalog_snapshot_core::{
    AuditLog, AuditRecord, CatalogConnector, CatalogError, ColumnComment, DbObjectRef,
    MetadataCatalog, SchemaFilter, TableComments, is_valid_audit_table,
};
use chrono::NaiveDateTime;
use oracle::sql_type::ToSql;
use oracle::{Connection, Row};
use tracing::{Span, debug, warn};

/// Error codes that mean the session is gone rather than one statement
/// failing.
const CONNECTION_ERROR_CODES: &[&str] = &[
    "ORA-01012", "ORA-01017", "ORA-03113", "ORA-03114", "ORA-03135", "ORA-12170", "ORA-12514",
    "ORA-12541", "ORA-12543", "ORA-28000", "DPI-1010", "DPI-1080",
];

const MISSING_OBJECT_CODE: &str = "ORA-00942";

const SESSION_TRANSFORMS: &str = "BEGIN
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'SQLTERMINATOR', TRUE);
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'PRETTY', TRUE);
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'SEGMENT_ATTRIBUTES', FALSE);
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'STORAGE', FALSE);
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'TABLESPACE', FALSE);
  DBMS_METADATA.SET_TRANSFORM_PARAM(DBMS_METADATA.SESSION_TRANSFORM, 'PARTITIONING', FALSE);
END;";

/// Maps a catalog object type to its `DBMS_METADATA` type name.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_discovery::oracle::metadata_type;
///
/// assert_eq!(metadata_type("package body"), "PACKAGE_BODY");
/// assert_eq!(metadata_type("MATERIALIZED VIEW"), "MATERIALIZED_VIEW");
/// assert_eq!(metadata_type("TABLE"), "TABLE");
/// ```
pub fn metadata_type(object_type: &str) -> String {
    let upper = object_type.trim().to_uppercase();
    match upper.as_str() {
        "PACKAGE BODY" | "TYPE BODY" | "MATERIALIZED VIEW" | "JAVA SOURCE" | "JAVA CLASS"
        | "JAVA RESOURCE" => upper.replace(' ', "_"),
        _ => upper,
    }
}

/// Classifies a driver error by its message code.
pub fn classify_error(message: &str) -> CatalogError {
    if message.contains(MISSING_OBJECT_CODE) {
        CatalogError::MissingSource(message.to_string())
    } else if CONNECTION_ERROR_CODES.iter().any(|code| message.contains(code)) {
        CatalogError::Connection(message.to_string())
    } else {
        CatalogError::Query(message.to_string())
    }
}

fn map_err(err: oracle::Error) -> CatalogError {
    classify_error(&err.to_string())
}

/// Builds `:start, :start+1, ...` bind placeholders.
fn placeholders(start: usize, count: usize) -> String {
    (start..start + count)
        .map(|i| format!(":{i}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Connection parameters for one database service.
#[derive(Clone)]
pub struct OracleSettings {
    pub username: String,
    pub password: String,
    /// Easy-connect string, `host:port/service_name`.
    pub connect_string: String,
}

impl fmt::Debug for OracleSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OracleSettings")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("connect_string", &self.connect_string)
            .finish()
    }
}

/// Opens [`OracleCatalog`] sessions.
#[derive(Debug, Clone)]
pub struct OracleConnector {
    settings: OracleSettings,
    span: Span,
}

impl OracleConnector {
    pub fn new(settings: OracleSettings, span: Span) -> Self {
        Self { settings, span }
    }
}

impl CatalogConnector for OracleConnector {
    type Session = OracleCatalog;

    fn connect(&self) -> Result<OracleCatalog, CatalogError> {
        let _guard = self.span.enter();
        debug!(connect_string = %self.settings.connect_string, "Opening catalog session");
        let conn = Connection::connect(
            &self.settings.username,
            &self.settings.password,
            &self.settings.connect_string,
        )
        .map_err(|err| CatalogError::Connection(err.to_string()))?;

        if let Err(err) = conn.execute(SESSION_TRANSFORMS, &[]) {
            warn!(error = %err, "Could not apply DBMS_METADATA session transforms");
        }
        Ok(OracleCatalog {
            conn,
            span: self.span.clone(),
        })
    }
}

/// One open catalog session.
pub struct OracleCatalog {
    conn: Connection,
    span: Span,
}

impl OracleCatalog {
    fn collect_rows<T>(
        &self,
        sql: &str,
        params: &[&dyn ToSql],
        mut read: impl FnMut(&Row) -> oracle::Result<T>,
    ) -> Result<Vec<T>, CatalogError> {
        let rows = self.conn.query(sql, params).map_err(map_err)?;
        let mut out = Vec::new();
        for row in rows {
            let row = row.map_err(map_err)?;
            out.push(read(&row).map_err(map_err)?);
        }
        Ok(out)
    }
}

impl Drop for OracleCatalog {
    fn drop(&mut self) {
        let _guard = self.span.enter();
        if let Err(err) = self.conn.close() {
            debug!(error = %err, "Catalog session close failed");
        }
    }
}

impl MetadataCatalog for OracleCatalog {
    fn discover(
        &mut self,
        object_types: &[String],
        filter: &SchemaFilter,
    ) -> Result<Vec<DbObjectRef>, CatalogError> {
        if object_types.is_empty() {
            return Ok(Vec::new());
        }
        let mut sql = format!(
            "SELECT OWNER, OBJECT_TYPE, OBJECT_NAME FROM ALL_OBJECTS \
             WHERE OBJECT_TYPE IN ({}) AND GENERATED = 'N'",
            placeholders(1, object_types.len())
        );
        let mut params: Vec<&dyn ToSql> = object_types.iter().map(|t| t as &dyn ToSql).collect();
        match filter {
            SchemaFilter::All => {}
            SchemaFilter::Include(owners) | SchemaFilter::Exclude(owners) if owners.is_empty() => {}
            SchemaFilter::Include(owners) => {
                sql.push_str(&format!(
                    " AND OWNER IN ({})",
                    placeholders(params.len() + 1, owners.len())
                ));
                params.extend(owners.iter().map(|o| o as &dyn ToSql));
            }
            SchemaFilter::Exclude(owners) => {
                sql.push_str(&format!(
                    " AND OWNER NOT IN ({})",
                    placeholders(params.len() + 1, owners.len())
                ));
                params.extend(owners.iter().map(|o| o as &dyn ToSql));
            }
        }
        sql.push_str(" ORDER BY OWNER, OBJECT_TYPE, OBJECT_NAME");

        self.collect_rows(&sql, &params, |row| {
            let owner: String = row.get(0)?;
            let object_type: String = row.get(1)?;
            let name: String = row.get(2)?;
            Ok(DbObjectRef::new(owner, object_type, name))
        })
    }

    fn fetch_ddl(&mut self, object: &DbObjectRef) -> Result<String, CatalogError> {
        let kind = metadata_type(object.object_type());
        let rows = self.collect_rows(
            "SELECT DBMS_METADATA.GET_DDL(:1, :2, :3) FROM DUAL",
            &[&kind, &object.object_name(), &object.owner()],
            |row| row.get::<_, Option<String>>(0),
        )?;
        rows.into_iter()
            .next()
            .flatten()
            .ok_or_else(|| CatalogError::Query("DBMS_METADATA.GET_DDL returned NULL".to_string()))
    }

    fn fetch_ddl_bulk(
        &mut self,
        owner: &str,
        object_type: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, Option<String>>, CatalogError> {
        if names.is_empty() {
            return Ok(BTreeMap::new());
        }
        let kind = metadata_type(object_type);
        let sql = format!(
            "SELECT OBJECT_NAME, DBMS_METADATA.GET_DDL(:1, OBJECT_NAME, :2) FROM ALL_OBJECTS \
             WHERE OWNER = :3 AND OBJECT_TYPE = :4 AND GENERATED = 'N' \
             AND OBJECT_NAME IN ({}) ORDER BY OBJECT_NAME",
            placeholders(5, names.len())
        );
        let mut params: Vec<&dyn ToSql> = vec![&kind as &dyn ToSql, &owner, &owner, &object_type];
        params.extend(names.iter().map(|n| n as &dyn ToSql));

        let rows = self.collect_rows(&sql, &params, |row| {
            let name: String = row.get(0)?;
            let ddl: Option<String> = row.get(1)?;
            Ok((name, ddl))
        })?;
        Ok(rows.into_iter().collect())
    }

    fn fetch_comments(&mut self, owner: &str, table: &str) -> Result<TableComments, CatalogError> {
        let columns = self.collect_rows(
            "SELECT c.COLUMN_NAME, c.COMMENTS FROM ALL_COL_COMMENTS c \
             JOIN ALL_TAB_COLUMNS t ON t.OWNER = c.OWNER AND t.TABLE_NAME = c.TABLE_NAME \
             AND t.COLUMN_NAME = c.COLUMN_NAME \
             WHERE c.OWNER = :1 AND c.TABLE_NAME = :2 AND c.COMMENTS IS NOT NULL \
             ORDER BY t.COLUMN_ID",
            &[&owner, &table],
            |row| {
                Ok(ColumnComment {
                    column_name: row.get(0)?,
                    comment: row.get(1)?,
                })
            },
        )?;
        let table_comment = self
            .collect_rows(
                "SELECT COMMENTS FROM ALL_TAB_COMMENTS \
                 WHERE OWNER = :1 AND TABLE_NAME = :2 AND COMMENTS IS NOT NULL",
                &[&owner, &table],
                |row| row.get::<_, String>(0),
            )?
            .into_iter()
            .next();
        Ok(TableComments {
            columns,
            table: table_comment,
        })
    }

    fn fetch_indexes(&mut self, owner: &str, table: &str) -> Result<Vec<DbObjectRef>, CatalogError> {
        self.collect_rows(
            "SELECT OWNER, INDEX_NAME FROM ALL_INDEXES \
             WHERE TABLE_OWNER = :1 AND TABLE_NAME = :2 AND GENERATED = 'N' \
             ORDER BY OWNER, INDEX_NAME",
            &[&owner, &table],
            |row| {
                let index_owner: String = row.get(0)?;
                let name: String = row.get(1)?;
                Ok(DbObjectRef::new(index_owner, "INDEX", name))
            },
        )
    }
}

impl AuditLog for OracleCatalog {
    fn fetch_audit_after(
        &mut self,
        table: &str,
        after_id: i64,
    ) -> Result<Vec<AuditRecord>, CatalogError> {
        if !is_valid_audit_table(table) {
            return Err(CatalogError::Query(format!(
                "invalid audit table name: {table}"
            )));
        }
        let sql = format!(
            "SELECT AUDIT_ID, EVENT_TIME, SYSEVENT, DB_USER, LOGIN_USER, CURRENT_SCHEMA, \
             OS_USER, HOST, IP_ADDRESS, MODULE, OBJ_OWNER, OBJ_TYPE, OBJ_NAME, SQL_TEXT \
             FROM {table} WHERE AUDIT_ID > :1 ORDER BY AUDIT_ID"
        );
        self.collect_rows(&sql, &[&after_id], |row| {
            Ok(AuditRecord {
                audit_id: row.get(0)?,
                event_time: row.get::<_, Option<NaiveDateTime>>(1)?,
                sysevent: row.get(2)?,
                db_user: row.get(3)?,
                login_user: row.get(4)?,
                current_schema: row.get(5)?,
                os_user: row.get(6)?,
                host: row.get(7)?,
                ip_address: row.get(8)?,
                module: row.get(9)?,
                obj_owner: row.get(10)?,
                obj_type: row.get(11)?,
                obj_name: row.get(12)?,
                sql_text: row.get(13)?,
            })
        })
    }
}
