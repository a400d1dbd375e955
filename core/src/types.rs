//! Data model for catalog snapshots and audit exports.
//!
//! This module defines the values that flow through a snapshot run: object
//! references produced by discovery, raw DDL produced by extraction, the
//! normalized entries handed to the writer, and the audit rows handed to the
//! exporter. The types serialize with [`serde`] so run results and audit
//! records can be emitted as JSON.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Object type whose snapshot artifact is a bundle of table DDL, comments,
/// and owned indexes.
pub const TABLE_TYPE: &str = "TABLE";

/// Object type folded into table bundles when tables are also in scope.
pub const INDEX_TYPE: &str = "INDEX";

/// Identity of one catalog object.
///
/// Owner and object type are trimmed and upper-cased on construction. The
/// object name is kept exactly as the catalog returns it: quoted identifiers
/// such as `"Dept"` are case-sensitive, so `Emp` and `EMP` are two objects
/// and every catalog call binds the name unchanged. Ordering is
/// lexicographic over `(owner, object_type, object_name)`, which is the
/// deterministic order every run processes objects in.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_core::DbObjectRef;
///
/// let obj = DbObjectRef::new("hr", "package body", "Payroll");
/// assert_eq!(obj.owner(), "HR");
/// assert_eq!(obj.object_type(), "PACKAGE BODY");
/// assert_eq!(obj.to_string(), "HR.PACKAGE BODY.Payroll");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DbObjectRef {
    owner: String,
    object_type: String,
    object_name: String,
}

impl DbObjectRef {
    /// Creates a reference, case-normalizing owner and type.
    pub fn new(
        owner: impl AsRef<str>,
        object_type: impl AsRef<str>,
        object_name: impl AsRef<str>,
    ) -> Self {
        Self {
            owner: canonical(owner.as_ref()),
            object_type: canonical(object_type.as_ref()),
            object_name: object_name.as_ref().to_string(),
        }
    }

    /// Owning schema.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Catalog object type, e.g. `TABLE` or `PACKAGE BODY`.
    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Object name within its owner, as stored in the catalog.
    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    /// Returns `true` for objects that are snapshotted as table bundles.
    pub fn is_table(&self) -> bool {
        self.object_type == TABLE_TYPE
    }
}

impl fmt::Display for DbObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.owner, self.object_type, self.object_name)
    }
}

fn canonical(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Which extraction path produced a DDL text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DdlSource {
    /// Resolved by a chunked bulk fetch.
    Bulk,
    /// Resolved by the per-object fallback fetch.
    Fallback,
}

/// Raw DDL for one object, before normalization.
///
/// For tables the text is already the full bundle (base DDL, comments, and
/// index DDL).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDdl {
    pub object: DbObjectRef,
    pub ddl: String,
    pub source: DdlSource,
}

/// Normalized snapshot content for one object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedEntry {
    pub object: DbObjectRef,
    pub text: String,
}

/// A per-object extraction failure.
///
/// Displays as `owner.type.name: reason`, the literal form reported in run
/// summaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectFailure {
    pub object: DbObjectRef,
    pub reason: String,
}

impl fmt::Display for ObjectFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.object, self.reason)
    }
}

/// Line terminator used for snapshot files.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_core::LineEnding;
///
/// let ending: LineEnding = "crlf".parse().unwrap();
/// assert_eq!(ending, LineEnding::Crlf);
/// assert_eq!(ending.as_str(), "\r\n");
/// assert!("CR".parse::<LineEnding>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String")]
pub enum LineEnding {
    #[default]
    #[serde(rename = "LF")]
    Lf,
    #[serde(rename = "CRLF")]
    Crlf,
}

impl LineEnding {
    /// The terminator itself.
    pub fn as_str(self) -> &'static str {
        match self {
            LineEnding::Lf => "\n",
            LineEnding::Crlf => "\r\n",
        }
    }
}

impl TryFrom<String> for LineEnding {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl FromStr for LineEnding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LF" => Ok(LineEnding::Lf),
            "CRLF" => Ok(LineEnding::Crlf),
            other => Err(format!("line ending must be LF or CRLF, got '{other}'")),
        }
    }
}

/// A column-level comment, in declared column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnComment {
    pub column_name: String,
    pub comment: String,
}

/// Comments attached to a table and its columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableComments {
    /// Column comments ordered by declared column position.
    pub columns: Vec<ColumnComment>,
    /// Table-level comment, if any.
    pub table: Option<String>,
}

impl TableComments {
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty() && self.table.is_none()
    }
}

/// One row of the change-audit trail.
///
/// Field order is the serialized field order of each JSON-Lines record. All
/// text is owned: records never borrow from a driver cursor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub audit_id: i64,
    pub event_time: Option<NaiveDateTime>,
    pub sysevent: Option<String>,
    pub db_user: Option<String>,
    pub login_user: Option<String>,
    pub current_schema: Option<String>,
    pub os_user: Option<String>,
    pub host: Option<String>,
    pub ip_address: Option<String>,
    pub module: Option<String>,
    pub obj_owner: Option<String>,
    pub obj_type: Option<String>,
    pub obj_name: Option<String>,
    pub sql_text: Option<String>,
}

impl AuditRecord {
    /// A record with only its identifier set.
    pub fn new(audit_id: i64) -> Self {
        Self {
            audit_id,
            event_time: None,
            sysevent: None,
            db_user: None,
            login_user: None,
            current_schema: None,
            os_user: None,
            host: None,
            ip_address: None,
            module: None,
            obj_owner: None,
            obj_type: None,
            obj_name: None,
            sql_text: None,
        }
    }

    /// Sets the audited object's owner, type, and name.
    pub fn with_object(mut self, owner: &str, object_type: &str, name: &str) -> Self {
        self.obj_owner = Some(owner.to_string());
        self.obj_type = Some(object_type.to_string());
        self.obj_name = Some(name.to_string());
        self
    }

    pub fn with_sql_text(mut self, sql: &str) -> Self {
        self.sql_text = Some(sql.to_string());
        self
    }
}
