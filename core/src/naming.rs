//! Path derivation for snapshot and audit files.
//!
//! Every path segment is sanitized on its own, so a catalog name can never
//! introduce an extra directory level or escape the root it is joined to.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{AuditRecord, DbObjectRef};

/// Extension of snapshot files.
pub const SNAPSHOT_EXTENSION: &str = "sql";

/// Extension of audit history files.
pub const AUDIT_EXTENSION: &str = "jsonl";

/// Placeholder for snapshot segments that sanitize to nothing.
pub const SNAPSHOT_PLACEHOLDER: &str = "unnamed";

/// Placeholder for missing or empty audit segments.
pub const AUDIT_PLACEHOLDER: &str = "UNKNOWN";

static AUDIT_TABLE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^[A-Za-z0-9_$#."]+$"#).expect("static regex must compile")
});

/// Returns `true` if `table` is safe to interpolate as the audit source:
/// a non-empty, optionally owner-qualified and quoted identifier.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_core::is_valid_audit_table;
///
/// assert!(is_valid_audit_table("AUDIT.\"DDL$LOG\""));
/// assert!(!is_valid_audit_table("LOG; DROP TABLE X"));
/// ```
pub fn is_valid_audit_table(table: &str) -> bool {
    AUDIT_TABLE_NAME.is_match(table)
}

/// Sanitizes one path segment.
///
/// Runs of characters outside `[A-Za-z0-9_.-]` collapse to a single `_`,
/// leading and trailing underscores are trimmed, and an empty or dots-only
/// result becomes `placeholder`.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_core::safe_segment;
///
/// assert_eq!(safe_segment("EMP$HIST", "unnamed"), "EMP_HIST");
/// assert_eq!(safe_segment("  a b/c  ", "unnamed"), "a_b_c");
/// assert_eq!(safe_segment("$$$", "unnamed"), "unnamed");
/// assert_eq!(safe_segment("..", "unnamed"), "unnamed");
/// ```
pub fn safe_segment(raw: &str, placeholder: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_run = false;
    for ch in raw.trim().chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '_' | '.' | '-') {
            out.push(ch);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    let cleaned = out.trim_matches('_');
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        placeholder.to_string()
    } else {
        cleaned.to_string()
    }
}

/// Directory name for an object type: upper-cased, spaces as underscores.
pub fn type_segment(object_type: &str, placeholder: &str) -> String {
    safe_segment(&object_type.trim().to_uppercase().replace(' ', "_"), placeholder)
}

/// Relative snapshot path `<owner>/<type>/<name>.sql` for an object.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use catalog_snapshot_core::{DbObjectRef, snapshot_relative_path};
///
/// let obj = DbObjectRef::new("HR", "PACKAGE BODY", "PAYROLL");
/// assert_eq!(
///     snapshot_relative_path(&obj),
///     PathBuf::from("HR").join("PACKAGE_BODY").join("PAYROLL.sql")
/// );
/// ```
pub fn snapshot_relative_path(object: &DbObjectRef) -> PathBuf {
    let owner = safe_segment(object.owner(), SNAPSHOT_PLACEHOLDER);
    let object_type = type_segment(object.object_type(), SNAPSHOT_PLACEHOLDER);
    let name = safe_segment(object.object_name(), SNAPSHOT_PLACEHOLDER);
    PathBuf::from(owner)
        .join(object_type)
        .join(format!("{name}.{SNAPSHOT_EXTENSION}"))
}

/// Relative audit path `<service>/<owner>/<type>/<name>.jsonl` for a record.
///
/// Rows without an object name land in `EVENT_<audit_id>.jsonl`.
pub fn audit_relative_path(service: &str, record: &AuditRecord) -> PathBuf {
    let owner = record.obj_owner.as_deref().unwrap_or(AUDIT_PLACEHOLDER);
    let object_type = record.obj_type.as_deref().unwrap_or(AUDIT_PLACEHOLDER);
    let name = match record.obj_name.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("EVENT_{}", record.audit_id),
    };
    PathBuf::from(safe_segment(service, AUDIT_PLACEHOLDER))
        .join(safe_segment(owner, AUDIT_PLACEHOLDER))
        .join(type_segment(object_type, AUDIT_PLACEHOLDER))
        .join(format!(
            "{}.{AUDIT_EXTENSION}",
            safe_segment(&name, AUDIT_PLACEHOLDER)
        ))
}
