//! Persisted audit watermarks.
//!
//! The state file is a JSON object mapping `"<SERVICE>::<PRINCIPAL>"` to the
//! highest audit id already exported. It is read once per run and replaced
//! whole, so a crash mid-save leaves the previous file intact.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{Span, warn};

use crate::atomic::write_atomic;
use crate::error::Result;

/// Watermark values keyed by service and principal.
pub type WatermarkMap = BTreeMap<String, i64>;

/// Builds the state key for a service and principal.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_store::watermark_key;
///
/// assert_eq!(watermark_key("orclpdb1", "reader"), "ORCLPDB1::READER");
/// ```
pub fn watermark_key(service: &str, principal: &str) -> String {
    format!(
        "{}::{}",
        service.trim().to_uppercase(),
        principal.trim().to_uppercase()
    )
}

/// File-backed watermark store.
#[derive(Debug, Clone)]
pub struct WatermarkStore {
    path: PathBuf,
    span: Span,
}

impl WatermarkStore {
    pub fn new(path: impl Into<PathBuf>, span: Span) -> Self {
        Self {
            path: path.into(),
            span,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the state file.
    ///
    /// A missing file is empty state. An unreadable or malformed file is
    /// logged and also treated as empty; entries whose value is not an
    /// integer are skipped.
    pub fn load(&self) -> WatermarkMap {
        let _guard = self.span.enter();
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return WatermarkMap::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Audit state file unreadable; starting from empty state");
                return WatermarkMap::new();
            }
        };
        let value: serde_json::Value = match serde_json::from_str(&raw) {
            Ok(value) => value,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "Audit state file malformed; starting from empty state");
                return WatermarkMap::new();
            }
        };
        let Some(object) = value.as_object() else {
            warn!(path = %self.path.display(), "Audit state file is not a JSON object; starting from empty state");
            return WatermarkMap::new();
        };

        object
            .iter()
            .filter_map(|(key, value)| {
                let parsed = value
                    .as_i64()
                    .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()));
                if parsed.is_none() {
                    warn!(key = %key, "Skipping non-integer audit watermark");
                }
                parsed.map(|id| (key.clone(), id))
            })
            .collect()
    }

    /// Replaces the state file with `state`.
    pub fn save(&self, state: &WatermarkMap) -> Result<()> {
        let mut json = serde_json::to_string_pretty(state)?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &Path) -> WatermarkStore {
        WatermarkStore::new(dir.join("state").join("audit.json"), Span::none())
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).load().is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let mut state = WatermarkMap::new();
        state.insert("B::USER".to_string(), 12);
        state.insert("A::USER".to_string(), 3);
        store.save(&state).unwrap();

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.find("A::USER").unwrap() < raw.find("B::USER").unwrap());
        assert_eq!(store.load(), state);
    }

    #[test]
    fn test_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(store.path(), "{not json").unwrap();
        assert!(store.load().is_empty());

        std::fs::write(store.path(), "[1, 2, 3]").unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn test_non_integer_values_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        std::fs::create_dir_all(store.path().parent().unwrap()).unwrap();
        std::fs::write(
            store.path(),
            r#"{"A::U": 5, "B::U": "7", "C::U": "x", "D::U": null}"#,
        )
        .unwrap();
        let state = store.load();
        assert_eq!(state.get("A::U"), Some(&5));
        assert_eq!(state.get("B::U"), Some(&7));
        assert_eq!(state.len(), 2);
    }
}
