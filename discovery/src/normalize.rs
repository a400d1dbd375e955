//! Deterministic DDL normalization.
//!
//! Strips environment-specific physical clauses (storage, tablespace,
//! partition instances) and canonicalizes whitespace and line endings so the
//! same logical object produces byte-identical snapshot text in every
//! environment.
//!
//! The cleanup steps run until the text stops changing before the final
//! line-ending conversion. Every step only removes characters, so this
//! terminates, and it makes `normalize` idempotent even when one removal
//! exposes another.
//!
//! # Example
//!
//! ```
//! use catalog_snapshot_core::LineEnding;
//! use catalog_snapshot_discovery::normalize::DdlNormalizer;
//!
//! let normalizer = DdlNormalizer::new(LineEnding::Lf);
//! let ddl = "CREATE TABLE T1 (ID NUMBER)\r\n  STORAGE(INITIAL 64K NEXT 1M)  TABLESPACE \"USERS\" ;  \r\n\r\n\r\n";
//! assert_eq!(normalizer.normalize(ddl), "CREATE TABLE T1 (ID NUMBER) ;\n");
//! ```

use std::sync::LazyLock;

use catalog_snapshot_core::LineEnding;
use regex::Regex;

static STORAGE_OPEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+STORAGE\s*\(").expect("static regex must compile")
});

static TABLESPACE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\s+TABLESPACE\s+(?:"[^"]+"|[A-Z0-9_$#]+)"#)
        .expect("static regex must compile")
});

/// Normalizes DDL text for one configured line-ending style.
#[derive(Debug, Clone, Copy, Default)]
pub struct DdlNormalizer {
    line_ending: LineEnding,
}

impl DdlNormalizer {
    pub fn new(line_ending: LineEnding) -> Self {
        Self { line_ending }
    }

    pub fn line_ending(&self) -> LineEnding {
        self.line_ending
    }

    /// Normalizes `ddl`. Empty or whitespace-only input yields `""`.
    pub fn normalize(&self, ddl: &str) -> String {
        let mut text = unify_line_endings(ddl);
        loop {
            let next = cleanup_pass(&text);
            if next == text {
                break;
            }
            text = next;
        }
        match self.line_ending {
            LineEnding::Lf => text,
            LineEnding::Crlf => text.replace('\n', "\r\n"),
        }
    }
}

fn unify_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn cleanup_pass(text: &str) -> String {
    let text = strip_storage_clauses(text);
    let text = TABLESPACE_CLAUSE.replace_all(&text, "");
    let text = strip_partition_instances(&text);
    let text = compact_lines(&text);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

/// Removes `STORAGE (...)` clauses, matching the clause's own closing paren
/// by depth. A clause without a matching close is left in place.
fn strip_storage_clauses(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;
    while let Some(found) = STORAGE_OPEN.find_at(text, cursor) {
        let open = found.end() - 1;
        match closing_paren(text, open) {
            Some(close) => {
                out.push_str(&text[cursor..found.start()]);
                cursor = close + 1;
            }
            None => {
                out.push_str(&text[cursor..found.end()]);
                cursor = found.end();
            }
        }
    }
    out.push_str(&text[cursor..]);
    out
}

/// Byte offset of the paren closing the one at `open`.
fn closing_paren(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (offset, byte) in text.as_bytes()[open..].iter().enumerate() {
        match byte {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn is_partition_instance(line: &str) -> bool {
    let upper = line.trim_start().to_uppercase();
    if upper.starts_with("PARTITION BY") || upper.starts_with("SUBPARTITION BY") {
        return false;
    }
    upper.starts_with("PARTITION ") || upper.starts_with("SUBPARTITION ")
}

fn paren_delta(line: &str) -> i64 {
    line.chars().fold(0, |acc, c| match c {
        '(' => acc + 1,
        ')' => acc - 1,
        _ => acc,
    })
}

/// Drops partition and subpartition instance lines, keeping `PARTITION BY`
/// headers. A skipped region runs until parens balance on a line that does
/// not end in a comma.
fn strip_partition_instances(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    let mut skipping = false;
    let mut depth: i64 = 0;

    for line in text.split('\n') {
        if !skipping && is_partition_instance(line) {
            skipping = true;
            depth = 0;
        }
        if skipping {
            depth += paren_delta(line);
            if depth <= 0 && !line.trim_end().ends_with(',') {
                skipping = false;
                depth = 0;
            }
            continue;
        }
        kept.push(line);
    }
    kept.join("\n")
}

/// Right-trims lines and collapses runs of blank lines to one.
fn compact_lines(text: &str) -> String {
    let mut out: Vec<&str> = Vec::new();
    let mut previous_blank = false;
    for line in text.split('\n') {
        let line = line.trim_end();
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        out.push(line);
        previous_blank = blank;
    }
    out.join("\n")
}
