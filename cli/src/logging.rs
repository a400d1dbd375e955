//! Subscriber construction and log retention.
//!
//! Logs go to stderr and to a daily file under `<project_root>/logs`.
//! `RUST_LOG` overrides the default `info` filter.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use catalog_snapshot_store::project_root;
use chrono::Local;
use tracing::warn;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// File name prefix shared by every run log.
pub const LOG_FILE_PREFIX: &str = "catalog-snapshot-";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Log directory for a config file.
pub fn logs_dir(config_path: &Path) -> PathBuf {
    project_root(config_path).join("logs")
}

/// Today's log file in `logs_dir`.
pub fn daily_log_file(logs_dir: &Path) -> PathBuf {
    logs_dir.join(format!(
        "{LOG_FILE_PREFIX}{}.log",
        Local::now().format("%Y%m%d")
    ))
}

/// Installs the global subscriber, appending to `log_file`.
pub fn init_logging(log_file: &Path) -> Result<(), String> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create log directory {}: {e}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(|e| format!("failed to open log file {}: {e}", log_file.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|e| format!("failed to initialize logging: {e}"))
}

/// Deletes run logs older than `retention_days`, returning how many went.
///
/// Only files named `catalog-snapshot-*.log` are considered. Deletion
/// failures are logged and skipped.
pub fn purge_old_logs(logs_dir: &Path, retention_days: u32, now: SystemTime) -> usize {
    if retention_days < 1 {
        return 0;
    }
    let Ok(entries) = fs::read_dir(logs_dir) else {
        return 0;
    };
    let max_age = Duration::from_secs(u64::from(retention_days) * SECONDS_PER_DAY);

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if !(name.starts_with(LOG_FILE_PREFIX) && name.ends_with(".log")) {
            continue;
        }
        let expired = entry
            .metadata()
            .and_then(|meta| meta.modified())
            .map(|modified| now.duration_since(modified).is_ok_and(|age| age > max_age));
        match expired {
            Ok(true) => match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "Failed to delete old log file")
                }
            },
            Ok(false) => {}
            Err(err) => warn!(path = %path.display(), error = %err, "Failed to inspect log file"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(path: &Path, age_days: u64) {
        let file = fs::File::create(path).unwrap();
        let mtime = SystemTime::now() - Duration::from_secs(age_days * SECONDS_PER_DAY);
        file.set_modified(mtime).unwrap();
    }

    #[test]
    fn test_logs_dir_under_project_root() {
        assert_eq!(
            logs_dir(Path::new("/srv/snap/config/snapshot.yml")),
            PathBuf::from("/srv/snap/logs")
        );
        assert_eq!(
            logs_dir(Path::new("/srv/snap/snapshot.yml")),
            PathBuf::from("/srv/snap/logs")
        );
    }

    #[test]
    fn test_daily_log_file_name() {
        let path = daily_log_file(Path::new("/logs"));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(LOG_FILE_PREFIX));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), LOG_FILE_PREFIX.len() + 8 + 4);
    }

    #[test]
    fn test_purge_removes_only_expired_run_logs() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("catalog-snapshot-20200101.log"), 40);
        touch(&dir.path().join("catalog-snapshot-20240101.log"), 2);
        touch(&dir.path().join("other-20200101.log"), 40);
        touch(&dir.path().join("catalog-snapshot-notes.txt"), 40);

        let removed = purge_old_logs(dir.path(), 30, SystemTime::now());
        assert_eq!(removed, 1);
        assert!(!dir.path().join("catalog-snapshot-20200101.log").exists());
        assert!(dir.path().join("catalog-snapshot-20240101.log").exists());
        assert!(dir.path().join("other-20200101.log").exists());
        assert!(dir.path().join("catalog-snapshot-notes.txt").exists());
    }

    #[test]
    fn test_purge_missing_dir_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(purge_old_logs(&dir.path().join("nope"), 30, SystemTime::now()), 0);
    }
}
