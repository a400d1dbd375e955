use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

/// Helper to create a temp directory that is cleaned up on drop.
struct TempDir {
    path: PathBuf,
}

impl TempDir {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "catalog_snapshot_cli_test_{name}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&path);
        fs::create_dir_all(&path).expect("failed to create temp dir");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn join(&self, name: &str) -> PathBuf {
        self.path.join(name)
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn write_config(dir: &TempDir, yaml: &str) -> PathBuf {
    let config_dir = dir.join("config");
    fs::create_dir_all(&config_dir).expect("failed to create config dir");
    let path = config_dir.join("snapshot.yml");
    fs::write(&path, yaml).expect("failed to write config");
    path
}

fn run(args: &[&str], cwd: &Path) -> Output {
    Command::new(env!("CARGO_BIN_EXE_catalog-snapshot"))
        .args(args)
        .current_dir(cwd)
        .output()
        .expect("failed to spawn catalog-snapshot")
}

// ---------------------------------------------------------------------------
// Argument handling
// ---------------------------------------------------------------------------

#[test]
fn test_help_lists_subcommands() {
    let dir = TempDir::new("help");
    let out = run(&["--help"], dir.path());
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("snapshot"));
    assert!(stdout.contains("dry-run"));
}

#[test]
fn test_missing_subcommand_fails() {
    let dir = TempDir::new("nosub");
    let out = run(&[], dir.path());
    assert!(!out.status.success());
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[test]
fn test_default_config_missing() {
    let dir = TempDir::new("missing");
    let out = run(&["dry-run"], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.starts_with("error: failed to load config"), "stderr: {stderr}");
    assert!(stderr.contains("snapshot.yml"));
    assert!(out.stdout.is_empty());
}

#[test]
fn test_malformed_yaml() {
    let dir = TempDir::new("malformed");
    let path = write_config(&dir, "oracle: [unclosed\n");
    let out = run(&["snapshot", "--config", path.to_str().unwrap()], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("YAML error"), "stderr: {stderr}");
}

#[test]
fn test_invalid_discovery_mode() {
    let dir = TempDir::new("mode");
    let path = write_config(
        &dir,
        "oracle: { host: db, service_name: S, username: u, password: p }\nscope: { discovery_mode: bulk_only }\n",
    );
    let out = run(&["dry-run", "--config", path.to_str().unwrap()], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("discovery_mode"), "stderr: {stderr}");
    assert!(!dir.join("logs").exists());
}

// ---------------------------------------------------------------------------
// Extraction failure
// ---------------------------------------------------------------------------

#[test]
fn test_unreachable_database_fails_after_logging_starts() {
    let dir = TempDir::new("unreachable");
    let path = write_config(
        &dir,
        "oracle: { host: 127.0.0.1, port: 1, service_name: NOPE, username: u, password: p }\n\
         output: { snapshot_root: ../snapshots }\n",
    );
    let out = run(&["dry-run", "--config", path.to_str().unwrap()], dir.path());
    assert_eq!(out.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("error: extraction failed"), "stderr: {stderr}");

    let logs: Vec<_> = fs::read_dir(dir.join("logs"))
        .expect("logs directory created")
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(logs.len(), 1);
    assert!(logs[0].starts_with("catalog-snapshot-"));
    assert!(!dir.join("snapshots").exists());
}
