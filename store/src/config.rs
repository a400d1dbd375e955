//! Snapshot run configuration.
//!
//! Defines the YAML-serializable configuration that controls which database
//! is read, which objects are snapshotted, where files land, and how the
//! result is committed.
//!
//! # Example YAML
//!
//! ```yaml
//! oracle:
//!   host: db.example.internal
//!   port: 1521
//!   service_name: ORCLPDB1
//!   username: snapshot_reader
//!   password: secret
//! scope:
//!   include_schemas: [HR, SALES]
//!   object_types: [TABLE, VIEW, INDEX, PACKAGE, PACKAGE BODY]
//! output:
//!   snapshot_root: ../snapshots
//!   line_ending: LF
//! git:
//!   repo_path: ..
//!   branch: main
//!   auto_push: false
//! logs:
//!   retention_days: 14
//! audit:
//!   enabled: true
//!   table: DDL_AUDIT_LOG
//! ```
//!
//! Relative `snapshot_root`, `repo_path`, and `audit.root` resolve against
//! the directory holding the config file. A relative `audit.state_file`
//! resolves against the project root (see [`project_root`]).

use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use catalog_snapshot_core::{DEFAULT_OBJECT_TYPES, LineEnding, ObjectScope, is_valid_audit_table};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Default commit subject template.
pub const DEFAULT_COMMIT_TEMPLATE: &str = "snapshot: {timestamp}";

/// Default audit source table.
pub const DEFAULT_AUDIT_TABLE: &str = "DDL_AUDIT_LOG";

/// Database connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub service_name: String,
    pub username: String,
    pub password: String,
}

impl OracleConfig {
    /// Easy-connect string, `host:port/service_name`.
    pub fn connect_string(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.service_name)
    }
}

fn default_port() -> u16 {
    1521
}

/// Which objects are snapshotted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Discovery strategy. Only `hybrid` (bulk with per-object fallback) is
    /// supported.
    pub discovery_mode: String,
    /// Owners to snapshot. When non-empty, `exclude_schemas` is ignored.
    pub include_schemas: Vec<String>,
    pub exclude_schemas: Vec<String>,
    pub object_types: Vec<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            discovery_mode: "hybrid".to_string(),
            include_schemas: Vec::new(),
            exclude_schemas: Vec::new(),
            object_types: DEFAULT_OBJECT_TYPES.iter().map(|t| (*t).to_string()).collect(),
        }
    }
}

impl ScopeConfig {
    pub fn object_scope(&self) -> ObjectScope {
        ObjectScope::new(&self.object_types, &self.include_schemas, &self.exclude_schemas)
    }
}

/// Snapshot tree settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub snapshot_root: PathBuf,
    pub line_ending: LineEnding,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            snapshot_root: PathBuf::from("snapshots"),
            line_ending: LineEnding::Lf,
        }
    }
}

/// Version-control settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitConfig {
    /// Commit and push after a non-dry run.
    pub enabled: bool,
    pub repo_path: PathBuf,
    /// Required current branch, if any.
    pub branch: Option<String>,
    /// Commit subject; `{timestamp}` is replaced with the local run time.
    pub commit_message_template: String,
    pub auto_push: bool,
    pub remote: String,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            repo_path: PathBuf::from("."),
            branch: None,
            commit_message_template: DEFAULT_COMMIT_TEMPLATE.to_string(),
            auto_push: true,
            remote: "origin".to_string(),
        }
    }
}

/// Log retention settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogsConfig {
    pub retention_days: u32,
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self { retention_days: 30 }
    }
}

/// Audit export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub enabled: bool,
    /// Audit tree root; defaults to `<repo_path>/_audit`.
    pub root: Option<PathBuf>,
    pub table: String,
    pub state_file: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: None,
            table: DEFAULT_AUDIT_TABLE.to_string(),
            state_file: PathBuf::from(".audit_state.json"),
        }
    }
}

impl AuditConfig {
    /// The audit root, falling back to `<repo_path>/_audit`.
    pub fn root_or_default(&self, repo_path: &Path) -> PathBuf {
        self.root
            .clone()
            .unwrap_or_else(|| repo_path.join("_audit"))
    }
}

/// Top-level snapshot configuration.
///
/// # Examples
///
/// ```
/// use catalog_snapshot_store::AppConfig;
///
/// let yaml = r#"
/// oracle: { host: db, service_name: ORCL, username: u, password: p }
/// scope: { include_schemas: [hr] }
/// "#;
/// let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
/// config.validate().unwrap();
/// assert_eq!(config.oracle.connect_string(), "db:1521/ORCL");
/// assert!(config.object_scope().filter().admits("HR"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub oracle: OracleConfig,
    #[serde(default)]
    pub scope: ScopeConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub git: GitConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AppConfig {
    /// Loads, validates, and path-resolves configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::StoreError::IoError) if the file cannot be
    /// read, [`YamlError`](crate::StoreError::YamlError) if parsing fails, or
    /// [`InvalidConfig`](crate::StoreError::InvalidConfig) if a value is out
    /// of range.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = std::path::absolute(path.as_ref())?;
        let file = std::fs::File::open(&path)?;
        let reader = BufReader::new(file);
        let mut config: AppConfig = serde_yaml::from_reader(reader)?;
        config.normalize();
        config.validate()?;

        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        config.resolve_paths(&base, &project_root(&path));
        Ok(config)
    }

    /// Object scope derived from the `scope` section.
    pub fn object_scope(&self) -> ObjectScope {
        self.scope.object_scope()
    }

    /// Audit root, falling back to `<repo_path>/_audit`.
    pub fn audit_root(&self) -> PathBuf {
        self.audit.root_or_default(&self.git.repo_path)
    }

    /// Checks value constraints.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("oracle.host", &self.oracle.host),
            ("oracle.service_name", &self.oracle.service_name),
            ("oracle.username", &self.oracle.username),
        ] {
            if value.trim().is_empty() {
                return Err(StoreError::InvalidConfig(format!("{field} must not be empty")));
            }
        }
        if !self.scope.discovery_mode.trim().eq_ignore_ascii_case("hybrid") {
            return Err(StoreError::InvalidConfig(format!(
                "scope.discovery_mode must be 'hybrid', got '{}'",
                self.scope.discovery_mode
            )));
        }
        if self.logs.retention_days < 1 {
            return Err(StoreError::InvalidConfig(
                "logs.retention_days must be at least 1".to_string(),
            ));
        }
        let table = self.audit.table.trim();
        if !table.is_empty() && !is_valid_audit_table(table) {
            return Err(StoreError::InvalidConfig(format!(
                "audit.table contains invalid characters: '{table}'"
            )));
        }
        Ok(())
    }

    /// Trims, upper-cases, and defaults list and name fields.
    fn normalize(&mut self) {
        self.oracle.host = self.oracle.host.trim().to_string();
        self.oracle.service_name = self.oracle.service_name.trim().to_string();
        self.oracle.username = self.oracle.username.trim().to_string();
        for list in [
            &mut self.scope.include_schemas,
            &mut self.scope.exclude_schemas,
            &mut self.scope.object_types,
        ] {
            *list = list
                .iter()
                .map(|v| v.trim().to_uppercase())
                .filter(|v| !v.is_empty())
                .collect();
        }
        if self.scope.object_types.is_empty() {
            self.scope.object_types = ScopeConfig::default().object_types;
        }
        if self.git.remote.trim().is_empty() {
            self.git.remote = "origin".to_string();
        }
        if self.git.commit_message_template.trim().is_empty() {
            self.git.commit_message_template = DEFAULT_COMMIT_TEMPLATE.to_string();
        }
        self.git.branch = self
            .git
            .branch
            .as_deref()
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string);
        if self.audit.table.trim().is_empty() {
            self.audit.table = DEFAULT_AUDIT_TABLE.to_string();
        }
        self.audit.table = self.audit.table.trim().to_string();
    }

    fn resolve_paths(&mut self, base: &Path, project_root: &Path) {
        self.output.snapshot_root = resolve(base, &self.output.snapshot_root);
        self.git.repo_path = resolve(base, &self.git.repo_path);
        self.audit.root = self.audit.root.as_ref().map(|root| resolve(base, root));
        self.audit.state_file = resolve(project_root, &self.audit.state_file);
    }
}

/// Joins `path` onto `base` unless absolute, folding `.` and `..` lexically
/// so repository-relative paths can be derived by prefix.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    let mut resolved = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !resolved.pop() {
                    resolved.push(component);
                }
            }
            other => resolved.push(other),
        }
    }
    resolved
}

/// Project root for a config file path.
///
/// This is the parent of the config file's directory when that directory is
/// named `config`, and the config file's directory otherwise.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use catalog_snapshot_store::project_root;
///
/// assert_eq!(project_root(Path::new("/srv/snap/config/snapshot.yml")), Path::new("/srv/snap"));
/// assert_eq!(project_root(Path::new("/srv/snap/snapshot.yml")), Path::new("/srv/snap"));
/// ```
pub fn project_root(config_path: &Path) -> PathBuf {
    let dir = config_path.parent().unwrap_or_else(|| Path::new(""));
    let is_config_dir = dir
        .file_name()
        .map(|name| name.to_string_lossy().eq_ignore_ascii_case("config"))
        .unwrap_or(false);
    if is_config_dir {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}
