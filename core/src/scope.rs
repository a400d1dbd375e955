//! Object scope: which owners and object types a run snapshots.

use crate::types::{INDEX_TYPE, TABLE_TYPE};

/// Object types snapshotted when none are configured.
pub const DEFAULT_OBJECT_TYPES: &[&str] = &[
    "TABLE",
    "VIEW",
    "INDEX",
    "SEQUENCE",
    "SYNONYM",
    "TRIGGER",
    "TYPE",
    "TYPE BODY",
    "PROCEDURE",
    "FUNCTION",
    "PACKAGE",
    "PACKAGE BODY",
    "MATERIALIZED VIEW",
];

/// Owner filter applied during discovery.
///
/// A non-empty include list wins outright: the exclude list is ignored
/// rather than subtracted from it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SchemaFilter {
    /// Every owner visible to the session.
    #[default]
    All,
    /// Only the listed owners.
    Include(Vec<String>),
    /// Every owner except the listed ones.
    Exclude(Vec<String>),
}

impl SchemaFilter {
    /// Builds a filter from configured include and exclude lists.
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_snapshot_core::SchemaFilter;
    ///
    /// let filter = SchemaFilter::from_lists(&["hr".into()], &["HR".into(), "SYS".into()]);
    /// assert_eq!(filter, SchemaFilter::Include(vec!["HR".into()]));
    /// assert!(filter.admits("HR"));
    /// assert!(!filter.admits("SYS"));
    /// ```
    pub fn from_lists(include: &[String], exclude: &[String]) -> Self {
        let include = normalize_list(include);
        if !include.is_empty() {
            return SchemaFilter::Include(include);
        }
        let exclude = normalize_list(exclude);
        if !exclude.is_empty() {
            return SchemaFilter::Exclude(exclude);
        }
        SchemaFilter::All
    }

    /// Returns `true` if objects owned by `owner` are in scope.
    pub fn admits(&self, owner: &str) -> bool {
        let owner = owner.trim().to_uppercase();
        match self {
            SchemaFilter::All => true,
            SchemaFilter::Include(owners) => owners.contains(&owner),
            SchemaFilter::Exclude(owners) => !owners.contains(&owner),
        }
    }
}

/// The full discovery scope of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectScope {
    object_types: Vec<String>,
    filter: SchemaFilter,
}

impl ObjectScope {
    /// Creates a scope from an object-type allow-list and owner lists.
    ///
    /// An empty allow-list falls back to [`DEFAULT_OBJECT_TYPES`].
    pub fn new(object_types: &[String], include: &[String], exclude: &[String]) -> Self {
        let mut types = normalize_list(object_types);
        if types.is_empty() {
            types = DEFAULT_OBJECT_TYPES.iter().map(|t| (*t).to_string()).collect();
        }
        Self {
            object_types: types,
            filter: SchemaFilter::from_lists(include, exclude),
        }
    }

    /// The configured allow-list, upper-cased and de-duplicated.
    pub fn object_types(&self) -> &[String] {
        &self.object_types
    }

    pub fn filter(&self) -> &SchemaFilter {
        &self.filter
    }

    /// Returns `true` when indexes are folded into their table's bundle.
    pub fn bundles_indexes(&self) -> bool {
        self.allows(TABLE_TYPE) && self.allows(INDEX_TYPE)
    }

    /// Object types queried at top level.
    ///
    /// INDEX is dropped when tables are also in scope, since every index then
    /// lives inside its table's bundle.
    ///
    /// # Examples
    ///
    /// ```
    /// use catalog_snapshot_core::ObjectScope;
    ///
    /// let scope = ObjectScope::new(&["TABLE".into(), "INDEX".into(), "VIEW".into()], &[], &[]);
    /// assert_eq!(scope.discovery_types(), vec!["TABLE".to_string(), "VIEW".to_string()]);
    ///
    /// let scope = ObjectScope::new(&["INDEX".into()], &[], &[]);
    /// assert_eq!(scope.discovery_types(), vec!["INDEX".to_string()]);
    /// ```
    pub fn discovery_types(&self) -> Vec<String> {
        let bundles = self.bundles_indexes();
        self.object_types
            .iter()
            .filter(|t| !(bundles && t.as_str() == INDEX_TYPE))
            .cloned()
            .collect()
    }

    fn allows(&self, object_type: &str) -> bool {
        self.object_types.iter().any(|t| t == object_type)
    }
}

fn normalize_list(values: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for value in values {
        let item = value.trim().to_uppercase();
        if !item.is_empty() && !out.contains(&item) {
            out.push(item);
        }
    }
    out
}
