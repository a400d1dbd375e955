//! Catalog discovery: resolve the object scope into an ordered object list.

use std::collections::BTreeMap;
use std::path::PathBuf;

use catalog_snapshot_core::{
    CatalogError, DbObjectRef, MetadataCatalog, ObjectFailure, ObjectScope, snapshot_relative_path,
};
use tracing::{Span, info, warn};

/// Objects to extract, plus those set aside before extraction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Discovery {
    /// In-scope objects ordered by `(owner, type, name)`.
    pub objects: Vec<DbObjectRef>,
    /// Objects whose snapshot path is already taken by an earlier object.
    pub collisions: Vec<ObjectFailure>,
}

/// Resolves an [`ObjectScope`] against a catalog session.
#[derive(Debug, Clone)]
pub struct Discoverer {
    span: Span,
}

impl Discoverer {
    pub fn new(span: Span) -> Self {
        Self { span }
    }

    /// Lists every in-scope object, ordered by `(owner, type, name)`.
    ///
    /// The type allow-list and owner filter are re-applied to whatever the
    /// catalog returns, so INDEX never appears standalone while tables are in
    /// scope and excluded owners never leak through. Rows repeating the same
    /// object collapse into one. Distinct objects that sanitize to the same
    /// snapshot path cannot both be written: the first in order is kept and
    /// each later one is reported in [`Discovery::collisions`]. An empty
    /// result is logged as a warning, not treated as an error.
    pub fn discover<C: MetadataCatalog>(
        &self,
        catalog: &mut C,
        scope: &ObjectScope,
    ) -> Result<Discovery, CatalogError> {
        let _guard = self.span.enter();
        let types = scope.discovery_types();
        let filter = scope.filter();

        let mut found: Vec<DbObjectRef> = catalog
            .discover(&types, filter)?
            .into_iter()
            .filter(|obj| types.iter().any(|t| t == obj.object_type()))
            .filter(|obj| filter.admits(obj.owner()))
            .collect();
        found.sort();
        found.dedup();

        let mut discovery = Discovery::default();
        let mut claimed: BTreeMap<PathBuf, DbObjectRef> = BTreeMap::new();
        for object in found {
            let path = snapshot_relative_path(&object);
            if let Some(owner) = claimed.get(&path) {
                warn!(object = %object, kept = %owner, path = %path.display(), "Snapshot path collision");
                discovery.collisions.push(ObjectFailure {
                    reason: format!(
                        "snapshot path {} already used by {owner}",
                        path.display()
                    ),
                    object,
                });
            } else {
                claimed.insert(path, object.clone());
                discovery.objects.push(object);
            }
        }

        if discovery.objects.is_empty() {
            warn!(object_types = ?types, filter = ?filter, "No objects discovered for the configured scope");
        } else {
            info!(count = discovery.objects.len(), "Discovered objects");
        }
        Ok(discovery)
    }
}
