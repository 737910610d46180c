//! Targeted field updates for custom resources
//!
//! Workflows never rewrite whole objects. Each update sets a single field by
//! JSON pointer, which the store applies as a merge patch nesting the value
//! under the pointer's segments.

use serde_json::{Map, Value};
use tracing::warn;

use crate::controller::backends::ResourceStore;
use crate::controller::error::{Error, Result};
use crate::crd::{COMPLETED_STATUS, ResourceKind, ResourceStatus};

/// Patch paths written by the operator
pub mod paths {
    /// Cluster lifecycle marker
    pub const CLUSTER_STATUS: &str = "/spec/status";
    /// Resolved database version
    pub const FULL_VERSION: &str = "/spec/postgresfullversion";
    /// Volume assigned to the primary
    pub const PRIMARY_PVC: &str = "/spec/masterstorage/pvcname";
    /// Upgrade sub-status
    pub const UPGRADE_STATUS: &str = "/spec/upgradestatus";
    /// Volume provisioned for the upgraded data directory
    pub const UPGRADE_NEW_PVC: &str = "/spec/newpvcname";
}

/// Build a merge patch that sets `value` at the JSON pointer `path`
///
/// Missing parents are created and sibling fields are left untouched.
pub fn merge_patch_for_path(path: &str, value: Value) -> Result<Value> {
    let Some(rest) = path.strip_prefix('/') else {
        return Err(Error::InvalidPatchPath(path.to_string()));
    };

    let segments: Vec<String> = rest
        .split('/')
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect();
    if segments.iter().any(String::is_empty) {
        return Err(Error::InvalidPatchPath(path.to_string()));
    }

    Ok(segments.into_iter().rev().fold(value, |inner, key| {
        let mut map = Map::new();
        map.insert(key, inner);
        Value::Object(map)
    }))
}

/// Issues the field-level patches used by the workflows
#[derive(Clone, Copy)]
pub struct StatusPatcher<'a> {
    store: &'a dyn ResourceStore,
    namespace: &'a str,
}

impl<'a> StatusPatcher<'a> {
    pub fn new(store: &'a dyn ResourceStore, namespace: &'a str) -> Self {
        Self { store, namespace }
    }

    pub async fn set_primary_pvc(&self, cluster: &str, pvc_name: &str) -> Result<()> {
        self.set(ResourceKind::Cluster, cluster, paths::PRIMARY_PVC, pvc_name)
            .await
    }

    pub async fn mark_upgrade_completed(&self, upgrade: &str) -> Result<()> {
        self.set(
            ResourceKind::Upgrade,
            upgrade,
            paths::UPGRADE_STATUS,
            COMPLETED_STATUS,
        )
        .await
    }

    /// Move the status subresource to `Processed`
    pub async fn mark_processed(&self, kind: ResourceKind, name: &str, message: &str) -> Result<()> {
        self.store
            .patch_status(kind, self.namespace, name, &ResourceStatus::processed(message))
            .await
    }

    /// Like [`Self::set`] for callers that only log failures
    pub async fn set_logged(&self, kind: ResourceKind, name: &str, path: &str, value: &str) {
        if let Err(e) = self.set(kind, name, path, value).await {
            warn!(%kind, name, path, error = %e, "Failed to patch field");
        }
    }

    async fn set(&self, kind: ResourceKind, name: &str, path: &str, value: &str) -> Result<()> {
        self.store
            .patch_field(kind, self.namespace, name, path, Value::String(value.to_string()))
            .await
    }
}
