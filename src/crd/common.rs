//! Types shared by every custom resource kind
//!
//! All five kinds carry the same `{state, message}` status subresource and
//! describe storage with the same [`PgStorageSpec`].

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// API group for all custom resources managed by the operator
pub const API_GROUP: &str = "crunchydata.com";

/// API version for all custom resources managed by the operator
pub const API_VERSION: &str = "crunchydata.com/v1";

/// Sub-status value marking a cluster or upgrade as finished
pub const COMPLETED_STATUS: &str = "completed";

/// Sub-status value of a freshly submitted upgrade
pub const SUBMITTED_STATUS: &str = "submitted";

/// Lifecycle state recorded in the status subresource
#[derive(Serialize, Deserialize, Clone, Copy, Debug, JsonSchema, Default, PartialEq, Eq)]
pub enum ResourceState {
    /// Declared by a user, not yet seen by the operator
    #[default]
    Created,
    /// Observed and handled by the operator
    Processed,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Created => write!(f, "Created"),
            ResourceState::Processed => write!(f, "Processed"),
        }
    }
}

/// Status subresource shared by all kinds
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub struct ResourceStatus {
    #[serde(default)]
    pub state: ResourceState,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ResourceStatus {
    pub fn processed(message: impl Into<String>) -> Self {
        Self {
            state: ResourceState::Processed,
            message: message.into(),
        }
    }
}

/// How a volume for a cluster member is obtained
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageType {
    /// Create a PVC without an explicit storage class
    Create,
    /// Create a PVC bound through the requested storage class
    Dynamic,
    /// Reuse the PVC named in `pvcname`
    Existing,
    /// No persistent volume; the pod uses an emptyDir
    EmptyDir,
}

impl StorageType {
    /// Parse the declared storage type; empty or unknown values mean [`StorageType::Create`]
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "dynamic" => StorageType::Dynamic,
            "existing" => StorageType::Existing,
            "emptydir" => StorageType::EmptyDir,
            _ => StorageType::Create,
        }
    }
}

/// Storage request for a primary, replica, backup or upgrade volume
#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq)]
pub struct PgStorageSpec {
    /// Name of the PVC assigned to this volume (set by the operator)
    #[serde(rename = "pvcname", default)]
    pub pvc_name: String,

    #[serde(rename = "storageclass", default)]
    pub storage_class: String,

    /// Access mode (e.g. "ReadWriteOnce")
    #[serde(rename = "accessmode", default)]
    pub access_mode: String,

    /// Requested size (e.g. "1G")
    #[serde(default)]
    pub size: String,

    /// One of `create`, `dynamic`, `existing`, `emptydir`
    #[serde(rename = "storagetype", default)]
    pub storage_type: String,

    #[serde(rename = "fsgroup", default)]
    pub fs_group: String,

    #[serde(rename = "supplementalgroups", default)]
    pub supplemental_groups: String,
}

impl PgStorageSpec {
    pub fn storage_type(&self) -> StorageType {
        StorageType::parse(&self.storage_type)
    }
}

/// Resource kinds stored by the operator's custom resource store
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Cluster,
    Backup,
    Upgrade,
    Policy,
    Policylog,
}

impl ResourceKind {
    /// REST plural used by the API server
    pub fn plural(&self) -> &'static str {
        match self {
            ResourceKind::Cluster => "pgclusters",
            ResourceKind::Backup => "pgbackups",
            ResourceKind::Upgrade => "pgupgrades",
            ResourceKind::Policy => "pgpolicies",
            ResourceKind::Policylog => "pgpolicylogs",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.plural())
    }
}

/// Access to the status subresource common to every kind
pub trait HasResourceStatus {
    /// Kind used when patching this object through the resource store
    const KIND: ResourceKind;

    fn resource_status(&self) -> Option<&ResourceStatus>;

    fn is_processed(&self) -> bool {
        self.resource_status()
            .is_some_and(|s| s.state == ResourceState::Processed)
    }
}
