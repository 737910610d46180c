use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{
    COMPLETED_STATUS, HasResourceStatus, PgStorageSpec, ResourceKind, ResourceStatus,
};

/// Pgupgrade is the Schema for the pgupgrades API
///
/// An upgrade shares its name with the cluster it targets and is deleted
/// together with that cluster.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "crunchydata.com",
    version = "v1",
    kind = "Pgupgrade",
    plural = "pgupgrades",
    shortname = "pgu",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".spec.upgradetype"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".spec.upgradestatus"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct PgupgradeSpec {
    /// Name of the target cluster
    pub name: String,

    #[serde(rename = "resourcetype", default)]
    pub resource_type: String,

    /// `minor` or `major`
    #[serde(rename = "upgradetype", default)]
    pub upgrade_type: String,

    /// `submitted` until the upgrade finishes, then `completed`
    #[serde(rename = "upgradestatus", default)]
    pub upgrade_status: String,

    #[serde(rename = "storagespec", default)]
    pub storage_spec: PgStorageSpec,

    /// Image tag the cluster is upgraded to
    #[serde(rename = "ccpimagetag", default)]
    pub ccp_image_tag: String,

    #[serde(rename = "olddatabasename", default)]
    pub old_database_name: String,

    #[serde(rename = "newdatabasename", default)]
    pub new_database_name: String,

    #[serde(rename = "oldversion", default)]
    pub old_version: String,

    #[serde(rename = "newversion", default)]
    pub new_version: String,

    #[serde(rename = "oldpvcname", default)]
    pub old_pvc_name: String,

    #[serde(rename = "newpvcname", default)]
    pub new_pvc_name: String,

    #[serde(rename = "backuppvcname", default)]
    pub backup_pvc_name: String,
}

impl PgupgradeSpec {
    pub fn is_completed(&self) -> bool {
        self.upgrade_status == COMPLETED_STATUS
    }
}

/// Upgrade kinds understood by the upgrade workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpgradeType {
    Minor,
    Major,
}

impl UpgradeType {
    /// Parse a declared upgrade type; anything but `minor`/`major` is rejected
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "minor" => Some(UpgradeType::Minor),
            "major" => Some(UpgradeType::Major),
            _ => None,
        }
    }
}

impl std::fmt::Display for UpgradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeType::Minor => write!(f, "minor"),
            UpgradeType::Major => write!(f, "major"),
        }
    }
}

impl HasResourceStatus for Pgupgrade {
    const KIND: ResourceKind = ResourceKind::Upgrade;

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
