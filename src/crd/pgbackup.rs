use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{HasResourceStatus, PgStorageSpec, ResourceKind, ResourceStatus};

/// Pgbackup is the Schema for the pgbackups API
///
/// The operator only records that a backup request was observed; running the
/// backup itself belongs to the backup job.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "crunchydata.com",
    version = "v1",
    kind = "Pgbackup",
    plural = "pgbackups",
    shortname = "pgb",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.backuphost"}"#,
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
pub struct PgbackupSpec {
    pub name: String,

    #[serde(rename = "storagespec", default)]
    pub storage_spec: PgStorageSpec,

    #[serde(rename = "ccpimagetag", default)]
    pub ccp_image_tag: String,

    #[serde(rename = "backuphost", default)]
    pub backup_host: String,

    #[serde(rename = "backupuser", default)]
    pub backup_user: String,

    #[serde(rename = "backuppass", default)]
    pub backup_pass: String,

    #[serde(rename = "backupport", default)]
    pub backup_port: String,

    #[serde(rename = "backupstatus", default)]
    pub backup_status: String,
}

impl HasResourceStatus for Pgbackup {
    const KIND: ResourceKind = ResourceKind::Backup;

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
