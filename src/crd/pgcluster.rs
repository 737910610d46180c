use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::common::{
    COMPLETED_STATUS, HasResourceStatus, PgStorageSpec, ResourceKind, ResourceStatus,
};

/// Strategy used when a cluster does not name one
pub const DEFAULT_STRATEGY: &str = "1";

/// Marker placed between a cluster name and a replica's random suffix
pub const REPLICA_SUFFIX: &str = "-replica";

/// Suffix of the secret holding the superuser password
pub const PGROOT_SECRET_SUFFIX: &str = "-postgres-secret";
/// Suffix of the secret holding the application user password
pub const PGUSER_SECRET_SUFFIX: &str = "-testuser-secret";
/// Suffix of the secret holding the replication user password
pub const PGMASTER_SECRET_SUFFIX: &str = "-primaryuser-secret";

/// Pgcluster is the Schema for the pgclusters API
///
/// Most fields are strings because they are declared by the CLI front end and
/// persisted verbatim; the operator parses what it needs (e.g. `replicas`).
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "crunchydata.com",
    version = "v1",
    kind = "Pgcluster",
    plural = "pgclusters",
    shortname = "pgc",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Replicas", "type":"string", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.postgresfullversion"}"#,
    printcolumn = r#"{"name":"Status", "type":"string", "jsonPath":".spec.status"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
pub struct PgclusterSpec {
    /// Cluster name; also the name of the primary deployment and service
    pub name: String,

    #[serde(rename = "clustername", default)]
    pub cluster_name: String,

    /// Comma separated policies to apply at creation time
    #[serde(default)]
    pub policies: String,

    /// Container image tag (e.g. "centos7-9.6.5-1.6.0")
    #[serde(rename = "ccpimagetag", default)]
    pub ccp_image_tag: String,

    /// Full PostgreSQL version resolved from the image tag (set by the operator)
    #[serde(rename = "postgresfullversion", default)]
    pub postgres_full_version: String,

    #[serde(default)]
    pub port: String,

    /// Node to pin the primary to
    #[serde(rename = "nodename", default)]
    pub node_name: String,

    #[serde(rename = "masterstorage", default)]
    pub master_storage: PgStorageSpec,

    #[serde(rename = "replicastorage", default)]
    pub replica_storage: PgStorageSpec,

    #[serde(rename = "pgmasterhost", default)]
    pub pg_master_host: String,

    #[serde(rename = "pgmasteruser", default)]
    pub pg_master_user: String,

    #[serde(rename = "pgmasterpassword", default)]
    pub pg_master_password: String,

    #[serde(rename = "pguser", default)]
    pub pg_user: String,

    #[serde(rename = "pgpassword", default)]
    pub pg_password: String,

    #[serde(rename = "pgdatabase", default)]
    pub pg_database: String,

    #[serde(rename = "pgrootpassword", default)]
    pub pg_root_password: String,

    /// Desired replica count, kept as declared
    #[serde(default)]
    pub replicas: String,

    /// Strategy identifier; empty means [`DEFAULT_STRATEGY`]
    #[serde(default)]
    pub strategy: String,

    /// Prefix of existing secrets to copy credentials from
    #[serde(rename = "secretfrom", default)]
    pub secret_from: String,

    #[serde(rename = "backuppvcname", default)]
    pub backup_pvc_name: String,

    #[serde(rename = "backuppath", default)]
    pub backup_path: String,

    #[serde(rename = "pgusersecretname", default)]
    pub pguser_secret_name: String,

    #[serde(rename = "pgrootsecretname", default)]
    pub pgroot_secret_name: String,

    #[serde(rename = "pgmastersecretname", default)]
    pub pgmaster_secret_name: String,

    /// Lifecycle marker; [`COMPLETED_STATUS`] once the cluster has been provisioned
    #[serde(default)]
    pub status: String,

    #[serde(rename = "pswlastupdate", default)]
    pub psw_last_update: String,

    #[serde(rename = "userlabels", default)]
    pub user_labels: BTreeMap<String, String>,
}

impl PgclusterSpec {
    /// Strategy identifier with the default applied
    pub fn effective_strategy(&self) -> &str {
        if self.strategy.is_empty() {
            DEFAULT_STRATEGY
        } else {
            &self.strategy
        }
    }

    /// Whether the cluster has already been provisioned
    pub fn is_completed(&self) -> bool {
        self.status == COMPLETED_STATUS
    }

    /// Name of the service fronting the replicas
    pub fn replica_service_name(&self) -> String {
        format!("{}{}", self.name, REPLICA_SUFFIX)
    }

    /// Port as declared, falling back to the PostgreSQL default
    pub fn port_number(&self) -> i32 {
        self.port.parse().unwrap_or(5432)
    }
}

impl HasResourceStatus for Pgcluster {
    const KIND: ResourceKind = ResourceKind::Cluster;

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
