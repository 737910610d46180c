use kube::CustomResource;
use kube::core::ObjectMeta;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{HasResourceStatus, ResourceKind, ResourceStatus};

/// Pgpolicylog records that one policy was applied to one cluster
///
/// The record's existence is what makes repeated applies idempotent.
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "crunchydata.com",
    version = "v1",
    kind = "Pgpolicylog",
    plural = "pgpolicylogs",
    namespaced,
    status = "ResourceStatus",
    printcolumn = r#"{"name":"Policy", "type":"string", "jsonPath":".spec.policyname"}"#,
    printcolumn = r#"{"name":"Cluster", "type":"string", "jsonPath":".spec.clustername"}"#,
    printcolumn = r#"{"name":"Applied", "type":"string", "jsonPath":".spec.applydate"}"#
)]
pub struct PgpolicylogSpec {
    #[serde(rename = "policyname")]
    pub policy_name: String,

    #[serde(default)]
    pub status: String,

    /// RFC 3339 timestamp of the apply
    #[serde(rename = "applydate", default)]
    pub apply_date: String,

    #[serde(rename = "clustername")]
    pub cluster_name: String,

    #[serde(default)]
    pub username: String,
}

/// Name of the join record for a (policy, cluster) pair
pub fn policylog_name(policy: &str, cluster: &str) -> String {
    format!("{policy}-{cluster}")
}

impl Pgpolicylog {
    /// Build the join record for `policy` applied to `cluster`
    pub fn for_pair(
        policy: &str,
        cluster: &str,
        namespace: &str,
        username: &str,
        apply_date: String,
    ) -> Self {
        Pgpolicylog {
            metadata: ObjectMeta {
                name: Some(policylog_name(policy, cluster)),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            spec: PgpolicylogSpec {
                policy_name: policy.to_string(),
                status: "applied".to_string(),
                apply_date,
                cluster_name: cluster.to_string(),
                username: username.to_string(),
            },
            status: None,
        }
    }
}

impl HasResourceStatus for Pgpolicylog {
    const KIND: ResourceKind = ResourceKind::Policylog;

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
