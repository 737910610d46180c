use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::common::{HasResourceStatus, ResourceKind, ResourceStatus};

/// Pgpolicy is the Schema for the pgpolicies API
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "crunchydata.com",
    version = "v1",
    kind = "Pgpolicy",
    plural = "pgpolicies",
    shortname = "pgp",
    namespaced,
    status = "ResourceStatus"
)]
pub struct PgpolicySpec {
    pub name: String,

    /// Location the SQL was fetched from, if any
    #[serde(default)]
    pub url: String,

    #[serde(default)]
    pub sql: String,

    #[serde(default)]
    pub status: String,
}

impl HasResourceStatus for Pgpolicy {
    const KIND: ResourceKind = ResourceKind::Policy;

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref()
    }
}
