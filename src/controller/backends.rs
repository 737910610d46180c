//! Collaborator interfaces consumed by the reconciliation engine
//!
//! The workflows in this crate only talk to the outside world through these
//! traits. Production implementations backed by the Kubernetes API live in
//! [`crate::provision`]; tests substitute in-memory fakes.

use async_trait::async_trait;
use serde_json::Value;

use crate::controller::error::Result;
use crate::crd::{
    PgStorageSpec, Pgcluster, Pgpolicy, Pgpolicylog, Pgupgrade, ResourceKind, ResourceStatus,
};

/// Outcome of a delete that tolerates missing objects
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// Remote store for the operator's custom resources
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Set `value` at the JSON pointer `path` of the named object
    async fn patch_field(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        path: &str,
        value: Value,
    ) -> Result<()>;

    /// Replace the status subresource of the named object
    async fn patch_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: &ResourceStatus,
    ) -> Result<()>;

    /// Delete the named object; a missing object is reported, not an error
    async fn delete(&self, kind: ResourceKind, namespace: &str, name: &str)
    -> Result<DeleteOutcome>;

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Pgcluster>>;

    async fn get_upgrade(&self, namespace: &str, name: &str) -> Result<Option<Pgupgrade>>;

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<Option<Pgpolicy>>;

    async fn get_policylog(&self, namespace: &str, name: &str) -> Result<Option<Pgpolicylog>>;

    async fn create_policylog(&self, namespace: &str, log: &Pgpolicylog) -> Result<()>;

    /// Names of deployments matching a label selector
    async fn list_deployments(&self, namespace: &str, selector: &str) -> Result<Vec<String>>;
}

/// Provisions persistent volumes for cluster members
#[async_trait]
pub trait VolumeProvisioner: Send + Sync {
    /// Provision a volume for `owner` and return the assigned volume name
    async fn provision(
        &self,
        owner: &str,
        storage: &PgStorageSpec,
        namespace: &str,
    ) -> Result<String>;
}

/// Materializes and removes database credentials
#[async_trait]
pub trait SecretManager: Send + Sync {
    async fn create_cluster_secrets(&self, cluster: &Pgcluster, namespace: &str) -> Result<()>;

    async fn delete_cluster_secrets(&self, owner: &str, namespace: &str) -> Result<()>;

    /// Read the password stored in an existing secret
    async fn fetch_password(&self, namespace: &str, secret_name: &str) -> Result<String>;
}

/// Fields of a cluster-facing service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceFields {
    pub name: String,
    pub cluster_name: String,
    pub port: i32,
}

/// Creates cluster services
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Create the service unless it already exists
    async fn ensure_service(&self, fields: &ServiceFields, namespace: &str) -> Result<()>;
}

/// Maps an image tag to a full database version
pub trait VersionResolver: Send + Sync {
    fn resolve_full_version(&self, image_tag: &str) -> String;
}
