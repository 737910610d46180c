use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::controller::backends::{DeleteOutcome, ResourceStore};
use crate::controller::error::Result;
use crate::controller::status::merge_patch_for_path;
use crate::crd::{
    Pgbackup, Pgcluster, Pgpolicy, Pgpolicylog, Pgupgrade, ResourceKind, ResourceStatus,
};
use crate::provision::{delete_tolerant, timed};
use crate::resources::FIELD_MANAGER;

/// Custom resource store backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeResourceStore {
    client: Client,
    timeout: Duration,
}

impl KubeResourceStore {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api<K>(&self, namespace: &str) -> Api<K>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn merge<K>(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        timed(
            "patch field",
            self.timeout,
            self.api::<K>(namespace)
                .patch(name, &params, &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }

    async fn merge_status<K>(&self, namespace: &str, name: &str, patch: &Value) -> Result<()>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        timed(
            "patch status",
            self.timeout,
            self.api::<K>(namespace)
                .patch_status(name, &PatchParams::default(), &Patch::Merge(patch)),
        )
        .await?;
        Ok(())
    }

    async fn delete_kind<K>(&self, namespace: &str, name: &str) -> Result<DeleteOutcome>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        delete_tolerant(&self.api::<K>(namespace), name, "delete resource", self.timeout).await
    }

    async fn get<K>(&self, namespace: &str, name: &str) -> Result<Option<K>>
    where
        K: Resource<Scope = k8s_openapi::NamespaceResourceScope>
            + Clone
            + DeserializeOwned
            + Debug,
        <K as Resource>::DynamicType: Default,
    {
        timed("get resource", self.timeout, self.api::<K>(namespace).get_opt(name)).await
    }
}

#[async_trait]
impl ResourceStore for KubeResourceStore {
    async fn patch_field(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        path: &str,
        value: Value,
    ) -> Result<()> {
        let patch = merge_patch_for_path(path, value)?;
        match kind {
            ResourceKind::Cluster => self.merge::<Pgcluster>(namespace, name, &patch).await,
            ResourceKind::Backup => self.merge::<Pgbackup>(namespace, name, &patch).await,
            ResourceKind::Upgrade => self.merge::<Pgupgrade>(namespace, name, &patch).await,
            ResourceKind::Policy => self.merge::<Pgpolicy>(namespace, name, &patch).await,
            ResourceKind::Policylog => self.merge::<Pgpolicylog>(namespace, name, &patch).await,
        }
    }

    async fn patch_status(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
        status: &ResourceStatus,
    ) -> Result<()> {
        let patch = json!({ "status": status });
        match kind {
            ResourceKind::Cluster => self.merge_status::<Pgcluster>(namespace, name, &patch).await,
            ResourceKind::Backup => self.merge_status::<Pgbackup>(namespace, name, &patch).await,
            ResourceKind::Upgrade => self.merge_status::<Pgupgrade>(namespace, name, &patch).await,
            ResourceKind::Policy => self.merge_status::<Pgpolicy>(namespace, name, &patch).await,
            ResourceKind::Policylog => {
                self.merge_status::<Pgpolicylog>(namespace, name, &patch).await
            }
        }
    }

    async fn delete(
        &self,
        kind: ResourceKind,
        namespace: &str,
        name: &str,
    ) -> Result<DeleteOutcome> {
        match kind {
            ResourceKind::Cluster => self.delete_kind::<Pgcluster>(namespace, name).await,
            ResourceKind::Backup => self.delete_kind::<Pgbackup>(namespace, name).await,
            ResourceKind::Upgrade => self.delete_kind::<Pgupgrade>(namespace, name).await,
            ResourceKind::Policy => self.delete_kind::<Pgpolicy>(namespace, name).await,
            ResourceKind::Policylog => self.delete_kind::<Pgpolicylog>(namespace, name).await,
        }
    }

    async fn get_cluster(&self, namespace: &str, name: &str) -> Result<Option<Pgcluster>> {
        self.get(namespace, name).await
    }

    async fn get_upgrade(&self, namespace: &str, name: &str) -> Result<Option<Pgupgrade>> {
        self.get(namespace, name).await
    }

    async fn get_policy(&self, namespace: &str, name: &str) -> Result<Option<Pgpolicy>> {
        self.get(namespace, name).await
    }

    async fn get_policylog(&self, namespace: &str, name: &str) -> Result<Option<Pgpolicylog>> {
        self.get(namespace, name).await
    }

    async fn create_policylog(&self, namespace: &str, log: &Pgpolicylog) -> Result<()> {
        timed(
            "create policylog",
            self.timeout,
            self.api::<Pgpolicylog>(namespace)
                .create(&PostParams::default(), log),
        )
        .await?;
        Ok(())
    }

    async fn list_deployments(&self, namespace: &str, selector: &str) -> Result<Vec<String>> {
        let params = ListParams::default().labels(selector);
        let deployments = timed(
            "list deployments",
            self.timeout,
            self.api::<Deployment>(namespace).list(&params),
        )
        .await?;
        Ok(deployments.items.iter().map(|d| d.name_any()).collect())
    }
}
