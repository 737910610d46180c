//! Strategy "1": one Deployment per cluster member
//!
//! The primary and each replica run in their own single-pod Deployment on
//! their own volume. Major upgrades run `pg_upgrade` in a Job between the old
//! and a freshly provisioned volume.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Service;
use kube::api::{ListParams, Patch, PatchParams};
use kube::{Api, Client, ResourceExt};
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument};

use crate::controller::backends::{
    DeleteOutcome, ResourceStore, ServiceFields, ServiceManager, VolumeProvisioner,
};
use crate::controller::error::Result;
use crate::controller::status::paths;
use crate::controller::strategy::{ClusterStrategy, ReplicaRequest};
use crate::crd::{Pgcluster, Pgupgrade, ResourceKind};
use crate::provision::{create_if_absent, delete_tolerant, timed};
use crate::resources::FIELD_MANAGER;
use crate::resources::common::{cluster_selector, image};
use crate::resources::deployment::{
    DATABASE_CONTAINER, DATABASE_IMAGE, DeploymentParams, MemberRole, generate_deployment,
};
use crate::resources::job::{generate_upgrade_job, upgrade_job_name};

/// Default provisioning strategy
pub struct Strategy1 {
    client: Client,
    store: Arc<dyn ResourceStore>,
    volumes: Arc<dyn VolumeProvisioner>,
    services: Arc<dyn ServiceManager>,
    timeout: Duration,
}

impl Strategy1 {
    pub fn new(
        client: Client,
        store: Arc<dyn ResourceStore>,
        volumes: Arc<dyn VolumeProvisioner>,
        services: Arc<dyn ServiceManager>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            store,
            volumes,
            services,
            timeout,
        }
    }

    fn deployments(&self, namespace: &str) -> Api<Deployment> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn create_deployment(&self, params: DeploymentParams<'_>) -> Result<()> {
        let deployment = generate_deployment(params);
        if create_if_absent(
            &self.deployments(params.namespace),
            &deployment,
            "create deployment",
            self.timeout,
        )
        .await?
        {
            info!(deployment = params.name, "Created deployment");
        } else {
            debug!(deployment = params.name, "Deployment already exists");
        }
        Ok(())
    }

    async fn cluster_deployments(&self, cluster: &str, namespace: &str) -> Result<Vec<String>> {
        let params = ListParams::default().labels(&cluster_selector(cluster));
        let list = timed(
            "list deployments",
            self.timeout,
            self.deployments(namespace).list(&params),
        )
        .await?;
        Ok(list.items.iter().map(|d| d.name_any()).collect())
    }

    async fn patch_deployment(&self, name: &str, namespace: &str, patch: Patch<Value>) -> Result<()> {
        let params = PatchParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        timed(
            "patch deployment",
            self.timeout,
            self.deployments(namespace).patch(name, &params, &patch),
        )
        .await?;
        Ok(())
    }

    async fn delete_deployment(&self, name: &str, namespace: &str) -> Result<DeleteOutcome> {
        delete_tolerant(
            &self.deployments(namespace),
            name,
            "delete deployment",
            self.timeout,
        )
        .await
    }
}

#[async_trait]
impl ClusterStrategy for Strategy1 {
    #[instrument(skip(self, cluster), fields(cluster = %cluster.spec.name))]
    async fn add_cluster(&self, cluster: &Pgcluster, namespace: &str, pvc_name: &str) -> Result<()> {
        let spec = &cluster.spec;
        let primary = ServiceFields {
            name: spec.name.clone(),
            cluster_name: spec.name.clone(),
            port: spec.port_number(),
        };
        self.services.ensure_service(&primary, namespace).await?;

        self.create_deployment(DeploymentParams {
            name: &spec.name,
            cluster,
            namespace,
            pvc_name,
            image_tag: &spec.ccp_image_tag,
            role: MemberRole::Primary,
        })
        .await
    }

    async fn create_replica(&self, request: ReplicaRequest<'_>) -> Result<()> {
        debug!(
            replica = request.replica_name,
            service = request.service_name,
            "Creating replica"
        );
        self.create_deployment(DeploymentParams {
            name: request.replica_name,
            cluster: request.cluster,
            namespace: request.namespace,
            pvc_name: request.pvc_name,
            image_tag: &request.cluster.spec.ccp_image_tag,
            role: MemberRole::Replica {
                clone: request.clone,
            },
        })
        .await
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster.spec.name))]
    async fn delete_cluster(&self, cluster: &Pgcluster, namespace: &str) -> Result<()> {
        let name = &cluster.spec.name;

        for deployment in self.cluster_deployments(name, namespace).await? {
            if let Err(e) = self.delete_deployment(&deployment, namespace).await {
                error!(deployment = %deployment, error = %e, "Failed to delete deployment");
            }
        }

        let services: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        for service in [name.clone(), cluster.spec.replica_service_name()] {
            match delete_tolerant(&services, &service, "delete service", self.timeout).await {
                Ok(DeleteOutcome::Deleted) => info!(service = %service, "Deleted service"),
                Ok(DeleteOutcome::NotFound) => {}
                Err(e) => error!(service = %service, error = %e, "Failed to delete service"),
            }
        }
        Ok(())
    }

    #[instrument(skip(self, cluster, upgrade), fields(cluster = %cluster.spec.name))]
    async fn minor_upgrade(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()> {
        let new_image = image(DATABASE_IMAGE, &upgrade.spec.ccp_image_tag);
        let patch = json!({
            "spec": {"template": {"spec": {"containers": [
                {"name": DATABASE_CONTAINER, "image": new_image}
            ]}}}
        });

        for deployment in self.cluster_deployments(&cluster.spec.name, namespace).await? {
            self.patch_deployment(&deployment, namespace, Patch::Strategic(patch.clone()))
                .await?;
            info!(deployment = %deployment, image = %new_image, "Updated image");
        }
        Ok(())
    }

    #[instrument(skip(self, cluster, upgrade), fields(cluster = %cluster.spec.name))]
    async fn major_upgrade(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()> {
        let name = &cluster.spec.name;
        let owner = format!("{name}-upgrade");
        let new_pvc = self
            .volumes
            .provision(&owner, &upgrade.spec.storage_spec, namespace)
            .await?;
        self.store
            .patch_field(
                ResourceKind::Upgrade,
                namespace,
                &upgrade.name_any(),
                paths::UPGRADE_NEW_PVC,
                Value::String(new_pvc.clone()),
            )
            .await?;

        self.delete_deployment(name, namespace).await?;

        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        let job = generate_upgrade_job(cluster, upgrade, &new_pvc, namespace);
        if create_if_absent(&jobs, &job, "create upgrade job", self.timeout).await? {
            info!(job = %upgrade_job_name(name), "Started upgrade job");
        }
        Ok(())
    }

    #[instrument(skip(self, cluster, upgrade), fields(cluster = %cluster.spec.name))]
    async fn major_upgrade_finalize(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()> {
        let name = &cluster.spec.name;
        let jobs: Api<Job> = Api::namespaced(self.client.clone(), namespace);
        delete_tolerant(&jobs, &upgrade_job_name(name), "delete upgrade job", self.timeout)
            .await?;

        self.delete_deployment(name, namespace).await?;
        self.create_deployment(DeploymentParams {
            name,
            cluster,
            namespace,
            pvc_name: &upgrade.spec.new_pvc_name,
            image_tag: &upgrade.spec.ccp_image_tag,
            role: MemberRole::Primary,
        })
        .await
    }

    #[instrument(skip(self, cluster), fields(cluster = %cluster.spec.name))]
    async fn prepare_clone(
        &self,
        clone_name: &str,
        cluster: &Pgcluster,
        namespace: &str,
    ) -> Result<()> {
        let pvc = self
            .volumes
            .provision(clone_name, &cluster.spec.replica_storage, namespace)
            .await?;
        self.create_replica(ReplicaRequest {
            service_name: clone_name,
            cluster,
            replica_name: clone_name,
            pvc_name: &pvc,
            namespace,
            clone: true,
        })
        .await
    }

    async fn update_policy_labels(
        &self,
        deployment_name: &str,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()> {
        let patch = json!({ "metadata": { "labels": labels } });
        self.patch_deployment(deployment_name, namespace, Patch::Merge(patch))
            .await
    }
}
