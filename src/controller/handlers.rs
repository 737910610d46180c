//! Watch loop handlers for every kind the operator observes

use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::batch::v1::Job;
use kube::{Resource, ResourceExt};
use tracing::{debug, warn};

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::controller::lifecycle::{add_cluster, delete_cluster, update_cluster};
use crate::controller::status::StatusPatcher;
use crate::controller::upgrade::{add_upgrade, finalize_major_upgrade};
use crate::crd::{HasResourceStatus, Pgcluster, Pgupgrade, ResourceKind};
use crate::resources::common::labels;
use crate::watch::ResourceHandler;

fn namespace_of<K: ResourceExt>(obj: &K) -> Result<String> {
    obj.namespace()
        .ok_or(Error::MissingObjectKey("metadata.namespace"))
}

/// Run a workflow and record its outcome
async fn run_workflow<F>(ctx: &Context, workflow: &str, fut: F) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let start = Instant::now();
    let result = fut.await;
    ctx.record_workflow(workflow, start.elapsed().as_secs_f64(), result.is_ok());
    result
}

/// Drives the cluster lifecycle
pub struct ClusterHandler {
    ctx: Arc<Context>,
}

impl ClusterHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ResourceHandler<Pgcluster> for ClusterHandler {
    async fn on_add(&self, cluster: &Pgcluster) -> Result<()> {
        let namespace = namespace_of(cluster)?;
        run_workflow(
            &self.ctx,
            "add_cluster",
            add_cluster(&self.ctx, cluster, &namespace),
        )
        .await
    }

    async fn on_update(&self, old: &Pgcluster, new: &Pgcluster) -> Result<()> {
        if old.spec.replicas == new.spec.replicas {
            return Ok(());
        }
        let namespace = namespace_of(new)?;
        run_workflow(
            &self.ctx,
            "update_cluster",
            update_cluster(&self.ctx, old, new, &namespace),
        )
        .await
    }

    async fn on_delete(&self, cluster: &Pgcluster) -> Result<()> {
        let namespace = namespace_of(cluster)?;
        run_workflow(
            &self.ctx,
            "delete_cluster",
            delete_cluster(&self.ctx, cluster, &namespace),
        )
        .await
    }
}

/// Marks upgrades processed and runs the upgrade workflow
pub struct UpgradeHandler {
    ctx: Arc<Context>,
}

impl UpgradeHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl ResourceHandler<Pgupgrade> for UpgradeHandler {
    async fn on_add(&self, upgrade: &Pgupgrade) -> Result<()> {
        let namespace = namespace_of(upgrade)?;
        let name = upgrade.name_any();

        if !upgrade.is_processed() {
            let patcher = StatusPatcher::new(self.ctx.store.as_ref(), &namespace);
            if let Err(e) = patcher
                .mark_processed(
                    ResourceKind::Upgrade,
                    &name,
                    "Successfully processed Pgupgrade by controller",
                )
                .await
            {
                warn!(upgrade = %name, error = %e, "Failed to update upgrade status");
            }
        }

        if upgrade.spec.is_completed() {
            debug!(upgrade = %name, "Upgrade already completed");
            return Ok(());
        }

        let Some(cluster) = self
            .ctx
            .store
            .get_cluster(&namespace, &upgrade.spec.name)
            .await?
        else {
            warn!(upgrade = %name, cluster = %upgrade.spec.name, "Target cluster not found");
            return Ok(());
        };

        run_workflow(
            &self.ctx,
            "add_upgrade",
            add_upgrade(&self.ctx, upgrade, &cluster, &namespace),
        )
        .await
    }
}

/// Finalizes a major upgrade once its job has succeeded
pub struct UpgradeJobHandler {
    ctx: Arc<Context>,
}

impl UpgradeJobHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn finalize_if_succeeded(&self, job: &Job) -> Result<()> {
        let succeeded = job
            .status
            .as_ref()
            .and_then(|s| s.succeeded)
            .unwrap_or(0);
        if succeeded < 1 {
            return Ok(());
        }

        let namespace = namespace_of(job)?;
        let Some(cluster_name) = job.labels().get(labels::CLUSTER) else {
            debug!(job = %job.name_any(), "Upgrade job has no cluster label");
            return Ok(());
        };

        let Some(upgrade) = self.ctx.store.get_upgrade(&namespace, cluster_name).await? else {
            debug!(cluster = %cluster_name, "No upgrade for finished job");
            return Ok(());
        };
        if upgrade.spec.is_completed() {
            return Ok(());
        }

        let Some(cluster) = self.ctx.store.get_cluster(&namespace, cluster_name).await? else {
            warn!(cluster = %cluster_name, "Cluster for finished upgrade job not found");
            return Ok(());
        };

        run_workflow(
            &self.ctx,
            "finalize_major_upgrade",
            finalize_major_upgrade(&self.ctx, &upgrade, &cluster, &namespace),
        )
        .await
    }
}

#[async_trait]
impl ResourceHandler<Job> for UpgradeJobHandler {
    async fn on_add(&self, job: &Job) -> Result<()> {
        self.finalize_if_succeeded(job).await
    }

    async fn on_update(&self, _old: &Job, new: &Job) -> Result<()> {
        self.finalize_if_succeeded(new).await
    }
}

/// Moves newly observed objects to `Processed`
///
/// Used for kinds the operator observes without driving them.
pub struct ProcessedMarker<K> {
    ctx: Arc<Context>,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ProcessedMarker<K> {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            ctx,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<K> ResourceHandler<K> for ProcessedMarker<K>
where
    K: Resource<DynamicType = ()> + HasResourceStatus + Send + Sync,
{
    async fn on_add(&self, obj: &K) -> Result<()> {
        if obj.is_processed() {
            return Ok(());
        }
        let namespace = namespace_of(obj)?;
        let message = format!("Successfully processed {} by controller", K::kind(&()));
        StatusPatcher::new(self.ctx.store.as_ref(), &namespace)
            .mark_processed(K::KIND, &obj.name_any(), &message)
            .await
    }
}
