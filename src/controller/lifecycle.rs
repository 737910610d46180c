//! Cluster lifecycle workflows: create, delete, update and clone
//!
//! Each workflow is a best-effort sequence of remote calls. Nothing is rolled
//! back: a volume provisioned before a later step fails stays provisioned and
//! is picked up again on the next delivery.

use tracing::{debug, error, info, instrument, warn};

use crate::controller::Context;
use crate::controller::backends::DeleteOutcome;
use crate::controller::error::{Error, Result};
use crate::controller::scale::{ScalePlan, parse_replica_count, replica_names, scale_replicas};
use crate::controller::status::{StatusPatcher, paths};
use crate::crd::{
    COMPLETED_STATUS, PGMASTER_SECRET_SUFFIX, PGROOT_SECRET_SUFFIX, PGUSER_SECRET_SUFFIX,
    Pgcluster, ResourceKind,
};
use crate::resources::replica_selector;

/// Provision a newly observed cluster
#[instrument(skip(ctx, cluster), fields(cluster = %cluster.spec.name))]
pub async fn add_cluster(ctx: &Context, cluster: &Pgcluster, namespace: &str) -> Result<()> {
    if cluster.spec.is_completed() {
        info!("Cluster already marked completed, will not recreate");
        return Ok(());
    }

    let name = cluster.spec.name.as_str();
    let pvc_name = ctx
        .volumes
        .provision(name, &cluster.spec.master_storage, namespace)
        .await?;
    debug!(pvc = %pvc_name, "Provisioned primary volume");

    // Credentials are resolved onto a private copy; the cached object stays untouched
    let mut cluster = cluster.clone();
    if !cluster.spec.secret_from.is_empty() {
        resolve_credentials(ctx, &mut cluster, namespace).await?;
    }

    ctx.secrets
        .create_cluster_secrets(&cluster, namespace)
        .await?;

    let strategy = ctx.strategies.for_cluster(&cluster)?;
    info!(strategy = cluster.spec.effective_strategy(), "Using cluster strategy");

    let patcher = StatusPatcher::new(ctx.store.as_ref(), namespace);
    let full_version = ctx
        .versions
        .resolve_full_version(&cluster.spec.ccp_image_tag);
    patcher
        .set_logged(ResourceKind::Cluster, name, paths::FULL_VERSION, &full_version)
        .await;
    cluster.spec.postgres_full_version = full_version;

    let outcome = strategy.add_cluster(&cluster, namespace, &pvc_name).await;
    if let Err(ref e) = outcome {
        error!(error = %e, "Strategy failed to add cluster");
    } else if let Err(e) = create_initial_replicas(ctx, &cluster, namespace).await {
        error!(error = %e, "Failed to create initial replicas");
    }

    patcher
        .set_logged(
            ResourceKind::Cluster,
            name,
            paths::CLUSTER_STATUS,
            COMPLETED_STATUS,
        )
        .await;
    patcher
        .set_logged(ResourceKind::Cluster, name, paths::PRIMARY_PVC, &pvc_name)
        .await;
    if let Err(e) = patcher
        .mark_processed(
            ResourceKind::Cluster,
            name,
            "Successfully processed Pgcluster by controller",
        )
        .await
    {
        warn!(error = %e, "Failed to update cluster status");
    }

    outcome
}

/// Bring a new cluster up to its declared replica count
///
/// Replicas that already exist are counted first, so a redelivered add event
/// only creates the ones still missing.
async fn create_initial_replicas(ctx: &Context, cluster: &Pgcluster, namespace: &str) -> Result<()> {
    let declared = cluster.spec.replicas.trim();
    if declared.is_empty() {
        return Ok(());
    }
    let wanted = parse_replica_count(declared)? as usize;
    if wanted == 0 {
        return Ok(());
    }

    let existing = ctx
        .store
        .list_deployments(namespace, &replica_selector(&cluster.spec.name))
        .await?
        .len();
    let missing = wanted.saturating_sub(existing);
    if missing == 0 {
        debug!(existing, "Initial replicas already present");
        return Ok(());
    }

    let names = replica_names(&cluster.spec.name, missing, &mut rand::rng());
    let report = scale_replicas(ctx, cluster, names, namespace).await?;
    info!(
        created = report.created.len(),
        failed = report.failed.len(),
        existing,
        "Created initial replicas"
    );
    Ok(())
}

/// Fetch all three passwords from the cluster's external secret source
///
/// Either every password is resolved or the cluster is left unchanged.
async fn resolve_credentials(ctx: &Context, cluster: &mut Pgcluster, namespace: &str) -> Result<()> {
    let source = cluster.spec.secret_from.as_str();
    let fetch = |suffix: &'static str| {
        let secret_name = format!("{source}{suffix}");
        async move {
            ctx.secrets
                .fetch_password(namespace, &secret_name)
                .await
                .map_err(|e| Error::CredentialResolution(format!("{secret_name}: {e}")))
        }
    };

    let (root, user, master) = futures::try_join!(
        fetch(PGROOT_SECRET_SUFFIX),
        fetch(PGUSER_SECRET_SUFFIX),
        fetch(PGMASTER_SECRET_SUFFIX),
    )?;

    cluster.spec.pg_root_password = root;
    cluster.spec.pg_password = user;
    cluster.spec.pg_master_password = master;
    Ok(())
}

/// Tear down a deleted cluster, making as much progress as possible
#[instrument(skip(ctx, cluster), fields(cluster = %cluster.spec.name))]
pub async fn delete_cluster(ctx: &Context, cluster: &Pgcluster, namespace: &str) -> Result<()> {
    let strategy = ctx.strategies.for_cluster(cluster)?;
    let name = cluster.spec.name.as_str();

    if let Err(e) = ctx.secrets.delete_cluster_secrets(name, namespace).await {
        warn!(error = %e, "Failed to delete cluster secrets");
    }

    if let Err(e) = strategy.delete_cluster(cluster, namespace).await {
        error!(error = %e, "Strategy failed to delete cluster");
    }

    match ctx.store.delete(ResourceKind::Upgrade, namespace, name).await {
        Ok(DeleteOutcome::Deleted) => info!("Deleted pgupgrade"),
        Ok(DeleteOutcome::NotFound) => debug!("No pgupgrade to delete"),
        Err(e) => error!(error = %e, "Failed to delete pgupgrade"),
    }

    Ok(())
}

/// React to a spec change; only replica count changes are acted upon
#[instrument(skip(ctx, old, new), fields(cluster = %new.spec.name))]
pub async fn update_cluster(
    ctx: &Context,
    old: &Pgcluster,
    new: &Pgcluster,
    namespace: &str,
) -> Result<()> {
    if old.spec.replicas == new.spec.replicas {
        return Ok(());
    }

    debug!(
        from = %old.spec.replicas,
        to = %new.spec.replicas,
        "Detected replica count change"
    );

    match ScalePlan::compute(&old.spec.replicas, &new.spec.replicas)? {
        ScalePlan::Unchanged => {
            info!("Scaling to the same number of replicas does nothing");
            Ok(())
        }
        ScalePlan::Up { delta } => {
            let names = replica_names(&new.spec.name, delta, &mut rand::rng());
            let report = scale_replicas(ctx, new, names, namespace).await?;
            info!(
                created = report.created.len(),
                failed = report.failed.len(),
                "Scaled up replicas"
            );
            Ok(())
        }
    }
}

/// Seed a clone of `cluster` named `clone_name`
#[instrument(skip(ctx, cluster), fields(cluster = %cluster.spec.name))]
pub async fn prepare_clone(
    ctx: &Context,
    cluster: &Pgcluster,
    clone_name: &str,
    namespace: &str,
) -> Result<()> {
    let strategy = ctx.strategies.for_cluster(cluster)?;
    strategy.prepare_clone(clone_name, cluster, namespace).await
}
