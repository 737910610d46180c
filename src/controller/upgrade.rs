//! Upgrade workflows
//!
//! Minor upgrades complete in one pass. Major upgrades run in two phases: the
//! strategy starts an upgrade job, and [`finalize_major_upgrade`] runs once
//! that job has succeeded.

use tracing::{info, instrument, warn};

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::controller::status::{StatusPatcher, paths};
use crate::crd::{Pgcluster, Pgupgrade, ResourceKind, UpgradeType};

/// Run the first (or only) phase of an upgrade against `cluster`
#[instrument(skip(ctx, upgrade, cluster), fields(cluster = %cluster.spec.name, upgrade_type = %upgrade.spec.upgrade_type))]
pub async fn add_upgrade(
    ctx: &Context,
    upgrade: &Pgupgrade,
    cluster: &Pgcluster,
    namespace: &str,
) -> Result<()> {
    let strategy = ctx.strategies.for_cluster(cluster)?;
    let patcher = StatusPatcher::new(ctx.store.as_ref(), namespace);

    let upgrade_type = UpgradeType::parse(&upgrade.spec.upgrade_type)
        .ok_or_else(|| Error::UnsupportedUpgradeType(upgrade.spec.upgrade_type.clone()))?;

    match upgrade_type {
        UpgradeType::Minor => {
            strategy.minor_upgrade(cluster, upgrade, namespace).await?;
            patcher.mark_upgrade_completed(&upgrade.spec.name).await?;
        }
        UpgradeType::Major => {
            strategy.major_upgrade(cluster, upgrade, namespace).await?;
        }
    }

    info!("Updating the database version after upgrade");
    let full_version = ctx
        .versions
        .resolve_full_version(&upgrade.spec.ccp_image_tag);
    patcher
        .set_logged(
            ResourceKind::Cluster,
            &upgrade.spec.name,
            paths::FULL_VERSION,
            &full_version,
        )
        .await;

    Ok(())
}

/// Second phase of a major upgrade
///
/// An upgrade already marked completed is left alone, so a redelivered job
/// event does not recreate the primary twice.
#[instrument(skip(ctx, upgrade, cluster), fields(cluster = %cluster.spec.name))]
pub async fn finalize_major_upgrade(
    ctx: &Context,
    upgrade: &Pgupgrade,
    cluster: &Pgcluster,
    namespace: &str,
) -> Result<()> {
    if upgrade.spec.is_completed() {
        info!("Upgrade already completed, skipping finalize");
        return Ok(());
    }

    let strategy = ctx.strategies.for_cluster(cluster)?;
    strategy
        .major_upgrade_finalize(cluster, upgrade, namespace)
        .await?;

    let patcher = StatusPatcher::new(ctx.store.as_ref(), namespace);
    patcher.mark_upgrade_completed(&upgrade.spec.name).await?;
    if let Err(e) = patcher
        .set_primary_pvc(&cluster.spec.name, &upgrade.spec.new_pvc_name)
        .await
    {
        warn!(error = %e, "Failed to record upgraded primary volume");
    }

    Ok(())
}
