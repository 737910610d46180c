pub mod config;
pub mod controller;
pub mod crd;
pub mod health;
pub mod provision;
pub mod resources;
pub mod watch;

pub use config::{Cli, Command, OperatorConfig};
pub use controller::{BackoffConfig, Context, Error, Result, StrategyRegistry};
pub use crd::{Pgbackup, Pgcluster, Pgpolicy, Pgpolicylog, Pgupgrade};
pub use health::{HealthState, Metrics};

use std::sync::Arc;

use k8s_openapi::api::batch::v1::Job;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use controller::{
    ClusterHandler, ProcessedMarker, ResourceStore, ServiceManager, UpgradeHandler,
    UpgradeJobHandler, VolumeProvisioner,
};
use crd::DEFAULT_STRATEGY;
use provision::{
    ImageTagVersionResolver, KubeResourceStore, KubeSecretManager, KubeServiceManager,
    PvcProvisioner, Strategy1,
};
use resources::upgrade_job_selector;
use watch::{Notification, ResourceHandler, WatchLoop, establish_with_retry, run_notification_sink};

/// Capacity of the cross-kind notification channel
const NOTIFICATION_BUFFER: usize = 256;

/// Helper to create a namespaced or cluster-wide API based on scope.
fn scoped_api<T>(client: Client, namespace: Option<&str>) -> Api<T>
where
    T: Resource<Scope = k8s_openapi::NamespaceResourceScope>,
    <T as Resource>::DynamicType: Default,
    T: Clone + DeserializeOwned + std::fmt::Debug,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Wire the Kubernetes-backed collaborators and the strategy table
pub fn build_context(
    client: Client,
    config: &OperatorConfig,
    health_state: Option<Arc<HealthState>>,
) -> Context {
    let timeout = config.api_timeout();
    let store: Arc<dyn ResourceStore> = Arc::new(KubeResourceStore::new(client.clone(), timeout));
    let volumes: Arc<dyn VolumeProvisioner> =
        Arc::new(PvcProvisioner::new(client.clone(), timeout));
    let services: Arc<dyn ServiceManager> =
        Arc::new(KubeServiceManager::new(client.clone(), timeout));

    let strategy1 = Strategy1::new(
        client.clone(),
        store.clone(),
        volumes.clone(),
        services.clone(),
        timeout,
    );
    let strategies = StrategyRegistry::new().with_strategy(DEFAULT_STRATEGY, Arc::new(strategy1));

    Context {
        store,
        volumes,
        secrets: Arc::new(KubeSecretManager::new(client, timeout)),
        services,
        versions: Arc::new(ImageTagVersionResolver),
        strategies: Arc::new(strategies),
        health_state,
    }
}

/// One watch loop together with the API and selectors it watches
struct WatchTask<K, H> {
    watch: WatchLoop<K, H>,
    api: Api<K>,
    config: WatcherConfig,
}

impl<K, H> WatchTask<K, H>
where
    K: Resource + Clone + std::fmt::Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default,
    H: ResourceHandler<K> + 'static,
{
    fn new(
        kind: &'static str,
        handler: H,
        api: Api<K>,
        config: WatcherConfig,
        settings: &OperatorConfig,
        ctx: &Context,
        tx: &mpsc::Sender<Notification>,
    ) -> Self {
        let mut watch = WatchLoop::new(kind, handler)
            .with_resync(settings.resync_period())
            .with_notifications(tx.clone());
        if let Some(ref state) = ctx.health_state {
            watch = watch.with_health_state(state.clone());
        }
        Self { watch, api, config }
    }

    async fn establish(
        &self,
        settings: &OperatorConfig,
        backoff: &BackoffConfig,
        shutdown: &CancellationToken,
    ) -> Result<()> {
        establish_with_retry(
            &self.api,
            self.watch.kind(),
            &self.config,
            settings.watch_establish_attempts,
            backoff,
            shutdown,
        )
        .await
    }

    fn spawn(self, tasks: &mut JoinSet<&'static str>, shutdown: &CancellationToken) {
        let kind = self.watch.kind();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            self.watch.run(self.api, self.config, shutdown).await;
            kind
        });
    }
}

/// Run every watch loop until `shutdown` fires or one of them stops
///
/// Each watch is probed before any loop starts; a watch that cannot be
/// established within the configured attempts aborts the whole operator.
pub async fn run_controllers(
    client: Client,
    ctx: Arc<Context>,
    settings: &OperatorConfig,
    shutdown: CancellationToken,
) -> Result<()> {
    let namespace = settings.namespace();
    info!(
        scope = namespace.unwrap_or("cluster-wide"),
        strategies = ?ctx.strategies,
        "Starting watch loops"
    );

    let (tx, rx) = mpsc::channel(NOTIFICATION_BUFFER);
    let all = WatcherConfig::default();
    let upgrade_jobs = WatcherConfig::default().labels(&upgrade_job_selector());

    let clusters = WatchTask::new(
        "Pgcluster",
        ClusterHandler::new(ctx.clone()),
        scoped_api::<Pgcluster>(client.clone(), namespace),
        all.clone(),
        settings,
        &ctx,
        &tx,
    );
    let backups = WatchTask::new(
        "Pgbackup",
        ProcessedMarker::<Pgbackup>::new(ctx.clone()),
        scoped_api::<Pgbackup>(client.clone(), namespace),
        all.clone(),
        settings,
        &ctx,
        &tx,
    );
    let upgrades = WatchTask::new(
        "Pgupgrade",
        UpgradeHandler::new(ctx.clone()),
        scoped_api::<Pgupgrade>(client.clone(), namespace),
        all.clone(),
        settings,
        &ctx,
        &tx,
    );
    let policies = WatchTask::new(
        "Pgpolicy",
        ProcessedMarker::<Pgpolicy>::new(ctx.clone()),
        scoped_api::<Pgpolicy>(client.clone(), namespace),
        all.clone(),
        settings,
        &ctx,
        &tx,
    );
    let policylogs = WatchTask::new(
        "Pgpolicylog",
        ProcessedMarker::<Pgpolicylog>::new(ctx.clone()),
        scoped_api::<Pgpolicylog>(client.clone(), namespace),
        all,
        settings,
        &ctx,
        &tx,
    );
    let jobs = WatchTask::new(
        "Job",
        UpgradeJobHandler::new(ctx.clone()),
        scoped_api::<Job>(client, namespace),
        upgrade_jobs,
        settings,
        &ctx,
        &tx,
    );
    drop(tx);

    let backoff = BackoffConfig::default();
    clusters.establish(settings, &backoff, &shutdown).await?;
    backups.establish(settings, &backoff, &shutdown).await?;
    upgrades.establish(settings, &backoff, &shutdown).await?;
    policies.establish(settings, &backoff, &shutdown).await?;
    policylogs.establish(settings, &backoff, &shutdown).await?;
    jobs.establish(settings, &backoff, &shutdown).await?;

    if shutdown.is_cancelled() {
        return Ok(());
    }
    if let Some(ref state) = ctx.health_state {
        state.set_ready(true).await;
    }

    let mut tasks = JoinSet::new();
    clusters.spawn(&mut tasks, &shutdown);
    backups.spawn(&mut tasks, &shutdown);
    upgrades.spawn(&mut tasks, &shutdown);
    policies.spawn(&mut tasks, &shutdown);
    policylogs.spawn(&mut tasks, &shutdown);
    jobs.spawn(&mut tasks, &shutdown);
    {
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            run_notification_sink(rx, shutdown).await;
            "notifications"
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(kind) if shutdown.is_cancelled() => info!(kind, "Watch loop stopped"),
            Ok(kind) => {
                warn!(kind, "Watch loop stopped unexpectedly, shutting down");
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Watch loop task panicked, shutting down");
                shutdown.cancel();
            }
        }
    }

    if let Some(ref state) = ctx.health_state {
        state.set_ready(false).await;
    }
    Ok(())
}
