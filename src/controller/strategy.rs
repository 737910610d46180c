//! Pluggable cluster provisioning strategies
//!
//! A strategy owns the mechanics of materializing a cluster (deployments,
//! services, jobs). Workflows pick one through the [`StrategyRegistry`], which
//! is built once at startup and never mutated afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::controller::error::{Error, Result};
use crate::crd::{DEFAULT_STRATEGY, Pgcluster, Pgupgrade};

/// Arguments for creating one replica
#[derive(Clone, Copy, Debug)]
pub struct ReplicaRequest<'a> {
    /// Service the replica registers behind
    pub service_name: &'a str,
    pub cluster: &'a Pgcluster,
    /// Unique deployment name of the replica
    pub replica_name: &'a str,
    pub pvc_name: &'a str,
    pub namespace: &'a str,
    /// Whether the replica seeds a clone rather than serving reads
    pub clone: bool,
}

/// Capability set every provisioning strategy implements
#[async_trait]
pub trait ClusterStrategy: Send + Sync {
    async fn add_cluster(&self, cluster: &Pgcluster, namespace: &str, pvc_name: &str)
    -> Result<()>;

    async fn create_replica(&self, request: ReplicaRequest<'_>) -> Result<()>;

    async fn delete_cluster(&self, cluster: &Pgcluster, namespace: &str) -> Result<()>;

    async fn minor_upgrade(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()>;

    async fn major_upgrade(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()>;

    async fn major_upgrade_finalize(
        &self,
        cluster: &Pgcluster,
        upgrade: &Pgupgrade,
        namespace: &str,
    ) -> Result<()>;

    async fn prepare_clone(
        &self,
        clone_name: &str,
        cluster: &Pgcluster,
        namespace: &str,
    ) -> Result<()>;

    async fn update_policy_labels(
        &self,
        deployment_name: &str,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> Result<()>;
}

/// Immutable mapping from strategy identifier to implementation
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn ClusterStrategy>>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a strategy under `id`, replacing any previous one
    pub fn with_strategy(mut self, id: impl Into<String>, strategy: Arc<dyn ClusterStrategy>) -> Self {
        self.strategies.insert(id.into(), strategy);
        self
    }

    /// Look up a strategy; an empty identifier means the default strategy
    pub fn get(&self, id: &str) -> Result<Arc<dyn ClusterStrategy>> {
        let id = if id.is_empty() { DEFAULT_STRATEGY } else { id };
        self.strategies
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownStrategy(id.to_string()))
    }

    /// Strategy selected by a cluster
    pub fn for_cluster(&self, cluster: &Pgcluster) -> Result<Arc<dyn ClusterStrategy>> {
        self.get(cluster.spec.effective_strategy())
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("strategies", &self.strategies.keys().collect::<Vec<_>>())
            .finish()
    }
}
