use std::sync::Arc;

use crate::controller::backends::{
    ResourceStore, SecretManager, ServiceManager, VersionResolver, VolumeProvisioner,
};
use crate::controller::strategy::StrategyRegistry;
use crate::health::HealthState;

/// Shared context for every workflow
#[derive(Clone)]
pub struct Context {
    /// Custom resource store
    pub store: Arc<dyn ResourceStore>,
    pub volumes: Arc<dyn VolumeProvisioner>,
    pub secrets: Arc<dyn SecretManager>,
    pub services: Arc<dyn ServiceManager>,
    pub versions: Arc<dyn VersionResolver>,
    /// Strategy table, built once at startup
    pub strategies: Arc<StrategyRegistry>,
    /// Health state for recording metrics (optional)
    pub health_state: Option<Arc<HealthState>>,
}

impl Context {
    /// Record the outcome of a workflow run
    pub fn record_workflow(&self, workflow: &str, duration_secs: f64, succeeded: bool) {
        if let Some(ref state) = self.health_state {
            state.metrics.record_workflow(workflow, duration_secs, succeeded);
        }
    }

    pub fn record_replica_provisioned(&self, namespace: &str, cluster: &str) {
        if let Some(ref state) = self.health_state {
            state.metrics.record_replica(namespace, cluster);
        }
    }
}
