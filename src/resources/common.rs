//! Common utilities for Kubernetes resource generation
//!
//! Labels here are also the selectors the operator lists and deletes by, so
//! every generator goes through these helpers.

use std::collections::BTreeMap;

/// Operator field manager name for patches
pub const FIELD_MANAGER: &str = "pgcluster-operator";

/// Image repository prefix for database containers
pub const IMAGE_PREFIX: &str = "crunchydata";

/// Label keys set on generated resources
pub mod labels {
    /// Name of the owning cluster
    pub const CLUSTER: &str = "pg-cluster";
    /// Name of the owning cluster, on secrets
    pub const DATABASE: &str = "pg-database";
    /// Deployment or pod name
    pub const NAME: &str = "name";
    /// `true` on replica deployments
    pub const REPLICA: &str = "replica";
    /// `true` on major upgrade jobs
    pub const UPGRADE_JOB: &str = "pgupgrade";
    pub const VENDOR: &str = "vendor";
}

/// Generate standard labels for all resources belonging to a cluster
pub fn standard_labels(cluster_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (labels::CLUSTER.to_string(), cluster_name.to_string()),
        (labels::VENDOR.to_string(), "crunchydata".to_string()),
    ])
}

/// Labels of one cluster member deployment
///
/// User labels are merged in but never override the cluster identifier.
pub fn member_labels(
    cluster_name: &str,
    deployment_name: &str,
    replica: bool,
    user_labels: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut labels = standard_labels(cluster_name);
    for (key, value) in user_labels {
        if key != labels::CLUSTER {
            labels.insert(key.clone(), value.clone());
        }
    }
    labels.insert(labels::NAME.to_string(), deployment_name.to_string());
    labels.insert(labels::REPLICA.to_string(), replica.to_string());
    labels
}

/// Label selector matching every resource of a cluster
pub fn cluster_selector(cluster_name: &str) -> String {
    format!("{}={}", labels::CLUSTER, cluster_name)
}

/// Label selector matching the replica deployments of a cluster
pub fn replica_selector(cluster_name: &str) -> String {
    format!("{},{}=true", cluster_selector(cluster_name), labels::REPLICA)
}

/// Label selector matching major upgrade jobs
pub fn upgrade_job_selector() -> String {
    format!("{}=true", labels::UPGRADE_JOB)
}

/// Full image reference for a crunchy container
pub fn image(name: &str, tag: &str) -> String {
    format!("{IMAGE_PREFIX}/{name}:{tag}")
}
