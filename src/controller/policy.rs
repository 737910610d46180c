//! Applying SQL policies to clusters
//!
//! A policy counts as applied to a cluster once its `Pgpolicylog` join record
//! exists. That record is the only idempotency marker; two concurrent applies
//! of the same pair may race and one of the creates will fail.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::controller::Context;
use crate::controller::error::{Error, Result};
use crate::crd::{DEFAULT_STRATEGY, Pgpolicylog, policylog_name};

/// Label value marking a deployment as carrying a policy
pub const POLICY_LABEL_VALUE: &str = "pgpolicy";

/// Input of a policy apply
#[derive(Clone, Debug, Default)]
pub struct ApplyPolicyRequest {
    pub namespace: String,
    pub policies: Vec<String>,
    /// Label selector for target deployments; replicas are always excluded
    pub selector: String,
    /// Only report the targets
    pub dry_run: bool,
    /// Recorded on each join record
    pub username: String,
}

/// One (policy, cluster) pair
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyPair {
    pub policy: String,
    pub cluster: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyResults {
    /// Deployments matched by the selector
    pub targets: Vec<String>,
    /// Pairs whose join record was created by this apply
    pub applied: Vec<PolicyPair>,
    /// Pairs that were already applied
    pub skipped: Vec<PolicyPair>,
}

/// Selector matching primaries only
pub fn primary_selector(selector: &str) -> String {
    let selector = selector.trim();
    if selector.is_empty() {
        "!replica".to_string()
    } else {
        format!("{selector},!replica")
    }
}

#[instrument(skip(ctx, request), fields(namespace = %request.namespace, selector = %request.selector))]
pub async fn apply_policies(ctx: &Context, request: &ApplyPolicyRequest) -> Result<ApplyResults> {
    let namespace = request.namespace.as_str();

    for policy in &request.policies {
        if ctx.store.get_policy(namespace, policy).await?.is_none() {
            error!(policy = %policy, "Policy not found, cancelling request");
            return Err(Error::MissingPolicy(policy.clone()));
        }
        debug!(policy = %policy, "Policy validated");
    }

    let selector = primary_selector(&request.selector);
    let targets = ctx.store.list_deployments(namespace, &selector).await?;
    let mut results = ApplyResults {
        targets,
        ..Default::default()
    };

    if request.dry_run {
        info!(targets = ?results.targets, "Dry run, policies not applied");
        return Ok(results);
    }

    for cluster in &results.targets {
        for policy in &request.policies {
            let pair = PolicyPair {
                policy: policy.clone(),
                cluster: cluster.clone(),
            };
            let log_name = policylog_name(policy, cluster);

            match ctx.store.get_policylog(namespace, &log_name).await {
                Ok(Some(_)) => {
                    info!(policy = %policy, cluster = %cluster, "Policy already applied");
                    results.skipped.push(pair);
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    error!(policylog = %log_name, error = %e, "Failed to look up policy log");
                    continue;
                }
            }

            let record = Pgpolicylog::for_pair(
                policy,
                cluster,
                namespace,
                &request.username,
                Utc::now().to_rfc3339(),
            );
            if let Err(e) = ctx.store.create_policylog(namespace, &record).await {
                error!(policylog = %log_name, error = %e, "Failed to create policy log");
                continue;
            }
            info!(policylog = %log_name, "Created policy log");
            results.applied.push(pair);

            let labels = BTreeMap::from([(policy.clone(), POLICY_LABEL_VALUE.to_string())]);
            if let Err(e) = label_deployment(ctx, cluster, namespace, &labels).await {
                warn!(deployment = %cluster, error = %e, "Failed to label deployment");
            }
        }
    }

    Ok(results)
}

async fn label_deployment(
    ctx: &Context,
    deployment: &str,
    namespace: &str,
    labels: &BTreeMap<String, String>,
) -> Result<()> {
    let strategy = ctx.strategies.get(DEFAULT_STRATEGY)?;
    strategy
        .update_policy_labels(deployment, namespace, labels)
        .await
}
