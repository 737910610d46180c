//! Replica scale-up
//!
//! Only growth is supported. Each new replica gets a random lowercase suffix,
//! its own volume and a deployment created through the cluster's strategy.

use std::cmp::Ordering;
use std::collections::HashSet;

use rand::Rng;
use tracing::{debug, error, instrument};

use crate::controller::Context;
use crate::controller::backends::ServiceFields;
use crate::controller::error::{Error, Result};
use crate::controller::strategy::ReplicaRequest;
use crate::crd::{Pgcluster, REPLICA_SUFFIX};

/// Length of the random suffix appended to replica names
pub const SUFFIX_LEN: usize = 4;

/// Largest replica count the operator acts on
pub const MAX_REPLICAS: u32 = 100;

const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz";

/// What a replica count change asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalePlan {
    Unchanged,
    Up { delta: usize },
}

impl ScalePlan {
    /// Compare the observed and desired replica counts
    ///
    /// Unparseable or out-of-range counts and scale-down are errors; none of
    /// them mutates anything.
    pub fn compute(old: &str, new: &str) -> Result<Self> {
        let from = i64::from(parse_replica_count(old)?);
        let to = i64::from(parse_replica_count(new)?);

        match to.cmp(&from) {
            Ordering::Less => Err(Error::ScaleDownUnsupported { from, to }),
            Ordering::Equal => Ok(ScalePlan::Unchanged),
            Ordering::Greater => Ok(ScalePlan::Up {
                delta: (to - from) as usize,
            }),
        }
    }
}

/// Parse a declared replica count, bounded by [`MAX_REPLICAS`]
pub fn parse_replica_count(value: &str) -> Result<u32> {
    let count = value
        .parse::<i64>()
        .map_err(|source| Error::InvalidReplicaCount {
            value: value.to_string(),
            source,
        })?;
    match u32::try_from(count) {
        Ok(count) if count <= MAX_REPLICAS => Ok(count),
        _ => Err(Error::ReplicaCountOutOfRange {
            value: value.to_string(),
            max: MAX_REPLICAS,
        }),
    }
}

/// Random suffix of `len` lowercase ASCII letters
pub fn replica_suffix<R: Rng + ?Sized>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}

/// Deployment name of a replica: `<cluster>-replica-<suffix>`
pub fn replica_name(cluster: &str, suffix: &str) -> String {
    format!("{cluster}{REPLICA_SUFFIX}-{suffix}")
}

/// Generate `count` replica names that are distinct within the batch
pub fn replica_names<R: Rng + ?Sized>(cluster: &str, count: usize, rng: &mut R) -> Vec<String> {
    let capacity = count.min(MAX_REPLICAS as usize);
    let mut seen = HashSet::with_capacity(capacity);
    let mut names = Vec::with_capacity(capacity);
    // Bounded so an absurd count cannot spin forever once the suffix space is exhausted
    let mut attempts = count.saturating_mul(8);

    while names.len() < count && attempts > 0 {
        attempts -= 1;
        let name = replica_name(cluster, &replica_suffix(rng, SUFFIX_LEN));
        if seen.insert(name.clone()) {
            names.push(name);
        }
    }
    names
}

/// Outcome of a scale-up
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScaleReport {
    /// Replicas whose volume and deployment were created
    pub created: Vec<String>,
    /// Replicas that failed; later replicas were still attempted
    pub failed: Vec<String>,
}

/// Create one replica per entry in `names`
///
/// The replica service is ensured first and its failure aborts the scale-up.
/// After that every replica is attempted independently.
#[instrument(skip(ctx, cluster, names), fields(cluster = %cluster.spec.name, count = names.len()))]
pub async fn scale_replicas(
    ctx: &Context,
    cluster: &Pgcluster,
    names: Vec<String>,
    namespace: &str,
) -> Result<ScaleReport> {
    let service = ServiceFields {
        name: cluster.spec.replica_service_name(),
        cluster_name: cluster.spec.name.clone(),
        port: cluster.spec.port_number(),
    };
    ctx.services.ensure_service(&service, namespace).await?;

    let strategy = ctx.strategies.for_cluster(cluster)?;
    let mut report = ScaleReport::default();

    for name in names {
        let pvc_name = match ctx
            .volumes
            .provision(&name, &cluster.spec.replica_storage, namespace)
            .await
        {
            Ok(pvc) => pvc,
            Err(e) => {
                error!(replica = %name, error = %e, "Failed to provision replica volume");
                report.failed.push(name);
                continue;
            }
        };

        let request = ReplicaRequest {
            service_name: &service.name,
            cluster,
            replica_name: &name,
            pvc_name: &pvc_name,
            namespace,
            clone: false,
        };
        match strategy.create_replica(request).await {
            Ok(()) => {
                debug!(replica = %name, pvc = %pvc_name, "Created replica");
                ctx.record_replica_provisioned(namespace, &cluster.spec.name);
                report.created.push(name);
            }
            Err(e) => {
                error!(replica = %name, error = %e, "Failed to create replica");
                report.failed.push(name);
            }
        }
    }

    Ok(report)
}
