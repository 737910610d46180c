//! Deployment generation for primaries and replicas
//!
//! Every member runs a single `crunchy-postgres` container. Credentials are
//! injected from the cluster's secrets, never inlined.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec, DeploymentStrategy};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EmptyDirVolumeSource, EnvVar, EnvVarSource,
    PersistentVolumeClaimVolumeSource, PodSecurityContext, PodSpec, PodTemplateSpec,
    SecretKeySelector, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use kube::core::ObjectMeta;

use crate::crd::{PgStorageSpec, Pgcluster};
use crate::resources::common::{image, labels, member_labels};
use crate::resources::secret::{PASSWORD_KEY, USERNAME_KEY, cluster_secret_names};

/// Name of the database container
pub const DATABASE_CONTAINER: &str = "database";

/// Image of the database container
pub const DATABASE_IMAGE: &str = "crunchy-postgres";

const PGDATA_VOLUME: &str = "pgdata";
const PGDATA_PATH: &str = "/pgdata";

/// Role a deployment plays in its cluster
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberRole {
    Primary,
    /// Streams from the primary; `clone` replicas seed a new cluster
    Replica { clone: bool },
}

/// Inputs for one member deployment
#[derive(Clone, Copy, Debug)]
pub struct DeploymentParams<'a> {
    pub name: &'a str,
    pub cluster: &'a Pgcluster,
    pub namespace: &'a str,
    /// Empty means the member runs on an emptyDir
    pub pvc_name: &'a str,
    pub image_tag: &'a str,
    pub role: MemberRole,
}

fn env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Volume backing `/pgdata`
pub fn pgdata_volume(pvc_name: &str) -> Volume {
    if pvc_name.is_empty() {
        Volume {
            name: PGDATA_VOLUME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        }
    } else {
        Volume {
            name: PGDATA_VOLUME.to_string(),
            persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                claim_name: pvc_name.to_string(),
                read_only: Some(false),
            }),
            ..Default::default()
        }
    }
}

/// Parse a storage spec's group settings into a pod security context
fn security_context(storage: &PgStorageSpec) -> Option<PodSecurityContext> {
    let fs_group = storage.fs_group.parse::<i64>().ok();
    let supplemental_groups: Vec<i64> = storage
        .supplemental_groups
        .split(',')
        .filter_map(|g| g.trim().parse().ok())
        .collect();

    if fs_group.is_none() && supplemental_groups.is_empty() {
        return None;
    }
    Some(PodSecurityContext {
        fs_group,
        supplemental_groups: (!supplemental_groups.is_empty()).then_some(supplemental_groups),
        ..Default::default()
    })
}

/// Generate a member deployment
pub fn generate_deployment(params: DeploymentParams<'_>) -> Deployment {
    let spec = &params.cluster.spec;
    let replica = matches!(params.role, MemberRole::Replica { .. });
    let pod_labels = member_labels(&spec.name, params.name, replica, &spec.user_labels);
    let [root_secret, user_secret, primary_secret] = cluster_secret_names(&spec.name);
    let port = spec.port_number();

    let (mode, storage) = match params.role {
        MemberRole::Primary => ("master", &spec.master_storage),
        MemberRole::Replica { .. } => ("slave", &spec.replica_storage),
    };

    let mut env_vars = vec![
        env("PG_MODE", mode),
        env("PG_MASTER_HOST", spec.name.clone()),
        env("PG_MASTER_PORT", port.to_string()),
        env("PG_DATABASE", spec.pg_database.clone()),
        env("PGDATA_PATH_FULL", format!("{PGDATA_PATH}/{}", params.name)),
        secret_env("PG_ROOT_PASSWORD", &root_secret, PASSWORD_KEY),
        secret_env("PG_USER", &user_secret, USERNAME_KEY),
        secret_env("PG_PASSWORD", &user_secret, PASSWORD_KEY),
        secret_env("PG_MASTER_USER", &primary_secret, USERNAME_KEY),
        secret_env("PG_MASTER_PASSWORD", &primary_secret, PASSWORD_KEY),
    ];
    if let MemberRole::Replica { clone: true } = params.role {
        env_vars.push(env("CLONE", "true"));
    }

    let node_selector = (params.role == MemberRole::Primary && !spec.node_name.is_empty())
        .then(|| {
            BTreeMap::from([(
                "kubernetes.io/hostname".to_string(),
                spec.node_name.clone(),
            )])
        });

    let container = Container {
        name: DATABASE_CONTAINER.to_string(),
        image: Some(image(DATABASE_IMAGE, params.image_tag)),
        ports: Some(vec![ContainerPort {
            container_port: port,
            name: Some("postgres".to_string()),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        env: Some(env_vars),
        volume_mounts: Some(vec![VolumeMount {
            name: PGDATA_VOLUME.to_string(),
            mount_path: PGDATA_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: ObjectMeta {
            name: Some(params.name.to_string()),
            namespace: Some(params.namespace.to_string()),
            labels: Some(pod_labels.clone()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(BTreeMap::from([(
                    labels::NAME.to_string(),
                    params.name.to_string(),
                )])),
                ..Default::default()
            },
            strategy: Some(DeploymentStrategy {
                type_: Some("Recreate".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(vec![pgdata_volume(params.pvc_name)]),
                    node_selector,
                    security_context: security_context(storage),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
