//! Major upgrade job generation

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{
    Container, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec, Volume,
    VolumeMount,
};
use kube::core::ObjectMeta;

use crate::crd::{Pgcluster, Pgupgrade};
use crate::resources::common::{image, labels, standard_labels};

/// Image running `pg_upgrade`
pub const UPGRADE_IMAGE: &str = "crunchy-upgrade";

/// Name of the upgrade job of a cluster
pub fn upgrade_job_name(cluster_name: &str) -> String {
    format!("{cluster_name}-upgrade")
}

fn pvc_volume(name: &str, claim: &str) -> Volume {
    Volume {
        name: name.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            read_only: Some(false),
        }),
        ..Default::default()
    }
}

fn mount(name: &str, path: &str) -> VolumeMount {
    VolumeMount {
        name: name.to_string(),
        mount_path: path.to_string(),
        ..Default::default()
    }
}

/// Generate the job upgrading `cluster` from the old volume onto `new_pvc`
pub fn generate_upgrade_job(
    cluster: &Pgcluster,
    upgrade: &Pgupgrade,
    new_pvc: &str,
    namespace: &str,
) -> Job {
    let cluster_name = &cluster.spec.name;
    let name = upgrade_job_name(cluster_name);

    let mut job_labels = standard_labels(cluster_name);
    job_labels.insert(labels::UPGRADE_JOB.to_string(), "true".to_string());
    job_labels.insert(labels::NAME.to_string(), name.clone());

    let env = BTreeMap::from([
        ("OLD_DATABASE_NAME", upgrade.spec.old_database_name.as_str()),
        ("NEW_DATABASE_NAME", upgrade.spec.new_database_name.as_str()),
        ("OLD_VERSION", upgrade.spec.old_version.as_str()),
        ("NEW_VERSION", upgrade.spec.new_version.as_str()),
    ])
    .into_iter()
    .map(|(k, v)| EnvVar {
        name: k.to_string(),
        value: Some(v.to_string()),
        ..Default::default()
    })
    .collect();

    Job {
        metadata: ObjectMeta {
            name: Some(name),
            namespace: Some(namespace.to_string()),
            labels: Some(job_labels.clone()),
            ..Default::default()
        },
        spec: Some(JobSpec {
            backoff_limit: Some(0),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(job_labels),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    restart_policy: Some("Never".to_string()),
                    containers: vec![Container {
                        name: "upgrade".to_string(),
                        image: Some(image(UPGRADE_IMAGE, &upgrade.spec.ccp_image_tag)),
                        env: Some(env),
                        volume_mounts: Some(vec![
                            mount("pgolddata", "/pgolddata"),
                            mount("pgnewdata", "/pgnewdata"),
                        ]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![
                        pvc_volume("pgolddata", &upgrade.spec.old_pvc_name),
                        pvc_volume("pgnewdata", new_pvc),
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}
