//! Builders for the custom resources used in tests
//!
//! ```rust,ignore
//! let cluster = PgclusterBuilder::new("c1", "demo").with_replicas("2").build();
//! let upgrade = create_test_upgrade("c1", "demo", "major", "centos7-10.1-2.0");
//! ```

use std::collections::BTreeMap;

use k8s_openapi::api::batch::v1::{Job, JobStatus};
use kube::core::ObjectMeta;
use pgcluster_operator::crd::{
    PgStorageSpec, Pgbackup, PgbackupSpec, Pgcluster, PgclusterSpec, Pgpolicy, PgpolicySpec,
    Pgupgrade, PgupgradeSpec, ResourceStatus,
};

pub const TEST_NAMESPACE: &str = "demo";
pub const TEST_IMAGE_TAG: &str = "centos7-9.6.5-1.6.0";

fn meta(name: &str, namespace: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        uid: Some(format!("uid-{name}")),
        ..Default::default()
    }
}

/// Storage that provisions a new volume
pub fn create_storage() -> PgStorageSpec {
    PgStorageSpec {
        storage_type: "create".to_string(),
        access_mode: "ReadWriteOnce".to_string(),
        size: "1Gi".to_string(),
        ..Default::default()
    }
}

/// Builder for Pgcluster test resources
pub struct PgclusterBuilder {
    namespace: String,
    spec: PgclusterSpec,
    status: Option<ResourceStatus>,
}

impl PgclusterBuilder {
    pub fn new(name: &str, namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            spec: PgclusterSpec {
                name: name.to_string(),
                cluster_name: name.to_string(),
                ccp_image_tag: TEST_IMAGE_TAG.to_string(),
                port: "5432".to_string(),
                master_storage: create_storage(),
                replica_storage: create_storage(),
                pg_database: "userdb".to_string(),
                replicas: "0".to_string(),
                ..Default::default()
            },
            status: None,
        }
    }

    pub fn with_replicas(mut self, replicas: &str) -> Self {
        self.spec.replicas = replicas.to_string();
        self
    }

    pub fn with_strategy(mut self, strategy: &str) -> Self {
        self.spec.strategy = strategy.to_string();
        self
    }

    pub fn with_secret_from(mut self, source: &str) -> Self {
        self.spec.secret_from = source.to_string();
        self
    }

    pub fn completed(mut self) -> Self {
        self.spec.status = "completed".to_string();
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn build(self) -> Pgcluster {
        Pgcluster {
            metadata: meta(&self.spec.name, &self.namespace),
            spec: self.spec,
            status: self.status,
        }
    }
}

/// Cluster with the default strategy and `replicas` declared
pub fn create_test_cluster(name: &str, namespace: &str, replicas: &str) -> Pgcluster {
    PgclusterBuilder::new(name, namespace)
        .with_replicas(replicas)
        .build()
}

/// Upgrade targeting `cluster`; the object shares the cluster's name
pub fn create_test_upgrade(
    cluster: &str,
    namespace: &str,
    upgrade_type: &str,
    image_tag: &str,
) -> Pgupgrade {
    Pgupgrade {
        metadata: meta(cluster, namespace),
        spec: PgupgradeSpec {
            name: cluster.to_string(),
            resource_type: "cluster".to_string(),
            upgrade_type: upgrade_type.to_string(),
            upgrade_status: "submitted".to_string(),
            storage_spec: create_storage(),
            ccp_image_tag: image_tag.to_string(),
            old_pvc_name: format!("{cluster}-pvc"),
            ..Default::default()
        },
        status: None,
    }
}

pub fn create_test_backup(name: &str, namespace: &str) -> Pgbackup {
    Pgbackup {
        metadata: meta(name, namespace),
        spec: PgbackupSpec {
            name: name.to_string(),
            storage_spec: create_storage(),
            ..Default::default()
        },
        status: None,
    }
}

pub fn create_test_policy(name: &str, namespace: &str) -> Pgpolicy {
    Pgpolicy {
        metadata: meta(name, namespace),
        spec: PgpolicySpec {
            name: name.to_string(),
            sql: "create table audit (id int);".to_string(),
            ..Default::default()
        },
        status: None,
    }
}

/// Upgrade job for `cluster` with `succeeded` completions
pub fn create_upgrade_job(cluster: &str, namespace: &str, succeeded: i32) -> Job {
    let mut metadata = meta(&format!("{cluster}-upgrade"), namespace);
    metadata.labels = Some(BTreeMap::from([
        ("pg-cluster".to_string(), cluster.to_string()),
        ("pgupgrade".to_string(), "true".to_string()),
    ]));
    Job {
        metadata,
        spec: None,
        status: Some(JobStatus {
            succeeded: Some(succeeded),
            ..Default::default()
        }),
    }
}
