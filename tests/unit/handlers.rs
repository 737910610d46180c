//! Unit tests for the per-kind event handlers

use pgcluster_operator::controller::status::paths;
use pgcluster_operator::controller::{
    ClusterHandler, Error, ProcessedMarker, UpgradeHandler, UpgradeJobHandler,
};
use kube::runtime::watcher::Event;

use pgcluster_operator::crd::{Pgbackup, Pgpolicy, ResourceKind, ResourceState, ResourceStatus};
use pgcluster_operator::watch::{ResourceHandler, WatchLoop};

use crate::common::*;

fn processed_calls(env: &TestEnv, kind: ResourceKind) -> usize {
    env.calls.count(|c| {
        matches!(c, Call::PatchStatus { kind: k, state: ResourceState::Processed, .. } if *k == kind)
    })
}

mod cluster_handler_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_runs_create_workflow_and_records_metric() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let cluster = create_test_cluster("c1", TEST_NAMESPACE, "0");

        handler.on_add(&cluster).await.unwrap();

        assert_eq!(env.calls.count(|c| matches!(c, Call::AddCluster { .. })), 1);
        let encoded = env.health.metrics.encode();
        assert!(encoded.contains(r#"workflow="add_cluster""#));
    }

    #[tokio::test]
    async fn test_update_without_replica_change_is_ignored() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let old = create_test_cluster("c1", TEST_NAMESPACE, "1");
        let mut new = old.clone();
        new.spec.pg_database = "otherdb".to_string();

        handler.on_update(&old, &new).await.unwrap();

        assert!(env.calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_resync_update_is_ignored() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let cluster = create_test_cluster("c1", TEST_NAMESPACE, "2");

        handler.on_update(&cluster, &cluster).await.unwrap();

        assert!(env.calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_update_with_replica_change_scales() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let old = create_test_cluster("c1", TEST_NAMESPACE, "1");
        let new = create_test_cluster("c1", TEST_NAMESPACE, "2");

        handler.on_update(&old, &new).await.unwrap();

        assert_eq!(env.calls.replicas_created().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_runs_delete_workflow() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let cluster = create_test_cluster("c1", TEST_NAMESPACE, "0");

        handler.on_delete(&cluster).await.unwrap();

        assert_eq!(env.calls.count(|c| matches!(c, Call::DeleteCluster(_))), 1);
    }

    #[tokio::test]
    async fn test_watched_cluster_is_created_then_scaled() {
        let env = TestEnv::new();
        let mut watch = WatchLoop::new("Pgcluster", ClusterHandler::new(env.ctx.clone()));

        watch
            .handle_event(Event::Apply(create_test_cluster("c1", TEST_NAMESPACE, "1")))
            .await;

        assert_eq!(env.calls.count(|c| matches!(c, Call::AddCluster { .. })), 1);
        assert_eq!(env.calls.replicas_created().len(), 1);
        assert_eq!(
            env.calls.patched("c1", paths::PRIMARY_PVC),
            vec![serde_json::json!("c1-pvc")]
        );
        env.calls.clear();

        watch
            .handle_event(Event::Apply(create_test_cluster("c1", TEST_NAMESPACE, "3")))
            .await;

        assert_eq!(env.calls.count(|c| matches!(c, Call::AddCluster { .. })), 0);
        assert_eq!(env.calls.replicas_created().len(), 2);
        assert_eq!(
            env.calls
                .count(|c| matches!(c, Call::EnsureService(name) if name == "c1-replica")),
            1
        );
        // The primary keeps its volume
        assert_eq!(
            env.calls.count(|c| matches!(c, Call::Provision(owner) if owner == "c1")),
            0
        );
        assert!(env.calls.patched("c1", paths::PRIMARY_PVC).is_empty());
    }

    #[tokio::test]
    async fn test_object_without_namespace_is_rejected() {
        let env = TestEnv::new();
        let handler = ClusterHandler::new(env.ctx.clone());
        let mut cluster = create_test_cluster("c1", TEST_NAMESPACE, "0");
        cluster.metadata.namespace = None;

        let err = handler.on_add(&cluster).await.unwrap_err();

        assert!(matches!(err, Error::MissingObjectKey(_)));
        assert!(env.calls.all().is_empty());
    }
}

mod upgrade_handler_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_upgrade_is_marked_processed_and_run() {
        let env = TestEnv::new();
        env.backend
            .insert_cluster(create_test_cluster("c1", TEST_NAMESPACE, "1"));
        let handler = UpgradeHandler::new(env.ctx.clone());
        let upgrade = create_test_upgrade("c1", TEST_NAMESPACE, "minor", TEST_IMAGE_TAG);

        handler.on_add(&upgrade).await.unwrap();

        assert_eq!(processed_calls(&env, ResourceKind::Upgrade), 1);
        assert_eq!(env.calls.count(|c| matches!(c, Call::MinorUpgrade(_))), 1);
    }

    #[tokio::test]
    async fn test_upgrade_for_missing_cluster_is_dropped() {
        let env = TestEnv::new();
        let handler = UpgradeHandler::new(env.ctx.clone());
        let upgrade = create_test_upgrade("gone", TEST_NAMESPACE, "minor", TEST_IMAGE_TAG);

        handler.on_add(&upgrade).await.unwrap();

        assert_eq!(env.calls.count(|c| matches!(c, Call::MinorUpgrade(_))), 0);
    }

    #[tokio::test]
    async fn test_completed_upgrade_is_not_rerun() {
        let env = TestEnv::new();
        env.backend
            .insert_cluster(create_test_cluster("c1", TEST_NAMESPACE, "1"));
        let handler = UpgradeHandler::new(env.ctx.clone());
        let mut upgrade = create_test_upgrade("c1", TEST_NAMESPACE, "minor", TEST_IMAGE_TAG);
        upgrade.spec.upgrade_status = "completed".to_string();
        upgrade.status = Some(ResourceStatus::processed("done"));

        handler.on_add(&upgrade).await.unwrap();

        assert!(env.calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_status_failure_does_not_block_upgrade() {
        let env = TestEnv::new();
        env.backend.fail(Fail::PatchStatus);
        env.backend
            .insert_cluster(create_test_cluster("c1", TEST_NAMESPACE, "1"));
        let handler = UpgradeHandler::new(env.ctx.clone());
        let upgrade = create_test_upgrade("c1", TEST_NAMESPACE, "major", TEST_IMAGE_TAG);

        handler.on_add(&upgrade).await.unwrap();

        assert_eq!(env.calls.count(|c| matches!(c, Call::MajorUpgrade(_))), 1);
    }
}

mod upgrade_job_handler_tests {
    use super::*;

    fn seed_major_upgrade(env: &TestEnv) {
        env.backend
            .insert_cluster(create_test_cluster("c1", TEST_NAMESPACE, "1"));
        let mut upgrade = create_test_upgrade("c1", TEST_NAMESPACE, "major", TEST_IMAGE_TAG);
        upgrade.spec.new_pvc_name = "c1-upgrade-pvc".to_string();
        env.backend.insert_upgrade(upgrade);
    }

    #[tokio::test]
    async fn test_succeeded_job_finalizes_upgrade() {
        let env = TestEnv::new();
        seed_major_upgrade(&env);
        let handler = UpgradeJobHandler::new(env.ctx.clone());
        let job = create_upgrade_job("c1", TEST_NAMESPACE, 1);

        handler.on_update(&job, &job).await.unwrap();

        assert_eq!(
            env.calls.count(|c| matches!(c, Call::MajorUpgradeFinalize(_))),
            1
        );
        assert_eq!(
            env.calls.patched("c1", paths::PRIMARY_PVC),
            vec![serde_json::json!("c1-upgrade-pvc")]
        );
    }

    #[tokio::test]
    async fn test_running_job_is_ignored() {
        let env = TestEnv::new();
        seed_major_upgrade(&env);
        let handler = UpgradeJobHandler::new(env.ctx.clone());
        let job = create_upgrade_job("c1", TEST_NAMESPACE, 0);

        handler.on_add(&job).await.unwrap();

        assert!(env.calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_job_without_upgrade_is_ignored() {
        let env = TestEnv::new();
        env.backend
            .insert_cluster(create_test_cluster("c1", TEST_NAMESPACE, "1"));
        let handler = UpgradeJobHandler::new(env.ctx.clone());
        let job = create_upgrade_job("c1", TEST_NAMESPACE, 1);

        handler.on_add(&job).await.unwrap();

        assert!(env.calls.all().is_empty());
    }

    #[tokio::test]
    async fn test_job_without_cluster_label_is_ignored() {
        let env = TestEnv::new();
        seed_major_upgrade(&env);
        let handler = UpgradeJobHandler::new(env.ctx.clone());
        let mut job = create_upgrade_job("c1", TEST_NAMESPACE, 1);
        job.metadata.labels = None;

        handler.on_add(&job).await.unwrap();

        assert!(env.calls.all().is_empty());
    }
}

mod processed_marker_tests {
    use super::*;

    #[tokio::test]
    async fn test_new_backup_is_marked_processed() {
        let env = TestEnv::new();
        let handler = ProcessedMarker::<Pgbackup>::new(env.ctx.clone());

        handler
            .on_add(&create_test_backup("b1", TEST_NAMESPACE))
            .await
            .unwrap();

        assert_eq!(
            env.calls.all(),
            vec![Call::PatchStatus {
                kind: ResourceKind::Backup,
                name: "b1".to_string(),
                state: ResourceState::Processed,
            }]
        );
    }

    #[tokio::test]
    async fn test_processed_policy_is_left_alone() {
        let env = TestEnv::new();
        let handler = ProcessedMarker::<Pgpolicy>::new(env.ctx.clone());
        let mut policy = create_test_policy("p1", TEST_NAMESPACE);
        policy.status = Some(ResourceStatus::processed("seen"));

        handler.on_add(&policy).await.unwrap();
        handler.on_update(&policy, &policy).await.unwrap();
        handler.on_delete(&policy).await.unwrap();

        assert!(env.calls.all().is_empty());
    }
}
