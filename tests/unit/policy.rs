//! Unit tests for policy apply

use std::collections::BTreeMap;

use chrono::DateTime;

use pgcluster_operator::controller::{ApplyPolicyRequest, Error, PolicyPair, apply_policies};
use pgcluster_operator::crd::Pgpolicylog;

use crate::common::*;

fn request(policies: &[&str], selector: &str, dry_run: bool) -> ApplyPolicyRequest {
    ApplyPolicyRequest {
        namespace: TEST_NAMESPACE.to_string(),
        policies: policies.iter().map(|s| s.to_string()).collect(),
        selector: selector.to_string(),
        dry_run,
        username: "alice".to_string(),
    }
}

fn pair(policy: &str, cluster: &str) -> PolicyPair {
    PolicyPair {
        policy: policy.to_string(),
        cluster: cluster.to_string(),
    }
}

#[tokio::test]
async fn test_missing_policy_cancels_request() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1"]);

    let err = apply_policies(&env.ctx, &request(&["p1", "p2"], "", false))
        .await
        .unwrap_err();

    assert!(matches!(err, Error::MissingPolicy(ref p) if p == "p2"));
    assert!(env.calls.all().is_empty());
}

#[tokio::test]
async fn test_dry_run_reports_targets_only() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1", "c2"]);

    let results = apply_policies(&env.ctx, &request(&["p1"], "env=prod", true))
        .await
        .unwrap();

    assert_eq!(results.targets, vec!["c1", "c2"]);
    assert!(results.applied.is_empty());
    assert_eq!(
        env.calls.all(),
        vec![Call::ListDeployments("env=prod,!replica".to_string())]
    );
}

#[tokio::test]
async fn test_apply_records_and_labels_each_pair() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1", "c2"]);

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert_eq!(results.applied, vec![pair("p1", "c1"), pair("p1", "c2")]);
    assert!(results.skipped.is_empty());
    assert_eq!(
        env.calls.position(|c| matches!(c, Call::ListDeployments(s) if s == "!replica")),
        Some(0)
    );

    let labels = BTreeMap::from([("p1".to_string(), "pgpolicy".to_string())]);
    assert_eq!(
        env.calls.count(|c| matches!(
            c,
            Call::UpdatePolicyLabels { deployment, labels: l } if deployment == "c1" && *l == labels
        )),
        1
    );

    let logs: Vec<Pgpolicylog> = env.backend.policylogs();
    assert_eq!(logs.len(), 2);
    for log in logs {
        assert_eq!(log.spec.policy_name, "p1");
        assert_eq!(log.spec.username, "alice");
        assert!(DateTime::parse_from_rfc3339(&log.spec.apply_date).is_ok());
    }
}

#[tokio::test]
async fn test_second_apply_is_a_no_op() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1"]);
    apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();
    env.calls.clear();

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert!(results.applied.is_empty());
    assert_eq!(results.skipped, vec![pair("p1", "c1")]);
    assert_eq!(env.calls.count(|c| matches!(c, Call::CreatePolicylog(_))), 0);
    assert_eq!(
        env.calls.count(|c| matches!(c, Call::UpdatePolicyLabels { .. })),
        0
    );
}

#[tokio::test]
async fn test_policylog_name_joins_policy_and_cluster() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1"]);

    apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert_eq!(
        env.calls.count(|c| matches!(c, Call::CreatePolicylog(n) if n == "p1-c1")),
        1
    );
}

#[tokio::test]
async fn test_lookup_failure_skips_only_that_pair() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1", "c2"]);
    env.backend.fail(Fail::GetPolicylog("p1-c1".to_string()));

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert_eq!(results.applied, vec![pair("p1", "c2")]);
    assert!(results.skipped.is_empty());
}

#[tokio::test]
async fn test_create_failure_does_not_label() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1"]);
    env.backend.fail(Fail::CreatePolicylog);

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert!(results.applied.is_empty());
    assert_eq!(
        env.calls.count(|c| matches!(c, Call::UpdatePolicyLabels { .. })),
        0
    );
}

#[tokio::test]
async fn test_label_failure_still_counts_as_applied() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");
    env.backend.set_deployments(&["c1"]);
    env.strategy.fail(StrategyFail::UpdatePolicyLabels);

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert_eq!(results.applied, vec![pair("p1", "c1")]);
}

#[tokio::test]
async fn test_no_targets_applies_nothing() {
    let env = TestEnv::new();
    env.backend.insert_policy("p1");

    let results = apply_policies(&env.ctx, &request(&["p1"], "", false))
        .await
        .unwrap();

    assert!(results.targets.is_empty());
    assert!(env.calls.all().iter().all(|c| !c.is_mutation()));
}
