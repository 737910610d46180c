// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for replica scaling, naming and field patches
//!
//! These tests use proptest to generate random inputs and verify that:
//! 1. Scale plans only ever grow and report the exact delta
//! 2. Replica names are well-formed and collide at the uniform rate
//! 3. Field patches nest the value under every pointer segment
//! 4. Version resolution and resource generation never panic

use std::collections::HashSet;

use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Value, json};

use pgcluster_operator::controller::backends::VersionResolver;
use pgcluster_operator::controller::scale::{SUFFIX_LEN, replica_suffix};
use pgcluster_operator::controller::{
    Error, MAX_REPLICAS, ScalePlan, merge_patch_for_path, replica_names,
};
use pgcluster_operator::crd::PgStorageSpec;
use pgcluster_operator::provision::ImageTagVersionResolver;
use pgcluster_operator::resources::pvc::{generate_pvc, pvc_name};

// =============================================================================
// Strategy generators
// =============================================================================

/// Kubernetes-style object names
fn cluster_name() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,20}[a-z0-9]"
}

/// Replica counts in the range a cluster spec carries
fn replica_count() -> impl Strategy<Value = i32> {
    0..50i32
}

/// Non-empty JSON pointer segments without separators
fn pointer_segments() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[a-z]{1,10}", 1..6)
}

fn storage_type() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("create".to_string()),
        Just("dynamic".to_string()),
        Just("existing".to_string()),
        Just("emptydir".to_string()),
        Just(String::new()),
    ]
}

fn storage_spec() -> impl Strategy<Value = PgStorageSpec> {
    (
        storage_type(),
        prop_oneof![Just(String::new()), "[a-z]{3,10}"],
        prop_oneof![Just(String::new()), Just("ReadWriteMany".to_string())],
        prop_oneof![Just(String::new()), "[1-9][0-9]{0,2}(Mi|Gi)"],
    )
        .prop_map(|(storage_type, storage_class, access_mode, size)| PgStorageSpec {
            storage_type,
            storage_class,
            access_mode,
            size,
            ..Default::default()
        })
}

// =============================================================================
// Scale planning
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: growth yields exactly the difference, equal counts yield nothing
    #[test]
    fn prop_scale_up_reports_delta(old in replica_count(), extra in 0..50i32) {
        let new = old + extra;
        let plan = ScalePlan::compute(&old.to_string(), &new.to_string()).unwrap();

        if extra == 0 {
            prop_assert_eq!(plan, ScalePlan::Unchanged);
        } else {
            prop_assert_eq!(plan, ScalePlan::Up { delta: extra as usize });
        }
    }

    /// Property: any shrink is rejected without a plan
    #[test]
    fn prop_scale_down_is_rejected(new in replica_count(), fewer in 1..50i32) {
        let old = new + fewer;
        let result = ScalePlan::compute(&old.to_string(), &new.to_string());

        let is_scale_down = matches!(
            result,
            Err(Error::ScaleDownUnsupported { from, to }) if from == i64::from(old) && to == i64::from(new)
        );
        prop_assert!(is_scale_down);
    }

    /// Property: leading zeros do not change the count
    #[test]
    fn prop_zero_padded_counts_are_equal(count in replica_count(), zeros in 1..4usize) {
        let padded = format!("{}{}", "0".repeat(zeros), count);
        let plan = ScalePlan::compute(&count.to_string(), &padded).unwrap();
        prop_assert_eq!(plan, ScalePlan::Unchanged);
    }

    /// Property: negative or oversized counts never produce a plan
    #[test]
    fn prop_out_of_range_counts_are_rejected(
        count in prop_oneof![i64::MIN..0i64, (i64::from(MAX_REPLICAS) + 1)..i64::MAX],
    ) {
        let result = ScalePlan::compute("0", &count.to_string());
        let is_out_of_range = matches!(result, Err(Error::ReplicaCountOutOfRange { .. }));
        prop_assert!(is_out_of_range);
    }

    /// Property: non-numeric counts never produce a plan
    #[test]
    fn prop_non_numeric_counts_are_rejected(garbage in "[a-z ]{1,8}") {
        let result = ScalePlan::compute("1", &garbage);
        let is_invalid = matches!(result, Err(Error::InvalidReplicaCount { .. }));
        prop_assert!(is_invalid);
    }
}

// =============================================================================
// Replica naming
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Property: suffixes are lowercase ASCII letters of the fixed length
    #[test]
    fn prop_suffix_charset_and_length(seed in any::<u64>()) {
        let mut rng = StdRng::seed_from_u64(seed);
        let suffix = replica_suffix(&mut rng, SUFFIX_LEN);

        prop_assert_eq!(suffix.len(), SUFFIX_LEN);
        prop_assert!(suffix.chars().all(|c| c.is_ascii_lowercase()));
    }

    /// Property: names within one batch are distinct and carry the replica prefix
    #[test]
    fn prop_batch_names_are_distinct(
        cluster in cluster_name(),
        count in 0..40usize,
        seed in any::<u64>(),
    ) {
        let mut rng = StdRng::seed_from_u64(seed);
        let names = replica_names(&cluster, count, &mut rng);

        prop_assert_eq!(names.len(), count);
        let unique: HashSet<&String> = names.iter().collect();
        prop_assert_eq!(unique.len(), names.len());

        let prefix = format!("{cluster}-replica-");
        for name in &names {
            prop_assert!(name.starts_with(&prefix), "unexpected name {}", name);
            prop_assert_eq!(name.len(), prefix.len() + SUFFIX_LEN);
        }
    }

    /// Property: the same seed yields the same names
    #[test]
    fn prop_names_are_seed_deterministic(cluster in cluster_name(), seed in any::<u64>()) {
        let first = replica_names(&cluster, 5, &mut StdRng::seed_from_u64(seed));
        let second = replica_names(&cluster, 5, &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(first, second);
    }
}

/// Suffixes drawn per trial in the collision checks
const DRAWS: usize = 1000;
/// Independent trials averaged by the collision checks
const TRIALS: u64 = 200;

fn collisions(rng: &mut StdRng) -> usize {
    let mut seen = HashSet::with_capacity(DRAWS);
    (0..DRAWS)
        .filter(|_| !seen.insert(replica_suffix(rng, SUFFIX_LEN)))
        .count()
}

/// Mean collisions over many trials matches the birthday estimate for a
/// uniform draw over 26^4 suffixes
#[test]
fn test_collision_rate_matches_uniform_model() {
    let space = 26f64.powi(SUFFIX_LEN as i32);
    let n = DRAWS as f64;
    let expected = n * (n - 1.0) / 2.0 / space;

    let total: usize = (0..TRIALS)
        .map(|seed| collisions(&mut StdRng::seed_from_u64(seed)))
        .sum();
    let mean = total as f64 / TRIALS as f64;

    // Standard error of the mean is about sqrt(expected / TRIALS) ~= 0.074
    assert!(
        (mean - expected).abs() < 0.4,
        "mean {mean:.3} collisions, expected {expected:.3}"
    );
}

/// Letters are spread evenly across the alphabet
#[test]
fn test_suffix_letters_are_uniform() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut counts = [0u64; 26];
    let suffixes = 10_000;
    for _ in 0..suffixes {
        for c in replica_suffix(&mut rng, SUFFIX_LEN).bytes() {
            counts[usize::from(c - b'a')] += 1;
        }
    }

    let expected = (suffixes * SUFFIX_LEN) as f64 / 26.0;
    let chi_squared: f64 = counts
        .iter()
        .map(|&observed| (observed as f64 - expected).powi(2) / expected)
        .sum();
    // 25 degrees of freedom; 70 is far beyond the 99.99th percentile (~59)
    assert!(chi_squared < 70.0, "chi-squared {chi_squared:.1}");
}

// =============================================================================
// Field patches
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the value is reachable through every pointer segment
    #[test]
    fn prop_patch_nests_value(segments in pointer_segments(), value in "[a-z0-9]{0,12}") {
        let path = format!("/{}", segments.join("/"));
        let patch = merge_patch_for_path(&path, json!(value.clone())).unwrap();

        prop_assert_eq!(patch.pointer(&path), Some(&Value::String(value)));

        let mut node = &patch;
        for segment in &segments {
            let object = node.as_object().unwrap();
            prop_assert_eq!(object.len(), 1);
            node = &object[segment.as_str()];
        }
    }

    /// Property: paths without a leading slash or with empty segments are rejected
    #[test]
    fn prop_malformed_paths_are_rejected(segments in pointer_segments()) {
        let relative = segments.join("/");
        let doubled = format!("/{}//x", segments.join("/"));

        let relative_rejected = matches!(
            merge_patch_for_path(&relative, json!(1)),
            Err(Error::InvalidPatchPath(_))
        );
        let doubled_rejected = matches!(
            merge_patch_for_path(&doubled, json!(1)),
            Err(Error::InvalidPatchPath(_))
        );
        prop_assert!(relative_rejected);
        prop_assert!(doubled_rejected);
    }
}

// =============================================================================
// Version resolution and resource generation
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// Property: the version is the second dash-separated segment of a tag
    #[test]
    fn prop_resolver_extracts_version(
        os in "[a-z0-9]{1,8}",
        version in "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}",
        release in "[0-9]\\.[0-9]\\.[0-9]",
    ) {
        let tag = format!("{os}-{version}-{release}");
        let resolver = ImageTagVersionResolver;

        prop_assert_eq!(resolver.resolve_full_version(&tag), version);
        prop_assert_eq!(
            resolver.resolve_full_version(&tag),
            resolver.resolve_full_version(&tag)
        );
    }

    /// Property: claims always carry a name, one access mode and a size request
    #[test]
    fn prop_pvc_generation_never_panics(owner in cluster_name(), storage in storage_spec()) {
        let pvc = generate_pvc(&owner, &storage, "demo");

        prop_assert_eq!(pvc.metadata.name, Some(pvc_name(&owner)));
        let spec = pvc.spec.unwrap();
        prop_assert_eq!(spec.access_modes.map(|m| m.len()), Some(1));
        let requests = spec.resources.and_then(|r| r.requests).unwrap();
        prop_assert!(requests.contains_key("storage"));
        if storage.storage_type != "dynamic" {
            prop_assert!(spec.storage_class_name.is_none());
        }
    }
}
