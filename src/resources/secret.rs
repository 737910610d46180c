use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Secret;
use kube::core::ObjectMeta;
use rand::Rng;

use crate::crd::{PGMASTER_SECRET_SUFFIX, PGROOT_SECRET_SUFFIX, PGUSER_SECRET_SUFFIX, Pgcluster};
use crate::resources::common::{labels, standard_labels};

/// Key holding the user name in a credential secret
pub const USERNAME_KEY: &str = "username";
/// Key holding the password in a credential secret
pub const PASSWORD_KEY: &str = "password";

const GENERATED_PASSWORD_LEN: usize = 12;

/// Generate a random password
pub fn generate_password(len: usize) -> String {
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..len)
        .map(|_| CHARSET[rng.random_range(0..CHARSET.len())] as char)
        .collect()
}

/// Names of the three credential secrets of a cluster (root, user, primary)
pub fn cluster_secret_names(cluster_name: &str) -> [String; 3] {
    [
        format!("{cluster_name}{PGROOT_SECRET_SUFFIX}"),
        format!("{cluster_name}{PGUSER_SECRET_SUFFIX}"),
        format!("{cluster_name}{PGMASTER_SECRET_SUFFIX}"),
    ]
}

fn or_default(value: &str, default: &str) -> String {
    if value.is_empty() {
        default.to_string()
    } else {
        value.to_string()
    }
}

fn or_generated(value: &str) -> String {
    if value.is_empty() {
        generate_password(GENERATED_PASSWORD_LEN)
    } else {
        value.to_string()
    }
}

/// Generate the credential secrets of a cluster
///
/// Passwords declared on the cluster are used as-is; missing ones are generated.
pub fn generate_cluster_secrets(cluster: &Pgcluster, namespace: &str) -> Vec<Secret> {
    let spec = &cluster.spec;
    let [root, user, primary] = cluster_secret_names(&spec.name);

    [
        (root, "postgres".to_string(), or_generated(&spec.pg_root_password)),
        (
            user,
            or_default(&spec.pg_user, "testuser"),
            or_generated(&spec.pg_password),
        ),
        (
            primary,
            or_default(&spec.pg_master_user, "primaryuser"),
            or_generated(&spec.pg_master_password),
        ),
    ]
    .into_iter()
    .map(|(name, username, password)| credential_secret(&spec.name, &name, namespace, username, password))
    .collect()
}

fn credential_secret(
    cluster_name: &str,
    name: &str,
    namespace: &str,
    username: String,
    password: String,
) -> Secret {
    let mut labels = standard_labels(cluster_name);
    labels.insert(labels::DATABASE.to_string(), cluster_name.to_string());

    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            (USERNAME_KEY.to_string(), username),
            (PASSWORD_KEY.to_string(), password),
        ])),
        ..Default::default()
    }
}
