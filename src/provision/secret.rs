use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::{Api, Client};
use tracing::{debug, warn};

use crate::controller::backends::{DeleteOutcome, SecretManager};
use crate::controller::error::{Error, Result};
use crate::crd::Pgcluster;
use crate::provision::{create_if_absent, delete_tolerant, timed};
use crate::resources::secret::{PASSWORD_KEY, cluster_secret_names, generate_cluster_secrets};

/// Manages cluster credentials as Kubernetes Secrets
#[derive(Clone)]
pub struct KubeSecretManager {
    client: Client,
    timeout: Duration,
}

impl KubeSecretManager {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl SecretManager for KubeSecretManager {
    async fn create_cluster_secrets(&self, cluster: &Pgcluster, namespace: &str) -> Result<()> {
        let api = self.api(namespace);
        for secret in generate_cluster_secrets(cluster, namespace) {
            if !create_if_absent(&api, &secret, "create secret", self.timeout).await? {
                debug!(secret = ?secret.metadata.name, "Secret already exists");
            }
        }
        Ok(())
    }

    /// Deletes every credential secret, returning the last failure if any
    async fn delete_cluster_secrets(&self, owner: &str, namespace: &str) -> Result<()> {
        let api = self.api(namespace);
        let mut last_error = None;
        for name in cluster_secret_names(owner) {
            match delete_tolerant(&api, &name, "delete secret", self.timeout).await {
                Ok(DeleteOutcome::Deleted) => debug!(secret = %name, "Deleted secret"),
                Ok(DeleteOutcome::NotFound) => debug!(secret = %name, "Secret already gone"),
                Err(e) => {
                    warn!(secret = %name, error = %e, "Failed to delete secret");
                    last_error = Some(e);
                }
            }
        }
        last_error.map_or(Ok(()), Err)
    }

    async fn fetch_password(&self, namespace: &str, secret_name: &str) -> Result<String> {
        let secret = timed("get secret", self.timeout, self.api(namespace).get(secret_name)).await?;
        let bytes = secret
            .data
            .as_ref()
            .and_then(|d| d.get(PASSWORD_KEY))
            .ok_or_else(|| {
                Error::CredentialResolution(format!("{secret_name} has no {PASSWORD_KEY} key"))
            })?;
        String::from_utf8(bytes.0.clone()).map_err(|_| {
            Error::CredentialResolution(format!("{secret_name} password is not valid UTF-8"))
        })
    }
}
