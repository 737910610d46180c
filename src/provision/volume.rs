use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::PersistentVolumeClaim;
use kube::{Api, Client};
use tracing::{debug, info};

use crate::controller::backends::VolumeProvisioner;
use crate::controller::error::{Error, Result};
use crate::crd::{PgStorageSpec, StorageType};
use crate::provision::{create_if_absent, timed};
use crate::resources::pvc::{generate_pvc, pvc_name};

/// Provisions volumes as PersistentVolumeClaims
#[derive(Clone)]
pub struct PvcProvisioner {
    client: Client,
    timeout: Duration,
}

impl PvcProvisioner {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl VolumeProvisioner for PvcProvisioner {
    async fn provision(
        &self,
        owner: &str,
        storage: &PgStorageSpec,
        namespace: &str,
    ) -> Result<String> {
        match storage.storage_type() {
            StorageType::EmptyDir => {
                debug!(owner, "Using emptyDir, no volume provisioned");
                Ok(String::new())
            }
            StorageType::Existing => {
                if storage.pvc_name.is_empty() {
                    return Err(Error::InvalidConfig(format!(
                        "storage for {owner} is 'existing' but names no pvc"
                    )));
                }
                let api: Api<PersistentVolumeClaim> =
                    Api::namespaced(self.client.clone(), namespace);
                timed("get pvc", self.timeout, api.get_opt(&storage.pvc_name))
                    .await?
                    .ok_or_else(|| Error::NotFound(format!("pvc {}", storage.pvc_name)))?;
                Ok(storage.pvc_name.clone())
            }
            StorageType::Create | StorageType::Dynamic => {
                let name = pvc_name(owner);
                let api: Api<PersistentVolumeClaim> =
                    Api::namespaced(self.client.clone(), namespace);
                let pvc = generate_pvc(owner, storage, namespace);
                if create_if_absent(&api, &pvc, "create pvc", self.timeout).await? {
                    info!(pvc = %name, "Created pvc");
                } else {
                    debug!(pvc = %name, "Pvc already exists");
                }
                Ok(name)
            }
        }
    }
}
