use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use kube::{Api, Client};
use tracing::{debug, info};

use crate::controller::backends::{ServiceFields, ServiceManager};
use crate::controller::error::Result;
use crate::provision::create_if_absent;
use crate::resources::service::generate_service;

/// Creates cluster services
#[derive(Clone)]
pub struct KubeServiceManager {
    client: Client,
    timeout: Duration,
}

impl KubeServiceManager {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl ServiceManager for KubeServiceManager {
    async fn ensure_service(&self, fields: &ServiceFields, namespace: &str) -> Result<()> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), namespace);
        let service = generate_service(fields, namespace);
        if create_if_absent(&api, &service, "create service", self.timeout).await? {
            info!(service = %fields.name, "Created service");
        } else {
            debug!(service = %fields.name, "Service already exists");
        }
        Ok(())
    }
}
