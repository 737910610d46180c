//! Kubernetes-backed implementations of the collaborator traits
//!
//! Every API call goes through [`timed`] so a hung apiserver cannot stall a
//! watch loop forever.

mod secret;
mod service;
mod store;
mod strategy;
mod version;
mod volume;

pub use secret::KubeSecretManager;
pub use service::KubeServiceManager;
pub use store::KubeResourceStore;
pub use strategy::Strategy1;
pub use version::ImageTagVersionResolver;
pub use volume::PvcProvisioner;

use std::fmt::Debug;
use std::future::Future;
use std::time::Duration;

use kube::api::{DeleteParams, PostParams};
use kube::{Api, Resource};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::controller::backends::DeleteOutcome;
use crate::controller::error::{Error, Result};

/// Await `fut`, failing with [`Error::Timeout`] after `timeout`
pub(crate) async fn timed<T, E, F>(operation: &'static str, timeout: Duration, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    E: Into<Error>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(Error::Timeout { operation, timeout }),
    }
}

/// Create `obj` unless an object with its name exists; returns whether it was created
pub(crate) async fn create_if_absent<K>(
    api: &Api<K>,
    obj: &K,
    operation: &'static str,
    timeout: Duration,
) -> Result<bool>
where
    K: Resource + Clone + DeserializeOwned + Serialize + Debug,
{
    match timed(operation, timeout, api.create(&PostParams::default(), obj)).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_already_exists() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Delete `name`, reporting a missing object instead of failing
pub(crate) async fn delete_tolerant<K>(
    api: &Api<K>,
    name: &str,
    operation: &'static str,
    timeout: Duration,
) -> Result<DeleteOutcome>
where
    K: Resource + Clone + DeserializeOwned + Debug,
{
    let params = DeleteParams::background();
    match timed(operation, timeout, api.delete(name, &params)).await {
        Ok(_) => Ok(DeleteOutcome::Deleted),
        Err(e) if e.is_not_found() => Ok(DeleteOutcome::NotFound),
        Err(e) => Err(e),
    }
}
