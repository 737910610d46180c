//! Builders for the Kubernetes objects the default collaborators create

pub mod common;
pub mod deployment;
pub mod job;
pub mod pvc;
pub mod secret;
pub mod service;

pub use common::{
    FIELD_MANAGER, cluster_selector, replica_selector, standard_labels, upgrade_job_selector,
};
