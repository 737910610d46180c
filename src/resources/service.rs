//! Service generation for cluster members
//!
//! The primary service shares the cluster's name and targets the primary
//! deployment; any other service of the cluster targets its replicas.

use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::core::ObjectMeta;
use std::collections::BTreeMap;

use crate::controller::backends::ServiceFields;
use crate::resources::common::{labels, standard_labels};

/// Whether `fields` describes the primary service
pub fn is_primary_service(fields: &ServiceFields) -> bool {
    fields.name == fields.cluster_name
}

/// Generate a cluster service
pub fn generate_service(fields: &ServiceFields, namespace: &str) -> Service {
    let selector = if is_primary_service(fields) {
        BTreeMap::from([(labels::NAME.to_string(), fields.cluster_name.clone())])
    } else {
        BTreeMap::from([
            (labels::CLUSTER.to_string(), fields.cluster_name.clone()),
            (labels::REPLICA.to_string(), "true".to_string()),
        ])
    };

    let mut service_labels = standard_labels(&fields.cluster_name);
    service_labels.insert(labels::NAME.to_string(), fields.name.clone());

    Service {
        metadata: ObjectMeta {
            name: Some(fields.name.clone()),
            namespace: Some(namespace.to_string()),
            labels: Some(service_labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(selector),
            ports: Some(vec![ServicePort {
                port: fields.port,
                target_port: Some(IntOrString::Int(fields.port)),
                name: Some("postgres".to_string()),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
