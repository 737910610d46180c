use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    PersistentVolumeClaim, PersistentVolumeClaimSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::core::ObjectMeta;

use crate::crd::{PgStorageSpec, StorageType};
use crate::resources::common::{labels, standard_labels};

const DEFAULT_ACCESS_MODE: &str = "ReadWriteOnce";
const DEFAULT_SIZE: &str = "1Gi";

/// Name of the claim provisioned for `owner`
pub fn pvc_name(owner: &str) -> String {
    format!("{owner}-pvc")
}

/// Generate the claim for `owner`
///
/// The storage class is only set for dynamic provisioning.
pub fn generate_pvc(owner: &str, storage: &PgStorageSpec, namespace: &str) -> PersistentVolumeClaim {
    let access_mode = if storage.access_mode.is_empty() {
        DEFAULT_ACCESS_MODE
    } else {
        storage.access_mode.as_str()
    };
    let size = if storage.size.is_empty() {
        DEFAULT_SIZE
    } else {
        storage.size.as_str()
    };
    let storage_class = match storage.storage_type() {
        StorageType::Dynamic if !storage.storage_class.is_empty() => {
            Some(storage.storage_class.clone())
        }
        _ => None,
    };

    let mut pvc_labels = standard_labels(owner);
    pvc_labels.insert(labels::NAME.to_string(), pvc_name(owner));

    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(pvc_name(owner)),
            namespace: Some(namespace.to_string()),
            labels: Some(pvc_labels),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec![access_mode.to_string()]),
            storage_class_name: storage_class,
            resources: Some(VolumeResourceRequirements {
                requests: Some(BTreeMap::from([(
                    "storage".to_string(),
                    Quantity(size.to_string()),
                )])),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}
