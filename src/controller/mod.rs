pub mod backends;
pub mod context;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod policy;
pub mod scale;
pub mod status;
pub mod strategy;
pub mod upgrade;

pub use backends::{
    DeleteOutcome, ResourceStore, SecretManager, ServiceFields, ServiceManager, VersionResolver,
    VolumeProvisioner,
};
pub use context::Context;
pub use error::{BackoffConfig, Error, Result};
pub use handlers::{ClusterHandler, ProcessedMarker, UpgradeHandler, UpgradeJobHandler};
pub use lifecycle::{add_cluster, delete_cluster, prepare_clone, update_cluster};
pub use policy::{ApplyPolicyRequest, ApplyResults, PolicyPair, apply_policies};
pub use scale::{
    MAX_REPLICAS, ScalePlan, ScaleReport, parse_replica_count, replica_name, replica_names,
    scale_replicas,
};
pub use status::{StatusPatcher, merge_patch_for_path};
pub use strategy::{ClusterStrategy, ReplicaRequest, StrategyRegistry};
pub use upgrade::{add_upgrade, finalize_major_upgrade};
