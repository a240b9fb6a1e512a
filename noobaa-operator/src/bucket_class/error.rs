use noobaa_rpc::RpcError;
use snafu::Snafu;
use stackable_operator::{
    kube::{api::DynamicObject, core::error_boundary, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    api::store::StoreKind,
    phase::{ErrorClass, PhaseError},
};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid bucket class"))]
    InvalidBucketClass {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("either placementPolicy or namespacePolicy must be set"))]
    MissingPolicy,

    #[snafu(display("placementPolicy and namespacePolicy are exclusive unless the namespace policy is Cache"))]
    ConflictingPolicies,

    #[snafu(display("a Cache namespace policy needs a placementPolicy for its hub"))]
    CacheWithoutPlacement,

    #[snafu(display("namespace policy of type {type_} is missing its {type_} section"))]
    MissingNamespacePolicySection { type_: String },

    #[snafu(display("placement policy has no tiers"))]
    EmptyPlacement,

    #[snafu(display("tier {tier} has no backing stores"))]
    EmptyTier { tier: usize },

    #[snafu(display("unknown placement {placement} in tier {tier}, expected Mirror or Spread"))]
    UnknownPlacement { placement: String, tier: usize },

    #[snafu(display("tier {tier} mirrors across {count} backing stores, at least two are needed"))]
    MirrorNeedsTwoStores { tier: usize, count: usize },

    #[snafu(display("invalid quota: {message}"))]
    InvalidQuota { message: String },

    #[snafu(display("invalid replication policy: {message}"))]
    InvalidReplication { message: String },

    #[snafu(display("{kind} {name} does not exist"))]
    MissingStore { kind: StoreKind, name: String },

    #[snafu(display("{kind} {name} is rejected"))]
    RejectedStore { kind: StoreKind, name: String },

    #[snafu(display("{kind} {name} is not ready yet"))]
    StoreNotReady { kind: StoreKind, name: String },

    #[snafu(display("failed to get {kind} {name}"))]
    GetStore {
        source: stackable_operator::client::Error,
        kind: StoreKind,
        name: String,
    },

    #[snafu(display("policy of bucket {bucket} was reverted: {message}"))]
    Reverted { bucket: String, message: String },

    #[snafu(display("failed to list object buckets"))]
    ListObjectBuckets {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to record the applied generation on object bucket {name}"))]
    UpdateObjectBucket {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to rewrite the bucket class spec"))]
    RevertSpec {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to connect to the system"))]
    Remote { source: crate::remote::Error },

    #[snafu(display("rpc {method} failed"))]
    Rpc {
        source: RpcError,
        method: &'static str,
    },

    #[snafu(display("failed to update finalizer or labels"))]
    UpdateMeta {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to update status"))]
    ApplyStatus {
        source: stackable_operator::client::Error,
    },
}

impl ReconcilerError for Error {
    fn category(&self) -> &'static str {
        ErrorDiscriminants::from(self).into()
    }

    fn secondary_object(&self) -> Option<ObjectRef<DynamicObject>> {
        None
    }
}

impl PhaseError for Error {
    fn class(&self) -> ErrorClass {
        let reason = match self {
            Error::MissingPolicy
            | Error::ConflictingPolicies
            | Error::CacheWithoutPlacement
            | Error::MissingNamespacePolicySection { .. } => "InvalidPolicy".to_owned(),
            Error::EmptyPlacement
            | Error::EmptyTier { .. }
            | Error::UnknownPlacement { .. }
            | Error::MirrorNeedsTwoStores { .. } => "InvalidPlacement".to_owned(),
            Error::InvalidQuota { .. } => "InvalidQuota".to_owned(),
            Error::InvalidReplication { .. } => "InvalidReplicationPolicy".to_owned(),
            Error::MissingStore { kind, .. } => format!("Missing{kind}"),
            Error::RejectedStore { kind, .. } => format!("Rejected{kind}"),
            Error::Reverted { .. } => "InvalidConfReverting".to_owned(),
            _ => return ErrorClass::Temporary,
        };
        ErrorClass::Persistent { reason }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
