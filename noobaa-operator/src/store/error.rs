use noobaa_rpc::RpcError;
use snafu::Snafu;
use stackable_operator::{
    kube::{api::DynamicObject, core::error_boundary, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::{
    api::store::{StoreKind, StoreType},
    phase::{ErrorClass, PhaseError},
};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid store"))]
    InvalidStore {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("{kind} of type {store_type} is missing its {store_type} section"))]
    MissingTypeSpec {
        kind: StoreKind,
        store_type: StoreType,
    },

    #[snafu(display("{kind} sets {count} type sections, exactly one is allowed"))]
    AmbiguousTypeSpec { kind: StoreKind, count: usize },

    #[snafu(display("type {store_type} is not supported by {kind}"))]
    UnsupportedType {
        kind: StoreKind,
        store_type: StoreType,
    },

    #[snafu(display("name {name} is already taken by a {other}"))]
    NameInUse { name: String, other: StoreKind },

    #[snafu(display("failed to look up stores of the other kind"))]
    CheckNameConflict {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("secret {name} referenced by the store does not exist"))]
    MissingSecret { name: String },

    #[snafu(display("secret reference of the store has no name"))]
    SecretRefHasNoName,

    #[snafu(display("secret {name} has no {key}"))]
    MissingSecretKey { name: String, key: String },

    #[snafu(display("target bucket must not be empty"))]
    EmptyTargetBucket,

    #[snafu(display("{store_type} needs a region"))]
    MissingRegion { store_type: StoreType },

    #[snafu(display("signature version {version} is not supported by {store_type}"))]
    InvalidSignatureVersion {
        version: String,
        store_type: StoreType,
    },

    #[snafu(display("pv pool needs between 1 and {max} volumes, got {count}"))]
    InvalidVolumeCount { count: i32, max: i32 },

    #[snafu(display("nsfs store needs a pvc name"))]
    EmptyPvcName,

    #[snafu(display("remote pool is in mode {mode}"))]
    RejectedMode { mode: String },

    #[snafu(display("failed to get secret {name}"))]
    GetSecret {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to read secret"))]
    ReadSecret { source: crate::secret::Error },

    #[snafu(display("failed to get system"))]
    GetSystem {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to connect to the system"))]
    Remote { source: crate::remote::Error },

    #[snafu(display("rpc {method} failed"))]
    Rpc {
        source: RpcError,
        method: &'static str,
    },

    #[snafu(display("failed to list bucket classes"))]
    ListBucketClasses {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to update finalizer or labels"))]
    UpdateMeta {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to update status"))]
    ApplyStatus {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to create cluster resources"))]
    CreateClusterResources {
        source: stackable_operator::cluster_resources::Error,
    },

    #[snafu(display("failed to apply pv pool StatefulSet"))]
    ApplyStatefulSet {
        source: stackable_operator::cluster_resources::Error,
    },

    #[snafu(display("failed to delete orphaned resources"))]
    DeleteOrphans {
        source: stackable_operator::cluster_resources::Error,
    },

    #[snafu(display("failed to build object meta data"))]
    ObjectMeta {
        source: stackable_operator::builder::meta::Error,
    },

    #[snafu(display("failed to build label"))]
    BuildLabel {
        source: stackable_operator::kvp::LabelError,
    },

    #[snafu(display("failed to add volume mount"))]
    AddVolumeMount {
        source: stackable_operator::builder::pod::container::Error,
    },

    #[snafu(display("invalid container name"))]
    InvalidContainerName {
        name: String,
        source: stackable_operator::builder::pod::container::Error,
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
            Error::MissingTypeSpec { .. }
            | Error::AmbiguousTypeSpec { .. }
            | Error::UnsupportedType { .. } => "InvalidType",
            Error::NameInUse { .. } => "NameConflict",
            Error::MissingSecret { .. } | Error::SecretRefHasNoName => "MissingSecret",
            Error::MissingSecretKey { .. } => "InvalidSecret",
            Error::EmptyTargetBucket => "InvalidTargetBucket",
            Error::MissingRegion { .. } => "MissingRegion",
            Error::InvalidSignatureVersion { .. } => "InvalidSignatureVersion",
            Error::InvalidVolumeCount { .. } | Error::EmptyPvcName => "InvalidConfiguration",
            Error::RejectedMode { mode } => return ErrorClass::Persistent {
                reason: mode.clone(),
            },
            _ => return ErrorClass::Temporary,
        };
        ErrorClass::Persistent {
            reason: reason.to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
