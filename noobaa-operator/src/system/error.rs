use noobaa_rpc::RpcError;
use snafu::Snafu;
use stackable_operator::{
    kube::{api::DynamicObject, core::error_boundary, runtime::reflector::ObjectRef},
    logging::controller::ReconcilerError,
};
use strum::{EnumDiscriminants, IntoStaticStr};

use crate::phase::{ErrorClass, PhaseError};

#[derive(Snafu, Debug, EnumDiscriminants)]
#[strum_discriminants(derive(IntoStaticStr))]
#[allow(clippy::enum_variant_names)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("invalid system"))]
    InvalidSystem {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("system must be named {expected}, not {name}"))]
    SystemNameMismatch { name: String, expected: String },

    #[snafu(display("image {image} cannot be parsed: {reason}"))]
    InvalidImage { image: String, reason: String },

    #[snafu(display("image {image} has version {version}, which does not satisfy {constraint}"))]
    InvalidImageVersion {
        image: String,
        version: String,
        constraint: String,
    },

    #[snafu(display("configured image version constraint {constraint} is invalid"))]
    InvalidVersionConstraint {
        source: semver::Error,
        constraint: String,
    },

    #[snafu(display("endpoints need 1 <= minCount <= maxCount, got {min}..{max}"))]
    InvalidEndpoints { min: i32, max: i32 },

    #[snafu(display("virtual host {host} is not a fully qualified DNS name"))]
    InvalidVirtualHost { host: String },

    #[snafu(display("join secret reference has no name"))]
    JoinSecretHasNoName,

    #[snafu(display("join secret {name} does not exist"))]
    MissingJoinSecret { name: String },

    #[snafu(display("join secret {name} has no {key}"))]
    MissingJoinSecretKey { name: String, key: String },

    #[snafu(display("join secret {name} holds an invalid address"))]
    InvalidJoinAddress { source: RpcError, name: String },

    #[snafu(display("failed to read secret {name}"))]
    ReadSecret {
        source: crate::secret::Error,
        name: String,
    },

    #[snafu(display("failed to build secret {name}"))]
    BuildSecret {
        source: crate::secret::Error,
        name: String,
    },

    #[snafu(display("failed to apply secret {name}"))]
    ApplySecret {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to create cluster resources"))]
    CreateClusterResources {
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

    #[snafu(display("invalid container name"))]
    InvalidContainerName {
        name: String,
        source: stackable_operator::builder::pod::container::Error,
    },

    #[snafu(display("failed to add volume mount"))]
    AddVolumeMount {
        source: stackable_operator::builder::pod::container::Error,
    },

    #[snafu(display("failed to build RBAC resources"))]
    BuildRbacResources {
        source: stackable_operator::commons::rbac::Error,
    },

    #[snafu(display("failed to create RBAC service account"))]
    ApplyServiceAccount {
        source: stackable_operator::cluster_resources::Error,
    },

    #[snafu(display("failed to create RBAC role binding"))]
    ApplyRoleBinding {
        source: stackable_operator::cluster_resources::Error,
    },

    #[snafu(display("failed to apply StatefulSet {name}"))]
    ApplyStatefulSet {
        source: stackable_operator::cluster_resources::Error,
        name: String,
    },

    #[snafu(display("failed to apply Service {name}"))]
    ApplyService {
        source: stackable_operator::cluster_resources::Error,
        name: String,
    },

    #[snafu(display("failed to apply endpoints Deployment"))]
    ApplyDeployment {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to apply endpoints autoscaler"))]
    ApplyAutoscaler {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to delete endpoints autoscaler"))]
    DeleteAutoscaler {
        source: stackable_operator::kube::Error,
    },

    #[snafu(display("failed to apply {kind}"))]
    ApplyMonitoring {
        source: stackable_operator::kube::Error,
        kind: String,
    },

    #[snafu(display("failed to get core pod"))]
    GetCorePod {
        source: stackable_operator::client::Error,
    },

    #[snafu(display("failed to connect to the system"))]
    Remote { source: crate::remote::Error },

    #[snafu(display("rpc {method} failed"))]
    Rpc {
        source: RpcError,
        method: &'static str,
    },

    #[snafu(display("no account {email} in the system"))]
    AdminAccountNotFound { email: String },

    #[snafu(display("account {email} has no access keys"))]
    MissingAdminKeys { email: String },

    #[snafu(display("failed to look up {kind} {name}"))]
    GetDefault {
        source: stackable_operator::client::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to prepare target bucket {bucket}"))]
    TargetBucket {
        source: s3::error::S3Error,
        bucket: String,
    },

    #[snafu(display("failed to apply {kind} {name}"))]
    ApplyDefault {
        source: stackable_operator::client::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to delete StorageClass {name}"))]
    DeleteStorageClass {
        source: stackable_operator::kube::Error,
        name: String,
    },

    #[snafu(display("failed to delete database volume claims"))]
    DeleteVolumeClaims {
        source: stackable_operator::kube::Error,
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
            Error::SystemNameMismatch { .. } => "InvalidSystemName",
            Error::InvalidImage { .. } => "InvalidImage",
            Error::InvalidImageVersion { .. } | Error::InvalidVersionConstraint { .. } => {
                "InvalidImageVersion"
            }
            Error::InvalidEndpoints { .. } => "InvalidEndpointsSpec",
            Error::InvalidVirtualHost { .. } => "InvalidVirtualHost",
            Error::JoinSecretHasNoName | Error::MissingJoinSecret { .. } => "MissingJoinSecret",
            Error::MissingJoinSecretKey { .. } | Error::InvalidJoinAddress { .. } => {
                "InvalidJoinSecret"
            }
            _ => return ErrorClass::Temporary,
        };
        ErrorClass::Persistent {
            reason: reason.to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
