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
    #[snafu(display("invalid object bucket claim"))]
    InvalidClaim {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("object has no uid yet"))]
    ObjectHasNoUid,

    #[snafu(display("claim sets neither bucketName nor generateBucketName"))]
    MissingBucketName,

    #[snafu(display("bucket class {name} does not exist"))]
    MissingBucketClass { name: String },

    #[snafu(display("bucket class {name} is not ready yet"))]
    BucketClassNotReady { name: String },

    #[snafu(display("failed to get bucket class {name}"))]
    GetBucketClass {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("path {path} needs a bucket class with a Single or Multi namespace policy, {class} has none"))]
    PathNotSupported { path: String, class: String },

    #[snafu(display("invalid policy in bucket class or claim"))]
    ClassPolicy {
        source: crate::bucket_class::error::Error,
    },

    #[snafu(display("create_account returned no access keys for {email}"))]
    MissingAccessKeys { email: String },

    #[snafu(display("failed to get storage class {name}"))]
    GetStorageClass {
        source: stackable_operator::client::Error,
        name: String,
    },

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

    #[snafu(display("failed to get object bucket {name}"))]
    GetObjectBucket {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to apply object bucket {name}"))]
    ApplyObjectBucket {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("failed to delete object bucket {name}"))]
    DeleteObjectBucket {
        source: stackable_operator::kube::Error,
        name: String,
    },

    #[snafu(display("failed to build bucket config map"))]
    BuildConfigMap {
        source: stackable_operator::builder::configmap::Error,
    },

    #[snafu(display("failed to build metadata"))]
    ObjectMeta {
        source: stackable_operator::builder::meta::Error,
    },

    #[snafu(display("failed to build credentials secret"))]
    BuildSecret { source: crate::secret::Error },

    #[snafu(display("failed to apply {kind} {name}"))]
    ApplyClaimResource {
        source: stackable_operator::client::Error,
        kind: &'static str,
        name: String,
    },

    #[snafu(display("failed to record the object bucket on the claim"))]
    BindClaim {
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
            Error::MissingBucketName => "InvalidBucketName",
            Error::MissingBucketClass { .. } => "MissingBucketClass",
            Error::PathNotSupported { .. } => "InvalidPath",
            Error::ClassPolicy { source } => return source.class(),
            _ => return ErrorClass::Temporary,
        };
        ErrorClass::Persistent {
            reason: reason.to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
