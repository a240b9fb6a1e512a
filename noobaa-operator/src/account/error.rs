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
    #[snafu(display("invalid account"))]
    InvalidAccount {
        source: error_boundary::InvalidObject,
    },

    #[snafu(display("object defines no namespace"))]
    ObjectHasNoNamespace,

    #[snafu(display("accounts allowed to create buckets need a default resource"))]
    DefaultResourceRequired,

    #[snafu(display("default resource {name} is neither a backing store nor a namespace store"))]
    MissingDefaultResource { name: String },

    #[snafu(display("default resource {name} names both a backing store and a namespace store"))]
    AmbiguousDefaultResource { name: String },

    #[snafu(display("failed to look up store {name}"))]
    GetStore {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("create_account returned no access keys for {email}"))]
    MissingAccessKeys { email: String },

    #[snafu(display("failed to connect to the system"))]
    Remote { source: crate::remote::Error },

    #[snafu(display("rpc {method} failed"))]
    Rpc {
        source: RpcError,
        method: &'static str,
    },

    #[snafu(display("failed to build credentials secret"))]
    BuildSecret { source: crate::secret::Error },

    #[snafu(display("failed to apply credentials secret {name}"))]
    ApplySecret {
        source: stackable_operator::client::Error,
        name: String,
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
            Error::DefaultResourceRequired | Error::MissingDefaultResource { .. } => {
                "MissingDefaultResource"
            }
            Error::AmbiguousDefaultResource { .. } => "InvalidDefaultResource",
            _ => return ErrorClass::Temporary,
        };
        ErrorClass::Persistent {
            reason: reason.to_owned(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
