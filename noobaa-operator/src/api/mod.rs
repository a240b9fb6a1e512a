pub mod account;
pub mod bucket_class;
pub mod conditions;
pub mod obc;
pub mod store;
pub mod system;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const GROUP: &str = "noobaa.io";
pub const OBC_GROUP: &str = "objectbucket.io";

/// Coarse lifecycle label every resource kind reports in its status.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Serialize,
    JsonSchema,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
pub enum Phase {
    #[default]
    Verifying,
    Connecting,
    Creating,
    Configuring,
    Ready,
    Rejected,
    Deleting,
}

impl Phase {
    pub fn is_final(&self) -> bool {
        matches!(self, Phase::Ready | Phase::Rejected)
    }
}
