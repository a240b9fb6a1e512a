use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::{k8s_openapi::api::core::v1::SecretReference, kube::CustomResource};

use super::{Phase, conditions::Condition};

/// An s3 account inside the storage system.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "NooBaaAccount",
    group = "noobaa.io",
    version = "v1alpha1",
    plural = "noobaaaccounts",
    status = "NooBaaAccountStatus",
    shortname = "nba",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct NooBaaAccountSpec {
    #[serde(default)]
    pub allow_bucket_creation: bool,

    /// Backing or namespace store new buckets land on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_resource: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_buckets: Option<AllowedBuckets>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfs_account_config: Option<NsfsAccountConfig>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllowedBuckets {
    #[serde(default)]
    pub full_permission: bool,
    #[serde(default)]
    pub permission_list: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NsfsAccountConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_buckets_path: Option<String>,
    #[serde(default)]
    pub nsfs_only: bool,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NooBaaAccountStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Secret carrying the account's access keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<SecretReference>,
}

impl From<&NsfsAccountConfig> for noobaa_rpc::types::NsfsAccountConfig {
    fn from(config: &NsfsAccountConfig) -> Self {
        noobaa_rpc::types::NsfsAccountConfig {
            uid: config.uid,
            gid: config.gid,
            new_buckets_path: config.new_buckets_path.clone(),
            nsfs_only: config.nsfs_only,
        }
    }
}

impl From<&AllowedBuckets> for noobaa_rpc::types::AccountAllowedBuckets {
    fn from(allowed: &AllowedBuckets) -> Self {
        noobaa_rpc::types::AccountAllowedBuckets {
            full_permission: allowed.full_permission,
            permission_list: allowed.permission_list.clone(),
        }
    }
}
