//! Resources of the `objectbucket.io` bucket provisioning standard.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::{k8s_openapi::api::core::v1::ObjectReference, kube::CustomResource};

use super::{Phase, conditions::Condition};

/// `spec.additionalState` keys the provisioner records on an [`ObjectBucket`].
pub const STATE_BUCKET_CLASS: &str = "bucketclass";
pub const STATE_BUCKET_CLASS_GENERATION: &str = "bucketclassgeneration";
pub const STATE_ACCOUNT: &str = "account";
pub const STATE_BUCKET_NAME: &str = "bucketname";
pub const STATE_PATH: &str = "path";

/// `spec.additionalConfig` keys a claim may set.
pub const CONFIG_BUCKET_CLASS: &str = "bucketclass";
pub const CONFIG_PATH: &str = "path";
pub const CONFIG_REPLICATION_POLICY: &str = "replicationPolicy";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "ObjectBucketClaim",
    group = "objectbucket.io",
    version = "v1alpha1",
    plural = "objectbucketclaims",
    status = "ObjectBucketClaimStatus",
    shortname = "obc",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimSpec {
    pub storage_class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_bucket_name: Option<String>,

    #[serde(default)]
    pub additional_config: BTreeMap<String, String>,

    /// Set by the provisioner once the bucket is bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_bucket_name: Option<String>,
}

#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq, strum::Display,
)]
pub enum ObcPhase {
    #[default]
    Pending,
    Bound,
    Released,
    Failed,
}

impl From<Phase> for ObcPhase {
    fn from(phase: Phase) -> Self {
        match phase {
            Phase::Ready => ObcPhase::Bound,
            Phase::Rejected => ObcPhase::Failed,
            Phase::Deleting => ObcPhase::Released,
            _ => ObcPhase::Pending,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketClaimStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ObcPhase>,

    /// Finer grained reconcile phase behind the standard one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reconcile_phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "ObjectBucket",
    group = "objectbucket.io",
    version = "v1alpha1",
    plural = "objectbuckets",
    status = "ObjectBucketStatus",
    shortname = "ob",
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketSpec {
    pub storage_class_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claim_ref: Option<ObjectReference>,

    #[serde(default)]
    pub reclaim_policy: ReclaimPolicy,

    pub endpoint: BucketEndpoint,

    #[serde(default)]
    pub additional_state: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum ReclaimPolicy {
    #[default]
    Delete,
    Retain,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketEndpoint {
    pub bucket_host: String,
    pub bucket_port: i32,
    pub bucket_name: String,
    #[serde(default)]
    pub region: String,
    #[serde(default)]
    pub sub_region: String,
    #[serde(default)]
    pub additional_config: BTreeMap<String, String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ObjectBucketStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ObcPhase>,
}

impl ObjectBucket {
    pub fn state(&self, key: &str) -> Option<&str> {
        self.spec.additional_state.get(key).map(String::as_str)
    }

    pub fn bucket_class(&self) -> Option<&str> {
        self.state(STATE_BUCKET_CLASS)
    }

    pub fn bucket_class_generation(&self) -> Option<i64> {
        self.state(STATE_BUCKET_CLASS_GENERATION)
            .and_then(|generation| generation.parse().ok())
    }

    pub fn bucket_name(&self) -> &str {
        &self.spec.endpoint.bucket_name
    }
}

impl ObjectBucketClaim {
    pub fn config(&self, key: &str) -> Option<&str> {
        self.spec
            .additional_config
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}
