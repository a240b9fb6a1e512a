use serde::{Deserialize, Serialize};

use crate::bigint::BigInt;

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceResourceConfig {
    pub resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl NamespaceResourceConfig {
    pub fn new(resource: impl Into<String>) -> Self {
        NamespaceResourceConfig {
            resource: resource.into(),
            path: None,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheSpec {
    pub ttl_ms: i64,
}

/// The `namespace` block of a namespace bucket.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceBucketInfo {
    pub write_resource: NamespaceResourceConfig,
    #[serde(default)]
    pub read_resources: Vec<NamespaceResourceConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<CacheSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct SizeQuota {
    pub value: f64,
    pub unit: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct QuantityQuota {
    pub value: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct QuotaConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<SizeQuota>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<QuantityQuota>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationRule {
    pub rule_id: String,
    pub destination_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<ReplicationFilter>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_deletions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sync_versions: Option<bool>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplicationPolicy {
    #[serde(default)]
    pub rules: Vec<ReplicationRule>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketClaimInfo {
    pub bucket_class: String,
    pub namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BucketStorage {
    #[serde(default)]
    pub used: BigInt,
    #[serde(default)]
    pub free: BigInt,
    #[serde(default)]
    pub total: BigInt,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct BucketInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiering: Option<super::TieringPolicyInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceBucketInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_objects: Option<BigInt>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<BucketStorage>,
}

impl BucketInfo {
    pub fn is_namespace(&self) -> bool {
        self.namespace.is_some()
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct BucketNameParams {
    pub name: String,
}

impl BucketNameParams {
    pub fn new(name: impl Into<String>) -> Self {
        BucketNameParams { name: name.into() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct CreateBucketParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceBucketInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket_claim: Option<BucketClaimInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct UpdateBucketParams {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiering: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<QuotaConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<NamespaceBucketInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PutBucketReplicationParams {
    pub name: String,
    pub replication_policy: ReplicationPolicy,
}
