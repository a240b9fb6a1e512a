use serde::{Deserialize, Serialize};

use crate::bigint::BigInt;

/// Back reference from a pool to the custom resource that owns it.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct OwnerResourceInfo {
    pub name: String,
    pub namespace: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolHostsInfo {
    pub volume_size: i64,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateHostsPoolParams {
    pub name: String,
    pub is_managed: bool,
    pub host_count: i32,
    pub host_config: PoolHostsInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backingstore: Option<OwnerResourceInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateCloudPoolParams {
    pub name: String,
    pub connection: String,
    pub target_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backingstore: Option<OwnerResourceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_capacity: Option<BigInt>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpdateCloudPoolParams {
    pub name: String,
    pub available_capacity: BigInt,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PoolNameParams {
    pub name: String,
}

impl PoolNameParams {
    pub fn new(name: impl Into<String>) -> Self {
        PoolNameParams { name: name.into() }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct CreateNamespaceResourceParams {
    pub name: String,
    pub connection: String,
    pub target_bucket: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_store: Option<OwnerResourceInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolStorage {
    #[serde(default)]
    pub total: BigInt,
    #[serde(default)]
    pub free: BigInt,
    #[serde(default)]
    pub used: BigInt,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolInfo {
    pub name: String,
    #[serde(default)]
    pub resource_type: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage: Option<PoolStorage>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceResourceInfo {
    pub name: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_bucket: Option<String>,
}
