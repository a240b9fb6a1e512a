//! Parameter and reply shapes of the management apis.

mod account;
mod bucket;
mod pool;
mod tier;

pub use account::*;
pub use bucket::*;
pub use pool::*;
pub use tier::*;

use serde::{Deserialize, Serialize};

/// Snapshot returned by `system_api.read_system`.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SystemInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub accounts: Vec<AccountInfo>,
    #[serde(default)]
    pub buckets: Vec<BucketInfo>,
    #[serde(default)]
    pub pools: Vec<PoolInfo>,
    #[serde(default)]
    pub tiers: Vec<TierInfo>,
    #[serde(default)]
    pub namespace_resources: Vec<NamespaceResourceInfo>,
}

impl SystemInfo {
    pub fn pool(&self, name: &str) -> Option<&PoolInfo> {
        self.pools.iter().find(|pool| pool.name == name)
    }

    pub fn namespace_resource(&self, name: &str) -> Option<&NamespaceResourceInfo> {
        self.namespace_resources.iter().find(|nsr| nsr.name == name)
    }

    pub fn bucket(&self, name: &str) -> Option<&BucketInfo> {
        self.buckets.iter().find(|bucket| bucket.name == name)
    }
}
