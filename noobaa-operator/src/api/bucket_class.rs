use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::kube::CustomResource;

use super::{Phase, conditions::Condition};

pub const PLACEMENT_MIRROR: &str = "Mirror";
pub const PLACEMENT_SPREAD: &str = "Spread";

/// Class the system creates and claims bind to when they name none.
pub const DEFAULT_BUCKET_CLASS: &str = "noobaa-default-bucket-class";

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "BucketClass",
    group = "noobaa.io",
    version = "v1alpha1",
    plural = "bucketclasses",
    status = "BucketClassStatus",
    shortname = "bc",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct BucketClassSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_policy: Option<PlacementPolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace_policy: Option<NamespacePolicy>,

    /// JSON list of replication rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replication_policy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota: Option<Quota>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlacementPolicy {
    pub tiers: Vec<Tier>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Tier {
    /// `Mirror` or `Spread`, defaults to spread
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<String>,

    #[serde(default)]
    pub backing_stores: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, strum::Display)]
pub enum NamespacePolicyType {
    Single,
    Multi,
    Cache,
}

#[derive(Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NamespacePolicy {
    #[serde(rename = "type")]
    pub type_: NamespacePolicyType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub single: Option<SingleNamespacePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multi: Option<MultiNamespacePolicy>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheNamespacePolicy>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SingleNamespacePolicy {
    pub resource: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MultiNamespacePolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_resource: Option<String>,
    #[serde(default)]
    pub read_resources: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheNamespacePolicy {
    pub hub_resource: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caching: Option<CacheSpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CacheSpec {
    /// Time to live of cached objects in milliseconds
    #[serde(default)]
    pub ttl: i64,
}

/// Upper bounds of a bucket; `maxSize` is a quantity such as `10Gi`.
#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Quota {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_size: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_objects: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BucketClassStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl NamespacePolicy {
    /// Namespace stores this policy reads from or writes to.
    pub fn referenced_stores(&self) -> Vec<&str> {
        let mut stores = vec![];
        if let Some(single) = &self.single {
            stores.push(single.resource.as_str());
        }
        if let Some(multi) = &self.multi {
            stores.extend(multi.write_resource.as_deref());
            stores.extend(multi.read_resources.iter().map(String::as_str));
        }
        if let Some(cache) = &self.cache {
            stores.push(cache.hub_resource.as_str());
        }
        stores.sort_unstable();
        stores.dedup();
        stores
    }
}

impl BucketClass {
    pub fn backing_stores(&self) -> Vec<&str> {
        let mut stores: Vec<&str> = self
            .spec
            .placement_policy
            .iter()
            .flat_map(|policy| policy.tiers.iter())
            .flat_map(|tier| tier.backing_stores.iter().map(String::as_str))
            .collect();
        stores.sort_unstable();
        stores.dedup();
        stores
    }

    pub fn namespace_stores(&self) -> Vec<&str> {
        self.spec
            .namespace_policy
            .as_ref()
            .map(NamespacePolicy::referenced_stores)
            .unwrap_or_default()
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.phase)
            .is_some_and(|phase| phase == Phase::Ready)
    }
}
