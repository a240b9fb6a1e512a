//! Translating a bucket class into the remote policy shapes.
//!
//! Shared with the claim reconciler, which creates buckets from the same
//! class spec that this module validates.

use noobaa_rpc::types::{
    BucketClassInfo, CacheSpec, DataPlacement, NamespaceBucketInfo, NamespaceResourceConfig,
    QuantityQuota, QuotaConfig, ReplicationPolicy, ReplicationRule, SizeQuota, TierInfo,
    TierItem, TieringPolicyInfo,
};
use snafu::{OptionExt, ensure};

use super::error::{
    CacheWithoutPlacementSnafu, ConflictingPoliciesSnafu, EmptyPlacementSnafu, EmptyTierSnafu,
    InvalidQuotaSnafu, InvalidReplicationSnafu, MirrorNeedsTwoStoresSnafu,
    MissingNamespacePolicySectionSnafu, MissingPolicySnafu, Result, UnknownPlacementSnafu,
};
use crate::{
    api::bucket_class::{
        BucketClassSpec, NamespacePolicy, NamespacePolicyType, PLACEMENT_MIRROR,
        PLACEMENT_SPREAD, PlacementPolicy, Quota, Tier,
    },
    quantity::parse_quantity,
};

const GIB: u64 = 1 << 30;
const TIB: u64 = 1 << 40;
const PIB: u64 = 1 << 50;

/// Static checks on the class spec; store lookups happen in the reconciler.
pub fn verify_spec(spec: &BucketClassSpec) -> Result<()> {
    match (&spec.placement_policy, &spec.namespace_policy) {
        (None, None) => return MissingPolicySnafu.fail(),
        (Some(_), Some(ns)) if ns.type_ != NamespacePolicyType::Cache => {
            return ConflictingPoliciesSnafu.fail();
        }
        (None, Some(ns)) if ns.type_ == NamespacePolicyType::Cache => {
            return CacheWithoutPlacementSnafu.fail();
        }
        _ => {}
    }
    if let Some(placement) = &spec.placement_policy {
        verify_placement(placement)?;
    }
    if let Some(namespace) = &spec.namespace_policy {
        namespace_block(namespace, None)?;
    }
    if let Some(quota) = &spec.quota {
        quota_config(quota)?;
    }
    if let Some(replication) = &spec.replication_policy {
        replication_policy(replication)?;
    }
    Ok(())
}

pub fn data_placement(tier: &Tier, idx: usize) -> Result<DataPlacement> {
    match tier.placement.as_deref() {
        None | Some("") => Ok(DataPlacement::Spread),
        Some(PLACEMENT_SPREAD) => Ok(DataPlacement::Spread),
        Some(PLACEMENT_MIRROR) => Ok(DataPlacement::Mirror),
        Some(other) => UnknownPlacementSnafu {
            placement: other,
            tier: idx,
        }
        .fail(),
    }
}

fn verify_placement(policy: &PlacementPolicy) -> Result<()> {
    ensure!(!policy.tiers.is_empty(), EmptyPlacementSnafu);
    for (idx, tier) in policy.tiers.iter().enumerate() {
        ensure!(!tier.backing_stores.is_empty(), EmptyTierSnafu { tier: idx });
        if data_placement(tier, idx)? == DataPlacement::Mirror {
            let count = tier.backing_stores.len();
            ensure!(count >= 2, MirrorNeedsTwoStoresSnafu { tier: idx, count });
        }
    }
    Ok(())
}

/// Tiers and tiering policy for `policy_name`.
///
/// Tier names are taken from `existing` where it has one for the same
/// position, so a re-push updates tiers in place instead of replacing them.
pub fn tiering(
    class_name: &str,
    policy_name: &str,
    placement: &PlacementPolicy,
    existing: Option<&TieringPolicyInfo>,
) -> Result<BucketClassInfo> {
    let mut tiers = Vec::with_capacity(placement.tiers.len());
    let mut items = Vec::with_capacity(placement.tiers.len());
    for (idx, tier) in placement.tiers.iter().enumerate() {
        let name = existing
            .and_then(|policy| policy.tiers.iter().find(|item| item.order == idx as i32))
            .map(|item| item.tier.clone())
            .unwrap_or_else(|| format!("{policy_name}.{idx}"));
        tiers.push(TierInfo {
            name: name.clone(),
            attached_pools: tier.backing_stores.clone(),
            data_placement: data_placement(tier, idx)?,
        });
        items.push(TierItem {
            order: idx as i32,
            tier: name,
            spillover: None,
            disabled: None,
        });
    }
    Ok(BucketClassInfo {
        name: class_name.to_owned(),
        policy: TieringPolicyInfo {
            name: policy_name.to_owned(),
            tiers: items,
        },
        tiers,
    })
}

/// The placement a remote revert asks the class to be rewritten to.
pub fn placement_from_info(info: &BucketClassInfo) -> PlacementPolicy {
    let mut items = info.policy.tiers.clone();
    items.sort_by_key(|item| item.order);
    let tiers = items
        .iter()
        .filter_map(|item| info.tiers.iter().find(|tier| tier.name == item.tier))
        .map(|tier| Tier {
            placement: Some(
                match tier.data_placement {
                    DataPlacement::Mirror => PLACEMENT_MIRROR,
                    DataPlacement::Spread => PLACEMENT_SPREAD,
                }
                .to_owned(),
            ),
            backing_stores: tier.attached_pools.clone(),
        })
        .collect();
    PlacementPolicy { tiers }
}

fn resource(name: &str, path: Option<&str>) -> NamespaceResourceConfig {
    NamespaceResourceConfig {
        resource: name.to_owned(),
        path: path.map(str::to_owned),
    }
}

/// The `namespace` block of a namespace bucket, with an optional path prefix
/// applied to every resource.
pub fn namespace_block(policy: &NamespacePolicy, path: Option<&str>) -> Result<NamespaceBucketInfo> {
    let missing = || MissingNamespacePolicySectionSnafu {
        type_: policy.type_.to_string(),
    };
    let block = match policy.type_ {
        NamespacePolicyType::Single => {
            let single = policy.single.as_ref().with_context(missing)?;
            NamespaceBucketInfo {
                write_resource: resource(&single.resource, path),
                read_resources: vec![resource(&single.resource, path)],
                caching: None,
            }
        }
        NamespacePolicyType::Multi => {
            let multi = policy.multi.as_ref().with_context(missing)?;
            let write = multi
                .write_resource
                .as_deref()
                .or(multi.read_resources.first().map(String::as_str))
                .with_context(missing)?;
            NamespaceBucketInfo {
                write_resource: resource(write, path),
                read_resources: multi
                    .read_resources
                    .iter()
                    .map(|name| resource(name, path))
                    .collect(),
                caching: None,
            }
        }
        NamespacePolicyType::Cache => {
            let cache = policy.cache.as_ref().with_context(missing)?;
            NamespaceBucketInfo {
                write_resource: resource(&cache.hub_resource, path),
                read_resources: vec![resource(&cache.hub_resource, path)],
                caching: Some(CacheSpec {
                    ttl_ms: cache.caching.as_ref().map(|c| c.ttl).unwrap_or_default(),
                }),
            }
        }
    };
    Ok(block)
}

fn size_quota(bytes: u64) -> SizeQuota {
    let (divisor, unit) = if bytes % PIB == 0 {
        (PIB, "PETABYTE")
    } else if bytes % TIB == 0 {
        (TIB, "TERABYTE")
    } else {
        (GIB, "GIGABYTE")
    };
    SizeQuota {
        value: bytes as f64 / divisor as f64,
        unit: unit.to_owned(),
    }
}

/// Remote quota for the class quota, `None` when neither bound is set.
pub fn quota_config(quota: &Quota) -> Result<Option<QuotaConfig>> {
    let size = match quota.max_size.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(max_size) => {
            let bytes = parse_quantity(max_size).context(InvalidQuotaSnafu {
                message: format!("maxSize {max_size} is not a quantity"),
            })?;
            ensure!(
                bytes >= GIB,
                InvalidQuotaSnafu {
                    message: format!("maxSize {max_size} is below 1Gi"),
                }
            );
            Some(size_quota(bytes))
        }
    };
    let quantity = match quota.max_objects.as_deref().filter(|s| !s.is_empty()) {
        None => None,
        Some(max_objects) => {
            let value = max_objects
                .parse::<i64>()
                .ok()
                .filter(|value| *value >= 0)
                .context(InvalidQuotaSnafu {
                    message: format!("maxObjects {max_objects} is not a non-negative integer"),
                })?;
            Some(QuantityQuota { value })
        }
    };
    if size.is_none() && quantity.is_none() {
        return Ok(None);
    }
    Ok(Some(QuotaConfig { size, quantity }))
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ReplicationDoc {
    Rules(Vec<ReplicationRule>),
    Policy(ReplicationPolicy),
}

/// Parses the JSON replication rules, a bare list or `{"rules": [...]}`.
pub fn replication_policy(json: &str) -> Result<ReplicationPolicy> {
    let doc: ReplicationDoc = serde_json::from_str(json).map_err(|err| {
        InvalidReplicationSnafu {
            message: err.to_string(),
        }
        .build()
    })?;
    let policy = match doc {
        ReplicationDoc::Rules(rules) => ReplicationPolicy { rules },
        ReplicationDoc::Policy(policy) => policy,
    };
    let mut ids = std::collections::BTreeSet::new();
    for rule in &policy.rules {
        ensure!(
            !rule.rule_id.is_empty() && !rule.destination_bucket.is_empty(),
            InvalidReplicationSnafu {
                message: "every rule needs rule_id and destination_bucket"
            }
        );
        ensure!(
            ids.insert(rule.rule_id.as_str()),
            InvalidReplicationSnafu {
                message: format!("rule_id {} is used twice", rule.rule_id),
            }
        );
    }
    Ok(policy)
}
