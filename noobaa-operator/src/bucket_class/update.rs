//! Pushing a changed bucket class down to the buckets bound to it.

use noobaa_rpc::{
    NoobaaApi,
    error::{RPC_CODE_NO_SUCH_BUCKET, ignore_codes},
    types::UpdateBucketParams,
};
use snafu::ResultExt;

use super::{
    error::{Result, RpcSnafu},
    policy::{namespace_block, placement_from_info, quota_config, tiering},
};
use crate::api::{
    bucket_class::{BucketClass, NamespacePolicyType, PlacementPolicy},
    obc::{ObjectBucket, STATE_PATH},
};

#[derive(Clone, Debug, PartialEq)]
pub enum BucketUpdate {
    Updated,
    /// The bucket is gone remotely, nothing to push.
    Missing,
    /// The system refused the tiering and asks for the class to be rewritten.
    Revert {
        policy: PlacementPolicy,
        message: String,
    },
}

/// Whether `bucket` was provisioned from an older generation of `class`.
pub fn is_stale(class: &BucketClass, bucket: &ObjectBucket) -> bool {
    bucket.bucket_class_generation() != class.metadata.generation
}

/// Pushes tiering, namespace and quota of `class` to one bound bucket.
pub async fn update_bound_bucket(
    api: &dyn NoobaaApi,
    class: &BucketClass,
    bucket: &ObjectBucket,
) -> Result<BucketUpdate> {
    let name = bucket.bucket_name();
    let Some(info) = ignore_codes(api.read_bucket(name).await, &[RPC_CODE_NO_SUCH_BUCKET])
        .context(RpcSnafu {
            method: "read_bucket",
        })?
    else {
        tracing::info!(bucket = name, "bound bucket no longer exists");
        return Ok(BucketUpdate::Missing);
    };

    if let (Some(placement), Some(current)) = (&class.spec.placement_policy, &info.tiering) {
        let class_name = class.metadata.name.as_deref().unwrap_or_default();
        let update = tiering(class_name, &current.name, placement, Some(current))?;
        let reply = api.update_bucket_class(update).await.context(RpcSnafu {
            method: "update_bucket_class",
        })?;
        if reply.should_revert {
            let policy = reply
                .revert_to_policy
                .as_ref()
                .map(placement_from_info)
                .unwrap_or_else(|| placement.clone());
            return Ok(BucketUpdate::Revert {
                policy,
                message: reply.error_message,
            });
        }
    }

    let namespace = match &class.spec.namespace_policy {
        Some(policy) if info.is_namespace() || policy.type_ == NamespacePolicyType::Cache => {
            Some(namespace_block(policy, bucket.state(STATE_PATH))?)
        }
        _ => None,
    };
    let quota = match &class.spec.quota {
        Some(quota) => quota_config(quota)?,
        None => None,
    };
    if namespace.is_some() || quota.is_some() {
        api.update_bucket(UpdateBucketParams {
            name: name.to_owned(),
            tiering: None,
            quota,
            namespace,
        })
        .await
        .context(RpcSnafu {
            method: "update_bucket",
        })?;
    }
    Ok(BucketUpdate::Updated)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use noobaa_rpc::types::{
        BucketClassInfo, BucketInfo, NamespaceBucketInfo, NamespaceResourceConfig, TierInfo,
        TierItem, TieringPolicyInfo, UpdateBucketClassReply,
    };

    use super::*;
    use crate::{
        api::obc::{ObjectBucketSpec, STATE_BUCKET_CLASS, STATE_BUCKET_CLASS_GENERATION},
        bucket_class::fixtures,
        testing::FakeNoobaa,
    };

    fn class(yaml: &str, generation: i64) -> BucketClass {
        let mut class: BucketClass = serde_yaml::from_str(yaml).unwrap();
        class.metadata.generation = Some(generation);
        class
    }

    fn bound(class: &str, generation: i64, bucket: &str) -> ObjectBucket {
        let mut ob = ObjectBucket::new(&format!("obc-{bucket}"), ObjectBucketSpec::default());
        ob.spec.endpoint.bucket_name = bucket.into();
        ob.spec.additional_state = BTreeMap::from([
            (STATE_BUCKET_CLASS.to_string(), class.to_string()),
            (
                STATE_BUCKET_CLASS_GENERATION.to_string(),
                generation.to_string(),
            ),
        ]);
        ob
    }

    fn placement_bucket(name: &str) -> BucketInfo {
        BucketInfo {
            name: name.into(),
            tiering: Some(TieringPolicyInfo {
                name: format!("{name}.1700000000"),
                tiers: vec![TierItem {
                    order: 0,
                    tier: format!("{name}.1700000000.0"),
                    spillover: None,
                    disabled: None,
                }],
            }),
            ..BucketInfo::default()
        }
    }

    #[test]
    fn test_is_stale() {
        let bc = class(fixtures::PLACEMENT, 2);
        assert!(is_stale(&bc, &bound("placement", 1, "photos")));
        assert!(!is_stale(&bc, &bound("placement", 2, "photos")));
    }

    #[tokio::test]
    async fn test_placement_pushed_to_existing_tiers() {
        let api = FakeNoobaa::new();
        api.add_bucket(placement_bucket("photos"));
        let bc = class(fixtures::PLACEMENT, 2);

        let update = update_bound_bucket(&api, &bc, &bound("placement", 1, "photos"))
            .await
            .unwrap();
        assert_eq!(update, BucketUpdate::Updated);

        let state = api.state();
        let pushed = &state.bucket_class_updates[0];
        assert_eq!(pushed.policy.name, "photos.1700000000");
        assert_eq!(pushed.tiers[0].name, "photos.1700000000.0");
        assert_eq!(pushed.tiers[1].name, "photos.1700000000.1");
        // the fixture carries a quota
        assert!(state.buckets["photos"].quota.is_some());
    }

    #[tokio::test]
    async fn test_revert_returns_server_policy() {
        let api = FakeNoobaa::new();
        api.add_bucket(placement_bucket("photos"));
        api.state().revert = Some(UpdateBucketClassReply {
            should_revert: true,
            revert_to_policy: Some(BucketClassInfo {
                name: "placement".into(),
                policy: TieringPolicyInfo {
                    name: "photos.1700000000".into(),
                    tiers: vec![TierItem {
                        order: 0,
                        tier: "t0".into(),
                        spillover: None,
                        disabled: None,
                    }],
                },
                tiers: vec![TierInfo {
                    name: "t0".into(),
                    attached_pools: vec!["bs1".into()],
                    ..TierInfo::default()
                }],
            }),
            error_message: "tier change would lose data".into(),
        });
        let bc = class(fixtures::PLACEMENT, 2);

        let update = update_bound_bucket(&api, &bc, &bound("placement", 1, "photos"))
            .await
            .unwrap();
        let (policy, message) = match update {
            BucketUpdate::Revert { policy, message } => (policy, message),
            other => panic!("expected a revert, got {other:?}"),
        };
        assert_eq!(message, "tier change would lose data");
        assert_eq!(policy.tiers.len(), 1);
        assert_eq!(policy.tiers[0].backing_stores, vec!["bs1"]);
        assert!(!api.called("update_bucket"));
    }

    #[tokio::test]
    async fn test_namespace_bucket_gets_namespace_block() {
        let api = FakeNoobaa::new();
        api.add_bucket(BucketInfo {
            name: "shared".into(),
            namespace: Some(NamespaceBucketInfo {
                write_resource: NamespaceResourceConfig::new("nss1"),
                read_resources: vec![NamespaceResourceConfig::new("nss1")],
                caching: None,
            }),
            ..BucketInfo::default()
        });
        let bc = class(fixtures::MULTI, 3);

        update_bound_bucket(&api, &bc, &bound("multi", 2, "shared"))
            .await
            .unwrap();
        assert!(!api.called("update_bucket_class"));
        let state = api.state();
        let namespace = state.buckets["shared"].namespace.as_ref().unwrap();
        assert_eq!(namespace.read_resources.len(), 3);
    }

    #[tokio::test]
    async fn test_missing_bucket_is_skipped() {
        let api = FakeNoobaa::new();
        let bc = class(fixtures::PLACEMENT, 2);
        let update = update_bound_bucket(&api, &bc, &bound("placement", 1, "gone"))
            .await
            .unwrap();
        assert_eq!(update, BucketUpdate::Missing);
        assert_eq!(api.calls(), vec!["read_bucket"]);
    }
}
