//! The remote half of a claim: the bucket with its tiering, and the account
//! whose keys the claim receives.

use noobaa_rpc::{
    NoobaaApi,
    error::{
        RPC_CODE_ACCOUNT_ALREADY_EXISTS, RPC_CODE_BUCKET_ALREADY_EXISTS,
        RPC_CODE_BUCKET_ALREADY_OWNED_BY_YOU, RPC_CODE_NO_SUCH_ACCOUNT, RPC_CODE_NO_SUCH_BUCKET,
        ignore_codes,
    },
    types::{
        AccountAllowedBuckets, BucketClaimInfo, CreateAccountParams, CreateBucketParams,
        PutBucketReplicationParams, ReplicationPolicy, S3AccessKeys, UpdateBucketParams,
    },
};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    k8s_openapi::chrono::{DateTime, Utc},
    kube::ResourceExt,
};

use super::error::{
    ClassPolicySnafu, Error, MissingAccessKeysSnafu, MissingBucketNameSnafu, ObjectHasNoUidSnafu,
    PathNotSupportedSnafu, Result, RpcSnafu,
};
use crate::{
    api::{
        bucket_class::{BucketClass, NamespacePolicyType},
        obc::{ObjectBucket, ObjectBucketClaim, ReclaimPolicy, STATE_ACCOUNT},
    },
    bucket_class::policy::{namespace_block, quota_config, replication_policy, tiering},
};

pub const ACCOUNT_EMAIL_DOMAIN: &str = "noobaa.io";

/// Bucket name of a claim; generated names get a stable suffix from the claim uid.
pub fn bucket_name(claim: &ObjectBucketClaim) -> Result<String> {
    if let Some(name) = claim.spec.bucket_name.as_deref().filter(|n| !n.is_empty()) {
        return Ok(name.to_owned());
    }
    let prefix = claim
        .spec
        .generate_bucket_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .context(MissingBucketNameSnafu)?;
    let uid = claim.uid().context(ObjectHasNoUidSnafu)?;
    let suffix: String = uid.chars().filter(|c| *c != '-').take(8).collect();
    Ok(format!("{prefix}-{suffix}"))
}

pub fn account_name(bucket: &str) -> String {
    format!("obc-account.{bucket}")
}

pub fn account_email(bucket: &str) -> String {
    format!("{}@{ACCOUNT_EMAIL_DOMAIN}", account_name(bucket))
}

/// Store new objects of the claim's account land on.
pub fn default_resource(class: &BucketClass) -> Option<String> {
    if let Some(policy) = &class.spec.namespace_policy {
        if policy.type_ != NamespacePolicyType::Cache {
            return namespace_block(policy, None)
                .ok()
                .map(|block| block.write_resource.resource);
        }
    }
    class.backing_stores().first().map(|store| store.to_string())
}

/// A path prefix only makes sense for plain namespace buckets.
pub fn check_path(class: &BucketClass, path: Option<&str>) -> Result<()> {
    let Some(path) = path else {
        return Ok(());
    };
    let supported = class
        .spec
        .namespace_policy
        .as_ref()
        .is_some_and(|policy| policy.type_ != NamespacePolicyType::Cache);
    if !supported {
        return PathNotSupportedSnafu {
            path,
            class: class.name_any(),
        }
        .fail();
    }
    Ok(())
}

/// Replication rules of the claim, falling back to those of the class.
pub fn claim_replication(
    class: &BucketClass,
    claim_rules: Option<&str>,
) -> Result<Option<ReplicationPolicy>> {
    claim_rules
        .or(class.spec.replication_policy.as_deref())
        .map(replication_policy)
        .transpose()
        .context(ClassPolicySnafu)
}

pub struct BucketRequest<'a> {
    pub bucket: &'a str,
    pub claim_namespace: &'a str,
    pub class: &'a BucketClass,
    pub path: Option<&'a str>,
    pub replication: Option<ReplicationPolicy>,
}

/// Creates the bucket with its tiering unless it exists, then pushes
/// replication and quota.
pub async fn ensure_bucket(
    api: &dyn NoobaaApi,
    request: BucketRequest<'_>,
    now: DateTime<Utc>,
) -> Result<()> {
    let bucket = request.bucket;
    let class = request.class;
    let class_name = class.name_any();

    let existing = ignore_codes(api.read_bucket(bucket).await, &[RPC_CODE_NO_SUCH_BUCKET])
        .context(RpcSnafu {
            method: "read_bucket",
        })?;
    if existing.is_none() {
        let mut params = CreateBucketParams {
            name: bucket.to_owned(),
            bucket_claim: Some(BucketClaimInfo {
                bucket_class: class_name.clone(),
                namespace: request.claim_namespace.to_owned(),
            }),
            ..CreateBucketParams::default()
        };
        if let Some(placement) = &class.spec.placement_policy {
            let policy_name = format!("{bucket}.{:x}", now.timestamp());
            let info = tiering(&class_name, &policy_name, placement, None)
                .context(ClassPolicySnafu)?;
            for tier in info.tiers {
                api.create_tier(tier).await.context(RpcSnafu {
                    method: "create_tier",
                })?;
            }
            api.create_tiering_policy(info.policy)
                .await
                .context(RpcSnafu {
                    method: "create_tiering_policy",
                })?;
            params.tiering = Some(policy_name);
        }
        if let Some(policy) = &class.spec.namespace_policy {
            params.namespace =
                Some(namespace_block(policy, request.path).context(ClassPolicySnafu)?);
        }
        tracing::info!(bucket, class = %class_name, "creating bucket");
        ignore_codes(
            api.create_bucket(params).await,
            &[
                RPC_CODE_BUCKET_ALREADY_EXISTS,
                RPC_CODE_BUCKET_ALREADY_OWNED_BY_YOU,
            ],
        )
        .context(RpcSnafu {
            method: "create_bucket",
        })?;
    }

    if let Some(replication_policy) = request.replication {
        api.put_bucket_replication(PutBucketReplicationParams {
            name: bucket.to_owned(),
            replication_policy,
        })
        .await
        .context(RpcSnafu {
            method: "put_bucket_replication",
        })?;
    }

    let quota = match &class.spec.quota {
        Some(quota) => quota_config(quota).context(ClassPolicySnafu)?,
        None => None,
    };
    if quota.is_some() {
        api.update_bucket(UpdateBucketParams {
            name: bucket.to_owned(),
            quota,
            ..UpdateBucketParams::default()
        })
        .await
        .context(RpcSnafu {
            method: "update_bucket",
        })?;
    }
    Ok(())
}

/// Creates the per-claim account, or reads back the one a previous attempt
/// created, and returns its email and keys.
pub async fn ensure_account(
    api: &dyn NoobaaApi,
    bucket: &str,
    default_resource: Option<String>,
) -> Result<(String, S3AccessKeys)> {
    let email = account_email(bucket);
    let reply = ignore_codes(
        api.create_account(CreateAccountParams {
            name: account_name(bucket),
            email: email.clone(),
            has_login: false,
            s3_access: true,
            default_resource,
            allow_bucket_creation: Some(false),
            allowed_buckets: Some(AccountAllowedBuckets {
                full_permission: false,
                permission_list: vec![bucket.to_owned()],
            }),
            bucket_claim_owner: Some(bucket.to_owned()),
            nsfs_account_config: None,
        })
        .await,
        &[RPC_CODE_ACCOUNT_ALREADY_EXISTS],
    )
    .context(RpcSnafu {
        method: "create_account",
    })?;

    let keys = match reply.and_then(|reply| reply.access_keys.into_iter().next()) {
        Some(keys) => keys,
        None => api
            .read_account(&email)
            .await
            .context(RpcSnafu {
                method: "read_account",
            })?
            .access_keys
            .into_iter()
            .next()
            .context(MissingAccessKeysSnafu { email: &email })?,
    };
    Ok((email, keys))
}

/// Removes bucket and account of a released claim; what is already gone counts as removed.
pub async fn deprovision(api: &dyn NoobaaApi, ob: &ObjectBucket) -> Result<()> {
    remove_bucket(api, ob.bucket_name(), ob.spec.reclaim_policy).await?;
    if let Some(email) = ob.state(STATE_ACCOUNT) {
        remove_account(api, email).await?;
    }
    Ok(())
}

/// Cleanup for a claim released before its object bucket was written.
///
/// Bucket and account may exist from an interrupted provisioning, so they are
/// looked up by the names provisioning derives from the claim.
pub async fn deprovision_unbound(
    api: &dyn NoobaaApi,
    claim: &ObjectBucketClaim,
    reclaim_policy: ReclaimPolicy,
) -> Result<()> {
    let bucket = match bucket_name(claim) {
        Ok(bucket) => bucket,
        Err(Error::MissingBucketName) => {
            tracing::info!("claim never named a bucket, nothing to remove");
            return Ok(());
        }
        Err(err) => return Err(err),
    };
    remove_bucket(api, &bucket, reclaim_policy).await?;
    remove_account(api, &account_email(&bucket)).await
}

async fn remove_bucket(
    api: &dyn NoobaaApi,
    bucket: &str,
    reclaim_policy: ReclaimPolicy,
) -> Result<()> {
    if reclaim_policy == ReclaimPolicy::Retain {
        tracing::info!(bucket, "reclaim policy retains the bucket");
        return Ok(());
    }
    let info = ignore_codes(api.read_bucket(bucket).await, &[RPC_CODE_NO_SUCH_BUCKET]).context(
        RpcSnafu {
            method: "read_bucket",
        },
    )?;
    match info {
        // objects of a namespace bucket live in foreign storage and stay there
        Some(info) if info.is_namespace() => {
            ignore_codes(api.delete_bucket(bucket).await, &[RPC_CODE_NO_SUCH_BUCKET]).context(
                RpcSnafu {
                    method: "delete_bucket",
                },
            )?;
        }
        Some(_) => {
            ignore_codes(
                api.delete_bucket_and_objects(bucket).await,
                &[RPC_CODE_NO_SUCH_BUCKET],
            )
            .context(RpcSnafu {
                method: "delete_bucket_and_objects",
            })?;
        }
        None => tracing::info!(bucket, "bucket already gone"),
    }
    Ok(())
}

async fn remove_account(api: &dyn NoobaaApi, email: &str) -> Result<()> {
    ignore_codes(api.delete_account(email).await, &[RPC_CODE_NO_SUCH_ACCOUNT]).context(
        RpcSnafu {
            method: "delete_account",
        },
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use noobaa_rpc::types::{AccountInfo, BucketInfo, NamespaceBucketInfo, NamespaceResourceConfig};
    use stackable_operator::k8s_openapi::chrono::TimeZone;

    use super::*;
    use crate::{
        bucket_claim::{error::Error, fixtures},
        bucket_class::fixtures as class_fixtures,
        phase::{ErrorClass, PhaseError},
        testing::FakeNoobaa,
    };

    fn class(yaml: &str) -> BucketClass {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(0x65a1_0000, 0).unwrap()
    }

    fn request<'a>(bucket: &'a str, class: &'a BucketClass) -> BucketRequest<'a> {
        BucketRequest {
            bucket,
            claim_namespace: "apps",
            class,
            path: None,
            replication: None,
        }
    }

    #[test]
    fn test_bucket_name() {
        let claim: ObjectBucketClaim = serde_yaml::from_str(fixtures::CLAIM).unwrap();
        assert_eq!(bucket_name(&claim).unwrap(), "photos-5f2a9c1e");

        let mut named = claim.clone();
        named.spec.bucket_name = Some("exact".into());
        assert_eq!(bucket_name(&named).unwrap(), "exact");

        let mut nameless = claim;
        nameless.spec.generate_bucket_name = None;
        assert!(matches!(
            bucket_name(&nameless),
            Err(Error::MissingBucketName)
        ));
    }

    #[test]
    fn test_path_needs_namespace_policy() {
        let multi = class(class_fixtures::MULTI);
        check_path(&multi, Some("team-a/")).unwrap();

        let err = check_path(&class(class_fixtures::CACHE), Some("team-a/")).unwrap_err();
        assert_eq!(
            err.class(),
            ErrorClass::Persistent {
                reason: "InvalidPath".into()
            }
        );
        check_path(&class(class_fixtures::PLACEMENT), None).unwrap();
    }

    #[test]
    fn test_claim_replication_overrides_class() {
        let bc = class(class_fixtures::PLACEMENT);
        let from_class = claim_replication(&bc, None).unwrap().unwrap();
        assert_eq!(from_class.rules[0].rule_id, "to-backup");

        let from_claim =
            claim_replication(&bc, Some(r#"[{"rule_id": "mine", "destination_bucket": "b"}]"#))
                .unwrap()
                .unwrap();
        assert_eq!(from_claim.rules[0].rule_id, "mine");

        let err = claim_replication(&bc, Some("{")).unwrap_err();
        assert_eq!(
            err.class(),
            ErrorClass::Persistent {
                reason: "InvalidReplicationPolicy".into()
            }
        );
    }

    #[test]
    fn test_default_resource() {
        assert_eq!(
            default_resource(&class(class_fixtures::PLACEMENT)).as_deref(),
            Some("bs1")
        );
        assert_eq!(
            default_resource(&class(class_fixtures::MULTI)).as_deref(),
            Some("nss1")
        );
        assert_eq!(
            default_resource(&class(class_fixtures::CACHE)).as_deref(),
            Some("bs1")
        );
    }

    #[tokio::test]
    async fn test_placement_bucket_gets_tiering() {
        let api = FakeNoobaa::new();
        let bc = class(class_fixtures::PLACEMENT);
        let mut req = request("photos-5f2a9c1e", &bc);
        req.replication = claim_replication(&bc, None).unwrap();
        ensure_bucket(&api, req, now()).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "read_bucket",
                "create_tier",
                "create_tier",
                "create_tiering_policy",
                "create_bucket",
                "put_bucket_replication",
                "update_bucket",
            ]
        );
        let state = api.state();
        let bucket = &state.buckets["photos-5f2a9c1e"];
        let tiering = bucket.tiering.as_ref().unwrap();
        assert_eq!(tiering.name, "photos-5f2a9c1e.65a10000");
        assert_eq!(tiering.tiers.len(), 2);
        assert!(bucket.quota.is_some());
        assert_eq!(state.replication["photos-5f2a9c1e"].rules.len(), 1);
    }

    #[tokio::test]
    async fn test_namespace_bucket_with_path() {
        let api = FakeNoobaa::new();
        let bc = class(class_fixtures::MULTI);
        let mut req = request("shared", &bc);
        req.path = Some("team-a/");
        ensure_bucket(&api, req, now()).await.unwrap();

        assert!(!api.called("create_tier"));
        let state = api.state();
        let namespace = state.buckets["shared"].namespace.as_ref().unwrap();
        assert_eq!(namespace.write_resource.path.as_deref(), Some("team-a/"));
    }

    #[tokio::test]
    async fn test_existing_bucket_is_not_recreated() {
        let api = FakeNoobaa::new();
        api.add_bucket(BucketInfo {
            name: "photos".into(),
            ..BucketInfo::default()
        });
        let bc = class(class_fixtures::MULTI);
        ensure_bucket(&api, request("photos", &bc), now())
            .await
            .unwrap();
        assert_eq!(api.calls(), vec!["read_bucket"]);
    }

    #[tokio::test]
    async fn test_account_keys_fall_back_to_read_account() {
        let api = FakeNoobaa::new();
        api.state().omit_keys = true;
        let (email, keys) = ensure_account(&api, "photos", Some("bs1".into()))
            .await
            .unwrap();
        assert_eq!(email, "obc-account.photos@noobaa.io");
        assert_eq!(keys.access_key, "AK-obc-account.photos");
        assert!(api.called("read_account"));

        // a second attempt finds the account and reads its keys
        api.state().omit_keys = false;
        let (_, again) = ensure_account(&api, "photos", None).await.unwrap();
        assert_eq!(again, keys);
    }

    #[tokio::test]
    async fn test_deprovision_by_bucket_shape() {
        let api = FakeNoobaa::new();
        let ob: ObjectBucket = serde_yaml::from_str(fixtures::OBJECT_BUCKET).unwrap();
        api.add_bucket(BucketInfo {
            name: "photos-5f2a".into(),
            ..BucketInfo::default()
        });
        api.add_account(AccountInfo {
            name: "obc-account.photos-5f2a".into(),
            email: "obc-account.photos-5f2a@noobaa.io".into(),
            ..AccountInfo::default()
        });
        deprovision(&api, &ob).await.unwrap();
        assert!(api.called("delete_bucket_and_objects"));
        assert!(api.state().accounts.is_empty());

        // everything is gone, a repeat is a no-op
        deprovision(&api, &ob).await.unwrap();

        let api = FakeNoobaa::new();
        api.add_bucket(BucketInfo {
            name: "photos-5f2a".into(),
            namespace: Some(NamespaceBucketInfo {
                write_resource: NamespaceResourceConfig::new("nss1"),
                ..NamespaceBucketInfo::default()
            }),
            ..BucketInfo::default()
        });
        deprovision(&api, &ob).await.unwrap();
        assert!(api.called("delete_bucket"));
        assert!(!api.called("delete_bucket_and_objects"));
    }

    #[tokio::test]
    async fn test_retained_bucket_keeps_data() {
        let api = FakeNoobaa::new();
        let mut ob: ObjectBucket = serde_yaml::from_str(fixtures::OBJECT_BUCKET).unwrap();
        ob.spec.reclaim_policy = ReclaimPolicy::Retain;
        api.add_bucket(BucketInfo {
            name: "photos-5f2a".into(),
            ..BucketInfo::default()
        });
        deprovision(&api, &ob).await.unwrap();
        assert!(api.state().buckets.contains_key("photos-5f2a"));
        assert!(api.called("delete_account"));
    }

    #[tokio::test]
    async fn test_unbound_claim_releases_what_provisioning_left() {
        let api = FakeNoobaa::new();
        let claim: ObjectBucketClaim = serde_yaml::from_str(fixtures::CLAIM).unwrap();
        // provisioning got as far as the account, then the object bucket write failed
        api.add_bucket(BucketInfo {
            name: "photos-5f2a9c1e".into(),
            ..BucketInfo::default()
        });
        api.add_account(AccountInfo {
            name: "obc-account.photos-5f2a9c1e".into(),
            email: "obc-account.photos-5f2a9c1e@noobaa.io".into(),
            ..AccountInfo::default()
        });

        deprovision_unbound(&api, &claim, ReclaimPolicy::Delete)
            .await
            .unwrap();
        assert!(api.called("delete_bucket_and_objects"));
        assert!(api.state().buckets.is_empty());
        assert!(api.state().accounts.is_empty());

        // nothing left, and a claim that never got that far, both pass
        deprovision_unbound(&api, &claim, ReclaimPolicy::Delete)
            .await
            .unwrap();
        let mut nameless = claim;
        nameless.spec.generate_bucket_name = None;
        deprovision_unbound(&FakeNoobaa::new(), &nameless, ReclaimPolicy::Delete)
            .await
            .unwrap();
    }
}
