use std::collections::BTreeMap;

use serde::Deserialize;
use snafu::{OptionExt, ensure};

use super::error::{
    AmbiguousTypeSpecSnafu, EmptyPvcNameSnafu, EmptyTargetBucketSnafu,
    InvalidSignatureVersionSnafu, InvalidVolumeCountSnafu, MissingRegionSnafu,
    MissingSecretKeySnafu, MissingTypeSpecSnafu, Result, UnsupportedTypeSnafu,
};
use crate::api::store::{S3SignatureVersion, Store, StoreKind, StoreTarget, StoreType};

pub const MAX_PV_POOL_VOLUMES: i32 = 20;

pub const AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
const IBM_COS_ACCESS_KEY_ID: &str = "IBM_COS_ACCESS_KEY_ID";
const IBM_COS_SECRET_ACCESS_KEY: &str = "IBM_COS_SECRET_ACCESS_KEY";
const AZURE_ACCOUNT_NAME: &str = "AccountName";
const AZURE_ACCOUNT_KEY: &str = "AccountKey";
const GOOGLE_PRIVATE_KEY_JSON: &str = "GoogleServiceAccountPrivateKeyJson";

/// Static checks on the store spec, before anything is looked up.
pub fn verify_spec<S: Store>(store: &S) -> Result<()> {
    let kind = S::KIND;
    let store_type = store.store_type();

    let count = store.configured_types();
    ensure!(count <= 1, AmbiguousTypeSpecSnafu { kind, count });

    let unsupported = matches!(
        (kind, store_type),
        (StoreKind::Backing, StoreType::Nsfs) | (StoreKind::Namespace, StoreType::PvPool)
    );
    ensure!(!unsupported, UnsupportedTypeSnafu { kind, store_type });

    match store
        .target()
        .context(MissingTypeSpecSnafu { kind, store_type })?
    {
        StoreTarget::Cloud {
            target_bucket,
            region,
            signature_version,
            ..
        } => {
            ensure!(!target_bucket.trim().is_empty(), EmptyTargetBucketSnafu);
            // an explicitly empty region is a mistake, an absent one means the default
            ensure!(
                region.is_none_or(|region| !region.trim().is_empty()),
                MissingRegionSnafu { store_type }
            );
            if store_type == StoreType::IbmCos {
                ensure!(
                    signature_version != Some(S3SignatureVersion::V2),
                    InvalidSignatureVersionSnafu {
                        version: "v2",
                        store_type
                    }
                );
            }
        }
        StoreTarget::PvPool(pv_pool) => {
            ensure!(
                (1..=MAX_PV_POOL_VOLUMES).contains(&pv_pool.num_volumes),
                InvalidVolumeCountSnafu {
                    count: pv_pool.num_volumes,
                    max: MAX_PV_POOL_VOLUMES
                }
            );
        }
        StoreTarget::Nsfs(nsfs) => {
            ensure!(!nsfs.pvc_name.trim().is_empty(), EmptyPvcNameSnafu);
        }
    }
    Ok(())
}

/// Identity and secret an external connection authenticates with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

#[derive(Deserialize)]
struct GooglePrivateKey {
    #[serde(default)]
    private_key_id: String,
}

/// Picks the provider specific keys out of a credentials secret.
pub fn credentials(
    store_type: StoreType,
    secret_name: &str,
    data: &BTreeMap<String, String>,
) -> Result<Credentials> {
    let get = |key: &str| {
        data.get(key)
            .filter(|value| !value.is_empty())
            .cloned()
            .context(MissingSecretKeySnafu {
                name: secret_name,
                key,
            })
    };
    let credentials = match store_type {
        StoreType::IbmCos => Credentials {
            identity: get(IBM_COS_ACCESS_KEY_ID)?,
            secret: get(IBM_COS_SECRET_ACCESS_KEY)?,
        },
        StoreType::AzureBlob => Credentials {
            identity: get(AZURE_ACCOUNT_NAME)?,
            secret: get(AZURE_ACCOUNT_KEY)?,
        },
        StoreType::GoogleCloudStorage => {
            let json = get(GOOGLE_PRIVATE_KEY_JSON)?;
            let identity = serde_json::from_str::<GooglePrivateKey>(&json)
                .map(|key| key.private_key_id)
                .unwrap_or_default();
            Credentials {
                identity,
                secret: json,
            }
        }
        _ => Credentials {
            identity: get(AWS_ACCESS_KEY_ID)?,
            secret: get(AWS_SECRET_ACCESS_KEY)?,
        },
    };
    Ok(credentials)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::store::{BackingStore, NamespaceStore},
        store::{error::Error, fixtures},
    };

    #[test]
    fn test_valid_cloud_store() {
        let bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        verify_spec(&bs).unwrap();
    }

    #[test]
    fn test_missing_type_section() {
        let nss: NamespaceStore = serde_yaml::from_str(fixtures::NSFS_MISSING_SPEC).unwrap();
        assert!(matches!(
            verify_spec(&nss),
            Err(Error::MissingTypeSpec {
                kind: StoreKind::Namespace,
                store_type: StoreType::Nsfs
            })
        ));
    }

    #[test]
    fn test_two_type_sections() {
        let bs: BackingStore = serde_yaml::from_str(fixtures::AMBIGUOUS_BACKING_STORE).unwrap();
        assert!(matches!(
            verify_spec(&bs),
            Err(Error::AmbiguousTypeSpec { count: 2, .. })
        ));
    }

    #[test]
    fn test_pv_pool_volume_bounds() {
        let mut bs: BackingStore = serde_yaml::from_str(fixtures::PV_POOL_BACKING_STORE).unwrap();
        verify_spec(&bs).unwrap();
        if let Some(pv_pool) = bs.spec.pv_pool.as_mut() {
            pv_pool.num_volumes = 0;
        }
        assert!(matches!(
            verify_spec(&bs),
            Err(Error::InvalidVolumeCount { count: 0, .. })
        ));
    }

    #[test]
    fn test_empty_target_bucket() {
        let mut bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        if let Some(aws) = bs.spec.aws_s3.as_mut() {
            aws.target_bucket = " ".into();
        }
        assert!(matches!(verify_spec(&bs), Err(Error::EmptyTargetBucket)));
    }

    #[test]
    fn test_credentials() {
        let data = BTreeMap::from([
            (AWS_ACCESS_KEY_ID.to_string(), "AKIA".to_string()),
            (AWS_SECRET_ACCESS_KEY.to_string(), "secret".to_string()),
        ]);
        let creds = credentials(StoreType::AwsS3, "aws-creds", &data).unwrap();
        assert_eq!(creds.identity, "AKIA");

        let err = credentials(StoreType::AzureBlob, "aws-creds", &data).unwrap_err();
        assert!(matches!(err, Error::MissingSecretKey { key, .. } if key == "AccountName"));
    }

    #[test]
    fn test_google_identity_from_key_json() {
        let json = r#"{"private_key_id": "k-1", "client_email": "x@y"}"#;
        let data = BTreeMap::from([(GOOGLE_PRIVATE_KEY_JSON.to_string(), json.to_string())]);
        let creds = credentials(StoreType::GoogleCloudStorage, "gcp", &data).unwrap();
        assert_eq!(creds.identity, "k-1");
        assert_eq!(creds.secret, json);
    }
}
