//! Configuring a running system: operator login, admin credentials and the
//! defaults bucket claims rely on.

use std::collections::BTreeMap;

use noobaa_rpc::{
    NoobaaApi,
    types::{CreateAuthParams, CreateSystemParams, S3AccessKeys},
};
use s3::{Bucket, BucketConfiguration, Region, creds::Credentials};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::Client,
    k8s_openapi::{
        api::{core::v1::SecretReference, storage::v1::StorageClass},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    },
    kube::ResourceExt,
};

use super::{
    builders::SYSTEM_CONTROLLER_NAME,
    error::{
        AdminAccountNotFoundSnafu, ApplyDefaultSnafu, ApplySecretSnafu, BuildSecretSnafu,
        GetDefaultSnafu, MissingAdminKeysSnafu, ObjectMetaSnafu, ReadSecretSnafu, Result,
        RpcSnafu, TargetBucketSnafu,
    },
};
use crate::{
    api::{
        bucket_class::{BucketClass, BucketClassSpec, DEFAULT_BUCKET_CLASS, PlacementPolicy, Tier},
        store::{AwsS3Spec, BackingStore, BackingStoreSpec, StoreType},
        system::NooBaa,
    },
    config::OperatorConfig,
    manager::APP_NAME,
    remote::OperatorCredentials,
    resources::{APP_LABEL, ROLE_DEFAULT, apply, object_labels, owned_meta},
    secret::{S3Credentials, Secret},
};

pub const ADMIN_EMAIL: &str = "admin@noobaa.io";
const ADMIN_ROLE: &str = "admin";

pub const DEFAULT_BACKING_STORE: &str = "noobaa-default-backing-store";
pub const DEFAULT_STORE_SECRET: &str = "noobaa-default-backing-store-credentials";
const DEFAULT_REGION: &str = "us-east-1";

/// Contents of the admin secret handed to users.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AdminCredentials {
    pub system: String,
    pub email: String,
    pub password: String,
    #[serde(flatten)]
    pub keys: S3Credentials,
}

/// Cloud credentials in the layout the cloud credential operator writes them.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct CloudCredentials {
    pub aws_access_key_id: String,
    pub aws_secret_access_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

/// What happened to the default backing store in this reconcile.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultStore {
    /// The spec asks to leave defaults to the user.
    Manual,
    Present,
    Created,
    /// Not possible right now, with the reason shown to the user.
    Skipped(String),
}

impl DefaultStore {
    pub fn is_available(&self) -> bool {
        matches!(self, DefaultStore::Present | DefaultStore::Created)
    }

    pub fn note(&self) -> Option<&str> {
        match self {
            DefaultStore::Skipped(note) => Some(note),
            _ => None,
        }
    }
}

fn generate_password() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}

/// Logs the operator in, creating the system on first contact.
///
/// Stored credentials whose token is still accepted are returned as they
/// are; otherwise a fresh token is requested with the stored password.
pub async fn ensure_operator_credentials(
    api: &dyn NoobaaApi,
    system: &str,
    stored: Option<OperatorCredentials>,
) -> Result<OperatorCredentials> {
    let Some(mut credentials) = stored else {
        tracing::info!(%system, "creating system");
        let password = generate_password();
        let reply = api
            .create_system(CreateSystemParams {
                name: system.to_owned(),
                email: ADMIN_EMAIL.to_owned(),
                password: password.clone(),
                must_change_password: Some(false),
            })
            .await
            .context(RpcSnafu {
                method: "create_system",
            })?;
        return Ok(OperatorCredentials {
            email: ADMIN_EMAIL.to_owned(),
            password,
            auth_token: Some(reply.operator_token.unwrap_or(reply.token)),
        });
    };

    if credentials.auth_token.is_some() {
        let auth = api.read_auth().await.context(RpcSnafu {
            method: "read_auth",
        })?;
        if auth.account.is_some() {
            return Ok(credentials);
        }
    }
    tracing::info!(email = %credentials.email, "requesting a new auth token");
    let reply = api
        .create_auth(CreateAuthParams {
            system: system.to_owned(),
            role: ADMIN_ROLE.to_owned(),
            email: credentials.email.clone(),
            password: credentials.password.clone(),
        })
        .await
        .context(RpcSnafu {
            method: "create_auth",
        })?;
    credentials.auth_token = Some(reply.token);
    Ok(credentials)
}

/// Access keys of the account registered under `email`.
pub async fn admin_keys(api: &dyn NoobaaApi, email: &str) -> Result<S3AccessKeys> {
    let accounts = api.list_accounts().await.context(RpcSnafu {
        method: "list_accounts",
    })?;
    let admin = accounts
        .accounts
        .into_iter()
        .find(|account| account.email == email)
        .context(AdminAccountNotFoundSnafu { email })?;
    admin
        .access_keys
        .into_iter()
        .next()
        .context(MissingAdminKeysSnafu { email })
}

/// Writes `value` into a secret owned by the system.
pub async fn apply_owned_secret<T>(client: &Client, nb: &NooBaa, name: &str, value: T) -> Result<()>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let namespace = nb.namespace().unwrap_or_default();
    let secret = Secret::new(name.to_owned(), namespace, value)
        .to_owned_secret(nb)
        .context(BuildSecretSnafu { name })?;
    apply(client, &secret)
        .await
        .context(ApplySecretSnafu { name })?;
    Ok(())
}

/// Target bucket of the default store: configured, or derived from the system uid.
pub fn default_target_bucket(nb: &NooBaa, config: &OperatorConfig) -> String {
    if let Some(bucket) = &config.default_target_bucket {
        return bucket.clone();
    }
    let uid: String = nb
        .uid()
        .unwrap_or_default()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(8)
        .collect();
    format!("noobaa-backing-store-{uid}")
}

fn region_endpoint(region: &str) -> Region {
    Region::Custom {
        region: region.to_owned(),
        endpoint: format!("https://s3.{region}.amazonaws.com"),
    }
}

/// Creates the target bucket unless it is already there.
pub async fn ensure_target_bucket(credentials: &CloudCredentials, name: &str) -> Result<()> {
    let region = region_endpoint(credentials.region.as_deref().unwrap_or(DEFAULT_REGION));
    let s3_credentials = Credentials {
        access_key: Some(credentials.aws_access_key_id.clone()),
        secret_key: Some(credentials.aws_secret_access_key.clone()),
        security_token: None,
        session_token: None,
        expiration: None,
    };
    let bucket = Bucket::new(name, region.clone(), s3_credentials.clone())
        .context(TargetBucketSnafu { bucket: name })?;
    if bucket
        .exists()
        .await
        .context(TargetBucketSnafu { bucket: name })?
    {
        return Ok(());
    }
    tracing::info!(bucket = %name, "creating target bucket for the default backing store");
    Bucket::create(name, region, s3_credentials, BucketConfiguration::default())
        .await
        .context(TargetBucketSnafu { bucket: name })?;
    Ok(())
}

pub fn build_default_backing_store(
    nb: &NooBaa,
    target_bucket: &str,
    region: &str,
) -> Result<BackingStore> {
    let namespace = nb.namespace().unwrap_or_default();
    let mut store = BackingStore::new(
        DEFAULT_BACKING_STORE,
        BackingStoreSpec {
            type_: StoreType::AwsS3,
            aws_s3: Some(AwsS3Spec {
                target_bucket: target_bucket.to_owned(),
                secret: SecretReference {
                    name: Some(DEFAULT_STORE_SECRET.to_owned()),
                    namespace: Some(namespace),
                },
                region: Some(region.to_owned()),
                sse: false,
            }),
            s3_compatible: None,
            ibm_cos: None,
            azure_blob: None,
            google_cloud_storage: None,
            pv_pool: None,
        },
    );
    store.metadata = owned_meta(
        nb,
        DEFAULT_BACKING_STORE,
        object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_DEFAULT),
    )
    .context(ObjectMetaSnafu)?;
    Ok(store)
}

pub fn build_default_bucket_class(nb: &NooBaa) -> Result<BucketClass> {
    let mut class = BucketClass::new(
        DEFAULT_BUCKET_CLASS,
        BucketClassSpec {
            placement_policy: Some(PlacementPolicy {
                tiers: vec![Tier {
                    placement: None,
                    backing_stores: vec![DEFAULT_BACKING_STORE.to_owned()],
                }],
            }),
            namespace_policy: None,
            replication_policy: None,
            quota: None,
        },
    );
    class.metadata = owned_meta(
        nb,
        DEFAULT_BUCKET_CLASS,
        object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_DEFAULT),
    )
    .context(ObjectMetaSnafu)?;
    Ok(class)
}

/// Cluster scoped, so it carries no owner and is removed with the system explicitly.
pub fn build_storage_class(config: &OperatorConfig) -> StorageClass {
    StorageClass {
        metadata: ObjectMeta {
            name: Some(config.storage_class_name()),
            labels: Some(BTreeMap::from([(APP_LABEL.to_owned(), APP_NAME.to_owned())])),
            ..ObjectMeta::default()
        },
        provisioner: config.provisioner_name(),
        reclaim_policy: Some("Delete".to_owned()),
        parameters: Some(BTreeMap::from([(
            "bucketclass".to_owned(),
            DEFAULT_BUCKET_CLASS.to_owned(),
        )])),
        ..StorageClass::default()
    }
}

/// Makes sure a default backing store exists, creating its target bucket from
/// the cloud credentials secret when there is one.
pub async fn ensure_default_store(
    client: &Client,
    nb: &NooBaa,
    config: &OperatorConfig,
) -> Result<DefaultStore> {
    if nb.spec.manual_default_backing_store {
        return Ok(DefaultStore::Manual);
    }
    let namespace = nb.namespace().unwrap_or_default();
    let existing = client
        .get_opt::<BackingStore>(DEFAULT_BACKING_STORE, &namespace)
        .await
        .context(GetDefaultSnafu {
            kind: "BackingStore",
            name: DEFAULT_BACKING_STORE,
        })?;
    if existing.is_some() {
        return Ok(DefaultStore::Present);
    }

    let secret_name = &config.cloud_creds_secret;
    let Some(cloud) = Secret::<CloudCredentials>::fetch_opt(client, secret_name, &namespace)
        .await
        .context(ReadSecretSnafu { name: secret_name })?
    else {
        return Ok(DefaultStore::Skipped(format!(
            "cloud credentials secret {secret_name} not found, no default backing store was created"
        )));
    };
    let cloud = cloud.into_value();
    let bucket = default_target_bucket(nb, config);
    ensure_target_bucket(&cloud, &bucket).await?;

    apply_owned_secret(
        client,
        nb,
        DEFAULT_STORE_SECRET,
        S3Credentials {
            access_key_id: cloud.aws_access_key_id.clone(),
            secret_access_key: cloud.aws_secret_access_key.clone(),
        },
    )
    .await?;
    let store = build_default_backing_store(
        nb,
        &bucket,
        cloud.region.as_deref().unwrap_or(DEFAULT_REGION),
    )?;
    apply(client, &store).await.context(ApplyDefaultSnafu {
        kind: "BackingStore",
        name: DEFAULT_BACKING_STORE,
    })?;
    Ok(DefaultStore::Created)
}

/// Creates the default bucket class once; later user edits are left alone.
pub async fn ensure_default_bucket_class(client: &Client, nb: &NooBaa) -> Result<()> {
    let namespace = nb.namespace().unwrap_or_default();
    let existing = client
        .get_opt::<BucketClass>(DEFAULT_BUCKET_CLASS, &namespace)
        .await
        .context(GetDefaultSnafu {
            kind: "BucketClass",
            name: DEFAULT_BUCKET_CLASS,
        })?;
    if existing.is_none() {
        let class = build_default_bucket_class(nb)?;
        apply(client, &class).await.context(ApplyDefaultSnafu {
            kind: "BucketClass",
            name: DEFAULT_BUCKET_CLASS,
        })?;
    }
    Ok(())
}

pub async fn apply_storage_class(client: &Client, config: &OperatorConfig) -> Result<()> {
    let storage_class = build_storage_class(config);
    apply(client, &storage_class)
        .await
        .context(ApplyDefaultSnafu {
            kind: "StorageClass",
            name: config.storage_class_name(),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use noobaa_rpc::types::AccountInfo;

    use super::*;
    use crate::{
        system::{error::Error, fixtures},
        testing::FakeNoobaa,
    };

    fn system() -> NooBaa {
        serde_yaml::from_str(fixtures::SYSTEM).unwrap()
    }

    #[tokio::test]
    async fn test_first_contact_creates_system() {
        let api = FakeNoobaa::new();
        let credentials = ensure_operator_credentials(&api, "noobaa", None)
            .await
            .unwrap();
        assert_eq!(credentials.email, ADMIN_EMAIL);
        assert_eq!(credentials.password.len(), 32);
        assert_eq!(credentials.auth_token.as_deref(), Some("operator-token"));
        assert_eq!(api.calls(), vec!["create_system"]);

        let keys = admin_keys(&api, ADMIN_EMAIL).await.unwrap();
        assert_eq!(keys.access_key, "AK-admin");
    }

    #[tokio::test]
    async fn test_accepted_token_is_kept() {
        let api = FakeNoobaa::new();
        api.state().authenticated = Some(ADMIN_EMAIL.into());
        let stored = OperatorCredentials {
            email: ADMIN_EMAIL.into(),
            password: "pw".into(),
            auth_token: Some("still-good".into()),
        };
        let credentials = ensure_operator_credentials(&api, "noobaa", Some(stored.clone()))
            .await
            .unwrap();
        assert_eq!(credentials, stored);
        assert!(!api.called("create_auth"));
    }

    #[tokio::test]
    async fn test_rejected_token_is_renewed() {
        let api = FakeNoobaa::new();
        let stored = OperatorCredentials {
            email: ADMIN_EMAIL.into(),
            password: "pw".into(),
            auth_token: Some("expired".into()),
        };
        let credentials = ensure_operator_credentials(&api, "noobaa", Some(stored))
            .await
            .unwrap();
        assert_eq!(
            credentials.auth_token.as_deref(),
            Some("auth-admin@noobaa.io")
        );
        assert_eq!(api.calls(), vec!["read_auth", "create_auth"]);

        let without_token = OperatorCredentials {
            auth_token: None,
            ..credentials
        };
        let api = FakeNoobaa::new();
        ensure_operator_credentials(&api, "noobaa", Some(without_token))
            .await
            .unwrap();
        assert_eq!(api.calls(), vec!["create_auth"]);
    }

    #[tokio::test]
    async fn test_admin_keys_need_the_account() {
        let api = FakeNoobaa::new();
        assert!(matches!(
            admin_keys(&api, ADMIN_EMAIL).await,
            Err(Error::AdminAccountNotFound { .. })
        ));

        api.add_account(AccountInfo {
            name: "admin".into(),
            email: ADMIN_EMAIL.into(),
            ..AccountInfo::default()
        });
        assert!(matches!(
            admin_keys(&api, ADMIN_EMAIL).await,
            Err(Error::MissingAdminKeys { .. })
        ));
    }

    #[test]
    fn test_admin_secret_layout() {
        let credentials = AdminCredentials {
            system: "noobaa".into(),
            email: ADMIN_EMAIL.into(),
            password: "pw".into(),
            keys: S3Credentials {
                access_key_id: "AK".into(),
                secret_access_key: "SK".into(),
            },
        };
        let secret = Secret::new("noobaa-admin".into(), "noobaa".into(), credentials.clone())
            .to_secret()
            .unwrap();
        let data = secret.string_data.clone().unwrap();
        assert_eq!(data["AWS_ACCESS_KEY_ID"], "AK");
        assert_eq!(data["email"], ADMIN_EMAIL);

        let parsed = Secret::<AdminCredentials>::from(secret).unwrap();
        assert_eq!(parsed.value(), &credentials);
    }

    #[test]
    fn test_default_target_bucket() {
        let nb = system();
        let config = OperatorConfig::default();
        assert_eq!(default_target_bucket(&nb, &config), "noobaa-backing-store-2f0c6c9e");

        let config = OperatorConfig {
            default_target_bucket: Some("shared".into()),
            ..config
        };
        assert_eq!(default_target_bucket(&nb, &config), "shared");
    }

    #[test]
    fn test_default_store_and_class() {
        let nb = system();
        let store = build_default_backing_store(&nb, "target", "eu-west-1").unwrap();
        assert_eq!(store.name_any(), DEFAULT_BACKING_STORE);
        let aws = store.spec.aws_s3.as_ref().unwrap();
        assert_eq!(aws.target_bucket, "target");
        assert_eq!(aws.secret.name.as_deref(), Some(DEFAULT_STORE_SECRET));
        assert_eq!(store.metadata.owner_references.unwrap()[0].kind, "NooBaa");

        let class = build_default_bucket_class(&nb).unwrap();
        assert_eq!(class.name_any(), DEFAULT_BUCKET_CLASS);
        assert_eq!(
            class.spec.placement_policy.unwrap().tiers[0].backing_stores,
            vec![DEFAULT_BACKING_STORE]
        );
    }

    #[test]
    fn test_storage_class() {
        let config = OperatorConfig {
            namespace: "noobaa".into(),
            ..OperatorConfig::default()
        };
        let sc = build_storage_class(&config);
        assert_eq!(sc.metadata.name.as_deref(), Some("noobaa.noobaa.io"));
        assert_eq!(sc.provisioner, "noobaa.noobaa.io/obc");
        assert!(sc.metadata.owner_references.is_none());
    }

    #[test]
    fn test_default_store_notes() {
        assert!(DefaultStore::Created.is_available());
        assert!(!DefaultStore::Manual.is_available());
        assert_eq!(DefaultStore::Skipped("no creds".into()).note(), Some("no creds"));
        assert_eq!(DefaultStore::Present.note(), None);
    }
}
