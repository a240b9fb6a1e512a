use schemars::JsonSchema;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use stackable_operator::{
    client::GetApi,
    k8s_openapi::{
        api::core::v1::{ResourceRequirements, SecretReference},
        apimachinery::pkg::apis::meta::v1::Time,
    },
    kube::{CustomResource, Resource, ResourceExt},
};

use super::{Phase, conditions::Condition};

/// Store types shared by backing and namespace stores.
#[derive(
    Deserialize, Serialize, Clone, Copy, Debug, JsonSchema, PartialEq, Eq, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum StoreType {
    AwsS3,
    S3Compatible,
    IbmCos,
    AzureBlob,
    GoogleCloudStorage,
    PvPool,
    Nsfs,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
pub enum S3SignatureVersion {
    #[default]
    #[serde(rename = "v4")]
    V4,
    #[serde(rename = "v2")]
    V2,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AwsS3Spec {
    pub target_bucket: String,
    pub secret: SecretReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default)]
    pub sse: bool,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct S3CompatibleSpec {
    pub target_bucket: String,
    pub secret: SecretReference,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature_version: Option<S3SignatureVersion>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AzureBlobSpec {
    pub target_blob_container: String,
    pub secret: SecretReference,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCloudStorageSpec {
    pub target_bucket: String,
    pub secret: SecretReference,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PvPoolSpec {
    pub num_volumes: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretReference>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NsfsSpec {
    pub pvc_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fs_backend: Option<String>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    kind = "BackingStore",
    group = "noobaa.io",
    version = "v1alpha1",
    plural = "backingstores",
    status = "StoreStatus",
    shortname = "bs",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct BackingStoreSpec {
    #[serde(rename = "type")]
    pub type_: StoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_s3: Option<AwsS3Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_compatible: Option<S3CompatibleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibm_cos: Option<S3CompatibleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_blob: Option<AzureBlobSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_storage: Option<GoogleCloudStorageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pv_pool: Option<PvPoolSpec>,
}

#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[kube(
    kind = "NamespaceStore",
    group = "noobaa.io",
    version = "v1alpha1",
    plural = "namespacestores",
    status = "StoreStatus",
    shortname = "nss",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceStoreSpec {
    #[serde(rename = "type")]
    pub type_: StoreType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_s3: Option<AwsS3Spec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s3_compatible: Option<S3CompatibleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ibm_cos: Option<S3CompatibleSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azure_blob: Option<AzureBlobSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_cloud_storage: Option<GoogleCloudStorageSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nsfs: Option<NsfsSpec>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<StoreMode>,
}

/// Health of the remote pool, lifted from the system snapshot.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreMode {
    pub mode_code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<Time>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum StoreKind {
    #[strum(serialize = "BackingStore")]
    Backing,
    #[strum(serialize = "NamespaceStore")]
    Namespace,
}

/// Type-specific target of a store, flattened for the remote calls.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreTarget<'a> {
    Cloud {
        endpoint_type: &'static str,
        endpoint: String,
        target_bucket: &'a str,
        secret: &'a SecretReference,
        region: Option<&'a str>,
        signature_version: Option<S3SignatureVersion>,
    },
    PvPool(&'a PvPoolSpec),
    Nsfs(&'a NsfsSpec),
}

/// What the store reconciler needs from either store kind.
pub trait Store:
    Resource<DynamicType = ()>
    + GetApi<Namespace = str>
    + Clone
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    const KIND: StoreKind;

    fn store_type(&self) -> StoreType;
    fn aws_s3(&self) -> Option<&AwsS3Spec>;
    fn s3_compatible(&self) -> Option<&S3CompatibleSpec>;
    fn ibm_cos(&self) -> Option<&S3CompatibleSpec>;
    fn azure_blob(&self) -> Option<&AzureBlobSpec>;
    fn google_cloud_storage(&self) -> Option<&GoogleCloudStorageSpec>;
    fn pv_pool(&self) -> Option<&PvPoolSpec>;
    fn nsfs(&self) -> Option<&NsfsSpec>;
    fn store_status(&self) -> Option<&StoreStatus>;

    fn phase(&self) -> Option<Phase> {
        self.store_status().and_then(|status| status.phase)
    }

    fn mode_code(&self) -> Option<&str> {
        self.store_status()
            .and_then(|status| status.mode.as_ref())
            .map(|mode| mode.mode_code.as_str())
    }

    /// Credentials secret, if the type uses one.
    fn secret_ref(&self) -> Option<&SecretReference> {
        match self.target() {
            Some(StoreTarget::Cloud { secret, .. }) => Some(secret),
            Some(StoreTarget::PvPool(pv_pool)) => pv_pool.secret.as_ref(),
            _ => None,
        }
    }

    /// The sub-spec selected by `type`, `None` when it is missing.
    fn target(&self) -> Option<StoreTarget<'_>> {
        match self.store_type() {
            StoreType::AwsS3 => self.aws_s3().map(|s| StoreTarget::Cloud {
                endpoint_type: "AWS",
                endpoint: match s.region.as_deref() {
                    Some(region) => format!("https://s3.{region}.amazonaws.com"),
                    None => "https://s3.amazonaws.com".to_owned(),
                },
                target_bucket: &s.target_bucket,
                secret: &s.secret,
                region: s.region.as_deref(),
                signature_version: None,
            }),
            StoreType::S3Compatible => self.s3_compatible().map(|s| StoreTarget::Cloud {
                endpoint_type: "S3_COMPATIBLE",
                endpoint: s.endpoint.clone(),
                target_bucket: &s.target_bucket,
                secret: &s.secret,
                region: None,
                signature_version: s.signature_version,
            }),
            StoreType::IbmCos => self.ibm_cos().map(|s| StoreTarget::Cloud {
                endpoint_type: "IBM_COS",
                endpoint: s.endpoint.clone(),
                target_bucket: &s.target_bucket,
                secret: &s.secret,
                region: None,
                signature_version: s.signature_version,
            }),
            StoreType::AzureBlob => self.azure_blob().map(|s| StoreTarget::Cloud {
                endpoint_type: "AZURE",
                endpoint: "https://blob.core.windows.net".to_owned(),
                target_bucket: &s.target_blob_container,
                secret: &s.secret,
                region: None,
                signature_version: None,
            }),
            StoreType::GoogleCloudStorage => {
                self.google_cloud_storage().map(|s| StoreTarget::Cloud {
                    endpoint_type: "GOOGLE",
                    endpoint: "https://www.googleapis.com".to_owned(),
                    target_bucket: &s.target_bucket,
                    secret: &s.secret,
                    region: None,
                    signature_version: None,
                })
            }
            StoreType::PvPool => self.pv_pool().map(StoreTarget::PvPool),
            StoreType::Nsfs => self.nsfs().map(StoreTarget::Nsfs),
        }
    }

    /// Number of type sub-specs that are set; exactly one is valid.
    fn configured_types(&self) -> usize {
        [
            self.aws_s3().is_some(),
            self.s3_compatible().is_some(),
            self.ibm_cos().is_some(),
            self.azure_blob().is_some(),
            self.google_cloud_storage().is_some(),
            self.pv_pool().is_some(),
            self.nsfs().is_some(),
        ]
        .into_iter()
        .filter(|set| *set)
        .count()
    }

    fn store_name(&self) -> String {
        self.name_any()
    }
}

impl Store for BackingStore {
    const KIND: StoreKind = StoreKind::Backing;

    fn store_type(&self) -> StoreType {
        self.spec.type_
    }
    fn aws_s3(&self) -> Option<&AwsS3Spec> {
        self.spec.aws_s3.as_ref()
    }
    fn s3_compatible(&self) -> Option<&S3CompatibleSpec> {
        self.spec.s3_compatible.as_ref()
    }
    fn ibm_cos(&self) -> Option<&S3CompatibleSpec> {
        self.spec.ibm_cos.as_ref()
    }
    fn azure_blob(&self) -> Option<&AzureBlobSpec> {
        self.spec.azure_blob.as_ref()
    }
    fn google_cloud_storage(&self) -> Option<&GoogleCloudStorageSpec> {
        self.spec.google_cloud_storage.as_ref()
    }
    fn pv_pool(&self) -> Option<&PvPoolSpec> {
        self.spec.pv_pool.as_ref()
    }
    fn nsfs(&self) -> Option<&NsfsSpec> {
        None
    }
    fn store_status(&self) -> Option<&StoreStatus> {
        self.status.as_ref()
    }
}

impl Store for NamespaceStore {
    const KIND: StoreKind = StoreKind::Namespace;

    fn store_type(&self) -> StoreType {
        self.spec.type_
    }
    fn aws_s3(&self) -> Option<&AwsS3Spec> {
        self.spec.aws_s3.as_ref()
    }
    fn s3_compatible(&self) -> Option<&S3CompatibleSpec> {
        self.spec.s3_compatible.as_ref()
    }
    fn ibm_cos(&self) -> Option<&S3CompatibleSpec> {
        self.spec.ibm_cos.as_ref()
    }
    fn azure_blob(&self) -> Option<&AzureBlobSpec> {
        self.spec.azure_blob.as_ref()
    }
    fn google_cloud_storage(&self) -> Option<&GoogleCloudStorageSpec> {
        self.spec.google_cloud_storage.as_ref()
    }
    fn pv_pool(&self) -> Option<&PvPoolSpec> {
        None
    }
    fn nsfs(&self) -> Option<&NsfsSpec> {
        self.spec.nsfs.as_ref()
    }
    fn store_status(&self) -> Option<&StoreStatus> {
        self.status.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixtures;

    #[test]
    fn test_cloud_target() {
        let bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        assert_eq!(bs.configured_types(), 1);
        let Some(StoreTarget::Cloud {
            endpoint_type,
            endpoint,
            target_bucket,
            secret,
            ..
        }) = bs.target()
        else {
            panic!("expected a cloud target");
        };
        assert_eq!(endpoint_type, "AWS");
        assert_eq!(endpoint, "https://s3.us-east-1.amazonaws.com");
        assert_eq!(target_bucket, "first.bucket");
        assert_eq!(secret.name.as_deref(), Some("aws-creds"));
        assert_eq!(bs.secret_ref(), Some(secret));
    }

    #[test]
    fn test_type_without_sub_spec_has_no_target() {
        let nss: NamespaceStore = serde_yaml::from_str(fixtures::NSFS_MISSING_SPEC).unwrap();
        assert_eq!(nss.store_type(), StoreType::Nsfs);
        assert!(nss.target().is_none());
        assert!(nss.secret_ref().is_none());
        assert_eq!(StoreKind::Namespace.to_string(), "NamespaceStore");
    }

    #[test]
    fn test_mode_code() {
        let mut bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        assert_eq!(bs.mode_code(), None);
        bs.status = Some(StoreStatus {
            phase: Some(Phase::Ready),
            mode: Some(StoreMode {
                mode_code: "OPTIMAL".into(),
                time_stamp: None,
            }),
            ..StoreStatus::default()
        });
        assert_eq!(bs.mode_code(), Some("OPTIMAL"));
        assert_eq!(bs.phase(), Some(Phase::Ready));
    }
}
