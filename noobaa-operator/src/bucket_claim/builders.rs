use std::collections::BTreeMap;

use snafu::ResultExt;
use stackable_operator::{
    builder::configmap::ConfigMapBuilder,
    k8s_openapi::api::core::v1::{ConfigMap, ObjectReference, Secret as K8sSecret},
    kube::{Resource, ResourceExt},
};

use super::error::{BuildConfigMapSnafu, BuildSecretSnafu, ObjectMetaSnafu, Result};
use crate::{
    api::{
        obc::{
            BucketEndpoint, ObcPhase, ObjectBucket, ObjectBucketClaim, ObjectBucketSpec,
            ObjectBucketStatus, ReclaimPolicy, STATE_ACCOUNT, STATE_BUCKET_CLASS,
            STATE_BUCKET_CLASS_GENERATION, STATE_BUCKET_NAME, STATE_PATH,
        },
        system::NooBaa,
    },
    config::OperatorConfig,
    manager::APP_NAME,
    remote::S3_SERVICE,
    resources::{APP_LABEL, ROLE_DEFAULT, object_labels, owned_meta},
    secret::{S3Credentials, Secret},
};

pub const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_S3_PORT: i32 = 443;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct S3Endpoint {
    pub host: String,
    pub port: i32,
}

impl S3Endpoint {
    fn parse(addr: &str) -> Option<S3Endpoint> {
        let rest = addr.split_once("://").map_or(addr, |(_, rest)| rest);
        let authority = rest.split('/').next()?;
        if authority.is_empty() {
            return None;
        }
        Some(match authority.rsplit_once(':') {
            Some((host, port)) => S3Endpoint {
                host: host.to_owned(),
                port: port.parse().ok()?,
            },
            None => S3Endpoint {
                host: authority.to_owned(),
                port: DEFAULT_S3_PORT,
            },
        })
    }
}

/// Where workloads reach the bucket: configured override, then the in-cluster
/// address the system reports, then the service name.
pub fn s3_endpoint(config: &OperatorConfig, system: Option<&NooBaa>) -> S3Endpoint {
    let reported = system
        .and_then(|system| system.status.as_ref())
        .and_then(|status| status.services.as_ref())
        .and_then(|services| services.service_s3.internal_dns.first());
    config
        .s3_addr
        .as_deref()
        .or(reported.map(String::as_str))
        .and_then(S3Endpoint::parse)
        .unwrap_or_else(|| S3Endpoint {
            host: format!("{S3_SERVICE}.{}.svc", config.namespace),
            port: DEFAULT_S3_PORT,
        })
}

pub fn object_bucket_name(claim: &ObjectBucketClaim) -> String {
    format!(
        "obc-{}-{}",
        claim.namespace().unwrap_or_default(),
        claim.name_any()
    )
}

pub struct BoundBucket<'a> {
    pub bucket: &'a str,
    pub class_name: &'a str,
    pub class_generation: Option<i64>,
    pub account_email: &'a str,
    pub path: Option<&'a str>,
    pub reclaim_policy: ReclaimPolicy,
}

/// The cluster scoped record of a provisioned bucket.
pub fn build_object_bucket(
    claim: &ObjectBucketClaim,
    endpoint: &S3Endpoint,
    bound: &BoundBucket,
) -> ObjectBucket {
    let mut additional_state = BTreeMap::from([
        (STATE_BUCKET_CLASS.to_owned(), bound.class_name.to_owned()),
        (
            STATE_BUCKET_CLASS_GENERATION.to_owned(),
            bound.class_generation.unwrap_or_default().to_string(),
        ),
        (STATE_BUCKET_NAME.to_owned(), bound.bucket.to_owned()),
        (STATE_ACCOUNT.to_owned(), bound.account_email.to_owned()),
    ]);
    if let Some(path) = bound.path {
        additional_state.insert(STATE_PATH.to_owned(), path.to_owned());
    }

    let mut ob = ObjectBucket::new(
        &object_bucket_name(claim),
        ObjectBucketSpec {
            storage_class_name: claim.spec.storage_class_name.clone(),
            claim_ref: Some(ObjectReference {
                api_version: Some(ObjectBucketClaim::api_version(&()).to_string()),
                kind: Some(ObjectBucketClaim::kind(&()).to_string()),
                name: claim.metadata.name.clone(),
                namespace: claim.metadata.namespace.clone(),
                uid: claim.metadata.uid.clone(),
                ..ObjectReference::default()
            }),
            reclaim_policy: bound.reclaim_policy,
            endpoint: BucketEndpoint {
                bucket_host: endpoint.host.clone(),
                bucket_port: endpoint.port,
                bucket_name: bound.bucket.to_owned(),
                region: DEFAULT_REGION.to_owned(),
                sub_region: String::new(),
                additional_config: BTreeMap::new(),
            },
            additional_state,
        },
    );
    ob.metadata.labels = Some(BTreeMap::from([(
        APP_LABEL.to_owned(),
        APP_NAME.to_owned(),
    )]));
    ob.status = Some(ObjectBucketStatus {
        phase: Some(ObcPhase::Bound),
    });
    ob
}

/// Connection details for the claim's workloads, named after the claim.
pub fn build_config_map(
    claim: &ObjectBucketClaim,
    endpoint: &S3Endpoint,
    bucket: &str,
    controller_name: &str,
) -> Result<ConfigMap> {
    let metadata = owned_meta(
        claim,
        claim.name_any(),
        object_labels(claim, controller_name, ROLE_DEFAULT),
    )
    .context(ObjectMetaSnafu)?;
    ConfigMapBuilder::new()
        .metadata(metadata)
        .add_data("BUCKET_HOST", &endpoint.host)
        .add_data("BUCKET_NAME", bucket)
        .add_data("BUCKET_PORT", endpoint.port.to_string())
        .add_data("BUCKET_REGION", DEFAULT_REGION)
        .add_data("BUCKET_SUBREGION", "")
        .build()
        .context(BuildConfigMapSnafu)
}

pub fn build_secret(claim: &ObjectBucketClaim, credentials: S3Credentials) -> Result<K8sSecret> {
    Secret::new(
        claim.name_any(),
        claim.namespace().unwrap_or_default(),
        credentials,
    )
    .to_owned_secret(claim)
    .context(BuildSecretSnafu)
}
