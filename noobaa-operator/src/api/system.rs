use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use stackable_operator::{
    k8s_openapi::{
        api::core::v1::{LocalObjectReference, ResourceRequirements, SecretReference},
        apimachinery::pkg::api::resource::Quantity,
    },
    kube::CustomResource,
};

use super::{Phase, conditions::Condition};

/// The top-level resource: one storage system installation per namespace.
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema)]
#[cfg_attr(test, derive(Default))]
#[kube(
    kind = "NooBaa",
    group = "noobaa.io",
    version = "v1alpha1",
    plural = "noobaas",
    status = "NooBaaStatus",
    shortname = "nb",
    namespaced,
    crates(
        kube_core = "stackable_operator::kube::core",
        k8s_openapi = "stackable_operator::k8s_openapi",
        schemars = "stackable_operator::schemars"
    )
)]
#[serde(rename_all = "camelCase")]
pub struct NooBaaSpec {
    /// Core image, defaults to the operator's configured image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub core_resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_resources: Option<ResourceRequirements>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_volume_size: Option<Quantity>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_storage_class: Option<String>,

    /// Secret holding `db_url` of an external postgres; no db stateful set is created when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_pg_secret: Option<SecretReference>,

    /// Joins a remote management endpoint instead of running the core locally
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join_secret: Option<SecretReference>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<EndpointsSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaler: Option<AutoscalerSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_pull_secret: Option<LocalObjectReference>,

    #[serde(default)]
    pub disable_load_balancer_service: bool,

    #[serde(default)]
    pub disable_routes: bool,

    /// Skip creating the default backing store and bucket class
    #[serde(default)]
    pub manual_default_backing_store: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_policy: Option<CleanupPolicySpec>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsSpec {
    #[serde(default = "EndpointsSpec::default_count")]
    pub min_count: i32,

    #[serde(default = "EndpointsSpec::default_count")]
    pub max_count: i32,

    #[serde(default)]
    pub additional_virtual_hosts: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl EndpointsSpec {
    fn default_count() -> i32 {
        1
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AutoscalerType {
    #[default]
    Hpav2,
    Disabled,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AutoscalerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autoscaler_type: Option<AutoscalerType>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CleanupPolicySpec {
    #[serde(default)]
    pub allow_noobaa_deletion: bool,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NooBaaStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default)]
    pub conditions: Vec<Condition>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actual_image: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub services: Option<ServicesStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accounts: Option<AccountsStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoints: Option<EndpointsStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServicesStatus {
    pub service_mgmt: ServiceStatus,
    pub service_s3: ServiceStatus,
}

/// Every address a service can be reached at, best first within each list.
#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ServiceStatus {
    #[serde(default)]
    pub node_ports: Vec<String>,
    #[serde(default)]
    pub pod_ports: Vec<String>,
    #[serde(default, rename = "internalIP")]
    pub internal_ip: Vec<String>,
    #[serde(default, rename = "internalDNS")]
    pub internal_dns: Vec<String>,
    #[serde(default, rename = "externalIP")]
    pub external_ip: Vec<String>,
    #[serde(default, rename = "externalDNS")]
    pub external_dns: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccountsStatus {
    pub admin: UserStatus,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub secret_ref: SecretReference,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EndpointsStatus {
    pub ready_count: i32,
    #[serde(default)]
    pub virtual_hosts: Vec<String>,
}

impl NooBaa {
    pub fn core_image<'a>(&'a self, default: &'a str) -> &'a str {
        self.spec.image.as_deref().unwrap_or(default)
    }

    pub fn endpoints(&self) -> EndpointsSpec {
        self.spec.endpoints.clone().unwrap_or(EndpointsSpec {
            min_count: 1,
            max_count: 1,
            ..EndpointsSpec::default()
        })
    }

    pub fn uses_external_db(&self) -> bool {
        self.spec.external_pg_secret.is_some()
    }

    pub fn is_ready(&self) -> bool {
        self.status
            .as_ref()
            .and_then(|status| status.phase)
            .is_some_and(|phase| phase == Phase::Ready)
    }
}
