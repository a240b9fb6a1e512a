use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;
use snafu::ResultExt;
use stackable_operator::{
    builder::{
        meta::ObjectMetaBuilder,
        pod::{PodBuilder, container::ContainerBuilder, resources::ResourceRequirementsBuilder},
    },
    k8s_openapi::{
        api::{
            apps::v1::{Deployment, DeploymentSpec, StatefulSet, StatefulSetSpec},
            autoscaling::v2::{
                CrossVersionObjectReference, HorizontalPodAutoscaler, HorizontalPodAutoscalerSpec,
                MetricSpec, MetricTarget, ResourceMetricSource,
            },
            core::v1::{
                ContainerPort, EnvVarSource, PersistentVolumeClaim, PersistentVolumeClaimSpec,
                PodTemplateSpec, Probe, ResourceRequirements, SecretKeySelector, SecretReference,
                Service, ServiceAccount, ServicePort, ServiceSpec, TCPSocketAction, VolumeMount,
                VolumeResourceRequirements,
            },
        },
        apimachinery::pkg::{
            api::resource::Quantity,
            apis::meta::v1::{LabelSelector, ObjectMeta},
            util::intstr::IntOrString,
        },
    },
    kube::{
        ResourceExt,
        api::{ApiResource, DynamicObject, GroupVersionKind},
    },
    kvp::Labels,
};

use super::error::{
    AddVolumeMountSnafu, BuildLabelSnafu, InvalidContainerNameSnafu, ObjectMetaSnafu, Result,
};
use crate::{
    api::system::{AutoscalerType as SpecAutoscalerType, NooBaa},
    config::{AutoscalerType, OperatorConfig},
    manager::APP_NAME,
    remote::{MGMT_SERVICE, S3_SERVICE, SERVER_SECRET},
    resources::{object_labels, owned_meta},
};

pub const SYSTEM_CONTROLLER_NAME: &str = "noobaa";

pub const CORE_STATEFULSET: &str = "noobaa-core";
pub const DB_STATEFULSET: &str = "noobaa-db-pg";
pub const ENDPOINT_DEPLOYMENT: &str = "noobaa-endpoint";

pub const ROLE_CORE: &str = "core";
pub const ROLE_DB: &str = "db";
pub const ROLE_ENDPOINT: &str = "endpoint";

const CORE_CONTAINER: &str = "core";
const DB_CONTAINER: &str = "db";
const ENDPOINT_CONTAINER: &str = "endpoint";
const DB_VOLUME: &str = "db";
const DB_MOUNT_PATH: &str = "/var/lib/pgsql";
const DB_NAME: &str = "nbcore";
const DB_USER: &str = "noobaa";
const DB_PORT: i32 = 5432;
const DEFAULT_DB_VOLUME_SIZE: &str = "50Gi";
/// Key of the connection string in an external postgres secret.
const EXTERNAL_DB_URL_KEY: &str = "db_url";
const INIT_SCRIPT: &str = "/noobaa_init_files/noobaa_init.sh";
const AUTOSCALER_CPU_UTILIZATION: i32 = 80;

pub const MGMT_PORT: i32 = 8080;
pub const MGMT_HTTPS_PORT: i32 = 8443;
pub const MD_HTTPS_PORT: i32 = 8444;
pub const BG_HTTPS_PORT: i32 = 8445;
pub const HOSTED_AGENTS_HTTPS_PORT: i32 = 8446;
pub const S3_PORT: i32 = 6001;
pub const S3_HTTPS_PORT: i32 = 6443;

pub const MGMT_HTTPS_PORT_NAME: &str = "mgmt-https";
pub const S3_HTTPS_PORT_NAME: &str = "s3-https";

/// Generated once per system and kept across reconciles.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ServerSecrets {
    pub jwt: String,
    pub server_secret: String,
    pub db_password: String,
}

impl ServerSecrets {
    pub fn generate() -> ServerSecrets {
        ServerSecrets {
            jwt: hex::encode(rand::random::<[u8; 32]>()),
            server_secret: hex::encode(rand::random::<[u8; 4]>()),
            db_password: hex::encode(rand::random::<[u8; 16]>()),
        }
    }
}

/// Where the core finds its database.
#[derive(Clone, Debug, PartialEq)]
pub enum Database {
    Local,
    External(SecretReference),
}

impl Database {
    pub fn for_system(nb: &NooBaa) -> Database {
        match &nb.spec.external_pg_secret {
            Some(secret) => Database::External(secret.clone()),
            None => Database::Local,
        }
    }
}

/// How endpoints authenticate against the management service.
#[derive(Clone, Debug, PartialEq)]
pub enum EndpointAuth {
    /// The local core, trusted through the shared jwt secret.
    ServerSecret,
    /// A remote system, through the token in the named join secret.
    JoinSecret(String),
}

/// Addresses the endpoints are started with.
#[derive(Clone, Debug, PartialEq)]
pub struct EndpointAddresses {
    pub mgmt: String,
    pub md: String,
    pub bg: String,
    pub hosted_agents: String,
}

impl EndpointAddresses {
    pub fn local(namespace: &str) -> EndpointAddresses {
        let addr = |port: i32| format!("wss://{MGMT_SERVICE}.{namespace}.svc:{port}");
        EndpointAddresses {
            mgmt: addr(443),
            md: addr(MD_HTTPS_PORT),
            bg: addr(BG_HTTPS_PORT),
            hosted_agents: addr(HOSTED_AGENTS_HTTPS_PORT),
        }
    }
}

pub fn autoscaler_enabled(nb: &NooBaa, config: &OperatorConfig) -> bool {
    let disabled_by_spec = nb
        .spec
        .autoscaler
        .as_ref()
        .and_then(|autoscaler| autoscaler.autoscaler_type)
        == Some(SpecAutoscalerType::Disabled);
    config.autoscaler_type == AutoscalerType::Hpav2 && !disabled_by_spec
}

/// Hosts the s3 endpoints answer virtual-hosted style requests for.
pub fn virtual_hosts(nb: &NooBaa, namespace: &str) -> Vec<String> {
    let mut hosts = vec![
        format!("{S3_SERVICE}.{namespace}.svc"),
        format!("{S3_SERVICE}.{namespace}.svc.cluster.local"),
    ];
    hosts.extend(nb.endpoints().additional_virtual_hosts);
    hosts
}

fn secret_env(secret: &str, key: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            key: key.to_owned(),
            name: secret.to_owned(),
            optional: None,
        }),
        ..EnvVarSource::default()
    }
}

fn tcp_probe(port: i32) -> Probe {
    Probe {
        failure_threshold: Some(3),
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(port),
            ..TCPSocketAction::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(10),
        timeout_seconds: Some(5),
        ..Probe::default()
    }
}

fn container_ports(ports: &[(&str, i32)]) -> Vec<ContainerPort> {
    ports
        .iter()
        .map(|(name, port)| ContainerPort {
            container_port: *port,
            name: Some((*name).into()),
            protocol: Some("TCP".into()),
            ..ContainerPort::default()
        })
        .collect()
}

fn selector(nb: &NooBaa, role: &str) -> Result<LabelSelector> {
    let labels = Labels::role_selector(nb, APP_NAME, role).context(BuildLabelSnafu)?;
    Ok(LabelSelector {
        match_labels: Some(labels.into()),
        ..LabelSelector::default()
    })
}

/// Pod template with the recommended labels, the user labels of the spec and
/// its image pull secret.
fn pod_template(
    nb: &NooBaa,
    role: &str,
    pod_builder: &mut PodBuilder,
    service_account: &ServiceAccount,
) -> Result<PodTemplateSpec> {
    let mut metadata = ObjectMetaBuilder::new()
        .with_recommended_labels(object_labels(nb, SYSTEM_CONTROLLER_NAME, role))
        .context(ObjectMetaSnafu)?
        .build();
    if let Some(extra) = &nb.spec.labels {
        metadata
            .labels
            .get_or_insert_with(BTreeMap::new)
            .extend(extra.clone());
    }
    pod_builder
        .metadata(metadata)
        .service_account_name(service_account.name_any());
    let mut template = pod_builder.build_template();
    if let (Some(pull_secret), Some(spec)) = (&nb.spec.image_pull_secret, template.spec.as_mut()) {
        spec.image_pull_secrets = Some(vec![pull_secret.clone()]);
    }
    Ok(template)
}

fn default_core_resources() -> ResourceRequirements {
    ResourceRequirementsBuilder::new()
        .with_cpu_request("999m")
        .with_cpu_limit("999m")
        .with_memory_request("4Gi")
        .with_memory_limit("4Gi")
        .build()
}

fn default_db_resources() -> ResourceRequirements {
    ResourceRequirementsBuilder::new()
        .with_cpu_request("500m")
        .with_cpu_limit("500m")
        .with_memory_request("4Gi")
        .with_memory_limit("4Gi")
        .build()
}

fn default_endpoint_resources() -> ResourceRequirements {
    ResourceRequirementsBuilder::new()
        .with_cpu_request("999m")
        .with_cpu_limit("999m")
        .with_memory_request("2Gi")
        .with_memory_limit("2Gi")
        .build()
}

pub fn build_core_statefulset(
    nb: &NooBaa,
    image: &str,
    database: &Database,
    service_account: &ServiceAccount,
) -> Result<StatefulSet> {
    let namespace = nb.namespace().unwrap_or_default();
    let mut container = ContainerBuilder::new(CORE_CONTAINER).context(
        InvalidContainerNameSnafu {
            name: CORE_CONTAINER.to_string(),
        },
    )?;
    container
        .image(image)
        .add_env_var("CONTAINER_PLATFORM", "KUBERNETES")
        .add_env_var("NOOBAA_LOG_LEVEL", "default_level")
        .add_env_var_from_source("JWT_SECRET", secret_env(SERVER_SECRET, "jwt"))
        .add_env_var_from_source("SERVER_SECRET", secret_env(SERVER_SECRET, "server_secret"))
        .add_container_ports(container_ports(&[
            ("mgmt", MGMT_PORT),
            (MGMT_HTTPS_PORT_NAME, MGMT_HTTPS_PORT),
            ("md-https", MD_HTTPS_PORT),
            ("bg-https", BG_HTTPS_PORT),
            ("hosted-agents-https", HOSTED_AGENTS_HTTPS_PORT),
        ]))
        .readiness_probe(tcp_probe(MGMT_PORT))
        .resources(
            nb.spec
                .core_resources
                .clone()
                .unwrap_or_else(default_core_resources),
        );
    match database {
        Database::Local => {
            container
                .add_env_var(
                    "POSTGRES_HOST",
                    format!("{DB_STATEFULSET}-0.{DB_STATEFULSET}.{namespace}.svc"),
                )
                .add_env_var("POSTGRES_DBNAME", DB_NAME)
                .add_env_var("POSTGRES_USER", DB_USER)
                .add_env_var_from_source(
                    "POSTGRES_PASSWORD",
                    secret_env(SERVER_SECRET, "db_password"),
                );
        }
        Database::External(secret) => {
            container.add_env_var_from_source(
                "POSTGRES_CONNECTION_STRING",
                secret_env(
                    secret.name.as_deref().unwrap_or_default(),
                    EXTERNAL_DB_URL_KEY,
                ),
            );
        }
    }

    let mut pod_builder = PodBuilder::new();
    pod_builder.add_container(container.build());

    Ok(StatefulSet {
        metadata: owned_meta(
            nb,
            CORE_STATEFULSET,
            object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_CORE),
        )
        .context(ObjectMetaSnafu)?,
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: selector(nb, ROLE_CORE)?,
            service_name: MGMT_SERVICE.to_string(),
            template: pod_template(nb, ROLE_CORE, &mut pod_builder, service_account)?,
            ..StatefulSetSpec::default()
        }),
        status: None,
    })
}

pub fn build_db_statefulset(
    nb: &NooBaa,
    image: &str,
    service_account: &ServiceAccount,
) -> Result<StatefulSet> {
    let mut container = ContainerBuilder::new(DB_CONTAINER).context(
        InvalidContainerNameSnafu {
            name: DB_CONTAINER.to_string(),
        },
    )?;
    container
        .image(image)
        .add_env_var("POSTGRESQL_DATABASE", DB_NAME)
        .add_env_var("POSTGRESQL_USER", DB_USER)
        .add_env_var_from_source(
            "POSTGRESQL_PASSWORD",
            secret_env(SERVER_SECRET, "db_password"),
        )
        .add_container_ports(container_ports(&[("postgres", DB_PORT)]))
        .add_volume_mounts(vec![VolumeMount {
            name: DB_VOLUME.to_string(),
            mount_path: DB_MOUNT_PATH.to_string(),
            ..VolumeMount::default()
        }])
        .context(AddVolumeMountSnafu)?
        .readiness_probe(tcp_probe(DB_PORT))
        .resources(
            nb.spec
                .db_resources
                .clone()
                .unwrap_or_else(default_db_resources),
        );

    let mut pod_builder = PodBuilder::new();
    pod_builder.add_container(container.build());

    let size = nb
        .spec
        .db_volume_size
        .clone()
        .unwrap_or_else(|| Quantity(DEFAULT_DB_VOLUME_SIZE.to_string()));
    let selector_labels = Labels::role_selector(nb, APP_NAME, ROLE_DB).context(BuildLabelSnafu)?;
    let claim_template = PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DB_VOLUME.to_string()),
            labels: Some(selector_labels.into()),
            ..ObjectMeta::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteOnce".to_string()]),
            storage_class_name: nb.spec.db_storage_class.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: Some([("storage".to_string(), size)].into()),
                ..VolumeResourceRequirements::default()
            }),
            ..PersistentVolumeClaimSpec::default()
        }),
        status: None,
    };

    Ok(StatefulSet {
        metadata: owned_meta(
            nb,
            DB_STATEFULSET,
            object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_DB),
        )
        .context(ObjectMetaSnafu)?,
        spec: Some(StatefulSetSpec {
            replicas: Some(1),
            selector: selector(nb, ROLE_DB)?,
            service_name: DB_STATEFULSET.to_string(),
            template: pod_template(nb, ROLE_DB, &mut pod_builder, service_account)?,
            volume_claim_templates: Some(vec![claim_template]),
            ..StatefulSetSpec::default()
        }),
        status: None,
    })
}

fn service_port(name: &str, port: i32, target: i32) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        target_port: Some(IntOrString::Int(target)),
        protocol: Some("TCP".to_string()),
        ..ServicePort::default()
    }
}

fn service_type(nb: &NooBaa) -> String {
    if nb.spec.disable_load_balancer_service {
        "ClusterIP".to_string()
    } else {
        "LoadBalancer".to_string()
    }
}

fn build_service(
    nb: &NooBaa,
    name: &str,
    role: &str,
    ports: Vec<ServicePort>,
    spec: ServiceSpec,
) -> Result<Service> {
    let selector = Labels::role_selector(nb, APP_NAME, role).context(BuildLabelSnafu)?;
    Ok(Service {
        metadata: owned_meta(nb, name, object_labels(nb, SYSTEM_CONTROLLER_NAME, role))
            .context(ObjectMetaSnafu)?,
        spec: Some(ServiceSpec {
            ports: Some(ports),
            selector: Some(selector.into()),
            ..spec
        }),
        ..Service::default()
    })
}

pub fn build_mgmt_service(nb: &NooBaa) -> Result<Service> {
    build_service(
        nb,
        MGMT_SERVICE,
        ROLE_CORE,
        vec![
            service_port("mgmt", 80, MGMT_PORT),
            service_port(MGMT_HTTPS_PORT_NAME, 443, MGMT_HTTPS_PORT),
            service_port("md-https", MD_HTTPS_PORT, MD_HTTPS_PORT),
            service_port("bg-https", BG_HTTPS_PORT, BG_HTTPS_PORT),
            service_port(
                "hosted-agents-https",
                HOSTED_AGENTS_HTTPS_PORT,
                HOSTED_AGENTS_HTTPS_PORT,
            ),
        ],
        ServiceSpec {
            type_: Some(service_type(nb)),
            ..ServiceSpec::default()
        },
    )
}

pub fn build_s3_service(nb: &NooBaa) -> Result<Service> {
    build_service(
        nb,
        S3_SERVICE,
        ROLE_ENDPOINT,
        vec![
            service_port("s3", 80, S3_PORT),
            service_port(S3_HTTPS_PORT_NAME, 443, S3_HTTPS_PORT),
        ],
        ServiceSpec {
            type_: Some(service_type(nb)),
            ..ServiceSpec::default()
        },
    )
}

/// Headless service giving the db pod its stable name.
pub fn build_db_service(nb: &NooBaa) -> Result<Service> {
    build_service(
        nb,
        DB_STATEFULSET,
        ROLE_DB,
        vec![service_port("postgres", DB_PORT, DB_PORT)],
        ServiceSpec {
            cluster_ip: Some("None".to_string()),
            ..ServiceSpec::default()
        },
    )
}

pub fn build_endpoint_deployment(
    nb: &NooBaa,
    image: &str,
    addresses: &EndpointAddresses,
    auth: &EndpointAuth,
    virtual_hosts: &[String],
    service_account: &ServiceAccount,
) -> Result<Deployment> {
    let endpoints = nb.endpoints();
    let mut container = ContainerBuilder::new(ENDPOINT_CONTAINER).context(
        InvalidContainerNameSnafu {
            name: ENDPOINT_CONTAINER.to_string(),
        },
    )?;
    container
        .image(image)
        .command(vec![INIT_SCRIPT.to_string(), "init_endpoint".to_string()])
        .add_env_var("CONTAINER_PLATFORM", "KUBERNETES")
        .add_env_var("MGMT_ADDR", &addresses.mgmt)
        .add_env_var("MD_ADDR", &addresses.md)
        .add_env_var("BG_ADDR", &addresses.bg)
        .add_env_var("HOSTED_AGENTS_ADDR", &addresses.hosted_agents)
        .add_env_var("VIRTUAL_HOSTS", virtual_hosts.join(" "))
        .add_env_var("REGION", "")
        .add_container_ports(container_ports(&[
            ("s3", S3_PORT),
            (S3_HTTPS_PORT_NAME, S3_HTTPS_PORT),
        ]))
        .readiness_probe(tcp_probe(S3_PORT))
        .resources(
            endpoints
                .resources
                .clone()
                .unwrap_or_else(default_endpoint_resources),
        );
    match auth {
        EndpointAuth::ServerSecret => {
            container.add_env_var_from_source("JWT_SECRET", secret_env(SERVER_SECRET, "jwt"));
        }
        EndpointAuth::JoinSecret(name) => {
            container.add_env_var_from_source("NOOBAA_AUTH_TOKEN", secret_env(name, "auth_token"));
        }
    }

    let mut pod_builder = PodBuilder::new();
    pod_builder.add_container(container.build());

    Ok(Deployment {
        metadata: owned_meta(
            nb,
            ENDPOINT_DEPLOYMENT,
            object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_ENDPOINT),
        )
        .context(ObjectMetaSnafu)?,
        spec: Some(DeploymentSpec {
            replicas: Some(endpoints.min_count),
            selector: selector(nb, ROLE_ENDPOINT)?,
            template: pod_template(nb, ROLE_ENDPOINT, &mut pod_builder, service_account)?,
            ..DeploymentSpec::default()
        }),
        status: None,
    })
}

/// Scales the endpoints between the spec bounds on cpu utilization.
pub fn build_endpoint_autoscaler(nb: &NooBaa) -> Result<HorizontalPodAutoscaler> {
    let endpoints = nb.endpoints();
    Ok(HorizontalPodAutoscaler {
        metadata: owned_meta(
            nb,
            ENDPOINT_DEPLOYMENT,
            object_labels(nb, SYSTEM_CONTROLLER_NAME, ROLE_ENDPOINT),
        )
        .context(ObjectMetaSnafu)?,
        spec: Some(HorizontalPodAutoscalerSpec {
            scale_target_ref: CrossVersionObjectReference {
                api_version: Some("apps/v1".to_string()),
                kind: "Deployment".to_string(),
                name: ENDPOINT_DEPLOYMENT.to_string(),
            },
            min_replicas: Some(endpoints.min_count),
            max_replicas: endpoints.max_count,
            metrics: Some(vec![MetricSpec {
                type_: "Resource".to_string(),
                resource: Some(ResourceMetricSource {
                    name: "cpu".to_string(),
                    target: MetricTarget {
                        type_: "Utilization".to_string(),
                        average_utilization: Some(AUTOSCALER_CPU_UTILIZATION),
                        ..MetricTarget::default()
                    },
                }),
                ..MetricSpec::default()
            }]),
            ..HorizontalPodAutoscalerSpec::default()
        }),
        status: None,
    })
}

/// A kind served by an optional CRD.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OptionalKind {
    pub group: &'static str,
    pub version: &'static str,
    pub kind: &'static str,
    pub plural: &'static str,
}

impl OptionalKind {
    pub fn gvk(&self) -> GroupVersionKind {
        GroupVersionKind::gvk(self.group, self.version, self.kind)
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource::from_gvk_with_plural(&self.gvk(), self.plural)
    }
}

pub const PROMETHEUS_RULE: OptionalKind = OptionalKind {
    group: "monitoring.coreos.com",
    version: "v1",
    kind: "PrometheusRule",
    plural: "prometheusrules",
};

pub const SERVICE_MONITOR: OptionalKind = OptionalKind {
    group: "monitoring.coreos.com",
    version: "v1",
    kind: "ServiceMonitor",
    plural: "servicemonitors",
};

pub const ROUTE: OptionalKind = OptionalKind {
    group: "route.openshift.io",
    version: "v1",
    kind: "Route",
    plural: "routes",
};

fn dynamic_object(
    nb: &NooBaa,
    kind: &OptionalKind,
    name: &str,
    role: &str,
    data: serde_json::Value,
) -> Result<DynamicObject> {
    let mut obj = DynamicObject::new(name, &kind.api_resource()).data(data);
    obj.metadata = owned_meta(nb, name, object_labels(nb, SYSTEM_CONTROLLER_NAME, role))
        .context(ObjectMetaSnafu)?;
    Ok(obj)
}

pub fn build_prometheus_rule(nb: &NooBaa) -> Result<DynamicObject> {
    let name = nb.name_any();
    dynamic_object(
        nb,
        &PROMETHEUS_RULE,
        "noobaa-prometheus-rules",
        ROLE_CORE,
        json!({
            "spec": {
                "groups": [{
                    "name": "noobaa-system",
                    "rules": [
                        {
                            "alert": "NooBaaSystemCapacityWarning",
                            "expr": format!("NooBaa_system_capacity{{system=\"{name}\"}} > 85"),
                            "for": "5m",
                            "labels": { "severity": "warning" },
                            "annotations": {
                                "message": "system capacity is above 85%",
                            },
                        },
                        {
                            "alert": "NooBaaEndpointsDown",
                            "expr": "absent(up{job=\"s3\"} == 1)",
                            "for": "5m",
                            "labels": { "severity": "critical" },
                            "annotations": {
                                "message": "no s3 endpoint is serving",
                            },
                        },
                    ],
                }],
            },
        }),
    )
}

pub fn build_service_monitor(nb: &NooBaa, service: &Service, port: &str) -> Result<DynamicObject> {
    let service_name = service.name_any();
    let selector = service
        .metadata
        .labels
        .clone()
        .unwrap_or_default();
    let role = if service_name == S3_SERVICE {
        ROLE_ENDPOINT
    } else {
        ROLE_CORE
    };
    dynamic_object(
        nb,
        &SERVICE_MONITOR,
        &format!("{service_name}-service-monitor"),
        role,
        json!({
            "spec": {
                "endpoints": [{ "port": port, "path": "/metrics", "scheme": "http" }],
                "namespaceSelector": {},
                "selector": { "matchLabels": selector },
            },
        }),
    )
}

pub fn build_route(nb: &NooBaa, service: &str, port: &str) -> Result<DynamicObject> {
    let role = if service == S3_SERVICE {
        ROLE_ENDPOINT
    } else {
        ROLE_CORE
    };
    dynamic_object(
        nb,
        &ROUTE,
        service,
        role,
        json!({
            "spec": {
                "to": { "kind": "Service", "name": service },
                "port": { "targetPort": port },
                "tls": {
                    "termination": "reencrypt",
                    "insecureEdgeTerminationPolicy": "Redirect",
                },
            },
        }),
    )
}
