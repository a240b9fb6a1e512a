//! Building an rpc client for the system a resource lives in.

use std::{collections::BTreeMap, sync::Arc};

use noobaa_rpc::{RpcClient, RpcError, ServiceRouter};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt, Snafu};
use stackable_operator::k8s_openapi::api::core::v1::SecretReference;

use crate::{
    api::system::{NooBaa, ServiceStatus},
    config::{OperatorConfig, RpcMode},
    manager::Ctx,
    secret::Secret,
};

pub const OPERATOR_SECRET: &str = "noobaa-operator";
pub const ADMIN_SECRET: &str = "noobaa-admin";
pub const SERVER_SECRET: &str = "noobaa-server";
pub const MGMT_SERVICE: &str = "noobaa-mgmt";
pub const S3_SERVICE: &str = "s3";

/// Address keys a join secret carries, one per routed api group.
pub const JOIN_KEYS: [&str; 4] = ["mgmt_addr", "bg_addr", "md_addr", "hosted_agents_addr"];
pub const JOIN_AUTH_TOKEN: &str = "auth_token";

#[derive(Snafu, Debug)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("failed to get system {name}"))]
    GetSystem {
        source: stackable_operator::client::Error,
        name: String,
    },

    #[snafu(display("system {name} not found in {namespace}"))]
    SystemNotFound { name: String, namespace: String },

    #[snafu(display("system {name} is not ready"))]
    SystemNotReady { name: String },

    #[snafu(display("failed to read operator credentials"))]
    ReadCredentials { source: crate::secret::Error },

    #[snafu(display("operator credentials carry no auth token yet"))]
    MissingAuthToken,

    #[snafu(display("failed to build rpc client"))]
    BuildClient { source: RpcError },

    #[snafu(display("join secret reference has no name"))]
    JoinSecretHasNoName,

    #[snafu(display("failed to read join secret"))]
    ReadJoinSecret { source: crate::secret::Error },

    #[snafu(display("join secret {name} does not exist"))]
    JoinSecretNotFound { name: String },

    #[snafu(display("join secret {name} does not route every api"))]
    InvalidJoinSecret { source: RpcError, name: String },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Contents of the operator secret: the account the operator logs in as.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OperatorCredentials {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
}

/// Picks the management address: configured override, then node ports, then
/// pod ports, then the in-cluster service name.
pub fn mgmt_router(
    config: &OperatorConfig,
    namespace: &str,
    mgmt: Option<&ServiceStatus>,
) -> ServiceRouter {
    if let Some(addr) = &config.mgmt_addr {
        return ServiceRouter::single(rpc_address(addr, config.rpc_mode));
    }
    let discovered = mgmt.and_then(|status| {
        status
            .node_ports
            .first()
            .or_else(|| status.pod_ports.first())
    });
    match discovered {
        Some(addr) => ServiceRouter::single(rpc_address(addr, config.rpc_mode)),
        None => ServiceRouter::for_host(
            config.rpc_mode.scheme(),
            &format!("{MGMT_SERVICE}.{namespace}.svc.cluster.local"),
        ),
    }
}

/// Rewrites a service address (`https://host:port`) into an rpc endpoint.
pub fn rpc_address(addr: &str, mode: RpcMode) -> String {
    let host = addr
        .split_once("://")
        .map_or(addr, |(_, rest)| rest)
        .trim_end_matches('/');
    let host = host.strip_suffix("/rpc").unwrap_or(host);
    format!("{}://{host}/rpc/", mode.scheme())
}

pub fn build_client(
    ctx: &Ctx,
    router: ServiceRouter,
    auth_token: Option<String>,
) -> Result<RpcClient> {
    let client = RpcClient::new(Arc::new(router))
        .context(BuildClientSnafu)?
        .with_cancellation(ctx.cancel.clone());
    client.set_auth_token(auth_token);
    Ok(client)
}

pub async fn read_credentials(ctx: &Ctx) -> Result<Option<OperatorCredentials>> {
    let secret = Secret::<OperatorCredentials>::fetch_opt(
        &ctx.client,
        OPERATOR_SECRET,
        &ctx.config.namespace,
    )
    .await
    .context(ReadCredentialsSnafu)?;
    Ok(secret.map(Secret::into_value))
}

/// Client for the configured system, once it is ready and the operator holds a token.
pub async fn system_api(ctx: &Ctx) -> Result<RpcClient> {
    let name = &ctx.config.system_name;
    let namespace = &ctx.config.namespace;
    let system = ctx
        .client
        .get_opt::<NooBaa>(name, namespace)
        .await
        .context(GetSystemSnafu { name })?
        .context(SystemNotFoundSnafu { name, namespace })?;
    if !system.is_ready() {
        return SystemNotReadySnafu { name }.fail();
    }
    let token = read_credentials(ctx)
        .await?
        .and_then(|credentials| credentials.auth_token)
        .context(MissingAuthTokenSnafu)?;
    let router = match &system.spec.join_secret {
        Some(join) => join_router(ctx, join, namespace).await?,
        None => {
            let mgmt = system
                .status
                .as_ref()
                .and_then(|status| status.services.as_ref())
                .map(|services| &services.service_mgmt);
            mgmt_router(&ctx.config, namespace, mgmt)
        }
    };
    build_client(ctx, router, Some(token))
}

/// Contents of the join secret, `None` when it does not exist (yet).
pub async fn read_join_data(
    ctx: &Ctx,
    join: &SecretReference,
    default_namespace: &str,
) -> Result<Option<(String, BTreeMap<String, String>)>> {
    let name = join.name.as_deref().context(JoinSecretHasNoNameSnafu)?;
    let namespace = join.namespace.as_deref().unwrap_or(default_namespace);
    let secret = Secret::<BTreeMap<String, String>>::fetch_opt(&ctx.client, name, namespace)
        .await
        .context(ReadJoinSecretSnafu)?;
    Ok(secret.map(|secret| (name.to_owned(), secret.into_value())))
}

async fn join_router(
    ctx: &Ctx,
    join: &SecretReference,
    namespace: &str,
) -> Result<ServiceRouter> {
    let (name, data) = read_join_data(ctx, join, namespace)
        .await?
        .with_context(|| JoinSecretNotFoundSnafu {
            name: join.name.clone().unwrap_or_default(),
        })?;
    ServiceRouter::from_join_data(&data).context(InvalidJoinSecretSnafu { name })
}

#[cfg(test)]
mod tests {
    use noobaa_rpc::RpcRouter;

    use super::*;

    fn status(node_ports: &[&str], pod_ports: &[&str]) -> ServiceStatus {
        ServiceStatus {
            node_ports: node_ports.iter().map(|s| s.to_string()).collect(),
            pod_ports: pod_ports.iter().map(|s| s.to_string()).collect(),
            ..ServiceStatus::default()
        }
    }

    #[test]
    fn test_override_wins() {
        let config = OperatorConfig {
            mgmt_addr: Some("https://mgmt.example.com:443".into()),
            ..OperatorConfig::default()
        };
        let router = mgmt_router(&config, "ns", Some(&status(&["https://10.0.0.1:31443"], &[])));
        assert_eq!(router.mgmt_addr, "wss://mgmt.example.com:443/rpc/");
    }

    #[test]
    fn test_node_port_then_pod_port() {
        let config = OperatorConfig::default();
        let router = mgmt_router(
            &config,
            "ns",
            Some(&status(&["https://10.0.0.1:31443"], &["https://10.1.0.5:8443"])),
        );
        assert_eq!(router.address_for("account_api"), "wss://10.0.0.1:31443/rpc/");

        let router = mgmt_router(&config, "ns", Some(&status(&[], &["https://10.1.0.5:8443"])));
        assert_eq!(router.address_for("object_api"), "wss://10.1.0.5:8443/rpc/");
    }

    #[test]
    fn test_falls_back_to_service_dns() {
        let config = OperatorConfig {
            rpc_mode: RpcMode::Http,
            ..OperatorConfig::default()
        };
        let router = mgmt_router(&config, "storage", None);
        assert_eq!(
            router.mgmt_addr,
            "https://noobaa-mgmt.storage.svc.cluster.local:443/rpc/"
        );
        assert_eq!(
            router.address_for("object_api"),
            "https://noobaa-mgmt.storage.svc.cluster.local:8444/rpc/"
        );
    }

    #[test]
    fn test_rpc_address() {
        assert_eq!(rpc_address("10.0.0.1:443", RpcMode::Ws), "wss://10.0.0.1:443/rpc/");
        assert_eq!(
            rpc_address("https://host:443/rpc/", RpcMode::Http),
            "https://host:443/rpc/"
        );
    }
}
