//! The remote half of a store: external connection plus pool or namespace resource.

use noobaa_rpc::{
    BigInt, NoobaaApi,
    error::{
        RPC_CODE_CONNECTION_ALREADY_EXIST, RPC_CODE_NO_SUCH_NAMESPACE_RESOURCE,
        RPC_CODE_NO_SUCH_POOL, ignore_codes,
    },
    types::{
        AddExternalConnectionParams, CreateCloudPoolParams, CreateHostsPoolParams,
        CreateNamespaceResourceParams, OwnerResourceInfo, PoolHostsInfo, SystemInfo,
        UpdateCloudPoolParams,
    },
};
use snafu::{OptionExt, ResultExt, ensure};

use super::{
    error::{MissingSecretSnafu, MissingTypeSpecSnafu, RejectedModeSnafu, Result, RpcSnafu},
    verify::Credentials,
};
use crate::{
    api::{
        bucket_class::BucketClass,
        store::{NsfsSpec, PvPoolSpec, S3SignatureVersion, Store, StoreKind, StoreTarget},
    },
    quantity::parse_quantity,
};

/// Modes no retry gets out of; the store is rejected while the pool reports one.
pub const REJECTED_MODES: [&str; 5] = [
    "AUTH_FAILED",
    "STORAGE_NOT_EXIST",
    "INVALID_ENDPOINT",
    "TARGET_BUCKET_NOT_EXISTS",
    "IO_ERRORS",
];

/// Annotation carrying the externally measured capacity of a cloud pool.
pub const CAPACITY_ANNOTATION: &str = "noobaa.io/available-capacity";

pub const DEFAULT_VOLUME_SIZE: u64 = 20 << 30;
pub const MODE_INITIALIZING: &str = "INITIALIZING";

fn mode_of(kind: StoreKind, system: &SystemInfo, name: &str) -> Option<String> {
    match kind {
        StoreKind::Backing => system.pool(name).map(|pool| pool.mode.clone()),
        StoreKind::Namespace => system.namespace_resource(name).map(|nsr| nsr.mode.clone()),
    }
}

/// Volume size of each pv pool member, from the `storage` request.
pub fn volume_size(pv_pool: &PvPoolSpec) -> u64 {
    pv_pool
        .resources
        .as_ref()
        .and_then(|resources| resources.requests.as_ref())
        .and_then(|requests| requests.get("storage"))
        .and_then(|quantity| parse_quantity(&quantity.0))
        .unwrap_or(DEFAULT_VOLUME_SIZE)
}

pub fn nsfs_path(nsfs: &NsfsSpec) -> String {
    match nsfs.sub_path.as_deref().filter(|p| !p.is_empty()) {
        Some(sub_path) => format!("{}/{}", nsfs.pvc_name, sub_path.trim_start_matches('/')),
        None => nsfs.pvc_name.clone(),
    }
}

fn auth_method(version: Option<S3SignatureVersion>) -> Option<String> {
    version.map(|version| match version {
        S3SignatureVersion::V4 => "AWS_V4".to_owned(),
        S3SignatureVersion::V2 => "AWS_V2".to_owned(),
    })
}

async fn add_connection(api: &dyn NoobaaApi, params: AddExternalConnectionParams) -> Result<()> {
    ignore_codes(
        api.add_external_connection(params).await,
        &[RPC_CODE_CONNECTION_ALREADY_EXIST],
    )
    .context(RpcSnafu {
        method: "add_external_connection",
    })?;
    Ok(())
}

/// Creates the remote entity of `store` if it is missing and returns its mode code.
pub async fn configure<S: Store>(
    api: &dyn NoobaaApi,
    store: &S,
    namespace: &str,
    credentials: Option<&Credentials>,
    capacity: Option<u64>,
) -> Result<String> {
    let kind = S::KIND;
    let name = store.store_name();
    let system = api.read_system().await.context(RpcSnafu {
        method: "read_system",
    })?;

    if let Some(mode) = mode_of(kind, &system, &name) {
        if let (StoreKind::Backing, Some(capacity), Some(StoreTarget::Cloud { .. })) =
            (kind, capacity, store.target())
        {
            api.update_cloud_pool(UpdateCloudPoolParams {
                name: name.clone(),
                available_capacity: BigInt::from(capacity),
            })
            .await
            .context(RpcSnafu {
                method: "update_cloud_pool",
            })?;
        }
        return Ok(mode);
    }

    tracing::info!(%name, %kind, "creating remote store");
    let owner = Some(OwnerResourceInfo {
        name: name.clone(),
        namespace: namespace.to_owned(),
    });
    let target = store.target().context(MissingTypeSpecSnafu {
        kind,
        store_type: store.store_type(),
    })?;
    match target {
        StoreTarget::Cloud {
            endpoint_type,
            endpoint,
            target_bucket,
            secret,
            region,
            signature_version,
        } => {
            let credentials = credentials.context(MissingSecretSnafu {
                name: secret.name.clone().unwrap_or_default(),
            })?;
            add_connection(
                api,
                AddExternalConnectionParams {
                    name: name.clone(),
                    endpoint,
                    endpoint_type: endpoint_type.to_owned(),
                    identity: credentials.identity.clone(),
                    secret: credentials.secret.clone(),
                    auth_method: auth_method(signature_version),
                    region: region.map(str::to_owned),
                },
            )
            .await?;
            match kind {
                StoreKind::Backing => api
                    .create_cloud_pool(CreateCloudPoolParams {
                        name: name.clone(),
                        connection: name.clone(),
                        target_bucket: target_bucket.to_owned(),
                        backingstore: owner,
                        available_capacity: capacity.map(BigInt::from),
                    })
                    .await
                    .context(RpcSnafu {
                        method: "create_cloud_pool",
                    })?,
                StoreKind::Namespace => api
                    .create_namespace_resource(CreateNamespaceResourceParams {
                        name: name.clone(),
                        connection: name.clone(),
                        target_bucket: target_bucket.to_owned(),
                        namespace_store: owner,
                    })
                    .await
                    .context(RpcSnafu {
                        method: "create_namespace_resource",
                    })?,
            }
        }
        StoreTarget::PvPool(pv_pool) => api
            .create_hosts_pool(CreateHostsPoolParams {
                name: name.clone(),
                is_managed: true,
                host_count: pv_pool.num_volumes,
                host_config: PoolHostsInfo {
                    volume_size: i64::try_from(volume_size(pv_pool)).unwrap_or(i64::MAX),
                },
                backingstore: owner,
            })
            .await
            .context(RpcSnafu {
                method: "create_hosts_pool",
            })?,
        StoreTarget::Nsfs(nsfs) => api
            .create_namespace_resource(CreateNamespaceResourceParams {
                name: name.clone(),
                connection: String::new(),
                target_bucket: nsfs_path(nsfs),
                namespace_store: owner,
            })
            .await
            .context(RpcSnafu {
                method: "create_namespace_resource",
            })?,
    }

    let system = api.read_system().await.context(RpcSnafu {
        method: "read_system",
    })?;
    Ok(mode_of(kind, &system, &name).unwrap_or_else(|| MODE_INITIALIZING.to_owned()))
}

pub fn check_mode(mode: &str) -> Result<()> {
    ensure!(!REJECTED_MODES.contains(&mode), RejectedModeSnafu { mode });
    Ok(())
}

/// Removes the remote entity; a missing one counts as removed.
pub async fn delete<S: Store>(api: &dyn NoobaaApi, store: &S) -> Result<()> {
    let name = store.store_name();
    match S::KIND {
        StoreKind::Backing => {
            ignore_codes(api.delete_pool(&name).await, &[RPC_CODE_NO_SUCH_POOL]).context(
                RpcSnafu {
                    method: "delete_pool",
                },
            )?;
        }
        StoreKind::Namespace => {
            ignore_codes(
                api.delete_namespace_resource(&name).await,
                &[RPC_CODE_NO_SUCH_NAMESPACE_RESOURCE],
            )
            .context(RpcSnafu {
                method: "delete_namespace_resource",
            })?;
        }
    }
    Ok(())
}

/// Names of the bucket classes that reference the store.
pub fn referencing_classes<S: Store>(store: &S, classes: &[BucketClass]) -> Vec<String> {
    let name = store.store_name();
    classes
        .iter()
        .filter(|class| {
            let referenced = match S::KIND {
                StoreKind::Backing => class.backing_stores(),
                StoreKind::Namespace => class.namespace_stores(),
            };
            referenced.contains(&name.as_str())
        })
        .filter_map(|class| class.metadata.name.clone())
        .collect()
}
