use std::{collections::BTreeMap, sync::Arc, time::Duration};

use futures::StreamExt;
use noobaa_rpc::{NoobaaApi, RpcClient};
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::Client,
    cluster_resources::{ClusterResourceApplyStrategy, ClusterResources},
    commons::rbac::build_rbac_resources,
    k8s_openapi::{
        api::{
            apps::v1::{Deployment, StatefulSet},
            autoscaling::v2::HorizontalPodAutoscaler,
            core::v1::{PersistentVolumeClaim, Pod, Secret as K8sSecret, SecretReference, Service},
            storage::v1::StorageClass,
        },
        chrono::Utc,
    },
    kube::{
        Api, Resource, ResourceExt,
        api::{DeleteParams, ListParams},
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, watcher},
    },
    kvp::Labels,
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    builders::{
        CORE_STATEFULSET, Database, ENDPOINT_DEPLOYMENT, EndpointAddresses, EndpointAuth,
        MGMT_HTTPS_PORT_NAME, PROMETHEUS_RULE, ROLE_DB, ROUTE, S3_HTTPS_PORT_NAME,
        SERVICE_MONITOR, SYSTEM_CONTROLLER_NAME, ServerSecrets, autoscaler_enabled,
        build_core_statefulset, build_db_service, build_db_statefulset, build_endpoint_autoscaler,
        build_endpoint_deployment, build_mgmt_service, build_prometheus_rule, build_route,
        build_s3_service, build_service_monitor, virtual_hosts,
    },
    configure::{
        ADMIN_EMAIL, AdminCredentials, DefaultStore, admin_keys, apply_owned_secret,
        apply_storage_class, ensure_default_bucket_class, ensure_default_store,
        ensure_operator_credentials,
    },
    error::{
        ApplyAutoscalerSnafu, ApplyDeploymentSnafu, ApplyMonitoringSnafu, ApplyRoleBindingSnafu,
        ApplySecretSnafu, ApplyServiceAccountSnafu, ApplyServiceSnafu, ApplyStatefulSetSnafu,
        ApplyStatusSnafu, BuildLabelSnafu, BuildRbacResourcesSnafu, BuildSecretSnafu,
        CreateClusterResourcesSnafu, DeleteAutoscalerSnafu, DeleteOrphansSnafu,
        DeleteStorageClassSnafu, DeleteVolumeClaimsSnafu, Error, GetCorePodSnafu,
        InvalidSystemSnafu, MissingJoinSecretSnafu, ObjectHasNoNamespaceSnafu, ReadSecretSnafu,
        RemoteSnafu, Result, RpcSnafu, UpdateMetaSnafu,
    },
    readme::{progressing_readme, ready_readme, rejected_readme},
    status::{endpoints_status, service_status},
    verify::{ImageCheck, JoinInfo, verify_endpoints, verify_image, verify_join_data, verify_name},
};
use crate::{
    api::{
        Phase,
        conditions::{ConditionType, find_condition},
        system::{AccountsStatus, NooBaa, NooBaaStatus, ServicesStatus, UserStatus},
    },
    events,
    manager::{
        APP_NAME, Ctx, OPERATOR_NAME, ShutdownTrigger, controller_config, predicates, primary_stream,
    },
    phase::{self, Phased, ReconcileOutcome, enter, settle},
    remote::{self, ADMIN_SECRET, OPERATOR_SECRET, OperatorCredentials, SERVER_SECRET},
    resources::{FINALIZER, apply, apply_optional, ensure_meta, is_deleting, release_finalizer},
    secret::Secret,
};

const CORE_POD: &str = "noobaa-core-0";

/// Set while reconciling a system that joins a remote management endpoint.
struct Join {
    name: String,
    info: JoinInfo,
}

pub async fn reconcile_system(
    nb: Arc<DeserializeGuard<NooBaa>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let nb = nb
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidSystemSnafu)?;
    let client = &ctx.client;

    if is_deleting(nb) {
        return delete_system(nb, &ctx).await;
    }
    if ensure_meta(client, nb, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?
    {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut status = nb.initial_status();
    let mut default_store = None;
    let result = run_phases(nb, &ctx, &mut status, &mut default_store).await;
    let settled = settle(
        &mut status,
        &NooBaa::kind(&()),
        nb.meta().generation,
        result,
        ctx.config.requeue_after(),
        Utc::now(),
    );

    status.readme = Some(match status.phase {
        Some(Phase::Ready) => ready_readme(
            nb,
            &status,
            default_store.as_ref().and_then(DefaultStore::note),
        ),
        Some(Phase::Rejected) => {
            let error = find_condition(&status.conditions, ConditionType::Error);
            rejected_readme(
                nb,
                error.and_then(|c| c.reason.as_deref()).unwrap_or_default(),
                error.and_then(|c| c.message.as_deref()).unwrap_or_default(),
            )
        }
        _ => progressing_readme(nb, &status),
    });
    if let Some((reason, message)) = &settled.rejection {
        events::publish_warning(client, nb, reason, message).await;
    }
    phase::write_status(client, nb, &status)
        .await
        .context(ApplyStatusSnafu)?;
    Ok(settled.action)
}

async fn run_phases(
    nb: &NooBaa,
    ctx: &Ctx,
    status: &mut NooBaaStatus,
    default_store: &mut Option<DefaultStore>,
) -> Result<ReconcileOutcome> {
    let client = &ctx.client;
    let config = &ctx.config;
    let namespace = nb.namespace().context(ObjectHasNoNamespaceSnafu)?;
    let image = nb.core_image(&config.core_image).to_owned();

    enter(status, Phase::Verifying);
    verify_name(nb, config)?;
    let image_check = verify_image(&image, config)?;
    verify_endpoints(&nb.endpoints())?;
    let join = match &nb.spec.join_secret {
        Some(reference) => Some(read_join(ctx, reference, &namespace).await?),
        None => None,
    };
    let image_changed = status.actual_image.as_deref() != Some(image.as_str());
    if image_check == ImageCheck::Unchecked && image_changed {
        events::publish_warning(
            client,
            nb,
            "CustomImage",
            &format!("image {image} is not checked against the supported versions"),
        )
        .await;
    }

    enter(status, Phase::Creating);
    let core_ready = create_resources(nb, ctx, &namespace, &image, join.as_ref(), status).await?;
    status.actual_image = Some(image);
    if !core_ready {
        tracing::info!("waiting for the core to become ready");
        return Ok(ReconcileOutcome::Requeue(config.requeue_after()));
    }

    enter(status, Phase::Connecting);
    let api = match &join {
        Some(join) => remote::build_client(
            ctx,
            join.info.router.clone(),
            Some(join.info.auth_token.clone()),
        ),
        None => {
            let mgmt = status.services.as_ref().map(|s| &s.service_mgmt);
            remote::build_client(ctx, remote::mgmt_router(config, &namespace, mgmt), None)
        }
    }
    .context(RemoteSnafu)?;
    api.read_auth().await.context(RpcSnafu {
        method: "read_auth",
    })?;

    enter(status, Phase::Configuring);
    if let Some(join) = &join {
        // the remote system owns accounts and defaults
        apply_owned_secret(
            client,
            nb,
            OPERATOR_SECRET,
            OperatorCredentials {
                email: ADMIN_EMAIL.to_owned(),
                password: String::new(),
                auth_token: Some(join.info.auth_token.clone()),
            },
        )
        .await?;
        apply_storage_class(client, config).await?;
        tracing::info!(join_secret = %join.name, "joined remote system");
        return Ok(ReconcileOutcome::Done);
    }
    configure_system(nb, ctx, &api, status, default_store).await?;
    Ok(ReconcileOutcome::Done)
}

async fn read_join(ctx: &Ctx, reference: &SecretReference, namespace: &str) -> Result<Join> {
    let (name, data) = match remote::read_join_data(ctx, reference, namespace).await {
        Ok(Some(found)) => found,
        Ok(None) => {
            return MissingJoinSecretSnafu {
                name: reference.name.clone().unwrap_or_default(),
            }
            .fail();
        }
        Err(remote::Error::JoinSecretHasNoName) => return Err(Error::JoinSecretHasNoName),
        Err(source) => return Err(Error::Remote { source }),
    };
    let info = verify_join_data(&name, &data)?;
    Ok(Join { name, info })
}

/// Applies every workload object of the system and records their addresses.
///
/// Returns whether the core answers yet; a joining system has no core.
async fn create_resources(
    nb: &NooBaa,
    ctx: &Ctx,
    namespace: &str,
    image: &str,
    join: Option<&Join>,
    status: &mut NooBaaStatus,
) -> Result<bool> {
    let client = &ctx.client;
    let config = &ctx.config;

    let server_secrets = Secret::<ServerSecrets>::fetch_opt(client, SERVER_SECRET, namespace)
        .await
        .context(ReadSecretSnafu { name: SERVER_SECRET })?
        .map(Secret::into_value)
        .unwrap_or_else(ServerSecrets::generate);
    let secret = Secret::new(SERVER_SECRET.to_owned(), namespace.to_owned(), server_secrets)
        .to_owned_secret(nb)
        .context(BuildSecretSnafu { name: SERVER_SECRET })?;
    apply(client, &secret)
        .await
        .context(ApplySecretSnafu { name: SERVER_SECRET })?;

    let mut cluster_resources = ClusterResources::new(
        APP_NAME,
        OPERATOR_NAME,
        SYSTEM_CONTROLLER_NAME,
        &nb.object_ref(&()),
        ClusterResourceApplyStrategy::Default,
    )
    .context(CreateClusterResourcesSnafu)?;

    let (rbac_sa, rbac_rolebinding) = build_rbac_resources(
        nb,
        APP_NAME,
        cluster_resources
            .get_required_labels()
            .context(BuildLabelSnafu)?,
    )
    .context(BuildRbacResourcesSnafu)?;
    cluster_resources
        .add(client, rbac_sa.clone())
        .await
        .context(ApplyServiceAccountSnafu)?;
    cluster_resources
        .add(client, rbac_rolebinding)
        .await
        .context(ApplyRoleBindingSnafu)?;

    let mut core_ready = true;
    let mut mgmt_service = None;
    if join.is_none() {
        let database = Database::for_system(nb);
        let core = cluster_resources
            .add(
                client,
                build_core_statefulset(nb, image, &database, &rbac_sa)?,
            )
            .await
            .context(ApplyStatefulSetSnafu {
                name: CORE_STATEFULSET,
            })?;
        core_ready = core
            .status
            .as_ref()
            .and_then(|s| s.ready_replicas)
            .unwrap_or(0)
            > 0;

        let service = build_mgmt_service(nb)?;
        let name = service.name_any();
        mgmt_service = Some(
            cluster_resources
                .add(client, service)
                .await
                .context(ApplyServiceSnafu { name })?,
        );

        if database == Database::Local {
            let db_image = nb.spec.db_image.as_deref().unwrap_or(&config.db_image);
            let db = build_db_statefulset(nb, db_image, &rbac_sa)?;
            let name = db.name_any();
            cluster_resources
                .add(client, db)
                .await
                .context(ApplyStatefulSetSnafu { name })?;
            let db_service = build_db_service(nb)?;
            let name = db_service.name_any();
            cluster_resources
                .add(client, db_service)
                .await
                .context(ApplyServiceSnafu { name })?;
        }
    }

    let s3_service = build_s3_service(nb)?;
    let name = s3_service.name_any();
    let s3_service = cluster_resources
        .add(client, s3_service)
        .await
        .context(ApplyServiceSnafu { name })?;

    let (addresses, auth) = match join {
        Some(join) => {
            let router = &join.info.router;
            (
                EndpointAddresses {
                    mgmt: router.mgmt_addr.clone(),
                    md: router.md_addr.clone(),
                    bg: router.bg_addr.clone(),
                    hosted_agents: router.hosted_agents_addr.clone(),
                },
                EndpointAuth::JoinSecret(join.name.clone()),
            )
        }
        None => (EndpointAddresses::local(namespace), EndpointAuth::ServerSecret),
    };
    let hosts = virtual_hosts(nb, namespace);
    let deployment = build_endpoint_deployment(nb, image, &addresses, &auth, &hosts, &rbac_sa)?;
    let deployment: Deployment = apply(client, &deployment)
        .await
        .context(ApplyDeploymentSnafu)?;

    if autoscaler_enabled(nb, config) {
        apply(client, &build_endpoint_autoscaler(nb)?)
            .await
            .context(ApplyAutoscalerSnafu)?;
    } else {
        delete_autoscaler(client, namespace).await?;
    }

    apply_monitoring(nb, client, mgmt_service.as_ref(), &s3_service).await?;

    cluster_resources
        .delete_orphaned_resources(client)
        .await
        .context(DeleteOrphansSnafu)?;

    let core_pod = match join {
        Some(_) => None,
        None => client
            .get_opt::<Pod>(CORE_POD, namespace)
            .await
            .context(GetCorePodSnafu)?,
    };
    status.services = Some(ServicesStatus {
        service_mgmt: mgmt_service
            .as_ref()
            .map(|service| service_status(service, MGMT_HTTPS_PORT_NAME, core_pod.as_ref()))
            .unwrap_or_default(),
        service_s3: service_status(&s3_service, S3_HTTPS_PORT_NAME, None),
    });
    status.endpoints = Some(endpoints_status(&deployment, hosts));
    Ok(core_ready)
}

async fn delete_autoscaler(client: &Client, namespace: &str) -> Result<()> {
    let api: Api<HorizontalPodAutoscaler> =
        Api::namespaced(client.as_kube_client(), namespace);
    match api.delete(ENDPOINT_DEPLOYMENT, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(stackable_operator::kube::Error::Api(err)) if err.code == 404 => Ok(()),
        Err(source) => Err(Error::DeleteAutoscaler { source }),
    }
}

/// Prometheus rules, service monitors and routes, each only where its CRD is served.
async fn apply_monitoring(
    nb: &NooBaa,
    client: &Client,
    mgmt_service: Option<&Service>,
    s3_service: &Service,
) -> Result<()> {
    let mut objects = vec![(PROMETHEUS_RULE, build_prometheus_rule(nb)?)];
    if let Some(mgmt) = mgmt_service {
        objects.push((SERVICE_MONITOR, build_service_monitor(nb, mgmt, "mgmt")?));
    }
    objects.push((SERVICE_MONITOR, build_service_monitor(nb, s3_service, "s3")?));
    if !nb.spec.disable_routes {
        if mgmt_service.is_some() {
            objects.push((ROUTE, build_route(nb, remote::MGMT_SERVICE, MGMT_HTTPS_PORT_NAME)?));
        }
        objects.push((ROUTE, build_route(nb, remote::S3_SERVICE, S3_HTTPS_PORT_NAME)?));
    }
    for (kind, obj) in objects {
        apply_optional(client, &kind.gvk(), kind.plural, &obj)
            .await
            .context(ApplyMonitoringSnafu { kind: kind.kind })?;
    }
    Ok(())
}

/// Logs the operator in, publishes the admin credentials and creates the
/// defaults bucket claims provision through.
async fn configure_system(
    nb: &NooBaa,
    ctx: &Ctx,
    api: &RpcClient,
    status: &mut NooBaaStatus,
    default_store: &mut Option<DefaultStore>,
) -> Result<()> {
    let client = &ctx.client;
    let config = &ctx.config;
    let system = nb.name_any();
    let namespace = nb.namespace().unwrap_or_default();

    let stored = remote::read_credentials(ctx).await.context(RemoteSnafu)?;
    let credentials = ensure_operator_credentials(api, &system, stored).await?;
    api.set_auth_token(credentials.auth_token.clone());
    apply_owned_secret(client, nb, OPERATOR_SECRET, credentials.clone()).await?;

    let keys = admin_keys(api, &credentials.email).await?;
    apply_owned_secret(
        client,
        nb,
        ADMIN_SECRET,
        AdminCredentials {
            system,
            email: credentials.email,
            password: credentials.password,
            keys: keys.into(),
        },
    )
    .await?;
    status.accounts = Some(AccountsStatus {
        admin: UserStatus {
            secret_ref: SecretReference {
                name: Some(ADMIN_SECRET.to_owned()),
                namespace: Some(namespace),
            },
        },
    });

    apply_storage_class(client, config).await?;
    let store = ensure_default_store(client, nb, config).await?;
    if store.is_available() {
        ensure_default_bucket_class(client, nb).await?;
    }
    if let Some(note) = store.note() {
        tracing::warn!(%note, "default backing store not created");
    }
    *default_store = Some(store);
    Ok(())
}

async fn delete_system(nb: &NooBaa, ctx: &Ctx) -> Result<Action> {
    let client = &ctx.client;
    let allowed = nb
        .spec
        .cleanup_policy
        .as_ref()
        .is_none_or(|policy| policy.allow_noobaa_deletion);
    if !allowed {
        tracing::warn!("cleanup policy forbids deleting the system");
        events::publish_warning(
            client,
            nb,
            "DeletionNotAllowed",
            "cleanupPolicy.allowNoobaaDeletion is false, the system is kept",
        )
        .await;
        return Ok(Action::await_change());
    }

    tracing::info!("deleting system");
    let mut status = nb.initial_status();
    enter(&mut status, Phase::Deleting);
    phase::write_status(client, nb, &status)
        .await
        .context(ApplyStatusSnafu)?;

    let storage_class = ctx.config.storage_class_name();
    let api: Api<StorageClass> = Api::all(client.as_kube_client());
    match api.delete(&storage_class, &DeleteParams::default()).await {
        Ok(_) => {}
        Err(stackable_operator::kube::Error::Api(err)) if err.code == 404 => {}
        Err(source) => {
            return Err(Error::DeleteStorageClass {
                source,
                name: storage_class,
            });
        }
    }

    if !nb.uses_external_db() {
        let namespace = nb.namespace().context(ObjectHasNoNamespaceSnafu)?;
        let labels: BTreeMap<String, String> = Labels::role_selector(nb, APP_NAME, ROLE_DB)
            .context(BuildLabelSnafu)?
            .into();
        let selector = labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(",");
        let claims: Api<PersistentVolumeClaim> =
            Api::namespaced(client.as_kube_client(), &namespace);
        claims
            .delete_collection(
                &DeleteParams::default(),
                &ListParams::default().labels(&selector),
            )
            .await
            .context(DeleteVolumeClaimsSnafu)?;
    }

    events::publish_normal(client, nb, "SystemDeleted", "system resources released").await;
    release_finalizer(client, nb, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(_obj: Arc<DeserializeGuard<NooBaa>>, error: &Error, ctx: Arc<Ctx>) -> Action {
    match error {
        Error::InvalidSystem { .. } => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_after()),
    }
}

pub async fn create_system_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    let client = ctx.client.clone();
    let (reader, stream) = primary_stream(
        namespace.get_api::<DeserializeGuard<NooBaa>>(&client),
        predicates::primary::<DeserializeGuard<NooBaa>>,
    );

    Controller::for_stream(stream, reader)
        .owns(
            namespace.get_api::<StatefulSet>(&client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<Deployment>(&client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<Service>(&client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<K8sSecret>(&client),
            watcher::Config::default(),
        )
        .with_config(controller_config())
        .graceful_shutdown_on(shutdown)
        .run(reconcile_system, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                &client,
                &format!("{SYSTEM_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
