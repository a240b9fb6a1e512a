use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    client::GetApi,
    cluster_resources::{ClusterResourceApplyStrategy, ClusterResources},
    k8s_openapi::{
        api::{apps::v1::StatefulSet, core::v1::Secret as K8sSecret},
        apimachinery::pkg::apis::meta::v1::Time,
        chrono::{DateTime, Utc},
    },
    kube::{
        Resource, ResourceExt,
        api::ListParams,
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    builders::build_pv_pool_statefulset,
    error::{
        ApplyStatefulSetSnafu, ApplyStatusSnafu, CheckNameConflictSnafu,
        CreateClusterResourcesSnafu, DeleteOrphansSnafu, Error, GetSecretSnafu, GetSystemSnafu,
        InvalidStoreSnafu, ListBucketClassesSnafu, MissingSecretSnafu, NameInUseSnafu,
        ObjectHasNoNamespaceSnafu, ReadSecretSnafu, RemoteSnafu, Result, SecretRefHasNoNameSnafu,
        UpdateMetaSnafu,
    },
    pool::{self, CAPACITY_ANNOTATION, MODE_INITIALIZING},
    verify::{Credentials, credentials, verify_spec},
};
use crate::{
    api::{
        Phase,
        bucket_class::BucketClass,
        conditions::{ConditionType, find_condition, set_exclusive_condition},
        store::{
            BackingStore, NamespaceStore, Store, StoreKind, StoreMode, StoreStatus, StoreTarget,
        },
        system::NooBaa,
    },
    events,
    manager::{
        APP_NAME, Ctx, OPERATOR_NAME, ShutdownTrigger, controller_config, predicates, primary_stream,
    },
    phase::{self, Phased, ReconcileOutcome, enter},
    remote,
    resources::{FINALIZER, ensure_meta, is_deleting, release_finalizer},
    secret,
};

pub const BACKING_STORE_CONTROLLER_NAME: &str = "backingstore";
pub const NAMESPACE_STORE_CONTROLLER_NAME: &str = "namespacestore";

/// Condition reason while deletion waits for bucket classes to let go.
pub const IN_USE_REASON: &str = "InUse";

const INITIALIZING_REQUEUE: Duration = Duration::from_secs(10);

pub fn controller_name(kind: StoreKind) -> &'static str {
    match kind {
        StoreKind::Backing => BACKING_STORE_CONTROLLER_NAME,
        StoreKind::Namespace => NAMESPACE_STORE_CONTROLLER_NAME,
    }
}

pub async fn reconcile_backing_store(
    bs: Arc<DeserializeGuard<BackingStore>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    reconcile_store(bs, ctx).await
}

pub async fn reconcile_namespace_store(
    nss: Arc<DeserializeGuard<NamespaceStore>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    reconcile_store(nss, ctx).await
}

async fn reconcile_store<S>(obj: Arc<DeserializeGuard<S>>, ctx: Arc<Ctx>) -> Result<Action>
where
    S: Store + Phased<Status = StoreStatus>,
{
    tracing::info!("Starting reconcile");
    let store: &S = obj
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidStoreSnafu)?;
    let client = &ctx.client;

    if is_deleting(store) {
        return delete_store(store, &ctx).await;
    }
    if ensure_meta(client, store, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?
    {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut status = store.initial_status();
    let result = run_phases(store, &ctx, &mut status).await;
    let (action, _) = phase::finish(client, store, status, result, ctx.config.requeue_after())
        .await
        .context(ApplyStatusSnafu)?;
    Ok(action)
}

async fn run_phases<S: Store>(
    store: &S,
    ctx: &Ctx,
    status: &mut StoreStatus,
) -> Result<ReconcileOutcome> {
    let namespace = store.namespace().context(ObjectHasNoNamespaceSnafu)?;

    enter(status, Phase::Verifying);
    verify_spec(store)?;
    check_name_conflict(store, ctx, &namespace).await?;
    let credentials = read_credentials(store, ctx, &namespace).await?;

    if let Some(StoreTarget::PvPool(pv_pool)) = store.target() {
        enter(status, Phase::Creating);
        let system = ctx
            .client
            .get_opt::<NooBaa>(&ctx.config.system_name, &ctx.config.namespace)
            .await
            .context(GetSystemSnafu)?;
        let image = system
            .as_ref()
            .map(|system| system.core_image(&ctx.config.core_image))
            .unwrap_or(ctx.config.core_image.as_str());
        let router = remote::mgmt_router(&ctx.config, &ctx.config.namespace, None);

        let mut cluster_resources = ClusterResources::new(
            APP_NAME,
            OPERATOR_NAME,
            controller_name(S::KIND),
            &store.object_ref(&()),
            ClusterResourceApplyStrategy::Default,
        )
        .context(CreateClusterResourcesSnafu)?;
        let statefulset = build_pv_pool_statefulset(
            store,
            pv_pool,
            controller_name(S::KIND),
            image,
            &router.mgmt_addr,
        )?;
        cluster_resources
            .add(&ctx.client, statefulset)
            .await
            .context(ApplyStatefulSetSnafu)?;
        cluster_resources
            .delete_orphaned_resources(&ctx.client)
            .await
            .context(DeleteOrphansSnafu)?;
    }

    enter(status, Phase::Configuring);
    let api = remote::system_api(ctx).await.context(RemoteSnafu)?;
    let mode = pool::configure(
        &api,
        store,
        &namespace,
        credentials.as_ref(),
        capacity(store),
    )
    .await?;
    record_mode(status, &mode, Utc::now());
    pool::check_mode(&mode)?;

    if mode == MODE_INITIALIZING {
        return Ok(ReconcileOutcome::Requeue(INITIALIZING_REQUEUE));
    }
    Ok(ReconcileOutcome::Done)
}

/// Store names are unique across both store kinds.
async fn check_name_conflict<S: Store>(store: &S, ctx: &Ctx, namespace: &str) -> Result<()> {
    let name = store.name_any();
    let (exists, other) = match S::KIND {
        StoreKind::Backing => (
            ctx.client
                .get_opt::<NamespaceStore>(&name, namespace)
                .await
                .context(CheckNameConflictSnafu)?
                .is_some(),
            StoreKind::Namespace,
        ),
        StoreKind::Namespace => (
            ctx.client
                .get_opt::<BackingStore>(&name, namespace)
                .await
                .context(CheckNameConflictSnafu)?
                .is_some(),
            StoreKind::Backing,
        ),
    };
    if exists {
        return NameInUseSnafu { name, other }.fail();
    }
    Ok(())
}

async fn read_credentials<S: Store>(
    store: &S,
    ctx: &Ctx,
    namespace: &str,
) -> Result<Option<Credentials>> {
    let Some(StoreTarget::Cloud { secret, .. }) = store.target() else {
        return Ok(None);
    };
    let name = secret.name.as_deref().context(SecretRefHasNoNameSnafu)?;
    let secret_namespace = secret.namespace.as_deref().unwrap_or(namespace);
    let k8s_secret = ctx
        .client
        .get_opt::<K8sSecret>(name, secret_namespace)
        .await
        .context(GetSecretSnafu { name })?
        .context(MissingSecretSnafu { name })?;
    let data = secret::string_map(name, k8s_secret.data, k8s_secret.string_data)
        .context(ReadSecretSnafu)?;
    credentials(store.store_type(), name, &data).map(Some)
}

fn capacity<S: Store>(store: &S) -> Option<u64> {
    store
        .annotations()
        .get(CAPACITY_ANNOTATION)
        .and_then(|value| value.trim().parse().ok())
}

/// Copies the remote mode into the status, keeping the timestamp of an unchanged code.
pub fn record_mode(status: &mut StoreStatus, mode: &str, now: DateTime<Utc>) {
    if status
        .mode
        .as_ref()
        .is_some_and(|current| current.mode_code == mode)
    {
        return;
    }
    status.mode = Some(StoreMode {
        mode_code: mode.to_owned(),
        time_stamp: Some(Time(now)),
    });
}

/// Marks the status as deleting and blocked by `classes`.
///
/// Returns true when the blocking condition is new and worth an event.
pub fn mark_in_use(
    status: &mut StoreStatus,
    kind: StoreKind,
    classes: &[String],
    now: DateTime<Utc>,
) -> bool {
    let message = format!("{kind} is in use by bucket classes {}", classes.join(", "));
    let fresh = find_condition(&status.conditions, ConditionType::Degraded)
        .is_none_or(|c| c.message.as_deref() != Some(message.as_str()));
    enter(status, Phase::Deleting);
    set_exclusive_condition(
        &mut status.conditions,
        ConditionType::Degraded,
        IN_USE_REASON,
        &message,
        now,
    );
    fresh
}

async fn delete_store<S>(store: &S, ctx: &Ctx) -> Result<Action>
where
    S: Store + Phased<Status = StoreStatus>,
{
    let client = &ctx.client;
    let namespace = store.namespace().context(ObjectHasNoNamespaceSnafu)?;
    tracing::info!(name = %store.name_any(), kind = %S::KIND, "deleting store");

    let classes = client
        .list::<BucketClass>(&namespace, &ListParams::default())
        .await
        .context(ListBucketClassesSnafu)?;
    let users = pool::referencing_classes(store, &classes);
    if !users.is_empty() {
        let mut status = store.initial_status();
        if mark_in_use(&mut status, S::KIND, &users, Utc::now()) {
            let message = format!("deletion blocked by bucket classes {}", users.join(", "));
            events::publish_warning(client, store, IN_USE_REASON, &message).await;
        }
        phase::write_status(client, store, &status)
            .await
            .context(ApplyStatusSnafu)?;
        // the bucket class watch enqueues this store once a class lets go
        return Ok(Action::await_change());
    }

    match remote::system_api(ctx).await {
        Ok(api) => pool::delete(&api, store).await?,
        Err(remote::Error::SystemNotFound { .. }) => {
            tracing::info!("system is gone, skipping remote cleanup");
        }
        Err(source) => return Err(Error::Remote { source }),
    }
    release_finalizer(client, store, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy<S: Store>(
    _obj: Arc<DeserializeGuard<S>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    match error {
        Error::InvalidStore { .. } => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_after()),
    }
}

/// Deleting stores in `namespace`, requeued when a bucket class there changes.
pub fn deleting_stores<S: Store>(
    stores: &[Arc<DeserializeGuard<S>>],
    namespace: Option<&str>,
) -> Vec<ObjectRef<DeserializeGuard<S>>> {
    stores
        .iter()
        .filter(|guard| {
            guard.0.as_ref().is_ok_and(|store| {
                is_deleting(store) && store.meta().namespace.as_deref() == namespace
            })
        })
        .map(|guard| ObjectRef::from_obj(&**guard))
        .collect()
}

/// Stores whose credentials live in `secret`.
pub fn stores_using_secret<S: Store>(
    stores: &[Arc<DeserializeGuard<S>>],
    secret: &K8sSecret,
) -> Vec<ObjectRef<DeserializeGuard<S>>> {
    stores
        .iter()
        .filter(|guard| {
            let Ok(store) = &guard.0 else {
                return false;
            };
            store.secret_ref().is_some_and(|secret_ref| {
                secret_ref.name.as_deref() == secret.metadata.name.as_deref()
                    && secret_ref
                        .namespace
                        .as_deref()
                        .or(store.meta().namespace.as_deref())
                        == secret.metadata.namespace.as_deref()
            })
        })
        .map(|guard| ObjectRef::from_obj(&**guard))
        .collect()
}

pub async fn create_backing_store_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    create_store_controller::<BackingStore>(ctx, namespace, shutdown).await
}

pub async fn create_namespace_store_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    create_store_controller::<NamespaceStore>(ctx, namespace, shutdown).await
}

async fn create_store_controller<S>(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
)
where
    S: Store + Phased<Status = StoreStatus>,
    DeserializeGuard<S>: GetApi<Namespace = str>,
{
    let client = ctx.client.clone();
    let name = controller_name(S::KIND);
    let (reader, stream) = primary_stream(
        namespace.get_api::<DeserializeGuard<S>>(&client),
        predicates::store::<S>,
    );
    let class_index = reader.clone();
    let secret_index = reader.clone();

    Controller::for_stream(stream, reader)
        .owns(
            namespace.get_api::<StatefulSet>(&client),
            watcher::Config::default(),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<BucketClass>>(&client),
            watcher::Config::default(),
            move |class| deleting_stores(&class_index.state(), class.meta().namespace.as_deref()),
        )
        .watches(
            namespace.get_api::<K8sSecret>(&client),
            watcher::Config::default(),
            move |secret| stores_using_secret(&secret_index.state(), &secret),
        )
        .with_config(controller_config())
        .graceful_shutdown_on(shutdown)
        .run(reconcile_store::<S>, error_policy::<S>, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(&client, &format!("{name}.{OPERATOR_NAME}"), &res);
        })
        .collect::<()>()
        .await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use stackable_operator::k8s_openapi::chrono::TimeZone;

    use super::*;
    use crate::{api::conditions::is_condition_true, store::fixtures};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_record_mode_keeps_timestamp() {
        let mut status = StoreStatus::default();
        record_mode(&mut status, "INITIALIZING", at(10));
        record_mode(&mut status, "INITIALIZING", at(20));
        assert_eq!(status.mode.as_ref().unwrap().time_stamp, Some(Time(at(10))));

        record_mode(&mut status, "OPTIMAL", at(30));
        let mode = status.mode.unwrap();
        assert_eq!(mode.mode_code, "OPTIMAL");
        assert_eq!(mode.time_stamp, Some(Time(at(30))));
    }

    #[test]
    fn test_mark_in_use() {
        let mut status = StoreStatus {
            phase: Some(Phase::Ready),
            ..StoreStatus::default()
        };
        let classes = vec!["placement".to_string()];
        assert!(mark_in_use(&mut status, StoreKind::Backing, &classes, at(1)));
        assert_eq!(status.phase, Some(Phase::Deleting));
        assert!(is_condition_true(&status.conditions, ConditionType::Degraded));
        let degraded = find_condition(&status.conditions, ConditionType::Degraded).unwrap();
        assert_eq!(degraded.reason.as_deref(), Some(IN_USE_REASON));
        assert!(degraded.message.as_deref().unwrap().contains("placement"));

        // same blockers again, no new event
        assert!(!mark_in_use(&mut status, StoreKind::Backing, &classes, at(2)));
    }

    #[test]
    fn test_capacity_annotation() {
        let mut bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        assert_eq!(capacity(&bs), None);
        bs.metadata.annotations = Some(BTreeMap::from([(
            CAPACITY_ANNOTATION.to_string(),
            "1099511627776".to_string(),
        )]));
        assert_eq!(capacity(&bs), Some(1 << 40));
    }

    #[test]
    fn test_deleting_stores() {
        let live: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        let mut deleting: BackingStore =
            serde_yaml::from_str(fixtures::PV_POOL_BACKING_STORE).unwrap();
        deleting.metadata.deletion_timestamp = Some(Time(at(5)));
        let guards = vec![
            Arc::new(DeserializeGuard(Ok(live))),
            Arc::new(DeserializeGuard(Ok(deleting))),
        ];
        let found = deleting_stores(&guards, Some("noobaa"));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "bs2");
        assert!(deleting_stores(&guards, Some("other")).is_empty());
    }

    #[test]
    fn test_stores_using_secret() {
        let bs: BackingStore = serde_yaml::from_str(fixtures::AWS_BACKING_STORE).unwrap();
        let pv: BackingStore = serde_yaml::from_str(fixtures::PV_POOL_BACKING_STORE).unwrap();
        let guards = vec![
            Arc::new(DeserializeGuard(Ok(bs))),
            Arc::new(DeserializeGuard(Ok(pv))),
        ];
        let mut secret = K8sSecret::default();
        secret.metadata.name = Some("aws-creds".into());
        secret.metadata.namespace = Some("noobaa".into());
        let found = stores_using_secret(&guards, &secret);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "first-bs");

        secret.metadata.namespace = Some("elsewhere".into());
        assert!(stores_using_secret(&guards, &secret).is_empty());
    }
}
