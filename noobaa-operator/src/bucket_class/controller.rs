use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use serde_json::json;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
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
    error::{
        ApplyStatusSnafu, Error, GetStoreSnafu, InvalidBucketClassSnafu,
        ListObjectBucketsSnafu, MissingStoreSnafu, ObjectHasNoNamespaceSnafu, RejectedStoreSnafu,
        RemoteSnafu, Result, RevertSpecSnafu, RevertedSnafu, StoreNotReadySnafu,
        UpdateMetaSnafu, UpdateObjectBucketSnafu,
    },
    policy::verify_spec,
    update::{BucketUpdate, is_stale, update_bound_bucket},
};
use crate::{
    api::{
        Phase,
        bucket_class::{BucketClass, BucketClassStatus},
        obc::{ObjectBucket, STATE_BUCKET_CLASS_GENERATION},
        store::{BackingStore, NamespaceStore, Store, StoreKind},
    },
    manager::{
        Ctx, OPERATOR_NAME, ShutdownTrigger, controller_config, predicates, primary_stream,
    },
    phase::{self, Phased, ReconcileOutcome, combine_errors, enter},
    remote,
    resources::{FINALIZER, ensure_meta, is_deleting, release_finalizer},
};

pub const BUCKET_CLASS_CONTROLLER_NAME: &str = "bucketclass";

pub async fn reconcile_bucket_class(
    bc: Arc<DeserializeGuard<BucketClass>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let bc = bc
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidBucketClassSnafu)?;
    let client = &ctx.client;

    if is_deleting(bc) {
        return delete_bucket_class(bc, &ctx).await;
    }
    if ensure_meta(client, bc, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?
    {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut status = bc.initial_status();
    let result = run_phases(bc, &ctx, &mut status).await;
    let (action, _) = phase::finish(client, bc, status, result, ctx.config.requeue_after())
        .await
        .context(ApplyStatusSnafu)?;
    Ok(action)
}

async fn run_phases(
    bc: &BucketClass,
    ctx: &Ctx,
    status: &mut BucketClassStatus,
) -> Result<ReconcileOutcome> {
    let namespace = bc.namespace().context(ObjectHasNoNamespaceSnafu)?;

    enter(status, Phase::Verifying);
    verify_spec(&bc.spec)?;
    verify_stores(bc, ctx, &namespace).await?;

    enter(status, Phase::Configuring);
    let buckets = ctx
        .client
        .list::<ObjectBucket>(&(), &ListParams::default())
        .await
        .context(ListObjectBucketsSnafu)?;
    let stale: Vec<&ObjectBucket> = buckets
        .iter()
        .filter(|ob| is_bound(bc, ob) && is_stale(bc, ob))
        .collect();
    if stale.is_empty() {
        return Ok(ReconcileOutcome::Done);
    }

    tracing::info!(count = stale.len(), "updating buckets bound to an older generation");
    let api = remote::system_api(ctx).await.context(RemoteSnafu)?;
    for ob in stale {
        match update_bound_bucket(&api, bc, ob).await? {
            BucketUpdate::Updated | BucketUpdate::Missing => {
                record_generation(ctx, bc, ob).await?;
            }
            BucketUpdate::Revert { policy, message } => {
                let patch = json!({ "spec": { "placementPolicy": policy } });
                ctx.client
                    .merge_patch(bc, patch)
                    .await
                    .context(RevertSpecSnafu)?;
                return RevertedSnafu {
                    bucket: ob.bucket_name(),
                    message,
                }
                .fail();
            }
        }
    }
    Ok(ReconcileOutcome::Done)
}

/// Checks every referenced store; a missing or rejected store outweighs one
/// that is merely not ready yet.
async fn verify_stores(bc: &BucketClass, ctx: &Ctx, namespace: &str) -> Result<()> {
    let mut errors = vec![];
    for name in bc.backing_stores() {
        let store = ctx
            .client
            .get_opt::<BackingStore>(name, namespace)
            .await
            .context(GetStoreSnafu {
                kind: BackingStore::KIND,
                name,
            })?;
        errors.extend(store_readiness(name, store.as_ref()).err());
    }
    for name in bc.namespace_stores() {
        let store = ctx
            .client
            .get_opt::<NamespaceStore>(name, namespace)
            .await
            .context(GetStoreSnafu {
                kind: NamespaceStore::KIND,
                name,
            })?;
        errors.extend(store_readiness(name, store.as_ref()).err());
    }
    match combine_errors(errors) {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

pub fn store_readiness<S: Store>(name: &str, store: Option<&S>) -> Result<()> {
    let store = store.context(MissingStoreSnafu {
        kind: S::KIND,
        name,
    })?;
    match store.phase() {
        Some(Phase::Ready) => Ok(()),
        Some(Phase::Rejected) => RejectedStoreSnafu {
            kind: S::KIND,
            name,
        }
        .fail(),
        _ => StoreNotReadySnafu {
            kind: S::KIND,
            name,
        }
        .fail(),
    }
}

/// Whether `ob` was provisioned from `bc`, claimed in the class namespace.
pub fn is_bound(bc: &BucketClass, ob: &ObjectBucket) -> bool {
    let claim_namespace = ob
        .spec
        .claim_ref
        .as_ref()
        .and_then(|claim| claim.namespace.as_deref());
    ob.bucket_class() == bc.metadata.name.as_deref()
        && claim_namespace == bc.metadata.namespace.as_deref()
}

async fn record_generation(ctx: &Ctx, bc: &BucketClass, ob: &ObjectBucket) -> Result<()> {
    let generation = bc.metadata.generation.unwrap_or_default().to_string();
    let patch = json!({
        "spec": { "additionalState": { STATE_BUCKET_CLASS_GENERATION: generation } }
    });
    ctx.client
        .merge_patch(ob, patch)
        .await
        .context(UpdateObjectBucketSnafu {
            name: ob.name_any(),
        })?;
    Ok(())
}

async fn delete_bucket_class(bc: &BucketClass, ctx: &Ctx) -> Result<Action> {
    let client = &ctx.client;
    let mut status = bc.initial_status();
    enter(&mut status, Phase::Deleting);
    phase::write_status(client, bc, &status)
        .await
        .context(ApplyStatusSnafu)?;
    release_finalizer(client, bc, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    _obj: Arc<DeserializeGuard<BucketClass>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    match error {
        Error::InvalidBucketClass { .. } => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_after()),
    }
}

/// Classes in the store's namespace that reference it.
pub fn classes_using_store<S: Store>(
    classes: &[Arc<DeserializeGuard<BucketClass>>],
    store: &DeserializeGuard<S>,
) -> Vec<ObjectRef<DeserializeGuard<BucketClass>>> {
    let name = store.name_any();
    classes
        .iter()
        .filter(|guard| {
            guard.0.as_ref().is_ok_and(|bc| {
                bc.metadata.namespace == store.meta().namespace
                    && match S::KIND {
                        StoreKind::Backing => bc.backing_stores(),
                        StoreKind::Namespace => bc.namespace_stores(),
                    }
                    .contains(&name.as_str())
            })
        })
        .map(|guard| ObjectRef::from_obj(&**guard))
        .collect()
}

pub async fn create_bucket_class_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    let client = ctx.client.clone();
    let (reader, stream) = primary_stream(
        namespace.get_api::<DeserializeGuard<BucketClass>>(&client),
        predicates::primary::<DeserializeGuard<BucketClass>>,
    );
    let backing_index = reader.clone();
    let namespace_index = reader.clone();

    Controller::for_stream(stream, reader)
        .watches(
            namespace.get_api::<DeserializeGuard<BackingStore>>(&client),
            watcher::Config::default(),
            move |store| classes_using_store(&backing_index.state(), &store),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<NamespaceStore>>(&client),
            watcher::Config::default(),
            move |store| classes_using_store(&namespace_index.state(), &store),
        )
        .with_config(controller_config())
        .graceful_shutdown_on(shutdown)
        .run(reconcile_bucket_class, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                &client,
                &format!("{BUCKET_CLASS_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
