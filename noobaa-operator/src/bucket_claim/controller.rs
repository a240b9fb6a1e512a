use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use serde_json::json;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    k8s_openapi::{
        api::{
            core::v1::{ConfigMap, Secret as K8sSecret},
            storage::v1::StorageClass,
        },
        chrono::Utc,
    },
    kube::{
        Api, ResourceExt,
        api::DeleteParams,
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    builders::{
        BoundBucket, build_config_map, build_object_bucket, build_secret,
        object_bucket_name, s3_endpoint,
    },
    error::{
        ApplyClaimResourceSnafu, ApplyObjectBucketSnafu, ApplyStatusSnafu, BindClaimSnafu,
        BucketClassNotReadySnafu, Error, GetBucketClassSnafu,
        GetObjectBucketSnafu, GetStorageClassSnafu, GetSystemSnafu, InvalidClaimSnafu,
        MissingBucketClassSnafu, ObjectHasNoNamespaceSnafu, RemoteSnafu, Result,
        UpdateMetaSnafu,
    },
    provision::{
        BucketRequest, bucket_name, check_path, claim_replication, default_resource,
        deprovision, deprovision_unbound, ensure_account, ensure_bucket,
    },
};
use crate::{
    api::{
        Phase,
        bucket_class::{BucketClass, DEFAULT_BUCKET_CLASS},
        obc::{
            CONFIG_BUCKET_CLASS, CONFIG_PATH, CONFIG_REPLICATION_POLICY, ObjectBucket,
            ObjectBucketClaim, ObjectBucketClaimStatus, ReclaimPolicy,
        },
        system::NooBaa,
    },
    config::OperatorConfig,
    manager::{
        Ctx, OPERATOR_NAME, ShutdownTrigger, controller_config, predicates, primary_stream,
    },
    phase::{self, Phased, ReconcileOutcome, enter},
    remote,
    resources::{OBC_FINALIZER, apply, ensure_meta, is_deleting, release_finalizer},
};

pub const BUCKET_CLAIM_CONTROLLER_NAME: &str = "bucketclaim";

pub async fn reconcile_bucket_claim(
    obc: Arc<DeserializeGuard<ObjectBucketClaim>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let claim = obc
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidClaimSnafu)?;
    let client = &ctx.client;

    let storage_class_name = &claim.spec.storage_class_name;
    let storage_class = client
        .get_opt::<StorageClass>(storage_class_name, &())
        .await
        .context(GetStorageClassSnafu {
            name: storage_class_name,
        })?;
    if !provisioned_here(claim, storage_class.as_ref(), &ctx.config) {
        tracing::debug!(storage_class = %storage_class_name, "claim belongs to another provisioner");
        return Ok(Action::await_change());
    }

    if is_deleting(claim) {
        return delete_bucket_claim(claim, &ctx, storage_class.as_ref()).await;
    }
    if ensure_meta(client, claim, OBC_FINALIZER)
        .await
        .context(UpdateMetaSnafu)?
    {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut status = claim.initial_status();
    let result = run_phases(claim, &ctx, storage_class.as_ref(), &mut status).await;
    let (action, _) = phase::finish(client, claim, status, result, ctx.config.requeue_after())
        .await
        .context(ApplyStatusSnafu)?;
    Ok(action)
}

async fn run_phases(
    claim: &ObjectBucketClaim,
    ctx: &Ctx,
    storage_class: Option<&StorageClass>,
    status: &mut ObjectBucketClaimStatus,
) -> Result<ReconcileOutcome> {
    let client = &ctx.client;
    let claim_namespace = claim.namespace().context(ObjectHasNoNamespaceSnafu)?;

    enter(status, Phase::Verifying);
    let bucket = bucket_name(claim)?;
    let class = bucket_class(ctx, claim).await?;
    let path = claim.config(CONFIG_PATH);
    check_path(&class, path)?;
    let replication = claim_replication(&class, claim.config(CONFIG_REPLICATION_POLICY))?;

    let ob_name = object_bucket_name(claim);
    if let Some(ob) = client
        .get_opt::<ObjectBucket>(&ob_name, &())
        .await
        .context(GetObjectBucketSnafu { name: &ob_name })?
    {
        tracing::debug!(object_bucket = %ob.name_any(), "claim already bound");
        bind_claim(ctx, claim, &ob_name).await?;
        return Ok(ReconcileOutcome::Done);
    }

    enter(status, Phase::Creating);
    let api = remote::system_api(ctx).await.context(RemoteSnafu)?;
    ensure_bucket(
        &api,
        BucketRequest {
            bucket: &bucket,
            claim_namespace: &claim_namespace,
            class: &class,
            path,
            replication,
        },
        Utc::now(),
    )
    .await?;
    let (email, keys) = ensure_account(&api, &bucket, default_resource(&class)).await?;

    let system = client
        .get_opt::<NooBaa>(&ctx.config.system_name, &ctx.config.namespace)
        .await
        .context(GetSystemSnafu)?;
    let endpoint = s3_endpoint(&ctx.config, system.as_ref());

    let config_map = build_config_map(claim, &endpoint, &bucket, BUCKET_CLAIM_CONTROLLER_NAME)?;
    apply(client, &config_map)
        .await
        .context(ApplyClaimResourceSnafu {
            kind: "ConfigMap",
            name: claim.name_any(),
        })?;
    let secret = build_secret(claim, keys.into())?;
    apply(client, &secret)
        .await
        .context(ApplyClaimResourceSnafu {
            kind: "Secret",
            name: claim.name_any(),
        })?;

    // the object bucket goes last, its presence marks the claim as provisioned
    let ob = build_object_bucket(
        claim,
        &endpoint,
        &BoundBucket {
            bucket: &bucket,
            class_name: &class.name_any(),
            class_generation: class.metadata.generation,
            account_email: &email,
            path,
            reclaim_policy: reclaim_policy(storage_class),
        },
    );
    let applied = apply(client, &ob)
        .await
        .context(ApplyObjectBucketSnafu { name: &ob_name })?;
    if let Some(ob_status) = &ob.status {
        client
            .apply_patch_status(OPERATOR_NAME, &applied, ob_status)
            .await
            .context(ApplyObjectBucketSnafu { name: &ob_name })?;
    }
    bind_claim(ctx, claim, &ob_name).await?;
    tracing::info!(%bucket, object_bucket = %ob_name, "claim bound");
    Ok(ReconcileOutcome::Done)
}

/// The class named by the claim, from the system namespace.
async fn bucket_class(ctx: &Ctx, claim: &ObjectBucketClaim) -> Result<BucketClass> {
    let name = claim
        .config(CONFIG_BUCKET_CLASS)
        .unwrap_or(DEFAULT_BUCKET_CLASS);
    let class = ctx
        .client
        .get_opt::<BucketClass>(name, &ctx.config.namespace)
        .await
        .context(GetBucketClassSnafu { name })?
        .context(MissingBucketClassSnafu { name })?;
    if !class.is_ready() {
        return BucketClassNotReadySnafu { name }.fail();
    }
    Ok(class)
}

async fn bind_claim(ctx: &Ctx, claim: &ObjectBucketClaim, ob_name: &str) -> Result<()> {
    if claim.spec.object_bucket_name.as_deref() == Some(ob_name) {
        return Ok(());
    }
    ctx.client
        .merge_patch(claim, json!({ "spec": { "objectBucketName": ob_name } }))
        .await
        .context(BindClaimSnafu)?;
    Ok(())
}

/// Claims carrying our finalizer stay ours even after their storage class is gone.
pub fn provisioned_here(
    claim: &ObjectBucketClaim,
    storage_class: Option<&StorageClass>,
    config: &OperatorConfig,
) -> bool {
    claim.finalizers().iter().any(|f| f == OBC_FINALIZER)
        || storage_class.is_some_and(|sc| sc.provisioner == config.provisioner_name())
}

pub fn reclaim_policy(storage_class: Option<&StorageClass>) -> ReclaimPolicy {
    match storage_class.and_then(|sc| sc.reclaim_policy.as_deref()) {
        Some("Retain") => ReclaimPolicy::Retain,
        _ => ReclaimPolicy::Delete,
    }
}

async fn delete_bucket_claim(
    claim: &ObjectBucketClaim,
    ctx: &Ctx,
    storage_class: Option<&StorageClass>,
) -> Result<Action> {
    let client = &ctx.client;
    let ob_name = object_bucket_name(claim);
    tracing::info!(object_bucket = %ob_name, "releasing claim");

    let mut status = claim.initial_status();
    enter(&mut status, Phase::Deleting);
    phase::write_status(client, claim, &status)
        .await
        .context(ApplyStatusSnafu)?;

    let ob = client
        .get_opt::<ObjectBucket>(&ob_name, &())
        .await
        .context(GetObjectBucketSnafu { name: &ob_name })?;
    match remote::system_api(ctx).await {
        Ok(api) => match &ob {
            Some(ob) => deprovision(&api, ob).await?,
            // provisioning may have stopped between the remote calls and the object bucket
            None => deprovision_unbound(&api, claim, reclaim_policy(storage_class)).await?,
        },
        Err(remote::Error::SystemNotFound { .. }) => {
            tracing::info!("system is gone, skipping remote cleanup");
        }
        Err(source) => return Err(Error::Remote { source }),
    }
    if ob.is_some() {
        let api: Api<ObjectBucket> = Api::all(client.as_kube_client());
        match api.delete(&ob_name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(stackable_operator::kube::Error::Api(err)) if err.code == 404 => {}
            Err(source) => return Err(Error::DeleteObjectBucket { source, name: ob_name }),
        }
    }

    release_finalizer(client, claim, OBC_FINALIZER)
        .await
        .context(UpdateMetaSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    _obj: Arc<DeserializeGuard<ObjectBucketClaim>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    match error {
        Error::InvalidClaim { .. } => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_after()),
    }
}

/// Unbound claims that name `class`, requeued when it changes.
pub fn claims_using_class(
    claims: &[Arc<DeserializeGuard<ObjectBucketClaim>>],
    class: &DeserializeGuard<BucketClass>,
    system_namespace: &str,
) -> Vec<ObjectRef<DeserializeGuard<ObjectBucketClaim>>> {
    if class.namespace().as_deref() != Some(system_namespace) {
        return vec![];
    }
    let name = class.name_any();
    claims
        .iter()
        .filter(|guard| {
            guard.0.as_ref().is_ok_and(|claim| {
                claim.spec.object_bucket_name.is_none()
                    && claim.config(CONFIG_BUCKET_CLASS).unwrap_or(DEFAULT_BUCKET_CLASS) == name
            })
        })
        .map(|guard| ObjectRef::from_obj(&**guard))
        .collect()
}

pub async fn create_bucket_claim_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    let client = ctx.client.clone();
    let (reader, stream) = primary_stream(
        namespace.get_api::<DeserializeGuard<ObjectBucketClaim>>(&client),
        predicates::primary::<DeserializeGuard<ObjectBucketClaim>>,
    );
    let class_index = reader.clone();
    let system_namespace = ctx.config.namespace.clone();

    Controller::for_stream(stream, reader)
        .owns(
            namespace.get_api::<ConfigMap>(&client),
            watcher::Config::default(),
        )
        .owns(
            namespace.get_api::<K8sSecret>(&client),
            watcher::Config::default(),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<BucketClass>>(&client),
            watcher::Config::default(),
            move |class| claims_using_class(&class_index.state(), &class, &system_namespace),
        )
        .with_config(controller_config())
        .graceful_shutdown_on(shutdown)
        .run(reconcile_bucket_claim, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                &client,
                &format!("{BUCKET_CLAIM_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}
