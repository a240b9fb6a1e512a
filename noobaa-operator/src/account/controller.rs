use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use snafu::{OptionExt, ResultExt};
use stackable_operator::{
    k8s_openapi::api::core::v1::{Secret as K8sSecret, SecretReference},
    kube::{
        Resource, ResourceExt,
        core::{DeserializeGuard, error_boundary},
        runtime::{Controller, controller::Action, reflector::ObjectRef, watcher},
    },
    logging::controller::report_controller_reconciled,
    namespace::WatchNamespace,
};

use super::{
    error::{
        ApplySecretSnafu, ApplyStatusSnafu, BuildSecretSnafu, Error, GetStoreSnafu,
        InvalidAccountSnafu, ObjectHasNoNamespaceSnafu, RemoteSnafu, Result, UpdateMetaSnafu,
    },
    logic::{account_email, remove_account, sync_account, verify_default_resource},
};
use crate::{
    api::{
        Phase,
        account::{NooBaaAccount, NooBaaAccountStatus},
        store::{BackingStore, NamespaceStore},
    },
    manager::{
        Ctx, OPERATOR_NAME, ShutdownTrigger, controller_config, predicates, primary_stream,
    },
    phase::{self, Phased, ReconcileOutcome, enter},
    remote,
    resources::{FINALIZER, apply, ensure_meta, is_deleting, release_finalizer},
    secret::{S3Credentials, Secret},
};

pub const ACCOUNT_CONTROLLER_NAME: &str = "noobaaaccount";

pub fn secret_name(account: &NooBaaAccount) -> String {
    format!("noobaa-account-{}", account.name_any())
}

pub async fn reconcile_account(
    account: Arc<DeserializeGuard<NooBaaAccount>>,
    ctx: Arc<Ctx>,
) -> Result<Action> {
    tracing::info!("Starting reconcile");
    let account = account
        .0
        .as_ref()
        .map_err(error_boundary::InvalidObject::clone)
        .context(InvalidAccountSnafu)?;
    let client = &ctx.client;

    if is_deleting(account) {
        return delete_account(account, &ctx).await;
    }
    if ensure_meta(client, account, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?
    {
        return Ok(Action::requeue(Duration::from_secs(1)));
    }

    let mut status = account.initial_status();
    let result = run_phases(account, &ctx, &mut status).await;
    let (action, _) = phase::finish(client, account, status, result, ctx.config.requeue_after())
        .await
        .context(ApplyStatusSnafu)?;
    Ok(action)
}

async fn run_phases(
    account: &NooBaaAccount,
    ctx: &Ctx,
    status: &mut NooBaaAccountStatus,
) -> Result<ReconcileOutcome> {
    let client = &ctx.client;
    let namespace = account.namespace().context(ObjectHasNoNamespaceSnafu)?;

    enter(status, Phase::Verifying);
    let (backing, namespace_store) = match account.spec.default_resource.as_deref() {
        Some(name) => (
            client
                .get_opt::<BackingStore>(name, &namespace)
                .await
                .context(GetStoreSnafu { name })?
                .is_some(),
            client
                .get_opt::<NamespaceStore>(name, &namespace)
                .await
                .context(GetStoreSnafu { name })?
                .is_some(),
        ),
        None => (false, false),
    };
    verify_default_resource(&account.spec, backing, namespace_store)?;

    enter(status, Phase::Configuring);
    let api = remote::system_api(ctx).await.context(RemoteSnafu)?;
    let keys = sync_account(&api, account).await?;

    let name = secret_name(account);
    let secret = Secret::new(name.clone(), namespace.clone(), S3Credentials::from(keys))
        .to_owned_secret(account)
        .context(BuildSecretSnafu)?;
    apply(client, &secret)
        .await
        .context(ApplySecretSnafu { name: &name })?;
    status.secret_ref = Some(SecretReference {
        name: Some(name),
        namespace: Some(namespace),
    });
    Ok(ReconcileOutcome::Done)
}

async fn delete_account(account: &NooBaaAccount, ctx: &Ctx) -> Result<Action> {
    let client = &ctx.client;
    let email = account_email(account);
    tracing::info!(%email, "deleting account");

    let mut status = account.initial_status();
    enter(&mut status, Phase::Deleting);
    phase::write_status(client, account, &status)
        .await
        .context(ApplyStatusSnafu)?;

    match remote::system_api(ctx).await {
        Ok(api) => remove_account(&api, &email).await?,
        Err(remote::Error::SystemNotFound { .. }) => {
            tracing::info!("system is gone, skipping remote cleanup");
        }
        Err(source) => return Err(Error::Remote { source }),
    }
    release_finalizer(client, account, FINALIZER)
        .await
        .context(UpdateMetaSnafu)?;
    Ok(Action::await_change())
}

pub fn error_policy(
    _obj: Arc<DeserializeGuard<NooBaaAccount>>,
    error: &Error,
    ctx: Arc<Ctx>,
) -> Action {
    match error {
        Error::InvalidAccount { .. } => Action::await_change(),
        _ => Action::requeue(ctx.config.requeue_after()),
    }
}

/// Accounts whose default resource carries the name of `store`, in its namespace.
pub fn accounts_using_store<S: Resource>(
    accounts: &[Arc<DeserializeGuard<NooBaaAccount>>],
    store: &S,
) -> Vec<ObjectRef<DeserializeGuard<NooBaaAccount>>> {
    let name = store.meta().name.as_deref();
    accounts
        .iter()
        .filter(|guard| {
            guard.0.as_ref().is_ok_and(|account| {
                account.metadata.namespace == store.meta().namespace
                    && account.spec.default_resource.as_deref() == name
            })
        })
        .map(|guard| ObjectRef::from_obj(&**guard))
        .collect()
}

pub async fn create_account_controller(
    ctx: Ctx,
    namespace: WatchNamespace,
    shutdown: ShutdownTrigger,
) {
    let client = ctx.client.clone();
    let (reader, stream) = primary_stream(
        namespace.get_api::<DeserializeGuard<NooBaaAccount>>(&client),
        predicates::primary::<DeserializeGuard<NooBaaAccount>>,
    );
    let backing_index = reader.clone();
    let namespace_index = reader.clone();

    Controller::for_stream(stream, reader)
        .owns(
            namespace.get_api::<K8sSecret>(&client),
            watcher::Config::default(),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<BackingStore>>(&client),
            watcher::Config::default(),
            move |store| accounts_using_store(&backing_index.state(), &store),
        )
        .watches(
            namespace.get_api::<DeserializeGuard<NamespaceStore>>(&client),
            watcher::Config::default(),
            move |store| accounts_using_store(&namespace_index.state(), &store),
        )
        .with_config(controller_config())
        .graceful_shutdown_on(shutdown)
        .run(reconcile_account, error_policy, Arc::new(ctx))
        .map(|res| {
            report_controller_reconciled(
                &client,
                &format!("{ACCOUNT_CONTROLLER_NAME}.{OPERATOR_NAME}"),
                &res,
            );
        })
        .collect::<()>()
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{account::fixtures, store::fixtures as store_fixtures};

    #[test]
    fn test_secret_name() {
        let account: NooBaaAccount = serde_yaml::from_str(fixtures::ACCOUNT).unwrap();
        assert_eq!(secret_name(&account), "noobaa-account-reporting");
    }

    #[test]
    fn test_accounts_using_store() {
        let account: NooBaaAccount = serde_yaml::from_str(fixtures::ACCOUNT).unwrap();
        let mut other = account.clone();
        other.metadata.name = Some("archive".into());
        other.spec.default_resource = Some("bs2".into());
        let accounts = vec![
            Arc::new(DeserializeGuard(Ok(account))),
            Arc::new(DeserializeGuard(Ok(other))),
        ];

        let mut bs: BackingStore =
            serde_yaml::from_str(store_fixtures::AWS_BACKING_STORE).unwrap();
        bs.metadata.name = Some("bs1".into());
        bs.metadata.namespace = Some("noobaa".into());
        let found = accounts_using_store(&accounts, &DeserializeGuard(Ok(bs.clone())));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "reporting");

        bs.metadata.namespace = Some("elsewhere".into());
        assert!(accounts_using_store(&accounts, &DeserializeGuard(Ok(bs))).is_empty());
    }
}
