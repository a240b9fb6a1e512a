//! Runs one controller per resource kind until the first one stops.
//!
//! Every controller is fed by a reflector backed stream of its primary kind,
//! filtered through [`predicates`], and reconciles one object at a time.

pub mod predicates;

use std::{fmt::Debug, future::Future, hash::Hash, sync::Arc};

use futures::{
    FutureExt, Stream, TryStreamExt,
    future::{BoxFuture, Shared},
};
use kube::runtime::WatchStreamExt;
use noobaa_rpc::ConnectionPool;
use serde::de::DeserializeOwned;
use stackable_operator::{
    client::Client,
    kube::{
        Api, Resource,
        runtime::{controller, reflector, watcher},
    },
    namespace::WatchNamespace,
};
use tokio_util::sync::CancellationToken;

use crate::{account, bucket_claim, bucket_class, config::OperatorConfig, store, system};

pub const APP_NAME: &str = "noobaa";
pub const OPERATOR_NAME: &str = "noobaa.io";

/// Shared by every reconcile of every controller.
#[derive(Clone)]
pub struct Ctx {
    pub client: Client,
    pub config: Arc<OperatorConfig>,
    /// Cancelled on shutdown; rpc calls in flight observe it.
    pub cancel: CancellationToken,
}

/// Reflector backed stream of `api`, passing only events accepted by `predicate`.
pub fn primary_stream<K, P>(
    api: Api<K>,
    predicate: P,
) -> (
    reflector::Store<K>,
    impl Stream<Item = Result<K, watcher::Error>> + Send,
)
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
    P: Fn(&K) -> Option<u64> + Send + 'static,
{
    let (reader, writer) = reflector::store();
    let events = reflector::reflector(writer, watcher(api, watcher::Config::default()))
        .default_backoff()
        .applied_objects();
    (reader, queued(events, predicate))
}

/// Passes the events whose predicate hash changed and logs each one that passes.
pub fn queued<K, P, S>(
    events: S,
    predicate: P,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send
where
    K: Resource + Send + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send,
    P: Fn(&K) -> Option<u64> + Send + 'static,
    S: Stream<Item = Result<K, watcher::Error>> + Send,
{
    let kind = K::kind(&K::DynamicType::default()).to_string();
    events
        .predicate_filter(predicate)
        .inspect_ok(move |obj| predicates::log_queued(&kind, obj))
}

/// Reconciles of one kind never overlap, whichever objects they are for.
pub fn controller_config() -> controller::Config {
    controller::Config::default().concurrency(1)
}

/// Graceful shutdown signal shared by every controller.
pub type ShutdownTrigger = Shared<BoxFuture<'static, ()>>;

/// Resolves once `signal` fires or `cancel` is cancelled.
///
/// `cancel` and the connection pool are shut down before the trigger
/// resolves, so rpc calls in flight fail with `Cancelled` instead of holding
/// up the controllers while they drain.
pub fn shutdown_trigger<F>(
    signal: F,
    cancel: CancellationToken,
    pool: ConnectionPool,
) -> ShutdownTrigger
where
    F: Future<Output = ()> + Send + 'static,
{
    async move {
        tokio::select! {
            _ = signal => tracing::info!("stop signal received, cancelling outstanding rpc calls"),
            _ = cancel.cancelled() => {}
        }
        cancel.cancel();
        pool.shutdown();
    }
    .boxed()
    .shared()
}

/// SIGINT or SIGTERM.
#[cfg(unix)]
async fn stop_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(error) => {
            tracing::warn!(%error, "failed to listen for SIGTERM");
            ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn stop_signal() {
    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "failed to listen for the stop signal");
        std::future::pending::<()>().await;
    }
}

/// Starts every controller and returns when the first one exits.
pub async fn run_all(client: Client, config: OperatorConfig, namespace: WatchNamespace) {
    let cancel = CancellationToken::new();
    let shutdown = shutdown_trigger(stop_signal(), cancel.clone(), ConnectionPool::global());
    let ctx = Ctx {
        client: client.clone(),
        config: Arc::new(config),
        cancel: cancel.clone(),
    };

    let controllers = vec![
        system::controller::create_system_controller(
            ctx.clone(),
            namespace.clone(),
            shutdown.clone(),
        )
        .boxed(),
        store::controller::create_backing_store_controller(
            ctx.clone(),
            namespace.clone(),
            shutdown.clone(),
        )
        .boxed(),
        store::controller::create_namespace_store_controller(
            ctx.clone(),
            namespace.clone(),
            shutdown.clone(),
        )
        .boxed(),
        bucket_class::controller::create_bucket_class_controller(
            ctx.clone(),
            namespace.clone(),
            shutdown.clone(),
        )
        .boxed(),
        bucket_claim::controller::create_bucket_claim_controller(
            ctx.clone(),
            namespace.clone(),
            shutdown.clone(),
        )
        .boxed(),
        account::controller::create_account_controller(ctx, namespace, shutdown).boxed(),
    ];
    futures::future::select_all(controllers).await;
    tracing::info!("controller stopped, cancelling outstanding rpc calls");
    cancel.cancel();
    ConnectionPool::global().shutdown();
}
