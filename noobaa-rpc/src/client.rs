use std::{
    sync::{Arc, RwLock},
    time::Instant,
};

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{
    conn_http::HttpTransport,
    error::Result,
    frame::{RpcFrame, RpcMessage},
    pool::ConnectionPool,
    router::{AddressScheme, RpcRouter},
};

/// Request/reply client for the management apis.
///
/// Clones share the auth token, the connection pool and the cancellation
/// token, so a token obtained through one clone is used by all of them.
#[derive(Clone)]
pub struct RpcClient {
    router: Arc<dyn RpcRouter>,
    pool: ConnectionPool,
    http: HttpTransport,
    auth_token: Arc<RwLock<Option<String>>>,
    cancel: CancellationToken,
}

impl RpcClient {
    /// Client on the process-wide connection pool.
    pub fn new(router: Arc<dyn RpcRouter>) -> Result<RpcClient> {
        RpcClient::with_pool(router, ConnectionPool::global())
    }

    pub fn with_pool(router: Arc<dyn RpcRouter>, pool: ConnectionPool) -> Result<RpcClient> {
        let http = HttpTransport::new(pool.timeouts().send)?;
        Ok(RpcClient {
            router,
            pool,
            http,
            auth_token: Arc::new(RwLock::new(None)),
            cancel: CancellationToken::new(),
        })
    }

    /// Calls made through the returned client fail with `Cancelled` once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> RpcClient {
        self.cancel = cancel;
        self
    }

    pub fn set_auth_token(&self, token: Option<String>) {
        let mut guard = self
            .auth_token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = token;
    }

    pub fn auth_token(&self) -> Option<String> {
        self.auth_token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn address_for(&self, api: &str) -> String {
        self.router.address_for(api)
    }

    /// Sends one request and returns the reply frame with its buffers.
    pub async fn call_raw(&self, api: &str, method: &str, params: Option<Value>) -> Result<RpcFrame> {
        let address = self.router.address_for(api);
        let message = RpcMessage::request(String::new(), api, method, params, self.auth_token());
        let started = Instant::now();
        trace!(api, method, address, "rpc call");

        let frame = match AddressScheme::parse(&address)? {
            AddressScheme::WebSocket => self.pool.call(&address, message, &self.cancel).await,
            AddressScheme::Http => {
                tokio::select! {
                    frame = self.http.call(&address, message) => frame,
                    _ = self.cancel.cancelled() => Err(crate::error::RpcError::Cancelled),
                }
            }
        };

        debug!(
            api,
            method,
            elapsed_ms = started.elapsed().as_millis() as u64,
            ok = frame.as_ref().map(|f| f.message.error.is_none()).unwrap_or(false),
            "rpc call finished"
        );
        frame
    }

    /// Typed call: serializes `params`, deserializes the reply.
    pub async fn call<P, R>(&self, api: &str, method: &str, params: &P) -> Result<R>
    where
        P: Serialize + ?Sized + Sync,
        R: DeserializeOwned,
    {
        let params = serde_json::to_value(params)?;
        let reply = self.call_raw(api, method, Some(params)).await?.message.into_result()?;
        Ok(serde_json::from_value(reply)?)
    }

    /// Call whose reply carries nothing of interest.
    pub async fn call_void<P>(&self, api: &str, method: &str, params: &P) -> Result<()>
    where
        P: Serialize + ?Sized + Sync,
    {
        let params = serde_json::to_value(params)?;
        self.call_raw(api, method, Some(params)).await?.message.into_result()?;
        Ok(())
    }

    /// Call without params, as used by the read-only system methods.
    pub async fn call_no_params<R: DeserializeOwned>(&self, api: &str, method: &str) -> Result<R> {
        let reply = self.call_raw(api, method, None).await?.message.into_result()?;
        Ok(serde_json::from_value(reply)?)
    }
}
