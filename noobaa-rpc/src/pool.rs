use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use bytes::Bytes;
use once_cell::sync::Lazy;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::{
    conn_ws::{RequestHandler, WsConnectionActor},
    error::{Result, RpcError},
    frame::{RpcFrame, RpcMessage},
};

static GLOBAL_POOL: Lazy<ConnectionPool> = Lazy::new(ConnectionPool::default);

/// Timing knobs of the websocket transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub send: Duration,
    pub ping_interval: Duration,
    pub pong: Duration,
    pub reconnect_delay: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            connect: Duration::from_secs(60),
            send: Duration::from_secs(120),
            ping_interval: Duration::from_secs(5),
            pong: Duration::from_secs(60),
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    Init,
    Connected,
    Closed,
}

type PendingReply = oneshot::Sender<Result<RpcFrame>>;

pub(crate) struct ConnEntry {
    id: u64,
    state: ConnState,
    outbox: mpsc::UnboundedSender<Bytes>,
    cancel: CancellationToken,
    pending: HashMap<String, PendingReply>,
    next_reqid: u64,
}

#[derive(Default)]
struct PoolState {
    conns: HashMap<String, ConnEntry>,
    next_conn_id: u64,
}

/// One websocket connection per address, shared by every caller.
///
/// The connection map and the per-connection pending tables live behind a
/// single lock. The lock is never held across an await point.
#[derive(Clone)]
pub struct ConnectionPool {
    state: Arc<Mutex<PoolState>>,
    handler: Option<Arc<dyn RequestHandler>>,
    shutdown: CancellationToken,
    timeouts: Timeouts,
}

impl Default for ConnectionPool {
    fn default() -> Self {
        ConnectionPool::new(Timeouts::default())
    }
}

impl ConnectionPool {
    pub fn new(timeouts: Timeouts) -> ConnectionPool {
        ConnectionPool {
            state: Arc::new(Mutex::new(PoolState::default())),
            handler: None,
            shutdown: CancellationToken::new(),
            timeouts,
        }
    }

    /// Process-wide pool used by clients that do not bring their own.
    pub fn global() -> ConnectionPool {
        GLOBAL_POOL.clone()
    }

    /// Answers inbound `req` frames on every connection opened afterwards.
    pub fn with_handler(mut self, handler: Arc<dyn RequestHandler>) -> ConnectionPool {
        self.handler = Some(handler);
        self
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn connection_state(&self, address: &str) -> Option<ConnState> {
        self.lock().conns.get(address).map(|entry| entry.state)
    }

    pub fn pending_count(&self, address: &str) -> usize {
        self.lock()
            .conns
            .get(address)
            .map(|entry| entry.pending.len())
            .unwrap_or(0)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Closes every connection and stops reconnecting.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Returns the id of the live connection for `address`, opening one if needed.
    fn get_connection(&self, state: &mut PoolState, address: &str) -> u64 {
        if let Some(entry) = state.conns.get(address) {
            return entry.id;
        }

        state.next_conn_id += 1;
        let id = state.next_conn_id;
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let cancel = self.shutdown.child_token();
        state.conns.insert(
            address.to_owned(),
            ConnEntry {
                id,
                state: ConnState::Init,
                outbox: outbox_tx.clone(),
                cancel: cancel.clone(),
                pending: HashMap::new(),
                next_reqid: 0,
            },
        );

        let actor = WsConnectionActor::new(
            self.clone(),
            address.to_owned(),
            id,
            outbox_tx,
            outbox_rx,
            cancel,
            self.handler.clone(),
        );
        tokio::spawn(actor.run());
        debug!(address, conn_id = id, "opening rpc connection");
        id
    }

    /// Drops the connection from the map and fails its pending calls.
    pub(crate) fn remove_connection(&self, address: &str, conn_id: u64) {
        let removed = {
            let mut state = self.lock();
            match state.conns.get(address) {
                Some(entry) if entry.id == conn_id => state.conns.remove(address),
                _ => None,
            }
        };
        if let Some(mut entry) = removed {
            entry.state = ConnState::Closed;
            entry.cancel.cancel();
            let pending = entry.pending.len();
            for (_, reply) in entry.pending.drain() {
                reply.send(Err(RpcError::ConnectionClosed)).ok();
            }
            info!(address, conn_id, pending, "rpc connection removed");
        }
    }

    pub(crate) fn mark_connected(&self, address: &str, conn_id: u64) {
        if let Some(entry) = self.lock().conns.get_mut(address) {
            if entry.id == conn_id {
                entry.state = ConnState::Connected;
            }
        }
    }

    /// Hands a reply to its caller. Returns false when nobody waits for it anymore.
    pub(crate) fn complete(&self, address: &str, conn_id: u64, frame: RpcFrame) -> bool {
        let Some(reqid) = frame.message.reqid.clone() else {
            return false;
        };
        let reply = {
            let mut state = self.lock();
            state
                .conns
                .get_mut(address)
                .filter(|entry| entry.id == conn_id)
                .and_then(|entry| entry.pending.remove(&reqid))
        };
        match reply {
            Some(reply) => reply.send(Ok(frame)).is_ok(),
            None => false,
        }
    }

    fn forget(&self, address: &str, conn_id: u64, reqid: &str) {
        if let Some(entry) = self.lock().conns.get_mut(address) {
            if entry.id == conn_id {
                entry.pending.remove(reqid);
            }
        }
    }

    /// Opens a fresh connection for `address` unless one exists already.
    pub(crate) fn reconnect(&self, address: &str) {
        if self.is_shut_down() {
            return;
        }
        let mut state = self.lock();
        if !state.conns.contains_key(address) {
            info!(address, "reconnecting rpc connection");
            self.get_connection(&mut state, address);
        }
    }

    /// Sends a request over the pooled connection and waits for its reply.
    pub async fn call(
        &self,
        address: &str,
        mut message: RpcMessage,
        cancel: &CancellationToken,
    ) -> Result<RpcFrame> {
        let (conn_id, reqid, reply_rx) = {
            let mut state = self.lock();
            let conn_id = self.get_connection(&mut state, address);
            let Some(entry) = state.conns.get_mut(address) else {
                return Err(RpcError::ConnectionClosed);
            };
            entry.next_reqid += 1;
            let reqid = format!("{address}-{}", entry.next_reqid);
            message.reqid = Some(reqid.clone());
            let data = RpcFrame::new(message).encode()?;

            let (reply_tx, reply_rx) = oneshot::channel();
            entry.pending.insert(reqid.clone(), reply_tx);
            if entry.outbox.send(data).is_err() {
                entry.pending.remove(&reqid);
                return Err(RpcError::ConnectionClosed);
            }
            (conn_id, reqid, reply_rx)
        };

        let result = tokio::select! {
            reply = tokio::time::timeout(self.timeouts.send, reply_rx) => match reply {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => Err(RpcError::ConnectionClosed),
                Err(_) => Err(RpcError::Timeout(self.timeouts.send)),
            },
            _ = cancel.cancelled() => Err(RpcError::Cancelled),
        };

        if matches!(result, Err(RpcError::Timeout(_) | RpcError::Cancelled)) {
            self.forget(address, conn_id, &reqid);
        }
        result
    }
}
