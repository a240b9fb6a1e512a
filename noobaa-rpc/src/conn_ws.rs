use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    Connector, MaybeTlsStream, WebSocketStream, connect_async_tls_with_config,
    tungstenite::Message,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    error::{RPC_CODE_INTERNAL_ERROR, Result, RpcError},
    frame::{RpcFrame, RpcMessage, RpcOp},
    pool::ConnectionPool,
};

/// Serves `req` frames the remote side sends over an outbound connection.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, request: RpcFrame) -> Result<Value>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) async fn connect_ws(address: &str) -> Result<WsStream> {
    // the management endpoint serves a self signed certificate
    let tls = native_tls::TlsConnector::builder()
        .danger_accept_invalid_certs(true)
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(|e| RpcError::Transport(format!("tls connector: {e}")))?;
    let (stream, _) =
        connect_async_tls_with_config(address, None, false, Some(Connector::NativeTls(tls)))
            .await?;
    Ok(stream)
}

/// Owns the socket of one pooled connection.
///
/// Runs until the socket fails, a frame cannot be decoded, a ping goes
/// unanswered or the pool is shut down, then removes itself from the pool.
pub(crate) struct WsConnectionActor {
    pool: ConnectionPool,
    address: String,
    conn_id: u64,
    outbox_tx: mpsc::UnboundedSender<Bytes>,
    outbox: mpsc::UnboundedReceiver<Bytes>,
    cancel: CancellationToken,
    handler: Option<Arc<dyn RequestHandler>>,
    connected: bool,
    ping_seq: u64,
    unanswered_ping: Option<Instant>,
}

impl WsConnectionActor {
    pub(crate) fn new(
        pool: ConnectionPool,
        address: String,
        conn_id: u64,
        outbox_tx: mpsc::UnboundedSender<Bytes>,
        outbox: mpsc::UnboundedReceiver<Bytes>,
        cancel: CancellationToken,
        handler: Option<Arc<dyn RequestHandler>>,
    ) -> Self {
        Self {
            pool,
            address,
            conn_id,
            outbox_tx,
            outbox,
            cancel,
            handler,
            connected: false,
            ping_seq: 0,
            unanswered_ping: None,
        }
    }

    pub(crate) async fn run(mut self) {
        match self.run_inner().await {
            Ok(()) => debug!(address = self.address, "rpc connection closed"),
            Err(err) => warn!(address = self.address, %err, "rpc connection closed"),
        }
        self.pool.remove_connection(&self.address, self.conn_id);

        // failed dials are retried by the next call, not in the background
        if self.connected && !self.pool.is_shut_down() {
            let pool = self.pool.clone();
            let address = self.address.clone();
            let delay = pool.timeouts().reconnect_delay;
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                pool.reconnect(&address);
            });
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        let timeouts = self.pool.timeouts();
        let stream = tokio::select! {
            stream = tokio::time::timeout(timeouts.connect, connect_ws(&self.address)) => {
                stream.map_err(|_| RpcError::Timeout(timeouts.connect))??
            }
            _ = self.cancel.cancelled() => return Ok(()),
        };
        self.connected = true;
        self.pool.mark_connected(&self.address, self.conn_id);
        info!(address = self.address, "rpc connection established");

        let (mut sink, mut stream) = stream.split();
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + timeouts.ping_interval,
            timeouts.ping_interval,
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    sink.close().await.ok();
                    return Ok(());
                }
                msg = stream.next() => {
                    match msg {
                        Some(Ok(Message::Binary(data))) => self.on_frame(&data)?,
                        Some(Ok(Message::Close(_))) | None => return Err(RpcError::ConnectionClosed),
                        Some(Ok(_)) => {}
                        Some(Err(err)) => return Err(err.into()),
                    }
                }
                data = self.outbox.recv() => {
                    let Some(data) = data else {
                        return Ok(());
                    };
                    sink.send(Message::Binary(data)).await?;
                }
                _ = ticker.tick() => {
                    if let Some(since) = self.unanswered_ping {
                        if since.elapsed() > timeouts.pong {
                            return Err(RpcError::Timeout(timeouts.pong));
                        }
                    } else {
                        self.unanswered_ping = Some(Instant::now());
                    }
                    self.ping_seq += 1;
                    let ping = RpcMessage::ping(format!("{}-ping-{}", self.address, self.ping_seq));
                    sink.send(Message::Binary(RpcFrame::new(ping).encode()?)).await?;
                }
            }
        }
    }

    /// Dispatches one inbound frame. Decoding failures close the connection.
    fn on_frame(&mut self, data: &[u8]) -> Result<()> {
        let frame = RpcFrame::decode(data).inspect_err(|err| {
            error!(address = self.address, %err, "failed to decode rpc frame");
        })?;

        match frame.message.op {
            RpcOp::Res => {
                let reqid = frame.message.reqid.clone();
                if !self.pool.complete(&self.address, self.conn_id, frame) {
                    debug!(address = self.address, ?reqid, "dropping late rpc reply");
                }
            }
            RpcOp::Req => self.on_request(frame),
            RpcOp::Ping => {
                let pong = RpcFrame::new(RpcMessage::pong(frame.message.reqid)).encode()?;
                self.outbox_tx.send(pong).ok();
            }
            RpcOp::Pong => {
                self.unanswered_ping = None;
            }
        }
        Ok(())
    }

    fn on_request(&self, frame: RpcFrame) {
        let handler = self.handler.clone();
        let outbox = self.outbox_tx.clone();
        let address = self.address.clone();
        tokio::spawn(async move {
            let reqid = frame.message.reqid.clone();
            let method = format!(
                "{}.{}",
                frame.message.api.as_deref().unwrap_or_default(),
                frame.message.method.as_deref().unwrap_or_default()
            );
            let reply = match handler {
                Some(handler) => match handler.handle(frame).await {
                    Ok(reply) => RpcMessage::reply(reqid, reply),
                    Err(err) => {
                        RpcMessage::error_reply(reqid, RPC_CODE_INTERNAL_ERROR, err.to_string())
                    }
                },
                None => RpcMessage::error_reply(
                    reqid,
                    RPC_CODE_INTERNAL_ERROR,
                    format!("no handler for {method}"),
                ),
            };
            match RpcFrame::new(reply).encode() {
                Ok(data) => {
                    outbox.send(data).ok();
                }
                Err(err) => error!(address, method, %err, "failed to encode rpc reply"),
            }
        });
    }
}
