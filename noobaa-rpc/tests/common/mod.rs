#![allow(dead_code)]

use std::{
    net::SocketAddr,
    str::FromStr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::put,
};
use futures_util::{SinkExt, StreamExt};
use noobaa_rpc::{
    conn_http::BODY_LEN_HEADER,
    error::RPC_CODE_INTERNAL_ERROR,
    frame::{RpcFrame, RpcMessage, RpcOp},
};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug};
use tracing_subscriber::{
    EnvFilter, fmt::Layer, layer::SubscriberExt, util::SubscriberInitExt,
};

pub fn setup_tracing(filter: Option<String>) {
    let default = "noobaa_rpc=INFO"
        .parse()
        .expect("hard-coded default directive should be valid");

    let builder = EnvFilter::builder().with_default_directive(default);

    let filter = if let Some(filter) = filter {
        let filter = match Level::from_str(&filter) {
            Ok(level) => format!("noobaa_rpc={level}"),
            Err(_) => filter,
        };
        builder.parse_lossy(filter)
    } else {
        builder.parse_lossy("")
    };

    tracing_subscriber::registry()
        .with(Layer::default())
        .with(filter)
        .try_init()
        .ok();
}

pub async fn wait_for_condition<F>(timeout: Duration, condition: F) -> Result<()>
where
    F: Fn() -> bool,
{
    let start = Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    bail!("timeout waiting condition")
}

/// What the fake server does with an inbound request.
pub enum FakeReply {
    Reply(Value),
    Error(&'static str, String),
    /// Keep the request pending forever.
    NoReply,
    /// Reply after a delay.
    Delayed(Duration, Value),
    /// Write these bytes as a binary message instead of a frame.
    Raw(Vec<u8>),
    /// Close the socket.
    Close,
    /// Send a `req` of our own to the client and answer with what it replied.
    AskBack { api: String, method: String },
}

pub type Responder = Arc<dyn Fn(&RpcMessage) -> FakeReply + Send + Sync>;

/// In-process websocket endpoint speaking the rpc framing.
pub struct FakeWsServer {
    pub address: String,
    accepted: Arc<AtomicUsize>,
    kick: Arc<Mutex<CancellationToken>>,
    stop: CancellationToken,
}

impl FakeWsServer {
    pub async fn start(responder: Responder) -> Result<FakeWsServer> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("TCP Listener binding")?;
        let address = format!("ws://{}/rpc/", listener.local_addr()?);
        let accepted = Arc::new(AtomicUsize::new(0));
        let kick = Arc::new(Mutex::new(CancellationToken::new()));
        let stop = CancellationToken::new();

        let server = FakeWsServer {
            address,
            accepted: accepted.clone(),
            kick: kick.clone(),
            stop: stop.clone(),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted_conn = listener.accept() => {
                        let Ok((stream, _)) = accepted_conn else { break };
                        accepted.fetch_add(1, Ordering::SeqCst);
                        let kicked = kick.lock().unwrap().clone();
                        let stop = stop.clone();
                        let responder = responder.clone();
                        tokio::spawn(async move {
                            if let Err(err) = serve_connection(stream, responder, kicked, stop).await {
                                debug!(%err, "fake rpc connection ended");
                            }
                        });
                    }
                    _ = stop.cancelled() => break,
                }
            }
        });

        Ok(server)
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Drops every open connection but keeps accepting new ones.
    pub fn kick(&self) {
        let mut kick = self.kick.lock().unwrap();
        kick.cancel();
        *kick = CancellationToken::new();
    }

    pub fn stop(&self) {
        self.stop.cancel();
    }
}

impl Drop for FakeWsServer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn serve_connection(
    stream: TcpStream,
    responder: Responder,
    kicked: CancellationToken,
    stop: CancellationToken,
) -> Result<()> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();
    let (out_tx, mut out_rx) = tokio::sync::mpsc::unbounded_channel::<Vec<u8>>();
    // reqid of the client request waiting on our own request
    let mut asked_back: Option<Option<String>> = None;

    loop {
        tokio::select! {
            _ = kicked.cancelled() => return Ok(()),
            _ = stop.cancelled() => return Ok(()),
            data = out_rx.recv() => {
                if let Some(data) = data {
                    sink.send(Message::Binary(data.into())).await?;
                }
            }
            msg = source.next() => {
                let data = match msg {
                    Some(Ok(Message::Binary(data))) => data,
                    Some(Ok(Message::Close(_))) | None => return Ok(()),
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => return Err(err.into()),
                };
                let frame = RpcFrame::decode(&data)?;
                let message = frame.message;
                match message.op {
                    RpcOp::Ping => {
                        let pong = RpcFrame::new(RpcMessage::pong(message.reqid)).encode()?;
                        sink.send(Message::Binary(pong)).await?;
                    }
                    RpcOp::Pong => {}
                    RpcOp::Res => {
                        if let Some(original) = asked_back.take() {
                            let answer = match message.error {
                                Some(err) => json!({"handled": false, "rpc_code": err.rpc_code, "message": err.message}),
                                None => json!({"handled": true, "reply": message.reply}),
                            };
                            let reply = RpcFrame::new(RpcMessage::reply(original, answer)).encode()?;
                            sink.send(Message::Binary(reply)).await?;
                        }
                    }
                    RpcOp::Req => match responder(&message) {
                        FakeReply::Reply(value) => {
                            let reply = RpcFrame::new(RpcMessage::reply(message.reqid, value)).encode()?;
                            sink.send(Message::Binary(reply)).await?;
                        }
                        FakeReply::Error(code, text) => {
                            let reply = RpcFrame::new(RpcMessage::error_reply(message.reqid, code, text)).encode()?;
                            sink.send(Message::Binary(reply)).await?;
                        }
                        FakeReply::NoReply => {}
                        FakeReply::Delayed(delay, value) => {
                            let out_tx = out_tx.clone();
                            let reqid = message.reqid;
                            tokio::spawn(async move {
                                tokio::time::sleep(delay).await;
                                if let Ok(reply) = RpcFrame::new(RpcMessage::reply(reqid, value)).encode() {
                                    out_tx.send(reply.to_vec()).ok();
                                }
                            });
                        }
                        FakeReply::Raw(bytes) => {
                            sink.send(Message::Binary(bytes.into())).await?;
                        }
                        FakeReply::Close => {
                            sink.close().await.ok();
                            return Ok(());
                        }
                        FakeReply::AskBack { api, method } => {
                            asked_back = Some(message.reqid);
                            let ask = RpcMessage::request("srv-1".into(), &api, &method, Some(json!({"from": "server"})), None);
                            sink.send(Message::Binary(RpcFrame::new(ask).encode()?)).await?;
                        }
                    },
                }
            }
        }
    }
}

/// What the fake http endpoint saw, for assertions.
#[derive(Clone, Default)]
pub struct HttpCalls {
    pub methods: Arc<Mutex<Vec<String>>>,
}

#[derive(Clone)]
struct HttpState {
    calls: HttpCalls,
}

/// Fake `https://` rpc endpoint: answers PUT requests with a framed reply.
pub struct FakeHttpRpcServer {
    pub address: String,
    pub calls: HttpCalls,
    stop: CancellationToken,
}

impl FakeHttpRpcServer {
    pub async fn start() -> Result<FakeHttpRpcServer> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .context("TCP Listener binding")?;
        let address = format!("http://{}/rpc/", listener.local_addr()?);
        let calls = HttpCalls::default();
        let stop = CancellationToken::new();

        let app = Router::new()
            .route("/rpc/", put(rpc))
            .with_state(HttpState {
                calls: calls.clone(),
            });
        let shutdown = stop.clone();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown.cancelled().await })
                .await
                .ok();
        });

        Ok(FakeHttpRpcServer {
            address,
            calls,
            stop,
        })
    }
}

impl Drop for FakeHttpRpcServer {
    fn drop(&mut self) {
        self.stop.cancel();
    }
}

async fn rpc(State(state): State<HttpState>, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let body_len = headers
        .get(BODY_LEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(body.len());
    let request = match RpcFrame::decode_body(&body, body_len) {
        Ok(frame) => frame.message,
        Err(err) => return (StatusCode::BAD_REQUEST, HeaderMap::new(), err.to_string().into_bytes()),
    };
    let method = format!(
        "{}.{}",
        request.api.clone().unwrap_or_default(),
        request.method.clone().unwrap_or_default()
    );
    state.calls.methods.lock().unwrap().push(method.clone());
    if method == "auth_api.read_auth" {
        // slower than any client timeout a test configures
        tokio::time::sleep(Duration::from_secs(5)).await;
    }

    let frame = match method.as_str() {
        "system_api.read_system" => RpcFrame::new(RpcMessage::reply(
            request.reqid,
            json!({"name": "noobaa", "version": "5.18.0", "pools": [{"name": "bs1", "mode": "OPTIMAL"}]}),
        ))
        .with_buffer("blob", Bytes::from_static(b"payload")),
        "bucket_api.read_bucket" => RpcFrame::new(RpcMessage::error_reply(
            request.reqid,
            "NO_SUCH_BUCKET",
            "no such bucket".into(),
        )),
        _ => RpcFrame::new(RpcMessage::error_reply(
            request.reqid,
            RPC_CODE_INTERNAL_ERROR,
            format!("unexpected {method}"),
        )),
    };

    let Ok((payload, len)) = frame.encode_body() else {
        return (StatusCode::INTERNAL_SERVER_ERROR, HeaderMap::new(), vec![]);
    };
    let mut reply_headers = HeaderMap::new();
    reply_headers.insert(BODY_LEN_HEADER, len.to_string().parse().unwrap());
    (StatusCode::OK, reply_headers, payload.to_vec())
}
