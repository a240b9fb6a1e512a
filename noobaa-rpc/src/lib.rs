//! Client for the NooBaa management RPC protocol.
//!
//! Requests are JSON messages in a small binary frame, multiplexed over one
//! pooled websocket per address, or sent one per PUT for `http(s)://`
//! addresses. [`api::NoobaaApi`] is the typed surface on top.

pub mod api;
pub mod bigint;
pub mod client;
pub mod conn_http;
pub mod conn_ws;
pub mod error;
pub mod frame;
pub mod pool;
pub mod router;
pub mod types;

pub use api::NoobaaApi;
pub use bigint::BigInt;
pub use client::RpcClient;
pub use conn_ws::RequestHandler;
pub use error::{Result, RpcError};
pub use pool::{ConnState, ConnectionPool, Timeouts};
pub use router::{RpcRouter, ServiceRouter};
