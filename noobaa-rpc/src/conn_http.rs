use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::debug;

use crate::{
    error::{Result, RpcError},
    frame::{RpcFrame, RpcMessage},
};

pub const BODY_LEN_HEADER: &str = "X-Noobaa-Rpc-Body-Len";

/// Stateless transport for `http://` and `https://` addresses: one PUT per call.
///
/// Connection reuse is left to the reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeout: Duration,
    next_reqid: Arc<AtomicU64>,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<HttpTransport> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()?;
        Ok(HttpTransport {
            client,
            timeout,
            next_reqid: Arc::new(AtomicU64::new(0)),
        })
    }

    pub async fn call(&self, address: &str, mut message: RpcMessage) -> Result<RpcFrame> {
        let seq = self.next_reqid.fetch_add(1, Ordering::Relaxed) + 1;
        message.reqid = Some(format!("{address}-{seq}"));
        let (body, body_len) = RpcFrame::new(message).encode_body()?;

        let response = self
            .client
            .put(address)
            .header(BODY_LEN_HEADER, body_len.to_string())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RpcError::Timeout(self.timeout)
                } else {
                    e.into()
                }
            })?;

        let status = response.status();
        let header_len = response
            .headers()
            .get(BODY_LEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        let data = response.bytes().await?;
        debug!(address, %status, len = data.len(), "http rpc response");

        match header_len {
            Some(len) => RpcFrame::decode_body(&data, len),
            None if status.is_success() => RpcFrame::decode_body(&data, data.len()),
            None => Err(RpcError::Transport(format!(
                "http rpc status {status}: {}",
                String::from_utf8_lossy(&data)
            ))),
        }
    }
}
