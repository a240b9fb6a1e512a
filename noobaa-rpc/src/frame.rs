use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, RpcError};

/// Magic version word leading every websocket frame.
pub const RPC_VERSION_NUMBER: u32 = 0xba00_0000;

/// Frames with a JSON body larger than this close the connection.
pub const MAX_MSG_BODY_LEN: usize = 64 * 1024 * 1024;

const HEADER_LEN: usize = 8;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RpcOp {
    Req,
    Res,
    Ping,
    Pong,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RpcBufferSpec {
    pub name: String,
    pub len: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RpcErrorBody {
    pub rpc_code: String,
    pub message: String,
}

/// JSON body shared by requests, replies and keepalive frames.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RpcMessage {
    pub op: RpcOp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reqid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub took: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buffers: Vec<RpcBufferSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorBody>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply: Option<Value>,
}

impl RpcMessage {
    fn new(op: RpcOp) -> RpcMessage {
        RpcMessage {
            op,
            reqid: None,
            api: None,
            method: None,
            auth_token: None,
            took: None,
            params: None,
            buffers: vec![],
            error: None,
            reply: None,
        }
    }

    pub fn request(
        reqid: String,
        api: &str,
        method: &str,
        params: Option<Value>,
        auth_token: Option<String>,
    ) -> RpcMessage {
        RpcMessage {
            reqid: Some(reqid),
            api: Some(api.to_owned()),
            method: Some(method.to_owned()),
            params,
            auth_token,
            ..RpcMessage::new(RpcOp::Req)
        }
    }

    pub fn reply(reqid: Option<String>, reply: Value) -> RpcMessage {
        RpcMessage {
            reqid,
            reply: Some(reply),
            ..RpcMessage::new(RpcOp::Res)
        }
    }

    pub fn error_reply(reqid: Option<String>, rpc_code: &str, message: String) -> RpcMessage {
        RpcMessage {
            reqid,
            error: Some(RpcErrorBody {
                rpc_code: rpc_code.to_owned(),
                message,
            }),
            ..RpcMessage::new(RpcOp::Res)
        }
    }

    pub fn ping(reqid: String) -> RpcMessage {
        RpcMessage {
            reqid: Some(reqid),
            ..RpcMessage::new(RpcOp::Ping)
        }
    }

    pub fn pong(reqid: Option<String>) -> RpcMessage {
        RpcMessage {
            reqid,
            ..RpcMessage::new(RpcOp::Pong)
        }
    }

    /// Turns a `res` message into the reply value or the server sent error.
    pub fn into_result(self) -> Result<Value> {
        if let Some(err) = self.error {
            return Err(RpcError::Rpc {
                rpc_code: err.rpc_code,
                message: err.message,
            });
        }
        Ok(self.reply.unwrap_or(Value::Null))
    }
}

/// A decoded message together with the raw buffers that trailed its JSON body.
#[derive(Clone, Debug, PartialEq)]
pub struct RpcFrame {
    pub message: RpcMessage,
    pub buffers: Vec<(String, Bytes)>,
}

impl RpcFrame {
    pub fn new(message: RpcMessage) -> RpcFrame {
        RpcFrame {
            message,
            buffers: vec![],
        }
    }

    pub fn with_buffer(mut self, name: impl Into<String>, data: Bytes) -> RpcFrame {
        let name = name.into();
        self.message.buffers.push(RpcBufferSpec {
            name: name.clone(),
            len: data.len(),
        });
        self.buffers.push((name, data));
        self
    }

    pub fn buffer(&self, name: &str) -> Option<&Bytes> {
        self.buffers
            .iter()
            .find(|(buffer_name, _)| buffer_name == name)
            .map(|(_, data)| data)
    }

    /// JSON body followed by the raw buffers, without the websocket header.
    pub fn encode_body(&self) -> Result<(Bytes, usize)> {
        let body = serde_json::to_vec(&self.message)?;
        if body.len() > MAX_MSG_BODY_LEN {
            return Err(RpcError::BodyTooBig {
                len: body.len(),
                max: MAX_MSG_BODY_LEN,
            });
        }
        let body_len = body.len();
        let buffers_len: usize = self.buffers.iter().map(|(_, data)| data.len()).sum();
        let mut out = BytesMut::with_capacity(body_len + buffers_len);
        out.put_slice(&body);
        for (_, data) in &self.buffers {
            out.put_slice(data);
        }
        Ok((out.freeze(), body_len))
    }

    /// Full websocket frame: magic, big-endian body length, body, buffers.
    pub fn encode(&self) -> Result<Bytes> {
        let (payload, body_len) = self.encode_body()?;
        let mut out = BytesMut::with_capacity(HEADER_LEN + payload.len());
        out.put_u32(RPC_VERSION_NUMBER);
        out.put_u32(body_len as u32);
        out.put_slice(&payload);
        Ok(out.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<RpcFrame> {
        if data.len() < HEADER_LEN {
            return Err(RpcError::ShortRead {
                expected: HEADER_LEN,
                got: data.len(),
            });
        }
        let version = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if version != RPC_VERSION_NUMBER {
            return Err(RpcError::VersionMismatch {
                got: version,
                expected: RPC_VERSION_NUMBER,
            });
        }
        let body_len = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
        RpcFrame::decode_body(&data[HEADER_LEN..], body_len)
    }

    /// Decodes a JSON body of `body_len` bytes plus its trailing buffers.
    pub fn decode_body(data: &[u8], body_len: usize) -> Result<RpcFrame> {
        if body_len > MAX_MSG_BODY_LEN {
            return Err(RpcError::BodyTooBig {
                len: body_len,
                max: MAX_MSG_BODY_LEN,
            });
        }
        if data.len() < body_len {
            return Err(RpcError::ShortRead {
                expected: body_len,
                got: data.len(),
            });
        }
        let message: RpcMessage = serde_json::from_slice(&data[..body_len])?;

        let mut offset = body_len;
        let mut buffers = Vec::with_capacity(message.buffers.len());
        for spec in &message.buffers {
            let end = offset
                .checked_add(spec.len)
                .filter(|end| *end <= data.len())
                .ok_or(RpcError::ShortRead {
                    expected: offset.saturating_add(spec.len),
                    got: data.len(),
                })?;
            buffers.push((
                spec.name.clone(),
                Bytes::copy_from_slice(&data[offset..end]),
            ));
            offset = end;
        }

        Ok(RpcFrame { message, buffers })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_request_frame_layout() {
        let frame = RpcFrame::new(RpcMessage::request(
            "wss://mgmt:443/rpc/-1".into(),
            "account_api",
            "read_account",
            Some(json!({"email": "admin@noobaa.io"})),
            Some("token".into()),
        ));
        let encoded = frame.encode().expect("encode");

        assert_eq!(&encoded[..4], &RPC_VERSION_NUMBER.to_be_bytes());
        let body_len = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(body_len as usize, encoded.len() - 8);

        let body: Value = serde_json::from_slice(&encoded[8..]).expect("json body");
        assert_eq!(body["op"], "req");
        assert_eq!(body["api"], "account_api");
        assert_eq!(body["method"], "read_account");
        assert_eq!(body["reqid"], "wss://mgmt:443/rpc/-1");
        assert_eq!(body["auth_token"], "token");
        assert!(body.get("buffers").is_none());
        assert!(body.get("error").is_none());
    }

    #[test]
    fn test_buffers_are_sliced_in_order() {
        let frame = RpcFrame::new(RpcMessage::reply(Some("a-1".into()), json!({"ok": true})))
            .with_buffer("first", Bytes::from_static(b"hello"))
            .with_buffer("second", Bytes::from_static(b"world!"));
        let decoded = RpcFrame::decode(&frame.encode().expect("encode")).expect("decode");

        assert_eq!(decoded.buffer("first").map(|b| &b[..]), Some(&b"hello"[..]));
        assert_eq!(decoded.buffer("second").map(|b| &b[..]), Some(&b"world!"[..]));
        assert_eq!(decoded.message.buffers.len(), 2);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_mismatched_magic_is_rejected() {
        let mut encoded = RpcFrame::new(RpcMessage::ping("x-1".into()))
            .encode()
            .expect("encode")
            .to_vec();
        encoded[0] = 0x00;
        assert!(matches!(
            RpcFrame::decode(&encoded),
            Err(RpcError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_oversized_body_is_rejected() {
        let mut data = Vec::new();
        data.extend_from_slice(&RPC_VERSION_NUMBER.to_be_bytes());
        data.extend_from_slice(&((MAX_MSG_BODY_LEN + 1) as u32).to_be_bytes());
        data.extend_from_slice(b"{}");
        assert!(matches!(
            RpcFrame::decode(&data),
            Err(RpcError::BodyTooBig { .. })
        ));
    }

    #[test]
    fn test_short_reads() {
        assert!(matches!(
            RpcFrame::decode(&[0xba, 0x00]),
            Err(RpcError::ShortRead { expected: 8, got: 2 })
        ));

        let mut data = Vec::new();
        data.extend_from_slice(&RPC_VERSION_NUMBER.to_be_bytes());
        data.extend_from_slice(&100u32.to_be_bytes());
        data.extend_from_slice(b"{\"op\":\"ping\"}");
        assert!(matches!(
            RpcFrame::decode(&data),
            Err(RpcError::ShortRead { expected: 100, .. })
        ));

        // declared buffer longer than the trailing bytes
        let body = br#"{"op":"res","reqid":"a-1","buffers":[{"name":"data","len":10}]}"#;
        let mut data = Vec::new();
        data.extend_from_slice(&RPC_VERSION_NUMBER.to_be_bytes());
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body);
        data.extend_from_slice(b"abc");
        assert!(matches!(
            RpcFrame::decode(&data),
            Err(RpcError::ShortRead { .. })
        ));
    }

    #[test]
    fn test_huge_buffer_len_is_a_short_read() {
        let body = format!(
            r#"{{"op":"res","reqid":"a-1","buffers":[{{"name":"a","len":2}},{{"name":"b","len":{}}}]}}"#,
            usize::MAX
        );
        let mut data = Vec::new();
        data.extend_from_slice(&RPC_VERSION_NUMBER.to_be_bytes());
        data.extend_from_slice(&(body.len() as u32).to_be_bytes());
        data.extend_from_slice(body.as_bytes());
        data.extend_from_slice(b"abc");
        assert!(matches!(
            RpcFrame::decode(&data),
            Err(RpcError::ShortRead { expected: usize::MAX, got }) if got == body.len() + 3
        ));
    }

    #[test]
    fn test_error_reply_into_result() {
        let message = RpcMessage::error_reply(
            Some("a-2".into()),
            "NO_SUCH_ACCOUNT",
            "account not found".into(),
        );
        let err = message.into_result().expect_err("error reply");
        assert!(err.is_rpc_code("NO_SUCH_ACCOUNT"));

        let message = RpcMessage::reply(Some("a-3".into()), json!([1, 2]));
        assert_eq!(message.into_result().expect("reply"), json!([1, 2]));
    }
}
