use thiserror::Error;

pub const RPC_CODE_INTERNAL_ERROR: &str = "INTERNAL_ERROR";
pub const RPC_CODE_NO_SUCH_BUCKET: &str = "NO_SUCH_BUCKET";
pub const RPC_CODE_NO_SUCH_ACCOUNT: &str = "NO_SUCH_ACCOUNT";
pub const RPC_CODE_NO_SUCH_POOL: &str = "NO_SUCH_POOL";
pub const RPC_CODE_NO_SUCH_NAMESPACE_RESOURCE: &str = "NO_SUCH_NAMESPACE_RESOURCE";
pub const RPC_CODE_BUCKET_ALREADY_EXISTS: &str = "BUCKET_ALREADY_EXISTS";
pub const RPC_CODE_BUCKET_ALREADY_OWNED_BY_YOU: &str = "BUCKET_ALREADY_OWNED_BY_YOU";
pub const RPC_CODE_ACCOUNT_ALREADY_EXISTS: &str = "ACCOUNT_ALREADY_EXISTS";
pub const RPC_CODE_CONNECTION_ALREADY_EXIST: &str = "CONNECTION_ALREADY_EXIST";
pub const RPC_CODE_IN_USE: &str = "IN_USE";
pub const RPC_CODE_UNAUTHORIZED: &str = "UNAUTHORIZED";

/// Errors returned by [`crate::client::RpcClient`] calls.
///
/// Everything except [`RpcError::Rpc`] is produced locally by the transport.
/// Server sent errors carry the `rpc_code` verbatim so callers can branch on it.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc transport error: {0}")]
    Transport(String),

    #[error("rpc connection closed")]
    ConnectionClosed,

    #[error("rpc version mismatch: got {got:#010x}, expected {expected:#010x}")]
    VersionMismatch { got: u32, expected: u32 },

    #[error("rpc message body too big: {len} bytes (max {max})")]
    BodyTooBig { len: usize, max: usize },

    #[error("rpc short read: expected {expected} bytes, got {got}")]
    ShortRead { expected: usize, got: usize },

    #[error("rpc call timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("rpc call cancelled")]
    Cancelled,

    #[error("invalid rpc address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("rpc json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("rpc http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("rpc error {rpc_code}: {message}")]
    Rpc { rpc_code: String, message: String },
}

impl RpcError {
    /// The server sent `rpc_code`, if this is a server side error.
    pub fn rpc_code(&self) -> Option<&str> {
        match self {
            RpcError::Rpc { rpc_code, .. } => Some(rpc_code.as_str()),
            _ => None,
        }
    }

    pub fn is_rpc_code(&self, code: &str) -> bool {
        self.rpc_code() == Some(code)
    }

    /// Local transport failures are always worth retrying. Server errors are
    /// retried too unless the caller swallowed them already.
    pub fn is_temporary(&self) -> bool {
        !matches!(self, RpcError::InvalidAddress { .. })
    }

    /// True for errors produced by the transport itself rather than by the server.
    pub fn is_transport(&self) -> bool {
        !matches!(self, RpcError::Rpc { .. })
    }
}

pub type Result<T, E = RpcError> = std::result::Result<T, E>;

/// Swallows `NO_SUCH_*` style errors on delete paths: returns `Ok(None)` when
/// the error carries one of `codes`.
pub fn ignore_codes<T>(result: Result<T>, codes: &[&str]) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if codes.iter().any(|code| err.is_rpc_code(code)) => Ok(None),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_code_is_surfaced() {
        let err = RpcError::Rpc {
            rpc_code: RPC_CODE_NO_SUCH_BUCKET.into(),
            message: "bucket not found".into(),
        };
        assert_eq!(err.rpc_code(), Some(RPC_CODE_NO_SUCH_BUCKET));
        assert!(err.is_rpc_code(RPC_CODE_NO_SUCH_BUCKET));
        assert!(!err.is_transport());
        assert_eq!(err.to_string(), "rpc error NO_SUCH_BUCKET: bucket not found");
    }

    #[test]
    fn test_transport_errors_are_temporary() {
        assert!(RpcError::ConnectionClosed.is_temporary());
        assert!(RpcError::ConnectionClosed.is_transport());
        assert!(RpcError::Timeout(std::time::Duration::from_secs(1)).is_temporary());
        assert!(
            !RpcError::InvalidAddress {
                address: "ftp://x".into(),
                reason: "scheme".into()
            }
            .is_temporary()
        );
    }

    #[test]
    fn test_ignore_codes() {
        let missing: Result<()> = Err(RpcError::Rpc {
            rpc_code: RPC_CODE_NO_SUCH_POOL.into(),
            message: "gone".into(),
        });
        assert!(matches!(
            ignore_codes(missing, &[RPC_CODE_NO_SUCH_POOL]),
            Ok(None)
        ));

        let other: Result<()> = Err(RpcError::Rpc {
            rpc_code: RPC_CODE_IN_USE.into(),
            message: "busy".into(),
        });
        assert!(ignore_codes(other, &[RPC_CODE_NO_SUCH_POOL]).is_err());

        assert!(matches!(
            ignore_codes(Ok(5), &[RPC_CODE_NO_SUCH_POOL]),
            Ok(Some(5))
        ));
    }
}
