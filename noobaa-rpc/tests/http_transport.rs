mod common;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use common::{FakeHttpRpcServer, setup_tracing};
use noobaa_rpc::{ConnectionPool, NoobaaApi, RpcClient, RpcError, ServiceRouter, Timeouts};

#[tokio::test]
async fn test_http_call_parses_body_and_buffers() -> Result<()> {
    setup_tracing(Some("=DEBUG".into()));
    let server = FakeHttpRpcServer::start().await?;
    let client = RpcClient::with_pool(
        Arc::new(ServiceRouter::single(server.address.clone())),
        ConnectionPool::default(),
    )?;

    let frame = client.call_raw("system_api", "read_system", None).await?;
    assert_eq!(frame.buffer("blob").map(|b| &b[..]), Some(&b"payload"[..]));

    let system = client.read_system().await?;
    assert_eq!(system.name, "noobaa");
    assert_eq!(system.pool("bs1").map(|p| p.mode.as_str()), Some("OPTIMAL"));

    assert_eq!(
        *server.calls.methods.lock().unwrap(),
        vec!["system_api.read_system", "system_api.read_system"]
    );
    Ok(())
}

#[tokio::test]
async fn test_http_server_error_is_typed() -> Result<()> {
    let server = FakeHttpRpcServer::start().await?;
    let client = RpcClient::with_pool(
        Arc::new(ServiceRouter::single(server.address.clone())),
        ConnectionPool::default(),
    )?;

    let err = client.read_bucket("missing").await.unwrap_err();
    assert!(err.is_rpc_code("NO_SUCH_BUCKET"));
    Ok(())
}

#[tokio::test]
async fn test_http_unreachable_is_temporary() -> Result<()> {
    let client = RpcClient::with_pool(
        Arc::new(ServiceRouter::single("http://127.0.0.1:1/rpc/")),
        ConnectionPool::default(),
    )?;
    let err = client.read_auth().await.unwrap_err();
    assert!(err.is_transport());
    assert!(err.is_temporary());
    Ok(())
}

#[tokio::test]
async fn test_http_timeout_is_a_timeout() -> Result<()> {
    let server = FakeHttpRpcServer::start().await?;
    let timeouts = Timeouts {
        send: Duration::from_millis(200),
        ..Timeouts::default()
    };
    let client = RpcClient::with_pool(
        Arc::new(ServiceRouter::single(server.address.clone())),
        ConnectionPool::new(timeouts),
    )?;

    let err = client.read_auth().await.unwrap_err();
    assert!(
        matches!(err, RpcError::Timeout(after) if after == Duration::from_millis(200)),
        "{err:?}"
    );
    assert!(err.is_temporary());
    Ok(())
}
