//! Integration tests for npipe-session.
//!
//! These drive real endpoints (Unix domain sockets in a temporary namespace
//! directory) through the client, server and driver.

#![cfg(unix)]

use std::path::Path;
use std::time::{Duration, Instant};

use npipe_session::transport::socket_path;
use npipe_session::{
    AccessMode, ByteChannel, Endpoint, ErrorKind, Input, Output, PipeClient, PipeMode, PipeServer,
    RelayRequest, SessionConfig, SessionDriver, TransactionRequest, WaitTimeout, WriteMode,
};

fn config_in(dir: &tempfile::TempDir) -> SessionConfig {
    SessionConfig::new()
        .namespace_dir(dir.path())
        .wait(WaitTimeout::Bounded(Duration::from_secs(5)))
}

/// Wait until a server has created its endpoint.
async fn wait_for_endpoint(path: &Path) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !path.exists() {
        assert!(Instant::now() < deadline, "endpoint {} never appeared", path.display());
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Serve one echo session on `endpoint` in the background.
fn spawn_echo(
    config: SessionConfig,
    endpoint: Endpoint,
) -> tokio::task::JoinHandle<npipe_session::Result<npipe_session::SessionReport>> {
    tokio::spawn(async move {
        let request = RelayRequest {
            endpoint,
            access: AccessMode::Duplex,
            input: Input::Pipe,
            output: Output::Pipe,
        };
        SessionDriver::new(config).serve(&request, PipeMode::byte()).await
    })
}

#[tokio::test]
async fn test_ping_pong() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::parse(r"\\.\pipe\test1").unwrap();

    let mut server = PipeServer::create(&endpoint, AccessMode::Duplex, PipeMode::byte(), &config)
        .await
        .unwrap();

    let serving = tokio::spawn(async move {
        let mut session = server.accept_one().await.unwrap();
        let mut sides = session.channels().unwrap();
        let reader = sides.reader().unwrap();
        let writer = sides.writer().unwrap();

        let mut request = Vec::new();
        let mut buf = [0u8; 64];
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
        }
        assert_eq!(request, b"PING");
        assert_eq!(writer.write(b"PONG").await.unwrap(), 4);

        session.close().await.unwrap();
        let transferred = session.bytes_transferred();
        server.close();
        transferred
    });

    let client = PipeClient::new(config.buffer_size(65535));
    let response = client.call(&endpoint, b"PING").await.unwrap();
    assert_eq!(&response[..], b"PONG");

    assert_eq!(serving.await.unwrap(), 8);
    assert!(!socket_path(&endpoint, dir.path()).exists());
}

#[tokio::test]
async fn test_echo_returns_request_verbatim() {
    let payloads: [&[u8]; 4] = [b"x", b"hello, pipe", &[0u8, 255, 10, 13, 0], &[b'a'; 4000]];

    for (i, payload) in payloads.iter().enumerate() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let endpoint = Endpoint::local(&format!("echo-{}", i)).unwrap();

        let echo = spawn_echo(config.clone(), endpoint.clone());
        wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

        let client = PipeClient::new(config);
        let response = client
            .call_with(&endpoint, payload, payload.len() + 16, WaitTimeout::from_millis(1000))
            .await
            .unwrap();
        assert_eq!(&response[..], *payload);

        let report = echo.await.unwrap().unwrap();
        assert_eq!(report.bytes, payload.len() as u64);
    }
}

#[tokio::test]
async fn test_empty_request_gets_response() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::local("empty").unwrap();

    let echo = spawn_echo(config.clone(), endpoint.clone());
    wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

    let response = PipeClient::new(config).call(&endpoint, b"").await.unwrap();
    assert!(response.is_empty());
    assert_eq!(echo.await.unwrap().unwrap().bytes, 0);
}

#[tokio::test]
async fn test_short_buffer_truncates_response() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::local("truncate").unwrap();
    let request: Vec<u8> = (0..100u8).collect();

    let echo = spawn_echo(config.clone(), endpoint.clone());
    wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

    let client = PipeClient::new(config);
    let response = client
        .call_with(&endpoint, &request, 10, WaitTimeout::Forever)
        .await
        .unwrap();
    assert_eq!(&response[..], &request[..10]);

    // The echo side may see the client hang up mid-reply.
    let _ = echo.await.unwrap();
}

#[tokio::test]
async fn test_no_listener_zero_timeout_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir).wait(WaitTimeout::from_millis(0));
    let endpoint = Endpoint::local("test1").unwrap();

    let started = Instant::now();
    let err = PipeClient::new(config)
        .call(&endpoint, b"PING")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::EndpointUnavailable);
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn test_file_relay_through_pipe() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::local("relay").unwrap();
    let input = dir.path().join("input.bin");
    let output = dir.path().join("output.bin");
    std::fs::write(&input, b"0123456789").unwrap();

    let serve_request = RelayRequest {
        endpoint: endpoint.clone(),
        access: AccessMode::WriteOnly,
        input: Input::File(input.clone()),
        output: Output::Pipe,
    };
    let server_driver = SessionDriver::new(config.clone());
    let serving = tokio::spawn(async move {
        server_driver
            .serve(&serve_request, PipeMode::byte())
            .await
    });
    wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

    let connect_request = RelayRequest {
        endpoint: endpoint.clone(),
        access: AccessMode::ReadOnly,
        input: Input::Pipe,
        output: Output::File(output.clone()),
    };
    let client_report = SessionDriver::new(config)
        .connect(&connect_request)
        .await
        .unwrap();
    let server_report = serving.await.unwrap().unwrap();

    assert_eq!(server_report.bytes, 10);
    assert_eq!(client_report.bytes, 10);
    assert_eq!(std::fs::read(&output).unwrap(), b"0123456789");
    assert!(!socket_path(&endpoint, dir.path()).exists());
}

#[tokio::test]
async fn test_transaction_flow_with_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir).write_mode(WriteMode::Strict);
    let endpoint = Endpoint::local("files").unwrap();
    let input = dir.path().join("request.bin");
    let output = dir.path().join("response.bin");
    std::fs::write(&input, b"hello through a file").unwrap();

    let echo = spawn_echo(config.clone(), endpoint.clone());
    wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

    let report = SessionDriver::new(config)
        .transact(&TransactionRequest {
            endpoint,
            input: Some(input),
            output: Some(output.clone()),
        })
        .await
        .unwrap();

    assert_eq!(report.bytes, 20);
    assert!(report.response.is_none());
    assert_eq!(std::fs::read(&output).unwrap(), b"hello through a file");
    echo.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_endpoint_reusable_after_session() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::local("reuse").unwrap();

    for round in 0..2u8 {
        let echo = spawn_echo(config.clone(), endpoint.clone());
        wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

        let response = PipeClient::new(config.clone())
            .call(&endpoint, &[round])
            .await
            .unwrap();
        assert_eq!(&response[..], &[round]);
        echo.await.unwrap().unwrap();
        assert!(!socket_path(&endpoint, dir.path()).exists());
    }
}

#[tokio::test]
async fn test_client_open_counts_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(&dir);
    let endpoint = Endpoint::local("counter").unwrap();

    let echo = spawn_echo(config.clone(), endpoint.clone());
    wait_for_endpoint(&socket_path(&endpoint, dir.path())).await;

    let mut session = PipeClient::new(config)
        .open(&endpoint, AccessMode::Duplex)
        .await
        .unwrap();
    {
        let mut sides = session.channels().unwrap();
        let writer = sides.writer().unwrap();
        assert_eq!(writer.write(b"abc").await.unwrap(), 3);
        writer.close().await.unwrap();

        let reader = sides.reader().unwrap();
        let mut buf = [0u8; 8];
        let mut received = Vec::new();
        loop {
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, b"abc");
    }
    assert_eq!(session.bytes_transferred(), 6);
    session.close().await.unwrap();
    echo.await.unwrap().unwrap();
}
