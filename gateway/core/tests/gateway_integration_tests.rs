// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! End-to-end tests: a real gateway listener in front of an in-process fake
//! Docker daemon that records every request and counts every connection.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dockgate_core::domain::gateway_config::BackendTarget;
use dockgate_core::domain::policy::container_create_policy;
use dockgate_core::infrastructure::connector_for;
use dockgate_core::presentation::{serve, Listener};
use dockgate_core::Gateway;
use http::header::{CONNECTION, CONTENT_LENGTH, TRANSFER_ENCODING, UPGRADE};
use http::{HeaderMap, Method, Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::ext::ReasonPhrase;
use hyper::server::conn::http1 as server_http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UnixStream};
use tokio::sync::{mpsc, oneshot, Mutex};

// ============================================================================
// Fake backend
// ============================================================================

#[derive(Debug)]
struct Recorded {
    method: Method,
    uri: String,
    headers: HeaderMap,
    body: Bytes,
}

struct FakeBackend {
    addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    requests: Mutex<mpsc::UnboundedReceiver<Recorded>>,
}

impl FakeBackend {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connections = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = mpsc::unbounded_channel();

        let counter = connections.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    return;
                };
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let service = service_fn(move |req| backend_reply(req, tx.clone()));
                    let _ = server_http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), service)
                        .with_upgrades()
                        .await;
                });
            }
        });

        Self {
            addr,
            connections,
            requests: Mutex::new(rx),
        }
    }

    fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    async fn next_request(&self) -> Recorded {
        self.requests.lock().await.recv().await.unwrap()
    }
}

/// Docker-ish behaviour: `/attach` upgrades and echoes, `/containers/missing`
/// is a 404, `/containers/create` is a 201, everything else a 200.
async fn backend_reply(
    mut req: Request<Incoming>,
    tx: mpsc::UnboundedSender<Recorded>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let path = req.uri().path().to_string();

    if path.starts_with("/containers/missing") {
        let mut res = Response::new(Full::new(Bytes::from_static(b"{\"message\":\"No such container\"}")));
        *res.status_mut() = StatusCode::NOT_FOUND;
        return Ok(res);
    }

    if path.ends_with("/attach") && req.headers().contains_key(UPGRADE) {
        let on_upgrade = hyper::upgrade::on(&mut req);
        tokio::spawn(async move {
            if let Ok(upgraded) = on_upgrade.await {
                let mut io = TokioIo::new(upgraded);
                let mut buf = [0u8; 4];
                if io.read_exact(&mut buf).await.is_ok() {
                    let _ = io.write_all(&buf).await;
                }
            }
        });
        let mut res = Response::new(Full::new(Bytes::new()));
        *res.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        res.headers_mut().insert(CONNECTION, "Upgrade".parse().unwrap());
        res.headers_mut().insert(UPGRADE, "tcp".parse().unwrap());
        res.extensions_mut().insert(ReasonPhrase::from_static(b"UPGRADED"));
        return Ok(res);
    }

    let method = req.method().clone();
    let uri = req.uri().to_string();
    let headers = req.headers().clone();
    let body = req.into_body().collect().await.unwrap().to_bytes();
    let _ = tx.send(Recorded {
        method,
        uri,
        headers,
        body,
    });

    let mut res = if path.ends_with("/containers/create") {
        let mut res = Response::new(Full::new(Bytes::from_static(b"{\"Id\":\"abc123\",\"Warnings\":[]}")));
        *res.status_mut() = StatusCode::CREATED;
        res
    } else {
        Response::new(Full::new(Bytes::from_static(b"backend body")))
    };
    res.headers_mut().insert("x-backend", "fake".parse().unwrap());
    Ok(res)
}

// ============================================================================
// Gateway and client helpers
// ============================================================================

async fn start_gateway(backend: SocketAddr, limit: usize) -> SocketAddr {
    let connector = connector_for(&BackendTarget::Tcp(backend.to_string()));
    let gateway = Arc::new(Gateway::new(Arc::new(container_create_policy()), connector, limit));
    let listener = Listener::bind_tcp("127.0.0.1:0").await.unwrap();
    let addr = listener.tcp_addr().unwrap();
    tokio::spawn(serve(listener, gateway, std::future::pending()));
    addr
}

struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    reason: Option<Vec<u8>>,
    body: Bytes,
}

impl Reply {
    fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send_over<S>(stream: S, req: Request<Full<Bytes>>) -> Result<Reply, hyper::Error>
where
    S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream)).await?;
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let res = sender.send_request(req).await?;
    let (parts, body) = res.into_parts();
    let body = body.collect().await?.to_bytes();
    Ok(Reply {
        status: parts.status,
        reason: parts.extensions.get::<ReasonPhrase>().map(|r| r.as_bytes().to_vec()),
        headers: parts.headers,
        body,
    })
}

async fn send(gateway: SocketAddr, req: Request<Full<Bytes>>) -> Result<Reply, hyper::Error> {
    send_over(TcpStream::connect(gateway).await.unwrap(), req).await
}

fn create(uri: &str, body: impl Into<Bytes>) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("host", "docker")
        .header("content-type", "application/json")
        .body(Full::new(body.into()))
        .unwrap()
}

/// A create payload serialising to exactly `len` bytes.
fn payload_of_len(len: usize) -> String {
    let padding = len - r#"{"Image":""}"#.len();
    format!(r#"{{"Image":"{}"}}"#, "a".repeat(padding))
}

// ============================================================================
// Protected path
// ============================================================================

#[tokio::test]
async fn test_empty_object_forwarded_and_status_relayed() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(gateway, create("/containers/create", "{}")).await.unwrap();
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(reply.json()["Id"], "abc123");

    let recorded = backend.next_request().await;
    assert_eq!(recorded.method, Method::POST);
    assert_eq!(&recorded.body[..], b"{}");
}

#[tokio::test]
async fn test_empty_mac_address_passes() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(gateway, create("/v1.41/containers/create", r#"{"MacAddress": ""}"#))
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::CREATED);

    let recorded = backend.next_request().await;
    assert_eq!(recorded.uri, "/v1.41/containers/create");
    let forwarded: Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(forwarded, json!({"MacAddress": ""}));
}

#[tokio::test]
async fn test_mac_address_rejected_without_backend_contact() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(
        gateway,
        create("/containers/create", r#"{"MacAddress": "aa:bb:cc:dd:ee:ff"}"#),
    )
    .await
    .unwrap();

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.headers[CONNECTION], "close");
    assert_eq!(reply.headers["content-type"], "application/json");
    assert_eq!(reply.reason.as_deref(), Some(&b"Forbidden Container Configuration"[..]));

    let body = reply.json();
    assert_eq!(body["message"], "Forbidden container configuration");
    assert_eq!(
        body["errors"],
        json!([{
            "field": "data.MacAddress",
            "message": "must be an enum value",
            "value": "aa:bb:cc:dd:ee:ff"
        }])
    );
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn test_privileged_rejected() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(
        gateway,
        create("/containers/create", r#"{"HostConfig": {"Privileged": true}}"#),
    )
    .await
    .unwrap();

    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    let errors = reply.json()["errors"].clone();
    assert_eq!(errors.as_array().unwrap().len(), 1);
    assert_eq!(errors[0]["field"], "data.HostConfig.Privileged");
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn test_security_opts_null_passes_zero_fails() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let ok = send(gateway, create("/containers/create", r#"{"SecurityOpts": null}"#))
        .await
        .unwrap();
    assert_eq!(ok.status, StatusCode::CREATED);

    let rejected = send(gateway, create("/containers/create", r#"{"SecurityOpts": 0}"#))
        .await
        .unwrap();
    assert_eq!(rejected.status, StatusCode::FORBIDDEN);
    assert_eq!(rejected.json()["errors"][0]["field"], "data.SecurityOpts");
}

#[tokio::test]
async fn test_invalid_json_is_400_not_403() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    // Would also violate policy if it parsed.
    let reply = send(gateway, create("/containers/create", r#"{"Privileged": true,"#))
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::BAD_REQUEST);
    assert!(reply.body.is_empty());
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn test_body_at_ceiling_accepted() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 64).await;

    let reply = send(gateway, create("/containers/create", payload_of_len(64)))
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::CREATED);
    assert_eq!(backend.connections(), 1);
}

#[tokio::test]
async fn test_body_past_ceiling_is_413_without_backend_contact() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 64).await;

    let reply = send(gateway, create("/containers/create", payload_of_len(65)))
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.headers[CONNECTION], "close");
    assert!(reply.body.is_empty());
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn test_filtered_body_reaches_backend_with_fixed_length() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 4096).await;

    let payload = json!({
        "Image": "alpine",
        "Cmd": ["sh"],
        "Injected": {"anything": true},
        "HostConfig": {"ReadonlyRootfs": true, "Sysctls": {"net.ipv4.ip_forward": "1"}}
    });
    let req = Request::builder()
        .method(Method::POST)
        .uri("//v1.24//containers//create?name=web")
        .header("x-registry-auth", "token")
        .body(Full::new(Bytes::from(payload.to_string())))
        .unwrap();

    let reply = send(gateway, req).await.unwrap();
    assert_eq!(reply.status, StatusCode::CREATED);

    let recorded = backend.next_request().await;
    assert_eq!(recorded.uri, "//v1.24//containers//create?name=web");
    assert_eq!(recorded.headers["x-registry-auth"], "token");
    assert!(recorded.headers.get(TRANSFER_ENCODING).is_none());
    assert_eq!(
        recorded.headers[CONTENT_LENGTH],
        recorded.body.len().to_string().as_str()
    );

    let forwarded: Value = serde_json::from_slice(&recorded.body).unwrap();
    assert_eq!(
        forwarded,
        json!({"Image": "alpine", "Cmd": ["sh"], "HostConfig": {"ReadonlyRootfs": true}})
    );
}

#[tokio::test]
async fn test_percent_encoded_create_path_is_protected() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(
        gateway,
        create("/containers%2Fcreate", r#"{"HostConfig": {"Privileged": true}}"#),
    )
    .await
    .unwrap();
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(backend.connections(), 0);
}

// ============================================================================
// Transparent path
// ============================================================================

#[tokio::test]
async fn test_transparent_request_passes_through_unchanged() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 8).await;

    let req = Request::builder()
        .method(Method::GET)
        .uri("/info?verbose=1")
        .header("host", "docker")
        .header("x-custom", "kept as is")
        .body(Full::new(Bytes::from_static(b"{\"HostConfig\":{\"Privileged\":true}}")))
        .unwrap();

    let reply = send(gateway, req).await.unwrap();
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers["x-backend"], "fake");
    assert_eq!(&reply.body[..], b"backend body");

    let recorded = backend.next_request().await;
    assert_eq!(recorded.method, Method::GET);
    assert_eq!(recorded.uri, "/info?verbose=1");
    assert_eq!(recorded.headers["x-custom"], "kept as is");
    assert_eq!(&recorded.body[..], b"{\"HostConfig\":{\"Privileged\":true}}");
}

#[tokio::test]
async fn test_backend_error_status_relayed() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let req = Request::builder()
        .uri("/containers/missing/json")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let reply = send(gateway, req).await.unwrap();
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "No such container");
}

#[tokio::test]
async fn test_unreachable_backend_aborts_client() {
    // Bind then drop so the port is very likely closed.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap();
    let gateway = start_gateway(closed, 1024).await;

    let result = send(gateway, create("/containers/create", "{}")).await;
    assert!(result.is_err(), "client must see an aborted connection, not a response");
}

/// Backend that answers with the head and first chunk of a chunked body,
/// then hangs up before the terminating chunk.
async fn start_truncating_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut head = Vec::new();
        let mut buf = [0u8; 1024];
        while !head.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                return;
            }
            head.extend_from_slice(&buf[..n]);
        }
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ntransfer-encoding: chunked\r\n\r\n5\r\nhello\r\n")
            .await
            .unwrap();
        stream.flush().await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_backend_failure_mid_body_truncates_client_reply() {
    let backend = start_truncating_backend().await;
    let gateway = start_gateway(backend, 1024).await;

    let stream = TcpStream::connect(gateway).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.await;
    });

    let req = Request::builder()
        .uri("/containers/abc/logs?follow=1")
        .header("host", "docker")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let res = sender.send_request(req).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = res.into_body().collect().await;
    assert!(body.is_err(), "a truncated backend body must not complete cleanly");
}

// ============================================================================
// Upgrades
// ============================================================================

fn attach(uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("host", "docker")
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, "tcp")
        .body(Full::new(Bytes::new()))
        .unwrap()
}

#[tokio::test]
async fn test_upgrade_on_protected_path_forbidden() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(gateway, attach("/v1.41/containers/create")).await.unwrap();
    assert_eq!(reply.status, StatusCode::FORBIDDEN);
    assert_eq!(reply.headers[CONNECTION], "close");
    assert!(reply.body.is_empty());
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn test_transparent_upgrade_is_spliced() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let stream = TcpStream::connect(gateway).await.unwrap();
    let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
        .await
        .unwrap();
    tokio::spawn(async move {
        let _ = conn.with_upgrades().await;
    });

    let res = sender.send_request(attach("/containers/abc/attach?stream=1")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SWITCHING_PROTOCOLS);

    let upgraded = hyper::upgrade::on(res).await.unwrap();
    let mut io = TokioIo::new(upgraded);
    io.write_all(b"ping").await.unwrap();
    let mut echoed = [0u8; 4];
    io.read_exact(&mut echoed).await.unwrap();
    assert_eq!(&echoed, b"ping");
    assert_eq!(backend.connections(), 1);
}

#[tokio::test]
async fn test_declined_upgrade_relays_backend_response() {
    let backend = FakeBackend::start().await;
    let gateway = start_gateway(backend.addr, 1024).await;

    let reply = send(gateway, attach("/containers/missing/attach")).await.unwrap();
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert_eq!(reply.json()["message"], "No such container");
}

// ============================================================================
// Unix socket listener
// ============================================================================

#[tokio::test]
async fn test_unix_listener_serves_and_cleans_up() {
    let backend = FakeBackend::start().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dockgate.sock");

    let connector = connector_for(&BackendTarget::Tcp(backend.addr.to_string()));
    let gateway = Arc::new(Gateway::new(Arc::new(container_create_policy()), connector, 1024));
    let listener = Listener::bind_unix(&path).unwrap();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(serve(listener, gateway, async move {
        let _ = stop_rx.await;
    }));

    let req = Request::builder()
        .uri("/version")
        .header("host", "docker")
        .body(Full::new(Bytes::new()))
        .unwrap();
    let reply = send_over(UnixStream::connect(&path).await.unwrap(), req)
        .await
        .unwrap();
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(backend.next_request().await.uri, "/version");

    stop_tx.send(()).unwrap();
    server.await.unwrap();
    assert!(!path.exists());
}
