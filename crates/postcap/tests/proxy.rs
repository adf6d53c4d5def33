//! Drive the built-in proxy against an in-process upstream.

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use postcap::proxy::ProxyServer;
use postcap::{CaptureStore, DomainFilter, EventDispatcher, Normalizer};
use serde_json::Value;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

async fn echo_path(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    let body = serde_json::json!({ "path": req.uri().path() }).to_string();
    Ok(Response::builder()
        .status(200)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .unwrap())
}

async fn start_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service_fn(echo_path))
                    .await;
            });
        }
    });
    addr
}

struct RunningProxy {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningProxy {
    /// Stop the proxy; queued flows are applied before this returns.
    async fn stop(self) {
        self.shutdown.send(()).unwrap();
        self.handle.await.unwrap().unwrap();
    }
}

async fn start_proxy(output: &Path) -> RunningProxy {
    let store = Arc::new(CaptureStore::new("Local", output));
    let dispatcher = Arc::new(EventDispatcher::new(
        DomainFilter::new("127.0.0.1").unwrap(),
        Normalizer::default(),
        store,
    ));
    let server = ProxyServer::bind("127.0.0.1:0".parse().unwrap(), dispatcher)
        .await
        .unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(server.run_until(async move {
        let _ = rx.await;
    }));
    RunningProxy {
        addr,
        shutdown,
        handle,
    }
}

fn client_via(proxy: SocketAddr) -> reqwest::Client {
    reqwest::Client::builder()
        .proxy(reqwest::Proxy::http(format!("http://{proxy}")).unwrap())
        .build()
        .unwrap()
}

fn read_collection(path: &Path) -> Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

fn request_names(folder: &Value) -> Vec<String> {
    folder["item"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[tokio::test]
async fn test_proxy_captures_in_scope_traffic() {
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Local.json");
    let proxy = start_proxy(&output).await;
    let client = client_via(proxy.addr);

    // Same upstream under a name outside the target domain.
    let filtered = client
        .get(format!("http://localhost:{}/health", upstream.port()))
        .send()
        .await
        .unwrap();
    assert_eq!(filtered.status(), 200);

    for id in [42, 43] {
        let response = client
            .get(format!("http://{upstream}/users/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["path"], format!("/users/{id}"));
    }

    proxy.stop().await;

    let doc = read_collection(&output);
    assert_eq!(doc["info"]["name"], "Local");
    let top = doc["item"].as_array().unwrap();
    assert_eq!(top.len(), 1);
    assert_eq!(top[0]["name"], "users");
    assert_eq!(request_names(&top[0]), vec!["GET /users/{id}"]);
    assert_eq!(
        top[0]["item"][0]["request"]["url"]["raw"],
        format!("http://{upstream}/users/43")
    );
    assert_eq!(
        top[0]["item"][0]["response"][0]["body"],
        r#"{"path":"/users/43"}"#
    );
}

#[tokio::test]
async fn test_sequential_calls_keep_latest_example() {
    const N: usize = 20;
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Local.json");
    let proxy = start_proxy(&output).await;
    let client = client_via(proxy.addr);

    for id in 0..N {
        let response = client
            .get(format!("http://{upstream}/items/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }
    proxy.stop().await;

    let doc = read_collection(&output);
    let items = &doc["item"][0];
    assert_eq!(request_names(items), vec!["GET /items/{id}"]);
    let last = N - 1;
    assert_eq!(
        items["item"][0]["request"]["url"]["raw"],
        format!("http://{upstream}/items/{last}")
    );
    assert_eq!(
        items["item"][0]["response"][0]["body"],
        format!(r#"{{"path":"/items/{last}"}}"#)
    );
}

#[tokio::test]
async fn test_proxy_reports_unreachable_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Local.json");
    let proxy = start_proxy(&output).await;
    let client = client_via(proxy.addr);

    // Bind then drop to get a port nothing listens on.
    let closed = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let response = client
        .get(format!("http://{closed}/gone"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    // A flow without a response is never captured.
    proxy.stop().await;
    assert!(!output.exists());
}

#[tokio::test]
async fn test_connect_is_tunnelled_without_capture() {
    let upstream = start_upstream().await;
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("Local.json");
    let proxy = start_proxy(&output).await;

    let mut stream = TcpStream::connect(proxy.addr).await.unwrap();
    stream
        .write_all(format!("CONNECT {upstream} HTTP/1.1\r\nHost: {upstream}\r\n\r\n").as_bytes())
        .await
        .unwrap();

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        stream.read_exact(&mut byte).await.unwrap();
        head.push(byte[0]);
    }
    assert!(String::from_utf8_lossy(&head).starts_with("HTTP/1.1 200"));

    stream
        .write_all(b"GET /tunnel HTTP/1.1\r\nHost: 127.0.0.1\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut rest = Vec::new();
    stream.read_to_end(&mut rest).await.unwrap();
    assert!(String::from_utf8_lossy(&rest).contains(r#"{"path":"/tunnel"}"#));

    proxy.stop().await;
    assert!(!output.exists());
}
