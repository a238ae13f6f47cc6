//! Shared helpers for integration tests
//!
//! Requests are driven straight through `handle_request`; backends are
//! throwaway hyper servers bound to 127.0.0.1:0.

#![allow(dead_code)]

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::net::TcpListener;

use paramita_gateway::server::handle_request;
use paramita_gateway::{AppState, Args};

pub const TEST_SECRET: &str = "integration-test-secret-that-is-long-enough";

pub const SERVICES: [&str; 6] = [
    "auth",
    "assessment",
    "user",
    "content",
    "analytics",
    "notification",
];

/// A gateway over a temporary data directory
pub struct TestGateway {
    pub state: Arc<AppState>,
    pub tmp: TempDir,
}

/// Status, headers and parsed JSON body
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestGateway {
    /// Gateway whose backends all point at `services` overrides, or at a
    /// port nothing listens on
    pub async fn new(services: &[(&str, &str)], extra_args: &[&str]) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        let dead = unreachable_url().await;

        let mut argv: Vec<String> = vec![
            "paramita-gateway".into(),
            "--data-dir".into(),
            tmp.path().display().to_string(),
            "--user-data-path".into(),
            tmp.path().join("users").display().to_string(),
            "--jwt-secret".into(),
            TEST_SECRET.into(),
            "--health-probe-timeout-ms".into(),
            "300".into(),
        ];
        for name in SERVICES {
            let url = services
                .iter()
                .find(|(service, _)| *service == name)
                .map(|(_, url)| url.to_string())
                .unwrap_or_else(|| dead.clone());
            argv.push(format!("--{name}-service-url"));
            argv.push(url);
        }
        argv.extend(extra_args.iter().map(|s| s.to_string()));

        let args = Args::try_parse_from(argv).unwrap();
        args.validate().unwrap();

        Self {
            state: Arc::new(AppState::new(args).unwrap()),
            tmp,
        }
    }

    pub async fn send(&self, req: Request<Full<Bytes>>) -> TestResponse {
        self.send_from(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10)), req).await
    }

    pub async fn send_from(&self, ip: IpAddr, req: Request<Full<Bytes>>) -> TestResponse {
        let addr = SocketAddr::new(ip, 40000);
        let response = handle_request(Arc::clone(&self.state), addr, req).await;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).to_string())
            })
        };

        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Register a user through the function endpoint and return (id, token)
    pub async fn register(&self, email: &str, password: &str) -> (String, String) {
        let response = self
            .send(post_json(
                "/functions/auth?action=register",
                json!({
                    "email": email,
                    "password": password,
                    "firstName": "Test",
                    "lastName": "Seeker",
                }),
            ))
            .await;
        assert_eq!(response.status, StatusCode::CREATED, "{:?}", response.body);
        (
            response.body["user"]["id"].as_str().unwrap().to_string(),
            response.body["token"].as_str().unwrap().to_string(),
        )
    }

    /// Grant roles by editing the stored record directly
    pub async fn grant_roles(&self, user_id: &str, roles: &[&str]) {
        let mut user = self.state.store.find(user_id).await.unwrap().unwrap();
        user.roles = roles.iter().map(|r| r.to_string()).collect();
        self.state.store.save(&user).await.unwrap();
    }
}

pub fn get(path: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn get_with_token(path: &str, token: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::GET)
        .uri(path)
        .header("authorization", format!("Bearer {token}"))
        .body(Full::new(Bytes::new()))
        .unwrap()
}

pub fn post_json(path: &str, body: Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

pub fn post_json_with_token(path: &str, token: &str, body: Value) -> Request<Full<Bytes>> {
    Request::builder()
        .method(Method::POST)
        .uri(path)
        .header("content-type", "application/json")
        .header("authorization", format!("Bearer {token}"))
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

/// A running echo backend
pub struct Backend {
    pub url: String,
    pub hits: Arc<AtomicUsize>,
}

impl Backend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Backend that answers every request with a JSON echo of what it received
pub async fn spawn_echo_backend() -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let counter = Arc::clone(&counter);
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<Incoming>| {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Infallible>(echo(req).await)
                    }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await;
            });
        }
    });

    Backend {
        url: format!("http://{addr}"),
        hits,
    }
}

async fn echo(req: Request<Incoming>) -> Response<Full<Bytes>> {
    let (parts, body) = req.into_parts();
    let body = body.collect().await.map(|b| b.to_bytes()).unwrap_or_default();

    let headers: serde_json::Map<String, Value> = parts
        .headers
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                Value::String(v.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    let payload = json!({
        "method": parts.method.as_str(),
        "path": parts.uri.path(),
        "query": parts.uri.query(),
        "headers": headers,
        "body": String::from_utf8_lossy(&body),
        "version": "test-backend",
    });

    let mut response = Response::new(Full::new(Bytes::from(payload.to_string())));
    response.headers_mut().insert(
        "content-type",
        hyper::header::HeaderValue::from_static("application/json"),
    );
    response
}

/// Backend that accepts connections and never answers
pub async fn spawn_hanging_backend() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    format!("http://{addr}")
}

/// URL of a port that was just released, so connects are refused
pub async fn unreachable_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}
