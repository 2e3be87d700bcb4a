//! End-to-end tests: a real listener in front of wiremock backends

use http::{Method, Request, Response, StatusCode};
use hyper::body::Incoming;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use switchyard_config::{Config, ConfigBuilder, RouteConfig};
use switchyard_core::{body, Bytes, ErrorEnvelope};
use switchyard_proxy::HttpClient;
use switchyard_runtime::Server;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use wiremock::matchers::{any, header, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestGateway {
    addr: SocketAddr,
    server: Arc<Server>,
    handle: JoinHandle<switchyard_core::Result<()>>,
    client: HttpClient,
}

impl TestGateway {
    async fn start(config: Config) -> Self {
        let server = Arc::new(Server::builder().config(config).build().unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.serve(listener).await })
        };

        Self {
            addr,
            server,
            handle,
            client: HttpClient::with_timeout(Duration::from_secs(10)),
        }
    }

    fn request(&self, method: Method, path: &str) -> http::request::Builder {
        Request::builder()
            .method(method)
            .uri(format!("http://{}{}", self.addr, path))
    }

    async fn send(&self, req: http::request::Builder) -> Response<Incoming> {
        self.client
            .send(req.body(body::empty()).unwrap(), "gateway")
            .await
            .unwrap()
    }

    async fn get(&self, path: &str) -> Response<Incoming> {
        self.send(self.request(Method::GET, path)).await
    }

    async fn stop(self) {
        self.server.shutdown_signal().trigger();
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("gateway should stop")
            .unwrap()
            .unwrap();
    }
}

async fn read_body(response: Response<Incoming>) -> Bytes {
    body::to_bytes(body::incoming(response.into_body()))
        .await
        .unwrap()
}

fn config(wallet: &MockServer, user: &MockServer) -> ConfigBuilder {
    ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .route("/api/wallet", wallet.uri())
        .route("/api/user", user.uri())
}

#[tokio::test]
async fn backend_error_is_relayed_verbatim() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/wallet/w-404"))
        .respond_with(
            ResponseTemplate::new(404)
                .insert_header("content-type", "application/json")
                .set_body_string(r#"{"error":"Wallet not found"}"#),
        )
        .expect(1)
        .mount(&wallet)
        .await;

    let gateway = TestGateway::start(config(&wallet, &user).build().unwrap()).await;

    let response = gateway.get("/api/wallet/w-404").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["content-type"], "application/json");
    assert!(response.headers().contains_key("x-content-type-options"));
    assert!(response.headers().contains_key("ratelimit-remaining"));
    assert_eq!(&read_body(response).await[..], br#"{"error":"Wallet not found"}"#);

    gateway.stop().await;
}

#[tokio::test]
async fn host_is_rewritten_and_forwarding_headers_added() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    let authority = wallet.address().to_string();

    Mock::given(method("POST"))
        .and(path("/api/wallet/transfer"))
        .and(header("host", authority.as_str()))
        .and(header("x-forwarded-for", "127.0.0.1"))
        .and(header("x-forwarded-proto", "http"))
        .and(header("x-request-id", "trace-123"))
        .and(header_exists("x-forwarded-host"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&wallet)
        .await;

    let gateway = TestGateway::start(config(&wallet, &user).build().unwrap()).await;

    let response = gateway
        .send(
            gateway
                .request(Method::POST, "/api/wallet/transfer")
                .header("x-request-id", "trace-123"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers()["x-request-id"], "trace-123");

    gateway.stop().await;
}

#[tokio::test]
async fn slow_backend_times_out_without_blocking_others() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(10)))
        .mount(&wallet)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/user/u-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("user"))
        .mount(&user)
        .await;

    let timeout = Duration::from_millis(300);
    let gateway = Arc::new(
        TestGateway::start(
            config(&wallet, &user)
                .request_timeout(timeout)
                .build()
                .unwrap(),
        )
        .await,
    );

    let slow = {
        let gateway = Arc::clone(&gateway);
        tokio::spawn(async move {
            let start = Instant::now();
            let response = gateway.get("/api/wallet/balance").await;
            (response.status(), start.elapsed())
        })
    };

    let start = Instant::now();
    let fast = gateway.get("/api/user/u-1").await;
    assert_eq!(fast.status(), StatusCode::OK);
    assert!(start.elapsed() < timeout);

    let (status, elapsed) = slow.await.unwrap();
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(elapsed >= timeout);
    assert!(elapsed < timeout + Duration::from_secs(2));

    if let Ok(gateway) = Arc::try_unwrap(gateway) {
        gateway.stop().await;
    }
}

#[tokio::test]
async fn unknown_route_never_reaches_a_backend() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    for backend in [&wallet, &user] {
        Mock::given(any())
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(backend)
            .await;
    }

    let gateway = TestGateway::start(config(&wallet, &user).build().unwrap()).await;

    let response = gateway.get("/api/unknown/x").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let envelope: ErrorEnvelope = serde_json::from_slice(&read_body(response).await).unwrap();
    assert_eq!(envelope.error, "Not Found");
    assert!(envelope.message.is_none());

    gateway.stop().await;
}

#[tokio::test]
async fn caller_disconnect_cancels_the_backend_request() {
    let backend = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend_addr = backend.local_addr().unwrap();
    let config = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .route("/api/wallet", format!("http://{backend_addr}"))
        .build()
        .unwrap();

    let gateway = TestGateway::start(config).await;

    let mut caller = TcpStream::connect(gateway.addr).await.unwrap();
    caller
        .write_all(
            format!(
                "GET /api/wallet/balance HTTP/1.1\r\nHost: {}\r\n\r\n",
                gateway.addr
            )
            .as_bytes(),
        )
        .await
        .unwrap();

    // The backend takes the request and never answers.
    let (mut upstream, _) = tokio::time::timeout(Duration::from_secs(5), backend.accept())
        .await
        .expect("request should reach the backend")
        .unwrap();
    let mut buf = vec![0u8; 4096];
    let n = upstream.read(&mut buf).await.unwrap();
    assert!(buf[..n].starts_with(b"GET /api/wallet/balance"));

    drop(caller);

    let read = tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            match upstream.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(read.is_ok(), "outbound request outlived the caller");

    gateway.stop().await;
}

#[tokio::test]
async fn unreachable_backend_is_502() {
    let user = MockServer::start().await;
    let config = ConfigBuilder::new()
        .listen("127.0.0.1:0".parse().unwrap())
        .route("/api/wallet", "http://127.0.0.1:9")
        .route("/api/user", user.uri())
        .build()
        .unwrap();

    let gateway = TestGateway::start(config).await;

    let response = gateway.get("/api/wallet/balance").await;
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    gateway.stop().await;
}

#[tokio::test]
async fn rate_limit_rejects_but_ping_still_answers() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&wallet)
        .await;

    let gateway = TestGateway::start(
        config(&wallet, &user)
            .rate_limit(2, Duration::from_secs(60))
            .build()
            .unwrap(),
    )
    .await;

    assert_eq!(gateway.get("/api/wallet/a").await.status(), StatusCode::OK);

    let second = gateway.get("/api/wallet/b").await;
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["ratelimit-remaining"], "0");

    let rejected = gateway.get("/api/wallet/c").await;
    assert_eq!(rejected.status(), StatusCode::TOO_MANY_REQUESTS);
    let retry_after: u64 = rejected.headers()["retry-after"]
        .to_str()
        .unwrap()
        .parse()
        .unwrap();
    assert!((1..=60).contains(&retry_after));
    assert!(rejected.headers().contains_key("strict-transport-security"));

    let envelope: ErrorEnvelope = serde_json::from_slice(&read_body(rejected).await).unwrap();
    assert_eq!(envelope.error, "Too Many Requests");

    let ping = gateway.get("/ping").await;
    assert_eq!(ping.status(), StatusCode::OK);
    assert_eq!(&read_body(ping).await[..], b"pong");

    gateway.stop().await;
}

#[tokio::test]
async fn preflight_is_answered_by_the_gateway() {
    let wallet = MockServer::start().await;
    let user = MockServer::start().await;
    Mock::given(any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&wallet)
        .await;

    let gateway = TestGateway::start(config(&wallet, &user).build().unwrap()).await;

    let response = gateway
        .send(
            gateway
                .request(Method::OPTIONS, "/api/wallet/transfer")
                .header("origin", "https://app.example.com")
                .header("access-control-request-method", "POST"),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.headers()["access-control-allow-origin"], "*");
    assert!(response.headers().contains_key("access-control-allow-methods"));

    gateway.stop().await;
}

#[tokio::test]
async fn routes_from_config_file_rewrite_paths() {
    let backend = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/orders/17"))
        .respond_with(ResponseTemplate::new(200).set_body_string("order"))
        .expect(1)
        .mount(&backend)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("gateway.yaml");
    std::fs::write(
        &file,
        format!(
            r#"
gateway:
  listen: "127.0.0.1:0"
  mode: development
routes:
  - prefix: /api/orders
    target: "{}"
    rewrite: /v2/orders
"#,
            backend.uri()
        ),
    )
    .unwrap();

    let config = switchyard_config::load_from_file(&file).unwrap();
    switchyard_config::validate_config(&config).unwrap();
    assert_eq!(
        config.effective_routes(),
        vec![RouteConfig {
            prefix: "/api/orders".to_string(),
            target: backend.uri(),
            rewrite: Some("/v2/orders".to_string()),
        }]
    );

    let gateway = TestGateway::start(config).await;

    let response = gateway.get("/api/orders/17").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(&read_body(response).await[..], b"order");

    let unknown = gateway.get("/api/wallet/1").await;
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);
    let envelope: ErrorEnvelope = serde_json::from_slice(&read_body(unknown).await).unwrap();
    assert!(envelope.message.unwrap().contains("/api/wallet/1"));

    gateway.stop().await;
}
