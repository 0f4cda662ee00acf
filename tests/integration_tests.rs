//! End-to-end tests: the demo service over a real HTTP listener.

use std::time::Duration;

use modrpc::app::{AppConfig, build_service};
use modrpc::demo::MAX_BYTES_LEN;
use modrpc_server::handlers::RequestLimiterConfig;
use modrpc_server::{ServiceConfig, WebService};
use modrpc_transport::{HttpTransport, HttpTransportConfig};
use serde_json::{Value, json};

async fn start(config: AppConfig) -> (WebService<HttpTransport>, String) {
    let service = build_service(&config).unwrap();
    service.start().await.unwrap();
    let url = format!("http://127.0.0.1:{}/", service.transport().port());
    (service, url)
}

fn test_config() -> AppConfig {
    AppConfig {
        transport: HttpTransportConfig {
            port: 0,
            ..HttpTransportConfig::default()
        },
        service: ServiceConfig { workers: 4 },
        timeout: Duration::from_secs(1),
        ..AppConfig::default()
    }
}

async fn rpc(client: &reqwest::Client, url: &str, module: &str, method: &str, args: Value) -> reqwest::Response {
    client
        .post(url)
        .query(&[("module", module), ("method", method)])
        .json(&args)
        .send()
        .await
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn calls_a_module_over_http() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let response = rpc(&client, &url, "Calculator", "Add", json!([1, 2])).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "result": 3.0 }));

    let response = rpc(&client, &url, "calculator", "stats", json!([[1, 2, 3]])).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["count"], 3);
    assert_eq!(body["result"]["mean"], 2.0);

    service.stop().await.unwrap();
    assert_eq!(service.active_workers(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn errors_are_rendered_as_exceptions() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let response = rpc(&client, &url, "Invalid", "Add", json!([1, 2])).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["exception"]["typeName"], "ModuleNotFound");

    let response = rpc(&client, &url, "Calculator", "Add", json!([1])).await;
    assert_eq!(response.status(), 400);

    let response = rpc(&client, &url, "Calculator", "Divide", json!([1, 0])).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["exception"]["typeName"], "DivideByZero");
    assert_eq!(body["exception"]["data"]["dividend"], 1.0);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn preflight_and_schema() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .request(reqwest::Method::OPTIONS, &url)
        .header("Origin", "https://app.example")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(
        response.headers()["access-control-allow-headers"],
        "Content-Type, Authorization"
    );

    let response = client.get(&url).query(&[("module", "Session")]).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["module"], "Session");
    let sleep = body["methods"]
        .as_array()
        .unwrap()
        .iter()
        .find(|m| m["id"] == "Sleep")
        .unwrap();
    assert_eq!(sleep["longRunning"], true);
    assert_eq!(sleep["returns"], "asyncNone");

    // Anything else reaches the dispatch handler, which only takes POST.
    let response = client
        .get(&url)
        .query(&[("module", "Session"), ("method", "WhoAmI")])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn session_and_binary_results() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let response = client
        .post(&url)
        .query(&[("module", "Session"), ("method", "WhoAmI"), ("session", "s-42")])
        .json(&json!([]))
        .send()
        .await
        .unwrap();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["session"], "s-42");
    assert!(body["result"]["remote"].as_str().unwrap().starts_with("127.0.0.1:"));

    let response = rpc(&client, &url, "Session", "Bytes", json!([300])).await;
    assert_eq!(response.headers()["content-type"], "application/octet-stream");
    let bytes = response.bytes().await.unwrap();
    assert_eq!(bytes.len(), 300);
    assert_eq!(bytes[257], 1);

    let response = rpc(&client, &url, "Session", "Bytes", json!([4398046511104_u64])).await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["exception"]["typeName"], "TooLarge");
    assert_eq!(body["exception"]["data"]["limit"], MAX_BYTES_LEN);

    // The worker that rejected it keeps serving.
    let response = rpc(&client, &url, "Calculator", "Add", json!([1, 1])).await;
    assert_eq!(response.status(), 200);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_calls_time_out() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let started = std::time::Instant::now();
    let response = rpc(&client, &url, "Session", "Sleep", json!([10_000])).await;
    assert_eq!(response.status(), 408);
    assert!(started.elapsed() < Duration::from_secs(5));

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn rate_limit_applies_per_address() {
    let config = AppConfig {
        limiter: Some(RequestLimiterConfig {
            window: Duration::from_secs(60),
            max_requests: 3,
        }),
        ..test_config()
    };
    let (service, url) = start(config).await;
    let client = reqwest::Client::new();

    for _ in 0..3 {
        let response = rpc(&client, &url, "Calculator", "Add", json!([1, 1])).await;
        assert_eq!(response.status(), 200);
    }
    let response = rpc(&client, &url, "Calculator", "Add", json!([1, 1])).await;
    assert_eq!(response.status(), 403);

    service.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_clients_then_restart() {
    let (service, url) = start(test_config()).await;
    let client = reqwest::Client::new();

    let calls = (0..32_i32).map(|i| {
        let client = client.clone();
        let url = url.clone();
        tokio::spawn(async move {
            let response = rpc(&client, &url, "Calculator", "Add", json!([i, 1])).await;
            let body: Value = response.json().await.unwrap();
            assert_eq!(body["result"], f64::from(i + 1));
        })
    });
    for call in calls.collect::<Vec<_>>() {
        call.await.unwrap();
    }

    service.stop().await.unwrap();
    assert_eq!(service.active_workers(), 0);

    service.start().await.unwrap();
    let url = format!("http://127.0.0.1:{}/", service.transport().port());
    let response = rpc(&client, &url, "Calculator", "Add", json!([2, 2])).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"], 4.0);
    service.stop().await.unwrap();
}
