//! Circuit breaker middleware over a real hyper client and mock upstreams.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response, StatusCode};
use hyper::body::Incoming;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;
use tower::{BoxError, Layer, ServiceExt};

use circuit_guard::http::{
    AuthorityResolver, CircuitBreakerLayer, CircuitBreakerService, GuardedResponse, RequestFailed,
    StatusPolicy,
};
use circuit_guard::resilience::{policy_fn, CallOutcome};
use circuit_guard::{CircuitConfig, CircuitRegistry, CircuitState, RequestGuard};

mod common;

type GuardedClient = CircuitBreakerService<Client<HttpConnector, Body>, StatusPolicy>;

fn registry(config: CircuitConfig) -> Arc<CircuitRegistry> {
    Arc::new(CircuitRegistry::in_memory(config))
}

fn client(registry: &Arc<CircuitRegistry>) -> GuardedClient {
    layer(registry).layer(hyper_client())
}

fn layer(registry: &Arc<CircuitRegistry>) -> CircuitBreakerLayer {
    CircuitBreakerLayer::new(RequestGuard::new(registry.clone()))
}

fn hyper_client() -> Client<HttpConnector, Body> {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

async fn get(client: &GuardedClient, url: &str) -> GuardedResponse<Incoming> {
    let request = Request::get(url).body(Body::empty()).unwrap();
    client.clone().oneshot(request).await.unwrap()
}

async fn original_body(guarded: GuardedResponse<Incoming>) -> String {
    let response = match guarded {
        GuardedResponse::Fallback(fallback) => fallback.into_original_response().unwrap(),
        GuardedResponse::Upstream(response) => response,
    };
    let bytes = to_bytes(Body::new(response.into_body()), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn open_circuit(client: &GuardedClient, url: &str) {
    for _ in 0..5 {
        get(client, url).await;
    }
}

#[tokio::test]
async fn test_circuit_does_not_open_for_below_threshold_failed_requests() {
    let success = common::start_fixed_backend(200, "Success!").await;
    let failure = common::start_fixed_backend(500, "Failure!").await;
    // Both upstreams share host 127.0.0.1 and so one circuit.
    let registry = registry(CircuitConfig::default());
    let client = client(&registry);

    for _ in 0..4 {
        get(&client, &failure.url("/")).await;
    }
    let response = get(&client, &success.url("/")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.get("127.0.0.1").stats().failure_count, 4);
}

#[tokio::test]
async fn test_failure_circuit_response() {
    let failure = common::start_fixed_backend(500, "Failure!").await;
    let client = client(&registry(CircuitConfig::default()));

    let response = get(&client, &failure.url("/")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.is_success());
    assert_eq!(
        response.original_response().unwrap().status(),
        StatusCode::INTERNAL_SERVER_ERROR
    );
    assert_eq!(original_body(response).await, "Failure!");
}

#[tokio::test]
async fn test_open_circuit_response() {
    let failure = common::start_fixed_backend(500, "Failure!").await;
    let registry = registry(CircuitConfig::default());
    let client = client(&registry);

    open_circuit(&client, &failure.url("/")).await;
    assert_eq!(registry.get("127.0.0.1").state(), CircuitState::Open);

    let response = get(&client, &failure.url("/")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(response.original_response().is_none());
    assert!(matches!(response.original_error(), Some(RequestFailed::Open(_))));
    assert_eq!(failure.hits(), 5, "open circuit must not reach the upstream");
}

#[tokio::test]
async fn test_custom_policy_counts_not_found_as_failure() {
    let missing = common::start_fixed_backend(404, "Not here").await;
    let registry = registry(CircuitConfig::default());
    let client = layer(&registry)
        .policy(policy_fn(
            |outcome: CallOutcome<'_, Response<Incoming>, BoxError>| match outcome {
                CallOutcome::Success(response) => {
                    response.status() == StatusCode::NOT_FOUND
                        || response.status().is_server_error()
                }
                _ => true,
            },
        ))
        .layer(hyper_client());

    let request = Request::get(missing.url("/page")).body(Body::empty()).unwrap();
    let response = client.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!response.is_success());
    assert_eq!(
        response.original_response().unwrap().status(),
        StatusCode::NOT_FOUND
    );
    assert_eq!(original_body(response).await, "Not here");

    let stats = registry.get("127.0.0.1").stats();
    assert_eq!((stats.success_count, stats.failure_count), (0, 1));
}

#[tokio::test]
async fn test_closed_circuit_response() {
    let success = common::start_fixed_backend(200, "Success!").await;
    let client = client(&registry(CircuitConfig::default()));

    let response = get(&client, &success.url("/")).await;
    assert!(response.is_success());
    assert_eq!(original_body(response).await, "Success!");
}

#[tokio::test]
async fn test_parallel_requests_closed_circuit_response() {
    let success = common::start_fixed_backend(200, "Success!").await;
    let registry = registry(CircuitConfig::default());
    let client = client(&registry);

    let url = success.url("/");
    let (first, second) = tokio::join!(get(&client, &url), get(&client, &url));
    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(registry.get("127.0.0.1").stats().success_count, 2);
}

#[tokio::test]
async fn test_failed_parallel_requests_closed_circuit_response() {
    let failure = common::start_fixed_backend(500, "Failure!").await;
    let registry = registry(CircuitConfig::default());
    let client = client(&registry);

    let url = failure.url("/");
    let (first, second) = tokio::join!(get(&client, &url), get(&client, &url));
    for response in [&first, &second] {
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!response.is_success());
        assert_eq!(
            response.original_response().unwrap().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
    assert_eq!(registry.get("127.0.0.1").stats().failure_count, 2);
}

#[tokio::test]
async fn test_slow_parallel_requests_closed_circuit_response() {
    let slow = common::start_slow_backend(Duration::from_secs(2)).await;
    let registry = registry(CircuitConfig::default());
    let client = layer(&registry)
        .timeout(Duration::from_millis(100))
        .layer(hyper_client());

    let url = slow.url("/");
    let (first, second) = tokio::join!(get(&client, &url), get(&client, &url));
    for response in [&first, &second] {
        assert!(!response.is_success());
        assert!(matches!(response.original_error(), Some(RequestFailed::Timeout(_))));
    }
    assert_eq!(registry.get("127.0.0.1").stats().failure_count, 2);
}

#[tokio::test]
async fn test_parallel_requests_open_circuit_response() {
    let failure = common::start_fixed_backend(500, "Failure!").await;
    let registry = registry(CircuitConfig::default());
    let client = client(&registry);

    open_circuit(&client, &failure.url("/")).await;

    let url = failure.url("/");
    let (first, second) = tokio::join!(get(&client, &url), get(&client, &url));
    assert_eq!(first.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(second.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(first.is_circuit_open() && second.is_circuit_open());
    assert_eq!(failure.hits(), 5);
}

#[tokio::test]
async fn test_authority_identifiers_isolate_ports() {
    let success = common::start_fixed_backend(200, "Success!").await;
    let failure = common::start_fixed_backend(500, "Failure!").await;
    let registry = registry(CircuitConfig::default());
    let client = layer(&registry)
        .identifier_resolver(AuthorityResolver)
        .layer(hyper_client());

    open_circuit(&client, &failure.url("/")).await;
    assert!(get(&client, &failure.url("/")).await.is_circuit_open());
    assert!(get(&client, &success.url("/")).await.is_success());

    assert_eq!(registry.get(&failure.addr.to_string()).state(), CircuitState::Open);
    assert_eq!(registry.get(&success.addr.to_string()).state(), CircuitState::Closed);
}

#[tokio::test]
async fn test_half_open_probe_closes_circuit() {
    let healthy = Arc::new(AtomicBool::new(false));
    let flag = healthy.clone();
    let backend = common::start_programmable_backend(move || {
        let flag = flag.clone();
        async move {
            if flag.load(Ordering::SeqCst) {
                (200, "Recovered".to_string())
            } else {
                (503, "Down".to_string())
            }
        }
    })
    .await;

    let registry = registry(CircuitConfig {
        volume_threshold: 2,
        sleep_window_ms: 200,
        ..CircuitConfig::default()
    });
    let client = client(&registry);
    let url = backend.url("/health");

    get(&client, &url).await;
    get(&client, &url).await;
    assert!(get(&client, &url).await.is_circuit_open());
    assert_eq!(backend.hits(), 2);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(registry.get("127.0.0.1").state(), CircuitState::HalfOpen);

    let probe = get(&client, &url).await;
    assert!(probe.is_success());
    assert_eq!(registry.get("127.0.0.1").state(), CircuitState::Closed);
    assert_eq!(original_body(probe).await, "Recovered");
}

#[tokio::test]
async fn test_unreachable_upstream_is_transport_failure() {
    // Bind then drop to get a port with nothing listening.
    let addr = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    let client = client(&registry(CircuitConfig::default()));

    let response = get(&client, &format!("http://{}/", addr)).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(matches!(response.original_error(), Some(RequestFailed::Transport(_))));
}
