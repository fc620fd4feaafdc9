//! Gateway server.
//!
//! # Responsibilities
//! - Create the Axum router with the catch-all proxy handler
//! - Wire up middleware (request ID, tracing)
//! - Forward matched requests through the guarded client
//! - Render fallbacks as 503 responses

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderName, HeaderValue, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::{Layer, ServiceExt};
use tower_http::{
    request_id::{MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{ClientConfig, GatewayConfig};
use crate::http::identifier::resolver_for;
use crate::http::middleware::{CircuitBreakerLayer, CircuitBreakerService, StatusPolicy};
use crate::observability::metrics;
use crate::resilience::RequestGuard;
use crate::routing::{RouteError, Router as GatewayRouter};

pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Upstream client with circuit breaking applied.
pub type GuardedClient = CircuitBreakerService<Client<HttpConnector, Body>, StatusPolicy>;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<GatewayRouter>,
    pub client: GuardedClient,
}

/// UUID v4 request IDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeRequestUuid;

impl MakeRequestId for MakeRequestUuid {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        HeaderValue::from_str(&uuid::Uuid::new_v4().to_string())
            .ok()
            .map(RequestId::new)
    }
}

/// Build the guarded upstream client from configuration.
pub fn guarded_client(config: &GatewayConfig, guard: RequestGuard) -> GuardedClient {
    let client = Client::builder(TokioExecutor::new()).build(connector(&config.client));

    CircuitBreakerLayer::new(guard)
        .policy(StatusPolicy::from(config.client.failure_statuses))
        .shared_resolver(resolver_for(config.circuits.identifier))
        .timeout(config.client.timeout())
        .layer(client)
}

fn connector(config: &ClientConfig) -> HttpConnector {
    let mut connector = HttpConnector::new();
    connector.set_connect_timeout(Some(Duration::from_millis(config.connect_timeout_ms)));
    connector.set_nodelay(true);
    connector
}

/// HTTP gateway forwarding routed requests through circuit breakers.
pub struct HttpServer {
    router: Router,
    route_count: usize,
}

impl HttpServer {
    /// Create a gateway server. Fails if a route upstream is not a valid URL.
    pub fn new(config: GatewayConfig, guard: RequestGuard) -> Result<Self, RouteError> {
        let state = AppState {
            router: Arc::new(GatewayRouter::from_config(&config.routes)?),
            client: guarded_client(&config, guard),
        };

        let router = Self::build_router(state);
        Ok(Self {
            router,
            route_count: config.routes.len(),
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            routes = self.route_count,
            "Gateway starting"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Gateway shutting down");
            })
            .await?;

        tracing::info!("Gateway stopped");
        Ok(())
    }
}

/// Looks up the route and forwards the request through the guarded client.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start_time = Instant::now();
    let request_id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let path = request.uri().path().to_string();

    let route = match state.router.match_path(&path) {
        Some(route) => route,
        None => {
            tracing::warn!(request_id = %request_id, path = %path, "No route matched");
            metrics::record_request("none", StatusCode::NOT_FOUND.as_u16(), start_time);
            return (StatusCode::NOT_FOUND, "No matching route found").into_response();
        }
    };

    let (mut parts, body) = request.into_parts();
    parts.uri = match route.upstream_uri(&parts.uri) {
        Ok(uri) => uri,
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Failed to build upstream URI");
            metrics::record_request(&route.name, StatusCode::BAD_GATEWAY.as_u16(), start_time);
            return (StatusCode::BAD_GATEWAY, "Invalid upstream URI").into_response();
        }
    };
    // The client derives Host from the rewritten URI.
    parts.headers.remove(header::HOST);

    tracing::debug!(
        request_id = %request_id,
        route = %route.name,
        upstream = %parts.uri,
        "Proxying request"
    );

    let response = match state.client.clone().oneshot(Request::from_parts(parts, body)).await {
        Ok(guarded) => {
            if guarded.is_circuit_open() {
                tracing::debug!(request_id = %request_id, route = %route.name, "Circuit open, serving fallback");
            }
            guarded
                .map_body(Body::new)
                .into_response_with(|fallback| Body::from(fallback.to_string()))
        }
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Upstream client unavailable");
            (StatusCode::BAD_GATEWAY, "Upstream client unavailable").into_response()
        }
    };

    metrics::record_request(&route.name, response.status().as_u16(), start_time);
    response
}
