//! Server crate provides HTTP server functionality.
//!
//! This module exposes the storefront over HTTP: the store catalog for map
//! rendering, the product listing, the per-session order composition flow
//! (select a store, edit the delivery draft, submit), and order lookup.
//! Submission is gated by the eligibility check in the service layer.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    extract::{Path as AxumPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use catalog::StoreCatalog;
use model::{DeliveryRequest, DeliveryType, ProductType};
use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use repository::ProductsRepository;
use serde::{Deserialize, Serialize};
use service::{OrderService, ServiceError, SessionStore};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info, warn};

/// Server represents the HTTP front of the storefront.
pub struct Server {
    state: AppState,
    port: String,
}

/// Metrics collects and exposes HTTP server metrics.
struct Metrics {
    registry: Registry,
    http_requests_total: CounterVec,
    http_request_duration_seconds: HistogramVec,
    orders_total: CounterVec,
}

impl Metrics {
    fn new() -> Self {
        let registry = Registry::new();

        let http_requests_total = CounterVec::new(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "endpoint", "status"],
        )
        .expect("Failed to create http_requests_total metric");

        let http_request_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            ),
            &["method", "endpoint"],
        )
        .expect("Failed to create http_request_duration_seconds metric");

        let orders_total = CounterVec::new(
            Opts::new(
                "orders_total",
                "Order submission attempts by outcome (accepted, rejected, failed)",
            ),
            &["outcome"],
        )
        .expect("Failed to create orders_total metric");

        registry
            .register(Box::new(http_requests_total.clone()))
            .expect("Failed to register http_requests_total metric");
        registry
            .register(Box::new(http_request_duration_seconds.clone()))
            .expect("Failed to register http_request_duration_seconds metric");
        registry
            .register(Box::new(orders_total.clone()))
            .expect("Failed to register orders_total metric");

        Self {
            registry,
            http_requests_total,
            http_request_duration_seconds,
            orders_total,
        }
    }

    fn record_request(&self, method: &str, endpoint: &str, status: u16, duration: Duration) {
        self.http_requests_total
            .with_label_values(&[method, endpoint, &status.to_string()])
            .inc();
        self.http_request_duration_seconds
            .with_label_values(&[method, endpoint])
            .observe(duration.as_secs_f64());
    }

    fn record_order(&self, outcome: &str) {
        self.orders_total.with_label_values(&[outcome]).inc();
    }
}

/// Application state shared between request handlers
#[derive(Clone)]
struct AppState {
    catalog: Arc<StoreCatalog>,
    sessions: Arc<SessionStore>,
    products_repo: Arc<dyn ProductsRepository>,
    order_service: Arc<dyn OrderService>,
    static_dir: String,
    metrics: Arc<Metrics>,
}

/// Body of a store-selection request, emitted by map interaction.
#[derive(Debug, Deserialize)]
struct SelectStoreRequest {
    store_id: String,
}

/// Partial edit of the delivery draft; absent fields are left untouched.
#[derive(Debug, Deserialize)]
struct DeliveryUpdateRequest {
    product_type: Option<ProductType>,
    delivery_type: Option<DeliveryType>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SubmitRequest {
    user_id: String,
}

/// What the client sees of a session: the current draft plus the rejection
/// message from the last failed submit, if any.
#[derive(Debug, Serialize)]
struct SessionView {
    draft: DeliveryRequest,
    rejection: Option<String>,
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `catalog` - The loaded store catalog
    /// * `sessions` - Per-session order drafts
    /// * `products_repo` - Product listing source
    /// * `order_service` - Submission sink for accepted orders
    /// * `static_dir` - The directory for static files (e.g., index.html)
    pub fn new(
        port: String,
        catalog: Arc<StoreCatalog>,
        sessions: Arc<SessionStore>,
        products_repo: Arc<dyn ProductsRepository>,
        order_service: Arc<dyn OrderService>,
        static_dir: String,
    ) -> Self {
        info!("Initializing HTTP server on port {}", port);

        Self {
            state: AppState {
                catalog,
                sessions,
                products_repo,
                order_service,
                static_dir,
                metrics: Arc::new(Metrics::new()),
            },
            port,
        }
    }

    /// Starts the server and blocks until it's shut down.
    pub async fn start(&self) -> Result<()> {
        let app = self.create_router();

        let listener = TcpListener::bind(format!("0.0.0.0:{}", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    fn create_router(&self) -> Router {
        let metrics = self.state.metrics.clone();

        Router::new()
            .route("/api/stores", get(Self::handle_list_stores))
            .route("/api/stores/{id}", get(Self::handle_get_store))
            .route("/api/products", get(Self::handle_list_products))
            .route("/api/orders/{id}", get(Self::handle_get_order))
            .route(
                "/api/session/{id}",
                get(Self::handle_get_session),
            )
            .route(
                "/api/session/{id}/select-store",
                post(Self::handle_select_store),
            )
            .route(
                "/api/session/{id}/delivery",
                put(Self::handle_update_delivery),
            )
            .route("/api/session/{id}/submit", post(Self::handle_submit))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .fallback(Self::handle_static)
            .layer(axum::middleware::from_fn_with_state(
                metrics,
                Self::metrics_middleware,
            ))
            .with_state(self.state.clone())
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        let path = req.uri().path().to_string();

        let start = std::time::Instant::now();
        let response = next.run(req).await;

        metrics.record_request(
            &method,
            &path,
            response.status().as_u16(),
            start.elapsed(),
        );

        response
    }

    async fn handle_list_stores(State(state): State<AppState>) -> Response {
        let stores = state.catalog.all().await;
        if stores.is_empty() {
            // Valid state: nothing selectable yet, but not an error.
            warn!("Store catalog is empty");
        }
        Json(stores).into_response()
    }

    async fn handle_get_store(
        State(state): State<AppState>,
        AxumPath(store_id): AxumPath<String>,
    ) -> Response {
        match state.catalog.get(&store_id).await {
            Some(store) => Json(store).into_response(),
            None => (StatusCode::NOT_FOUND, "store not found").into_response(),
        }
    }

    async fn handle_list_products(State(state): State<AppState>) -> Response {
        match state.products_repo.get_all_by_score().await {
            Ok(products) => Json(products).into_response(),
            Err(e) => {
                error!("Failed to list products: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "failed to list products",
                )
                    .into_response()
            }
        }
    }

    async fn handle_get_order(
        State(state): State<AppState>,
        AxumPath(order_id): AxumPath<String>,
    ) -> Response {
        match state.order_service.get_order_by_id(&order_id).await {
            Ok(order) => Json(order).into_response(),
            Err(ServiceError::Db(repository::RepositoryError::NotFound)) => {
                warn!("Order not found: {}", order_id);
                (StatusCode::NOT_FOUND, "order not found").into_response()
            }
            Err(e) => {
                error!("Failed to fetch order {}: {}", order_id, e);
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to fetch order").into_response()
            }
        }
    }

    async fn handle_get_session(
        State(state): State<AppState>,
        AxumPath(session_id): AxumPath<String>,
    ) -> Response {
        let flow = state
            .sessions
            .snapshot(&session_id)
            .await
            .unwrap_or_default();
        Json(SessionView {
            draft: flow.draft().clone(),
            rejection: flow.last_rejection().map(|r| r.to_string()),
        })
        .into_response()
    }

    /// Map interaction: a marker click replaces the session's selection.
    /// Selection itself is always legal; validation happens at submit.
    async fn handle_select_store(
        State(state): State<AppState>,
        AxumPath(session_id): AxumPath<String>,
        Json(body): Json<SelectStoreRequest>,
    ) -> Response {
        info!(
            "Session {} selected store {}",
            session_id, body.store_id
        );
        state
            .sessions
            .with_flow(&session_id, |flow| flow.select_store(body.store_id.as_str()))
            .await;
        StatusCode::NO_CONTENT.into_response()
    }

    /// Form input: coordinate and enum-field edits applied to the draft.
    async fn handle_update_delivery(
        State(state): State<AppState>,
        AxumPath(session_id): AxumPath<String>,
        Json(body): Json<DeliveryUpdateRequest>,
    ) -> Response {
        state
            .sessions
            .with_flow(&session_id, |flow| {
                if let Some(product_type) = body.product_type {
                    flow.set_product_type(product_type);
                }
                if let Some(delivery_type) = body.delivery_type {
                    flow.set_delivery_type(delivery_type);
                }
                if body.latitude.is_some() || body.longitude.is_some() {
                    let draft = flow.draft();
                    let latitude = body.latitude.unwrap_or(draft.latitude);
                    let longitude = body.longitude.unwrap_or(draft.longitude);
                    flow.set_coordinates(latitude, longitude);
                }
            })
            .await;
        StatusCode::NO_CONTENT.into_response()
    }

    /// Explicit submit: re-resolves the selected store against the catalog,
    /// runs the eligibility gate, and on success hands the finalized
    /// request to order persistence.
    async fn handle_submit(
        State(state): State<AppState>,
        AxumPath(session_id): AxumPath<String>,
        Json(body): Json<SubmitRequest>,
    ) -> Response {
        // Weak reference: the selection is an id, re-resolved here rather
        // than a cached copy of the store.
        let selected_id = state
            .sessions
            .with_flow(&session_id, |flow| {
                flow.selected_store_id().map(str::to_string)
            })
            .await;
        let selection = match selected_id {
            Some(id) => state.catalog.get(&id).await,
            None => None,
        };

        let submitted = state
            .sessions
            .with_flow(&session_id, |flow| flow.submit(selection.as_ref()))
            .await;

        let request = match submitted {
            Ok(request) => request,
            Err(rejection) => {
                info!("Session {} submission rejected: {}", session_id, rejection);
                state.metrics.record_order("rejected");
                return (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    Json(serde_json::json!({ "error": rejection.to_string() })),
                )
                    .into_response();
            }
        };

        match state.order_service.place_order(&body.user_id, &request).await {
            Ok(order) => {
                info!("Order {} placed for session {}", order.id, session_id);
                state.metrics.record_order("accepted");
                (StatusCode::CREATED, Json(order)).into_response()
            }
            Err(e) => {
                error!("Failed to place order for session {}: {}", session_id, e);
                state.metrics.record_order("failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "failed to place order").into_response()
            }
        }
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState>) -> Response {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
            error!("Failed to encode metrics: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response();
        }

        match String::from_utf8(buffer) {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("Failed to convert metrics to UTF-8: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Invalid metrics data").into_response()
            }
        }
    }

    async fn handle_static(State(state): State<AppState>, uri: axum::http::Uri) -> Response {
        let path = uri.path().trim_start_matches('/');
        let path = if path.is_empty() { "index.html" } else { path };

        let file_path = Path::new(&state.static_dir).join(path);

        match tokio::fs::read_to_string(file_path).await {
            Ok(content) => {
                let content_type = if path.ends_with(".html") {
                    "text/html"
                } else if path.ends_with(".css") {
                    "text/css"
                } else if path.ends_with(".js") {
                    "application/javascript"
                } else {
                    "text/plain"
                };

                Response::builder()
                    .header("Content-Type", content_type)
                    .body(content.into())
                    .unwrap_or_else(|_| {
                        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create response")
                            .into_response()
                    })
            }
            Err(_) => (StatusCode::NOT_FOUND, "File not found").into_response(),
        }
    }
}

/// Waits for a shutdown signal (Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use model::{Order, Product};
    use repository::RepositoryError;

    struct StubProductsRepo;

    #[async_trait]
    impl ProductsRepository for StubProductsRepo {
        async fn get_all_by_score(&self) -> Result<Vec<Product>, RepositoryError> {
            Ok(Vec::new())
        }
    }

    struct StubOrderService;

    #[async_trait]
    impl OrderService for StubOrderService {
        async fn place_order(
            &self,
            _user_id: &str,
            _request: &DeliveryRequest,
        ) -> Result<Order, ServiceError> {
            Err(ServiceError::Unexpected("stub".into()))
        }

        async fn get_order_by_id(&self, _order_id: &str) -> Result<Order, ServiceError> {
            Err(ServiceError::Db(RepositoryError::NotFound))
        }
    }

    fn create_test_server() -> Server {
        Server::new(
            "8080".to_string(),
            Arc::new(StoreCatalog::new()),
            Arc::new(SessionStore::new()),
            Arc::new(StubProductsRepo),
            Arc::new(StubOrderService),
            "static".to_string(),
        )
    }

    #[test]
    fn test_server_creation() {
        let server = create_test_server();
        assert_eq!(server.port, "8080");
        assert_eq!(server.state.static_dir, "static");
    }

    #[tokio::test]
    async fn test_router_builds() {
        let server = create_test_server();
        let _router = server.create_router();
    }
}
