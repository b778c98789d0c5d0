//! HTTP server setup and the gateway pipeline.
//!
//! # Responsibilities
//! - Create Axum Router with all handlers
//! - Wire up middleware (tracing, body limits)
//! - Run every gateway call through
//!   rate limit → authenticate → breaker → forward → transform
//! - Start background tasks (limiter purge, event delivery)
//! - Serve until the shutdown signal fires

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{Method, Request, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::http::forward::{build_client, build_outbound, forward, HttpClient};
use crate::http::request::GatewayContext;
use crate::http::response::transform_response;
use crate::lifecycle::Shutdown;
use crate::observability::{
    metrics, EventKind, EventPublisher, EventSink, EventWorker, GatewayEvent,
};
use crate::routing::{parse_gateway_path, RegistryError, ServiceRegistry};
use crate::security::rate_limit::{client_ip, user_agent};
use crate::security::{AuthError, Authenticator, RateLimitDecision, RateLimiters};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub limiters: Arc<RateLimiters>,
    pub authenticator: Arc<Authenticator>,
    pub client: HttpClient,
    pub events: EventPublisher,
}

impl AppState {
    fn emit(&self, kind: EventKind, ctx: &GatewayContext, details: serde_json::Value) {
        self.events.publish(GatewayEvent::new(kind, ctx, details));
    }
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    config: GatewayConfig,
    state: AppState,
    event_worker: Option<EventWorker>,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: GatewayConfig) -> Result<Self, RegistryError> {
        let registry = Arc::new(ServiceRegistry::from_config(
            &config.services,
            &config.circuit_breaker,
        )?);
        let limiters = Arc::new(RateLimiters::from_config(&config.rate_limit));
        let authenticator = Arc::new(Authenticator::new(&config.auth));
        let (events, event_worker) = EventPublisher::from_config(&config.events);

        let state = AppState {
            registry,
            limiters,
            authenticator,
            client: build_client(),
            events,
        };

        let router = Self::build_router(&config, state.clone());
        Ok(Self {
            router,
            config,
            state,
            event_worker,
        })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &GatewayConfig, state: AppState) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/api/gateway", get(services_handler))
            .route("/api/gateway/{service}", any(gateway_handler))
            .route("/api/gateway/{service}/", any(gateway_handler))
            .route("/api/gateway/{service}/{*path}", any(gateway_handler))
            .fallback(not_found_handler)
            .with_state(state)
            .layer(RequestBodyLimitLayer::new(config.security.max_body_size))
            .layer(TraceLayer::new_for_http())
    }

    /// Deliver lifecycle events to `sink` as well. No-op when events are disabled.
    pub fn add_event_sink(&mut self, sink: Arc<dyn EventSink>) {
        if let Some(worker) = self.event_worker.as_mut() {
            worker.add_sink(sink);
        }
    }

    /// The router, for serving or driving directly in tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            services = self.state.registry.len(),
            "HTTP server starting"
        );

        if self.state.limiters.enabled() {
            tokio::spawn(self.state.limiters.clone().run_purge(shutdown.subscribe()));
        }
        if let Some(worker) = self.event_worker {
            tokio::spawn(worker.run(shutdown.subscribe()));
        }

        let app = self.router.into_make_service_with_connect_info::<SocketAddr>();
        let mut stop = shutdown.subscribe();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Entry point for `/api/gateway/{service}/...`.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let path = request.uri().path().to_string();
    let (service_name, backend_path) = match parse_gateway_path(&path) {
        Some(parsed) => (parsed.service.to_string(), parsed.backend_path),
        None => (String::new(), "/".to_string()),
    };

    let mut ctx = GatewayContext::new(request.headers(), &service_name);
    let mut rate_limit = None;

    tracing::debug!(
        request_id = %ctx.request_id,
        method = %request.method(),
        service = %service_name,
        path = %backend_path,
        "Gateway request"
    );

    let response = match proxy(&state, &mut ctx, &mut rate_limit, &backend_path, request).await {
        Ok(response) => response,
        Err(err) => {
            tracing::debug!(request_id = %ctx.request_id, error = %err, "Request rejected");
            err.into_response()
        }
    };

    metrics::record_request(&ctx.service_name, response.status().as_u16(), ctx.start_time);
    transform_response(response, &ctx, rate_limit.as_ref())
}

/// The resilience pipeline. Each stage gates the next.
async fn proxy(
    state: &AppState,
    ctx: &mut GatewayContext,
    rate_limit: &mut Option<RateLimitDecision>,
    backend_path: &str,
    request: Request<Body>,
) -> Result<Response, GatewayError> {
    // 1. Resolve service
    let service = state.registry.get(&ctx.service_name).ok_or_else(|| {
        tracing::warn!(request_id = %ctx.request_id, service = %ctx.service_name, "Unknown service");
        GatewayError::UnknownService {
            name: ctx.service_name.clone(),
            available: state.registry.names(),
        }
    })?;

    // Preflight never carries credentials.
    if request.method() == Method::OPTIONS {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    // 2. Rate limit
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let ip = client_ip(request.headers(), peer);
    if let Some(decision) =
        state
            .limiters
            .check_request(service.traffic_class, ip, user_agent(request.headers()))
    {
        *rate_limit = Some(decision);
        if !decision.allowed {
            state.emit(
                EventKind::RateLimited,
                ctx,
                json!({
                    "class": service.traffic_class.as_str(),
                    "limit": decision.limit,
                    "hits": decision.total_hits,
                    "reset_at": decision.reset_at,
                }),
            );
            return Err(GatewayError::RateLimitExceeded {
                limit: decision.limit,
                remaining: decision.remaining,
                reset_at: decision.reset_at,
            });
        }
    }

    // 3. Authenticate
    if !state.authenticator.is_public(backend_path) {
        let outcome = state.authenticator.authenticate(request.headers());
        let principal = match outcome.principal {
            Some(principal) if outcome.authenticated => principal,
            _ => {
                let error = outcome.error.unwrap_or(AuthError::MissingCredentials);
                tracing::warn!(
                    request_id = %ctx.request_id,
                    service = %ctx.service_name,
                    reason = error.reason(),
                    "Authentication failed"
                );
                metrics::record_auth_failure(error.reason());
                state.emit(EventKind::AuthFailed, ctx, json!({ "reason": error.reason() }));
                return Err(GatewayError::AuthenticationFailed {
                    reason: error.to_string(),
                });
            }
        };

        if let Some(missing) = principal.missing_permission(&service.required_permissions) {
            tracing::warn!(
                request_id = %ctx.request_id,
                subject = %principal.subject,
                permission = missing,
                "Insufficient permission"
            );
            metrics::record_auth_failure("insufficient_permission");
            state.emit(
                EventKind::AuthFailed,
                ctx,
                json!({ "reason": "insufficient_permission", "permission": missing }),
            );
            return Err(GatewayError::InsufficientPermission {
                permission: missing.to_string(),
            });
        }

        ctx.authenticated = true;
        ctx.user_id = Some(principal.subject);
    }

    // 4. Circuit breaker
    let permit = match service.breaker.try_acquire() {
        Ok(permit) => permit,
        Err(_) => {
            tracing::warn!(request_id = %ctx.request_id, service = %service.name, "Circuit open, rejecting");
            state.emit(EventKind::BreakerOpen, ctx, json!({ "status": service.breaker.state().as_str() }));
            return Err(GatewayError::CircuitOpen {
                service: service.name.clone(),
            });
        }
    };

    // 5. Build outbound request. A failure here is the gateway's, not the
    // backend's, so the permit is dropped unreported.
    let (parts, body) = request.into_parts();
    let outbound = build_outbound(&parts, body, &service, backend_path, ctx)?;

    // 6-7. Forward once and record the outcome
    match forward(&state.client, outbound, &service).await {
        Ok(response) => {
            let status = response.status();
            let failed = service.breaker.is_failure_status(status.as_u16());
            if failed {
                permit.failure();
            } else {
                permit.success();
            }
            tracing::info!(
                request_id = %ctx.request_id,
                service = %service.name,
                status = status.as_u16(),
                elapsed_ms = ctx.elapsed_ms(),
                "Request completed"
            );
            let kind = if failed { EventKind::Failed } else { EventKind::Completed };
            state.emit(
                kind,
                ctx,
                json!({ "status": status.as_u16(), "method": parts.method.as_str() }),
            );
            Ok(response.map(Body::new))
        }
        Err(err) => {
            if err.is_backend_failure() {
                permit.failure();
            }
            tracing::error!(
                request_id = %ctx.request_id,
                service = %service.name,
                error = %err,
                "Forwarding failed"
            );
            state.emit(
                EventKind::Failed,
                ctx,
                json!({ "error": err.code(), "message": err.to_string() }),
            );
            Err(err)
        }
    }
}

/// Gateway liveness plus the state of every registered service.
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let services: Vec<_> = state
        .registry
        .iter()
        .map(|s| {
            json!({
                "name": s.name,
                "base_url": s.base_url.as_str(),
                "timeout_ms": s.timeout_ms,
                "traffic_class": s.traffic_class.as_str(),
                "breaker": s.breaker.snapshot(),
            })
        })
        .collect();

    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "services": services,
    }))
}

async fn services_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "available_services": state.registry.names() }))
}

async fn not_found_handler() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "not_found", "message": "No such route" })),
    )
        .into_response()
}
