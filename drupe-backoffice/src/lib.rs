pub mod config;
pub mod dtos;
pub mod handlers;
pub mod hub;
pub mod middleware;
pub mod models;
pub mod publisher;
pub mod repository;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use drupe_core::middleware::{
    rate_limit::ip_rate_limit_middleware, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::SecurityScheme,
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::BackofficeConfig;
use crate::hub::BroadcastHub;
use crate::middleware::{enforce, gate_middleware, BranchRule};
use crate::publisher::EventPublisher;
use crate::repository::Repository;
use crate::services::authz::Capability;
use crate::services::{CredentialService, SessionRegistry, TokenService};
use drupe_core::error::AppError;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::login,
        handlers::auth::twofa_verify,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::change_password,
        handlers::branch::select,
        handlers::session::lock,
        handlers::session::unlock,
        handlers::sales::record_sale,
        handlers::inventory::adjust_stock,
        handlers::deliveries::record_delivery,
    ),
    components(
        schemas(
            dtos::LoginRequest,
            dtos::UserView,
            dtos::TokenPairResponse,
            dtos::TwofaStagingResponse,
            dtos::TwofaVerifyRequest,
            dtos::RefreshRequest,
            dtos::LogoutRequest,
            dtos::MessageResponse,
            dtos::ChangePasswordRequest,
            dtos::UnlockRequest,
            dtos::BranchSelectRequest,
            dtos::BranchSelectResponse,
            dtos::RecordSaleRequest,
            dtos::AdjustStockRequest,
            dtos::RecordDeliveryRequest,
            models::Role,
            repository::SaleLine,
            repository::SaleReceipt,
            repository::StockLevel,
            repository::DeliveryRecord,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Authentication and token lifecycle"),
        (name = "Branch", description = "Branch selection"),
        (name = "Session", description = "Session locking"),
        (name = "Sales", description = "Point-of-sale operations"),
        (name = "Inventory", description = "Stock adjustments"),
        (name = "Deliveries", description = "Delivery intake"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BackofficeConfig>,
    pub repo: Arc<dyn Repository>,
    pub credentials: CredentialService,
    pub tokens: Arc<TokenService>,
    pub sessions: Arc<SessionRegistry>,
    pub hub: Arc<BroadcastHub>,
    pub publisher: EventPublisher,
    pub principal_limiter: drupe_core::middleware::rate_limit::PrincipalRateLimiter,
    pub login_rate_limiter: drupe_core::middleware::rate_limit::IpRateLimiter,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    // Login gets its own IP limiter; everything authenticated is rated
    // per principal inside the gate.
    let login_limiter = state.login_rate_limiter.clone();
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/2fa/verify", post(handlers::auth::twofa_verify))
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    // Capability and branch rule are declared here, at registration,
    // never inside handler bodies.
    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/users/me/password", put(handlers::auth::change_password))
        .route("/branch/select", post(handlers::branch::select))
        .route("/session/lock", post(handlers::session::lock))
        .route("/session/unlock", post(handlers::session::unlock))
        .route(
            "/sales",
            post(handlers::sales::record_sale).route_layer(from_fn(
                |req: axum::extract::Request, next: axum::middleware::Next| {
                    enforce(Capability::SalesProcess, BranchRule::Selected, req, next)
                },
            )),
        )
        .route(
            "/branches/:branch_id/inventory/adjust",
            post(handlers::inventory::adjust_stock).route_layer(from_fn(
                |req: axum::extract::Request, next: axum::middleware::Next| {
                    enforce(Capability::InventoryManage, BranchRule::Path, req, next)
                },
            )),
        )
        .route(
            "/branches/:branch_id/deliveries",
            post(handlers::deliveries::record_delivery).route_layer(from_fn(
                |req: axum::extract::Request, next: axum::middleware::Next| {
                    enforce(Capability::DeliveriesManage, BranchRule::Path, req, next)
                },
            )),
        )
        .layer(from_fn_with_state(state.clone(), gate_middleware));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => match state.config.swagger.enabled {
            config::SwaggerMode::Public | config::SwaggerMode::Authenticated => true,
            config::SwaggerMode::Disabled => false,
        },
    };

    if swagger_enabled {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let cors_origins = state
        .config
        .security
        .allowed_origins
        .iter()
        .map(|o| {
            o.parse::<HeaderValue>().unwrap_or_else(|e| {
                tracing::error!("Invalid CORS origin '{}': {}. Using fallback.", o, e);
                HeaderValue::from_static("*")
            })
        })
        .collect::<Vec<HeaderValue>>();

    let app = app
        .merge(login_route)
        .route("/auth/refresh", post(handlers::auth::refresh))
        // The websocket authenticates inside the handler, before the
        // upgrade; it does not sit behind the HTTP gate.
        .route("/ws", get(handlers::ws::ws_handler))
        .merge(protected)
        .with_state(state)
        .layer(from_fn(middleware::metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(cors_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
        "environment": format!("{:?}", state.config.environment),
        "sessions": state.sessions.len(),
        "ws_connections": state.hub.connection_count(),
    }))
}
