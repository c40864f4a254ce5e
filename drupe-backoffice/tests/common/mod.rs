//! Shared setup for the HTTP integration tests.
//!
//! Builds the full application in memory and drives it with
//! `tower::ServiceExt::oneshot`; no sockets, no external services.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use drupe_backoffice::{
    build_router,
    config::{
        AuthPolicyConfig, BackofficeConfig, DemoConfig, Environment, HubConfig, InventoryConfig,
        JwtConfig, RateLimitConfig, SecurityConfig, SessionConfig, SwaggerConfig, SwaggerMode,
    },
    hub::BroadcastHub,
    publisher::EventPublisher,
    repository::MemoryRepository,
    services::{CredentialService, SessionRegistry, TokenService},
    AppState,
};
use drupe_core::middleware::rate_limit::{create_ip_rate_limiter, create_principal_rate_limiter};
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{Arc, Once};
use std::time::Duration;
use tower::util::ServiceExt;

static INIT: Once = Once::new();

fn init() {
    INIT.call_once(|| {
        drupe_backoffice::services::metrics::init_metrics();
    });
}

/// Configuration with generous limits; tests that exercise a limit build
/// their own config on top of this one.
pub fn test_config() -> BackofficeConfig {
    BackofficeConfig {
        common: drupe_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "drupe-backoffice-test".to_string(),
        service_version: "0.0.0-test".to_string(),
        log_level: "error".to_string(),
        jwt: JwtConfig {
            secret: "integration-test-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
            staging_token_expiry_minutes: 5,
        },
        auth: AuthPolicyConfig { lock_threshold: 5 },
        session: SessionConfig {
            idle_ttl_seconds: 1800,
            sweep_period_seconds: 60,
            remember_me_days: 30,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            principal_limit: 1000,
            principal_window_seconds: 60,
            login_attempts: 1000,
            login_window_seconds: 60,
        },
        hub: HubConfig {
            ingress_capacity: 64,
            max_outbound: 16,
            ping_interval_seconds: 30,
            drain_deadline_seconds: 1,
        },
        inventory: InventoryConfig {
            low_stock_threshold: 10,
        },
        demo: DemoConfig {
            emitter_enabled: false,
            emitter_interval_seconds: 10,
        },
    }
}

pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<MemoryRepository>,
    router: Router,
}

impl TestApp {
    pub fn spawn() -> Self {
        Self::with_config(test_config())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn with_config(config: BackofficeConfig) -> Self {
        init();

        let repo = Arc::new(MemoryRepository::seeded());
        let credentials = CredentialService::new(repo.clone(), config.auth.lock_threshold)
            .expect("credential service setup");
        let tokens = Arc::new(TokenService::new(&config.jwt));
        let sessions = Arc::new(SessionRegistry::new(chrono::Duration::seconds(
            config.session.idle_ttl_seconds as i64,
        )));
        let principal_limiter = create_principal_rate_limiter(
            config.rate_limit.principal_limit,
            config.rate_limit.principal_window_seconds,
        );
        let login_rate_limiter = create_ip_rate_limiter(
            config.rate_limit.login_attempts,
            config.rate_limit.login_window_seconds,
        );
        let hub = BroadcastHub::new(
            config.hub.ingress_capacity,
            config.hub.max_outbound,
            Duration::from_secs(config.hub.ping_interval_seconds),
        );
        let publisher = EventPublisher::new(hub.clone());

        let state = AppState {
            config: Arc::new(config),
            repo: repo.clone(),
            credentials,
            tokens,
            sessions,
            hub,
            publisher,
            principal_limiter,
            login_rate_limiter,
        };

        let router = build_router(state.clone()).expect("router setup");
        Self {
            state,
            repo,
            router,
        }
    }

    /// Lowest-level request helper; returns the raw response so callers
    /// can inspect headers.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string())),
            None => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{}")),
        }
        .expect("request build");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible service")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self.send(method, path, token, body).await;
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("JSON body")
        };
        (status, json)
    }

    pub async fn post(
        &self,
        path: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        self.request(Method::POST, path, token, Some(body)).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, path, token, None).await
    }

    /// Log in and return the `data` object of the token pair envelope.
    pub async fn login(&self, username: &str, password: &str) -> Value {
        let (status, body) = self
            .post(
                "/auth/login",
                None,
                serde_json::json!({ "username": username, "password": password }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        assert_eq!(body["success"], true);
        body["data"].clone()
    }

    /// Log in from a specific client IP. Sessions are deduplicated per
    /// (principal, fingerprint), so tests that need two live sessions
    /// for one account log in from two addresses.
    pub async fn login_from(&self, ip: &str, username: &str, password: &str) -> Value {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/auth/login")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-forwarded-for", ip)
            .body(Body::from(
                serde_json::json!({ "username": username, "password": password }).to_string(),
            ))
            .expect("request build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible service");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read body")
            .to_bytes();
        let body: Value = serde_json::from_slice(&bytes).expect("JSON body");
        body["data"].clone()
    }

    /// Log in and return just the access token.
    pub async fn access_token(&self, username: &str, password: &str) -> String {
        self.login(username, password).await["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }
}
