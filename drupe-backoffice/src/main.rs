use drupe_backoffice::{
    build_router,
    config::BackofficeConfig,
    hub::BroadcastHub,
    publisher::{spawn_demo_emitter, EventPublisher},
    repository::MemoryRepository,
    services::{
        sessions::spawn_idle_sweep, CredentialService, SessionRegistry, TokenService,
    },
    AppState,
};
use drupe_core::middleware::rate_limit::{
    create_ip_rate_limiter, create_principal_rate_limiter, spawn_principal_bucket_sweep,
};
use drupe_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), drupe_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = BackofficeConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    drupe_backoffice::services::metrics::init_metrics();

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting back-office core"
    );

    let repo = Arc::new(MemoryRepository::seeded());
    tracing::info!("Repository initialized");

    let credentials = CredentialService::new(repo.clone(), config.auth.lock_threshold)
        .map_err(drupe_core::error::AppError::InternalError)?;
    let tokens = Arc::new(TokenService::new(&config.jwt));

    let sessions = Arc::new(SessionRegistry::new(chrono::Duration::seconds(
        config.session.idle_ttl_seconds as i64,
    )));
    spawn_idle_sweep(
        sessions.clone(),
        Duration::from_secs(config.session.sweep_period_seconds),
    );

    let principal_limiter = create_principal_rate_limiter(
        config.rate_limit.principal_limit,
        config.rate_limit.principal_window_seconds,
    );
    spawn_principal_bucket_sweep(
        principal_limiter.clone(),
        config.rate_limit.principal_window_seconds,
    );
    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    tracing::info!("Rate limiters initialized: Login IP and per-principal");

    let hub = BroadcastHub::new(
        config.hub.ingress_capacity,
        config.hub.max_outbound,
        Duration::from_secs(config.hub.ping_interval_seconds),
    );
    let publisher = EventPublisher::new(hub.clone());
    if config.demo.emitter_enabled {
        spawn_demo_emitter(
            hub.clone(),
            Duration::from_secs(config.demo.emitter_interval_seconds),
        );
        tracing::warn!("Demo event emitter is enabled");
    }

    let drain_deadline = Duration::from_secs(config.hub.drain_deadline_seconds);
    let config = Arc::new(config);
    let state = AppState {
        config: config.clone(),
        repo,
        credentials,
        tokens,
        sessions,
        hub: hub.clone(),
        publisher,
        principal_limiter,
        login_rate_limiter,
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // In-flight HTTP is done; give the hub its drain window.
    hub.drain(drain_deadline).await;
    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
