use crate::error::AppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use governor::{
    clock::{Clock, DefaultClock},
    state::keyed::DashMapStateStore,
    Quota, RateLimiter,
};
use std::{net::SocketAddr, num::NonZeroU32, sync::Arc, time::Duration};
use uuid::Uuid;

/// Rate limiter keyed by IP address (pre-authentication endpoints).
pub type IpRateLimiter = Arc<RateLimiter<SocketAddr, DashMapStateStore<SocketAddr>, DefaultClock>>;

/// Rate limiter keyed by principal id, consulted by the request gate for
/// every authenticated request.
pub type PrincipalRateLimiter = Arc<RateLimiter<Uuid, DashMapStateStore<Uuid>, DefaultClock>>;

fn quota(attempts: u32, window_seconds: u64) -> Quota {
    let attempts = attempts.max(1);
    let period = Duration::from_millis((window_seconds * 1000) / attempts as u64);
    Quota::with_period(period)
        .expect("Failed to create quota with valid period")
        .allow_burst(NonZeroU32::new(attempts).expect("attempts is guaranteed to be non-zero"))
}

/// Create a keyed rate limiter (by IP).
pub fn create_ip_rate_limiter(attempts: u32, window_seconds: u64) -> IpRateLimiter {
    Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds)))
}

/// Create a keyed rate limiter (by principal id).
pub fn create_principal_rate_limiter(attempts: u32, window_seconds: u64) -> PrincipalRateLimiter {
    Arc::new(RateLimiter::dashmap(quota(attempts, window_seconds)))
}

/// Check the per-principal limiter. On deny, returns the number of whole
/// seconds until the bucket admits another request (Retry-After advisory).
pub fn check_principal(limiter: &PrincipalRateLimiter, principal_id: Uuid) -> Result<(), u64> {
    match limiter.check_key(&principal_id) {
        Ok(_) => Ok(()),
        Err(negative) => {
            let wait = negative.wait_time_from(DefaultClock::default().now());
            Err(wait.as_secs().max(1))
        }
    }
}

/// Spawn a best-effort sweep that evicts rate buckets idle long enough to
/// have fully replenished. Cadence is twice the window duration.
pub fn spawn_principal_bucket_sweep(limiter: PrincipalRateLimiter, window_seconds: u64) {
    let period = Duration::from_secs((window_seconds * 2).max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            limiter.retain_recent();
        }
    });
}

/// Middleware for IP-based rate limiting.
pub async fn ip_rate_limit_middleware(
    State(limiter): State<IpRateLimiter>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let forwarded_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .and_then(|s| s.trim().parse::<std::net::IpAddr>().ok());

    let addr = if let Some(ip) = forwarded_ip {
        Some(SocketAddr::new(ip, 0))
    } else {
        request
            .extensions()
            .get::<axum::extract::ConnectInfo<SocketAddr>>()
            .map(|axum::extract::ConnectInfo(addr)| *addr)
    };

    match addr {
        Some(addr) => match limiter.check_key(&addr) {
            Ok(_) => Ok(next.run(request).await),
            Err(negative) => {
                let wait_time = negative.wait_time_from(DefaultClock::default().now());
                Err(AppError::TooManyRequests(
                    "Too many requests from this IP. Please try again later.".to_string(),
                    Some(wait_time.as_secs()),
                ))
            }
        },
        None => {
            tracing::warn!("Could not determine IP for rate limiting");
            Ok(next.run(request).await)
        }
    }
}
