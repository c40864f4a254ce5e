use crate::models::{Principal, Session};
use crate::services::{metrics, TokenKind};
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use drupe_core::error::{AppError, GateReason};
use drupe_core::middleware::rate_limit::check_principal;

/// What the gate hands to handlers. Handlers obtain the principal and
/// session from here and nowhere else.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub session: Session,
}

/// Paths a soft-locked session may still reach: the ways out of the lock.
fn allowed_while_locked(path: &str) -> bool {
    matches!(path, "/session/unlock" | "/auth/logout")
}

fn deny(reason: GateReason) -> AppError {
    metrics::record_gate_denial(reason.as_str());
    AppError::gate(reason)
}

/// Request gate for the protected subtree.
///
/// Runs bearer extraction, access-token parse, session lookup, principal
/// liveness, the per-principal rate limiter, and the session touch, in
/// that order, then installs [`RequestContext`] into request extensions.
pub async fn gate_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    let Some(token) = token else {
        return Err(deny(GateReason::TokenMissing));
    };

    let claims = state.tokens.parse(token, TokenKind::Access).map_err(|e| {
        metrics::record_gate_denial(e.gate_reason().as_str());
        AppError::gate(e.gate_reason())
    })?;

    let Some(session_id) = claims.sid else {
        return Err(deny(GateReason::TokenMalformed));
    };

    let session = state
        .sessions
        .get(session_id)
        .map_err(|_| deny(GateReason::SessionRevoked))?;

    let user = state
        .repo
        .find_user_by_id(claims.sub)
        .await?
        .ok_or_else(|| deny(GateReason::SessionRevoked))?;
    if user.is_locked {
        return Err(deny(GateReason::AccountLocked));
    }
    if !user.is_active {
        return Err(deny(GateReason::AccountInactive));
    }

    if let Err(retry_after) = check_principal(&state.principal_limiter, claims.sub) {
        metrics::record_gate_denial(GateReason::RateLimited.as_str());
        return Err(AppError::Gate {
            reason: GateReason::RateLimited,
            retry_after: Some(retry_after),
        });
    }

    let session = state
        .sessions
        .touch(session.id)
        .map_err(|_| deny(GateReason::SessionRevoked))?;

    if session.is_locked && !allowed_while_locked(req.uri().path()) {
        return Err(deny(GateReason::Forbidden));
    }

    req.extensions_mut().insert(RequestContext {
        principal: user.principal(),
        session,
    });

    Ok(next.run(req).await)
}

/// Extractor for the gate-installed context.
pub struct Ctx(pub RequestContext);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Ctx
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ctx = parts.extensions.get::<RequestContext>().ok_or_else(|| {
            AppError::InternalError(anyhow::anyhow!(
                "request context missing; route mounted outside the gate"
            ))
        })?;
        Ok(Ctx(ctx.clone()))
    }
}
