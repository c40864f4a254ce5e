//! Authentication handlers: login (with the 2FA interstitial), token
//! refresh with rotation, logout, and password change.

use axum::{
    extract::{Json, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
};
use chrono::Duration;

use crate::dtos::{
    ApiResponse, ChangePasswordRequest, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, TokenPairResponse, TwofaStagingResponse, TwofaVerifyRequest, UserView,
};
use crate::middleware::Ctx;
use crate::models::{client_fingerprint, Principal};
use crate::services::{metrics, ServiceError, TokenKind};
use crate::utils::password::{hash_password, Password};
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

/// Advisory fingerprint from proxy headers. Behind the LB the forwarded
/// header is authoritative; absent both we still get a stable value.
pub fn fingerprint_from(headers: &HeaderMap) -> String {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    client_fingerprint(&ip, user_agent)
}

/// Open a session and mint the access+refresh pair for it.
fn issue_tokens(
    state: &AppState,
    principal: Principal,
    fingerprint: String,
    remember_me: bool,
) -> Result<TokenPairResponse, AppError> {
    let ttl = if remember_me {
        Duration::days(state.config.session.remember_me_days)
    } else {
        Duration::days(state.config.jwt.refresh_token_expiry_days)
    };
    let session = state
        .sessions
        .open(principal.id, fingerprint, remember_me, ttl)?;
    let (access_token, _) = state.tokens.mint_access(principal.id, session.id);
    let (refresh_token, _) = state.tokens.mint_refresh(principal.id, session.id);

    Ok(TokenPairResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        expires_in: state.tokens.access_token_expiry_seconds() as u64,
        user: UserView {
            id: principal.id,
            username: principal.username,
            role: principal.role,
            branch_memberships: principal.branch_memberships,
        },
    })
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; token pair or 2FA interstitial"),
        (status = 401, description = "Invalid credentials or locked account"),
        (status = 429, description = "Too many attempts from this IP")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<LoginRequest>,
) -> Result<Response, AppError> {
    let principal = match state.credentials.verify(&req.username, &req.password).await {
        Ok(principal) => principal,
        Err(e) => {
            metrics::record_login(match &e {
                ServiceError::AccountLocked => "locked",
                ServiceError::AccountInactive => "inactive",
                _ => "failure",
            });
            return Err(e.into());
        }
    };

    if principal.twofa_required {
        let (temp_token, _) = state.tokens.mint_staging(principal.id);
        metrics::record_login("twofa_pending");
        return Ok(Json(ApiResponse::ok(TwofaStagingResponse {
            requires_2fa: true,
            temp_token,
        }))
        .into_response());
    }

    let fingerprint = fingerprint_from(&headers);
    let pair = issue_tokens(&state, principal, fingerprint, req.remember_me)?;
    metrics::record_login("success");
    tracing::info!(username = %req.username, "Login succeeded");
    Ok(Json(ApiResponse::ok(pair)).into_response())
}

#[utoipa::path(
    post,
    path = "/auth/2fa/verify",
    request_body = TwofaVerifyRequest,
    responses(
        (status = 200, description = "Second factor accepted; token pair issued"),
        (status = 401, description = "Bad or expired staging token, or wrong code")
    ),
    tag = "Auth"
)]
pub async fn twofa_verify(
    State(state): State<AppState>,
    headers: HeaderMap,
    ValidatedJson(req): ValidatedJson<TwofaVerifyRequest>,
) -> Result<Json<ApiResponse<TokenPairResponse>>, AppError> {
    let claims = state
        .tokens
        .parse(&req.temp_token, TokenKind::TwofaStaging)
        .map_err(ServiceError::Token)?;

    let accepted = state.repo.verify_twofa_code(claims.sub, &req.code).await?;
    if !accepted {
        metrics::record_login("twofa_failure");
        return Err(AppError::AuthError(anyhow::anyhow!("invalid_code")));
    }

    let user = state
        .repo
        .find_user_by_id(claims.sub)
        .await?
        .ok_or(ServiceError::SessionNotFound)?;
    if user.is_locked {
        return Err(ServiceError::AccountLocked.into());
    }
    if !user.is_active {
        return Err(ServiceError::AccountInactive.into());
    }

    let fingerprint = fingerprint_from(&headers);
    let pair = issue_tokens(&state, user.principal(), fingerprint, req.remember_me)?;
    metrics::record_login("success");
    Ok(Json(ApiResponse::ok(pair)))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair"),
        (status = 401, description = "Invalid, expired, revoked, or wrong-kind token")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RefreshRequest>,
) -> Result<Json<ApiResponse<TokenPairResponse>>, AppError> {
    let claims = state
        .tokens
        .parse(&req.refresh_token, TokenKind::Refresh)
        .map_err(ServiceError::Token)?;

    if state.tokens.is_revoked(&claims.jti) {
        tracing::warn!(principal_id = %claims.sub, "Revoked refresh token replayed");
        return Err(AppError::AuthError(anyhow::anyhow!("invalid_refresh_token")));
    }

    let session_id = claims.sid.ok_or(ServiceError::SessionNotFound)?;
    let session = state.sessions.touch(session_id)?;

    let user = state
        .repo
        .find_user_by_id(claims.sub)
        .await?
        .ok_or(ServiceError::SessionNotFound)?;
    if user.is_locked {
        return Err(ServiceError::AccountLocked.into());
    }
    if !user.is_active {
        return Err(ServiceError::AccountInactive.into());
    }

    // Rotation: the presented token is dead from here on.
    state.tokens.revoke(&claims.jti, claims.exp);

    let principal = user.principal();
    let (access_token, _) = state.tokens.mint_access(principal.id, session.id);
    let (refresh_token, _) = state.tokens.mint_refresh(principal.id, session.id);
    Ok(Json(ApiResponse::ok(TokenPairResponse {
        access_token,
        refresh_token,
        token_type: "bearer",
        expires_in: state.tokens.access_token_expiry_seconds() as u64,
        user: UserView {
            id: principal.id,
            username: principal.username,
            role: principal.role,
            branch_memberships: principal.branch_memberships,
        },
    })))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session closed"),
        (status = 401, description = "Not authenticated")
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    if let Some(refresh_token) = req.refresh_token.as_deref() {
        if let Ok(claims) = state.tokens.parse(refresh_token, TokenKind::Refresh) {
            state.tokens.revoke(&claims.jti, claims.exp);
        }
    }
    state.sessions.close(ctx.session.id)?;
    state.hub.remove_for_session(ctx.session.id);
    tracing::info!(principal_id = %ctx.principal.id, "Logged out");
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Logged out".to_string(),
    })))
}

#[utoipa::path(
    put,
    path = "/users/me/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed; all sessions closed"),
        (status = 401, description = "Current password wrong or not authenticated")
    ),
    tag = "Users",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ValidatedJson(req): ValidatedJson<ChangePasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let user = state
        .repo
        .find_user_by_id(ctx.principal.id)
        .await?
        .ok_or(ServiceError::SessionNotFound)?;

    if !state.credentials.check_password(&user, &req.current_password).await? {
        return Err(AppError::AuthError(anyhow::anyhow!("invalid_credentials")));
    }

    let new_hash = tokio::task::spawn_blocking(move || {
        hash_password(&Password::new(req.new_password))
    })
    .await
    .map_err(|e| AppError::InternalError(anyhow::anyhow!("KDF task failed: {}", e)))?
    .map_err(AppError::InternalError)?;

    state
        .repo
        .set_password_hash(user.id, new_hash.into_string())
        .await?;

    // Every session for the principal dies, including this one.
    let closed = state.sessions.close_all_for_principal(user.id)?;
    state.hub.remove_for_principal(user.id);
    tracing::info!(principal_id = %user.id, closed, "Password changed; sessions closed");
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Password changed. Please log in again.".to_string(),
    })))
}
