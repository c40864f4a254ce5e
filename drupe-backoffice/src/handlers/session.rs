use axum::{extract::State, Json};

use crate::dtos::{ApiResponse, MessageResponse, UnlockRequest};
use crate::middleware::Ctx;
use crate::services::ServiceError;
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

#[utoipa::path(
    post,
    path = "/session/lock",
    responses(
        (status = 200, description = "Session locked")
    ),
    tag = "Session",
    security(("bearer_auth" = []))
)]
pub async fn lock(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    state.sessions.lock(ctx.session.id)?;
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Session locked".to_string(),
    })))
}

#[utoipa::path(
    post,
    path = "/session/unlock",
    request_body = UnlockRequest,
    responses(
        (status = 200, description = "Session unlocked"),
        (status = 401, description = "Wrong password")
    ),
    tag = "Session",
    security(("bearer_auth" = []))
)]
pub async fn unlock(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ValidatedJson(req): ValidatedJson<UnlockRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, AppError> {
    let user = state
        .repo
        .find_user_by_id(ctx.principal.id)
        .await?
        .ok_or(ServiceError::SessionNotFound)?;

    if !state.credentials.check_password(&user, &req.password).await? {
        return Err(AppError::AuthError(anyhow::anyhow!("invalid_credentials")));
    }

    state.sessions.unlock(ctx.session.id)?;
    Ok(Json(ApiResponse::ok(MessageResponse {
        message: "Session unlocked".to_string(),
    })))
}
