use axum::{extract::State, Json};

use crate::dtos::{ApiResponse, BranchSelectRequest, BranchSelectResponse};
use crate::middleware::Ctx;
use crate::services::authz;
use crate::services::ServiceError;
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

#[utoipa::path(
    post,
    path = "/branch/select",
    request_body = BranchSelectRequest,
    responses(
        (status = 200, description = "Branch selected"),
        (status = 403, description = "Branch not in the principal's scope"),
        (status = 404, description = "Unknown branch")
    ),
    tag = "Branch",
    security(("bearer_auth" = []))
)]
pub async fn select(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ValidatedJson(req): ValidatedJson<BranchSelectRequest>,
) -> Result<Json<ApiResponse<BranchSelectResponse>>, AppError> {
    // Managerial roles may select any existing branch; everyone else
    // only a branch they are a member of.
    if ctx.principal.role.is_managerial() && !state.repo.branch_exists(&req.branch_id).await? {
        return Err(AppError::NotFound(anyhow::anyhow!("unknown branch")));
    }
    let grant = authz::grant_branch(&ctx.principal, &req.branch_id).map_err(|_| {
        tracing::warn!(
            principal_id = %ctx.principal.id,
            branch_id = %req.branch_id,
            "Branch selection denied"
        );
        AppError::from(ServiceError::BranchNotAllowed)
    })?;

    let branch_name = state
        .repo
        .branch_name(grant.branch_id())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("unknown branch")))?;

    let session = state.sessions.select_branch(ctx.session.id, grant)?;
    let branch_id = match session.selected_branch_id {
        Some(branch_id) => branch_id,
        None => return Err(AppError::InternalError(anyhow::anyhow!("branch not recorded"))),
    };

    Ok(Json(ApiResponse::ok(BranchSelectResponse {
        branch_id,
        branch_name,
    })))
}
