use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use crate::dtos::{AdjustStockRequest, ApiResponse};
use crate::hub::{Channel, Event, Scope};
use crate::middleware::Ctx;
use crate::repository::StockLevel;
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

#[utoipa::path(
    post,
    path = "/branches/{branch_id}/inventory/adjust",
    request_body = AdjustStockRequest,
    params(("branch_id" = String, Path, description = "Target branch")),
    responses(
        (status = 200, description = "Stock adjusted"),
        (status = 403, description = "Capability or branch denied"),
        (status = 404, description = "Unknown branch")
    ),
    tag = "Inventory",
    security(("bearer_auth" = []))
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(branch_id): Path<String>,
    ValidatedJson(req): ValidatedJson<AdjustStockRequest>,
) -> Result<Json<ApiResponse<StockLevel>>, AppError> {
    let (level, commit) = state
        .repo
        .adjust_stock(&branch_id, &req.product_id, req.delta)
        .await?;

    state.publisher.publish(
        &commit,
        Event::new(
            Channel::StockUpdate,
            Scope::branch(&level.branch_id),
            json!({ "product_id": level.product_id, "quantity": level.quantity }),
        ),
    );

    let threshold = state.config.inventory.low_stock_threshold;
    if level.quantity < threshold {
        state.publisher.publish(
            &commit,
            Event::new(
                Channel::LowStockAlert,
                Scope::branch(&level.branch_id),
                json!({
                    "product_id": level.product_id,
                    "quantity": level.quantity,
                    "threshold": threshold,
                }),
            ),
        );
    }

    tracing::info!(
        principal_id = %ctx.principal.id,
        branch_id = %level.branch_id,
        product_id = %level.product_id,
        quantity = level.quantity,
        "Stock adjusted"
    );
    Ok(Json(ApiResponse::ok(level)))
}
