use axum::{extract::State, Json};
use serde_json::json;

use crate::dtos::{ApiResponse, RecordSaleRequest};
use crate::hub::{Channel, Event, Scope};
use crate::middleware::Ctx;
use crate::repository::SaleReceipt;
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

#[utoipa::path(
    post,
    path = "/sales",
    request_body = RecordSaleRequest,
    responses(
        (status = 201, description = "Sale recorded"),
        (status = 403, description = "Capability or branch denied, or no branch selected")
    ),
    tag = "Sales",
    security(("bearer_auth" = []))
)]
pub async fn record_sale(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    ValidatedJson(req): ValidatedJson<RecordSaleRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<SaleReceipt>>), AppError> {
    // The route guard has already verified sales.process against the
    // selected branch, so it is present here.
    let branch_id = ctx
        .session
        .selected_branch_id
        .clone()
        .ok_or_else(|| AppError::InternalError(anyhow::anyhow!("guard let through an unselected branch")))?;

    let (receipt, commit) = state
        .repo
        .record_sale(&branch_id, ctx.principal.id, req.lines)
        .await?;

    state.publisher.publish(
        &commit,
        Event::new(
            Channel::NewSale,
            Scope::branch(&receipt.branch_id),
            json!({
                "sale_id": receipt.sale_id,
                "total_cents": receipt.total_cents,
                "line_count": receipt.line_count,
                "cashier_id": ctx.principal.id,
            }),
        ),
    );

    tracing::info!(
        sale_id = %receipt.sale_id,
        branch_id = %receipt.branch_id,
        total_cents = receipt.total_cents,
        "Sale recorded"
    );
    Ok((axum::http::StatusCode::CREATED, Json(ApiResponse::ok(receipt))))
}
