use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;

use crate::dtos::{ApiResponse, RecordDeliveryRequest};
use crate::hub::{Channel, Event, Scope};
use crate::middleware::Ctx;
use crate::repository::DeliveryRecord;
use crate::utils::validation::ValidatedJson;
use crate::AppState;
use drupe_core::error::AppError;

#[utoipa::path(
    post,
    path = "/branches/{branch_id}/deliveries",
    request_body = RecordDeliveryRequest,
    params(("branch_id" = String, Path, description = "Target branch")),
    responses(
        (status = 201, description = "Delivery recorded"),
        (status = 403, description = "Capability or branch denied"),
        (status = 404, description = "Unknown branch")
    ),
    tag = "Deliveries",
    security(("bearer_auth" = []))
)]
pub async fn record_delivery(
    State(state): State<AppState>,
    Ctx(ctx): Ctx,
    Path(branch_id): Path<String>,
    ValidatedJson(req): ValidatedJson<RecordDeliveryRequest>,
) -> Result<(axum::http::StatusCode, Json<ApiResponse<DeliveryRecord>>), AppError> {
    let (record, commit) = state
        .repo
        .record_delivery(&branch_id, ctx.principal.id, req.reference)
        .await?;

    state.publisher.publish(
        &commit,
        Event::new(
            Channel::NewDelivery,
            Scope::branch(&record.branch_id),
            json!({
                "delivery_id": record.delivery_id,
                "reference": record.reference,
                "driver_id": ctx.principal.id,
            }),
        ),
    );

    tracing::info!(
        delivery_id = %record.delivery_id,
        branch_id = %record.branch_id,
        "Delivery recorded"
    );
    Ok((axum::http::StatusCode::CREATED, Json(ApiResponse::ok(record))))
}
