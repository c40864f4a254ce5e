use crate::repository::SaleLine;
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordSaleRequest {
    #[validate(length(min = 1, message = "A sale needs at least one line"))]
    pub lines: Vec<SaleLine>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct AdjustStockRequest {
    #[validate(length(min = 1, message = "Product id is required"))]
    #[schema(example = "dried-mango")]
    pub product_id: String,

    /// Signed adjustment; negative removes stock.
    #[schema(example = -5)]
    pub delta: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordDeliveryRequest {
    #[validate(length(min = 1, message = "Reference is required"))]
    #[schema(example = "PO-2031")]
    pub reference: String,
}
