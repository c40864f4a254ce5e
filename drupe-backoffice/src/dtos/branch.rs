use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct BranchSelectRequest {
    #[validate(length(min = 1, message = "Branch id is required"))]
    #[schema(example = "B1")]
    pub branch_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BranchSelectResponse {
    #[schema(example = "B1")]
    pub branch_id: String,
    #[schema(example = "Downtown")]
    pub branch_name: String,
}
