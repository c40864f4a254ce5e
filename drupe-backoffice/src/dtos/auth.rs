use crate::models::Role;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    #[schema(example = "manager1")]
    pub username: String,

    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "orchard-gate")]
    pub password: String,

    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserView {
    pub id: Uuid,
    #[schema(example = "manager1")]
    pub username: String,
    pub role: Role,
    pub branch_memberships: BTreeSet<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TokenPairResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[schema(example = "bearer")]
    pub token_type: &'static str,
    #[schema(example = 1800)]
    pub expires_in: u64,
    pub user: UserView,
}

/// 2FA interstitial: the password was right but the login is not done.
#[derive(Debug, Serialize, ToSchema)]
pub struct TwofaStagingResponse {
    pub requires_2fa: bool,
    pub temp_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TwofaVerifyRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub temp_token: String,
    #[validate(length(min = 4, message = "Code is too short"))]
    #[schema(example = "483920")]
    pub code: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "Current password is required"))]
    pub current_password: String,
    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UnlockRequest {
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}
