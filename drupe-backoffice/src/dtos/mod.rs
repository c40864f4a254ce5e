mod auth;
mod branch;
mod ops;

pub use auth::*;
pub use branch::*;
pub use ops::*;

use serde::Serialize;

/// Success envelope used by every 2xx JSON response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}
