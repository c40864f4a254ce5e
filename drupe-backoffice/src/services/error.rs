use crate::repository::RepoError;
use crate::services::tokens::TokenError;
use drupe_core::error::{AppError, GateReason};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked,

    #[error("Account inactive")]
    AccountInactive,

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Session not found")]
    SessionNotFound,

    #[error("Branch not allowed")]
    BranchNotAllowed,

    #[error("Branch not selected")]
    BranchNotSelected,

    #[error("Forbidden")]
    Forbidden,

    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Operation timed out")]
    Timeout,

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            // Deliberately the same outward code whether the username is
            // unknown or the password is wrong (anti-enumeration).
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("invalid_credentials"))
            }
            ServiceError::AccountLocked => AppError::gate(GateReason::AccountLocked),
            ServiceError::AccountInactive => AppError::gate(GateReason::AccountInactive),
            ServiceError::Token(e) => AppError::gate(e.gate_reason()),
            ServiceError::SessionNotFound => AppError::gate(GateReason::SessionRevoked),
            ServiceError::BranchNotAllowed | ServiceError::Forbidden => {
                AppError::gate(GateReason::Forbidden)
            }
            ServiceError::BranchNotSelected => AppError::gate(GateReason::BranchNotSelected),
            ServiceError::Repo(e) => e.into(),
            ServiceError::ShuttingDown => AppError::ServiceUnavailable,
            ServiceError::Timeout => {
                AppError::InternalError(anyhow::anyhow!("operation timed out"))
            }
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
